//! Tracing setup: JSON structured logs, with optional OTLP span export.
//!
//! # Telemetry invariants
//!
//! - **No plaintext or ciphertext values** may appear in any span attribute or
//!   log field. Collection names, key names and counts are fine.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`), overridden
//!   by `RUST_LOG` when set.

pub mod init;

pub use init::init_telemetry;
