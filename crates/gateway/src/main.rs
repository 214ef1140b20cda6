//! `fle-gateway`: HTTP sidecar entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise tracing (JSON logs, optional OTLP export).
//! 3. Build the Vault transit client.
//! 4. Load collection policies from the policy file into [`PolicyRegistry`].
//! 5. Spawn the policy refresh task.
//! 6. Build the Axum router and start the HTTP server.

mod config;
mod registry;
mod server;
mod telemetry;

use std::sync::Arc;

use anyhow::Result;
use fle::{KeyService, VaultTransit};
use tracing::info;

use config::Config;
use registry::PolicyRegistry;
use server::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "fle-gateway starting"
    );

    // -----------------------------------------------------------------------
    // 3. Key service
    // -----------------------------------------------------------------------
    let mut vault =
        VaultTransit::new(&cfg.vault_addr, &cfg.vault_token).with_mount(&cfg.vault_transit_mount);
    if let Some(ns) = &cfg.vault_namespace {
        vault = vault.with_namespace(ns);
    }
    let key_service: Arc<dyn KeyService> = Arc::new(vault);

    // -----------------------------------------------------------------------
    // 4. Policy registry
    // -----------------------------------------------------------------------
    let registry = PolicyRegistry::new();
    registry::load_all(&cfg, key_service.clone(), &registry).await?;

    // -----------------------------------------------------------------------
    // 5. Background tasks
    // -----------------------------------------------------------------------
    let _policy_refresh = registry::refresh_task(cfg.clone(), key_service, registry.clone());

    // -----------------------------------------------------------------------
    // 6. HTTP server
    // -----------------------------------------------------------------------
    let router = server::router::build(AppState::new(registry));

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
