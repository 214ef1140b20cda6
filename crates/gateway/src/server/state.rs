//! Shared application state injected into every Axum handler.

use crate::registry::PolicyRegistry;

/// Application state shared across all request handlers.
///
/// Cheap to clone: the registry is `Arc`-backed.
#[derive(Clone, Default)]
pub struct AppState {
    /// Lock-free registry of per-collection encryptors.
    pub registry: PolicyRegistry,
}

impl AppState {
    pub fn new(registry: PolicyRegistry) -> Self {
        Self { registry }
    }
}
