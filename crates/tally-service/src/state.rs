//! Application state.

use std::sync::Arc;

use tally_store::{Ledger, Store};

use crate::config::ServiceConfig;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Ledger operations over the configured store.
    pub ledger: Ledger,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        if config.jwt_secret.is_none() {
            tracing::warn!("JWT secret not configured - user routes will reject all requests");
        }
        if config.service_api_key.is_none() {
            tracing::warn!("Service API key not configured - admin routes are disabled");
        }

        Self {
            ledger: Ledger::new(store),
            config,
        }
    }
}
