//! Application state shared across all request handlers.

use crate::config::runtime::SharedConfig;
use giveaway_core::service::EventService;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Giveaway lifecycle operations.
    pub service: Arc<EventService>,
    /// Runtime configuration (can be reloaded via SIGHUP).
    pub config: SharedConfig,
}

impl AppState {
    pub fn new(service: Arc<EventService>, config: SharedConfig) -> Self {
        Self { service, config }
    }
}
