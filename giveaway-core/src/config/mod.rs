mod config_store;

pub use config_store::{ConfigStore, ConfigWatcher};

use std::time::Duration;

/// Settings of the [`EventService`](crate::service::EventService).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Upper bound for every single gateway call.
    pub gateway_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(10),
        }
    }
}

/// Hot-reloadable settings of the [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How often the due-event sweep runs.
    pub sweep_interval: Duration,
    /// How many due events one sweep completes at the same time.
    pub sweep_concurrency: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            sweep_concurrency: 4,
        }
    }
}
