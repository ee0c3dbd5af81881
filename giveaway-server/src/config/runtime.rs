//! Validated runtime configuration.
//!
//! Built from the [`FileConfig`](super::file::FileConfig) by the
//! [`ConfigLoader`](super::ConfigLoader). Sections that can change on SIGHUP
//! live behind their own lock in [`SharedConfig`].

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use giveaway_core::config::{SchedulerConfig, ServiceConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

pub use super::file::StorageBackend;

/// Server configuration with runtime values.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// The address and port to listen on.
    pub listen: SocketAddr,
}

/// Admin configuration with hashed secret.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// The argon2 hashed admin secret.
    pub secret_hash: String,
}

impl AdminConfig {
    pub fn new(secret_hash: String) -> Self {
        Self { secret_hash }
    }

    /// Verify a plaintext secret against the stored hash.
    pub fn verify_secret(&self, plaintext: &str) -> bool {
        let Ok(parsed_hash) = PasswordHash::new(&self.secret_hash) else {
            return false;
        };

        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed_hash)
            .is_ok()
    }
}

/// Engine limits and timings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub sweep_interval: Duration,
    pub sweep_concurrency: usize,
    pub gateway_timeout: Duration,
    pub max_winners: u32,
    pub max_duration: Duration,
}

impl EngineConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            sweep_interval: self.sweep_interval,
            sweep_concurrency: self.sweep_concurrency,
        }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            gateway_timeout: self.gateway_timeout,
        }
    }
}

/// Discord connection settings. Only read at startup.
#[derive(Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub api_base: Url,
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base.as_str())
            .finish()
    }
}

/// Storage settings. Only read at startup.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval: Duration,
}

/// Shared configuration state with separate locks for each reloadable section.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub admin: Arc<RwLock<AdminConfig>>,
    pub engine: Arc<RwLock<EngineConfig>>,
}
