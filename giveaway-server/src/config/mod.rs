//! Configuration module for giveaway-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables. Also handles admin secret hashing.

pub mod file;
pub mod runtime;

use crate::config::file::FileConfig;
use crate::config::runtime::{
    AdminConfig, DiscordConfig, EngineConfig, ServerConfig, SharedConfig, StorageBackend,
    StorageConfig,
};
use giveaway_core::gateway::discord::DEFAULT_API_BASE;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("password hashing error: {0}")]
    HashError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,

    #[error("no Discord token in the config file or DISCORD_TOKEN")]
    MissingDiscordToken,
}

/// Loaded configuration result containing all parts.
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub admin: AdminConfig,
    pub engine: EngineConfig,
    pub discord: DiscordConfig,
    pub storage: StorageConfig,
}

impl LoadedConfig {
    /// Split off the reloadable sections behind their own locks.
    pub fn shared(&self) -> SharedConfig {
        SharedConfig {
            server: Arc::new(RwLock::new(self.server.clone())),
            admin: Arc::new(RwLock::new(self.admin.clone())),
            engine: Arc::new(RwLock::new(self.engine.clone())),
        }
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Hash the admin secret if it's plaintext (and rewrite the file)
    /// 5. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        let mut file_config: FileConfig = toml::from_str(&config_content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        self.validate(&file_config)?;

        let secret_hash = if file_config.is_admin_secret_hashed() {
            file_config.admin.secret.clone()
        } else {
            let hash = self.hash_secret(&file_config.admin.secret)?;
            file_config.admin.secret = hash.clone();
            self.rewrite_config(&file_config)?;
            tracing::info!("Admin secret hashed and config file updated");
            hash
        };

        let token = file_config
            .discord
            .token
            .clone()
            .or_else(|| std::env::var("DISCORD_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::MissingDiscordToken)?;

        build_loaded_config(file_config, secret_hash, token)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        if config.admin.secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "admin secret must not be empty".to_string(),
            ));
        }
        let engine = &config.engine;
        if engine.sweep_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if engine.sweep_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "engine.sweep_concurrency must be at least 1".to_string(),
            ));
        }
        if engine.gateway_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.gateway_timeout_secs must be at least 1".to_string(),
            ));
        }
        if engine.max_winners == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_winners must be at least 1".to_string(),
            ));
        }
        if engine.max_duration_secs == 0 {
            return Err(ConfigError::ValidationError(
                "engine.max_duration_secs must be at least 1".to_string(),
            ));
        }
        if config.storage.backend == StorageBackend::Memory
            && config.storage.snapshot_path.is_some()
            && config.storage.snapshot_interval_secs == 0
        {
            return Err(ConfigError::ValidationError(
                "storage.snapshot_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn hash_secret(&self, plaintext: &str) -> Result<String, ConfigError> {
        use argon2::{
            Argon2, PasswordHasher,
            password_hash::{SaltString, rand_core::OsRng},
        };

        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();

        argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ConfigError::HashError(e.to_string()))
    }

    fn rewrite_config(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(config)?;

        // Write atomically: write to temp file, then rename
        let temp_path = self.config_path.with_extension("toml.tmp");
        std::fs::write(&temp_path, toml_string)?;
        std::fs::rename(&temp_path, &self.config_path)?;

        Ok(())
    }
}

fn build_loaded_config(
    file_config: FileConfig,
    secret_hash: String,
    token: String,
) -> Result<LoadedConfig, ConfigError> {
    let api_base = file_config
        .discord
        .api_base
        .as_deref()
        .unwrap_or(DEFAULT_API_BASE);
    let api_base = parse_api_base(api_base)?;

    let engine = file_config.engine;
    let storage = file_config.storage;

    Ok(LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        admin: AdminConfig::new(secret_hash),
        engine: EngineConfig {
            sweep_interval: Duration::from_secs(engine.sweep_interval_secs),
            sweep_concurrency: engine.sweep_concurrency,
            gateway_timeout: Duration::from_secs(engine.gateway_timeout_secs),
            max_winners: engine.max_winners,
            max_duration: Duration::from_secs(engine.max_duration_secs),
        },
        discord: DiscordConfig { token, api_base },
        storage: StorageConfig {
            backend: storage.backend,
            snapshot_path: storage.snapshot_path,
            snapshot_interval: Duration::from_secs(storage.snapshot_interval_secs),
        },
    })
}

/// Parse the API base, making sure relative joins keep its path.
fn parse_api_base(raw: &str) -> Result<Url, ConfigError> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized)
        .map_err(|e| ConfigError::ValidationError(format!("invalid discord.api_base: {e}")))
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
