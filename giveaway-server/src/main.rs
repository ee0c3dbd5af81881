//! Giveaway Server
//!
//! Runs scheduled Discord giveaways and exposes an admin API to manage them.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::runtime::{StorageBackend, StorageConfig};
use config::{ConfigLoader, get_database_url};
use giveaway_core::config::ConfigStore;
use giveaway_core::gateway::MessagingGateway;
use giveaway_core::gateway::discord::DiscordGateway;
use giveaway_core::scheduler::{Scheduler, schedule_command_channel};
use giveaway_core::service::EventService;
use giveaway_core::store::{EventStore, MemoryEventStore, PgEventStore};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Giveaway Server - scheduled Discord giveaways with an admin API
#[derive(Parser, Debug)]
#[command(name = "giveaway-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./giveaway-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

/// The event store plus whatever has to be shut down with it.
struct StoreBackend {
    store: Arc<dyn EventStore>,
    pool: Option<PgPool>,
    snapshot_task: Option<JoinHandle<()>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();

    tracing::info!("Starting giveaway-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);
    let shared_config = loaded_config.shared();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let backend = open_store(&loaded_config.storage, args.migrate, shutdown_rx.clone()).await?;

    tracing::info!("Connecting to Discord...");
    let gateway = DiscordGateway::connect(
        &loaded_config.discord.token,
        loaded_config.discord.api_base.clone(),
        loaded_config.engine.gateway_timeout,
    )
    .await
    .map_err(|e| {
        tracing::error!("Failed to connect to Discord: {}", e);
        e
    })?;
    tracing::info!(bot_id = %gateway.self_id(), "Discord connection established");

    // Wire the engine
    let (schedule_tx, schedule_rx) = schedule_command_channel();
    let service = Arc::new(EventService::new(
        Arc::clone(&backend.store),
        Arc::new(gateway),
        schedule_tx,
        loaded_config.engine.service_config(),
    ));

    let scheduler_config_store = ConfigStore::new(loaded_config.engine.scheduler_config());
    let scheduler = Scheduler::new(Arc::clone(&service), scheduler_config_store.clone());
    let scheduler_handle = tokio::spawn(scheduler.run(
        shutdown_rx.clone(),
        schedule_rx,
        scheduler_config_store.subscribe(),
    ));

    let state = AppState::new(service, shared_config);

    // Spawn config reload handler (listens for SIGHUP)
    let shutdown_notify =
        spawn_config_reload_handler(state.clone(), config_loader, scheduler_config_store);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop background work: timers, sweep, snapshots, config reload
    let _ = shutdown_tx.send(true);
    shutdown_notify.notify_one();

    if let Err(e) = scheduler_handle.await {
        tracing::error!("Scheduler task ended abnormally: {}", e);
    }
    if let Some(snapshot_task) = backend.snapshot_task {
        if let Err(e) = snapshot_task.await {
            tracing::error!("Snapshot task ended abnormally: {}", e);
        }
    }
    if let Some(pool) = backend.pool {
        tracing::info!("Closing database connections...");
        pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Open the configured event store.
async fn open_store(
    storage: &StorageConfig,
    migrate: bool,
    shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<StoreBackend> {
    match storage.backend {
        StorageBackend::Postgres => {
            let database_url = get_database_url().map_err(|e| {
                tracing::error!("DATABASE_URL environment variable not set");
                e
            })?;

            tracing::info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&database_url)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to database: {}", e);
                    e
                })?;
            tracing::info!("Database connection established");

            if migrate {
                tracing::info!("Running database migrations...");
                sqlx::migrate!("../migrations")
                    .run(&db_pool)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to run migrations: {}", e);
                        e
                    })?;
                tracing::info!("Migrations completed successfully");
            }

            Ok(StoreBackend {
                store: Arc::new(PgEventStore::new(db_pool.clone())),
                pool: Some(db_pool),
                snapshot_task: None,
            })
        }
        StorageBackend::Memory => {
            let store = match &storage.snapshot_path {
                Some(path) => {
                    let store = MemoryEventStore::open(path).await.map_err(|e| {
                        tracing::error!("Failed to open snapshot {:?}: {}", path, e);
                        e
                    })?;
                    tracing::info!("Loaded giveaway snapshot from {:?}", path);
                    Arc::new(store)
                }
                None => {
                    tracing::warn!("Memory storage without snapshot_path, giveaways are lost on restart");
                    Arc::new(MemoryEventStore::new())
                }
            };
            if migrate {
                tracing::warn!("--migrate has no effect with memory storage");
            }

            let snapshot_task = tokio::spawn(
                Arc::clone(&store).run_snapshot_loop(storage.snapshot_interval, shutdown_rx),
            );
            Ok(StoreBackend {
                store,
                pool: None,
                snapshot_task: Some(snapshot_task),
            })
        }
    }
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
