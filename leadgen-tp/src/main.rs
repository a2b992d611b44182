//! Lead Tier Progression (leadgen-tp) - Main entry point
//!
//! Webhook receiver that moves leads through cold → warm → hot based on
//! engagement callbacks and triggers the matching tier campaigns.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use leadgen_common::config::{
    default_config_path, RootFolderInitializer, RootFolderResolver, TomlConfig,
};
use leadgen_common::db::init_database;
use leadgen_common::events::EventBus;
use leadgen_tp::campaign::{CampaignTrigger, LoggingTrigger, MoEngageTrigger};
use leadgen_tp::store::{import_partition_dir, SqliteStore};
use leadgen_tp::{build_router, AppState, DEFAULT_PORT, EVENT_BUS_CAPACITY};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const MODULE_NAME: &str = "leadgen-tp";
const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Command-line arguments for leadgen-tp
#[derive(Parser, Debug)]
#[command(name = "leadgen-tp")]
#[command(about = "Lead tier progression webhook service")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "LEADGEN_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding leadgen.db
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "LEADGEN_TP_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long)]
    bind: Option<String>,

    /// Directory of legacy `<partition>_leads.json` files to import at startup
    #[arg(long)]
    import_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path(MODULE_NAME));
    let config = match &config_path {
        Some(path) => TomlConfig::load(path).context("Failed to load config")?,
        None => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting Lead Tier Progression ({}) v{}",
        MODULE_NAME,
        env!("CARGO_PKG_VERSION")
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => warn!("No config directory available, using defaults"),
    }

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&config)
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to initialize database")?;
    let store = SqliteStore::new(pool);

    if let Some(dir) = &args.import_dir {
        let summary = import_partition_dir(&store, dir)
            .await
            .with_context(|| format!("Failed to import leads from {}", dir.display()))?;
        info!(
            inserted = summary.total_inserted(),
            rejected = summary.total_rejected(),
            "Legacy lead import finished"
        );
    }

    let trigger = build_trigger(&config)?;

    let state = AppState::new(store, trigger, EventBus::new(EVENT_BUS_CAPACITY));
    let app = build_router(state);

    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let bind = args
        .bind
        .clone()
        .or_else(|| config.bind_address.clone())
        .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", bind, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("leadgen-tp listening on http://{}", addr);
    info!("Webhook: http://{}/api/moengage/webhook", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

fn build_trigger(config: &TomlConfig) -> Result<Arc<dyn CampaignTrigger>> {
    let moengage = config.moengage.clone().with_env_overrides();

    match moengage.credentials() {
        Some((workspace_id, data_api_key)) => {
            info!("Campaign triggers via MoEngage ({})", moengage.base_url);
            let trigger = MoEngageTrigger::new(&moengage.base_url, workspace_id, data_api_key)
                .context("Failed to build MoEngage client")?;
            Ok(Arc::new(trigger))
        }
        None => {
            warn!("MoEngage credentials not configured; campaign triggers will only be logged");
            Ok(Arc::new(LoggingTrigger))
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
