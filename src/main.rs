mod errors;
mod layers;
mod models;
mod routers;
mod services;
mod utils;

use crate::errors::BrewError;
use crate::routers::router;
use crate::services::events::{EventDispatcher, EventSink, HttpEventSink, LogEventSink};
use crate::services::identity::{CachedClientDirectory, HttpIdentityProvider, IdentityProvider};
use crate::services::wallet::HttpWalletClient;
use clap::Parser;
use services::states::BrewState;
use services::states::config::AppConfig;
use services::states::db::DataBaseState;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[cfg(all(target_os = "windows", feature = "alternative-allocator"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[cfg(all(
    any(
        target_os = "linux",
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    ),
    feature = "alternative-allocator"
))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

fn tracing_init(level: &str) {
    use std::io::stdout;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, Layer};
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(stdout)
        .with_filter(EnvFilter::new(level));
    tracing_subscriber::registry().with(fmt_layer).init();
}

#[cfg_attr(test, ctor::ctor)]
fn init() {
    tracing_init("info,brew=debug");
}

pub mod shadow {
    use shadow_rs::shadow;
    shadow!(build_info);
}

#[derive(clap::Parser, Debug)]
#[clap(
    name = "brew",
    version = shadow::build_info::VERSION,
    long_version = shadow::build_info::CLAP_LONG_VERSION
)]
pub struct Cli {
    #[clap(short, long, help = "Path to config file", default_value = "brew.toml")]
    config: String,
}

fn event_sink(config: &AppConfig) -> Result<Arc<dyn EventSink>, BrewError> {
    match &config.events.endpoint {
        Some(endpoint) => {
            tracing::info!("Sending events to {endpoint}");
            Ok(Arc::new(HttpEventSink::new(endpoint.clone())?))
        }
        None => {
            tracing::warn!("No event endpoint configured, events will only be logged");
            Ok(Arc::new(LogEventSink))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(AppConfig::load(&cli.config).map_err(BrewError::from)?);
    tracing_init(&config.common.log_level);
    if config.promo.team_group_ids.is_empty() {
        tracing::warn!("`promo.team_group_ids` is empty, nobody can create promo codes");
    }
    let sqlx_opt = SqliteConnectOptions::from_str(&config.db.db_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let sqlx_pool = SqlitePoolOptions::new()
        .max_connections(config.db.sqlite_connection_nums)
        .connect_with(sqlx_opt)
        .await
        .map_err(BrewError::SqlxError)?;
    let db = DataBaseState::new(sqlx_pool);
    tracing::info!("Bootstrapping promo code schema...");
    db.ensure_schema().await.map_err(BrewError::from)?;

    let identity: Arc<dyn IdentityProvider> = Arc::new(CachedClientDirectory::new(
        Arc::new(HttpIdentityProvider::new(&config.identity).map_err(BrewError::from)?),
        &config.identity,
    ));
    let wallet = Arc::new(HttpWalletClient::new(&config.wallet).map_err(BrewError::from)?);
    let events = EventDispatcher::new(event_sink(&config)?);

    let addr = format!("{}:{}", config.common.host, config.common.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(BrewError::from)?;
    tracing::info!(
        "Starting server at {}:{}",
        config.common.host,
        config.common.port
    );
    let brew_state = Arc::new(BrewState {
        db,
        identity,
        wallet,
        events,
        config,
    });
    axum::serve(listener, router(brew_state.clone()))
        .with_graceful_shutdown(async {
            #[cfg(unix)]
            {
                use tokio::signal::unix::{SignalKind, signal};
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
                let mut sigterm =
                    signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
                tokio::select! {
                    _ = sigint.recv() => {},
                    _ = sigterm.recv() => {},
                }
            }
            #[cfg(windows)]
            {
                let _ = tokio::signal::ctrl_c().await;
            }
            #[cfg(not(any(unix, windows)))]
            {
                tracing::warn!("Graceful shutdown is not supported on this platform.");
                std::future::pending::<()>().await;
            }
            tracing::warn!("Received shutdown signal, shutting down gracefully...");
        })
        .await?;
    tracing::info!("Trying to close database connections...");
    match tokio::time::timeout(Duration::from_secs(15), brew_state.db.close_conn()).await {
        Ok(_) => tracing::info!("Database connections closed."),
        Err(_) => tracing::error!("Timed out while closing database connections."),
    }
    Ok(())
}
