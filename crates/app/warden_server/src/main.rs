//! Warden credential API server binary.
//!
//! Prints `{"port": N}` to stdout once bound so a supervisor can discover an
//! ephemeral port. Logs go to stderr.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use warden_core::rate_limit::{CounterStore, InMemoryCounterStore};
use warden_core::repo::{InMemoryUserRepository, PgUserRepository, UserRepository};

const DEFAULT_LOG_FILTER: &str = "info,warden_api=debug,warden_core=debug";

/// How often expired rate-limit counters are dropped.
const COUNTER_PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "warden_server", version, about = "Warden credential API server")]
struct Args {
    /// Port to listen on (0 = ephemeral).
    #[arg(long, env = "PORT", default_value_t = 3100)]
    port: u16,

    /// Interface to bind.
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    host: String,

    /// PostgreSQL connection URL. Without one, accounts are kept in memory
    /// and lost on exit.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Write logs to stderr so stdout is reserved for the JSON port message.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let args = Args::parse();

    let mut config = warden_api::config::ApiConfig::from_env()?;
    config.bind_addr = format!("{}:{}", args.host, args.port);
    info!(bind_addr = %config.bind_addr, auth = ?config.auth, "starting warden_server");

    let repo: Arc<dyn UserRepository> = match &args.database_url {
        Some(url) => {
            info!(max_connections = args.max_connections, "configuring connection pool");
            let pool = PgPoolOptions::new()
                .max_connections(args.max_connections)
                .acquire_timeout(Duration::from_secs(30))
                .connect(url)
                .await?;

            info!("running database migrations");
            warden_api::migrate(&pool).await?;
            Arc::new(PgUserRepository::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set; using in-memory user repository");
            Arc::new(InMemoryUserRepository::new())
        }
    };

    let counters = Arc::new(InMemoryCounterStore::new());
    let _purge = counters.spawn_purge_task(COUNTER_PURGE_INTERVAL);
    let counters: Arc<dyn CounterStore> = counters;

    let state = warden_api::AppState::new(config.clone(), repo, Some(counters))?;
    let app = warden_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;

    println!("{}", serde_json::json!({ "port": local_addr.port() }));
    info!(addr = %local_addr, "REST API listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
