//! seatgate - exam seating and entry verification service
//!
//! Configuration resolves CLI > environment > TOML > compiled defaults.
//! The database lives at `<root>/seatgate.db` and is created on first run.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use seatgate::{build_router, AppState};
use seatgate_common::api::{load_or_init_jwt_secret, TokenService};
use seatgate_common::config::{load_toml_config_or_default, RootFolderInitializer, RootFolderResolver};
use seatgate_common::db::init_database;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for seatgate
#[derive(Parser, Debug)]
#[command(name = "seatgate")]
#[command(about = "Exam seating and entry verification service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5780", env = "SEATGATE_PORT")]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1", env = "SEATGATE_BIND")]
    bind: std::net::IpAddr,

    /// Data folder holding the database
    #[arg(short, long, env = "SEATGATE_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml_config = load_toml_config_or_default(args.config.as_deref());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(&toml_config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any database delay
    info!(
        "Starting seatgate v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let root_folder = RootFolderResolver::new("seatgate")
        .with_cli_arg(args.root_folder.clone())
        .with_toml(toml_config.clone())
        .resolve();

    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let secret = match toml_config.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
        Some(secret) => {
            info!("Using session token secret from config file");
            secret.to_string()
        }
        None => load_or_init_jwt_secret(&pool)
            .await
            .context("Failed to load session token secret")?,
    };
    let tokens = TokenService::new(&secret, toml_config.token_ttl_hours());

    let app = build_router(AppState::new(pool, tokens));

    let addr = SocketAddr::new(args.bind, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("seatgate listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Filter used when `RUST_LOG` is unset
fn default_filter(level: &str) -> String {
    format!("seatgate={level},seatgate_common={level},tower_http={level}")
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
