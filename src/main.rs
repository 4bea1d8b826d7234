//! Application entry point and server initialization
//!
//! This module contains the main function that:
//! - Loads environment configuration
//! - Initializes the database and reference data
//! - Starts the HTTP server with graceful shutdown support

use std::path::Path;

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use foodgram::config::Config;
use foodgram::database::{init_db, AppState};
use foodgram::route::create_app;
use foodgram::seed;

/// Application entry point
///
/// Configuration comes from the environment, see [`Config::from_env`].
/// `RUST_LOG` overrides the default log filter.
#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("foodgram=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env();

    let db = match init_db(&config.database_url) {
        Ok(db) => db,
        Err(e) => {
            error!(path = %config.database_url, "Failed to initialize database: {e}");
            return;
        }
    };

    if let Err(e) = seed::load_default_tags(&db) {
        warn!("Failed to load default tags: {e}");
    }
    if let Some(path) = &config.ingredients_path {
        if let Err(e) = seed::load_ingredients(&db, Path::new(path)) {
            warn!(path = %path, "Failed to load ingredients: {e}");
        }
    }

    let port = config.port;
    let database_url = config.database_url.clone();
    let state = AppState::new(db, config);

    let app = create_app(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(%addr, "Failed to bind: {e}");
            return;
        }
    };

    info!(%addr, database = %database_url, "server running");

    // Runs until SIGTERM or SIGINT
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
    }
}

/// Handles graceful shutdown signals
///
/// Returns when SIGINT (Ctrl+C) or, on Unix, SIGTERM is received. Open
/// connections are allowed to complete so no write transaction is cut off
/// halfway.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
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
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, stopping server");
}
