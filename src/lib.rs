//! # Food Delivery API
//!
//! REST backend for a small food-delivery service: registration and login,
//! restaurant and menu browsing, order placement with payment and simulated
//! delivery tracking, and post-delivery reviews.
//!
//! The interesting state lives in three places:
//! - the SQLite store ([`database`]) holding users, the catalog and the
//!   order graph,
//! - the per-order tracking simulator ([`tracking`]), process-local and
//!   forgotten on restart,
//! - the driver pool, whose availability flag is claimed and released
//!   transactionally by the order lifecycle ([`orders`]).

use signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub mod auth;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod orders;
pub mod reviews;
pub mod routes;
pub mod state;
pub mod tracking;

use routes::build_router;
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    database::seed_demo(&state.pool)
        .await
        .expect("Failed to seed demo data");

    info!("Starting server...");
    let app = build_router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
