//! The Atlas issuer: owns the signing key, authenticates users, hands out
//! access/refresh token pairs and publishes the verification key set that
//! relying parties feed into `atlas_auth`.

mod app;
mod config;
mod controllers;
mod routes;
pub mod services;
mod valid;
mod var;
mod version;

use tokio::signal;
use tracing::{error, info};

pub use app::{App, AppState};
pub use config::{load, AppConfig};
pub use routes::AppRouter;
pub use version::version;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_env = "msvc")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Resolves on Ctrl-C or, on unix, SIGTERM. A listener that cannot be
/// installed never fires; the other one still can.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("cannot listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received, draining connections"),
        _ = terminate => info!("SIGTERM received, draining connections"),
    }
}
