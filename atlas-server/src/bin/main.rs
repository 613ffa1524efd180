use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atlas_storage::{connection_manager, PoolConfig, Store};

use atlas_server::{
    load, shutdown_signal, version, App, AppConfig, AppRouter, AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = env::args().collect::<Vec<_>>();
    let config =
        if args.len() == 3 && (args[1] == "-c" || args[1] == "--config") {
            load(&args[2])?
        } else {
            AppConfig::parse()
        };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("{}", version());
    run_server(config).await
}

async fn run_server(config: AppConfig) -> Result<()> {
    let store = match &config.database_url {
        Some(url) => {
            info!("initializing Mariadb connection...");
            let pool = connection_manager(
                url,
                &PoolConfig {
                    max_size: config.max_size,
                    min_idle: config.min_idle,
                    run_migrations: config.run_migrations,
                    wait: Duration::from_secs(config.db_wait_seconds),
                },
            )
            .await
            .context("could not initialize the database connection pool")?;
            Store::mariadb(pool)
        }
        None => {
            warn!("no database configured, users and refresh tokens are kept in memory");
            Store::memory()
        }
    };

    let app = App::new(store, config.clone())?;
    app.bootstrap().await?;
    info!(
        issuer = %config.issuer,
        audience = %config.audience,
        "token issuer ready, initializing axum server..."
    );

    let router = AppRouter::build(AppState(Arc::new(app)))
        .context("could not initialize application routes")?;
    let host = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&host)
        .await
        .context("could not bind to endpoint")?;

    info!("api server, listening on {}", host);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("error while starting API server")?;

    Ok(())
}
