use std::{fmt::Display, future::Future, time::Duration};

use anyhow::Context;
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use tokio::time::Instant;
use tracing::{info, warn};

const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// How the issuer reaches its database at startup.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: u32,
    pub min_idle: u32,
    pub run_migrations: bool,
    /// How long to keep retrying while the database is still coming up.
    pub wait: Duration,
}

/// Connects, retrying for up to `config.wait`, then runs the migrations when
/// asked to.
pub async fn connection_manager(
    uri: &str,
    config: &PoolConfig,
) -> anyhow::Result<MySqlPool> {
    let options = MySqlPoolOptions::new()
        .max_connections(config.max_size)
        .min_connections(config.min_idle);
    let pool = retry_until(config.wait, RETRY_INTERVAL, || {
        options.clone().connect(uri)
    })
    .await
    .with_context(|| {
        format!("database unreachable after {}s", config.wait.as_secs())
    })?;
    info!("database connection pool ready");

    if config.run_migrations {
        info!("migrations enabled, running...");
        sqlx::migrate!()
            .run(&pool)
            .await
            .context("error while running database migrations")?;
    }

    Ok(pool)
}

/// Calls `attempt` every `interval` until it succeeds or `deadline` has
/// passed since the first call; the last error is returned.
async fn retry_until<T, E, F, Fut>(
    deadline: Duration,
    interval: Duration,
    mut attempt: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let start = Instant::now();
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if start.elapsed() < deadline => {
                warn!("database not ready yet: {}", err);
                tokio::time::sleep(interval).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn waits_for_a_late_database() {
        let calls = &AtomicU32::new(0);
        let started = Instant::now();
        let result = retry_until(
            Duration::from_secs(60),
            Duration::from_secs(1),
            move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0..=2 => Err("connection refused"),
                    _ => Ok("pool"),
                }
            },
        )
        .await;

        assert_eq!(result, Ok("pool"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_deadline() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = retry_until(
            Duration::from_secs(3),
            Duration::from_secs(1),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("connection refused")
            },
        )
        .await;

        assert_eq!(result, Err("connection refused"));
        // t = 0, 1, 2 and the final try at 3
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
