mod chat;
mod routes;

use std::{future::Future, str::FromStr, time::Duration};

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use crate::{AppError, AppResult, res};

pub use routes::{MarkerSelector, NewMarker, NewRoute};

#[derive(Debug, Clone)]
pub struct Store {
    pool: SqlitePool,
    timeout: Duration,
}

impl Store {
    pub async fn connect(database_url: &str, timeout: Duration) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // each connection to `:memory:` is its own database, so keep exactly one alive
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(16)
        };
        let pool = pool_options.connect_with(options).await?;

        let store = Self { pool, timeout };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn in_memory() -> AppResult<Self> {
        Self::connect("sqlite::memory:", Duration::from_secs(5)).await
    }

    /// Closes the pool. Every later call fails with a persistence error.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> AppResult<()> {
        sqlx::raw_sql(res::SCHEMA).execute(&self.pool).await?;
        tracing::debug!("schema is up to date");
        Ok(())
    }

    async fn bounded<T>(&self, op: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| AppError::Timeout(self.timeout))?
    }
}
