use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::config::AppConfig;
use crate::storage::{ObjectStore, S3Store};

/// Shared handles cloned into every request.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStore>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let db = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database_url)
            .await
            .context("connect to postgres")?;
        info!("database pool ready");

        let storage: Arc<dyn ObjectStore> = Arc::new(S3Store::connect(&config.storage).await?);

        Ok(Self {
            db,
            config: Arc::new(config),
            storage,
        })
    }

    /// Pool pointed at a closed port plus an in-memory object store.
    #[cfg(test)]
    pub fn fake() -> Self {
        let config = AppConfig::for_tests();
        let db = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&config.database_url)
            .expect("lazy pool");

        Self {
            db,
            config: Arc::new(config),
            storage: Arc::new(crate::storage::MemoryStore::default()),
        }
    }
}
