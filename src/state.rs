use std::sync::Arc;

use sqlx::SqlitePool;

use super::{config::Config, database::init_pool, tracking::Tracker};

pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    pub tracker: Tracker,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        Self::with_config(Config::load()).await
    }

    pub async fn with_config(config: Config) -> Arc<Self> {
        let pool = init_pool(&config.database_url).await;

        Arc::new(Self {
            config,
            pool,
            tracker: Tracker::default(),
        })
    }
}
