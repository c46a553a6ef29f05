//! Business logic services

pub mod catalog;
pub mod lifecycle;
pub mod session;

use std::sync::Arc;

use crate::{config::AppConfig, error::AppResult, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub lifecycle: lifecycle::LifecycleService,
    pub sessions: Arc<dyn session::SessionStore>,
}

impl Services {
    /// Create all services over the given repository and session store
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        sessions: Arc<dyn session::SessionStore>,
    ) -> Self {
        Self {
            lifecycle: lifecycle::LifecycleService::new(
                repository.copies.clone(),
                config.lifecycle.clone(),
            ),
            catalog: catalog::CatalogService::new(repository),
            sessions,
        }
    }

    /// Pick the session store from configuration
    pub async fn session_store(config: &AppConfig) -> AppResult<Arc<dyn session::SessionStore>> {
        match &config.redis.url {
            Some(url) => {
                let store =
                    session::RedisSessionStore::new(url, config.redis.session_ttl_seconds).await?;
                tracing::info!("Sessions stored in Redis");
                Ok(Arc::new(store))
            }
            None => {
                tracing::info!("Sessions stored in process memory");
                Ok(Arc::new(session::MemorySessionStore::new(
                    config.redis.session_ttl_seconds,
                )))
            }
        }
    }
}
