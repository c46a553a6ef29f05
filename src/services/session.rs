//! Per-request session context backed by a session store
//!
//! The only session state kept is a visit counter per session id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};

/// External collaborator holding session data
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Increment the visit counter and return the count before this visit
    async fn take_visit(&self, session_id: &str) -> AppResult<i64>;
}

/// Redis backed session store
#[derive(Clone)]
pub struct RedisSessionStore {
    client: Client,
    ttl_seconds: u64,
}

impl RedisSessionStore {
    /// Create a new Redis session store and check the connection
    pub async fn new(url: &str, ttl_seconds: u64) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;

        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;

        Ok(Self { client, ttl_seconds })
    }

    fn key(session_id: &str) -> String {
        format!("session:{}:num_visits", session_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn take_visit(&self, session_id: &str) -> AppResult<i64> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))?;

        let key = Self::key(session_id);
        let visits: i64 = conn
            .incr(&key, 1)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to count visit in Redis: {}", e)))?;
        // sliding expiry, like a session cookie refreshed on use
        conn.expire::<_, ()>(&key, self.ttl_seconds as i64)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to refresh session in Redis: {}", e)))?;

        Ok(visits - 1)
    }
}

/// Session store kept in process memory
///
/// Sessions idle for longer than the TTL are dropped on the next visit.
#[derive(Clone)]
pub struct MemorySessionStore {
    visits: Arc<Mutex<HashMap<String, MemorySession>>>,
    ttl: Duration,
}

struct MemorySession {
    visits: i64,
    last_seen: Instant,
}

impl MemorySessionStore {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            visits: Arc::default(),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    async fn take_visit_at(&self, session_id: &str, now: Instant) -> i64 {
        let mut sessions = self.visits.lock().await;
        let ttl = self.ttl;
        sessions.retain(|_, s| now.saturating_duration_since(s.last_seen) <= ttl);

        let session = sessions
            .entry(session_id.to_string())
            .or_insert(MemorySession {
                visits: 0,
                last_seen: now,
            });
        let before = session.visits;
        session.visits += 1;
        session.last_seen = now;
        before
    }

    /// Number of live sessions
    pub async fn session_count(&self) -> usize {
        self.visits.lock().await.len()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(crate::config::RedisConfig::default().session_ttl_seconds)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn take_visit(&self, session_id: &str) -> AppResult<i64> {
        Ok(self.take_visit_at(session_id, Instant::now()).await)
    }
}

/// Session state for a single request
pub struct SessionContext {
    pub id: String,
    /// True when the id was minted for this request
    pub is_new: bool,
    store: Arc<dyn SessionStore>,
}

impl SessionContext {
    /// Attach to an existing session or start a new one
    pub fn open(existing: Option<String>, store: Arc<dyn SessionStore>) -> Self {
        match existing.filter(|id| !id.is_empty()) {
            Some(id) => Self {
                id,
                is_new: false,
                store,
            },
            None => Self {
                id: uuid::Uuid::new_v4().simple().to_string(),
                is_new: true,
                store,
            },
        }
    }

    /// Number of earlier visits; counts the current one
    pub async fn record_visit(&self) -> AppResult<i64> {
        self.store.take_visit(&self.id).await
    }
}
