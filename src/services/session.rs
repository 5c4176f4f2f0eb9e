//! Resolution of bearer tokens to owner identities.
//!
//! Token issuance, expiry management, and user registration belong to the
//! surrounding identity system; the core only consumes
//! `(token) -> user id | none` through this seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
#[cfg(test)]
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(test)]
use std::sync::RwLock;
use uuid::Uuid;

use super::error::FileStoreResult;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Map a bearer token to its owner, or `None` when the token is
    /// unknown or expired.
    async fn resolve(&self, token: &str) -> FileStoreResult<Option<Uuid>>;
}

/// Production adapter: point query against the `sessions` table, whose rows
/// are provisioned by the identity service.
pub struct DbSessionStore {
    db: Arc<SqlitePool>,
}

impl DbSessionStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for DbSessionStore {
    async fn resolve(&self, token: &str) -> FileStoreResult<Option<Uuid>> {
        let row: Option<(Uuid, DateTime<Utc>)> =
            sqlx::query_as("SELECT user_id, expires_at FROM sessions WHERE token = ?")
                .bind(token)
                .fetch_optional(&*self.db)
                .await?;
        Ok(row.and_then(|(user_id, expires_at)| (expires_at > Utc::now()).then_some(user_id)))
    }
}

/// In-memory double for tests.
#[cfg(test)]
#[derive(Default, Clone)]
pub struct MemorySessionStore {
    tokens: Arc<RwLock<HashMap<String, Uuid>>>,
}

#[cfg(test)]
impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: impl Into<String>, user: Uuid) {
        self.tokens.write().unwrap().insert(token.into(), user);
    }
}

#[cfg(test)]
#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn resolve(&self, token: &str) -> FileStoreResult<Option<Uuid>> {
        Ok(self.tokens.read().unwrap().get(token).copied())
    }
}
