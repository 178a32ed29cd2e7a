//! Session storage backends
//!
//! The engine reads and writes session values only through [`SessionStore`];
//! cross-request consistency is the backend's concern.

use crate::error::SecurityResult;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error};

/// Idle lifetime of an in-memory session
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

/// Session storage trait for different backends
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Read a value from a session
    async fn get(&self, session_id: &str, key: &str) -> SecurityResult<Option<serde_json::Value>>;

    /// Write a value into a session, creating the session if needed
    async fn set(&self, session_id: &str, key: &str, value: serde_json::Value) -> SecurityResult<()>;

    /// Remove a value from a session
    async fn remove(&self, session_id: &str, key: &str) -> SecurityResult<()>;

    /// Drop a whole session
    async fn destroy(&self, session_id: &str) -> SecurityResult<()>;

    /// Move every value of `old_id` under `new_id`; `old_id` stops resolving
    async fn renew(&self, old_id: &str, new_id: &str) -> SecurityResult<()>;

    /// Drop expired sessions, returning how many were removed
    async fn cleanup_expired(&self) -> SecurityResult<u64>;
}

#[derive(Debug, Clone)]
struct SessionEntry {
    values: HashMap<String, serde_json::Value>,
    expires_at: DateTime<Utc>,
}

impl SessionEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// In-memory session storage
///
/// Sessions expire after an idle period; every write pushes the deadline
/// back. Cloning shares the underlying map.
#[derive(Debug, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionEntry>>>,
    ttl: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }
}

impl MemorySessionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle lifetime of sessions
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Number of stored sessions, expired ones included until cleanup
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session is stored
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Keys present in a live session
    pub async fn keys(&self, session_id: &str) -> Vec<String> {
        let now = Utc::now();
        self.sessions
            .read()
            .await
            .get(session_id)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.values.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Periodically drop expired sessions
    pub fn start_cleanup_task(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut cleanup_interval = tokio::time::interval(
                interval
                    .to_std()
                    .ok()
                    .filter(|period| !period.is_zero())
                    .unwrap_or(std::time::Duration::from_secs(60)),
            );

            loop {
                cleanup_interval.tick().await;

                match store.cleanup_expired().await {
                    Ok(count) => {
                        if count > 0 {
                            debug!("Cleanup task removed {} expired sessions", count);
                        }
                    }
                    Err(e) => {
                        error!("Session cleanup failed: {}", e);
                    }
                }
            }
        })
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str, key: &str) -> SecurityResult<Option<serde_json::Value>> {
        let now = Utc::now();
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.values.get(key))
            .cloned())
    }

    async fn set(&self, session_id: &str, key: &str, value: serde_json::Value) -> SecurityResult<()> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                values: HashMap::new(),
                expires_at,
            });
        if entry.is_expired(now) {
            entry.values.clear();
        }
        entry.values.insert(key.to_string(), value);
        entry.expires_at = expires_at;
        debug!("Stored {} in session {}", key, session_id);
        Ok(())
    }

    async fn remove(&self, session_id: &str, key: &str) -> SecurityResult<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(session_id) {
            entry.values.remove(key);
        }
        Ok(())
    }

    async fn destroy(&self, session_id: &str) -> SecurityResult<()> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }

    async fn renew(&self, old_id: &str, new_id: &str) -> SecurityResult<()> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        if let Some(mut entry) = sessions.remove(old_id) {
            if entry.is_expired(now) {
                return Ok(());
            }
            entry.expires_at = now + self.ttl;
            sessions.insert(new_id.to_string(), entry);
            debug!("Renewed session {} as {}", old_id, new_id);
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> SecurityResult<u64> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| !entry.is_expired(now));
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let store = MemorySessionStore::new();
        assert!(store.is_empty().await);

        store.set("s1", "k", json!({"a": 1})).await.unwrap();
        assert_eq!(store.get("s1", "k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.get("s2", "k").await.unwrap(), None);
        assert_eq!(store.keys("s1").await, vec!["k".to_string()]);

        store.remove("s1", "k").await.unwrap();
        assert_eq!(store.get("s1", "k").await.unwrap(), None);
        assert_eq!(store.len().await, 1);

        store.destroy("s1").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MemorySessionStore::new();
        let other = store.clone();
        other.set("s", "k", json!(1)).await.unwrap();
        assert_eq!(store.get("s", "k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_expired_sessions_are_hidden_and_cleaned() {
        let store = MemorySessionStore::new().with_ttl(Duration::milliseconds(-1));
        for i in 0..10 {
            store.set(&format!("s{i}"), "k", json!(i)).await.unwrap();
        }
        assert_eq!(store.get("s0", "k").await.unwrap(), None);
        assert!(store.keys("s0").await.is_empty());
        assert_eq!(store.len().await, 10);

        assert_eq!(store.cleanup_expired().await.unwrap(), 10);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_live_sessions() {
        let store = MemorySessionStore::new();
        store.set("live", "k", json!(1)).await.unwrap();
        assert_eq!(store.cleanup_expired().await.unwrap(), 0);
        assert_eq!(store.get("live", "k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_renew_moves_values() {
        let store = MemorySessionStore::new();
        store.set("old", "a", json!(1)).await.unwrap();
        store.set("old", "b", json!(2)).await.unwrap();

        store.renew("old", "new").await.unwrap();
        assert_eq!(store.get("old", "a").await.unwrap(), None);
        assert_eq!(store.get("new", "a").await.unwrap(), Some(json!(1)));
        assert_eq!(store.get("new", "b").await.unwrap(), Some(json!(2)));
        assert_eq!(store.len().await, 1);

        store.renew("unknown", "other").await.unwrap();
        assert_eq!(store.len().await, 1);
    }
}
