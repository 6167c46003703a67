//! In-process cache for derived forum values.
//!
//! Counts and subscriber lists are read on almost every request but change
//! only on writes, so they are cached under well-known keys and explicitly
//! invalidated by the handlers that mutate them. Entries also expire after a
//! TTL so a missed invalidation heals itself.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Cache key builders. One function per cached value.
pub mod keys {
    #[must_use]
    pub fn user_post_count(user_id: i64) -> String {
        format!("users_{user_id}_forum_post_count")
    }

    #[must_use]
    pub fn user_thread_count(user_id: i64) -> String {
        format!("users_{user_id}_forum_thread_count")
    }

    #[must_use]
    pub fn forum_thread_count(forum_id: i64) -> String {
        format!("forums_{forum_id}_thread_count")
    }

    #[must_use]
    pub fn thread_post_count(thread_id: i64) -> String {
        format!("forums_threads_{thread_id}_post_count")
    }

    #[must_use]
    pub fn thread_subscribers(thread_id: i64) -> String {
        format!("forums_threads_subscriptions_{thread_id}_users")
    }

    #[must_use]
    pub fn forum_subscribers(forum_id: i64) -> String {
        format!("forums_forums_subscriptions_{forum_id}_users")
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    stored_at: Instant,
}

/// TTL cache of JSON-encoded values keyed by string.
#[derive(Debug)]
pub struct Cache {
    entries: RwLock<HashMap<String, Entry>>,
    ttl: Duration,
}

impl Cache {
    /// Create a new cache with the given TTL.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Get a live value, if present and decodable as `T`.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        if entry.stored_at.elapsed() >= self.ttl {
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let Ok(value) = serde_json::to_value(value) else {
            return;
        };
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn delete(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(key).is_some() {
            debug!(key, "Cache key invalidated");
        }
    }

    pub fn delete_many<I, K>(&self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<str>,
    {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            entries.remove(key.as_ref());
        }
    }

    /// Return the cached value or compute, store, and return it.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = load().await?;
        self.set(key, &value);
        Ok(value)
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300)) // 5 minute TTL
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_delete() {
        let cache = Cache::default();
        cache.set("a", &5_i64);
        assert_eq!(cache.get::<i64>("a"), Some(5));

        cache.delete("a");
        assert_eq!(cache.get::<i64>("a"), None);
    }

    #[test]
    fn test_expired_entries_are_misses() {
        let cache = Cache::new(Duration::from_millis(1));
        cache.set("a", &vec![1_i64, 2]);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get::<Vec<i64>>("a"), None);
    }

    #[test]
    fn test_wrong_type_is_a_miss() {
        let cache = Cache::default();
        cache.set("a", &"text");
        assert_eq!(cache.get::<i64>("a"), None);
    }

    #[test]
    fn test_delete_many() {
        let cache = Cache::default();
        cache.set(&keys::thread_post_count(1), &3_i64);
        cache.set(&keys::thread_post_count(2), &4_i64);
        cache.delete_many([keys::thread_post_count(1), keys::thread_post_count(2)]);
        assert_eq!(cache.get::<i64>(&keys::thread_post_count(1)), None);
        assert_eq!(cache.get::<i64>(&keys::thread_post_count(2)), None);
    }

    #[tokio::test]
    async fn test_get_or_load_only_loads_once() {
        let cache = Cache::default();
        let first: i64 = cache.get_or_load("k", || async { Ok(10_i64) }).await.unwrap();
        let second: i64 = cache
            .get_or_load("k", || async { anyhow::bail!("should not load") })
            .await
            .unwrap();
        assert_eq!(first, 10);
        assert_eq!(second, 10);
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(keys::user_post_count(3), "users_3_forum_post_count");
        assert_eq!(keys::thread_subscribers(9), "forums_threads_subscriptions_9_users");
    }
}
