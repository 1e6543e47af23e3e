//! In-process cache backend.

use super::{BoxFuture, CacheDriver, CacheEntry};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use viborm_core::error::Result;

/// A guarded in-memory map. Every entry gets an expiry task that removes it
/// once the storage TTL passes; expired entries are also dropped on read, so
/// correctness never depends on the timer having fired.
#[derive(Default, Clone)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries; test and debugging aid.
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries.values().filter(|entry| !entry.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl CacheDriver for MemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            match entries.get(key) {
                Some(entry) if entry.is_expired() => {
                    entries.remove(key);
                    Ok(None)
                }
                Some(entry) => Ok(Some(entry.clone())),
                None => Ok(None),
            }
        })
    }

    fn set<'a>(&'a self, key: &'a str, entry: CacheEntry) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let storage_ttl = entry.storage_ttl_ms();
            let stamp = entry.created_at_ms;
            {
                let mut entries = self.entries.lock().await;
                entries.insert(key.to_string(), entry);
            }

            // Expiry task; a newer write is detected by timestamp and left
            // alone.
            let map = Arc::clone(&self.entries);
            let owned_key = key.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(storage_ttl)).await;
                let mut entries = map.lock().await;
                if let Some(current) = entries.get(&owned_key) {
                    if current.created_at_ms == stamp {
                        entries.remove(&owned_key);
                    }
                }
            });
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            entries.remove(key);
            Ok(())
        })
    }

    fn clear_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            entries.retain(|key, _| !key.starts_with(prefix));
            Ok(())
        })
    }

    fn clear<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut entries = self.entries.lock().await;
            entries.clear();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedResult;

    #[tokio::test]
    async fn set_get_roundtrip_and_prefix_clear() {
        let cache = MemoryCache::new();
        cache
            .set("viborm:user:find_many:aa", CacheEntry::new(CachedResult::Count(1), 60_000))
            .await
            .unwrap();
        cache
            .set("viborm:post:find_many:bb", CacheEntry::new(CachedResult::Count(2), 60_000))
            .await
            .unwrap();

        let hit = cache.get("viborm:user:find_many:aa").await.unwrap();
        assert!(matches!(hit.unwrap().value, CachedResult::Count(1)));

        cache.clear_prefix("viborm:user:").await.unwrap();
        assert!(cache.get("viborm:user:find_many:aa").await.unwrap().is_none());
        assert!(cache.get("viborm:post:find_many:bb").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn entries_expire_at_double_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("k", CacheEntry::new(CachedResult::Flag(true), 30))
            .await
            .unwrap();

        // Past the authoring TTL but within the doubled storage window the
        // entry survives, flagged stale.
        tokio::time::sleep(Duration::from_millis(45)).await;
        let entry = cache.get("k").await.unwrap();
        assert!(entry.is_some());
        assert!(entry.unwrap().is_stale());

        // Past the storage window it is gone.
        tokio::time::sleep(Duration::from_millis(45)).await;
        assert!(cache.get("k").await.unwrap().is_none());
    }
}
