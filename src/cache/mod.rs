//! The optional caching layer.
//!
//! Deterministic keys over canonical argument encodings, human-readable
//! TTLs, stale-while-revalidate with single-flight revalidation, and
//! mutation-driven invalidation. The backing store is injectable: an
//! in-process [`memory::MemoryCache`] ships here, KV-style backends
//! implement [`CacheDriver`].

pub mod key;
pub mod memory;
pub mod ttl;

pub use key::{cache_key, model_prefix, KEY_PREFIX, REVALIDATING_SUFFIX};
pub use memory::MemoryCache;
pub use ttl::{parse_ttl, TtlSpec};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use viborm_core::error::Result;
use viborm_core::parse::Record;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// TTL of the single-flight revalidation sentinel.
pub const REVALIDATING_TTL_MS: u64 = 30_000;

/// A cached operation result.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResult {
    Records(Vec<Record>),
    MaybeRecord(Option<Record>),
    Record(Record),
    Count(i64),
    Flag(bool),
}

/// One stored entry. `ttl_ms` is the authoring TTL: staleness is judged
/// against it, while storage retains entries for twice that long so SWR can
/// serve a stale hit while revalidating.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: CachedResult,
    pub created_at_ms: u64,
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(value: CachedResult, ttl_ms: u64) -> Self {
        Self {
            value,
            created_at_ms: now_ms(),
            ttl_ms,
        }
    }

    pub fn age_ms(&self) -> u64 {
        now_ms().saturating_sub(self.created_at_ms)
    }

    /// Older than the authoring TTL.
    pub fn is_stale(&self) -> bool {
        self.age_ms() > self.ttl_ms
    }

    /// Past the doubled storage TTL; never served.
    pub fn is_expired(&self) -> bool {
        self.age_ms() > self.storage_ttl_ms()
    }

    pub fn storage_ttl_ms(&self) -> u64 {
        self.ttl_ms.saturating_mul(2)
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// An injectable cache backend. Boxed futures keep the trait
/// object-safe for `Arc<dyn CacheDriver>` injection.
pub trait CacheDriver: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<CacheEntry>>>;
    fn set<'a>(&'a self, key: &'a str, entry: CacheEntry) -> BoxFuture<'a, Result<()>>;
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;
    /// Removes every entry whose key starts with `prefix`.
    fn clear_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<()>>;
    fn clear<'a>(&'a self) -> BoxFuture<'a, Result<()>>;
}

/// Per-call cache behavior, set via `with_cache`.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub ttl: TtlSpec,
    /// Serve stale entries immediately and revalidate in the background.
    pub swr: bool,
    /// Skip reads (the fresh result is still stored).
    pub bypass: bool,
    /// Full key override; derived from the arguments when absent.
    pub key: Option<String>,
    /// Extra keys (or `*`-suffixed prefixes) cleared after mutations, on top
    /// of the automatic model-prefix invalidation.
    pub invalidate: Vec<String>,
}

impl CacheOptions {
    pub fn ttl(ttl: impl Into<TtlSpec>) -> Self {
        Self {
            ttl: ttl.into(),
            swr: false,
            bypass: false,
            key: None,
            invalidate: Vec::new(),
        }
    }

    pub fn with_swr(mut self) -> Self {
        self.swr = true;
        self
    }

    pub fn with_bypass(mut self) -> Self {
        self.bypass = true;
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn invalidating(mut self, keys: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.invalidate = keys.into_iter().map(Into::into).collect();
        self
    }
}

/// The outcome of a cache probe.
pub(crate) enum CacheLookup {
    Fresh(CachedResult),
    /// Stale but servable under SWR; the caller launches revalidation.
    Stale(CachedResult),
    Miss,
}

/// Cache plumbing shared by the client: probes, stores, sentinel claims,
/// invalidation.
#[derive(Clone)]
pub(crate) struct CacheLayer {
    pub driver: Arc<dyn CacheDriver>,
    pub version: Option<u32>,
}

impl CacheLayer {
    pub async fn probe(&self, key: &str, swr: bool) -> Result<CacheLookup> {
        let Some(entry) = self.driver.get(key).await? else {
            return Ok(CacheLookup::Miss);
        };
        if entry.is_expired() {
            return Ok(CacheLookup::Miss);
        }
        if !entry.is_stale() {
            return Ok(CacheLookup::Fresh(entry.value));
        }
        if swr {
            return Ok(CacheLookup::Stale(entry.value));
        }
        Ok(CacheLookup::Miss)
    }

    pub async fn store(&self, key: &str, value: CachedResult, ttl_ms: u64) -> Result<()> {
        self.driver.set(key, CacheEntry::new(value, ttl_ms)).await
    }

    /// Claims the revalidation sentinel. Returns false when another caller
    /// already holds it, so only one revalidation runs per key.
    pub async fn try_claim_revalidation(&self, key: &str) -> Result<bool> {
        let sentinel = format!("{key}{REVALIDATING_SUFFIX}");
        if let Some(entry) = self.driver.get(&sentinel).await? {
            if !entry.is_stale() {
                return Ok(false);
            }
        }
        self.driver
            .set(
                &sentinel,
                CacheEntry::new(CachedResult::Flag(true), REVALIDATING_TTL_MS),
            )
            .await?;
        Ok(true)
    }

    pub async fn clear_revalidation(&self, key: &str) -> Result<()> {
        self.driver
            .delete(&format!("{key}{REVALIDATING_SUFFIX}"))
            .await
    }

    /// Auto-invalidation after a mutation: drops every cached read of the
    /// model.
    pub async fn invalidate_model(&self, model: &str) -> Result<()> {
        self.driver
            .clear_prefix(&model_prefix(self.version, model))
            .await
    }

    /// Caller-directed invalidation: full keys, or prefixes marked with a
    /// trailing `*`.
    pub async fn invalidate_keys(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            match key.strip_suffix('*') {
                Some(prefix) => self.driver.clear_prefix(prefix).await?,
                None => self.driver.delete(key).await?,
            }
        }
        Ok(())
    }
}
