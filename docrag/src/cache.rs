//! Bounded response cache keyed by query text and retrieved chunk set.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Identifies one answer: the exact query text plus the set of chunk ids it
/// was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    chunk_ids: BTreeSet<String>,
}

impl CacheKey {
    /// Build a key. Chunk order does not matter.
    pub fn new(query: impl Into<String>, chunk_ids: BTreeSet<String>) -> Self {
        Self { query: query.into(), chunk_ids }
    }
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that found nothing (or only an expired entry).
    pub misses: u64,
    /// Entries currently held.
    pub entries: usize,
}

struct Entry {
    answer: String,
    inserted: Instant,
    last_used: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Entry>,
    clock: u64,
    hits: u64,
    misses: u64,
}

/// Least-recently-used answer cache with an optional time-to-live.
///
/// Safe to share between concurrent requests. Contents live only as long as
/// the process. A capacity of zero disables caching entirely.
pub struct ResponseCache {
    capacity: usize,
    ttl: Option<Duration>,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    /// Create a cache holding at most `capacity` answers.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self { capacity, ttl, state: Mutex::new(CacheState::default()) }
    }

    /// Whether the cache stores anything at all.
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Look up an answer, refreshing its recency on a hit.
    pub async fn get(&self, key: &CacheKey) -> Option<String> {
        if !self.is_enabled() {
            return None;
        }
        let mut state = self.state.lock().await;
        state.clock += 1;
        let now = state.clock;

        let expired = match state.entries.get(key) {
            Some(entry) => self.ttl.is_some_and(|ttl| entry.inserted.elapsed() >= ttl),
            None => {
                state.misses += 1;
                return None;
            }
        };
        if expired {
            state.entries.remove(key);
            state.misses += 1;
            debug!("response cache entry expired");
            return None;
        }

        state.hits += 1;
        let entry = state.entries.get_mut(key)?;
        entry.last_used = now;
        Some(entry.answer.clone())
    }

    /// Store an answer, evicting the least recently used entry when full.
    pub async fn insert(&self, key: CacheKey, answer: String) {
        if !self.is_enabled() {
            return;
        }
        let mut state = self.state.lock().await;
        state.clock += 1;
        let now = state.clock;

        if !state.entries.contains_key(&key) && state.entries.len() >= self.capacity {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                state.entries.remove(&oldest);
                debug!(capacity = self.capacity, "evicted least recently used answer");
            }
        }
        state.entries.insert(key, Entry { answer, inserted: Instant::now(), last_used: now });
    }

    /// Drop every entry. Counters are kept.
    pub async fn clear(&self) {
        self.state.lock().await.entries.clear();
    }

    /// Current hit/miss counters and size.
    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats { hits: state.hits, misses: state.misses, entries: state.entries.len() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(query: &str, ids: &[&str]) -> CacheKey {
        CacheKey::new(query, ids.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn chunk_order_does_not_matter() {
        let cache = ResponseCache::new(4, None);
        cache.insert(key("q", &["a", "b"]), "answer".into()).await;
        assert_eq!(cache.get(&key("q", &["b", "a"])).await.as_deref(), Some("answer"));
        assert_eq!(cache.get(&key("q", &["a"])).await, None);
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = ResponseCache::new(2, None);
        cache.insert(key("one", &[]), "1".into()).await;
        cache.insert(key("two", &[]), "2".into()).await;
        assert!(cache.get(&key("one", &[])).await.is_some());
        cache.insert(key("three", &[]), "3".into()).await;

        assert!(cache.get(&key("one", &[])).await.is_some());
        assert!(cache.get(&key("two", &[])).await.is_none());
        assert!(cache.get(&key("three", &[])).await.is_some());
        assert_eq!(cache.stats().await.entries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = ResponseCache::new(2, Some(Duration::from_secs(60)));
        cache.insert(key("q", &[]), "a".into()).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.get(&key("q", &[])).await.is_some());
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(cache.get(&key("q", &[])).await.is_none());
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn zero_capacity_disables_cache() {
        let cache = ResponseCache::new(0, None);
        cache.insert(key("q", &[]), "a".into()).await;
        assert!(cache.get(&key("q", &[])).await.is_none());
        assert_eq!(cache.stats().await, CacheStats::default());
    }

    #[tokio::test]
    async fn clear_empties_the_cache() {
        let cache = ResponseCache::new(2, None);
        cache.insert(key("q", &[]), "a".into()).await;
        cache.clear().await;
        assert!(cache.get(&key("q", &[])).await.is_none());
    }
}
