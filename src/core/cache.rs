use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::types::ResolutionDetails;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    flag_key: String,
    fingerprint: String,
}

struct CacheEntry {
    details: ResolutionDetails,
    last_used: u64,
}

struct Inner {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    max_size: usize,
    // Monotonic access counter; drives a deterministic LRU order.
    tick: AtomicU64,
}

/// Bounded store of previously resolved flag values, keyed by
/// `(flag key, context fingerprint)`.
///
/// The resolver only writes entries whose reason was `STATIC` at resolution
/// time, so at most one fingerprint per flag key exists in practice; the
/// invalidation interface still removes across all fingerprints. None of the
/// operations can fail: a full store evicts the least recently used entry
/// instead of erroring. Handles are cheap clones sharing one store.
#[derive(Clone)]
pub struct ResolutionCache {
    inner: Arc<Inner>,
}

impl ResolutionCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(HashMap::new()),
                max_size,
                tick: AtomicU64::new(0),
            }),
        }
    }

    /// Looks up an entry and touches its recency.
    pub fn get(&self, flag_key: &str, fingerprint: &str) -> Option<ResolutionDetails> {
        let key = CacheKey {
            flag_key: flag_key.to_string(),
            fingerprint: fingerprint.to_string(),
        };

        let mut entries = self.inner.entries.write();
        let entry = entries.get_mut(&key)?;
        entry.last_used = self.inner.tick.fetch_add(1, Ordering::Relaxed);
        Some(entry.details.clone())
    }

    /// Inserts or overwrites; evicts the least recently used entry when the
    /// bound is exceeded.
    pub fn put(&self, flag_key: &str, fingerprint: &str, details: ResolutionDetails) {
        let key = CacheKey {
            flag_key: flag_key.to_string(),
            fingerprint: fingerprint.to_string(),
        };

        let mut entries = self.inner.entries.write();
        entries.insert(
            key,
            CacheEntry {
                details,
                last_used: self.inner.tick.fetch_add(1, Ordering::Relaxed),
            },
        );

        while entries.len() > self.inner.max_size {
            let lru_key = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(k, _)| k.clone());

            match lru_key {
                Some(key) => {
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Removes every entry for the named flag keys, across all context
    /// fingerprints. Unnamed flags stay cache-warm.
    pub fn invalidate<S: AsRef<str>>(&self, flag_keys: &[S]) {
        if flag_keys.is_empty() {
            return;
        }

        let mut entries = self.inner.entries.write();
        entries.retain(|key, _| !flag_keys.iter().any(|k| k.as_ref() == key.flag_key));
    }

    pub fn clear(&self) {
        self.inner.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FlagValue, ResolutionReason};

    fn details(flag_key: &str, value: bool) -> ResolutionDetails {
        ResolutionDetails::new(flag_key, FlagValue::Bool(value), ResolutionReason::Static)
    }

    #[test]
    fn test_put_and_get() {
        let cache = ResolutionCache::new(10);
        cache.put("flag-a", "fp1", details("flag-a", true));

        let hit = cache.get("flag-a", "fp1").unwrap();
        assert_eq!(hit.value.as_bool(), Some(true));
    }

    #[test]
    fn test_miss_on_different_fingerprint() {
        let cache = ResolutionCache::new(10);
        cache.put("flag-a", "fp1", details("flag-a", true));

        assert!(cache.get("flag-a", "fp2").is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = ResolutionCache::new(10);
        cache.put("flag-a", "fp1", details("flag-a", true));
        cache.put("flag-a", "fp1", details("flag-a", false));

        let hit = cache.get("flag-a", "fp1").unwrap();
        assert_eq!(hit.value.as_bool(), Some(false));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_is_selective() {
        let cache = ResolutionCache::new(10);
        cache.put("flag-a", "fp1", details("flag-a", true));
        cache.put("flag-b", "fp1", details("flag-b", true));

        cache.invalidate(&["flag-a"]);

        assert!(cache.get("flag-a", "fp1").is_none());
        assert!(cache.get("flag-b", "fp1").is_some());
    }

    #[test]
    fn test_invalidate_spans_fingerprints() {
        let cache = ResolutionCache::new(10);
        cache.put("flag-a", "fp1", details("flag-a", true));
        cache.put("flag-a", "fp2", details("flag-a", true));

        cache.invalidate(&["flag-a"]);

        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_removes_everything() {
        let cache = ResolutionCache::new(10);
        cache.put("flag-a", "fp1", details("flag-a", true));
        cache.put("flag-b", "fp1", details("flag-b", true));

        cache.clear();

        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction_order() {
        let cache = ResolutionCache::new(2);
        cache.put("flag-a", "fp", details("flag-a", true));
        cache.put("flag-b", "fp", details("flag-b", true));

        // Touch A so B becomes least recently used.
        cache.get("flag-a", "fp");
        cache.put("flag-c", "fp", details("flag-c", true));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("flag-a", "fp").is_some());
        assert!(cache.get("flag-b", "fp").is_none());
        assert!(cache.get("flag-c", "fp").is_some());
    }

    #[test]
    fn test_capacity_bound_holds() {
        let cache = ResolutionCache::new(3);
        for i in 0..10 {
            let key = format!("flag-{}", i);
            cache.put(&key, "fp", details(&key, true));
        }

        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_shared_handles_see_same_store() {
        let cache = ResolutionCache::new(10);
        let other = cache.clone();

        cache.put("flag-a", "fp", details("flag-a", true));

        assert!(other.get("flag-a", "fp").is_some());
        other.clear();
        assert!(cache.is_empty());
    }
}
