//! In-process TTL cache for generation deduplication
//!
//! Identical generation requests triggered close together (overlapping
//! schedules, a manual run racing a scheduled one) should hit the provider
//! only once. The cache is a bounded map with per-entry expiry:
//!
//! - lazy expiry: `get` checks the deadline and removes a stale entry in
//!   place; there is no background sweep task
//! - LRU eviction: inserting beyond `maxsize` evicts the least-recently-used
//!   live entry
//! - a single mutex guards all reads and writes, since the scheduler and a
//!   manual run may generate concurrently

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default maximum entry count (CACHE_MAXSIZE).
pub const DEFAULT_MAXSIZE: usize = 256;

/// Default entry TTL in seconds (CACHE_TTL).
pub const DEFAULT_TTL_SECS: u64 = 600;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_used: u64,
}

#[derive(Debug)]
struct Inner<K, V> {
    map: HashMap<K, Entry<V>>,
    // monotonic recency counter; bumped on every get/put touch
    tick: u64,
}

/// Bounded key-value cache with per-entry TTL and LRU eviction.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    maxsize: usize,
    ttl: Duration,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    /// Create a cache with the given capacity and TTL.
    pub fn new(maxsize: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                tick: 0,
            }),
            maxsize: maxsize.max(1),
            ttl,
        }
    }

    /// Look up a key, returning a clone of the cached value.
    ///
    /// An expired entry is removed in place and reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        let expired = match inner.map.get(key) {
            Some(entry) => entry.expires_at <= Instant::now(),
            None => return None,
        };

        if expired {
            inner.map.remove(key);
            return None;
        }

        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.map.get_mut(key).expect("entry checked above");
        entry.last_used = tick;
        Some(entry.value.clone())
    }

    /// Insert a value with the configured TTL.
    ///
    /// Replaces an existing entry for the same key wholesale. When the cache
    /// is full, expired entries are dropped first, then the least-recently-
    /// used live entry is evicted.
    pub fn put(&self, key: K, value: V) {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("cache lock poisoned");

        if !inner.map.contains_key(&key) && inner.map.len() >= self.maxsize {
            inner.map.retain(|_, e| e.expires_at > now);
            if inner.map.len() >= self.maxsize {
                if let Some(lru) = inner
                    .map
                    .iter()
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(k, _)| k.clone())
                {
                    inner.map.remove(&lru);
                }
            }
        }

        inner.tick += 1;
        let tick = inner.tick;
        inner.map.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
                last_used: tick,
            },
        );
    }

    /// Number of entries currently stored, including not-yet-collected
    /// expired ones.
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").map.len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derive the deduplication key for a generation request.
///
/// Two requests share a key iff provider, model, temperature and the full
/// rendered prompt all match.
pub fn request_key(provider: &str, model: &str, temperature: f32, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update([0]);
    hasher.update(model.as_bytes());
    hasher.update([0]);
    hasher.update(temperature.to_le_bytes());
    hasher.update([0]);
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_get_after_put_within_ttl() {
        let cache = TtlCache::new(8, Duration::from_secs(60));
        cache.put("k", 42);
        assert_eq!(cache.get(&"k"), Some(42));
    }

    #[test]
    fn test_get_absent() {
        let cache: TtlCache<&str, i32> = TtlCache::new(8, Duration::from_secs(60));
        assert_eq!(cache.get(&"missing"), None);
    }

    #[test]
    fn test_expired_entry_is_absent_and_collected() {
        let cache = TtlCache::new(8, Duration::from_millis(30));
        cache.put("k", 1);
        thread::sleep(Duration::from_millis(60));

        assert_eq!(cache.get(&"k"), None);
        // lazy expiry removed the entry in place
        assert!(cache.is_empty());
    }

    #[test]
    fn test_lru_eviction_beyond_maxsize() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("b", 2);

        // touch "a" so "b" becomes least recently used
        assert_eq!(cache.get(&"a"), Some(1));

        cache.put("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_put_existing_key_replaces_without_eviction() {
        let cache = TtlCache::new(2, Duration::from_secs(60));
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("a", 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), Some(10));
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn test_expired_entries_evicted_before_live_ones() {
        let cache = TtlCache::new(2, Duration::from_millis(30));
        cache.put("old", 1);
        thread::sleep(Duration::from_millis(60));

        // "old" is expired; inserting two fresh entries should drop it
        // rather than evict a live entry
        cache.put("x", 2);
        cache.put("y", 3);

        assert_eq!(cache.get(&"x"), Some(2));
        assert_eq!(cache.get(&"y"), Some(3));
    }

    #[test]
    fn test_concurrent_access_under_one_lock() {
        let cache = Arc::new(TtlCache::new(64, Duration::from_secs(60)));
        let mut handles = Vec::new();

        for t in 0..4u32 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..50u32 {
                    cache.put(t * 100 + i, i);
                    let _ = cache.get(&(t * 100 + i));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(cache.len() <= 64);
    }

    #[test]
    fn test_request_key_is_deterministic() {
        let a = request_key("openai", "gpt-4o", 0.7, "write about rust");
        let b = request_key("openai", "gpt-4o", 0.7, "write about rust");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // SHA256 hex
    }

    #[test]
    fn test_request_key_varies_by_component() {
        let base = request_key("openai", "gpt-4o", 0.7, "idea");
        assert_ne!(base, request_key("yandex", "gpt-4o", 0.7, "idea"));
        assert_ne!(base, request_key("openai", "gpt-4o-mini", 0.7, "idea"));
        assert_ne!(base, request_key("openai", "gpt-4o", 0.6, "idea"));
        assert_ne!(base, request_key("openai", "gpt-4o", 0.7, "other idea"));
    }
}
