use std::{num::NonZeroUsize, path::PathBuf};

use bytes::Bytes;
use lru::LruCache;
use tracing::{event, Level};

use crate::request::Method;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    pub path: PathBuf,
}

/// Bounded LRU cache of serialized responses.
///
/// Entries are never invalidated when the file on disk changes, they only leave the cache by
/// being evicted.
pub struct ResponseCache {
    entries: LruCache<CacheKey, Bytes>,
    hits: u64,
    misses: u64,
}

impl ResponseCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up an entry, marking it as most recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<Bytes> {
        let result = self.entries.get(key).cloned();

        if result.is_some() {
            self.hits += 1;
            event!(Level::DEBUG, path = ?key.path, method = %key.method, "cache hit");
        } else {
            self.misses += 1;
            event!(Level::DEBUG, path = ?key.path, method = %key.method, "cache miss");
        }

        result
    }

    /// Store an entry, returning the key evicted to make room for it.
    pub fn insert(&mut self, key: CacheKey, value: Bytes) -> Option<CacheKey> {
        let (evicted, _) = self.entries.push(key.clone(), value)?;

        // Pushing an existing key hands back its old value instead of evicting
        if evicted == key {
            return None;
        }

        event!(Level::DEBUG, path = ?evicted.path, method = %evicted.method, "cache evicted");
        Some(evicted)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, path::PathBuf};

    use bytes::Bytes;

    use super::{CacheKey, ResponseCache};
    use crate::request::Method;

    fn key(method: Method, path: &str) -> CacheKey {
        CacheKey {
            method,
            path: PathBuf::from(path),
        }
    }

    fn given_cache(capacity: usize) -> ResponseCache {
        ResponseCache::new(NonZeroUsize::new(capacity).unwrap())
    }

    #[test]
    fn hit_returns_stored_bytes() {
        let mut cache = given_cache(2);
        cache.insert(key(Method::Get, "/a.html"), Bytes::from_static(b"a"));

        assert_eq!(
            cache.get(&key(Method::Get, "/a.html")),
            Some(Bytes::from_static(b"a"))
        );
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn method_is_part_of_key() {
        let mut cache = given_cache(2);
        cache.insert(key(Method::Get, "/a.html"), Bytes::from_static(b"a"));

        assert!(cache.get(&key(Method::Head, "/a.html")).is_none());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn overflow_evicts_least_recently_used() {
        let mut cache = given_cache(3);
        assert!(cache
            .insert(key(Method::Get, "/a"), Bytes::from_static(b"a"))
            .is_none());
        assert!(cache
            .insert(key(Method::Get, "/b"), Bytes::from_static(b"b"))
            .is_none());
        assert!(cache
            .insert(key(Method::Get, "/c"), Bytes::from_static(b"c"))
            .is_none());

        // Touch a, making b the least recently used
        assert!(cache.get(&key(Method::Get, "/a")).is_some());

        let evicted = cache.insert(key(Method::Get, "/d"), Bytes::from_static(b"d"));
        assert_eq!(evicted, Some(key(Method::Get, "/b")));
        assert_eq!(cache.len(), 3);

        assert!(cache.get(&key(Method::Get, "/b")).is_none());
        assert!(cache.get(&key(Method::Get, "/a")).is_some());
        assert!(cache.get(&key(Method::Get, "/c")).is_some());
        assert!(cache.get(&key(Method::Get, "/d")).is_some());
    }

    #[test]
    fn reinserting_key_does_not_evict() {
        let mut cache = given_cache(1);
        cache.insert(key(Method::Get, "/a"), Bytes::from_static(b"old"));

        let evicted = cache.insert(key(Method::Get, "/a"), Bytes::from_static(b"new"));
        assert!(evicted.is_none());
        assert_eq!(
            cache.get(&key(Method::Get, "/a")),
            Some(Bytes::from_static(b"new"))
        );
    }
}
