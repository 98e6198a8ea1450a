//! Process-scoped TTL cache.
//!
//! Injected into handlers instead of living in module-level statics, so
//! tests can swap it out and a cache miss is always safe (just slower).
//! Expired entries are dropped lazily on lookup.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, (V, Instant)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a value; `None` for absent or expired entries.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().expect("cache lock poisoned");
            match entries.get(key) {
                Some((value, expires_at)) if *expires_at > now => return Some(value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Entry expired; drop it under the write lock.
        let mut entries = self.entries.write().expect("cache lock poisoned");
        if let Some((_, expires_at)) = entries.get(key) {
            if *expires_at <= now {
                entries.remove(key);
            }
        }
        None
    }

    pub fn put(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.insert(key.into(), (value, Instant::now() + ttl));
    }

    pub fn invalidate(&self, key: &str) {
        let mut entries = self.entries.write().expect("cache lock poisoned");
        entries.remove(key);
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_returns_stored_value() {
        let cache = TtlCache::new();
        cache.put("k", 42u32, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(42));
    }

    #[test]
    fn missing_key_is_none() {
        let cache: TtlCache<u32> = TtlCache::new();
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn expired_entry_is_dropped() {
        let cache = TtlCache::new();
        cache.put("k", 1u32, Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = TtlCache::new();
        cache.put("k", 1u32, Duration::from_secs(60));
        cache.invalidate("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn put_overwrites_existing_value() {
        let cache = TtlCache::new();
        cache.put("k", 1u32, Duration::from_secs(60));
        cache.put("k", 2u32, Duration::from_secs(60));
        assert_eq!(cache.get("k"), Some(2));
    }
}
