use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use super::{Cache, CachedValue};
use crate::executor::CacheKey;

#[derive(Debug, Default)]
struct Recency {
    tick: u64,
    by_key: HashMap<CacheKey, u64>,
    by_tick: BTreeMap<u64, CacheKey>,
}

impl Recency {
    /// Mark `key` most recently used.
    fn touch(&mut self, key: &CacheKey) {
        self.tick += 1;
        if let Some(old) = self.by_key.insert(key.clone(), self.tick) {
            self.by_tick.remove(&old);
        }
        self.by_tick.insert(self.tick, key.clone());
    }

    fn forget(&mut self, key: &CacheKey) {
        if let Some(old) = self.by_key.remove(key) {
            self.by_tick.remove(&old);
        }
    }

    fn pop_eldest(&mut self) -> Option<CacheKey> {
        let (_, key) = self.by_tick.pop_first()?;
        self.by_key.remove(&key);
        Some(key)
    }
}

/// Evicts the least recently used entry once `capacity` is exceeded.
pub struct LruCache {
    delegate: Box<dyn Cache>,
    capacity: usize,
    recency: Mutex<Recency>,
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("id", &self.delegate.id())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl LruCache {
    #[must_use]
    pub fn new(delegate: Box<dyn Cache>, capacity: usize) -> Self {
        Self {
            delegate,
            capacity: capacity.max(1),
            recency: Mutex::new(Recency::default()),
        }
    }
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn put(&self, key: CacheKey, value: CachedValue) {
        let mut recency = self.recency.lock().unwrap_or_else(PoisonError::into_inner);
        recency.touch(&key);
        self.delegate.put(key, value);
        while recency.by_key.len() > self.capacity {
            match recency.pop_eldest() {
                Some(eldest) => {
                    self.delegate.remove(&eldest);
                }
                None => break,
            }
        }
    }

    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let mut recency = self.recency.lock().unwrap_or_else(PoisonError::into_inner);
        let value = self.delegate.get(key);
        if value.is_some() {
            recency.touch(key);
        }
        value
    }

    fn remove(&self, key: &CacheKey) -> Option<CachedValue> {
        let mut recency = self.recency.lock().unwrap_or_else(PoisonError::into_inner);
        recency.forget(key);
        self.delegate.remove(key)
    }

    fn clear(&self) {
        let mut recency = self.recency.lock().unwrap_or_else(PoisonError::into_inner);
        *recency = Recency::default();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;

    #[test]
    fn evicts_least_recently_used() {
        let cache = LruCache::new(Box::new(PerpetualCache::new("lru")), 2);
        let (a, b, c) = (
            CacheKey::from_parts(["a"]),
            CacheKey::from_parts(["b"]),
            CacheKey::from_parts(["c"]),
        );
        cache.put(a.clone(), CachedValue::Null);
        cache.put(b.clone(), CachedValue::Null);
        assert!(cache.get(&a).is_some());
        cache.put(c.clone(), CachedValue::Null);
        assert_eq!(cache.size(), 2);
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&c).is_some());
    }
}
