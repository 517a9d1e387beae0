use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Cache, CachedValue};
use crate::executor::CacheKey;

/// An unbounded map-backed cache.
#[derive(Debug)]
pub struct PerpetualCache {
    id: String,
    entries: RwLock<HashMap<CacheKey, CachedValue>>,
}

impl PerpetualCache {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    // A panic while holding the lock cannot leave the map half-updated.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<CacheKey, CachedValue>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<CacheKey, CachedValue>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn put(&self, key: CacheKey, value: CachedValue) {
        self.write().insert(key, value);
    }

    fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        self.read().get(key).cloned()
    }

    fn remove(&self, key: &CacheKey) -> Option<CachedValue> {
        self.write().remove(key)
    }

    fn clear(&self) {
        self.write().clear();
    }

    fn size(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    #[test]
    fn put_get_remove_clear() {
        let cache = PerpetualCache::new("c");
        let key = CacheKey::from_parts(["a"]);
        cache.put(key.clone(), CachedValue::rows(vec![Value::Int(1)]));
        cache.put(CacheKey::from_parts(["b"]), CachedValue::Null);
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get(&key), Some(CachedValue::rows(vec![Value::Int(1)])));
        assert!(cache.remove(&key).is_some());
        cache.clear();
        assert_eq!(cache.size(), 0);
    }
}
