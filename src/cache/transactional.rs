use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use super::{Cache, CachedValue, PublishGate};
use crate::executor::CacheKey;

/// Pending writes for one shared cache within one unit of work.
///
/// Reads see this unit's own staged entries first. After [`TransactionalCache::clear`]
/// the shared cache is treated as empty until commit.
pub struct TransactionalCache {
    delegate: Arc<dyn Cache>,
    clear_on_commit: bool,
    entries_to_add: HashMap<CacheKey, CachedValue>,
}

impl TransactionalCache {
    #[must_use]
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            clear_on_commit: false,
            entries_to_add: HashMap::new(),
        }
    }

    pub fn get(&self, gate: &PublishGate, key: &CacheKey) -> Option<CachedValue> {
        if let Some(staged) = self.entries_to_add.get(key) {
            return Some(staged.clone());
        }
        if self.clear_on_commit {
            return None;
        }
        let _read = gate.read();
        self.delegate.get(key)
    }

    pub fn put(&mut self, key: CacheKey, value: CachedValue) {
        self.entries_to_add.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add.clear();
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.clear_on_commit || !self.entries_to_add.is_empty()
    }

    /// Apply the pending clear and writes. The caller holds the publish gate.
    fn publish(&mut self) {
        if self.clear_on_commit {
            self.delegate.clear();
        }
        let staged = self.entries_to_add.len();
        for (key, value) in self.entries_to_add.drain() {
            self.delegate.put(key, value);
        }
        debug!(
            cache = self.delegate.id(),
            staged,
            cleared = self.clear_on_commit,
            "published cache writes"
        );
        self.clear_on_commit = false;
    }

    fn reset(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add.clear();
    }
}

/// The [`TransactionalCache`]s touched by one unit of work, by cache id.
pub struct TransactionalCacheManager {
    gate: Arc<PublishGate>,
    caches: BTreeMap<String, TransactionalCache>,
}

impl std::fmt::Debug for TransactionalCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionalCacheManager")
            .field("caches", &self.caches.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl TransactionalCacheManager {
    #[must_use]
    pub fn new(gate: Arc<PublishGate>) -> Self {
        Self {
            gate,
            caches: BTreeMap::new(),
        }
    }

    fn transactional(&mut self, cache: &Arc<dyn Cache>) -> &mut TransactionalCache {
        self.caches
            .entry(cache.id().to_string())
            .or_insert_with(|| TransactionalCache::new(cache.clone()))
    }

    pub fn clear(&mut self, cache: &Arc<dyn Cache>) {
        self.transactional(cache).clear();
    }

    pub fn get(&mut self, cache: &Arc<dyn Cache>, key: &CacheKey) -> Option<CachedValue> {
        let gate = self.gate.clone();
        self.transactional(cache).get(&gate, key)
    }

    pub fn put(&mut self, cache: &Arc<dyn Cache>, key: CacheKey, value: CachedValue) {
        self.transactional(cache).put(key, value);
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.caches.values().any(TransactionalCache::has_pending)
    }

    /// Publish every staged write and clear in one step.
    pub fn commit(&mut self) {
        if !self.has_pending() {
            return;
        }
        let _write = self.gate.write();
        for cache in self.caches.values_mut() {
            cache.publish();
        }
    }

    /// Drop every staged write and clear.
    pub fn rollback(&mut self) {
        for cache in self.caches.values_mut() {
            cache.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;
    use crate::types::Value;

    fn setup() -> (Arc<dyn Cache>, Arc<PublishGate>) {
        (
            Arc::new(PerpetualCache::new("blog")),
            Arc::new(PublishGate::default()),
        )
    }

    #[test]
    fn staged_writes_publish_on_commit() {
        let (cache, gate) = setup();
        let mut a = TransactionalCacheManager::new(gate.clone());
        let mut b = TransactionalCacheManager::new(gate);
        let key = CacheKey::from_parts(["k"]);
        a.put(&cache, key.clone(), CachedValue::rows(vec![Value::Int(1)]));
        assert!(a.get(&cache, &key).is_some());
        assert!(b.get(&cache, &key).is_none());
        assert_eq!(cache.size(), 0);
        a.commit();
        assert_eq!(cache.size(), 1);
        assert!(b.get(&cache, &key).is_some());
    }

    #[test]
    fn rollback_discards_writes_and_clears() {
        let (cache, gate) = setup();
        let key = CacheKey::from_parts(["k"]);
        cache.put(key.clone(), CachedValue::Null);
        let mut tx = TransactionalCacheManager::new(gate);
        tx.clear(&cache);
        tx.put(&cache, CacheKey::from_parts(["other"]), CachedValue::Null);
        assert!(tx.get(&cache, &key).is_none());
        tx.rollback();
        assert_eq!(cache.size(), 1);
        assert!(tx.get(&cache, &key).is_some());
    }

    #[test]
    fn commit_applies_clear_before_writes() {
        let (cache, gate) = setup();
        cache.put(CacheKey::from_parts(["old"]), CachedValue::Null);
        let mut tx = TransactionalCacheManager::new(gate);
        tx.clear(&cache);
        tx.put(&cache, CacheKey::from_parts(["new"]), CachedValue::Null);
        tx.commit();
        assert_eq!(cache.size(), 1);
        assert!(cache.get(&CacheKey::from_parts(["new"])).is_some());
    }
}
