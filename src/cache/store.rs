use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{Cache, LruCache, PerpetualCache};
use crate::error::{Result, SqlMapperError};

/// Serializes commit-time publication against cache readers.
///
/// Readers of shared caches hold the read side; a commit holds the write side while
/// it applies every staged clear and write, so no reader observes part of a commit.
#[derive(Debug, Default)]
pub struct PublishGate {
    lock: RwLock<()>,
}

impl PublishGate {
    pub fn read(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The named caches of a configuration and their shared publish gate.
#[derive(Clone, Default)]
pub struct CacheStore {
    caches: BTreeMap<String, Arc<dyn Cache>>,
    gate: Arc<PublishGate>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("caches", &self.caches.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl CacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cache under its id.
    ///
    /// # Errors
    ///
    /// `ConfigError` if a cache with the same id exists.
    pub fn add(&mut self, cache: Arc<dyn Cache>) -> Result<()> {
        let id = cache.id().to_string();
        if self.caches.contains_key(&id) {
            return Err(SqlMapperError::ConfigError(format!(
                "cache `{id}` is already registered"
            )));
        }
        self.caches.insert(id, cache);
        Ok(())
    }

    /// Register an unbounded cache.
    ///
    /// # Errors
    ///
    /// As [`CacheStore::add`].
    pub fn add_perpetual(&mut self, id: impl Into<String>) -> Result<()> {
        self.add(Arc::new(PerpetualCache::new(id)))
    }

    /// Register a cache holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// As [`CacheStore::add`].
    pub fn add_lru(&mut self, id: impl Into<String>, capacity: usize) -> Result<()> {
        self.add(Arc::new(LruCache::new(
            Box::new(PerpetualCache::new(id)),
            capacity,
        )))
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Cache>> {
        self.caches.get(id)
    }

    #[must_use]
    pub fn caches(&self) -> &BTreeMap<String, Arc<dyn Cache>> {
        &self.caches
    }

    #[must_use]
    pub fn gate(&self) -> Arc<PublishGate> {
        self.gate.clone()
    }
}
