//! Second-level caches shared across units of work.
//!
//! A [`Cache`] is shared by every session; writes reach it only through a
//! [`TransactionalCacheManager`] at commit, under the [`CacheStore`] publish gate.

pub mod lru;
pub mod perpetual;
pub mod store;
pub mod transactional;

use std::sync::Arc;

use crate::executor::CacheKey;
use crate::types::Value;

pub use lru::LruCache;
pub use perpetual::PerpetualCache;
pub use store::{CacheStore, PublishGate};
pub use transactional::{TransactionalCache, TransactionalCacheManager};

/// A cached query result.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Rows(Arc<Vec<Value>>),
    /// An explicitly cached absence of rows.
    Null,
}

impl CachedValue {
    #[must_use]
    pub fn rows(rows: Vec<Value>) -> Self {
        CachedValue::Rows(Arc::new(rows))
    }

    /// The cached rows; a cached null reads as no rows.
    #[must_use]
    pub fn to_rows(&self) -> Vec<Value> {
        match self {
            CachedValue::Rows(rows) => rows.as_ref().clone(),
            CachedValue::Null => Vec::new(),
        }
    }
}

/// A keyed store of query results. Implementations synchronize internally.
pub trait Cache: Send + Sync {
    fn id(&self) -> &str;

    fn put(&self, key: CacheKey, value: CachedValue);

    fn get(&self, key: &CacheKey) -> Option<CachedValue>;

    fn remove(&self, key: &CacheKey) -> Option<CachedValue>;

    fn clear(&self);

    fn size(&self) -> usize;
}
