//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::builder::BoundSql;
pub use crate::cache::{Cache, LruCache, PerpetualCache};
pub use crate::driver::{DataSource, ManagedTransaction, Transaction};
pub use crate::error::{Result, SqlMapperError};
pub use crate::executor::{BatchResult, CacheKey, Executor};
pub use crate::mapping::{KeyGenerator, MappedStatementBuilder, RowBounds, StatementType};
pub use crate::plugin::{
    Args, Capability, Interceptor, Invocation, Outcome, Signature,
};
pub use crate::results::{Cursor, ResultContext, ResultHandler, RowMapper};
pub use crate::scripting::SqlNode;
pub use crate::session::{
    Configuration, ConfigurationBuilder, ExecutorType, LocalCacheScope, Mapper, Settings, SqlSession,
    SqlSessionFactory,
};
pub use crate::translation::PlaceholderStyle;
pub use crate::types::{JdbcType, ParameterMode, Record, Value, ValueType};

#[cfg(feature = "sqlite")]
pub use crate::sqlite::{SqliteDataSource, SqliteOptions, SqliteOptionsBuilder};
