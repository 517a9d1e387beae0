//! The execution pipeline: executors, statement handlers and parameter binding.
//!
//! An [`Executor`] runs mapped statements inside one unit of work. It creates a
//! [`StatementHandler`] per operation, which prepares the driver statement, binds
//! parameters through a [`ParameterHandler`] and maps rows through a
//! [`crate::results::ResultSetHandler`].

pub mod base;
pub mod batch;
pub mod cache_key;
pub mod caching;
pub mod parameter;
pub mod reuse;
pub mod simple;
pub mod statement;

use std::sync::Arc;

use tracing::warn;

use crate::builder::BoundSql;
use crate::driver::Statement;
use crate::error::Result;
use crate::mapping::{MappedStatement, RowBounds};
use crate::plugin::Pluggable;
use crate::results::Cursor;
use crate::types::Value;

pub use base::{BaseExecutor, ExecutionContext, ExecutorStrategy};
pub use batch::{BATCH_UPDATE_RETURN_VALUE, BatchResult, BatchStrategy};
pub use cache_key::CacheKey;
pub use caching::CachingExecutor;
pub use parameter::{DefaultParameterHandler, ParameterHandler};
pub use reuse::ReuseStrategy;
pub use simple::SimpleStrategy;
pub use statement::{DefaultStatementHandler, StatementHandler};

pub type SimpleExecutor = BaseExecutor<SimpleStrategy>;
pub type ReuseExecutor = BaseExecutor<ReuseStrategy>;
pub type BatchExecutor = BaseExecutor<BatchStrategy>;

/// Runs mapped statements for one unit of work.
///
/// `query` compiles the statement and derives its cache key before delegating to
/// `query_with_key`, the method caches and interceptors usually hook.
#[allow(clippy::missing_errors_doc)]
pub trait Executor: Pluggable + Send {
    fn update(&mut self, statement: &Arc<MappedStatement>, parameter: &mut Value) -> Result<usize>;

    fn query(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Vec<Value>>;

    fn query_with_key(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Value>>;

    fn query_cursor(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Cursor>;

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>>;

    /// Flush pending work, then commit the transaction when `required`.
    fn commit(&mut self, required: bool) -> Result<()>;

    /// Discard pending work, then roll the transaction back when `required`.
    fn rollback(&mut self, required: bool) -> Result<()>;

    fn create_cache_key(
        &self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey>;

    fn is_cached(&self, statement: &Arc<MappedStatement>, key: &CacheKey) -> bool;

    fn clear_local_cache(&mut self);

    /// Release the transaction. Failures are logged, not returned.
    fn close(&mut self, force_rollback: bool);

    fn is_closed(&self) -> bool;
}

/// Close a statement, logging instead of failing.
pub(crate) fn close_quietly(statement: &mut dyn Statement) {
    if let Err(e) = statement.close() {
        warn!(sql = statement.sql(), error = %e, "closing statement failed");
    }
}

/// Run `f` against `statement` and close it afterwards on every path.
///
/// The error from `f` wins over a close failure.
pub(crate) fn with_statement<R>(
    mut statement: Box<dyn Statement>,
    f: impl FnOnce(&mut dyn Statement) -> Result<R>,
) -> Result<R> {
    let result = f(statement.as_mut());
    match (result, statement.close()) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(close_err)) => Err(close_err),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "closing statement after failure also failed");
            Err(e)
        }
    }
}
