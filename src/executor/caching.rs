use std::sync::Arc;

use tracing::debug;

use super::batch::BatchResult;
use super::cache_key::CacheKey;
use super::Executor;
use crate::builder::BoundSql;
use crate::cache::{CachedValue, TransactionalCacheManager};
use crate::error::{Result, SqlMapperError};
use crate::mapping::{MappedStatement, RowBounds, StatementType};
use crate::plugin::{Capability, Pluggable};
use crate::results::Cursor;
use crate::session::Configuration;
use crate::types::Value;

/// Second-level caching in front of another executor.
///
/// Reads see committed entries plus this unit of work's own staged writes.
/// Staged writes and clears reach the shared caches only on commit.
pub struct CachingExecutor {
    delegate: Box<dyn Executor>,
    configuration: Arc<Configuration>,
    tcm: TransactionalCacheManager,
}

impl std::fmt::Debug for CachingExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingExecutor")
            .field("tcm", &self.tcm)
            .finish_non_exhaustive()
    }
}

impl CachingExecutor {
    #[must_use]
    pub fn new(delegate: Box<dyn Executor>, configuration: Arc<Configuration>) -> Self {
        let tcm = TransactionalCacheManager::new(configuration.cache_gate());
        Self {
            delegate,
            configuration,
            tcm,
        }
    }

    fn flush_cache_if_required(&mut self, statement: &MappedStatement) {
        if let Some(cache) = &statement.cache
            && statement.flush_cache_required
        {
            debug!(cache = cache.id(), statement = %statement.id, "clearing cache");
            self.tcm.clear(cache);
        }
    }
}

/// Callable statements with OUT parameters cannot be served from the cache.
fn ensure_no_out_params(statement: &MappedStatement, bound_sql: &BoundSql) -> Result<()> {
    if statement.statement_type != StatementType::Callable {
        return Ok(());
    }
    if bound_sql
        .parameter_mappings()
        .iter()
        .any(|mapping| mapping.mode.is_output())
    {
        return Err(SqlMapperError::CacheError(format!(
            "Caching stored procedures with OUT params is not supported. \
             Please configure use_cache=false in `{}`.",
            statement.id
        )));
    }
    Ok(())
}

impl Pluggable for CachingExecutor {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Executor]
    }
}

impl Executor for CachingExecutor {
    fn update(&mut self, statement: &Arc<MappedStatement>, parameter: &mut Value) -> Result<usize> {
        self.flush_cache_if_required(statement);
        self.delegate.update(statement, parameter)
    }

    fn query(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        let bound_sql = statement.bound_sql(parameter, &self.configuration.compile_env())?;
        let key = self.create_cache_key(statement, parameter, bounds, &bound_sql)?;
        self.query_with_key(statement, parameter, bounds, &key, &bound_sql)
    }

    fn query_with_key(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Value>> {
        let Some(cache) = statement.cache.clone() else {
            return self
                .delegate
                .query_with_key(statement, parameter, bounds, key, bound_sql);
        };
        if statement.use_cache {
            ensure_no_out_params(statement, bound_sql)?;
        }
        self.flush_cache_if_required(statement);
        if !statement.use_cache {
            return self
                .delegate
                .query_with_key(statement, parameter, bounds, key, bound_sql);
        }
        if let Some(hit) = self.tcm.get(&cache, key) {
            debug!(cache = cache.id(), statement = %statement.id, "cache hit");
            return Ok(hit.to_rows());
        }
        let rows = self
            .delegate
            .query_with_key(statement, parameter, bounds, key, bound_sql)?;
        self.tcm
            .put(&cache, key.clone(), CachedValue::rows(rows.clone()));
        Ok(rows)
    }

    fn query_cursor(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Cursor> {
        self.flush_cache_if_required(statement);
        self.delegate.query_cursor(statement, parameter, bounds)
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.delegate.flush_statements()
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        self.delegate.commit(required)?;
        self.tcm.commit();
        Ok(())
    }

    /// Staged entries are discarded even when the transaction itself is untouched.
    fn rollback(&mut self, required: bool) -> Result<()> {
        let result = self.delegate.rollback(required);
        self.tcm.rollback();
        result
    }

    fn create_cache_key(
        &self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.delegate
            .create_cache_key(statement, parameter, bounds, bound_sql)
    }

    fn is_cached(&self, statement: &Arc<MappedStatement>, key: &CacheKey) -> bool {
        self.delegate.is_cached(statement, key)
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }

    fn close(&mut self, force_rollback: bool) {
        // a clean close publishes staged reads; a forced rollback discards them
        if force_rollback {
            self.tcm.rollback();
        } else {
            self.tcm.commit();
        }
        self.delegate.close(force_rollback);
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }
}
