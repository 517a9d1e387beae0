use std::sync::Arc;

use tracing::{debug, warn};

use super::batch::BatchResult;
use super::cache_key::CacheKey;
use super::statement::StatementHandler;
use super::Executor;
use crate::builder::BoundSql;
use crate::cache::{Cache, CachedValue, PerpetualCache};
use crate::driver::{Statement, Transaction};
use crate::error::{Result, SqlMapperError};
use crate::mapping::{MappedStatement, RowBounds};
use crate::plugin::{Capability, Pluggable};
use crate::results::Cursor;
use crate::session::{Configuration, LocalCacheScope};
use crate::types::{ParameterMode, Value};

/// What a strategy needs from its executor: the configuration and the transaction.
pub struct ExecutionContext {
    pub configuration: Arc<Configuration>,
    pub transaction: Box<dyn Transaction>,
}

impl ExecutionContext {
    /// Create a statement handler through the configuration's interceptor chain.
    ///
    /// # Errors
    ///
    /// Template evaluation errors when `bound_sql` has to be compiled.
    pub fn new_handler(
        &self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: Option<BoundSql>,
    ) -> Result<Box<dyn StatementHandler>> {
        self.configuration
            .new_statement_handler(statement, parameter, bounds, bound_sql)
    }

    /// Prepare `handler`'s statement on the transaction's connection.
    ///
    /// # Errors
    ///
    /// Connection and prepare failures.
    pub fn prepare(&mut self, handler: &mut dyn StatementHandler) -> Result<Box<dyn Statement>> {
        let timeout = self.transaction.timeout();
        let connection = self.transaction.connection()?;
        handler.prepare(connection, timeout)
    }
}

/// The statement-handling policy plugged into a [`BaseExecutor`].
#[allow(clippy::missing_errors_doc)]
pub trait ExecutorStrategy: Send {
    fn do_update(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &mut Value,
    ) -> Result<usize>;

    fn do_query(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: BoundSql,
    ) -> Result<Vec<Value>>;

    fn do_query_cursor(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: BoundSql,
    ) -> Result<Cursor>;

    /// Run or discard pending work and release held statements.
    fn do_flush_statements(&mut self, is_rollback: bool) -> Result<Vec<BatchResult>>;
}

/// Executor state shared by every strategy: the local cache, the transaction and
/// the closed flag.
pub struct BaseExecutor<S> {
    strategy: S,
    ctx: ExecutionContext,
    local_cache: PerpetualCache,
    query_stack: usize,
    closed: bool,
}

impl<S> std::fmt::Debug for BaseExecutor<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseExecutor")
            .field("strategy", &std::any::type_name::<S>())
            .field("local_cache", &self.local_cache.size())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl<S: ExecutorStrategy> BaseExecutor<S> {
    #[must_use]
    pub fn new(strategy: S, configuration: Arc<Configuration>, transaction: Box<dyn Transaction>) -> Self {
        Self {
            strategy,
            ctx: ExecutionContext {
                configuration,
                transaction,
            },
            local_cache: PerpetualCache::new("LocalCache"),
            query_stack: 0,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SqlMapperError::ClosedError("Executor was closed.".into()));
        }
        Ok(())
    }

    fn query_from_database(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Value>> {
        let rows = self.strategy.do_query(
            &mut self.ctx,
            statement,
            parameter,
            bounds,
            bound_sql.clone(),
        )?;
        self.local_cache
            .put(key.clone(), CachedValue::rows(rows.clone()));
        Ok(rows)
    }
}

impl<S> Pluggable for BaseExecutor<S> {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Executor]
    }
}

impl<S: ExecutorStrategy> Executor for BaseExecutor<S> {
    fn update(&mut self, statement: &Arc<MappedStatement>, parameter: &mut Value) -> Result<usize> {
        self.ensure_open()?;
        debug!(statement = %statement.id, "executing an update");
        self.clear_local_cache();
        self.strategy.do_update(&mut self.ctx, statement, parameter)
    }

    fn query(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        let bound_sql = statement.bound_sql(parameter, &self.ctx.configuration.compile_env())?;
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
        self.ensure_open()?;
        debug!(statement = %statement.id, "executing a query");
        if self.query_stack == 0 && statement.flush_cache_required {
            self.clear_local_cache();
        }
        self.query_stack += 1;
        let result = match self.local_cache.get(key) {
            Some(cached) => Ok(cached.to_rows()),
            None => self.query_from_database(statement, parameter, bounds, key, bound_sql),
        };
        self.query_stack -= 1;
        if self.query_stack == 0
            && self.ctx.configuration.settings().local_cache_scope == LocalCacheScope::Statement
        {
            self.clear_local_cache();
        }
        result
    }

    fn query_cursor(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Cursor> {
        self.ensure_open()?;
        let bound_sql = statement.bound_sql(parameter, &self.ctx.configuration.compile_env())?;
        self.strategy
            .do_query_cursor(&mut self.ctx, statement, parameter, bounds, bound_sql)
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.ensure_open()?;
        self.strategy.do_flush_statements(false)
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Err(SqlMapperError::ClosedError(
                "Cannot commit, transaction is already closed".into(),
            ));
        }
        self.clear_local_cache();
        self.flush_statements()?;
        if required {
            self.ctx.transaction.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.clear_local_cache();
        let flushed = self.strategy.do_flush_statements(true);
        if required {
            self.ctx.transaction.rollback()?;
        }
        flushed.map(|_| ())
    }

    fn create_cache_key(
        &self,
        statement: &Arc<MappedStatement>,
        _parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.ensure_open()?;
        let mut key = CacheKey::new();
        key.update(Value::from(statement.id.as_str()));
        key.update(Value::Int(i64::try_from(bounds.offset).unwrap_or(i64::MAX)));
        key.update(Value::Int(i64::try_from(bounds.limit).unwrap_or(i64::MAX)));
        key.update(Value::from(bound_sql.sql()));
        for mapping in bound_sql.parameter_mappings() {
            if mapping.mode != ParameterMode::Out {
                key.update(bound_sql.parameter_value(mapping)?);
            }
        }
        if let Some(database_id) = self.ctx.configuration.database_id() {
            key.update(Value::from(database_id));
        }
        Ok(key)
    }

    fn is_cached(&self, _statement: &Arc<MappedStatement>, key: &CacheKey) -> bool {
        self.local_cache.get(key).is_some()
    }

    fn clear_local_cache(&mut self) {
        if !self.closed {
            self.local_cache.clear();
        }
    }

    fn close(&mut self, force_rollback: bool) {
        if self.closed {
            return;
        }
        if let Err(e) = self.rollback(force_rollback) {
            warn!(error = %e, "rollback while closing executor failed");
        }
        if let Err(e) = self.ctx.transaction.close() {
            warn!(error = %e, "closing transaction failed");
        }
        self.local_cache.clear();
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
