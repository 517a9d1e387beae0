use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::invocation::{Args, Invocation, Invoke, Outcome};
use super::signature::{
    Capability, EXECUTOR_COMMIT, EXECUTOR_FLUSH_STATEMENTS, EXECUTOR_QUERY,
    EXECUTOR_QUERY_CURSOR, EXECUTOR_QUERY_WITH_KEY, EXECUTOR_ROLLBACK, EXECUTOR_UPDATE,
    HANDLE_CURSOR_RESULT_SETS, HANDLE_OUTPUT_PARAMETERS, HANDLE_RESULT_SETS, HANDLER_BATCH,
    HANDLER_PARAMETERIZE, HANDLER_PREPARE, HANDLER_QUERY, HANDLER_QUERY_CURSOR, HANDLER_UPDATE,
    MethodSignature, SET_PARAMETERS, SignatureMap,
};
use super::{Interceptor, Pluggable};
use crate::builder::BoundSql;
use crate::driver::{Connection, RowSource, Statement};
use crate::error::{Result, SqlMapperError};
use crate::executor::{BatchResult, CacheKey, Executor, ParameterHandler, StatementHandler};
use crate::mapping::{MappedStatement, RowBounds};
use crate::results::{Cursor, ResultSet, ResultSetHandler};
use crate::types::Value;

/// A pipeline stage wrapped by one interceptor.
///
/// Calls to methods the interceptor declared go through
/// [`Interceptor::intercept`]; everything else reaches the target directly.
pub struct Plugin<T: ?Sized> {
    target: Box<T>,
    interceptor: Arc<dyn Interceptor>,
    signatures: Arc<SignatureMap>,
}

impl<T: ?Sized> fmt::Debug for Plugin<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("interceptor", &self.interceptor.name())
            .field("signatures", &self.signatures)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Plugin<T> {
    /// Wrap `target` with `interceptor`.
    ///
    /// # Errors
    ///
    /// `PluginError` when the interceptor's signatures are empty or unknown.
    pub fn new(target: Box<T>, interceptor: Arc<dyn Interceptor>) -> Result<Self> {
        let signatures = Arc::new(SignatureMap::build(interceptor.as_ref())?);
        Ok(Self::with_signatures(target, interceptor, signatures))
    }

    pub(crate) fn with_signatures(
        target: Box<T>,
        interceptor: Arc<dyn Interceptor>,
        signatures: Arc<SignatureMap>,
    ) -> Self {
        Self {
            target,
            interceptor,
            signatures,
        }
    }

    #[must_use]
    pub fn target(&self) -> &T {
        &self.target
    }

    #[must_use]
    pub fn into_inner(self) -> Box<T> {
        self.target
    }

    fn intercepts(&self, capability: Capability, method: &MethodSignature) -> bool {
        self.signatures.intercepts(capability, method)
    }
}

impl<T: Pluggable + ?Sized> Pluggable for Plugin<T> {
    fn capabilities(&self) -> &'static [Capability] {
        self.target.capabilities()
    }
}

fn unsupported(capability: Capability, method: &MethodSignature, args: &Args<'_>) -> SqlMapperError {
    SqlMapperError::PluginError(format!(
        "{capability}::{method} cannot be invoked with {} arguments",
        args.kind()
    ))
}

struct ExecutorTarget<'t, T: ?Sized>(&'t mut T);

impl<T: Executor + ?Sized> Invoke for ExecutorTarget<'_, T> {
    fn invoke(&mut self, method: &MethodSignature, args: Args<'_>) -> Result<Outcome> {
        let target = &mut *self.0;
        match args {
            Args::Update {
                statement,
                parameter,
            } if *method == EXECUTOR_UPDATE => target.update(statement, parameter).map(Outcome::Count),
            Args::Query {
                statement,
                parameter,
                bounds,
            } if *method == EXECUTOR_QUERY => {
                target.query(statement, &parameter, bounds).map(Outcome::Rows)
            }
            Args::Query {
                statement,
                parameter,
                bounds,
            } if *method == EXECUTOR_QUERY_CURSOR => target
                .query_cursor(statement, &parameter, bounds)
                .map(Outcome::Cursor),
            Args::QueryWithKey {
                statement,
                parameter,
                bounds,
                key,
                bound_sql,
            } if *method == EXECUTOR_QUERY_WITH_KEY => target
                .query_with_key(statement, &parameter, bounds, &key, &bound_sql)
                .map(Outcome::Rows),
            Args::None if *method == EXECUTOR_FLUSH_STATEMENTS => {
                target.flush_statements().map(Outcome::BatchResults)
            }
            Args::Flag(required) if *method == EXECUTOR_COMMIT => {
                target.commit(required).map(|()| Outcome::Unit)
            }
            Args::Flag(required) if *method == EXECUTOR_ROLLBACK => {
                target.rollback(required).map(|()| Outcome::Unit)
            }
            other => Err(unsupported(Capability::Executor, method, &other)),
        }
    }
}

impl<T: Executor + ?Sized> Executor for Plugin<T> {
    fn update(&mut self, statement: &Arc<MappedStatement>, parameter: &mut Value) -> Result<usize> {
        if !self.intercepts(Capability::Executor, &EXECUTOR_UPDATE) {
            return self.target.update(statement, parameter);
        }
        let mut target = ExecutorTarget(&mut *self.target);
        let args = Args::Update {
            statement,
            parameter,
        };
        self.interceptor
            .intercept(Invocation::new(Capability::Executor, &EXECUTOR_UPDATE, args, &mut target))?
            .into_count()
    }

    fn query(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        if !self.intercepts(Capability::Executor, &EXECUTOR_QUERY) {
            return self.target.query(statement, parameter, bounds);
        }
        let mut target = ExecutorTarget(&mut *self.target);
        let args = Args::Query {
            statement,
            parameter: Cow::Borrowed(parameter),
            bounds,
        };
        self.interceptor
            .intercept(Invocation::new(Capability::Executor, &EXECUTOR_QUERY, args, &mut target))?
            .into_rows()
    }

    fn query_with_key(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Value>> {
        if !self.intercepts(Capability::Executor, &EXECUTOR_QUERY_WITH_KEY) {
            return self
                .target
                .query_with_key(statement, parameter, bounds, key, bound_sql);
        }
        let mut target = ExecutorTarget(&mut *self.target);
        let args = Args::QueryWithKey {
            statement,
            parameter: Cow::Borrowed(parameter),
            bounds,
            key: Cow::Borrowed(key),
            bound_sql: Cow::Borrowed(bound_sql),
        };
        self.interceptor
            .intercept(Invocation::new(
                Capability::Executor,
                &EXECUTOR_QUERY_WITH_KEY,
                args,
                &mut target,
            ))?
            .into_rows()
    }

    fn query_cursor(
        &mut self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Cursor> {
        if !self.intercepts(Capability::Executor, &EXECUTOR_QUERY_CURSOR) {
            return self.target.query_cursor(statement, parameter, bounds);
        }
        let mut target = ExecutorTarget(&mut *self.target);
        let args = Args::Query {
            statement,
            parameter: Cow::Borrowed(parameter),
            bounds,
        };
        self.interceptor
            .intercept(Invocation::new(
                Capability::Executor,
                &EXECUTOR_QUERY_CURSOR,
                args,
                &mut target,
            ))?
            .into_cursor()
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        if !self.intercepts(Capability::Executor, &EXECUTOR_FLUSH_STATEMENTS) {
            return self.target.flush_statements();
        }
        let mut target = ExecutorTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::Executor,
                &EXECUTOR_FLUSH_STATEMENTS,
                Args::None,
                &mut target,
            ))?
            .into_batch_results()
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        if !self.intercepts(Capability::Executor, &EXECUTOR_COMMIT) {
            return self.target.commit(required);
        }
        let mut target = ExecutorTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::Executor,
                &EXECUTOR_COMMIT,
                Args::Flag(required),
                &mut target,
            ))?
            .into_unit()
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        if !self.intercepts(Capability::Executor, &EXECUTOR_ROLLBACK) {
            return self.target.rollback(required);
        }
        let mut target = ExecutorTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::Executor,
                &EXECUTOR_ROLLBACK,
                Args::Flag(required),
                &mut target,
            ))?
            .into_unit()
    }

    fn create_cache_key(
        &self,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.target
            .create_cache_key(statement, parameter, bounds, bound_sql)
    }

    fn is_cached(&self, statement: &Arc<MappedStatement>, key: &CacheKey) -> bool {
        self.target.is_cached(statement, key)
    }

    fn clear_local_cache(&mut self) {
        self.target.clear_local_cache();
    }

    fn close(&mut self, force_rollback: bool) {
        self.target.close(force_rollback);
    }

    fn is_closed(&self) -> bool {
        self.target.is_closed()
    }
}

struct StatementHandlerTarget<'t, T: ?Sized>(&'t mut T);

impl<T: StatementHandler + ?Sized> Invoke for StatementHandlerTarget<'_, T> {
    fn invoke(&mut self, method: &MethodSignature, args: Args<'_>) -> Result<Outcome> {
        let target = &mut *self.0;
        match args {
            Args::Prepare {
                connection,
                timeout,
            } if *method == HANDLER_PREPARE => {
                target.prepare(connection, timeout).map(Outcome::Statement)
            }
            Args::Statement(statement) if *method == HANDLER_PARAMETERIZE => {
                target.parameterize(statement).map(|()| Outcome::Unit)
            }
            Args::Statement(statement) if *method == HANDLER_BATCH => {
                target.batch(statement).map(|()| Outcome::Unit)
            }
            Args::StatementWithParameter {
                statement,
                parameter,
            } if *method == HANDLER_UPDATE => target.update(statement, parameter).map(Outcome::Count),
            Args::Statement(statement) if *method == HANDLER_QUERY => {
                target.query(statement).map(Outcome::Rows)
            }
            Args::OwnedStatement(statement) if *method == HANDLER_QUERY_CURSOR => {
                target.query_cursor(statement).map(Outcome::Cursor)
            }
            other => Err(unsupported(Capability::StatementHandler, method, &other)),
        }
    }
}

impl<T: StatementHandler + ?Sized> StatementHandler for Plugin<T> {
    fn prepare(
        &mut self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<Duration>,
    ) -> Result<Box<dyn Statement>> {
        if !self.intercepts(Capability::StatementHandler, &HANDLER_PREPARE) {
            return self.target.prepare(connection, transaction_timeout);
        }
        let mut target = StatementHandlerTarget(&mut *self.target);
        let args = Args::Prepare {
            connection,
            timeout: transaction_timeout,
        };
        self.interceptor
            .intercept(Invocation::new(
                Capability::StatementHandler,
                &HANDLER_PREPARE,
                args,
                &mut target,
            ))?
            .into_statement()
    }

    fn parameterize(&mut self, statement: &mut dyn Statement) -> Result<()> {
        if !self.intercepts(Capability::StatementHandler, &HANDLER_PARAMETERIZE) {
            return self.target.parameterize(statement);
        }
        let mut target = StatementHandlerTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::StatementHandler,
                &HANDLER_PARAMETERIZE,
                Args::Statement(statement),
                &mut target,
            ))?
            .into_unit()
    }

    fn batch(&mut self, statement: &mut dyn Statement) -> Result<()> {
        if !self.intercepts(Capability::StatementHandler, &HANDLER_BATCH) {
            return self.target.batch(statement);
        }
        let mut target = StatementHandlerTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::StatementHandler,
                &HANDLER_BATCH,
                Args::Statement(statement),
                &mut target,
            ))?
            .into_unit()
    }

    fn update(&mut self, statement: &mut dyn Statement, parameter: &mut Value) -> Result<usize> {
        if !self.intercepts(Capability::StatementHandler, &HANDLER_UPDATE) {
            return self.target.update(statement, parameter);
        }
        let mut target = StatementHandlerTarget(&mut *self.target);
        let args = Args::StatementWithParameter {
            statement,
            parameter,
        };
        self.interceptor
            .intercept(Invocation::new(
                Capability::StatementHandler,
                &HANDLER_UPDATE,
                args,
                &mut target,
            ))?
            .into_count()
    }

    fn query(&mut self, statement: &mut dyn Statement) -> Result<Vec<Value>> {
        if !self.intercepts(Capability::StatementHandler, &HANDLER_QUERY) {
            return self.target.query(statement);
        }
        let mut target = StatementHandlerTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::StatementHandler,
                &HANDLER_QUERY,
                Args::Statement(statement),
                &mut target,
            ))?
            .into_rows()
    }

    fn query_cursor(&mut self, statement: Box<dyn Statement>) -> Result<Cursor> {
        if !self.intercepts(Capability::StatementHandler, &HANDLER_QUERY_CURSOR) {
            return self.target.query_cursor(statement);
        }
        let mut target = StatementHandlerTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::StatementHandler,
                &HANDLER_QUERY_CURSOR,
                Args::OwnedStatement(statement),
                &mut target,
            ))?
            .into_cursor()
    }

    fn bound_sql(&self) -> &BoundSql {
        self.target.bound_sql()
    }
}

struct ParameterHandlerTarget<'t, T: ?Sized>(&'t mut T);

impl<T: ParameterHandler + ?Sized> Invoke for ParameterHandlerTarget<'_, T> {
    fn invoke(&mut self, method: &MethodSignature, args: Args<'_>) -> Result<Outcome> {
        match args {
            Args::Statement(statement) if *method == SET_PARAMETERS => {
                self.0.set_parameters(statement).map(|()| Outcome::Unit)
            }
            other => Err(unsupported(Capability::ParameterHandler, method, &other)),
        }
    }
}

impl<T: ParameterHandler + ?Sized> ParameterHandler for Plugin<T> {
    fn parameter_object(&self) -> &Value {
        self.target.parameter_object()
    }

    fn set_parameters(&mut self, statement: &mut dyn Statement) -> Result<()> {
        if !self.intercepts(Capability::ParameterHandler, &SET_PARAMETERS) {
            return self.target.set_parameters(statement);
        }
        let mut target = ParameterHandlerTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::ParameterHandler,
                &SET_PARAMETERS,
                Args::Statement(statement),
                &mut target,
            ))?
            .into_unit()
    }
}

struct ResultSetHandlerTarget<'t, T: ?Sized>(&'t mut T);

impl<T: ResultSetHandler + ?Sized> Invoke for ResultSetHandlerTarget<'_, T> {
    fn invoke(&mut self, method: &MethodSignature, args: Args<'_>) -> Result<Outcome> {
        let target = &mut *self.0;
        match args {
            Args::ResultSet(result_set) if *method == HANDLE_RESULT_SETS => {
                target.handle_result_sets(result_set).map(Outcome::Rows)
            }
            Args::RowSource(rows) if *method == HANDLE_CURSOR_RESULT_SETS => {
                target.handle_cursor_result_sets(rows).map(Outcome::Cursor)
            }
            Args::StatementWithParameter {
                statement,
                parameter,
            } if *method == HANDLE_OUTPUT_PARAMETERS => target
                .handle_output_parameters(statement, parameter)
                .map(|()| Outcome::Unit),
            other => Err(unsupported(Capability::ResultSetHandler, method, &other)),
        }
    }
}

impl<T: ResultSetHandler + ?Sized> ResultSetHandler for Plugin<T> {
    fn handle_result_sets(&mut self, result_set: ResultSet) -> Result<Vec<Value>> {
        if !self.intercepts(Capability::ResultSetHandler, &HANDLE_RESULT_SETS) {
            return self.target.handle_result_sets(result_set);
        }
        let mut target = ResultSetHandlerTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::ResultSetHandler,
                &HANDLE_RESULT_SETS,
                Args::ResultSet(result_set),
                &mut target,
            ))?
            .into_rows()
    }

    fn handle_cursor_result_sets(&mut self, rows: Box<dyn RowSource>) -> Result<Cursor> {
        if !self.intercepts(Capability::ResultSetHandler, &HANDLE_CURSOR_RESULT_SETS) {
            return self.target.handle_cursor_result_sets(rows);
        }
        let mut target = ResultSetHandlerTarget(&mut *self.target);
        self.interceptor
            .intercept(Invocation::new(
                Capability::ResultSetHandler,
                &HANDLE_CURSOR_RESULT_SETS,
                Args::RowSource(rows),
                &mut target,
            ))?
            .into_cursor()
    }

    fn handle_output_parameters(
        &mut self,
        statement: &mut dyn Statement,
        parameter: &mut Value,
    ) -> Result<()> {
        if !self.intercepts(Capability::ResultSetHandler, &HANDLE_OUTPUT_PARAMETERS) {
            return self.target.handle_output_parameters(statement, parameter);
        }
        let mut target = ResultSetHandlerTarget(&mut *self.target);
        let args = Args::StatementWithParameter {
            statement,
            parameter,
        };
        self.interceptor
            .intercept(Invocation::new(
                Capability::ResultSetHandler,
                &HANDLE_OUTPUT_PARAMETERS,
                args,
                &mut target,
            ))?
            .into_unit()
    }
}
