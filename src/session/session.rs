use std::sync::Arc;

use tracing::{debug, warn};

use super::configuration::Configuration;
use super::mapper::Mapper;
use crate::error::{Result, SqlMapperError};
use crate::executor::{BatchResult, Executor};
use crate::mapping::RowBounds;
use crate::results::{Cursor, ResultContext, ResultHandler};
use crate::types::Value;

/// One unit of work: runs statements by id on its own executor.
///
/// Updates mark the session dirty; `commit` and `rollback` reach the transaction only
/// when it is dirty (or forced) and autocommit is off. Dropping an open session
/// closes it, rolling back uncommitted work.
pub struct SqlSession {
    configuration: Arc<Configuration>,
    executor: Box<dyn Executor>,
    autocommit: bool,
    dirty: bool,
}

impl std::fmt::Debug for SqlSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSession")
            .field("autocommit", &self.autocommit)
            .field("dirty", &self.dirty)
            .field("closed", &self.executor.is_closed())
            .finish_non_exhaustive()
    }
}

impl SqlSession {
    pub(crate) fn new(configuration: Arc<Configuration>, executor: Box<dyn Executor>, autocommit: bool) -> Self {
        Self {
            configuration,
            executor,
            autocommit,
            dirty: false,
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }

    /// Statements of the mapper registered under `namespace`, addressed by short id.
    ///
    /// # Errors
    ///
    /// `BindingError` when no mapper is registered under `namespace`.
    pub fn mapper(&mut self, namespace: &str) -> Result<Mapper<'_>> {
        if !self.configuration.has_mapper(namespace) {
            return Err(SqlMapperError::BindingError {
                fragment: namespace.to_string(),
                message: format!("Type {namespace} is not known to the MapperRegistry."),
            });
        }
        Ok(Mapper::new(self, namespace.to_string()))
    }

    /// # Errors
    ///
    /// Unknown statement ids, binding and execution errors, or more than one row.
    pub fn select_one(&mut self, id: &str, parameter: &Value) -> Result<Option<Value>> {
        let mut rows = self.select_list(id, parameter)?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            n => Err(SqlMapperError::ExecutionError(format!(
                "Expected one result (or null) to be returned by select_one(), but found: {n}"
            ))),
        }
    }

    /// # Errors
    ///
    /// Unknown statement ids, binding and execution errors.
    pub fn select_list(&mut self, id: &str, parameter: &Value) -> Result<Vec<Value>> {
        self.select_list_with_bounds(id, parameter, RowBounds::default())
    }

    /// # Errors
    ///
    /// Unknown statement ids, binding and execution errors.
    pub fn select_list_with_bounds(
        &mut self,
        id: &str,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        let statement = self.configuration.mapped_statement(id)?;
        self.executor
            .query(&statement, parameter, bounds)
            .map_err(|e| e.context(format!("Error querying database for `{id}`")))
    }

    /// Rows are fetched as the cursor is iterated.
    ///
    /// # Errors
    ///
    /// Unknown statement ids, binding and execution errors.
    pub fn select_cursor(&mut self, id: &str, parameter: &Value) -> Result<Cursor> {
        self.select_cursor_with_bounds(id, parameter, RowBounds::default())
    }

    /// # Errors
    ///
    /// Unknown statement ids, binding and execution errors.
    pub fn select_cursor_with_bounds(
        &mut self,
        id: &str,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Cursor> {
        let statement = self.configuration.mapped_statement(id)?;
        self.executor
            .query_cursor(&statement, parameter, bounds)
            .map_err(|e| e.context(format!("Error opening cursor for `{id}`")))
    }

    /// Stream rows into `handler` until the rows run out or the handler stops.
    ///
    /// # Errors
    ///
    /// Execution errors and the first error returned by `handler`.
    pub fn select(
        &mut self,
        id: &str,
        parameter: &Value,
        bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        let mut cursor = self.select_cursor_with_bounds(id, parameter, bounds)?;
        let mut context = ResultContext::default();
        for row in cursor.by_ref() {
            context.next_result();
            handler.handle_result(row?, &mut context)?;
            if context.is_stopped() {
                break;
            }
        }
        cursor.close()
    }

    /// # Errors
    ///
    /// As [`SqlSession::update`].
    pub fn insert(&mut self, id: &str, parameter: &mut Value) -> Result<usize> {
        self.update(id, parameter)
    }

    /// Run an update statement. Generated keys are written into `parameter`.
    ///
    /// # Errors
    ///
    /// Unknown statement ids, binding and execution errors.
    pub fn update(&mut self, id: &str, parameter: &mut Value) -> Result<usize> {
        let statement = self.configuration.mapped_statement(id)?;
        self.dirty = true;
        self.executor
            .update(&statement, parameter)
            .map_err(|e| e.context(format!("Error updating database for `{id}`")))
    }

    /// # Errors
    ///
    /// As [`SqlSession::update`].
    pub fn delete(&mut self, id: &str, parameter: &mut Value) -> Result<usize> {
        self.update(id, parameter)
    }

    /// Execute pending batches.
    ///
    /// # Errors
    ///
    /// The first failing batch.
    pub fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.executor
            .flush_statements()
            .map_err(|e| e.context("Error flushing statements"))
    }

    fn commit_or_rollback_required(&self, force: bool) -> bool {
        (!self.autocommit && self.dirty) || force
    }

    /// # Errors
    ///
    /// Flush and commit failures.
    pub fn commit(&mut self) -> Result<()> {
        self.commit_force(false)
    }

    /// Commit even when nothing was updated through this session.
    ///
    /// # Errors
    ///
    /// Flush and commit failures.
    pub fn commit_force(&mut self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor
            .commit(required)
            .map_err(|e| e.context("Error committing transaction"))?;
        self.dirty = false;
        Ok(())
    }

    /// # Errors
    ///
    /// Rollback failures.
    pub fn rollback(&mut self) -> Result<()> {
        self.rollback_force(false)
    }

    /// # Errors
    ///
    /// Rollback failures.
    pub fn rollback_force(&mut self, force: bool) -> Result<()> {
        let required = self.commit_or_rollback_required(force);
        self.executor
            .rollback(required)
            .map_err(|e| e.context("Error rolling back transaction"))?;
        self.dirty = false;
        Ok(())
    }

    pub fn clear_cache(&mut self) {
        self.executor.clear_local_cache();
    }

    /// Release the connection. Uncommitted updates are rolled back.
    pub fn close(&mut self) {
        if self.executor.is_closed() {
            return;
        }
        let force = self.commit_or_rollback_required(false);
        debug!(force, "closing session");
        self.executor.close(force);
        self.dirty = false;
    }
}

impl Drop for SqlSession {
    fn drop(&mut self) {
        if !self.executor.is_closed() {
            if self.dirty && !self.autocommit {
                warn!("session dropped with uncommitted updates; rolling back");
            }
            self.close();
        }
    }
}
