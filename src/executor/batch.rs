use std::sync::Arc;

use tracing::debug;

use super::base::{ExecutionContext, ExecutorStrategy};
use super::close_quietly;
use super::simple::{open_cursor, query_once};
use crate::builder::BoundSql;
use crate::driver::Statement;
use crate::error::Result;
use crate::mapping::{KeyGenerator, MappedStatement, RowBounds};
use crate::results::Cursor;
use crate::types::Value;

/// What a batched update reports before the batch is flushed.
pub const BATCH_UPDATE_RETURN_VALUE: usize = 0;

/// The outcome of one flushed batch: every parameter object queued against one
/// statement and the update count of each.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    statement_id: String,
    sql: String,
    parameter_objects: Vec<Value>,
    update_counts: Vec<usize>,
}

impl BatchResult {
    #[must_use]
    pub fn new(statement_id: impl Into<String>, sql: impl Into<String>, parameter: Value) -> Self {
        Self {
            statement_id: statement_id.into(),
            sql: sql.into(),
            parameter_objects: vec![parameter],
            update_counts: Vec::new(),
        }
    }

    #[must_use]
    pub fn statement_id(&self) -> &str {
        &self.statement_id
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter objects in queue order, with generated keys assigned after flush.
    #[must_use]
    pub fn parameter_objects(&self) -> &[Value] {
        &self.parameter_objects
    }

    #[must_use]
    pub fn update_counts(&self) -> &[usize] {
        &self.update_counts
    }

    pub fn add_parameter_object(&mut self, parameter: Value) {
        self.parameter_objects.push(parameter);
    }
}

#[derive(Debug)]
struct PendingBatch {
    statement: Box<dyn Statement>,
    key_generator: KeyGenerator,
    result: BatchResult,
}

impl PendingBatch {
    fn execute(&mut self) -> Result<()> {
        let counts = self.statement.execute_batch()?;
        if self.key_generator.is_enabled() {
            let keys = self.statement.generated_keys()?;
            for (parameter, key) in self.result.parameter_objects.iter_mut().zip(&keys) {
                self.key_generator
                    .assign_keys(parameter, std::slice::from_ref(key))?;
            }
        }
        self.result.update_counts = counts;
        Ok(())
    }
}

/// Queues consecutive updates sharing SQL and statement id on one statement and
/// sends them at flush. A query flushes pending updates first.
#[derive(Debug, Default)]
pub struct BatchStrategy {
    pending: Vec<PendingBatch>,
    current: Option<(String, String)>,
}

impl BatchStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of statements with queued entries.
    #[must_use]
    pub fn pending_statements(&self) -> usize {
        self.pending.len()
    }
}

impl ExecutorStrategy for BatchStrategy {
    fn do_update(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &mut Value,
    ) -> Result<usize> {
        let mut handler = ctx.new_handler(statement, parameter, RowBounds::default(), None)?;
        let sql = handler.bound_sql().sql().to_string();
        let same_target = self
            .current
            .as_ref()
            .is_some_and(|(current_sql, current_id)| *current_sql == sql && *current_id == statement.id);

        if same_target && let Some(batch) = self.pending.last_mut() {
            debug!(%sql, "appending to batch");
            handler.parameterize(batch.statement.as_mut())?;
            handler.batch(batch.statement.as_mut())?;
            batch.result.add_parameter_object(parameter.clone());
        } else {
            let mut stmt = ctx.prepare(handler.as_mut())?;
            let queued = handler
                .parameterize(stmt.as_mut())
                .and_then(|()| handler.batch(stmt.as_mut()));
            if let Err(e) = queued {
                close_quietly(stmt.as_mut());
                return Err(e);
            }
            self.current = Some((sql.clone(), statement.id.clone()));
            self.pending.push(PendingBatch {
                statement: stmt,
                key_generator: statement.key_generator.clone(),
                result: BatchResult::new(statement.id.clone(), sql, parameter.clone()),
            });
        }
        Ok(BATCH_UPDATE_RETURN_VALUE)
    }

    fn do_query(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: BoundSql,
    ) -> Result<Vec<Value>> {
        self.do_flush_statements(false)?;
        query_once(ctx, statement, parameter, bounds, bound_sql)
    }

    fn do_query_cursor(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: BoundSql,
    ) -> Result<Cursor> {
        self.do_flush_statements(false)?;
        open_cursor(ctx, statement, parameter, bounds, bound_sql)
    }

    fn do_flush_statements(&mut self, is_rollback: bool) -> Result<Vec<BatchResult>> {
        self.current = None;
        let pending = std::mem::take(&mut self.pending);
        let mut results = Vec::with_capacity(pending.len());
        let mut failure = None;
        for (i, mut batch) in pending.into_iter().enumerate() {
            if !is_rollback && failure.is_none() {
                match batch.execute() {
                    Ok(()) => {
                        debug!(
                            statement = %batch.result.statement_id,
                            entries = batch.result.update_counts.len(),
                            "flushed batch"
                        );
                    }
                    Err(e) => {
                        failure = Some(e.context(format!(
                            "Error executing batch #{} of statement `{}` after {} successful batches",
                            i + 1,
                            batch.result.statement_id,
                            i
                        )));
                    }
                }
            }
            close_quietly(batch.statement.as_mut());
            if failure.is_none() && !is_rollback {
                results.push(batch.result);
            }
        }
        match failure {
            Some(e) => Err(e),
            None => Ok(results),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_result_tracks_parameters_in_order() {
        let mut result = BatchResult::new("insertUser", "insert into u values (?)", Value::from("a"));
        result.add_parameter_object(Value::from("b"));
        assert_eq!(result.parameter_objects(), &[Value::from("a"), Value::from("b")]);
        assert!(result.update_counts().is_empty());
    }
}
