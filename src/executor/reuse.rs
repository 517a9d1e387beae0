use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::base::{ExecutionContext, ExecutorStrategy};
use super::batch::BatchResult;
use super::close_quietly;
use super::statement::StatementHandler;
use crate::builder::BoundSql;
use crate::driver::Statement;
use crate::error::{Result, SqlMapperError};
use crate::mapping::{MappedStatement, RowBounds};
use crate::results::Cursor;
use crate::types::Value;

/// Keeps prepared statements keyed by SQL text until the next flush, commit or
/// rollback.
#[derive(Debug, Default)]
pub struct ReuseStrategy {
    statements: HashMap<String, Box<dyn Statement>>,
}

impl ReuseStrategy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of statements currently held open.
    #[must_use]
    pub fn cached_statements(&self) -> usize {
        self.statements.len()
    }

    fn prepare(
        &mut self,
        ctx: &mut ExecutionContext,
        handler: &mut dyn StatementHandler,
    ) -> Result<&mut Box<dyn Statement>> {
        let sql = handler.bound_sql().sql().to_string();
        let reusable = self
            .statements
            .get(&sql)
            .is_some_and(|stmt| !stmt.is_closed());
        if reusable {
            debug!(%sql, "reusing prepared statement");
        } else {
            let stmt = ctx.prepare(handler)?;
            self.statements.insert(sql.clone(), stmt);
        }
        let stmt = self.statements.get_mut(&sql).ok_or_else(|| {
            SqlMapperError::ExecutionError(format!("no cached statement for `{sql}`"))
        })?;
        handler.parameterize(stmt.as_mut())?;
        Ok(stmt)
    }
}

impl ExecutorStrategy for ReuseStrategy {
    fn do_update(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &mut Value,
    ) -> Result<usize> {
        let mut handler = ctx.new_handler(statement, parameter, RowBounds::default(), None)?;
        let stmt = self.prepare(ctx, handler.as_mut())?;
        handler.update(stmt.as_mut(), parameter)
    }

    fn do_query(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: BoundSql,
    ) -> Result<Vec<Value>> {
        let mut handler = ctx.new_handler(statement, parameter, bounds, Some(bound_sql))?;
        let stmt = self.prepare(ctx, handler.as_mut())?;
        handler.query(stmt.as_mut())
    }

    /// The cursor takes ownership of the statement, so it leaves the cache.
    fn do_query_cursor(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: BoundSql,
    ) -> Result<Cursor> {
        let mut handler = ctx.new_handler(statement, parameter, bounds, Some(bound_sql))?;
        let sql = handler.bound_sql().sql().to_string();
        self.prepare(ctx, handler.as_mut())?;
        match self.statements.remove(&sql) {
            Some(stmt) => handler.query_cursor(stmt),
            None => Err(SqlMapperError::ExecutionError(format!(
                "no cached statement for `{sql}`"
            ))),
        }
    }

    fn do_flush_statements(&mut self, _is_rollback: bool) -> Result<Vec<BatchResult>> {
        for (_, mut stmt) in self.statements.drain() {
            close_quietly(stmt.as_mut());
        }
        Ok(Vec::new())
    }
}
