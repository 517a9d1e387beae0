use std::sync::Arc;

use super::base::{ExecutionContext, ExecutorStrategy};
use super::batch::BatchResult;
use super::{close_quietly, with_statement};
use crate::builder::BoundSql;
use crate::error::Result;
use crate::mapping::{MappedStatement, RowBounds};
use crate::results::Cursor;
use crate::types::Value;

/// A fresh statement per operation, closed as soon as the operation finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleStrategy;

/// Prepare, bind and query once, closing the statement on every path.
pub(super) fn query_once(
    ctx: &mut ExecutionContext,
    statement: &Arc<MappedStatement>,
    parameter: &Value,
    bounds: RowBounds,
    bound_sql: BoundSql,
) -> Result<Vec<Value>> {
    let mut handler = ctx.new_handler(statement, parameter, bounds, Some(bound_sql))?;
    let stmt = ctx.prepare(handler.as_mut())?;
    with_statement(stmt, |stmt| {
        handler.parameterize(stmt)?;
        handler.query(stmt)
    })
}

/// Prepare and bind a statement that a cursor will own.
pub(super) fn open_cursor(
    ctx: &mut ExecutionContext,
    statement: &Arc<MappedStatement>,
    parameter: &Value,
    bounds: RowBounds,
    bound_sql: BoundSql,
) -> Result<Cursor> {
    let mut handler = ctx.new_handler(statement, parameter, bounds, Some(bound_sql))?;
    let mut stmt = ctx.prepare(handler.as_mut())?;
    if let Err(e) = handler.parameterize(stmt.as_mut()) {
        close_quietly(stmt.as_mut());
        return Err(e);
    }
    handler.query_cursor(stmt)
}

impl ExecutorStrategy for SimpleStrategy {
    fn do_update(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &mut Value,
    ) -> Result<usize> {
        let mut handler = ctx.new_handler(statement, parameter, RowBounds::default(), None)?;
        let stmt = ctx.prepare(handler.as_mut())?;
        with_statement(stmt, |stmt| {
            handler.parameterize(stmt)?;
            handler.update(stmt, parameter)
        })
    }

    fn do_query(
        &mut self,
        ctx: &mut ExecutionContext,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: BoundSql,
    ) -> Result<Vec<Value>> {
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
        open_cursor(ctx, statement, parameter, bounds, bound_sql)
    }

    fn do_flush_statements(&mut self, _is_rollback: bool) -> Result<Vec<BatchResult>> {
        Ok(Vec::new())
    }
}
