use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::signature::{Capability, MethodSignature};
use crate::builder::BoundSql;
use crate::driver::{Connection, RowSource, Statement};
use crate::error::{Result, SqlMapperError};
use crate::executor::{BatchResult, CacheKey};
use crate::mapping::{MappedStatement, RowBounds};
use crate::results::{Cursor, ResultSet};
use crate::types::Value;

/// Arguments of an intercepted call. Interceptors may replace them before proceeding.
pub enum Args<'a> {
    None,
    Flag(bool),
    Update {
        statement: &'a Arc<MappedStatement>,
        parameter: &'a mut Value,
    },
    Query {
        statement: &'a Arc<MappedStatement>,
        parameter: Cow<'a, Value>,
        bounds: RowBounds,
    },
    QueryWithKey {
        statement: &'a Arc<MappedStatement>,
        parameter: Cow<'a, Value>,
        bounds: RowBounds,
        key: Cow<'a, CacheKey>,
        bound_sql: Cow<'a, BoundSql>,
    },
    Prepare {
        connection: &'a mut dyn Connection,
        timeout: Option<Duration>,
    },
    Statement(&'a mut dyn Statement),
    StatementWithParameter {
        statement: &'a mut dyn Statement,
        parameter: &'a mut Value,
    },
    OwnedStatement(Box<dyn Statement>),
    ResultSet(ResultSet),
    RowSource(Box<dyn RowSource>),
}

impl Args<'_> {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Args::None => "none",
            Args::Flag(_) => "flag",
            Args::Update { .. } => "update",
            Args::Query { .. } => "query",
            Args::QueryWithKey { .. } => "query-with-key",
            Args::Prepare { .. } => "prepare",
            Args::Statement(_) => "statement",
            Args::StatementWithParameter { .. } => "statement-with-parameter",
            Args::OwnedStatement(_) => "owned-statement",
            Args::ResultSet(_) => "result-set",
            Args::RowSource(_) => "row-source",
        }
    }
}

impl fmt::Debug for Args<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Args::{}", self.kind())
    }
}

/// What an intercepted call returned.
#[derive(Debug)]
pub enum Outcome {
    Unit,
    Count(usize),
    Rows(Vec<Value>),
    BatchResults(Vec<BatchResult>),
    Statement(Box<dyn Statement>),
    Cursor(Cursor),
}

fn mismatch(expected: &str, got: &Outcome) -> SqlMapperError {
    SqlMapperError::PluginError(format!(
        "interceptor returned {} where {expected} was expected",
        got.kind()
    ))
}

#[allow(clippy::missing_errors_doc)]
impl Outcome {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Unit => "unit",
            Outcome::Count(_) => "a count",
            Outcome::Rows(_) => "rows",
            Outcome::BatchResults(_) => "batch results",
            Outcome::Statement(_) => "a statement",
            Outcome::Cursor(_) => "a cursor",
        }
    }

    pub fn into_unit(self) -> Result<()> {
        match self {
            Outcome::Unit => Ok(()),
            other => Err(mismatch("unit", &other)),
        }
    }

    pub fn into_count(self) -> Result<usize> {
        match self {
            Outcome::Count(n) => Ok(n),
            other => Err(mismatch("a count", &other)),
        }
    }

    pub fn into_rows(self) -> Result<Vec<Value>> {
        match self {
            Outcome::Rows(rows) => Ok(rows),
            other => Err(mismatch("rows", &other)),
        }
    }

    pub fn into_batch_results(self) -> Result<Vec<BatchResult>> {
        match self {
            Outcome::BatchResults(results) => Ok(results),
            other => Err(mismatch("batch results", &other)),
        }
    }

    pub fn into_statement(self) -> Result<Box<dyn Statement>> {
        match self {
            Outcome::Statement(statement) => Ok(statement),
            other => Err(mismatch("a statement", &other)),
        }
    }

    pub fn into_cursor(self) -> Result<Cursor> {
        match self {
            Outcome::Cursor(cursor) => Ok(cursor),
            other => Err(mismatch("a cursor", &other)),
        }
    }
}

/// Dispatches a method call to the wrapped target.
pub trait Invoke {
    /// # Errors
    ///
    /// The target's own errors, or `PluginError` when `args` do not fit `method`.
    fn invoke(&mut self, method: &MethodSignature, args: Args<'_>) -> Result<Outcome>;
}

/// One intercepted call: the method, its arguments and the target to proceed to.
pub struct Invocation<'a> {
    capability: Capability,
    method: &'static MethodSignature,
    args: Args<'a>,
    target: &'a mut dyn Invoke,
}

impl fmt::Debug for Invocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("capability", &self.capability)
            .field("method", &self.method)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

impl<'a> Invocation<'a> {
    pub(crate) fn new(
        capability: Capability,
        method: &'static MethodSignature,
        args: Args<'a>,
        target: &'a mut dyn Invoke,
    ) -> Self {
        Self {
            capability,
            method,
            args,
            target,
        }
    }

    #[must_use]
    pub fn capability(&self) -> Capability {
        self.capability
    }

    #[must_use]
    pub fn method(&self) -> &'static MethodSignature {
        self.method
    }

    #[must_use]
    pub fn args(&self) -> &Args<'a> {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Args<'a> {
        &mut self.args
    }

    /// Call the next interceptor or the real target with the current arguments.
    ///
    /// # Errors
    ///
    /// Whatever the target returns.
    pub fn proceed(self) -> Result<Outcome> {
        self.target.invoke(self.method, self.args)
    }
}
