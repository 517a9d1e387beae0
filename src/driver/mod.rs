//! The statement-execution contract the pipeline runs against.
//!
//! Backends implement [`DataSource`], [`Connection`], [`Statement`] and [`RowSource`].
//! The crate ships a `SQLite` backend (`crate::sqlite`) and, for tests, a recording
//! in-memory driver (`crate::test_utils`).

pub mod transaction;

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Result, SqlMapperError};
use crate::mapping::ResultSetType;
use crate::results::{Columns, ResultSet, Row};
use crate::types::{JdbcType, Value};

pub use transaction::{ManagedTransaction, Transaction};

/// Options applied when a statement is prepared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementOptions {
    /// Exceeding this while waiting on the database is an execution failure.
    pub timeout: Option<Duration>,
    pub fetch_size: Option<u32>,
    pub result_set_type: Option<ResultSetType>,
    /// Make generated keys available after an update.
    pub return_generated_keys: bool,
    /// Prepare as a stored-procedure call.
    pub callable: bool,
}

/// Hands out connections.
pub trait DataSource: Send + Sync + Debug {
    /// Open a connection.
    ///
    /// # Errors
    ///
    /// `ConnectionError` when the backend cannot be reached.
    fn connection(&self, autocommit: bool) -> Result<Box<dyn Connection>>;
}

/// A live connection owned by one unit of work.
pub trait Connection: Send + Debug {
    /// Prepare `sql` (positional `?` markers).
    ///
    /// # Errors
    ///
    /// Backend errors for malformed SQL or a closed connection.
    fn prepare(&mut self, sql: &str, options: &StatementOptions) -> Result<Box<dyn Statement>>;

    /// # Errors
    ///
    /// Backend commit failures.
    fn commit(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Backend rollback failures.
    fn rollback(&mut self) -> Result<()>;

    /// # Errors
    ///
    /// Backend errors while releasing the connection.
    fn close(&mut self) -> Result<()>;

    fn is_autocommit(&self) -> bool;
}

/// A prepared statement. Parameter indexes are 1-based.
#[allow(clippy::missing_errors_doc)]
pub trait Statement: Send + Debug {
    fn sql(&self) -> &str;

    fn set_parameter(&mut self, index: usize, value: &Value) -> Result<()>;

    /// Declare an OUT/INOUT parameter of a callable statement.
    fn register_out_parameter(&mut self, index: usize, jdbc_type: Option<JdbcType>) -> Result<()> {
        let _ = (index, jdbc_type);
        Err(SqlMapperError::Unimplemented(
            "output parameters are not supported by this driver".into(),
        ))
    }

    /// Read back an OUT/INOUT parameter after execution.
    fn out_parameter(&mut self, index: usize) -> Result<Value> {
        let _ = index;
        Err(SqlMapperError::Unimplemented(
            "output parameters are not supported by this driver".into(),
        ))
    }

    fn clear_parameters(&mut self) -> Result<()>;

    fn execute_update(&mut self) -> Result<usize>;

    fn execute_query(&mut self) -> Result<ResultSet>;

    /// Execute and return rows lazily.
    ///
    /// The statement must stay open until the row source is exhausted or closed.
    fn open_cursor(&mut self) -> Result<Box<dyn RowSource>>;

    /// Queue the currently bound parameters as one batch entry.
    fn add_batch(&mut self) -> Result<()>;

    /// Run every queued entry, returning one update count per entry.
    fn execute_batch(&mut self) -> Result<Vec<usize>>;

    /// Keys generated by the most recent update, one per affected row or batch entry.
    fn generated_keys(&mut self) -> Result<Vec<Value>>;

    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Forward-only access to rows of an executing query.
#[allow(clippy::missing_errors_doc)]
pub trait RowSource: Send + Debug {
    fn columns(&self) -> Arc<Columns>;

    /// The next row, or `None` once drained.
    fn next_row(&mut self) -> Result<Option<Row>>;

    fn close(&mut self) -> Result<()>;
}
