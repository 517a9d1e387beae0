use std::sync::Arc;

use super::params::Params;
use super::worker::{ExecOptions, SqliteWorker};
use crate::driver::{Connection, RowSource, Statement, StatementOptions};
use crate::error::{Result, SqlMapperError};
use crate::results::{Columns, ResultSet, Row};
use crate::types::Value;

/// A `SQLite` connection served by its own worker thread.
#[derive(Debug)]
pub struct SqliteConnection {
    worker: Arc<SqliteWorker>,
    autocommit: bool,
    closed: bool,
}

impl SqliteConnection {
    pub(crate) fn new(worker: SqliteWorker, autocommit: bool) -> Self {
        Self {
            worker: Arc::new(worker),
            autocommit,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SqlMapperError::ClosedError("SQLite connection is closed".into()));
        }
        Ok(())
    }
}

impl Connection for SqliteConnection {
    fn prepare(&mut self, sql: &str, options: &StatementOptions) -> Result<Box<dyn Statement>> {
        self.ensure_open()?;
        let sql = Arc::new(sql.to_string());
        self.worker.prepare(sql.clone())?;
        Ok(Box::new(SqliteStatement {
            worker: self.worker.clone(),
            sql,
            options: ExecOptions {
                timeout: options.timeout,
                return_generated_keys: options.return_generated_keys,
            },
            params: Params::default(),
            batch: Vec::new(),
            generated_keys: Vec::new(),
            closed: false,
        }))
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.worker.commit()
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.worker.rollback()
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.worker.shutdown();
        }
        Ok(())
    }

    fn is_autocommit(&self) -> bool {
        self.autocommit
    }
}

/// A prepared statement; parameters are buffered locally and shipped on execution.
#[derive(Debug)]
pub struct SqliteStatement {
    worker: Arc<SqliteWorker>,
    sql: Arc<String>,
    options: ExecOptions,
    params: Params,
    batch: Vec<Vec<rusqlite::types::Value>>,
    generated_keys: Vec<Value>,
    closed: bool,
}

impl SqliteStatement {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SqlMapperError::ClosedError(format!(
                "statement `{}` is closed",
                self.sql
            )));
        }
        Ok(())
    }
}

impl Statement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn set_parameter(&mut self, index: usize, value: &Value) -> Result<()> {
        self.ensure_open()?;
        if index == 0 {
            return Err(SqlMapperError::ExecutionError(
                "parameter indexes start at 1".into(),
            ));
        }
        self.params.set(index, value);
        Ok(())
    }

    fn clear_parameters(&mut self) -> Result<()> {
        self.params.clear();
        Ok(())
    }

    fn execute_update(&mut self) -> Result<usize> {
        self.ensure_open()?;
        let (count, keys) =
            self.worker
                .execute(self.sql.clone(), self.params.as_values().to_vec(), self.options)?;
        self.generated_keys = keys;
        Ok(count)
    }

    fn execute_query(&mut self) -> Result<ResultSet> {
        self.ensure_open()?;
        self.worker
            .query(self.sql.clone(), self.params.as_values().to_vec(), self.options)
    }

    fn open_cursor(&mut self) -> Result<Box<dyn RowSource>> {
        self.ensure_open()?;
        let columns =
            self.worker
                .open_cursor(self.sql.clone(), self.params.as_values().to_vec(), self.options)?;
        Ok(Box::new(SqliteRows {
            worker: self.worker.clone(),
            columns,
            done: false,
        }))
    }

    fn add_batch(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.batch.push(self.params.as_values().to_vec());
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<usize>> {
        self.ensure_open()?;
        let entries = std::mem::take(&mut self.batch);
        let (counts, keys) = self
            .worker
            .execute_batch(self.sql.clone(), entries, self.options)?;
        self.generated_keys = keys;
        Ok(counts)
    }

    fn generated_keys(&mut self) -> Result<Vec<Value>> {
        Ok(std::mem::take(&mut self.generated_keys))
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.batch.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Rows streamed from the worker one fetch at a time.
#[derive(Debug)]
pub struct SqliteRows {
    worker: Arc<SqliteWorker>,
    columns: Arc<Columns>,
    done: bool,
}

impl RowSource for SqliteRows {
    fn columns(&self) -> Arc<Columns> {
        self.columns.clone()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.done {
            return Ok(None);
        }
        match self.worker.cursor_next()? {
            Some(values) => Ok(Some(Row::new(self.columns.clone(), values))),
            None => {
                self.close()?;
                Ok(None)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if !self.done {
            self.done = true;
            self.worker.cursor_close()?;
        }
        Ok(())
    }
}

impl Drop for SqliteRows {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
