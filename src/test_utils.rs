//! A recording in-memory driver for exercising the pipeline without a database.
//!
//! [`MockDataSource`] hands out connections whose statements log every execution,
//! answer queries from canned rows matched by SQL fragment, and count resource
//! acquisition and release in [`DriverStats`].

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::driver::{Connection, DataSource, RowSource, Statement, StatementOptions};
use crate::error::{Result, SqlMapperError};
use crate::results::{Columns, ResultSet, Row};
use crate::types::{JdbcType, Value};

/// Counters shared by every connection of one [`MockDataSource`].
#[derive(Debug, Default)]
pub struct DriverStats {
    connections_opened: AtomicUsize,
    connections_closed: AtomicUsize,
    prepared: AtomicUsize,
    statements_closed: AtomicUsize,
    updates: AtomicUsize,
    queries: AtomicUsize,
    batches: AtomicUsize,
    cursors_opened: AtomicUsize,
    cursors_closed: AtomicUsize,
    rows_fetched: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

macro_rules! counters {
    ($($name:ident),* $(,)?) => {
        impl DriverStats {
            $(
                #[must_use]
                pub fn $name(&self) -> usize {
                    self.$name.load(Ordering::SeqCst)
                }
            )*
        }
    };
}

counters!(
    connections_opened,
    connections_closed,
    prepared,
    statements_closed,
    updates,
    queries,
    batches,
    cursors_opened,
    cursors_closed,
    rows_fetched,
    commits,
    rollbacks,
);

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::SeqCst);
}

/// One execution seen by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub sql: String,
    pub parameters: Vec<Value>,
}

#[derive(Debug, Clone)]
struct CannedRows {
    fragment: String,
    columns: Arc<Columns>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct Script {
    rows: Vec<CannedRows>,
    update_count: usize,
    failing: Vec<String>,
    out_values: BTreeMap<usize, Value>,
}

impl Script {
    fn rows_for(&self, sql: &str) -> (Arc<Columns>, Vec<Vec<Value>>) {
        self.rows
            .iter()
            .find(|canned| sql.contains(&canned.fragment))
            .map_or_else(
                || (Columns::new(Vec::new()), Vec::new()),
                |canned| (canned.columns.clone(), canned.rows.clone()),
            )
    }

    fn check(&self, sql: &str) -> Result<()> {
        match self.failing.iter().find(|fragment| sql.contains(fragment.as_str())) {
            Some(fragment) => Err(SqlMapperError::ExecutionError(format!(
                "scripted failure for `{fragment}`"
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    stats: Arc<DriverStats>,
    script: Mutex<Script>,
    log: Mutex<Vec<Execution>>,
    next_key: AtomicI64,
}

impl Shared {
    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, sql: &str, parameters: &[Value]) {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Execution {
                sql: sql.to_string(),
                parameters: parameters.to_vec(),
            });
    }

    fn next_key(&self) -> Value {
        Value::Int(self.next_key.fetch_add(1, Ordering::SeqCst))
    }
}

/// In-memory [`DataSource`] with scripted answers.
#[derive(Debug, Clone)]
pub struct MockDataSource {
    shared: Arc<Shared>,
}

impl Default for MockDataSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDataSource {
    #[must_use]
    pub fn new() -> Self {
        let shared = Shared {
            next_key: AtomicI64::new(1),
            ..Shared::default()
        };
        shared.script().update_count = 1;
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Queries whose SQL contains `fragment` return these rows.
    #[must_use]
    pub fn with_rows(self, fragment: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.shared.script().rows.push(CannedRows {
            fragment: fragment.to_string(),
            columns: Columns::new(columns.iter().map(ToString::to_string).collect()),
            rows,
        });
        self
    }

    /// Count reported for every update and batch entry.
    #[must_use]
    pub fn with_update_count(self, count: usize) -> Self {
        self.shared.script().update_count = count;
        self
    }

    /// Executions whose SQL contains `fragment` fail.
    #[must_use]
    pub fn fail_on(self, fragment: &str) -> Self {
        self.shared.script().failing.push(fragment.to_string());
        self
    }

    /// Value reported for the OUT parameter at `index`.
    #[must_use]
    pub fn with_out_parameter(self, index: usize, value: Value) -> Self {
        self.shared.script().out_values.insert(index, value);
        self
    }

    #[must_use]
    pub fn stats(&self) -> Arc<DriverStats> {
        self.shared.stats.clone()
    }

    /// Every execution so far, in order. Batch entries appear individually.
    #[must_use]
    pub fn executions(&self) -> Vec<Execution> {
        self.shared
            .log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DataSource for MockDataSource {
    fn connection(&self, autocommit: bool) -> Result<Box<dyn Connection>> {
        bump(&self.shared.stats.connections_opened);
        Ok(Box::new(MockConnection {
            shared: self.shared.clone(),
            autocommit,
            closed: false,
        }))
    }
}

#[derive(Debug)]
pub struct MockConnection {
    shared: Arc<Shared>,
    autocommit: bool,
    closed: bool,
}

impl Connection for MockConnection {
    fn prepare(&mut self, sql: &str, options: &StatementOptions) -> Result<Box<dyn Statement>> {
        if self.closed {
            return Err(SqlMapperError::ClosedError("mock connection is closed".into()));
        }
        bump(&self.shared.stats.prepared);
        Ok(Box::new(MockStatement {
            shared: self.shared.clone(),
            sql: sql.to_string(),
            options: options.clone(),
            parameters: Vec::new(),
            batch: Vec::new(),
            keys: Vec::new(),
            out_registered: BTreeMap::new(),
            closed: false,
        }))
    }

    fn commit(&mut self) -> Result<()> {
        bump(&self.shared.stats.commits);
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        bump(&self.shared.stats.rollbacks);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            bump(&self.shared.stats.connections_closed);
        }
        Ok(())
    }

    fn is_autocommit(&self) -> bool {
        self.autocommit
    }
}

#[derive(Debug)]
pub struct MockStatement {
    shared: Arc<Shared>,
    sql: String,
    options: StatementOptions,
    parameters: Vec<Value>,
    batch: Vec<Vec<Value>>,
    keys: Vec<Value>,
    out_registered: BTreeMap<usize, Option<JdbcType>>,
    closed: bool,
}

impl MockStatement {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SqlMapperError::ClosedError(format!("statement `{}` is closed", self.sql)));
        }
        Ok(())
    }

    fn run(&self) -> Result<(Arc<Columns>, Vec<Vec<Value>>)> {
        self.ensure_open()?;
        let script = self.shared.script();
        script.check(&self.sql)?;
        self.shared.record(&self.sql, &self.parameters);
        Ok(script.rows_for(&self.sql))
    }
}

impl Statement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn set_parameter(&mut self, index: usize, value: &Value) -> Result<()> {
        self.ensure_open()?;
        if index == 0 {
            return Err(SqlMapperError::ExecutionError("parameter indexes start at 1".into()));
        }
        if self.parameters.len() < index {
            self.parameters.resize(index, Value::Null);
        }
        self.parameters[index - 1] = value.clone();
        Ok(())
    }

    fn register_out_parameter(&mut self, index: usize, jdbc_type: Option<JdbcType>) -> Result<()> {
        if !self.options.callable {
            return Err(SqlMapperError::ExecutionError(
                "OUT parameters need a callable statement".into(),
            ));
        }
        self.out_registered.insert(index, jdbc_type);
        Ok(())
    }

    fn out_parameter(&mut self, index: usize) -> Result<Value> {
        if !self.out_registered.contains_key(&index) {
            return Err(SqlMapperError::ExecutionError(format!(
                "parameter #{index} was not registered as OUT"
            )));
        }
        Ok(self
            .shared
            .script()
            .out_values
            .get(&index)
            .cloned()
            .unwrap_or(Value::Null))
    }

    fn clear_parameters(&mut self) -> Result<()> {
        self.parameters.clear();
        Ok(())
    }

    fn execute_update(&mut self) -> Result<usize> {
        self.ensure_open()?;
        let count = {
            let script = self.shared.script();
            script.check(&self.sql)?;
            script.update_count
        };
        self.shared.record(&self.sql, &self.parameters);
        bump(&self.shared.stats.updates);
        self.keys = if self.options.return_generated_keys {
            vec![self.shared.next_key()]
        } else {
            Vec::new()
        };
        Ok(count)
    }

    fn execute_query(&mut self) -> Result<ResultSet> {
        let (columns, rows) = self.run()?;
        bump(&self.shared.stats.queries);
        let mut result_set = ResultSet::with_capacity(rows.len());
        result_set.set_column_names(columns);
        for values in rows {
            result_set.add_row_values(values);
        }
        Ok(result_set)
    }

    fn open_cursor(&mut self) -> Result<Box<dyn RowSource>> {
        let (columns, rows) = self.run()?;
        bump(&self.shared.stats.cursors_opened);
        Ok(Box::new(MockRows {
            shared: self.shared.clone(),
            columns,
            rows: rows.into(),
            closed: false,
        }))
    }

    fn add_batch(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.batch.push(std::mem::take(&mut self.parameters));
        Ok(())
    }

    fn execute_batch(&mut self) -> Result<Vec<usize>> {
        self.ensure_open()?;
        let count = {
            let script = self.shared.script();
            script.check(&self.sql)?;
            script.update_count
        };
        bump(&self.shared.stats.batches);
        let entries = std::mem::take(&mut self.batch);
        self.keys.clear();
        for parameters in &entries {
            self.shared.record(&self.sql, parameters);
            if self.options.return_generated_keys {
                self.keys.push(self.shared.next_key());
            }
        }
        Ok(vec![count; entries.len()])
    }

    fn generated_keys(&mut self) -> Result<Vec<Value>> {
        Ok(std::mem::take(&mut self.keys))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            bump(&self.shared.stats.statements_closed);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[derive(Debug)]
pub struct MockRows {
    shared: Arc<Shared>,
    columns: Arc<Columns>,
    rows: VecDeque<Vec<Value>>,
    closed: bool,
}

impl RowSource for MockRows {
    fn columns(&self) -> Arc<Columns> {
        self.columns.clone()
    }

    fn next_row(&mut self) -> Result<Option<Row>> {
        if self.closed {
            return Ok(None);
        }
        Ok(self.rows.pop_front().map(|values| {
            bump(&self.shared.stats.rows_fetched);
            Row::new(self.columns.clone(), values)
        }))
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            bump(&self.shared.stats.cursors_closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_replay_canned_rows_and_count_closes() {
        let source = MockDataSource::new().with_rows("from users", &["id"], vec![vec![1.into()]]);
        let mut conn = source.connection(false).unwrap();
        let mut stmt = conn
            .prepare("select id from users where id = ?", &StatementOptions::default())
            .unwrap();
        stmt.set_parameter(1, &Value::Int(1)).unwrap();
        assert_eq!(stmt.execute_query().unwrap().len(), 1);
        stmt.close().unwrap();
        stmt.close().unwrap();

        let stats = source.stats();
        assert_eq!(stats.prepared(), 1);
        assert_eq!(stats.statements_closed(), 1);
        assert_eq!(source.executions()[0].parameters, vec![Value::Int(1)]);
    }
}
