use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread;
use std::time::Duration;

use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use tracing::{debug, warn};

use super::params::sqlite_extract_value;
use crate::error::{Result, SqlMapperError};
use crate::results::{Columns, ResultSet};
use crate::types::Value;

/// Execution settings shipped with each command.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExecOptions {
    pub timeout: Option<Duration>,
    pub return_generated_keys: bool,
}

/// Per-connection settings fixed when the worker starts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerSettings {
    pub autocommit: bool,
    /// Busy timeout for statements that declare none.
    pub busy_timeout: Option<Duration>,
}

type Respond<T> = SyncSender<Result<T>>;

enum Command {
    Prepare {
        sql: Arc<String>,
        respond_to: Respond<()>,
    },
    Execute {
        sql: Arc<String>,
        params: Vec<SqlValue>,
        options: ExecOptions,
        respond_to: Respond<(usize, Vec<Value>)>,
    },
    ExecuteBatch {
        sql: Arc<String>,
        entries: Vec<Vec<SqlValue>>,
        options: ExecOptions,
        respond_to: Respond<(Vec<usize>, Vec<Value>)>,
    },
    Query {
        sql: Arc<String>,
        params: Vec<SqlValue>,
        options: ExecOptions,
        respond_to: Respond<ResultSet>,
    },
    OpenCursor {
        sql: Arc<String>,
        params: Vec<SqlValue>,
        options: ExecOptions,
        respond_to: Respond<Arc<Columns>>,
    },
    CursorNext {
        respond_to: Respond<Option<Vec<Value>>>,
    },
    CursorClose {
        respond_to: Respond<()>,
    },
    Commit {
        respond_to: Respond<()>,
    },
    Rollback {
        respond_to: Respond<()>,
    },
    Shutdown,
}

impl Command {
    /// Answer the command with an error instead of running it.
    fn reject(self, message: &str) {
        let err = || SqlMapperError::ExecutionError(message.to_string());
        match self {
            Command::Prepare { respond_to, .. }
            | Command::CursorClose { respond_to }
            | Command::Commit { respond_to }
            | Command::Rollback { respond_to } => {
                let _ = respond_to.send(Err(err()));
            }
            Command::Execute { respond_to, .. } => {
                let _ = respond_to.send(Err(err()));
            }
            Command::ExecuteBatch { respond_to, .. } => {
                let _ = respond_to.send(Err(err()));
            }
            Command::Query { respond_to, .. } => {
                let _ = respond_to.send(Err(err()));
            }
            Command::OpenCursor { respond_to, .. } => {
                let _ = respond_to.send(Err(err()));
            }
            Command::CursorNext { respond_to } => {
                let _ = respond_to.send(Err(err()));
            }
            Command::Shutdown => {}
        }
    }
}

/// A `SQLite` connection owned by a dedicated worker thread.
pub(crate) struct SqliteWorker {
    sender: Sender<Command>,
    name: String,
}

impl fmt::Debug for SqliteWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteWorker").field("name", &self.name).finish()
    }
}

impl SqliteWorker {
    /// Move `conn` onto a new worker thread.
    ///
    /// With autocommit off the worker opens a transaction before the first
    /// statement after each commit or rollback.
    pub(crate) fn spawn(conn: rusqlite::Connection, settings: WorkerSettings, name: String) -> Result<Self> {
        let (sender, receiver) = mpsc::channel::<Command>();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_sqlite_worker(&conn, settings, &receiver))
            .map_err(|err| {
                SqlMapperError::ConnectionError(format!(
                    "failed to spawn SQLite worker thread: {err}"
                ))
            })?;
        Ok(Self { sender, name })
    }

    fn request<T>(&self, what: &str, build: impl FnOnce(Respond<T>) -> Command) -> Result<T> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.sender
            .send(build(tx))
            .map_err(|_| SqlMapperError::ConnectionError("SQLite worker closed".into()))?;
        rx.recv().map_err(|_| {
            SqlMapperError::ConnectionError(format!("SQLite worker dropped while {what}"))
        })?
    }

    pub(crate) fn prepare(&self, sql: Arc<String>) -> Result<()> {
        self.request("preparing statement", |respond_to| Command::Prepare { sql, respond_to })
    }

    pub(crate) fn execute(
        &self,
        sql: Arc<String>,
        params: Vec<SqlValue>,
        options: ExecOptions,
    ) -> Result<(usize, Vec<Value>)> {
        self.request("executing update", |respond_to| Command::Execute {
            sql,
            params,
            options,
            respond_to,
        })
    }

    pub(crate) fn execute_batch(
        &self,
        sql: Arc<String>,
        entries: Vec<Vec<SqlValue>>,
        options: ExecOptions,
    ) -> Result<(Vec<usize>, Vec<Value>)> {
        self.request("executing batch", |respond_to| Command::ExecuteBatch {
            sql,
            entries,
            options,
            respond_to,
        })
    }

    pub(crate) fn query(
        &self,
        sql: Arc<String>,
        params: Vec<SqlValue>,
        options: ExecOptions,
    ) -> Result<ResultSet> {
        self.request("executing select", |respond_to| Command::Query {
            sql,
            params,
            options,
            respond_to,
        })
    }

    pub(crate) fn open_cursor(
        &self,
        sql: Arc<String>,
        params: Vec<SqlValue>,
        options: ExecOptions,
    ) -> Result<Arc<Columns>> {
        self.request("opening cursor", |respond_to| Command::OpenCursor {
            sql,
            params,
            options,
            respond_to,
        })
    }

    pub(crate) fn cursor_next(&self) -> Result<Option<Vec<Value>>> {
        self.request("fetching a row", |respond_to| Command::CursorNext { respond_to })
    }

    pub(crate) fn cursor_close(&self) -> Result<()> {
        self.request("closing cursor", |respond_to| Command::CursorClose { respond_to })
    }

    pub(crate) fn commit(&self) -> Result<()> {
        self.request("committing", |respond_to| Command::Commit { respond_to })
    }

    pub(crate) fn rollback(&self) -> Result<()> {
        self.request("rolling back", |respond_to| Command::Rollback { respond_to })
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

impl Drop for SqliteWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn begin_if_needed(conn: &rusqlite::Connection, autocommit: bool) -> Result<()> {
    if !autocommit && conn.is_autocommit() {
        conn.execute_batch("BEGIN")?;
    }
    Ok(())
}

/// A statement timeout lasts for that statement only.
fn apply_timeout(conn: &rusqlite::Connection, settings: WorkerSettings, options: ExecOptions) -> Result<()> {
    let timeout = options.timeout.or(settings.busy_timeout).unwrap_or(Duration::ZERO);
    conn.busy_timeout(timeout)?;
    Ok(())
}

fn run_sqlite_worker(conn: &rusqlite::Connection, settings: WorkerSettings, receiver: &Receiver<Command>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Prepare { sql, respond_to } => {
                let outcome = conn.prepare_cached(&sql).map(|_| ()).map_err(Into::into);
                let _ = respond_to.send(outcome);
            }
            Command::Execute {
                sql,
                params,
                options,
                respond_to,
            } => {
                let outcome = (|| -> Result<(usize, Vec<Value>)> {
                    apply_timeout(conn, settings, options)?;
                    begin_if_needed(conn, settings.autocommit)?;
                    let mut stmt = conn.prepare_cached(&sql)?;
                    let rows = stmt.execute(params_from_iter(params.iter()))?;
                    let keys = if options.return_generated_keys {
                        vec![Value::Int(conn.last_insert_rowid())]
                    } else {
                        Vec::new()
                    };
                    Ok((rows, keys))
                })();
                let _ = respond_to.send(outcome);
            }
            Command::ExecuteBatch {
                sql,
                entries,
                options,
                respond_to,
            } => {
                let outcome = (|| -> Result<(Vec<usize>, Vec<Value>)> {
                    apply_timeout(conn, settings, options)?;
                    begin_if_needed(conn, settings.autocommit)?;
                    let mut stmt = conn.prepare_cached(&sql)?;
                    let mut counts = Vec::with_capacity(entries.len());
                    let mut keys = Vec::new();
                    for params in &entries {
                        counts.push(stmt.execute(params_from_iter(params.iter()))?);
                        if options.return_generated_keys {
                            keys.push(Value::Int(conn.last_insert_rowid()));
                        }
                    }
                    Ok((counts, keys))
                })();
                let _ = respond_to.send(outcome);
            }
            Command::Query {
                sql,
                params,
                options,
                respond_to,
            } => {
                let outcome = (|| -> Result<ResultSet> {
                    apply_timeout(conn, settings, options)?;
                    begin_if_needed(conn, settings.autocommit)?;
                    let mut stmt = conn.prepare_cached(&sql)?;
                    build_result_set(&mut stmt, &params)
                })();
                let _ = respond_to.send(outcome);
            }
            Command::OpenCursor {
                sql,
                params,
                options,
                respond_to,
            } => {
                if !serve_cursor(conn, settings, receiver, &sql, &params, options, respond_to) {
                    break;
                }
            }
            Command::CursorNext { respond_to } => {
                let _ = respond_to.send(Ok(None));
            }
            Command::CursorClose { respond_to } => {
                let _ = respond_to.send(Ok(()));
            }
            Command::Commit { respond_to } => {
                let outcome = if conn.is_autocommit() {
                    Ok(())
                } else {
                    debug!("COMMIT");
                    conn.execute_batch("COMMIT").map_err(Into::into)
                };
                let _ = respond_to.send(outcome);
            }
            Command::Rollback { respond_to } => {
                let outcome = if conn.is_autocommit() {
                    Ok(())
                } else {
                    debug!("ROLLBACK");
                    conn.execute_batch("ROLLBACK").map_err(Into::into)
                };
                let _ = respond_to.send(outcome);
            }
            Command::Shutdown => break,
        }
    }
    if !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "rollback on worker shutdown failed");
        }
    }
}

/// Stream rows of one query until the cursor is closed. Other commands are refused
/// while the cursor is open. Returns `false` when the worker should stop.
#[allow(clippy::too_many_arguments)]
fn serve_cursor(
    conn: &rusqlite::Connection,
    settings: WorkerSettings,
    receiver: &Receiver<Command>,
    sql: &str,
    params: &[SqlValue],
    options: ExecOptions,
    respond_to: Respond<Arc<Columns>>,
) -> bool {
    let opened = (|| -> Result<_> {
        apply_timeout(conn, settings, options)?;
        begin_if_needed(conn, settings.autocommit)?;
        Ok(conn.prepare_cached(sql)?)
    })();
    let mut stmt = match opened {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = respond_to.send(Err(e));
            return true;
        }
    };
    let columns = Columns::new(stmt.column_names().iter().map(ToString::to_string).collect());
    let column_count = columns.len();
    let mut rows = match stmt.query(params_from_iter(params.iter())) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = respond_to.send(Err(e.into()));
            return true;
        }
    };
    if respond_to.send(Ok(columns)).is_err() {
        return true;
    }
    let mut drained = false;
    loop {
        match receiver.recv() {
            Ok(Command::CursorNext { respond_to }) => {
                let outcome = if drained {
                    Ok(None)
                } else {
                    next_values(&mut rows, column_count)
                };
                if matches!(outcome, Ok(None)) {
                    drained = true;
                }
                let _ = respond_to.send(outcome);
            }
            Ok(Command::CursorClose { respond_to }) => {
                let _ = respond_to.send(Ok(()));
                return true;
            }
            Ok(Command::Shutdown) | Err(_) => return false,
            Ok(other) => other.reject("the SQLite connection is busy with an open cursor"),
        }
    }
}

fn next_values(rows: &mut rusqlite::Rows<'_>, column_count: usize) -> Result<Option<Vec<Value>>> {
    match rows.next()? {
        Some(row) => {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(sqlite_extract_value(row, i)?);
            }
            Ok(Some(values))
        }
        None => Ok(None),
    }
}

/// Run a query and collect every row.
///
/// # Errors
///
/// Returns `SqliteError` if query execution or value extraction fails.
fn build_result_set(stmt: &mut rusqlite::Statement<'_>, params: &[SqlValue]) -> Result<ResultSet> {
    let columns = Columns::new(stmt.column_names().iter().map(ToString::to_string).collect());
    let column_count = columns.len();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut result_set = ResultSet::with_capacity(10);
    result_set.set_column_names(columns);
    while let Some(values) = next_values(&mut rows, column_count)? {
        result_set.add_row_values(values);
    }
    Ok(result_set)
}
