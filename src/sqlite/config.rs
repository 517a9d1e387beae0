use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tracing::debug;

use super::connection::SqliteConnection;
use super::worker::{SqliteWorker, WorkerSettings};
use crate::driver::{Connection, DataSource};
use crate::error::{Result, SqlMapperError};

/// Options for opening `SQLite` connections.
#[derive(Debug, Clone)]
pub struct SqliteOptions {
    pub db_path: String,
    pub busy_timeout: Option<Duration>,
    pub wal: bool,
}

impl SqliteOptions {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            db_path,
            busy_timeout: Some(Duration::from_secs(5)),
            wal: true,
        }
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Option<Duration>) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn with_wal(mut self, wal: bool) -> Self {
        self.wal = wal;
        self
    }
}

/// Fluent builder for `SQLite` options.
#[derive(Debug, Clone)]
pub struct SqliteOptionsBuilder {
    opts: SqliteOptions,
}

impl SqliteOptionsBuilder {
    #[must_use]
    pub fn new(db_path: String) -> Self {
        Self {
            opts: SqliteOptions::new(db_path),
        }
    }

    #[must_use]
    pub fn busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.opts.busy_timeout = Some(busy_timeout);
        self
    }

    #[must_use]
    pub fn wal(mut self, wal: bool) -> Self {
        self.opts.wal = wal;
        self
    }

    #[must_use]
    pub fn finish(self) -> SqliteOptions {
        self.opts
    }

    /// Build a data source and open one connection as a smoke test.
    ///
    /// # Errors
    ///
    /// Returns `SqliteError` if the database cannot be opened.
    pub fn build(self) -> Result<SqliteDataSource> {
        SqliteDataSource::new(self.finish())
    }
}

/// Opens one worker-backed connection per unit of work.
///
/// `:memory:` databases are private to each connection.
#[derive(Debug)]
pub struct SqliteDataSource {
    options: SqliteOptions,
    opened: AtomicUsize,
}

impl SqliteDataSource {
    #[must_use]
    pub fn builder(db_path: String) -> SqliteOptionsBuilder {
        SqliteOptionsBuilder::new(db_path)
    }

    /// # Errors
    ///
    /// Returns `SqliteError` if the database cannot be opened.
    pub fn new(options: SqliteOptions) -> Result<Self> {
        let source = Self {
            options,
            opened: AtomicUsize::new(0),
        };
        let conn = source.open_raw()?;
        if source.options.wal && source.options.db_path != ":memory:" {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        Ok(source)
    }

    #[must_use]
    pub fn options(&self) -> &SqliteOptions {
        &self.options
    }

    fn open_raw(&self) -> Result<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(&self.options.db_path).map_err(|e| {
            SqlMapperError::ConnectionError(format!(
                "Failed to open SQLite database `{}`: {e}",
                self.options.db_path
            ))
        })?;
        if let Some(timeout) = self.options.busy_timeout {
            conn.busy_timeout(timeout)?;
        }
        Ok(conn)
    }

    /// Run a multi-statement script (schema setup, seed data) outside any session.
    ///
    /// # Errors
    ///
    /// Returns `SqliteError` if any statement fails.
    pub fn execute_script(&self, sql: &str) -> Result<()> {
        let conn = self.open_raw()?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

impl DataSource for SqliteDataSource {
    fn connection(&self, autocommit: bool) -> Result<Box<dyn Connection>> {
        let conn = self.open_raw()?;
        let n = self.opened.fetch_add(1, Ordering::Relaxed);
        let settings = WorkerSettings {
            autocommit,
            busy_timeout: self.options.busy_timeout,
        };
        let worker = SqliteWorker::spawn(conn, settings, format!("sql-mapper-sqlite-{n}"))?;
        debug!(db_path = %self.options.db_path, autocommit, "opened SQLite connection");
        Ok(Box::new(SqliteConnection::new(worker, autocommit)))
    }
}
