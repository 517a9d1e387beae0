use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Connection, DataSource};
use crate::error::{Result, SqlMapperError};

/// The connection holder for one unit of work.
#[allow(clippy::missing_errors_doc)]
pub trait Transaction: Send + Debug {
    /// The connection, opened on first use.
    fn connection(&mut self) -> Result<&mut dyn Connection>;

    fn commit(&mut self) -> Result<()>;

    fn rollback(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Upper bound applied to every statement timeout in this unit of work.
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

/// A [`Transaction`] over a [`DataSource`] that opens its connection lazily and only
/// forwards commit/rollback when a connection exists and autocommit is off.
#[derive(Debug)]
pub struct ManagedTransaction {
    data_source: Arc<dyn DataSource>,
    autocommit: bool,
    timeout: Option<Duration>,
    connection: Option<Box<dyn Connection>>,
    closed: bool,
}

impl ManagedTransaction {
    #[must_use]
    pub fn new(data_source: Arc<dyn DataSource>, autocommit: bool) -> Self {
        Self {
            data_source,
            autocommit,
            timeout: None,
            connection: None,
            closed: false,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn manual_commit(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|conn| !conn.is_autocommit())
    }
}

impl Transaction for ManagedTransaction {
    fn connection(&mut self) -> Result<&mut dyn Connection> {
        if self.closed {
            return Err(SqlMapperError::ClosedError("transaction already closed".into()));
        }
        if self.connection.is_none() {
            debug!(autocommit = self.autocommit, "opening connection");
            self.connection = Some(self.data_source.connection(self.autocommit)?);
        }
        match self.connection.as_deref_mut() {
            Some(conn) => Ok(conn),
            None => Err(SqlMapperError::ConnectionError("connection unavailable".into())),
        }
    }

    fn commit(&mut self) -> Result<()> {
        if self.manual_commit() {
            if let Some(conn) = self.connection.as_deref_mut() {
                debug!("committing connection");
                conn.commit()?;
            }
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if self.manual_commit() {
            if let Some(conn) = self.connection.as_deref_mut() {
                debug!("rolling back connection");
                conn.rollback()?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        if let Some(mut conn) = self.connection.take() {
            if !conn.is_autocommit() {
                // never leave an open transaction behind on a released connection
                if let Err(e) = conn.rollback() {
                    warn!(error = %e, "rollback before close failed");
                }
            }
            conn.close()?;
        }
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
