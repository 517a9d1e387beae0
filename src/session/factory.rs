use std::sync::Arc;

use tracing::debug;

use super::configuration::Configuration;
use super::session::SqlSession;
use super::settings::ExecutorType;
use crate::driver::{ManagedTransaction, Transaction};
use crate::error::{Result, SqlMapperError};

/// Opens sessions over a built [`Configuration`].
#[derive(Debug, Clone)]
pub struct SqlSessionFactory {
    configuration: Arc<Configuration>,
}

impl SqlSessionFactory {
    #[must_use]
    pub fn new(configuration: Arc<Configuration>) -> Self {
        Self { configuration }
    }

    #[must_use]
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// A session on the default executor type with autocommit off.
    ///
    /// # Errors
    ///
    /// `ConfigError` when the configuration has no data source.
    pub fn open_session(&self) -> Result<SqlSession> {
        self.open_session_with(self.configuration.settings().default_executor_type, false)
    }

    /// # Errors
    ///
    /// `ConfigError` when the configuration has no data source.
    pub fn open_session_with(&self, executor_type: ExecutorType, autocommit: bool) -> Result<SqlSession> {
        let data_source = self.configuration.data_source().cloned().ok_or_else(|| {
            SqlMapperError::ConfigError("no data source configured; use open_session_with_transaction".into())
        })?;
        let transaction = ManagedTransaction::new(data_source, autocommit);
        Ok(self.open_session_with_transaction(executor_type, Box::new(transaction), autocommit))
    }

    /// A session over a caller-supplied transaction.
    #[must_use]
    pub fn open_session_with_transaction(
        &self,
        executor_type: ExecutorType,
        transaction: Box<dyn Transaction>,
        autocommit: bool,
    ) -> SqlSession {
        debug!(?executor_type, autocommit, "opening session");
        let executor = self.configuration.new_executor(executor_type, transaction);
        SqlSession::new(self.configuration.clone(), executor, autocommit)
    }
}
