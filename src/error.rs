use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;

/// Every failure surfaced by the mapper.
///
/// Configuration problems are raised while a [`crate::session::Configuration`] is being
/// built; binding and expression problems while a statement is compiled; execution
/// problems come from the driver. [`SqlMapperError::Wrapped`] adds context without
/// dropping the original cause.
#[derive(Debug, Error)]
pub enum SqlMapperError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Binding error in `{fragment}`: {message}")]
    BindingError { fragment: String, message: String },

    #[error("Expression error: {0}")]
    ExpressionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Plugin error: {0}")]
    PluginError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Executor closed: {0}")]
    ClosedError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<SqlMapperError>,
    },
}

impl SqlMapperError {
    /// Attach context to an error while keeping it as the source.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        SqlMapperError::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any [`SqlMapperError::Wrapped`] layers.
    #[must_use]
    pub fn root_cause(&self) -> &SqlMapperError {
        let mut current = self;
        while let SqlMapperError::Wrapped { source, .. } = current {
            current = source;
        }
        current
    }
}

pub type Result<T, E = SqlMapperError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_cause_unwraps_context_layers() {
        let err = SqlMapperError::ExecutionError("disk full".into())
            .context("flushing batch")
            .context("commit");
        assert!(matches!(err.root_cause(), SqlMapperError::ExecutionError(msg) if msg == "disk full"));
        assert_eq!(
            err.to_string(),
            "commit: flushing batch: SQL execution error: disk full"
        );
    }
}
