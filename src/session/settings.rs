use std::collections::BTreeMap;
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

use crate::error::{Result, SqlMapperError};
use crate::translation::PlaceholderStyle;

/// Which executor strategy a session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    /// A fresh statement per call.
    #[default]
    Simple,
    /// Statements are kept by SQL text and reused until the next flush.
    Reuse,
    /// Consecutive updates are grouped into driver batches.
    Batch,
}

/// Lifetime of the per-session local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalCacheScope {
    #[default]
    Session,
    /// Cleared after every top-level query.
    Statement,
}

/// Process-wide settings, usually read from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Wrap every executor in the transactional cache layer.
    pub cache_enabled: bool,
    pub default_executor_type: ExecutorType,
    /// Seconds.
    pub default_statement_timeout: Option<u64>,
    pub default_fetch_size: Option<u32>,
    pub local_cache_scope: LocalCacheScope,
    pub placeholder_style: PlaceholderStyle,
    pub shrink_whitespace: bool,
    pub nullable_on_for_each: bool,
    /// Regex every `${}` substitution must fully match.
    pub injection_filter: Option<String>,
    /// Values for `${name}` substituted when templates are registered.
    pub variables: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            default_executor_type: ExecutorType::Simple,
            default_statement_timeout: None,
            default_fetch_size: None,
            local_cache_scope: LocalCacheScope::Session,
            placeholder_style: PlaceholderStyle::Plain,
            shrink_whitespace: false,
            nullable_on_for_each: false,
            injection_filter: None,
            variables: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// # Errors
    ///
    /// `ConfigError` when `json` is not a valid settings document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| SqlMapperError::ConfigError(format!("invalid settings: {e}")))
    }

    #[must_use]
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.default_statement_timeout.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let settings = Settings::from_json(
            r#"{"default_executor_type": "batch", "default_statement_timeout": 3,
                "placeholder_style": "postgres", "variables": {"schema": "app"}}"#,
        )
        .unwrap();
        assert!(settings.cache_enabled);
        assert_eq!(settings.default_executor_type, ExecutorType::Batch);
        assert_eq!(settings.statement_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(settings.placeholder_style, PlaceholderStyle::Postgres);
        assert_eq!(settings.local_cache_scope, LocalCacheScope::Session);
        assert_eq!(settings.variables.get("schema").map(String::as_str), Some("app"));
    }

    #[test]
    fn unknown_executor_type_is_rejected() {
        let err = Settings::from_json(r#"{"default_executor_type": "turbo"}"#).unwrap_err();
        assert!(matches!(err, SqlMapperError::ConfigError(_)));
    }

    #[test]
    fn executor_type_parses_from_cli_names() {
        assert_eq!(ExecutorType::from_str("reuse", true).unwrap(), ExecutorType::Reuse);
    }
}
