//! Per-statement metadata: what kind of statement it is, how it is cached, and how its
//! results are shaped.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::builder::{BoundSql, CompileEnv, SqlSource};
use crate::cache::Cache;
use crate::error::{Result, SqlMapperError};
use crate::results::RowMapper;
use crate::scripting::{LanguageDriver, SqlNode};
use crate::types::{Value, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlCommandType {
    Select,
    Insert,
    Update,
    Delete,
    Flush,
}

/// How the underlying statement is prepared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StatementType {
    /// Plain statement: the SQL is sent as-is with no bound parameters.
    Statement,
    #[default]
    Prepared,
    /// Stored-procedure call; OUT/INOUT parameters are registered with the driver.
    Callable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResultSetType {
    #[default]
    Default,
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

/// Post-update key retrieval.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum KeyGenerator {
    #[default]
    None,
    /// Write the driver's generated key into `key_property` of the parameter object.
    Generated { key_property: String },
}

impl KeyGenerator {
    /// Copy generated keys into the parameter objects, one key per object.
    ///
    /// A list parameter receives one key per element.
    ///
    /// # Errors
    ///
    /// `ExecutionError` when the key property cannot be assigned.
    pub fn assign_keys(&self, parameter: &mut Value, keys: &[Value]) -> Result<()> {
        let KeyGenerator::Generated { key_property } = self else {
            return Ok(());
        };
        match parameter {
            Value::List(items) => {
                for (item, key) in items.iter_mut().zip(keys) {
                    item.set_path(key_property, key.clone())?;
                }
                Ok(())
            }
            Value::Map(_) | Value::Record(_) => match keys.last() {
                Some(key) => parameter.set_path(key_property, key.clone()),
                None => Ok(()),
            },
            // scalars and nulls have nowhere to hold a key
            _ => Ok(()),
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !matches!(self, KeyGenerator::None)
    }
}

/// Paging applied while rows are mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowBounds {
    pub offset: usize,
    pub limit: usize,
}

impl RowBounds {
    pub const NO_ROW_OFFSET: usize = 0;
    pub const NO_ROW_LIMIT: usize = usize::MAX;

    #[must_use]
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        self.offset == Self::NO_ROW_OFFSET && self.limit == Self::NO_ROW_LIMIT
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::new(Self::NO_ROW_OFFSET, Self::NO_ROW_LIMIT)
    }
}

/// A registered statement.
#[derive(Clone)]
pub struct MappedStatement {
    pub id: String,
    pub command_type: SqlCommandType,
    pub statement_type: StatementType,
    pub sql_source: SqlSource,
    pub parameter_type: ValueType,
    pub cache: Option<Arc<dyn Cache>>,
    pub use_cache: bool,
    pub flush_cache_required: bool,
    pub timeout: Option<Duration>,
    pub fetch_size: Option<u32>,
    pub result_set_type: Option<ResultSetType>,
    pub key_generator: KeyGenerator,
    pub row_mapper: RowMapper,
    pub database_id: Option<String>,
}

impl fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("command_type", &self.command_type)
            .field("statement_type", &self.statement_type)
            .field("dynamic", &self.sql_source.is_dynamic())
            .field("cache", &self.cache.as_ref().map(|c| c.id().to_string()))
            .field("use_cache", &self.use_cache)
            .field("flush_cache_required", &self.flush_cache_required)
            .finish_non_exhaustive()
    }
}

impl MappedStatement {
    /// Compile the SQL for one invocation.
    ///
    /// # Errors
    ///
    /// Template evaluation errors, wrapped with the statement id.
    pub fn bound_sql(&self, parameter: &Value, env: &CompileEnv<'_>) -> Result<BoundSql> {
        self.sql_source
            .bound_sql(parameter, env)
            .map_err(|e| e.context(format!("statement `{}`", self.id)))
    }

    #[must_use]
    pub fn is_select(&self) -> bool {
        self.command_type == SqlCommandType::Select
    }
}

/// Declares a statement; compiled by the configuration builder.
#[derive(Debug, Clone)]
pub struct MappedStatementBuilder {
    id: String,
    command_type: SqlCommandType,
    template: SqlNode,
    statement_type: StatementType,
    parameter_type: Option<String>,
    cache: Option<String>,
    use_cache: Option<bool>,
    flush_cache_required: Option<bool>,
    timeout: Option<Duration>,
    fetch_size: Option<u32>,
    result_set_type: Option<ResultSetType>,
    key_generator: KeyGenerator,
    row_mapper: RowMapper,
    database_id: Option<String>,
}

impl MappedStatementBuilder {
    #[must_use]
    pub fn new(id: impl Into<String>, command_type: SqlCommandType, template: impl Into<SqlNode>) -> Self {
        Self {
            id: id.into(),
            command_type,
            template: template.into(),
            statement_type: StatementType::default(),
            parameter_type: None,
            cache: None,
            use_cache: None,
            flush_cache_required: None,
            timeout: None,
            fetch_size: None,
            result_set_type: None,
            key_generator: KeyGenerator::None,
            row_mapper: RowMapper::default(),
            database_id: None,
        }
    }

    #[must_use]
    pub fn select(id: impl Into<String>, template: impl Into<SqlNode>) -> Self {
        Self::new(id, SqlCommandType::Select, template)
    }

    #[must_use]
    pub fn insert(id: impl Into<String>, template: impl Into<SqlNode>) -> Self {
        Self::new(id, SqlCommandType::Insert, template)
    }

    #[must_use]
    pub fn update(id: impl Into<String>, template: impl Into<SqlNode>) -> Self {
        Self::new(id, SqlCommandType::Update, template)
    }

    #[must_use]
    pub fn delete(id: impl Into<String>, template: impl Into<SqlNode>) -> Self {
        Self::new(id, SqlCommandType::Delete, template)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Qualify the id with a mapper namespace: `find` becomes `users.find`.
    pub(crate) fn namespaced(mut self, namespace: &str) -> Self {
        self.id = format!("{namespace}.{}", self.id);
        self
    }

    pub(crate) fn declared_database_id(&self) -> Option<&str> {
        self.database_id.as_deref()
    }

    #[must_use]
    pub fn statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement_type = statement_type;
        self
    }

    /// Declared parameter type name (alias, builtin or record type).
    #[must_use]
    pub fn parameter_type(mut self, type_name: impl Into<String>) -> Self {
        self.parameter_type = Some(type_name.into());
        self
    }

    /// Second-level cache this statement reads and invalidates.
    #[must_use]
    pub fn cache(mut self, cache_id: impl Into<String>) -> Self {
        self.cache = Some(cache_id.into());
        self
    }

    #[must_use]
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = Some(use_cache);
        self
    }

    #[must_use]
    pub fn flush_cache(mut self, flush: bool) -> Self {
        self.flush_cache_required = Some(flush);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    #[must_use]
    pub fn result_set_type(mut self, result_set_type: ResultSetType) -> Self {
        self.result_set_type = Some(result_set_type);
        self
    }

    #[must_use]
    pub fn generated_key(mut self, key_property: impl Into<String>) -> Self {
        self.key_generator = KeyGenerator::Generated {
            key_property: key_property.into(),
        };
        self
    }

    #[must_use]
    pub fn row_mapper(mut self, row_mapper: RowMapper) -> Self {
        self.row_mapper = row_mapper;
        self
    }

    #[must_use]
    pub fn database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = Some(database_id.into());
        self
    }

    /// Compile into a [`MappedStatement`].
    ///
    /// Selects use the cache and do not flush it by default; every other command
    /// flushes and bypasses it.
    ///
    /// # Errors
    ///
    /// `ConfigError` for unknown parameter types or caches, and any template error.
    pub(crate) fn build(
        self,
        driver: &LanguageDriver,
        env: &CompileEnv<'_>,
        variables: &BTreeMap<String, String>,
        caches: &BTreeMap<String, Arc<dyn Cache>>,
    ) -> Result<MappedStatement> {
        let id = self.id;
        let wrap = |e: SqlMapperError| e.context(format!("statement `{id}`"));
        let is_select = self.command_type == SqlCommandType::Select;
        let parameter_type = match &self.parameter_type {
            Some(name) => env.registry.resolve_alias(name).map_err(wrap)?,
            None => ValueType::Any,
        };
        let cache = match &self.cache {
            Some(cache_id) => Some(caches.get(cache_id).cloned().ok_or_else(|| {
                wrap(SqlMapperError::ConfigError(format!(
                    "no cache named `{cache_id}`"
                )))
            })?),
            None => None,
        };
        let sql_source = driver
            .create_sql_source(self.template, &parameter_type, variables, env)
            .map_err(wrap)?;
        Ok(MappedStatement {
            command_type: self.command_type,
            statement_type: self.statement_type,
            sql_source,
            parameter_type,
            cache,
            use_cache: self.use_cache.unwrap_or(is_select),
            flush_cache_required: self.flush_cache_required.unwrap_or(!is_select),
            timeout: self.timeout,
            fetch_size: self.fetch_size,
            result_set_type: self.result_set_type,
            key_generator: self.key_generator,
            row_mapper: self.row_mapper,
            database_id: self.database_id,
            id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_land_in_each_list_element() {
        let keys = KeyGenerator::Generated {
            key_property: "id".into(),
        };
        let mut param = Value::List(vec![
            Value::map([("name", "a")]),
            Value::map([("name", "b")]),
        ]);
        keys.assign_keys(&mut param, &[Value::Int(1), Value::Int(2)])
            .unwrap();
        assert_eq!(param.get_path("[1].id"), Some(&Value::Int(2)));

        let mut single = Value::map([("name", "c")]);
        keys.assign_keys(&mut single, &[Value::Int(9)]).unwrap();
        assert_eq!(single.get_path("id"), Some(&Value::Int(9)));
    }

    #[test]
    fn default_bounds_are_unbounded() {
        assert!(RowBounds::default().is_default());
        assert!(!RowBounds::new(5, 10).is_default());
    }
}
