use std::collections::{BTreeMap, BTreeSet};
use std::collections::btree_map::Entry;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::settings::{ExecutorType, Settings};
use crate::builder::{BoundSql, CompileEnv};
use crate::cache::{Cache, CacheStore, PublishGate};
use crate::driver::{DataSource, Transaction};
use crate::error::{Result, SqlMapperError};
use crate::executor::{
    BaseExecutor, BatchStrategy, CachingExecutor, DefaultParameterHandler,
    DefaultStatementHandler, Executor, ParameterHandler, ReuseStrategy, SimpleStrategy,
    StatementHandler,
};
use crate::mapping::{MappedStatement, MappedStatementBuilder, RowBounds};
use crate::plugin::{Interceptor, InterceptorChain};
use crate::results::{DefaultResultSetHandler, ResultSetHandler};
use crate::scripting::LanguageDriver;
use crate::type_handler::{RecordSchema, TypeHandler, TypeHandlerRegistry};
use crate::types::{Value, ValueType};

/// Everything a session needs: compiled statements, caches, type handlers, the
/// interceptor chain and the data source. Immutable once built.
pub struct Configuration {
    settings: Settings,
    database_id: Option<String>,
    registry: TypeHandlerRegistry,
    language_driver: LanguageDriver,
    caches: CacheStore,
    statements: BTreeMap<String, Arc<MappedStatement>>,
    mappers: BTreeSet<String>,
    interceptor_chain: InterceptorChain,
    data_source: Option<Arc<dyn DataSource>>,
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("settings", &self.settings)
            .field("database_id", &self.database_id)
            .field("caches", &self.caches)
            .field("statements", &self.statements.keys().collect::<Vec<_>>())
            .field("mappers", &self.mappers)
            .field("interceptors", &self.interceptor_chain)
            .finish_non_exhaustive()
    }
}

impl Configuration {
    #[must_use]
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::new()
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn database_id(&self) -> Option<&str> {
        self.database_id.as_deref()
    }

    #[must_use]
    pub fn type_handlers(&self) -> &TypeHandlerRegistry {
        &self.registry
    }

    #[must_use]
    pub fn language_driver(&self) -> &LanguageDriver {
        &self.language_driver
    }

    #[must_use]
    pub fn interceptor_chain(&self) -> &InterceptorChain {
        &self.interceptor_chain
    }

    #[must_use]
    pub fn data_source(&self) -> Option<&Arc<dyn DataSource>> {
        self.data_source.as_ref()
    }

    #[must_use]
    pub fn compile_env(&self) -> CompileEnv<'_> {
        CompileEnv {
            registry: &self.registry,
            database_id: self.database_id.as_deref(),
            shrink_whitespace: self.settings.shrink_whitespace,
        }
    }

    #[must_use]
    pub fn cache(&self, id: &str) -> Option<&Arc<dyn Cache>> {
        self.caches.get(id)
    }

    pub(crate) fn cache_gate(&self) -> Arc<PublishGate> {
        self.caches.gate()
    }

    #[must_use]
    pub fn has_statement(&self, id: &str) -> bool {
        self.statements.contains_key(id)
    }

    pub fn statement_ids(&self) -> impl Iterator<Item = &str> {
        self.statements.keys().map(String::as_str)
    }

    #[must_use]
    pub fn has_mapper(&self, namespace: &str) -> bool {
        self.mappers.contains(namespace)
    }

    pub fn mappers(&self) -> impl Iterator<Item = &str> {
        self.mappers.iter().map(String::as_str)
    }

    /// # Errors
    ///
    /// `ConfigError` when no statement is registered under `id`.
    pub fn mapped_statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.statements.get(id).cloned().ok_or_else(|| {
            SqlMapperError::ConfigError(format!("Mapped Statements collection does not contain value for {id}"))
        })
    }

    /// Build the executor stack for one session: the strategy executor, the cache layer
    /// when caching is enabled, then every executor interceptor.
    #[must_use]
    pub fn new_executor(
        self: &Arc<Self>,
        executor_type: ExecutorType,
        transaction: Box<dyn Transaction>,
    ) -> Box<dyn Executor> {
        let executor: Box<dyn Executor> = match executor_type {
            ExecutorType::Simple => Box::new(BaseExecutor::new(SimpleStrategy, self.clone(), transaction)),
            ExecutorType::Reuse => Box::new(BaseExecutor::new(
                ReuseStrategy::new(),
                self.clone(),
                transaction,
            )),
            ExecutorType::Batch => Box::new(BaseExecutor::new(
                BatchStrategy::new(),
                self.clone(),
                transaction,
            )),
        };
        let executor: Box<dyn Executor> = if self.settings.cache_enabled {
            Box::new(CachingExecutor::new(executor, self.clone()))
        } else {
            executor
        };
        self.interceptor_chain.plugin_executor(executor)
    }

    /// # Errors
    ///
    /// Template evaluation errors when `bound_sql` has to be compiled.
    pub fn new_statement_handler(
        self: &Arc<Self>,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: Option<BoundSql>,
    ) -> Result<Box<dyn StatementHandler>> {
        let handler = DefaultStatementHandler::new(self, statement, parameter, bounds, bound_sql)?;
        Ok(self
            .interceptor_chain
            .plugin_statement_handler(Box::new(handler)))
    }

    #[must_use]
    pub fn new_parameter_handler(
        &self,
        statement: &MappedStatement,
        bound_sql: BoundSql,
    ) -> Box<dyn ParameterHandler> {
        let handler = DefaultParameterHandler::new(statement.id.clone(), bound_sql);
        self.interceptor_chain
            .plugin_parameter_handler(Box::new(handler))
    }

    #[must_use]
    pub fn new_result_set_handler(
        &self,
        statement: &MappedStatement,
        bound_sql: &BoundSql,
        bounds: RowBounds,
    ) -> Box<dyn ResultSetHandler> {
        let handler = DefaultResultSetHandler::new(
            statement.row_mapper.clone(),
            bounds,
            bound_sql.parameter_mappings(),
        );
        self.interceptor_chain
            .plugin_result_set_handler(Box::new(handler))
    }
}

/// Collects settings, types, caches, statements and interceptors, then compiles
/// every statement into a [`Configuration`].
#[derive(Default)]
pub struct ConfigurationBuilder {
    settings: Settings,
    variables: BTreeMap<String, String>,
    database_id: Option<String>,
    registry: TypeHandlerRegistry,
    caches: CacheStore,
    statements: Vec<MappedStatementBuilder>,
    mappers: BTreeSet<String>,
    interceptor_chain: InterceptorChain,
    data_source: Option<Arc<dyn DataSource>>,
    errors: Vec<SqlMapperError>,
}

impl fmt::Debug for ConfigurationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationBuilder")
            .field("settings", &self.settings)
            .field("database_id", &self.database_id)
            .field("statements", &self.statements.len())
            .field("mappers", &self.mappers)
            .finish_non_exhaustive()
    }
}

impl ConfigurationBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// A `${name}` value; overrides the same name in the settings.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Select statements declared for this database, falling back to those without one.
    #[must_use]
    pub fn database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = Some(database_id.into());
        self
    }

    #[must_use]
    pub fn type_handler(mut self, ty: ValueType, handler: Arc<dyn TypeHandler>) -> Self {
        self.registry.register(ty, handler);
        self
    }

    #[must_use]
    pub fn named_type_handler(mut self, handler: Arc<dyn TypeHandler>) -> Self {
        self.registry.register_named(handler);
        self
    }

    #[must_use]
    pub fn type_alias(mut self, alias: impl Into<String>, ty: ValueType) -> Self {
        self.registry.register_alias(alias, ty);
        self
    }

    #[must_use]
    pub fn record_type(mut self, type_name: impl Into<String>, schema: RecordSchema) -> Self {
        if let Err(e) = self.registry.register_record(type_name, schema) {
            self.errors.push(e);
        }
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        if let Err(e) = self.caches.add(cache) {
            self.errors.push(e);
        }
        self
    }

    #[must_use]
    pub fn perpetual_cache(mut self, id: impl Into<String>) -> Self {
        if let Err(e) = self.caches.add_perpetual(id) {
            self.errors.push(e);
        }
        self
    }

    #[must_use]
    pub fn lru_cache(mut self, id: impl Into<String>, capacity: usize) -> Self {
        if let Err(e) = self.caches.add_lru(id, capacity) {
            self.errors.push(e);
        }
        self
    }

    #[must_use]
    pub fn statement(mut self, statement: MappedStatementBuilder) -> Self {
        self.statements.push(statement);
        self
    }

    /// Register a mapper: a namespace whose statements are stored as `namespace.id`.
    /// A namespace can be registered once.
    #[must_use]
    pub fn mapper(
        mut self,
        namespace: impl Into<String>,
        statements: impl IntoIterator<Item = MappedStatementBuilder>,
    ) -> Self {
        let namespace = namespace.into();
        if namespace.is_empty() || namespace.contains(char::is_whitespace) {
            self.errors.push(SqlMapperError::ConfigError(format!(
                "invalid mapper namespace `{namespace}`"
            )));
            return self;
        }
        if !self.mappers.insert(namespace.clone()) {
            self.errors.push(SqlMapperError::ConfigError(format!(
                "Type {namespace} is already known to the MapperRegistry."
            )));
            return self;
        }
        self.statements
            .extend(statements.into_iter().map(|statement| statement.namespaced(&namespace)));
        self
    }

    #[must_use]
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        if let Err(e) = self.interceptor_chain.add(interceptor) {
            self.errors.push(e);
        }
        self
    }

    /// Configure `interceptor` with `properties`, then register it.
    #[must_use]
    pub fn interceptor_with_properties<I: Interceptor + 'static>(
        self,
        mut interceptor: I,
        properties: &BTreeMap<String, String>,
    ) -> Self {
        interceptor.set_properties(properties);
        self.interceptor(Arc::new(interceptor))
    }

    #[must_use]
    pub fn data_source(mut self, data_source: Arc<dyn DataSource>) -> Self {
        self.data_source = Some(data_source);
        self
    }

    /// Keep one declaration per id: one matching the configured database id wins over
    /// one without a database id; declarations for other databases are dropped.
    fn select_statements(
        statements: Vec<MappedStatementBuilder>,
        database_id: Option<&str>,
    ) -> Result<Vec<MappedStatementBuilder>> {
        let mut selected: BTreeMap<String, MappedStatementBuilder> = BTreeMap::new();
        for statement in statements {
            let declared = statement.declared_database_id();
            if declared.is_some() && declared != database_id {
                debug!(id = statement.id(), "skipping statement for another database");
                continue;
            }
            match selected.entry(statement.id().to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(statement);
                }
                Entry::Occupied(mut slot) => {
                    let existing_specific = slot.get().declared_database_id().is_some();
                    let specific = declared.is_some();
                    if existing_specific == specific {
                        return Err(SqlMapperError::ConfigError(format!(
                            "Mapped Statements collection already contains value for {}",
                            statement.id()
                        )));
                    }
                    if specific {
                        slot.insert(statement);
                    }
                }
            }
        }
        Ok(selected.into_values().collect())
    }

    /// Compile every statement and freeze the configuration.
    ///
    /// # Errors
    ///
    /// The first registration error (duplicate cache, record type, mapper namespace or
    /// interceptor without signatures), duplicate statement ids, unknown caches or types, and
    /// template errors.
    pub fn build(self) -> Result<Arc<Configuration>> {
        let Self {
            settings,
            variables,
            database_id,
            registry,
            caches,
            statements,
            mappers,
            interceptor_chain,
            data_source,
            errors,
        } = self;
        if let Some(error) = errors.into_iter().next() {
            return Err(error);
        }

        let mut language_driver =
            LanguageDriver::new().with_nullable_on_for_each(settings.nullable_on_for_each);
        if let Some(pattern) = &settings.injection_filter {
            language_driver = language_driver.with_injection_filter(pattern)?;
        }
        let mut all_variables = settings.variables.clone();
        all_variables.extend(variables);

        let env = CompileEnv {
            registry: &registry,
            database_id: database_id.as_deref(),
            shrink_whitespace: settings.shrink_whitespace,
        };
        let mut compiled = BTreeMap::new();
        for statement in Self::select_statements(statements, database_id.as_deref())? {
            let mapped = statement.build(&language_driver, &env, &all_variables, caches.caches())?;
            debug!(id = %mapped.id, dynamic = mapped.sql_source.is_dynamic(), "registered statement");
            compiled.insert(mapped.id.clone(), Arc::new(mapped));
        }

        Ok(Arc::new(Configuration {
            settings,
            database_id,
            registry,
            language_driver,
            caches,
            statements: compiled,
            mappers,
            interceptor_chain,
            data_source,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripting::SqlNode;

    #[test]
    fn duplicate_statement_ids_are_rejected() {
        let err = Configuration::builder()
            .statement(MappedStatementBuilder::select("find", "select 1"))
            .statement(MappedStatementBuilder::select("find", "select 2"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("already contains value for find"));
    }

    #[test]
    fn database_specific_statement_wins() {
        let config = Configuration::builder()
            .database_id("sqlite")
            .statement(MappedStatementBuilder::select("now", "select now()"))
            .statement(
                MappedStatementBuilder::select("now", "select datetime('now')").database_id("sqlite"),
            )
            .statement(
                MappedStatementBuilder::select("seq", "select nextval('s')").database_id("postgres"),
            )
            .build()
            .unwrap();
        let env = config.compile_env();
        let now = config.mapped_statement("now").unwrap();
        assert_eq!(now.bound_sql(&Value::Null, &env).unwrap().sql(), "select datetime('now')");
        assert!(!config.has_statement("seq"));
    }

    #[test]
    fn unknown_cache_and_duplicate_cache_fail() {
        let err = Configuration::builder()
            .statement(MappedStatementBuilder::select("a", "select 1").cache("missing"))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("no cache named `missing`"));

        let err = Configuration::builder()
            .perpetual_cache("users")
            .lru_cache("users", 4)
            .build()
            .unwrap_err();
        assert!(matches!(err, SqlMapperError::ConfigError(_)));
    }

    #[test]
    fn variables_are_substituted_at_registration() {
        let config = Configuration::builder()
            .variable("table", "users")
            .statement(MappedStatementBuilder::select(
                "all",
                SqlNode::text("select * from ${table}"),
            ))
            .build()
            .unwrap();
        let statement = config.mapped_statement("all").unwrap();
        assert!(!statement.sql_source.is_dynamic());
        assert!(config.mapped_statement("none").is_err());
    }

    #[test]
    fn mapper_namespaces_qualify_ids_and_register_once() {
        let config = Configuration::builder()
            .mapper("users", [MappedStatementBuilder::select("find", "select 1")])
            .mapper("orders", [MappedStatementBuilder::select("find", "select 2")])
            .build()
            .unwrap();
        assert!(config.has_mapper("users"));
        assert!(!config.has_mapper("find"));
        assert!(config.has_statement("users.find"));
        assert!(config.has_statement("orders.find"));
        assert!(!config.has_statement("find"));
        assert_eq!(config.mappers().collect::<Vec<_>>(), ["orders", "users"]);

        let err = Configuration::builder()
            .mapper("users", [MappedStatementBuilder::select("find", "select 1")])
            .mapper("users", [MappedStatementBuilder::select("all", "select 2")])
            .build()
            .unwrap_err();
        assert!(matches!(&err, SqlMapperError::ConfigError(m) if m.contains("already known to the MapperRegistry")));

        let err = Configuration::builder()
            .mapper("", Vec::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, SqlMapperError::ConfigError(_)));
    }
}
