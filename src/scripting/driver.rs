use std::collections::BTreeMap;

use regex::Regex;
use tracing::debug;

use super::node::SqlNode;
use crate::builder::{CompileEnv, SqlSource};
use crate::error::{Result, SqlMapperError};
use crate::types::ValueType;

/// Turns a statement template into a [`SqlSource`].
///
/// Configuration variables are substituted first, then every expression and
/// placeholder is checked so malformed templates fail when the statement is
/// registered. Templates without dynamic content are compiled once.
#[derive(Debug, Clone, Default)]
pub struct LanguageDriver {
    injection_filter: Option<Regex>,
    nullable_on_for_each: bool,
}

impl LanguageDriver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Values substituted through `${}` must fully match `pattern`.
    ///
    /// # Errors
    ///
    /// `ConfigError` when `pattern` is not a valid regex.
    pub fn with_injection_filter(mut self, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern).map_err(|e| {
            SqlMapperError::ConfigError(format!("invalid injection filter `{pattern}`: {e}"))
        })?;
        self.injection_filter = Some(regex);
        Ok(self)
    }

    #[must_use]
    pub fn with_nullable_on_for_each(mut self, nullable: bool) -> Self {
        self.nullable_on_for_each = nullable;
        self
    }

    /// Build a source from a template tree.
    ///
    /// # Errors
    ///
    /// Expression syntax errors and malformed placeholders anywhere in the template.
    pub fn create_sql_source(
        &self,
        template: SqlNode,
        parameter_type: &ValueType,
        variables: &BTreeMap<String, String>,
        env: &CompileEnv<'_>,
    ) -> Result<SqlSource> {
        let mut root = template.substitute_variables(variables);
        root.apply_defaults(self.nullable_on_for_each, self.injection_filter.as_ref());
        root.validate()?;
        if root.is_dynamic() {
            debug!("template is dynamic, compiling per invocation");
            Ok(SqlSource::dynamic(root))
        } else {
            SqlSource::compile_static(&root, parameter_type, env)
        }
    }

    /// Build a source from plain statement text.
    ///
    /// # Errors
    ///
    /// As [`LanguageDriver::create_sql_source`].
    pub fn create_sql_source_from_text(
        &self,
        script: &str,
        parameter_type: &ValueType,
        variables: &BTreeMap<String, String>,
        env: &CompileEnv<'_>,
    ) -> Result<SqlSource> {
        self.create_sql_source(SqlNode::text(script), parameter_type, variables, env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_handler::TypeHandlerRegistry;
    use crate::types::Value;

    fn env(registry: &TypeHandlerRegistry) -> CompileEnv<'_> {
        CompileEnv {
            registry,
            database_id: None,
            shrink_whitespace: false,
        }
    }

    #[test]
    fn variables_can_make_text_static() {
        let registry = TypeHandlerRegistry::new();
        let vars = BTreeMap::from([("table".to_string(), "users".to_string())]);
        let source = LanguageDriver::new()
            .create_sql_source_from_text("select * from ${table} where id = #{id}", &ValueType::Int, &vars, &env(&registry))
            .unwrap();
        assert!(!source.is_dynamic());
        let bound = source.bound_sql(&Value::Int(1), &env(&registry)).unwrap();
        assert_eq!(bound.sql(), "select * from users where id = ?");
    }

    #[test]
    fn bad_templates_fail_at_build() {
        let registry = TypeHandlerRegistry::new();
        let driver = LanguageDriver::new();
        let template = SqlNode::mixed(vec![
            "select 1".into(),
            SqlNode::if_then("a >", vec![" and a = #{a}".into()]),
        ]);
        assert!(driver
            .create_sql_source(template, &ValueType::Map, &BTreeMap::new(), &env(&registry))
            .is_err());
        assert!(LanguageDriver::new().with_injection_filter("(").is_err());
    }

    #[test]
    fn injection_filter_applies_to_dynamic_text() {
        let registry = TypeHandlerRegistry::new();
        let driver = LanguageDriver::new().with_injection_filter(r"^[A-Za-z_]+$").unwrap();
        let source = driver
            .create_sql_source_from_text("select * from t order by ${col}", &ValueType::Map, &BTreeMap::new(), &env(&registry))
            .unwrap();
        let ok = Value::map([("col", "name")]);
        assert_eq!(source.bound_sql(&ok, &env(&registry)).unwrap().sql(), "select * from t order by name");
        let bad = Value::map([("col", "name; drop table t")]);
        assert!(source.bound_sql(&bad, &env(&registry)).is_err());
    }
}
