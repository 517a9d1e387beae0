use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::trace;

use super::expression::{PlaceholderSpec, parse_placeholder};
use crate::error::{Result, SqlMapperError};
use crate::scripting::context::{DynamicContext, PARAMETER_OBJECT_KEY};
use crate::scripting::node::SqlNode;
use crate::scripting::token::replace_tokens;
use crate::type_handler::{TypeHandler, TypeHandlerRegistry};
use crate::types::{JdbcType, ParameterMode, Value, ValueType};

const VALID_ATTRIBUTES: &str = "javaType,jdbcType,mode,numericScale,resultMap,typeHandler,jdbcTypeName";

/// Binding metadata for one positional `?` marker.
#[derive(Debug, Clone)]
pub struct ParameterMapping {
    pub property: String,
    pub value_type: ValueType,
    pub jdbc_type: Option<JdbcType>,
    pub jdbc_type_name: Option<String>,
    pub mode: ParameterMode,
    pub numeric_scale: Option<u32>,
    pub result_map_id: Option<String>,
    pub type_handler: Arc<dyn TypeHandler>,
}

/// What compilation needs from the configuration.
#[derive(Debug, Clone, Copy)]
pub struct CompileEnv<'a> {
    pub registry: &'a TypeHandlerRegistry,
    pub database_id: Option<&'a str>,
    pub shrink_whitespace: bool,
}

/// Final SQL text with its ordered parameter mappings.
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    sql: String,
    mappings: Arc<Vec<ParameterMapping>>,
}

impl StaticSqlSource {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }
}

/// A template rendered against every invocation's parameter object.
#[derive(Debug, Clone)]
pub struct DynamicSqlSource {
    root: SqlNode,
}

/// A compiled statement source.
///
/// `Static` sources are compiled once when the statement is registered; `Dynamic`
/// sources re-run the template for every invocation.
#[derive(Debug, Clone)]
pub enum SqlSource {
    Static(StaticSqlSource),
    Dynamic(DynamicSqlSource),
}

impl SqlSource {
    /// Compile a template with no dynamic content.
    ///
    /// # Errors
    ///
    /// Placeholder errors from [`SqlSourceBuilder::parse`].
    pub fn compile_static(
        root: &SqlNode,
        parameter_type: &ValueType,
        env: &CompileEnv<'_>,
    ) -> Result<SqlSource> {
        let empty = Value::Null;
        let mut ctx = DynamicContext::new(&empty, env.database_id);
        root.apply(&mut ctx)?;
        let (sql, _) = ctx.into_parts();
        let source = SqlSourceBuilder::parse(
            &finish_sql(&sql, env.shrink_whitespace),
            parameter_type,
            &BTreeMap::new(),
            env.registry,
        )?;
        Ok(SqlSource::Static(source))
    }

    #[must_use]
    pub fn dynamic(root: SqlNode) -> SqlSource {
        SqlSource::Dynamic(DynamicSqlSource { root })
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, SqlSource::Dynamic(_))
    }

    /// Produce the executable SQL for one invocation.
    ///
    /// # Errors
    ///
    /// Template evaluation and placeholder errors.
    pub fn bound_sql(&self, parameter: &Value, env: &CompileEnv<'_>) -> Result<BoundSql> {
        let parameter_has_handler =
            !parameter.is_null() && env.registry.has_type_handler(&parameter.value_type());
        let declared_fields = match parameter {
            Value::Record(record) => env
                .registry
                .record_schema(&record.type_name)
                .map(|schema| Arc::new(schema.keys().cloned().collect::<BTreeSet<_>>())),
            _ => None,
        };
        match self {
            SqlSource::Static(source) => Ok(BoundSql {
                sql: source.sql.clone(),
                mappings: source.mappings.clone(),
                parameter: parameter.clone(),
                additional: BTreeMap::new(),
                parameter_has_handler,
                declared_fields,
            }),
            SqlSource::Dynamic(source) => {
                let mut ctx = DynamicContext::new(parameter, env.database_id);
                source.root.apply(&mut ctx)?;
                let (sql, bindings) = ctx.into_parts();
                trace!(sql = %sql, "rendered dynamic template");
                let parameter_type = if parameter.is_null() {
                    ValueType::Any
                } else {
                    parameter.value_type()
                };
                let compiled = SqlSourceBuilder::parse(
                    &finish_sql(&sql, env.shrink_whitespace),
                    &parameter_type,
                    &bindings,
                    env.registry,
                )?;
                Ok(BoundSql {
                    sql: compiled.sql,
                    mappings: compiled.mappings,
                    parameter: parameter.clone(),
                    additional: bindings,
                    parameter_has_handler,
                    declared_fields,
                })
            }
        }
    }
}

fn finish_sql(sql: &str, shrink_whitespace: bool) -> String {
    if shrink_whitespace {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    } else {
        sql.trim().to_string()
    }
}

/// Turns `#{...}` placeholders into positional markers and parameter mappings.
pub struct SqlSourceBuilder<'a> {
    parameter_type: &'a ValueType,
    additional: &'a BTreeMap<String, Value>,
    registry: &'a TypeHandlerRegistry,
}

impl<'a> SqlSourceBuilder<'a> {
    /// Replace every placeholder with `?` and resolve its mapping.
    ///
    /// # Errors
    ///
    /// `ConfigError` for malformed placeholders, unknown or unsupported attributes,
    /// and cursor parameters without a result map.
    pub fn parse(
        sql: &str,
        parameter_type: &'a ValueType,
        additional: &'a BTreeMap<String, Value>,
        registry: &'a TypeHandlerRegistry,
    ) -> Result<StaticSqlSource> {
        let builder = SqlSourceBuilder {
            parameter_type,
            additional,
            registry,
        };
        let mut mappings = Vec::new();
        let sql = replace_tokens(sql, "#{", "}", |content| {
            mappings.push(builder.build_mapping(content)?);
            Ok("?".to_string())
        })?;
        Ok(StaticSqlSource {
            sql,
            mappings: Arc::new(mappings),
        })
    }

    /// Validate every placeholder of `sql` without building anything.
    ///
    /// # Errors
    ///
    /// The first malformed placeholder or unsupported attribute.
    pub fn validate(sql: &str) -> Result<()> {
        replace_tokens(sql, "#{", "}", |content| {
            let spec = parse_placeholder(content)?;
            check_attributes(&spec, content)?;
            Ok(String::new())
        })
        .map(|_| ())
    }

    fn build_mapping(&self, content: &str) -> Result<ParameterMapping> {
        let spec = parse_placeholder(content)?;
        check_attributes(&spec, content)?;
        let property = spec.property.clone().unwrap_or_default();
        let jdbc_type = spec
            .attribute("jdbcType")
            .map(str::parse::<JdbcType>)
            .transpose()?;

        let mut value_type = self.resolve_property_type(&property, jdbc_type);
        let mut mapping_mode = ParameterMode::In;
        let mut numeric_scale = None;
        let mut result_map_id = None;
        let mut type_handler_name = None;
        let mut jdbc_type_name = None;
        for (name, value) in &spec.attributes {
            match name.as_str() {
                "javaType" => value_type = self.registry.resolve_alias(value)?,
                "mode" => mapping_mode = value.parse()?,
                "numericScale" => {
                    numeric_scale = Some(value.parse::<u32>().map_err(|_| {
                        SqlMapperError::ConfigError(format!(
                            "numericScale `{value}` in #{{{content}}} is not a non-negative integer"
                        ))
                    })?);
                }
                "resultMap" => result_map_id = Some(value.clone()),
                "typeHandler" => type_handler_name = Some(value.clone()),
                "jdbcTypeName" => jdbc_type_name = Some(value.clone()),
                _ => {}
            }
        }

        if value_type == ValueType::Cursor && result_map_id.is_none() {
            return Err(SqlMapperError::ConfigError(format!(
                "Missing resultMap in property '{property}'. Cursor parameters require a resultMap."
            )));
        }
        let type_handler = match type_handler_name {
            Some(name) => self.registry.get_named(&name)?,
            None => self.registry.get(&value_type, jdbc_type),
        };
        Ok(ParameterMapping {
            property,
            value_type,
            jdbc_type,
            jdbc_type_name,
            mode: mapping_mode,
            numeric_scale,
            result_map_id,
            type_handler,
        })
    }

    fn resolve_property_type(&self, property: &str, jdbc_type: Option<JdbcType>) -> ValueType {
        let (root, rest) = split_root(property);
        if let Some(bound) = self.additional.get(root) {
            return match rest {
                None => bound.value_type(),
                Some(path) => bound
                    .get_path(path)
                    .map_or(ValueType::Any, Value::value_type),
            };
        }
        if self.registry.has_type_handler(self.parameter_type) {
            return self.parameter_type.clone();
        }
        if jdbc_type == Some(JdbcType::Cursor) {
            return ValueType::Cursor;
        }
        if property.is_empty() || *self.parameter_type == ValueType::Map {
            return ValueType::Any;
        }
        self.registry
            .property_type(self.parameter_type, property)
            .unwrap_or(ValueType::Any)
    }
}

fn check_attributes(spec: &PlaceholderSpec, content: &str) -> Result<()> {
    if spec.expression.is_some() {
        return Err(SqlMapperError::ConfigError(format!(
            "Expression based parameters are not supported yet: #{{{content}}}"
        )));
    }
    for (name, _) in &spec.attributes {
        match name.as_str() {
            "javaType" | "jdbcType" | "mode" | "numericScale" | "resultMap" | "typeHandler"
            | "jdbcTypeName" | "property" => {}
            "expression" => {
                return Err(SqlMapperError::ConfigError(format!(
                    "Expression based parameters are not supported yet: #{{{content}}}"
                )));
            }
            other => {
                return Err(SqlMapperError::ConfigError(format!(
                    "An invalid property '{other}' was found in mapping #{{{content}}}. \
                     Valid properties are {VALID_ATTRIBUTES}"
                )));
            }
        }
    }
    Ok(())
}

/// Split `a.b[0]` into `("a", Some("b[0]"))` and `a[1]` into `("a", Some("[1]"))`.
fn split_root(property: &str) -> (&str, Option<&str>) {
    match property.find(['.', '[']) {
        Some(i) if property[i..].starts_with('.') => (&property[..i], Some(&property[i + 1..])),
        Some(i) => (&property[..i], Some(&property[i..])),
        None => (property, None),
    }
}

/// The executable form of one statement invocation.
#[derive(Debug, Clone)]
pub struct BoundSql {
    sql: String,
    mappings: Arc<Vec<ParameterMapping>>,
    parameter: Value,
    additional: BTreeMap<String, Value>,
    parameter_has_handler: bool,
    /// Field names of the record type the parameter object was declared with.
    declared_fields: Option<Arc<BTreeSet<String>>>,
}

impl BoundSql {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Replace the SQL text, keeping the mappings. Intended for interceptors.
    pub fn set_sql(&mut self, sql: impl Into<String>) {
        self.sql = sql.into();
    }

    #[must_use]
    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.mappings
    }

    #[must_use]
    pub fn parameter_object(&self) -> &Value {
        &self.parameter
    }

    #[must_use]
    pub fn additional_parameters(&self) -> &BTreeMap<String, Value> {
        &self.additional
    }

    #[must_use]
    pub fn has_additional_parameter(&self, name: &str) -> bool {
        self.additional.contains_key(split_root(name).0)
    }

    pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.additional.insert(name.into(), value);
    }

    /// The value bound for `mapping`: synthetic bindings first, then the parameter
    /// object itself when it is a scalar, then a property of the parameter object.
    ///
    /// Missing map keys bind `NULL`.
    ///
    /// # Errors
    ///
    /// `BindingError` when the property is not declared on the record type of the
    /// parameter object, or the path reads a property of a scalar.
    pub fn parameter_value(&self, mapping: &ParameterMapping) -> Result<Value> {
        let property = mapping.property.as_str();
        let (root, rest) = split_root(property);
        if let Some(bound) = self.additional.get(root) {
            return match rest {
                None => Ok(bound.clone()),
                Some(path) => resolve_path(bound, path, property),
            };
        }
        if root == PARAMETER_OBJECT_KEY {
            return match rest {
                None => Ok(self.parameter.clone()),
                Some(path) => resolve_path(&self.parameter, path, property),
            };
        }
        if self.parameter.is_null() {
            return Ok(Value::Null);
        }
        if self.parameter_has_handler {
            return Ok(self.parameter.clone());
        }
        if let Some(fields) = &self.declared_fields
            && !fields.contains(root)
        {
            return Err(unresolvable(
                property,
                &format!("no property `{root}` on {}", self.parameter.value_type()),
            ));
        }
        resolve_path(&self.parameter, property, property)
    }

    /// Values of every mapping in binding order.
    ///
    /// # Errors
    ///
    /// The first unresolvable property.
    pub fn parameter_values(&self) -> Result<Vec<Value>> {
        self.mappings
            .iter()
            .map(|mapping| self.parameter_value(mapping))
            .collect()
    }
}

fn unresolvable(property: &str, detail: &str) -> SqlMapperError {
    SqlMapperError::BindingError {
        fragment: format!("#{{{property}}}"),
        message: format!("could not resolve property `{property}`: {detail}"),
    }
}

fn resolve_path(value: &Value, path: &str, property: &str) -> Result<Value> {
    match value.lookup_path(path) {
        Ok(found) => Ok(found.cloned().unwrap_or(Value::Null)),
        Err(SqlMapperError::BindingError { message, .. }) => Err(unresolvable(property, &message)),
        Err(e) => Err(e),
    }
}
