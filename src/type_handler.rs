//! Type coercion between parameter values and driver parameters.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use crate::driver::Statement;
use crate::error::{Result, SqlMapperError};
use crate::types::{JdbcType, Value, ValueType};

/// Sets one parameter on a statement.
pub trait TypeHandler: Send + Sync + Debug {
    /// Name usable in a placeholder's `typeHandler=` attribute.
    fn name(&self) -> &str;

    /// Bind `value` at the 1-based `index`.
    ///
    /// # Errors
    ///
    /// `BindingError` when the value cannot be coerced; driver errors from the statement.
    fn set_parameter(
        &self,
        stmt: &mut dyn Statement,
        index: usize,
        value: &Value,
        jdbc_type: Option<JdbcType>,
    ) -> Result<()>;
}

/// Coerces values to one builtin type. `Any` dispatches on the runtime value and
/// serializes composite values to JSON.
#[derive(Debug, Clone)]
pub struct BuiltinHandler {
    target: ValueType,
    name: String,
}

impl BuiltinHandler {
    #[must_use]
    pub fn new(target: ValueType) -> Self {
        let name = format!("{target}");
        Self { target, name }
    }

    fn mismatch(&self, value: &Value) -> SqlMapperError {
        SqlMapperError::BindingError {
            fragment: value.to_string(),
            message: format!("cannot convert a {} value to {}", value.value_type(), self.target),
        }
    }

    /// Convert `value` to this handler's type.
    ///
    /// # Errors
    ///
    /// `BindingError` when no lossless conversion exists.
    pub fn coerce(&self, value: &Value) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let converted = match (&self.target, value) {
            (ValueType::Any, v) if v.is_composite() => Some(Value::Json(v.to_json())),
            (ValueType::Any, v) => Some(v.clone()),
            (ValueType::Bool, Value::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "y" | "yes" => Some(Value::Bool(true)),
                "false" | "0" | "n" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            (ValueType::Bool, v) => v.as_bool().map(Value::Bool),
            (ValueType::Int, Value::Int(i)) => Some(Value::Int(*i)),
            (ValueType::Int, Value::Bool(b)) => Some(Value::Int(i64::from(*b))),
            #[allow(clippy::cast_possible_truncation)]
            (ValueType::Int, Value::Float(f)) if f.fract() == 0.0 && f.is_finite() => {
                Some(Value::Int(*f as i64))
            }
            (ValueType::Int, Value::Text(s)) => s.trim().parse().ok().map(Value::Int),
            (ValueType::Float, Value::Text(s)) => s.trim().parse().ok().map(Value::Float),
            (ValueType::Float, v) => v.as_float().map(Value::Float),
            (ValueType::Text, Value::Blob(bytes)) => {
                String::from_utf8(bytes.clone()).ok().map(Value::Text)
            }
            (ValueType::Text, v) if v.is_composite() => Some(Value::Text(v.to_json().to_string())),
            (ValueType::Text, v) => Some(Value::Text(v.to_string())),
            (ValueType::Timestamp, v) => v.as_timestamp().map(Value::Timestamp),
            (ValueType::Json, Value::Text(s)) => serde_json::from_str(s).ok().map(Value::Json),
            (ValueType::Json, v) => Some(Value::Json(v.to_json())),
            (ValueType::Blob, Value::Blob(bytes)) => Some(Value::Blob(bytes.clone())),
            (ValueType::Blob, Value::Text(s)) => Some(Value::Blob(s.as_bytes().to_vec())),
            _ => None,
        };
        converted.ok_or_else(|| self.mismatch(value))
    }
}

impl TypeHandler for BuiltinHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_parameter(
        &self,
        stmt: &mut dyn Statement,
        index: usize,
        value: &Value,
        _jdbc_type: Option<JdbcType>,
    ) -> Result<()> {
        let coerced = self.coerce(value)?;
        stmt.set_parameter(index, &coerced)
    }
}

/// The value type a database type maps to when nothing else is known.
fn default_type_for(jdbc_type: JdbcType) -> ValueType {
    match jdbc_type {
        JdbcType::Bit | JdbcType::Boolean => ValueType::Bool,
        JdbcType::TinyInt | JdbcType::SmallInt | JdbcType::Integer | JdbcType::BigInt => {
            ValueType::Int
        }
        JdbcType::Float | JdbcType::Real | JdbcType::Double | JdbcType::Numeric | JdbcType::Decimal => {
            ValueType::Float
        }
        JdbcType::Char
        | JdbcType::Varchar
        | JdbcType::LongVarchar
        | JdbcType::Nvarchar
        | JdbcType::Clob => ValueType::Text,
        JdbcType::Date | JdbcType::Time | JdbcType::Timestamp => ValueType::Timestamp,
        JdbcType::Binary | JdbcType::Varbinary | JdbcType::Blob => ValueType::Blob,
        JdbcType::Cursor => ValueType::Cursor,
        JdbcType::Array | JdbcType::Struct | JdbcType::Other | JdbcType::Null | JdbcType::Undefined => {
            ValueType::Any
        }
    }
}

/// Declared field types of a record parameter type.
pub type RecordSchema = BTreeMap<String, ValueType>;

/// Handlers by value type and by name, type aliases and record schemas.
#[derive(Debug, Clone)]
pub struct TypeHandlerRegistry {
    by_type: HashMap<ValueType, Arc<dyn TypeHandler>>,
    by_name: HashMap<String, Arc<dyn TypeHandler>>,
    aliases: HashMap<String, ValueType>,
    records: HashMap<String, RecordSchema>,
    unknown: Arc<dyn TypeHandler>,
}

impl Default for TypeHandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeHandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        let unknown: Arc<dyn TypeHandler> = Arc::new(BuiltinHandler::new(ValueType::Any));
        let mut registry = Self {
            by_type: HashMap::new(),
            by_name: HashMap::new(),
            aliases: HashMap::new(),
            records: HashMap::new(),
            unknown: unknown.clone(),
        };
        registry.register(ValueType::Any, unknown);
        for ty in [
            ValueType::Bool,
            ValueType::Int,
            ValueType::Float,
            ValueType::Text,
            ValueType::Timestamp,
            ValueType::Json,
            ValueType::Blob,
        ] {
            registry.register(ty.clone(), Arc::new(BuiltinHandler::new(ty)));
        }
        registry
    }

    /// Register `handler` for `ty`; it also becomes addressable by its name.
    pub fn register(&mut self, ty: ValueType, handler: Arc<dyn TypeHandler>) {
        self.by_name.insert(handler.name().to_string(), handler.clone());
        self.by_type.insert(ty, handler);
    }

    /// Register a handler only addressable through `typeHandler=`.
    pub fn register_named(&mut self, handler: Arc<dyn TypeHandler>) {
        self.by_name.insert(handler.name().to_string(), handler);
    }

    pub fn register_alias(&mut self, alias: impl Into<String>, ty: ValueType) {
        self.aliases.insert(alias.into().to_ascii_lowercase(), ty);
    }

    /// Declare the field types of a record type.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the record type is already declared.
    pub fn register_record(&mut self, type_name: impl Into<String>, schema: RecordSchema) -> Result<()> {
        let type_name = type_name.into();
        if self.records.contains_key(&type_name) {
            return Err(SqlMapperError::ConfigError(format!(
                "record type `{type_name}` is already registered"
            )));
        }
        self.records.insert(type_name, schema);
        Ok(())
    }

    #[must_use]
    pub fn has_type_handler(&self, ty: &ValueType) -> bool {
        self.by_type.contains_key(ty)
    }

    /// The handler for `ty`, falling back to the database type's default, then to the
    /// runtime-dispatching handler.
    #[must_use]
    pub fn get(&self, ty: &ValueType, jdbc_type: Option<JdbcType>) -> Arc<dyn TypeHandler> {
        self.by_type
            .get(ty)
            .or_else(|| {
                jdbc_type
                    .map(default_type_for)
                    .and_then(|fallback| self.by_type.get(&fallback))
            })
            .cloned()
            .unwrap_or_else(|| self.unknown.clone())
    }

    /// # Errors
    ///
    /// `ConfigError` for an unknown handler name.
    pub fn get_named(&self, name: &str) -> Result<Arc<dyn TypeHandler>> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| SqlMapperError::ConfigError(format!("unknown type handler `{name}`")))
    }

    /// Resolve a type name: registered aliases, builtin names, then record types.
    ///
    /// # Errors
    ///
    /// `ConfigError` when the name is unknown.
    pub fn resolve_alias(&self, name: &str) -> Result<ValueType> {
        let key = name.trim().to_ascii_lowercase();
        if let Some(ty) = self.aliases.get(&key) {
            return Ok(ty.clone());
        }
        if let Some(ty) = ValueType::from_alias(&key) {
            return Ok(ty);
        }
        if self.records.contains_key(name.trim()) {
            return Ok(ValueType::Record(name.trim().to_string()));
        }
        Err(SqlMapperError::ConfigError(format!(
            "could not resolve type alias `{name}`"
        )))
    }

    #[must_use]
    pub fn record_schema(&self, type_name: &str) -> Option<&RecordSchema> {
        self.records.get(type_name)
    }

    /// The declared type of `property` (a dotted path) on a record type.
    #[must_use]
    pub fn property_type(&self, owner: &ValueType, property: &str) -> Option<ValueType> {
        let mut current = owner.clone();
        for segment in property.split('.') {
            let field = segment.split('[').next().unwrap_or(segment);
            let ValueType::Record(name) = &current else {
                return None;
            };
            let mut ty = self.records.get(name)?.get(field)?.clone();
            if segment.contains('[') {
                // indexed element types are not declared
                ty = ValueType::Any;
            }
            current = ty;
        }
        Some(current)
    }
}
