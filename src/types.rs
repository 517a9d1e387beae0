use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::{Result, SqlMapperError};

/// A dynamically typed value.
///
/// The same enum carries parameter objects into the template compiler, bound values into
/// the driver and column values back out of a result set:
/// ```rust
/// use sql_mapper::prelude::*;
///
/// let param = Value::map([
///     ("name", Value::from("alice")),
///     ("ids", Value::List(vec![1.into(), 2.into()])),
/// ]);
/// assert_eq!(param.get_path("ids[1]"), Some(&Value::Int(2)));
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// JSON value
    Json(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
    /// Ordered collection
    List(Vec<Value>),
    /// Generic key-value container
    Map(BTreeMap<String, Value>),
    /// Typed parameter object
    Record(Record),
}

/// A parameter object with a declared type name.
///
/// Field types are looked up through the record schemas registered on the
/// [`crate::type_handler::TypeHandlerRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    pub type_name: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    #[must_use]
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // bitwise so that NaN equals itself and Eq stays lawful
            (Value::Float(a), Value::Float(b)) => a == b || a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Json(a), Value::Json(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => {
                let normalized = if *f == 0.0 { 0.0_f64 } else { *f };
                normalized.to_bits().hash(state);
            }
            Value::Text(s) => s.hash(state),
            Value::Timestamp(ts) => ts.hash(state),
            Value::Json(json) => json.to_string().hash(state),
            Value::Blob(bytes) => bytes.hash(state),
            Value::List(items) => items.hash(state),
            Value::Map(map) => map.hash(state),
            Value::Record(record) => record.hash(state),
        }
    }
}

impl Value {
    /// Build a [`Value::Map`] from key/value pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a [`Value::Record`] of the given type from field/value pairs.
    pub fn record<K, V, I>(type_name: impl Into<String>, fields: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Record(Record {
            type_name: type_name.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        })
    }

    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        if let Value::Int(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(1) => Some(true),
            Value::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(value) => Some(*value),
            Value::Text(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                .ok(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        if let Value::List(items) = self {
            Some(items)
        } else {
            None
        }
    }

    /// Named fields of a map or record.
    #[must_use]
    pub fn fields(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            Value::Record(record) => Some(&record.fields),
            _ => None,
        }
    }

    pub fn fields_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            Value::Record(record) => Some(&mut record.fields),
            _ => None,
        }
    }

    /// The runtime type of this value. `Null` reports [`ValueType::Any`].
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Null => ValueType::Any,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::Float(_) => ValueType::Float,
            Value::Text(_) => ValueType::Text,
            Value::Timestamp(_) => ValueType::Timestamp,
            Value::Json(_) => ValueType::Json,
            Value::Blob(_) => ValueType::Blob,
            Value::List(_) => ValueType::List,
            Value::Map(_) => ValueType::Map,
            Value::Record(record) => ValueType::Record(record.type_name.clone()),
        }
    }

    /// Lists, maps and records are composite; everything else is a scalar.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, Value::List(_) | Value::Map(_) | Value::Record(_))
    }

    /// Resolve a property path such as `user.roles[0].name`.
    ///
    /// Returns `None` when any segment is missing or the path is malformed.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let segments = PathSegment::parse(path).ok()?;
        let mut current = self;
        for segment in &segments {
            current = current.get_segment(segment)?;
        }
        Some(current)
    }

    /// Resolve a property path, telling absent properties apart from impossible ones.
    ///
    /// Missing keys, out-of-range indexes and paths through `Null` give `Ok(None)`.
    ///
    /// # Errors
    ///
    /// `ExpressionError` for a malformed path, `BindingError` when a segment reads a
    /// property of a scalar.
    pub fn lookup_path(&self, path: &str) -> Result<Option<&Value>> {
        let segments = PathSegment::parse(path)?;
        let mut current = self;
        for segment in &segments {
            if current.is_null() {
                return Ok(None);
            }
            if !current.is_composite() {
                return Err(SqlMapperError::BindingError {
                    fragment: path.to_string(),
                    message: format!("cannot read a property of a {} value", current.value_type()),
                });
            }
            match current.get_segment(segment) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    fn get_segment(&self, segment: &PathSegment) -> Option<&Value> {
        match (self, segment) {
            (Value::List(items), PathSegment::Index(i)) => items.get(*i),
            (Value::Map(_) | Value::Record(_), PathSegment::Index(i)) => {
                self.fields()?.get(&i.to_string())
            }
            (Value::Map(_) | Value::Record(_), PathSegment::Field(name)) => {
                self.fields()?.get(name)
            }
            _ => None,
        }
    }

    /// Assign `value` at `path`, inserting the last segment if it is absent.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError` when an intermediate segment does not exist or is not a
    /// container.
    pub fn set_path(&mut self, path: &str, value: Value) -> Result<()> {
        let segments = PathSegment::parse(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(SqlMapperError::ExecutionError(
                "cannot assign to an empty property path".into(),
            ));
        };
        let mut current = self;
        for segment in parents {
            current = match (current, segment) {
                (Value::List(items), PathSegment::Index(i)) => items.get_mut(*i),
                (Value::Map(map), PathSegment::Field(name)) => map.get_mut(name),
                (Value::Record(record), PathSegment::Field(name)) => record.fields.get_mut(name),
                _ => None,
            }
            .ok_or_else(|| {
                SqlMapperError::ExecutionError(format!("no property `{path}` to assign"))
            })?;
        }
        match (current, last) {
            (Value::List(items), PathSegment::Index(i)) if *i < items.len() => {
                items[*i] = value;
                Ok(())
            }
            (Value::Map(map), PathSegment::Field(name)) => {
                map.insert(name.clone(), value);
                Ok(())
            }
            (Value::Record(record), PathSegment::Field(name)) => {
                record.fields.insert(name.clone(), value);
                Ok(())
            }
            (other, _) => Err(SqlMapperError::ExecutionError(format!(
                "cannot assign `{path}` on a {} value",
                other.value_type()
            ))),
        }
    }

    /// Convert to JSON. Timestamps become strings and blobs become byte arrays.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => JsonValue::from(*f),
            Value::Text(s) => JsonValue::String(s.clone()),
            Value::Timestamp(ts) => JsonValue::String(ts.format("%F %T%.f").to_string()),
            Value::Json(json) => json.clone(),
            Value::Blob(bytes) => JsonValue::from(bytes.clone()),
            Value::List(items) => JsonValue::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => map_to_json(map),
            Value::Record(record) => map_to_json(&record.fields),
        }
    }
}

fn map_to_json(map: &BTreeMap<String, Value>) -> JsonValue {
    JsonValue::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// One step of a property path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PathSegment {
    Field(String),
    Index(usize),
}

impl PathSegment {
    pub(crate) fn parse(path: &str) -> Result<Vec<PathSegment>> {
        let malformed =
            || SqlMapperError::ExpressionError(format!("malformed property path `{path}`"));
        let mut segments = Vec::new();
        let mut chars = path.trim().chars().peekable();
        let mut field = String::new();
        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if !field.is_empty() {
                        segments.push(PathSegment::Field(std::mem::take(&mut field)));
                    } else if !matches!(segments.last(), Some(PathSegment::Index(_))) {
                        return Err(malformed());
                    }
                }
                '[' => {
                    if !field.is_empty() {
                        segments.push(PathSegment::Field(std::mem::take(&mut field)));
                    }
                    let mut inner = String::new();
                    loop {
                        match chars.next() {
                            Some(']') => break,
                            Some(ch) => inner.push(ch),
                            None => return Err(malformed()),
                        }
                    }
                    let inner = inner.trim().trim_matches(|c| c == '\'' || c == '"');
                    match inner.parse::<usize>() {
                        Ok(i) => segments.push(PathSegment::Index(i)),
                        Err(_) if !inner.is_empty() => {
                            segments.push(PathSegment::Field(inner.to_string()));
                        }
                        Err(_) => return Err(malformed()),
                    }
                }
                c if c.is_whitespace() => return Err(malformed()),
                c => field.push(c),
            }
        }
        if !field.is_empty() {
            segments.push(PathSegment::Field(field));
        }
        if segments.is_empty() {
            return Err(malformed());
        }
        Ok(segments)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Text(s) => f.write_str(s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%F %T%.f")),
            Value::Json(json) => write!(f, "{json}"),
            Value::Blob(bytes) => {
                f.write_str("x'")?;
                for b in bytes {
                    write!(f, "{b:02x}")?;
                }
                f.write_str("'")
            }
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => write_fields(f, "", map),
            Value::Record(record) => write_fields(f, &record.type_name, &record.fields),
        }
    }
}

fn write_fields(
    f: &mut fmt::Formatter<'_>,
    name: &str,
    fields: &BTreeMap<String, Value>,
) -> fmt::Result {
    write!(f, "{name}{{")?;
    for (i, (k, v)) in fields.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{k}={v}")?;
    }
    f.write_str("}")
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Record(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Bool(b),
            JsonValue::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float))
                .unwrap_or(Value::Null),
            JsonValue::String(s) => Value::Text(s),
            JsonValue::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// The declared or resolved type of a parameter binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Generic object; coerced by runtime inspection.
    Any,
    Bool,
    Int,
    Float,
    Text,
    Timestamp,
    Json,
    Blob,
    List,
    Map,
    Record(String),
    /// Result-set marker for callable out parameters.
    Cursor,
}

impl ValueType {
    /// Builtin type aliases. Record types are resolved by the registry.
    #[must_use]
    pub fn from_alias(alias: &str) -> Option<ValueType> {
        let ty = match alias.trim().to_ascii_lowercase().as_str() {
            "any" | "object" => ValueType::Any,
            "bool" | "boolean" | "_boolean" => ValueType::Bool,
            "int" | "integer" | "long" | "short" | "byte" | "i64" | "i32" | "_int" | "_long" => {
                ValueType::Int
            }
            "float" | "double" | "decimal" | "bigdecimal" | "f64" | "_double" => ValueType::Float,
            "string" | "text" | "str" | "char" => ValueType::Text,
            "date" | "datetime" | "timestamp" => ValueType::Timestamp,
            "json" => ValueType::Json,
            "blob" | "bytes" | "byte[]" => ValueType::Blob,
            "list" | "arraylist" | "collection" | "array" => ValueType::List,
            "map" | "hashmap" => ValueType::Map,
            "cursor" | "resultset" => ValueType::Cursor,
            _ => return None,
        };
        Some(ty)
    }

    /// Whether values of `value`'s runtime type satisfy this declared type.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ValueType::Any => true,
            _ if value.is_null() => true,
            other => *other == value.value_type(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => f.write_str("any"),
            ValueType::Bool => f.write_str("bool"),
            ValueType::Int => f.write_str("int"),
            ValueType::Float => f.write_str("float"),
            ValueType::Text => f.write_str("text"),
            ValueType::Timestamp => f.write_str("timestamp"),
            ValueType::Json => f.write_str("json"),
            ValueType::Blob => f.write_str("blob"),
            ValueType::List => f.write_str("list"),
            ValueType::Map => f.write_str("map"),
            ValueType::Record(name) => f.write_str(name),
            ValueType::Cursor => f.write_str("cursor"),
        }
    }
}

/// Database column types a placeholder may declare with `jdbcType=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JdbcType {
    Bit,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Real,
    Double,
    Numeric,
    Decimal,
    Char,
    Varchar,
    LongVarchar,
    Nvarchar,
    Clob,
    Date,
    Time,
    Timestamp,
    Binary,
    Varbinary,
    Blob,
    Boolean,
    Array,
    Struct,
    Cursor,
    Other,
    Null,
    Undefined,
}

impl JdbcType {
    const NAMES: [(&'static str, JdbcType); 28] = [
        ("BIT", JdbcType::Bit),
        ("TINYINT", JdbcType::TinyInt),
        ("SMALLINT", JdbcType::SmallInt),
        ("INTEGER", JdbcType::Integer),
        ("BIGINT", JdbcType::BigInt),
        ("FLOAT", JdbcType::Float),
        ("REAL", JdbcType::Real),
        ("DOUBLE", JdbcType::Double),
        ("NUMERIC", JdbcType::Numeric),
        ("DECIMAL", JdbcType::Decimal),
        ("CHAR", JdbcType::Char),
        ("VARCHAR", JdbcType::Varchar),
        ("LONGVARCHAR", JdbcType::LongVarchar),
        ("NVARCHAR", JdbcType::Nvarchar),
        ("CLOB", JdbcType::Clob),
        ("DATE", JdbcType::Date),
        ("TIME", JdbcType::Time),
        ("TIMESTAMP", JdbcType::Timestamp),
        ("BINARY", JdbcType::Binary),
        ("VARBINARY", JdbcType::Varbinary),
        ("BLOB", JdbcType::Blob),
        ("BOOLEAN", JdbcType::Boolean),
        ("ARRAY", JdbcType::Array),
        ("STRUCT", JdbcType::Struct),
        ("CURSOR", JdbcType::Cursor),
        ("OTHER", JdbcType::Other),
        ("NULL", JdbcType::Null),
        ("UNDEFINED", JdbcType::Undefined),
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, ty)| *ty == self)
            .map_or("OTHER", |(name, _)| *name)
    }
}

impl FromStr for JdbcType {
    type Err = SqlMapperError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::NAMES
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, ty)| *ty)
            .ok_or_else(|| SqlMapperError::ConfigError(format!("unknown jdbcType `{s}`")))
    }
}

impl fmt::Display for JdbcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
}

impl ParameterMode {
    /// Whether the driver writes a value back through this parameter.
    #[must_use]
    pub fn is_output(self) -> bool {
        !matches!(self, ParameterMode::In)
    }
}

impl FromStr for ParameterMode {
    type Err = SqlMapperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(ParameterMode::In),
            "OUT" => Ok(ParameterMode::Out),
            "INOUT" => Ok(ParameterMode::InOut),
            other => Err(SqlMapperError::ConfigError(format!(
                "unknown parameter mode `{other}`"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn path_lookup_walks_maps_and_lists() {
        let v = Value::map([(
            "user",
            Value::map([("roles", Value::List(vec!["admin".into(), "dev".into()]))]),
        )]);
        assert_eq!(v.get_path("user.roles[1]"), Some(&Value::from("dev")));
        assert_eq!(v.get_path("user.missing"), None);
        assert_eq!(v.get_path("user..roles"), None);
    }

    #[test]
    fn set_path_inserts_leaf_field() {
        let mut v = Value::record("User", [("name", "bob")]);
        v.set_path("id", Value::Int(7)).unwrap();
        assert_eq!(v.get_path("id"), Some(&Value::Int(7)));
        assert!(Value::Int(1).set_path("id", Value::Null).is_err());
    }

    #[test]
    fn float_equality_and_hash_agree() {
        let mut set = HashSet::new();
        set.insert(Value::Float(0.0));
        assert!(set.contains(&Value::Float(-0.0)));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn json_numbers_keep_integer_shape() {
        let v = Value::from(serde_json::json!({"a": 1, "b": 1.5, "c": [true, null]}));
        assert_eq!(v.get_path("a"), Some(&Value::Int(1)));
        assert_eq!(v.get_path("b"), Some(&Value::Float(1.5)));
        assert_eq!(v.get_path("c[1]"), Some(&Value::Null));
    }

    #[test]
    fn jdbc_type_parses_case_insensitively() {
        assert_eq!("cursor".parse::<JdbcType>().unwrap(), JdbcType::Cursor);
        assert_eq!(JdbcType::Varchar.to_string(), "VARCHAR");
        assert!("nope".parse::<JdbcType>().is_err());
        assert_eq!("inout".parse::<ParameterMode>().unwrap(), ParameterMode::InOut);
    }
}
