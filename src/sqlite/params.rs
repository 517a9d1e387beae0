use rusqlite::types::Value as SqlValue;

use crate::error::Result;
use crate::types::Value;

/// Convert a mapper value to a `SQLite` value.
///
/// Booleans become integers, timestamps `%F %T%.f` text, and JSON or composite
/// values their JSON text.
#[must_use]
pub fn value_to_sqlite(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Timestamp(ts) => SqlValue::Text(ts.format("%F %T%.f").to_string()),
        Value::Json(json) => SqlValue::Text(json.to_string()),
        Value::Blob(bytes) => SqlValue::Blob(bytes.clone()),
        Value::List(_) | Value::Map(_) | Value::Record(_) => SqlValue::Text(value.to_json().to_string()),
    }
}

/// Extract column `idx` of a `SQLite` row.
///
/// # Errors
///
/// Returns `SqliteError` if the column cannot be read.
pub fn sqlite_extract_value(row: &rusqlite::Row<'_>, idx: usize) -> Result<Value> {
    let value: SqlValue = row.get(idx)?;
    Ok(match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Int(i),
        SqlValue::Real(f) => Value::Float(f),
        SqlValue::Text(s) => Value::Text(s),
        SqlValue::Blob(b) => Value::Blob(b),
    })
}

/// Parameters bound by position, grown on demand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(pub Vec<SqlValue>);

impl Params {
    /// Set the 1-based `index`, padding skipped positions with NULL.
    pub fn set(&mut self, index: usize, value: &Value) {
        if self.0.len() < index {
            self.0.resize(index, SqlValue::Null);
        }
        self.0[index - 1] = value_to_sqlite(value);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    #[must_use]
    pub fn as_values(&self) -> &[SqlValue] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn converts_values_for_binding() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .and_then(|d| d.and_hms_opt(12, 30, 0))
            .unwrap();
        assert_eq!(value_to_sqlite(&Value::Bool(true)), SqlValue::Integer(1));
        assert_eq!(
            value_to_sqlite(&Value::Timestamp(ts)),
            SqlValue::Text("2024-03-01 12:30:00".into())
        );
        assert_eq!(
            value_to_sqlite(&Value::List(vec![1.into(), 2.into()])),
            SqlValue::Text("[1,2]".into())
        );
    }

    #[test]
    fn params_pad_skipped_positions() {
        let mut params = Params::default();
        params.set(3, &Value::Int(9));
        assert_eq!(
            params.as_values(),
            &[SqlValue::Null, SqlValue::Null, SqlValue::Integer(9)]
        );
    }
}
