use std::collections::BTreeMap;

use super::row::Row;
use crate::error::{Result, SqlMapperError};
use crate::types::{Record, Value};

/// How one row becomes one result value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RowMapper {
    /// A map of column name to value.
    #[default]
    Map,
    /// The first column only.
    Scalar,
    /// A record of the given type, one field per column.
    Record(String),
}

impl RowMapper {
    /// # Errors
    ///
    /// `ExecutionError` when a scalar is requested from a row without columns.
    pub fn map_row(&self, row: &Row) -> Result<Value> {
        match self {
            RowMapper::Map => Ok(Value::Map(columns_to_fields(row))),
            RowMapper::Scalar => row.values.first().cloned().ok_or_else(|| {
                SqlMapperError::ExecutionError("scalar mapping of a row with no columns".into())
            }),
            RowMapper::Record(type_name) => Ok(Value::Record(Record {
                type_name: type_name.clone(),
                fields: columns_to_fields(row),
            })),
        }
    }
}

fn columns_to_fields(row: &Row) -> BTreeMap<String, Value> {
    row.iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::Columns;

    fn row() -> Row {
        Row::new(
            Columns::new(vec!["id".into(), "name".into()]),
            vec![Value::Int(7), Value::from("ann")],
        )
    }

    #[test]
    fn maps_rows_three_ways() {
        let row = row();
        assert_eq!(
            RowMapper::Map.map_row(&row).unwrap(),
            Value::map([("id", Value::Int(7)), ("name", Value::from("ann"))])
        );
        assert_eq!(RowMapper::Scalar.map_row(&row).unwrap(), Value::Int(7));
        let record = RowMapper::Record("User".into()).map_row(&row).unwrap();
        assert_eq!(record.get_path("name"), Some(&Value::from("ann")));
        assert_eq!(format!("{record}"), "User{id=7, name=ann}");
    }

    #[test]
    fn scalar_of_empty_row_fails() {
        let empty = Row::new(Columns::new(Vec::new()), Vec::new());
        assert!(RowMapper::Scalar.map_row(&empty).is_err());
    }
}
