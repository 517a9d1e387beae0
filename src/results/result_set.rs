use std::sync::Arc;

use super::row::{Columns, Row};
use crate::types::Value;

/// A materialized result from a query
///
/// Rows share one [`Columns`] header. `rows_affected` counts rows added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// The rows returned by the query
    pub results: Vec<Row>,
    /// The number of rows in `results`
    pub rows_affected: usize,
    columns: Option<Arc<Columns>>,
}

impl ResultSet {
    /// Create a new result set with a known capacity
    #[must_use]
    pub fn with_capacity(capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            rows_affected: 0,
            columns: None,
        }
    }

    /// Set the column header shared by all rows
    pub fn set_column_names(&mut self, columns: Arc<Columns>) {
        self.columns = Some(columns);
    }

    #[must_use]
    pub fn get_column_names(&self) -> Option<&Arc<Columns>> {
        self.columns.as_ref()
    }

    /// Add a row to the result set using the shared header.
    ///
    /// Values are dropped when no header has been set.
    pub fn add_row_values(&mut self, values: Vec<Value>) {
        if let Some(columns) = &self.columns {
            self.results.push(Row::new(columns.clone(), values));
            self.rows_affected += 1;
        }
    }

    /// Add a row, adopting its header if none is set yet.
    pub fn add_row(&mut self, row: Row) {
        if self.columns.is_none() {
            self.columns = Some(row.columns.clone());
        }
        self.results.push(row);
        self.rows_affected += 1;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
