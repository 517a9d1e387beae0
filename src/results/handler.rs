use tracing::trace;

use super::cursor::Cursor;
use super::mapper::RowMapper;
use super::result_set::ResultSet;
use crate::builder::ParameterMapping;
use crate::driver::{RowSource, Statement};
use crate::error::Result;
use crate::mapping::RowBounds;
use crate::plugin::{Capability, Pluggable};
use crate::types::Value;

/// Turns driver results into mapped values.
#[allow(clippy::missing_errors_doc)]
pub trait ResultSetHandler: Pluggable + Send {
    fn handle_result_sets(&mut self, result_set: ResultSet) -> Result<Vec<Value>>;

    fn handle_cursor_result_sets(&mut self, rows: Box<dyn RowSource>) -> Result<Cursor>;

    /// Copy OUT/INOUT values of a callable statement into `parameter`.
    fn handle_output_parameters(
        &mut self,
        statement: &mut dyn Statement,
        parameter: &mut Value,
    ) -> Result<()>;
}

/// Maps rows with the statement's [`RowMapper`], honoring [`RowBounds`].
#[derive(Debug, Clone)]
pub struct DefaultResultSetHandler {
    mapper: RowMapper,
    bounds: RowBounds,
    output_mappings: Vec<(usize, ParameterMapping)>,
}

impl DefaultResultSetHandler {
    #[must_use]
    pub fn new(mapper: RowMapper, bounds: RowBounds, mappings: &[ParameterMapping]) -> Self {
        let output_mappings = mappings
            .iter()
            .enumerate()
            .filter(|(_, mapping)| mapping.mode.is_output())
            .map(|(i, mapping)| (i + 1, mapping.clone()))
            .collect();
        Self {
            mapper,
            bounds,
            output_mappings,
        }
    }
}

impl Pluggable for DefaultResultSetHandler {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::ResultSetHandler]
    }
}

impl ResultSetHandler for DefaultResultSetHandler {
    fn handle_result_sets(&mut self, result_set: ResultSet) -> Result<Vec<Value>> {
        result_set
            .into_iter()
            .skip(self.bounds.offset)
            .take(self.bounds.limit)
            .map(|row| self.mapper.map_row(&row))
            .collect()
    }

    fn handle_cursor_result_sets(&mut self, rows: Box<dyn RowSource>) -> Result<Cursor> {
        Ok(Cursor::new(rows, self.mapper.clone(), self.bounds))
    }

    fn handle_output_parameters(
        &mut self,
        statement: &mut dyn Statement,
        parameter: &mut Value,
    ) -> Result<()> {
        for (index, mapping) in &self.output_mappings {
            let value = statement.out_parameter(*index)?;
            trace!(property = %mapping.property, %value, "output parameter");
            parameter.set_path(&mapping.property, value)?;
        }
        Ok(())
    }
}

/// Per-row state handed to a [`ResultHandler`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultContext {
    count: usize,
    stopped: bool,
}

impl ResultContext {
    /// Rows handed to the handler so far, including the current one.
    #[must_use]
    pub fn result_count(&self) -> usize {
        self.count
    }

    /// Stop fetching after the current row.
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub(crate) fn next_result(&mut self) {
        self.count += 1;
    }
}

/// Receives mapped rows one at a time instead of collecting them.
pub trait ResultHandler {
    /// # Errors
    ///
    /// Any error stops the select and is returned from it.
    fn handle_result(&mut self, result: Value, context: &mut ResultContext) -> Result<()>;
}

impl<F> ResultHandler for F
where
    F: FnMut(Value, &mut ResultContext) -> Result<()>,
{
    fn handle_result(&mut self, result: Value, context: &mut ResultContext) -> Result<()> {
        self(result, context)
    }
}
