use tracing::{Level, debug, enabled};

use crate::builder::BoundSql;
use crate::driver::Statement;
use crate::error::Result;
use crate::plugin::{Capability, Pluggable};
use crate::types::{ParameterMode, Value};

/// Binds compiled parameter values onto a statement.
pub trait ParameterHandler: Pluggable + Send {
    fn parameter_object(&self) -> &Value;

    /// # Errors
    ///
    /// Coercion errors from the mapping's type handler and driver errors.
    fn set_parameters(&mut self, statement: &mut dyn Statement) -> Result<()>;
}

/// Sets every non-OUT mapping of a [`BoundSql`] through its type handler.
#[derive(Debug, Clone)]
pub struct DefaultParameterHandler {
    statement_id: String,
    bound_sql: BoundSql,
}

impl DefaultParameterHandler {
    #[must_use]
    pub fn new(statement_id: impl Into<String>, bound_sql: BoundSql) -> Self {
        Self {
            statement_id: statement_id.into(),
            bound_sql,
        }
    }
}

impl Pluggable for DefaultParameterHandler {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::ParameterHandler]
    }
}

impl ParameterHandler for DefaultParameterHandler {
    fn parameter_object(&self) -> &Value {
        self.bound_sql.parameter_object()
    }

    fn set_parameters(&mut self, statement: &mut dyn Statement) -> Result<()> {
        let log = enabled!(Level::DEBUG);
        let mut logged = Vec::new();
        for (i, mapping) in self.bound_sql.parameter_mappings().iter().enumerate() {
            if mapping.mode == ParameterMode::Out {
                continue;
            }
            let value = self.bound_sql.parameter_value(mapping).map_err(|e| {
                e.context(format!("statement `{}`", self.statement_id))
            })?;
            mapping
                .type_handler
                .set_parameter(statement, i + 1, &value, mapping.jdbc_type)
                .map_err(|e| {
                    e.context(format!(
                        "Could not set parameter #{} ({}) of `{}`",
                        i + 1,
                        mapping.property,
                        self.statement_id
                    ))
                })?;
            if log {
                logged.push(format!("{value}({})", value.value_type()));
            }
        }
        debug!("==> Parameters: {}", logged.join(", "));
        Ok(())
    }
}
