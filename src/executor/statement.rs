use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::close_quietly;
use super::parameter::ParameterHandler;
use crate::builder::BoundSql;
use crate::driver::{Connection, Statement, StatementOptions};
use crate::error::{Result, SqlMapperError};
use crate::mapping::{MappedStatement, RowBounds, StatementType};
use crate::plugin::{Capability, Pluggable};
use crate::results::{Cursor, ResultSetHandler};
use crate::session::Configuration;
use crate::translation::number_placeholders;
use crate::types::{JdbcType, Value, ValueType};

/// Drives one driver statement through prepare, bind and execute.
#[allow(clippy::missing_errors_doc)]
pub trait StatementHandler: Pluggable + Send {
    /// Prepare the statement on `connection`. The effective timeout is the smaller of
    /// the statement's own and `transaction_timeout`.
    fn prepare(
        &mut self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<Duration>,
    ) -> Result<Box<dyn Statement>>;

    fn parameterize(&mut self, statement: &mut dyn Statement) -> Result<()>;

    /// Queue the bound parameters as a batch entry.
    fn batch(&mut self, statement: &mut dyn Statement) -> Result<()>;

    /// Execute an update; generated keys and OUT values are written into `parameter`.
    fn update(&mut self, statement: &mut dyn Statement, parameter: &mut Value) -> Result<usize>;

    fn query(&mut self, statement: &mut dyn Statement) -> Result<Vec<Value>>;

    /// Execute and hand ownership of the statement to the returned cursor.
    fn query_cursor(&mut self, statement: Box<dyn Statement>) -> Result<Cursor>;

    fn bound_sql(&self) -> &BoundSql;
}

/// Handles plain, prepared and callable statements.
pub struct DefaultStatementHandler {
    configuration: Arc<Configuration>,
    statement: Arc<MappedStatement>,
    bound_sql: BoundSql,
    parameter_handler: Box<dyn ParameterHandler>,
    result_set_handler: Box<dyn ResultSetHandler>,
}

impl std::fmt::Debug for DefaultStatementHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultStatementHandler")
            .field("statement", &self.statement.id)
            .field("sql", &self.bound_sql.sql())
            .finish_non_exhaustive()
    }
}

impl DefaultStatementHandler {
    /// Compiles the statement unless `bound_sql` is given, then creates the parameter
    /// and result handlers through the configuration's interceptor chain.
    ///
    /// # Errors
    ///
    /// Template evaluation errors.
    pub fn new(
        configuration: &Arc<Configuration>,
        statement: &Arc<MappedStatement>,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: Option<BoundSql>,
    ) -> Result<Self> {
        let bound_sql = match bound_sql {
            Some(bound_sql) => bound_sql,
            None => statement.bound_sql(parameter, &configuration.compile_env())?,
        };
        let parameter_handler = configuration.new_parameter_handler(statement, bound_sql.clone());
        let result_set_handler = configuration.new_result_set_handler(statement, &bound_sql, bounds);
        Ok(Self {
            configuration: configuration.clone(),
            statement: statement.clone(),
            bound_sql,
            parameter_handler,
            result_set_handler,
        })
    }

    fn effective_timeout(&self, transaction_timeout: Option<Duration>) -> Option<Duration> {
        let statement_timeout = self
            .statement
            .timeout
            .or_else(|| self.configuration.settings().statement_timeout());
        match (statement_timeout, transaction_timeout) {
            (Some(own), Some(tx)) => Some(own.min(tx)),
            (own, None) => own,
            (None, tx) => tx,
        }
    }

    fn is_callable(&self) -> bool {
        self.statement.statement_type == StatementType::Callable
    }

    fn register_output_parameters(&self, statement: &mut dyn Statement) -> Result<()> {
        for (i, mapping) in self.bound_sql.parameter_mappings().iter().enumerate() {
            if !mapping.mode.is_output() {
                continue;
            }
            let jdbc_type = match (mapping.jdbc_type, &mapping.value_type) {
                (Some(jdbc_type), _) => jdbc_type,
                (None, ValueType::Cursor) => JdbcType::Cursor,
                (None, _) => {
                    return Err(SqlMapperError::ExecutionError(format!(
                        "The jdbcType must be specified for output parameter `{}` of `{}`",
                        mapping.property, self.statement.id
                    )));
                }
            };
            statement.register_out_parameter(i + 1, Some(jdbc_type))?;
        }
        Ok(())
    }
}

impl Pluggable for DefaultStatementHandler {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::StatementHandler]
    }
}

impl StatementHandler for DefaultStatementHandler {
    fn prepare(
        &mut self,
        connection: &mut dyn Connection,
        transaction_timeout: Option<Duration>,
    ) -> Result<Box<dyn Statement>> {
        let settings = self.configuration.settings();
        let sql = number_placeholders(self.bound_sql.sql(), settings.placeholder_style);
        debug!("==>  Preparing: {sql}");
        let options = StatementOptions {
            timeout: self.effective_timeout(transaction_timeout),
            fetch_size: self.statement.fetch_size.or(settings.default_fetch_size),
            result_set_type: self.statement.result_set_type,
            return_generated_keys: self.statement.key_generator.is_enabled(),
            callable: self.is_callable(),
        };
        connection
            .prepare(&sql, &options)
            .map_err(|e| e.context(format!("Error preparing statement `{}`", self.statement.id)))
    }

    fn parameterize(&mut self, statement: &mut dyn Statement) -> Result<()> {
        match self.statement.statement_type {
            StatementType::Statement => Ok(()),
            StatementType::Prepared => self.parameter_handler.set_parameters(statement),
            StatementType::Callable => {
                self.register_output_parameters(statement)?;
                self.parameter_handler.set_parameters(statement)
            }
        }
    }

    fn batch(&mut self, statement: &mut dyn Statement) -> Result<()> {
        statement.add_batch()
    }

    fn update(&mut self, statement: &mut dyn Statement, parameter: &mut Value) -> Result<usize> {
        let rows = statement.execute_update()?;
        let key_generator = &self.statement.key_generator;
        if key_generator.is_enabled() {
            let keys = statement.generated_keys()?;
            key_generator.assign_keys(parameter, &keys)?;
        }
        if self.is_callable() {
            self.result_set_handler
                .handle_output_parameters(statement, parameter)?;
        }
        debug!("<==    Updates: {rows}");
        Ok(rows)
    }

    fn query(&mut self, statement: &mut dyn Statement) -> Result<Vec<Value>> {
        let result_set = statement.execute_query()?;
        let rows = self.result_set_handler.handle_result_sets(result_set)?;
        debug!("<==      Total: {}", rows.len());
        Ok(rows)
    }

    fn query_cursor(&mut self, mut statement: Box<dyn Statement>) -> Result<Cursor> {
        let rows = match statement.open_cursor() {
            Ok(rows) => rows,
            Err(e) => {
                close_quietly(statement.as_mut());
                return Err(e);
            }
        };
        match self.result_set_handler.handle_cursor_result_sets(rows) {
            Ok(mut cursor) => {
                cursor.attach_statement(statement);
                Ok(cursor)
            }
            Err(e) => {
                close_quietly(statement.as_mut());
                Err(e)
            }
        }
    }

    fn bound_sql(&self) -> &BoundSql {
        &self.bound_sql
    }
}
