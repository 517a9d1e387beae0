use std::collections::{HashMap, HashSet};
use std::fmt;

use super::Interceptor;
use crate::error::{Result, SqlMapperError};

/// A pipeline stage that can be intercepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    Executor,
    StatementHandler,
    ParameterHandler,
    ResultSetHandler,
}

impl Capability {
    /// Every interceptable method of this stage.
    #[must_use]
    pub fn methods(self) -> &'static [MethodSignature] {
        match self {
            Capability::Executor => EXECUTOR_METHODS,
            Capability::StatementHandler => STATEMENT_HANDLER_METHODS,
            Capability::ParameterHandler => PARAMETER_HANDLER_METHODS,
            Capability::ResultSetHandler => RESULT_SET_HANDLER_METHODS,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Executor => "Executor",
            Capability::StatementHandler => "StatementHandler",
            Capability::ParameterHandler => "ParameterHandler",
            Capability::ResultSetHandler => "ResultSetHandler",
        };
        f.write_str(name)
    }
}

/// A method name with its argument type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: &'static str,
    pub args: &'static [&'static str],
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(", "))
    }
}

const fn method(name: &'static str, args: &'static [&'static str]) -> MethodSignature {
    MethodSignature { name, args }
}

pub(crate) const EXECUTOR_UPDATE: MethodSignature = method("update", &["MappedStatement", "Value"]);
pub(crate) const EXECUTOR_QUERY: MethodSignature =
    method("query", &["MappedStatement", "Value", "RowBounds"]);
pub(crate) const EXECUTOR_QUERY_WITH_KEY: MethodSignature = method(
    "query",
    &["MappedStatement", "Value", "RowBounds", "CacheKey", "BoundSql"],
);
pub(crate) const EXECUTOR_QUERY_CURSOR: MethodSignature =
    method("query_cursor", &["MappedStatement", "Value", "RowBounds"]);
pub(crate) const EXECUTOR_FLUSH_STATEMENTS: MethodSignature = method("flush_statements", &[]);
pub(crate) const EXECUTOR_COMMIT: MethodSignature = method("commit", &["bool"]);
pub(crate) const EXECUTOR_ROLLBACK: MethodSignature = method("rollback", &["bool"]);

const EXECUTOR_METHODS: &[MethodSignature] = &[
    EXECUTOR_UPDATE,
    EXECUTOR_QUERY,
    EXECUTOR_QUERY_WITH_KEY,
    EXECUTOR_QUERY_CURSOR,
    EXECUTOR_FLUSH_STATEMENTS,
    EXECUTOR_COMMIT,
    EXECUTOR_ROLLBACK,
];

pub(crate) const HANDLER_PREPARE: MethodSignature = method("prepare", &["Connection", "Duration"]);
pub(crate) const HANDLER_PARAMETERIZE: MethodSignature = method("parameterize", &["Statement"]);
pub(crate) const HANDLER_BATCH: MethodSignature = method("batch", &["Statement"]);
pub(crate) const HANDLER_UPDATE: MethodSignature = method("update", &["Statement", "Value"]);
pub(crate) const HANDLER_QUERY: MethodSignature = method("query", &["Statement"]);
pub(crate) const HANDLER_QUERY_CURSOR: MethodSignature = method("query_cursor", &["Statement"]);

const STATEMENT_HANDLER_METHODS: &[MethodSignature] = &[
    HANDLER_PREPARE,
    HANDLER_PARAMETERIZE,
    HANDLER_BATCH,
    HANDLER_UPDATE,
    HANDLER_QUERY,
    HANDLER_QUERY_CURSOR,
];

pub(crate) const SET_PARAMETERS: MethodSignature = method("set_parameters", &["Statement"]);

const PARAMETER_HANDLER_METHODS: &[MethodSignature] = &[SET_PARAMETERS];

pub(crate) const HANDLE_RESULT_SETS: MethodSignature = method("handle_result_sets", &["ResultSet"]);
pub(crate) const HANDLE_CURSOR_RESULT_SETS: MethodSignature =
    method("handle_cursor_result_sets", &["RowSource"]);
pub(crate) const HANDLE_OUTPUT_PARAMETERS: MethodSignature =
    method("handle_output_parameters", &["Statement", "Value"]);

const RESULT_SET_HANDLER_METHODS: &[MethodSignature] = &[
    HANDLE_RESULT_SETS,
    HANDLE_CURSOR_RESULT_SETS,
    HANDLE_OUTPUT_PARAMETERS,
];

/// One intercepted method as an interceptor declares it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub capability: Capability,
    pub method: String,
    pub args: Vec<String>,
}

impl Signature {
    #[must_use]
    pub fn new(capability: Capability, method: impl Into<String>, args: &[&str]) -> Self {
        Self {
            capability,
            method: method.into(),
            args: args.iter().map(ToString::to_string).collect(),
        }
    }

    fn resolve(&self) -> Option<MethodSignature> {
        self.capability.methods().iter().copied().find(|candidate| {
            candidate.name == self.method
                && candidate.args.len() == self.args.len()
                && candidate.args.iter().zip(&self.args).all(|(a, b)| a == b)
        })
    }
}

/// The methods one interceptor intercepts, grouped by stage.
#[derive(Debug, Clone, Default)]
pub struct SignatureMap {
    methods: HashMap<Capability, HashSet<MethodSignature>>,
}

impl SignatureMap {
    /// Validate an interceptor's declared signatures.
    ///
    /// # Errors
    ///
    /// `PluginError` when nothing is declared or a declared method does not exist.
    pub fn build(interceptor: &dyn Interceptor) -> Result<Self> {
        let signatures = interceptor.signatures();
        if signatures.is_empty() {
            return Err(SqlMapperError::PluginError(format!(
                "interceptor `{}` declares no intercepted methods",
                interceptor.name()
            )));
        }
        let mut map = SignatureMap::default();
        for signature in &signatures {
            let Some(resolved) = signature.resolve() else {
                return Err(SqlMapperError::PluginError(format!(
                    "Could not find method on {} named {}({}) for interceptor `{}`",
                    signature.capability,
                    signature.method,
                    signature.args.join(", "),
                    interceptor.name()
                )));
            };
            map.methods
                .entry(signature.capability)
                .or_default()
                .insert(resolved);
        }
        Ok(map)
    }

    #[must_use]
    pub fn covers(&self, capability: Capability) -> bool {
        self.methods.contains_key(&capability)
    }

    #[must_use]
    pub fn intercepts(&self, capability: Capability, method: &MethodSignature) -> bool {
        self.methods
            .get(&capability)
            .is_some_and(|methods| methods.contains(method))
    }
}
