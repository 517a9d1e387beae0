use std::collections::BTreeMap;

use super::expr::Scope;
use crate::types::Value;

/// Binding name under which the whole parameter object is visible.
pub const PARAMETER_OBJECT_KEY: &str = "_parameter";
/// Binding name holding the configured database id (or null).
pub const DATABASE_ID_KEY: &str = "_databaseId";

/// Per-invocation state while a template is rendered.
///
/// Holds the accumulating SQL, the synthetic bindings produced by `bind` and `foreach`
/// nodes, and a borrowed view of the live parameter object.
#[derive(Debug)]
pub struct DynamicContext<'p> {
    parameter: &'p Value,
    bindings: BTreeMap<String, Value>,
    sql: String,
    unique: usize,
}

impl<'p> DynamicContext<'p> {
    #[must_use]
    pub fn new(parameter: &'p Value, database_id: Option<&str>) -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            DATABASE_ID_KEY.to_string(),
            database_id.map_or(Value::Null, Value::from),
        );
        Self {
            parameter,
            bindings,
            sql: String::new(),
            unique: 0,
        }
    }

    #[must_use]
    pub fn parameter(&self) -> &'p Value {
        self.parameter
    }

    pub fn bind(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        self.bindings.insert(name.into(), value)
    }

    /// Remove a binding, restoring `previous` if one was shadowed.
    pub(crate) fn restore(&mut self, name: &str, previous: Option<Value>) {
        match previous {
            Some(value) => {
                self.bindings.insert(name.to_string(), value);
            }
            None => {
                self.bindings.remove(name);
            }
        }
    }

    #[must_use]
    pub fn bindings(&self) -> &BTreeMap<String, Value> {
        &self.bindings
    }

    pub fn append_sql(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Swap in an empty buffer, returning what was accumulated so far.
    pub(crate) fn take_sql(&mut self) -> String {
        std::mem::take(&mut self.sql)
    }

    /// Put `previous` back as the buffer, returning the fragment rendered since `take_sql`.
    pub(crate) fn replace_sql(&mut self, previous: String) -> String {
        std::mem::replace(&mut self.sql, previous)
    }

    pub(crate) fn next_unique(&mut self) -> usize {
        let n = self.unique;
        self.unique += 1;
        n
    }

    /// Consume the context, yielding the rendered SQL and the synthetic bindings.
    #[must_use]
    pub fn into_parts(self) -> (String, BTreeMap<String, Value>) {
        (self.sql, self.bindings)
    }
}

impl Scope for DynamicContext<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.get(name) {
            return Some(value.clone());
        }
        if name == PARAMETER_OBJECT_KEY {
            return Some(self.parameter.clone());
        }
        match self.parameter {
            Value::Null => None,
            Value::Map(_) | Value::Record(_) => self.parameter.fields()?.get(name).cloned(),
            // a lone scalar or list answers to any name
            scalar => Some(scalar.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_shadow_parameter_fields() {
        let param = Value::map([("name", "from-param")]);
        let mut ctx = DynamicContext::new(&param, Some("sqlite"));
        assert_eq!(ctx.lookup("name"), Some(Value::from("from-param")));
        let previous = ctx.bind("name", Value::from("bound"));
        assert_eq!(ctx.lookup("name"), Some(Value::from("bound")));
        ctx.restore("name", previous);
        assert_eq!(ctx.lookup("name"), Some(Value::from("from-param")));
        assert_eq!(ctx.lookup(DATABASE_ID_KEY), Some(Value::from("sqlite")));
        assert_eq!(ctx.lookup(PARAMETER_OBJECT_KEY), Some(param.clone()));
    }

    #[test]
    fn scalar_parameter_answers_any_name() {
        let param = Value::Int(5);
        let ctx = DynamicContext::new(&param, None);
        assert_eq!(ctx.lookup("id"), Some(Value::Int(5)));
        assert_eq!(ctx.lookup(DATABASE_ID_KEY), Some(Value::Null));
    }
}
