use std::collections::BTreeMap;

use regex::Regex;
use tracing::trace;

use super::context::DynamicContext;
use super::expr::Expression;
use super::token::{contains_token, replace_tokens};
use crate::builder::SqlSourceBuilder;
use crate::error::{Result, SqlMapperError};
use crate::types::Value;

const ITEM_PREFIX: &str = "__frch_";

/// One node of a statement template.
///
/// `apply` renders the node into the context and reports whether it contributed:
/// an `If` whose test fails and a `Choose` with no matching branch return `false`,
/// every other node returns `true`.
#[derive(Debug, Clone)]
pub enum SqlNode {
    /// Text with no `${}` substitutions, appended verbatim.
    StaticText(String),
    /// Text with `${}` substitutions.
    Text(TextNode),
    Mixed(Vec<SqlNode>),
    If {
        test: Expression,
        contents: Box<SqlNode>,
    },
    Choose {
        whens: Vec<(Expression, SqlNode)>,
        otherwise: Option<Box<SqlNode>>,
    },
    Trim(TrimNode),
    ForEach(ForEachNode),
    Bind {
        name: String,
        value: Expression,
    },
}

fn wrap(mut contents: Vec<SqlNode>) -> SqlNode {
    if contents.len() == 1 {
        contents.remove(0)
    } else {
        SqlNode::Mixed(contents)
    }
}

impl SqlNode {
    /// Literal text; becomes a [`SqlNode::Text`] when it carries `${}` tokens.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        if contains_token(&text, "${", "}") {
            SqlNode::Text(TextNode::new(text))
        } else {
            SqlNode::StaticText(text)
        }
    }

    #[must_use]
    pub fn mixed(contents: Vec<SqlNode>) -> Self {
        SqlNode::Mixed(contents)
    }

    #[must_use]
    pub fn if_then(test: &str, contents: Vec<SqlNode>) -> Self {
        SqlNode::If {
            test: Expression::new(test),
            contents: Box::new(wrap(contents)),
        }
    }

    #[must_use]
    pub fn choose(whens: Vec<(&str, Vec<SqlNode>)>, otherwise: Option<Vec<SqlNode>>) -> Self {
        SqlNode::Choose {
            whens: whens
                .into_iter()
                .map(|(test, contents)| (Expression::new(test), wrap(contents)))
                .collect(),
            otherwise: otherwise.map(|contents| Box::new(wrap(contents))),
        }
    }

    /// `WHERE` preset: prefixes `WHERE` and strips a leading `AND`/`OR`.
    #[must_use]
    pub fn where_(contents: Vec<SqlNode>) -> Self {
        SqlNode::Trim(
            TrimNode::new(contents)
                .prefix("WHERE")
                .prefix_overrides("AND |OR |AND\n|OR\n|AND\r|OR\r|AND\t|OR\t"),
        )
    }

    /// `SET` preset: prefixes `SET` and strips a stray leading or trailing comma.
    #[must_use]
    pub fn set(contents: Vec<SqlNode>) -> Self {
        SqlNode::Trim(
            TrimNode::new(contents)
                .prefix("SET")
                .prefix_overrides(",")
                .suffix_overrides(","),
        )
    }

    #[must_use]
    pub fn bind(name: impl Into<String>, value: &str) -> Self {
        SqlNode::Bind {
            name: name.into(),
            value: Expression::new(value),
        }
    }

    /// Whether rendering depends on the parameter object.
    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        match self {
            SqlNode::StaticText(_) => false,
            SqlNode::Mixed(children) => children.iter().any(SqlNode::is_dynamic),
            _ => true,
        }
    }

    /// Render this node into `ctx`.
    ///
    /// # Errors
    ///
    /// Expression failures, `${}` values rejected by the injection filter and
    /// non-iterable `foreach` collections.
    pub fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<bool> {
        match self {
            SqlNode::StaticText(text) => {
                ctx.append_sql(text);
                Ok(true)
            }
            SqlNode::Text(node) => {
                let rendered = node.render(ctx)?;
                ctx.append_sql(&rendered);
                Ok(true)
            }
            SqlNode::Mixed(children) => {
                for child in children {
                    child.apply(ctx)?;
                }
                Ok(true)
            }
            SqlNode::If { test, contents } => {
                if evaluate_test(test, ctx)? {
                    contents.apply(ctx)?;
                    return Ok(true);
                }
                Ok(false)
            }
            SqlNode::Choose { whens, otherwise } => {
                for (test, contents) in whens {
                    if evaluate_test(test, ctx)? {
                        contents.apply(ctx)?;
                        return Ok(true);
                    }
                }
                match otherwise {
                    Some(contents) => {
                        contents.apply(ctx)?;
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            SqlNode::Trim(node) => node.apply(ctx),
            SqlNode::ForEach(node) => node.apply(ctx),
            SqlNode::Bind { name, value } => {
                let bound = value
                    .evaluate(ctx)
                    .map_err(|e| e.context(format!("bind `{name}`")))?;
                ctx.bind(name.clone(), bound);
                Ok(true)
            }
        }
    }

    /// Parse every expression and placeholder in the tree.
    ///
    /// # Errors
    ///
    /// The first `ExpressionError` (wrapped with the node that holds it) or malformed
    /// placeholder.
    pub fn validate(&self) -> Result<()> {
        let check = |expr: &Expression, what: &str| {
            expr.validate()
                .map_err(|e| e.context(format!("{what} `{}`", expr.source())))
        };
        match self {
            SqlNode::StaticText(text) => SqlSourceBuilder::validate(text),
            SqlNode::Text(node) => {
                node.expressions
                    .iter()
                    .try_for_each(|expr| check(expr, "${}"))?;
                SqlSourceBuilder::validate(&node.raw)
            }
            SqlNode::Mixed(children) => children.iter().try_for_each(SqlNode::validate),
            SqlNode::If { test, contents } => {
                check(test, "if test")?;
                contents.validate()
            }
            SqlNode::Choose { whens, otherwise } => {
                for (test, contents) in whens {
                    check(test, "when test")?;
                    contents.validate()?;
                }
                otherwise.as_ref().map_or(Ok(()), |node| node.validate())
            }
            SqlNode::Trim(node) => node.contents.validate(),
            SqlNode::ForEach(node) => {
                check(&node.collection, "foreach collection")?;
                node.contents.validate()
            }
            SqlNode::Bind { value, .. } => check(value, "bind value"),
        }
    }

    /// Replace `${name}` tokens naming a configuration variable with its value.
    ///
    /// Tokens naming anything else are left for render time.
    #[must_use]
    pub fn substitute_variables(self, variables: &BTreeMap<String, String>) -> SqlNode {
        if variables.is_empty() {
            return self;
        }
        let substitute = |text: &str| {
            replace_tokens(text, "${", "}", |key| {
                Ok(variables
                    .get(key.trim())
                    .cloned()
                    .unwrap_or_else(|| format!("${{{key}}}")))
            })
            .unwrap_or_else(|_| text.to_string())
        };
        match self {
            SqlNode::StaticText(text) => SqlNode::StaticText(text),
            SqlNode::Text(node) => {
                let replaced = substitute(&node.raw);
                let mut rebuilt = SqlNode::text(replaced);
                if let SqlNode::Text(ref mut new_node) = rebuilt {
                    new_node.injection_filter = node.injection_filter;
                }
                rebuilt
            }
            SqlNode::Mixed(children) => SqlNode::Mixed(
                children
                    .into_iter()
                    .map(|child| child.substitute_variables(variables))
                    .collect(),
            ),
            SqlNode::If { test, contents } => SqlNode::If {
                test,
                contents: Box::new(contents.substitute_variables(variables)),
            },
            SqlNode::Choose { whens, otherwise } => SqlNode::Choose {
                whens: whens
                    .into_iter()
                    .map(|(test, node)| (test, node.substitute_variables(variables)))
                    .collect(),
                otherwise: otherwise.map(|node| Box::new(node.substitute_variables(variables))),
            },
            SqlNode::Trim(mut node) => {
                node.contents = Box::new(node.contents.substitute_variables(variables));
                SqlNode::Trim(node)
            }
            SqlNode::ForEach(mut node) => {
                node.contents = Box::new(node.contents.substitute_variables(variables));
                SqlNode::ForEach(node)
            }
            bind @ SqlNode::Bind { .. } => bind,
        }
    }

    /// Fill in unset `foreach` nullability and `${}` injection filters.
    pub(crate) fn apply_defaults(&mut self, nullable: bool, injection_filter: Option<&Regex>) {
        match self {
            SqlNode::StaticText(_) | SqlNode::Bind { .. } => {}
            SqlNode::Text(node) => {
                if node.injection_filter.is_none() {
                    node.injection_filter = injection_filter.cloned();
                }
            }
            SqlNode::Mixed(children) => {
                for child in children {
                    child.apply_defaults(nullable, injection_filter);
                }
            }
            SqlNode::If { contents, .. } => contents.apply_defaults(nullable, injection_filter),
            SqlNode::Choose { whens, otherwise } => {
                for (_, contents) in whens {
                    contents.apply_defaults(nullable, injection_filter);
                }
                if let Some(contents) = otherwise {
                    contents.apply_defaults(nullable, injection_filter);
                }
            }
            SqlNode::Trim(node) => node.contents.apply_defaults(nullable, injection_filter),
            SqlNode::ForEach(node) => {
                node.nullable.get_or_insert(nullable);
                node.contents.apply_defaults(nullable, injection_filter);
            }
        }
    }
}

impl From<&str> for SqlNode {
    fn from(text: &str) -> Self {
        SqlNode::text(text)
    }
}

fn evaluate_test(test: &Expression, ctx: &DynamicContext<'_>) -> Result<bool> {
    let result = test
        .evaluate_bool(ctx)
        .map_err(|e| e.context(format!("test `{}`", test.source())))?;
    trace!(test = test.source(), result, "evaluated template test");
    Ok(result)
}

/// Text carrying `${}` substitutions, rendered by string replacement.
#[derive(Debug, Clone)]
pub struct TextNode {
    raw: String,
    expressions: Vec<Expression>,
    injection_filter: Option<Regex>,
}

impl TextNode {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut expressions = Vec::new();
        let _ = replace_tokens(&raw, "${", "}", |expr| {
            expressions.push(Expression::new(expr.trim()));
            Ok(String::new())
        });
        Self {
            raw,
            expressions,
            injection_filter: None,
        }
    }

    /// Values substituted into this text must fully match `filter`.
    #[must_use]
    pub fn with_injection_filter(mut self, filter: Regex) -> Self {
        self.injection_filter = Some(filter);
        self
    }

    fn render(&self, ctx: &DynamicContext<'_>) -> Result<String> {
        let mut next = self.expressions.iter();
        replace_tokens(&self.raw, "${", "}", |source| {
            let value = match next.next() {
                Some(expr) => expr.evaluate(ctx),
                None => Expression::new(source.trim()).evaluate(ctx),
            }
            .map_err(|e| e.context(format!("${{{source}}}")))?;
            let rendered = match value {
                Value::Null => String::new(),
                other => other.to_string(),
            };
            if let Some(filter) = &self.injection_filter {
                if !is_full_match(filter, &rendered) {
                    return Err(SqlMapperError::BindingError {
                        fragment: format!("${{{source}}}"),
                        message: format!(
                            "Invalid input. Please conform to regex {}",
                            filter.as_str()
                        ),
                    });
                }
            }
            Ok(rendered)
        })
    }
}

fn is_full_match(filter: &Regex, text: &str) -> bool {
    filter
        .find(text)
        .is_some_and(|m| m.start() == 0 && m.end() == text.len())
}

/// Strips configured leading/trailing tokens from rendered content and wraps it in
/// a prefix and suffix. Override tokens match case-insensitively.
#[derive(Debug, Clone)]
pub struct TrimNode {
    contents: Box<SqlNode>,
    prefix: Option<String>,
    suffix: Option<String>,
    prefix_overrides: Vec<String>,
    suffix_overrides: Vec<String>,
}

fn parse_overrides(overrides: &str) -> Vec<String> {
    overrides
        .split('|')
        .filter(|token| !token.is_empty())
        .map(str::to_ascii_uppercase)
        .collect()
}

impl TrimNode {
    #[must_use]
    pub fn new(contents: Vec<SqlNode>) -> Self {
        Self {
            contents: Box::new(wrap(contents)),
            prefix: None,
            suffix: None,
            prefix_overrides: Vec::new(),
            suffix_overrides: Vec::new(),
        }
    }

    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// `|`-separated tokens removed from the start of the rendered content.
    #[must_use]
    pub fn prefix_overrides(mut self, overrides: &str) -> Self {
        self.prefix_overrides = parse_overrides(overrides);
        self
    }

    /// `|`-separated tokens removed from the end of the rendered content.
    #[must_use]
    pub fn suffix_overrides(mut self, overrides: &str) -> Self {
        self.suffix_overrides = parse_overrides(overrides);
        self
    }

    fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<bool> {
        let saved = ctx.take_sql();
        let applied = self.contents.apply(ctx);
        let body = ctx.replace_sql(saved);
        let applied = applied?;

        let trimmed = self.trim(&body);
        if trimmed.is_empty() {
            return Ok(applied);
        }
        let mut out = String::new();
        if let Some(prefix) = &self.prefix {
            out.push_str(prefix);
            out.push(' ');
        }
        out.push_str(trimmed);
        if let Some(suffix) = &self.suffix {
            out.push(' ');
            out.push_str(suffix);
        }
        if ctx.sql().chars().last().is_some_and(|c| !c.is_whitespace()) {
            ctx.append_sql(" ");
        }
        ctx.append_sql(&out);
        Ok(applied)
    }

    fn trim<'a>(&self, body: &'a str) -> &'a str {
        let mut body = body.trim();
        // ASCII uppercasing keeps byte offsets aligned with `body`
        let upper = body.to_ascii_uppercase();
        if let Some(token) = self
            .prefix_overrides
            .iter()
            .find(|token| upper.starts_with(token.as_str()))
        {
            body = body[token.len()..].trim_start();
        }
        let upper = body.to_ascii_uppercase();
        // padded tokens such as " AND " also match their bare form at the end
        let suffix_len = self.suffix_overrides.iter().find_map(|token| {
            if upper.ends_with(token.as_str()) {
                Some(token.len())
            } else {
                let bare = token.trim();
                (!bare.is_empty() && upper.ends_with(bare)).then_some(bare.len())
            }
        });
        if let Some(len) = suffix_len {
            body = body[..body.len() - len].trim_end();
        }
        body
    }
}

/// Repeats its contents once per element of a collection.
///
/// Lists iterate with the position as index; maps and records iterate their entries
/// with the key as index. Placeholders naming the item or index inside the contents are
/// rewritten to unique synthetic bindings so every iteration binds its own value.
#[derive(Debug, Clone)]
pub struct ForEachNode {
    collection: Expression,
    contents: Box<SqlNode>,
    item: Option<String>,
    index: Option<String>,
    open: Option<String>,
    close: Option<String>,
    separator: Option<String>,
    nullable: Option<bool>,
}

impl ForEachNode {
    #[must_use]
    pub fn new(collection: &str, contents: Vec<SqlNode>) -> Self {
        Self {
            collection: Expression::new(collection),
            contents: Box::new(wrap(contents)),
            item: None,
            index: None,
            open: None,
            close: None,
            separator: None,
            nullable: None,
        }
    }

    #[must_use]
    pub fn item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }

    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    #[must_use]
    pub fn open(mut self, open: impl Into<String>) -> Self {
        self.open = Some(open.into());
        self
    }

    #[must_use]
    pub fn close(mut self, close: impl Into<String>) -> Self {
        self.close = Some(close.into());
        self
    }

    #[must_use]
    pub fn separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = Some(separator.into());
        self
    }

    /// A null collection renders nothing instead of failing.
    #[must_use]
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    fn entries(&self, ctx: &DynamicContext<'_>) -> Result<Option<Vec<(Value, Value)>>> {
        let source = self.collection.source();
        let value = self
            .collection
            .evaluate(ctx)
            .map_err(|e| e.context(format!("foreach collection `{source}`")))?;
        let entries = match value {
            Value::Null if self.nullable.unwrap_or(false) => return Ok(None),
            Value::Null => {
                return Err(SqlMapperError::BindingError {
                    fragment: source.to_string(),
                    message: "the collection expression evaluated to null".into(),
                });
            }
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i64::try_from(i).unwrap_or(i64::MAX)), item))
                .collect(),
            Value::Json(json @ (serde_json::Value::Array(_) | serde_json::Value::Object(_))) => {
                return self.entries_of(Value::from(json));
            }
            Value::Map(map) => map.into_iter().map(|(k, v)| (Value::Text(k), v)).collect(),
            Value::Record(record) => record
                .fields
                .into_iter()
                .map(|(k, v)| (Value::Text(k), v))
                .collect(),
            other => {
                return Err(SqlMapperError::BindingError {
                    fragment: source.to_string(),
                    message: format!("a {} value is not iterable", other.value_type()),
                });
            }
        };
        Ok(Some(entries))
    }

    fn entries_of(&self, value: Value) -> Result<Option<Vec<(Value, Value)>>> {
        let entries = match value {
            Value::List(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (Value::Int(i64::try_from(i).unwrap_or(i64::MAX)), item))
                .collect(),
            Value::Map(map) => map.into_iter().map(|(k, v)| (Value::Text(k), v)).collect(),
            other => {
                return Err(SqlMapperError::BindingError {
                    fragment: self.collection.source().to_string(),
                    message: format!("a {} value is not iterable", other.value_type()),
                });
            }
        };
        Ok(Some(entries))
    }

    fn apply(&self, ctx: &mut DynamicContext<'_>) -> Result<bool> {
        let Some(entries) = self.entries(ctx)? else {
            return Ok(true);
        };
        let previous_item = self.item.as_ref().map(|name| (name, ctx.bindings().get(name).cloned()));
        let previous_index = self.index.as_ref().map(|name| (name, ctx.bindings().get(name).cloned()));

        let mut rendered = String::new();
        if let Some(open) = &self.open {
            rendered.push_str(open);
        }
        let mut first = true;
        let mut failure = None;
        for (index, item) in entries {
            let unique = ctx.next_unique();
            if let Some(name) = &self.index {
                ctx.bind(itemize(name, unique), index.clone());
                ctx.bind(name.clone(), index);
            }
            if let Some(name) = &self.item {
                ctx.bind(itemize(name, unique), item.clone());
                ctx.bind(name.clone(), item);
            }
            let saved = ctx.take_sql();
            let applied = self.contents.apply(ctx);
            let fragment = ctx.replace_sql(saved);
            if let Err(e) = applied {
                failure = Some(e);
                break;
            }
            let fragment = match self.rewrite_placeholders(&fragment, unique) {
                Ok(fragment) => fragment,
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };
            let fragment = fragment.trim();
            if fragment.is_empty() {
                continue;
            }
            if !first {
                if let Some(separator) = &self.separator {
                    rendered.push_str(separator);
                }
            }
            rendered.push_str(fragment);
            first = false;
        }

        if let Some((name, previous)) = previous_item {
            ctx.restore(name, previous);
        }
        if let Some((name, previous)) = previous_index {
            ctx.restore(name, previous);
        }
        if let Some(e) = failure {
            return Err(e);
        }
        if let Some(close) = &self.close {
            rendered.push_str(close);
        }
        ctx.append_sql(&rendered);
        Ok(true)
    }

    /// Point `#{item...}`/`#{index...}` placeholders at this iteration's bindings.
    fn rewrite_placeholders(&self, fragment: &str, unique: usize) -> Result<String> {
        replace_tokens(fragment, "#{", "}", |content| {
            let mut content = content.to_string();
            for name in [&self.item, &self.index].into_iter().flatten() {
                if let Some(rest) = strip_variable(&content, name) {
                    content = format!("{}{rest}", itemize(name, unique));
                    break;
                }
            }
            Ok(format!("#{{{}}}", content.replace('}', "\\}")))
        })
    }
}

fn itemize(name: &str, unique: usize) -> String {
    format!("{ITEM_PREFIX}{name}_{unique}")
}

/// The remainder of `content` after a leading `name`, if `name` is a whole variable.
fn strip_variable<'a>(content: &'a str, name: &str) -> Option<&'a str> {
    let rest = content.trim_start().strip_prefix(name)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if matches!(c, '.' | ',' | ':' | '[') || c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(node: &SqlNode, param: &Value) -> Result<String> {
        let mut ctx = DynamicContext::new(param, None);
        node.apply(&mut ctx)?;
        Ok(ctx.into_parts().0)
    }

    #[test]
    fn text_classifies_dynamic_tokens() {
        assert!(!SqlNode::text("select #{id}").is_dynamic());
        assert!(SqlNode::text("order by ${column}").is_dynamic());
        assert!(!SqlNode::text(r"cost \${literal}").is_dynamic());
    }

    #[test]
    fn if_reports_whether_it_applied() {
        let node = SqlNode::if_then("name != null", vec![" AND name = #{name}".into()]);
        let param = Value::map([("name", "x")]);
        let mut ctx = DynamicContext::new(&param, None);
        assert!(node.apply(&mut ctx).unwrap());
        let empty = Value::map::<&str, Value, _>([]);
        let mut ctx = DynamicContext::new(&empty, None);
        assert!(!node.apply(&mut ctx).unwrap());
        assert_eq!(ctx.sql(), "");
    }

    #[test]
    fn where_strips_leading_and_case_insensitively() {
        let node = SqlNode::mixed(vec![
            "select * from blog".into(),
            SqlNode::where_(vec![
                SqlNode::if_then("state != null", vec!["state = #{state}".into()]),
                SqlNode::if_then("title != null", vec![" and title like #{title}".into()]),
            ]),
        ]);
        let param = Value::map([("title", "t")]);
        assert_eq!(
            render(&node, &param).unwrap(),
            "select * from blog WHERE title like #{title}"
        );
        let none = Value::map::<&str, Value, _>([]);
        assert_eq!(render(&node, &none).unwrap(), "select * from blog");
    }

    #[test]
    fn set_strips_trailing_comma() {
        let node = SqlNode::set(vec![
            SqlNode::if_then("name != null", vec!["name = #{name},".into()]),
            SqlNode::if_then("age != null", vec![" age = #{age},".into()]),
        ]);
        let param = Value::map([("name", "n")]);
        assert_eq!(render(&node, &param).unwrap(), "SET name = #{name}");
    }

    #[test]
    fn padded_suffix_overrides_match_their_bare_form() {
        let node = SqlNode::Trim(
            TrimNode::new(vec![
                SqlNode::if_then("a != null", vec!["a = #{a} AND".into()]),
                SqlNode::if_then("b != null", vec![" b = #{b} or".into()]),
            ])
            .prefix("WHERE")
            .suffix_overrides(" AND |OR "),
        );
        assert_eq!(render(&node, &Value::map([("a", 1)])).unwrap(), "WHERE a = #{a}");
        assert_eq!(
            render(&node, &Value::map([("a", 1), ("b", 2)])).unwrap(),
            "WHERE a = #{a} AND b = #{b}"
        );
    }

    #[test]
    fn choose_takes_first_matching_branch() {
        let node = SqlNode::choose(
            vec![("a != null", vec!["A".into()]), ("b != null", vec!["B".into()])],
            Some(vec!["OTHER".into()]),
        );
        assert_eq!(render(&node, &Value::map([("a", 1), ("b", 2)])).unwrap(), "A");
        assert_eq!(render(&node, &Value::map([("b", 2)])).unwrap(), "B");
        assert_eq!(render(&node, &Value::Null).unwrap(), "OTHER");
    }

    #[test]
    fn foreach_rewrites_item_placeholders() {
        let node = SqlNode::ForEach(
            ForEachNode::new("ids", vec!["#{id}".into()])
                .item("id")
                .open("(")
                .separator(",")
                .close(")"),
        );
        let param = Value::map([("ids", Value::List(vec![1.into(), 2.into(), 3.into()]))]);
        let mut ctx = DynamicContext::new(&param, None);
        node.apply(&mut ctx).unwrap();
        let (sql, bindings) = ctx.into_parts();
        assert_eq!(sql, "(#{__frch_id_0},#{__frch_id_1},#{__frch_id_2})");
        assert_eq!(bindings.get("__frch_id_2"), Some(&Value::Int(3)));
        assert!(!bindings.contains_key("id"));
    }

    #[test]
    fn foreach_over_map_binds_key_as_index() {
        let node = SqlNode::ForEach(
            ForEachNode::new("cols", vec!["${k} = #{v}".into()])
                .item("v")
                .index("k")
                .separator(", "),
        );
        let param = Value::map([("cols", Value::map([("a", 1), ("b", 2)]))]);
        assert_eq!(
            render(&node, &param).unwrap(),
            "a = #{__frch_v_0}, b = #{__frch_v_1}"
        );
    }

    #[test]
    fn foreach_empty_collection_keeps_open_and_close() {
        let node = SqlNode::ForEach(
            ForEachNode::new("ids", vec!["#{id}".into()])
                .item("id")
                .open("(")
                .close(")"),
        );
        let param = Value::map([("ids", Value::List(vec![]))]);
        assert_eq!(render(&node, &param).unwrap(), "()");
    }

    #[test]
    fn foreach_null_collection_requires_nullable() {
        let strict = SqlNode::ForEach(ForEachNode::new("ids", vec!["#{id}".into()]).item("id"));
        let err = render(&strict, &Value::map([("ids", Value::Null)])).unwrap_err();
        assert!(matches!(err, SqlMapperError::BindingError { .. }));

        let lenient = SqlNode::ForEach(
            ForEachNode::new("ids", vec!["#{id}".into()])
                .item("id")
                .open("(")
                .nullable(true),
        );
        assert_eq!(render(&lenient, &Value::map([("ids", Value::Null)])).unwrap(), "");
    }

    #[test]
    fn bind_is_visible_to_later_text() {
        let node = SqlNode::mixed(vec![
            SqlNode::bind("pattern", "'%' + name + '%'"),
            "like '${pattern}'".into(),
        ]);
        assert_eq!(
            render(&node, &Value::map([("name", "ab")])).unwrap(),
            "like '%ab%'"
        );
    }

    #[test]
    fn injection_filter_rejects_unexpected_input() {
        let node = SqlNode::Text(
            TextNode::new("order by ${col}").with_injection_filter(Regex::new(r"^\w+$").unwrap()),
        );
        assert_eq!(
            render(&node, &Value::map([("col", "name")])).unwrap(),
            "order by name"
        );
        let err = render(&node, &Value::map([("col", "1; drop table x")])).unwrap_err();
        assert!(matches!(err, SqlMapperError::BindingError { .. }));
    }

    #[test]
    fn variables_are_substituted_once() {
        let vars = BTreeMap::from([("table".to_string(), "users".to_string())]);
        let node = SqlNode::text("select * from ${table} order by ${col}").substitute_variables(&vars);
        assert!(matches!(&node, SqlNode::Text(t) if t.raw == "select * from users order by ${col}"));
        let node = SqlNode::text("select * from ${table}").substitute_variables(&vars);
        assert!(matches!(node, SqlNode::StaticText(ref s) if s == "select * from users"));
    }

    #[test]
    fn validate_reports_bad_expressions_and_placeholders() {
        let node = SqlNode::if_then("a ==", vec!["x".into()]);
        assert!(node.validate().is_err());
        let node = SqlNode::if_then("a != null", vec!["x = #{a, bogus=1}".into()]);
        assert!(node.validate().is_err());
        let node = SqlNode::if_then("a != null", vec!["x = #{a, jdbcType=VARCHAR}".into()]);
        assert!(node.validate().is_ok());
    }
}
