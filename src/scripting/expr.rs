//! The expression language used by `if`, `when`, `bind` and `foreach` collections.
//!
//! Supported: `null`/`true`/`false`, numbers, quoted strings, variables with `.member`
//! and `[index]` access, `.size()`, `.length()`, `.isEmpty()`, comparisons
//! (`== != < <= > >=` and `eq neq lt lte gt gte`), `and`/`or`/`not` (also `&& || !`),
//! `+`/`-` and parentheses. `+` concatenates when either side is text.

use std::cmp::Ordering;
use std::sync::OnceLock;

use crate::error::{Result, SqlMapperError};
use crate::types::Value;

/// Variable lookup used while evaluating an expression.
pub(crate) trait Scope {
    fn lookup(&self, name: &str) -> Option<Value>;
}

/// A source expression, parsed on first use and cached afterwards.
#[derive(Debug)]
pub struct Expression {
    source: String,
    parsed: OnceLock<Result<Expr, String>>,
}

impl Clone for Expression {
    fn clone(&self) -> Self {
        Expression::new(self.source.clone())
    }
}

impl Expression {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            parsed: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parse the expression, reporting syntax errors.
    ///
    /// # Errors
    ///
    /// Returns `ExpressionError` when the source does not parse.
    pub fn validate(&self) -> Result<()> {
        self.compiled().map(|_| ())
    }

    fn compiled(&self) -> Result<&Expr> {
        self.parsed
            .get_or_init(|| Parser::parse(&self.source))
            .as_ref()
            .map_err(|message| {
                SqlMapperError::ExpressionError(format!("`{}`: {message}", self.source))
            })
    }

    pub(crate) fn evaluate(&self, scope: &dyn Scope) -> Result<Value> {
        self.compiled()?
            .eval(scope)
            .map_err(|message| {
                SqlMapperError::ExpressionError(format!("`{}`: {message}", self.source))
            })
    }

    pub(crate) fn evaluate_bool(&self, scope: &dyn Scope) -> Result<bool> {
        Ok(truthy(&self.evaluate(scope)?))
    }
}

/// Truthiness: booleans as-is, numbers when non-zero, null is false, anything else true.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        _ => true,
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Var(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Size(Box<Expr>),
    IsEmpty(Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

type EvalResult<T> = std::result::Result<T, String>;

impl Expr {
    fn eval(&self, scope: &dyn Scope) -> EvalResult<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(name) => Ok(scope.lookup(name).unwrap_or(Value::Null)),
            Expr::Member(target, name) => match target.eval(scope)? {
                Value::Null => Ok(Value::Null),
                Value::Map(mut map) => Ok(map.remove(name).unwrap_or(Value::Null)),
                Value::Record(mut record) => Ok(record.fields.remove(name).unwrap_or(Value::Null)),
                other => Err(format!("no property `{name}` on a {} value", other.value_type())),
            },
            Expr::Index(target, index) => {
                let target = target.eval(scope)?;
                let index = index.eval(scope)?;
                match (target, index) {
                    (Value::Null, _) => Ok(Value::Null),
                    (Value::List(mut items), Value::Int(i)) => {
                        let i = usize::try_from(i).map_err(|_| format!("negative index {i}"))?;
                        if i < items.len() {
                            Ok(items.swap_remove(i))
                        } else {
                            Ok(Value::Null)
                        }
                    }
                    (Value::Map(mut map), key) => Ok(map.remove(&key.to_string()).unwrap_or(Value::Null)),
                    (Value::Record(mut record), key) => {
                        Ok(record.fields.remove(&key.to_string()).unwrap_or(Value::Null))
                    }
                    (target, _) => Err(format!("cannot index a {} value", target.value_type())),
                }
            }
            Expr::Size(target) => size_of(&target.eval(scope)?)
                .map(|n| Value::Int(i64::try_from(n).unwrap_or(i64::MAX))),
            Expr::IsEmpty(target) => size_of(&target.eval(scope)?).map(|n| Value::Bool(n == 0)),
            Expr::Not(inner) => Ok(Value::Bool(!truthy(&inner.eval(scope)?))),
            Expr::Neg(inner) => match inner.eval(scope)? {
                Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| "integer overflow".to_string()),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(format!("cannot negate a {} value", other.value_type())),
            },
            Expr::And(lhs, rhs) => {
                if !truthy(&lhs.eval(scope)?) {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(truthy(&rhs.eval(scope)?)))
            }
            Expr::Or(lhs, rhs) => {
                if truthy(&lhs.eval(scope)?) {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(truthy(&rhs.eval(scope)?)))
            }
            Expr::Compare(op, lhs, rhs) => {
                let lhs = lhs.eval(scope)?;
                let rhs = rhs.eval(scope)?;
                compare(*op, &lhs, &rhs).map(Value::Bool)
            }
            Expr::Add(lhs, rhs) => {
                let lhs = lhs.eval(scope)?;
                let rhs = rhs.eval(scope)?;
                match (&lhs, &rhs) {
                    (Value::Text(_), _) | (_, Value::Text(_)) => Ok(Value::Text(format!("{lhs}{rhs}"))),
                    (Value::Int(a), Value::Int(b)) => a
                        .checked_add(*b)
                        .map(Value::Int)
                        .ok_or_else(|| "integer overflow".to_string()),
                    _ => match (lhs.as_float(), rhs.as_float()) {
                        (Some(a), Some(b)) => Ok(Value::Float(a + b)),
                        _ => Err(format!(
                            "cannot add {} and {}",
                            lhs.value_type(),
                            rhs.value_type()
                        )),
                    },
                }
            }
            Expr::Sub(lhs, rhs) => {
                let lhs = lhs.eval(scope)?;
                let rhs = rhs.eval(scope)?;
                match (&lhs, &rhs) {
                    (Value::Int(a), Value::Int(b)) => a
                        .checked_sub(*b)
                        .map(Value::Int)
                        .ok_or_else(|| "integer overflow".to_string()),
                    _ => match (lhs.as_float(), rhs.as_float()) {
                        (Some(a), Some(b)) => Ok(Value::Float(a - b)),
                        _ => Err(format!(
                            "cannot subtract {} from {}",
                            rhs.value_type(),
                            lhs.value_type()
                        )),
                    },
                }
            }
        }
    }
}

fn size_of(value: &Value) -> EvalResult<usize> {
    match value {
        Value::List(items) => Ok(items.len()),
        Value::Map(map) => Ok(map.len()),
        Value::Record(record) => Ok(record.fields.len()),
        Value::Text(s) => Ok(s.chars().count()),
        Value::Blob(bytes) => Ok(bytes.len()),
        other => Err(format!("{} value has no size", other.value_type())),
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> EvalResult<bool> {
    if matches!(op, CmpOp::Eq | CmpOp::Ne) {
        let equal = match (lhs, rhs) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                lhs.as_float() == rhs.as_float()
            }
            _ => lhs == rhs,
        };
        return Ok(if op == CmpOp::Eq { equal } else { !equal });
    }
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
            match (lhs.as_float(), rhs.as_float()) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => None,
            }
        }
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
        _ => None,
    }
    .ok_or_else(|| {
        format!(
            "cannot order {} against {}",
            lhs.value_type(),
            rhs.value_type()
        )
    })?;
    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
    })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
}

fn tokenize(source: &str) -> EvalResult<Vec<Token>> {
    const OPS: [&str; 14] = [
        "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "+", "-", "=", "&", "|",
    ];
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '[' => tokens.push(Token::LBracket),
            ']' => tokens.push(Token::RBracket),
            '.' if !chars.get(i + 1).is_some_and(char::is_ascii_digit) => tokens.push(Token::Dot),
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err("unterminated string literal".into()),
                        Some('\\') => {
                            i += 1;
                            match chars.get(i) {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(other) => s.push(*other),
                                None => return Err("unterminated string literal".into()),
                            }
                        }
                        Some(ch) if *ch == quote => break,
                        Some(ch) => s.push(*ch),
                    }
                    i += 1;
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                // numeric suffixes such as 10L or 1.5d
                if i < chars.len() && matches!(chars[i], 'L' | 'l' | 'd' | 'D' | 'f' | 'F') {
                    i += 1;
                }
                if text.contains('.') {
                    tokens.push(Token::Float(
                        text.parse().map_err(|_| format!("bad number `{text}`"))?,
                    ));
                } else {
                    tokens.push(Token::Int(
                        text.parse().map_err(|_| format!("bad number `{text}`"))?,
                    ));
                }
                continue;
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
                continue;
            }
            _ => {
                let rest: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let op = OPS
                    .iter()
                    .find(|op| rest.starts_with(**op))
                    .ok_or_else(|| format!("unexpected character `{c}`"))?;
                if matches!(*op, "=" | "&" | "|") {
                    return Err(format!("unexpected operator `{op}`"));
                }
                tokens.push(Token::Op(*op));
                i += op.chars().count();
                continue;
            }
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn parse(source: &str) -> EvalResult<Expr> {
        let tokens = tokenize(source)?;
        if tokens.is_empty() {
            return Err("empty expression".into());
        }
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(format!("unexpected token {tok:?}")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn eat_word(&mut self, words: &[&str]) -> bool {
        let hit = match self.peek() {
            Some(Token::Ident(word)) => words.contains(&word.as_str()),
            Some(Token::Op(op)) => words.contains(op),
            _ => false,
        };
        if hit {
            self.pos += 1;
        }
        hit
    }

    fn expect(&mut self, wanted: &Token) -> EvalResult<()> {
        match self.next() {
            Some(ref tok) if tok == wanted => Ok(()),
            Some(tok) => Err(format!("expected {wanted:?}, found {tok:?}")),
            None => Err(format!("expected {wanted:?} at end of expression")),
        }
    }

    fn or(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.and()?;
        while self.eat_word(&["or", "||"]) {
            lhs = Expr::Or(Box::new(lhs), Box::new(self.and()?));
        }
        Ok(lhs)
    }

    fn and(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.not()?;
        while self.eat_word(&["and", "&&"]) {
            lhs = Expr::And(Box::new(lhs), Box::new(self.not()?));
        }
        Ok(lhs)
    }

    fn not(&mut self) -> EvalResult<Expr> {
        if self.eat_word(&["not", "!"]) {
            return Ok(Expr::Not(Box::new(self.not()?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> EvalResult<Expr> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Op("==")) => CmpOp::Eq,
            Some(Token::Op("!=")) => CmpOp::Ne,
            Some(Token::Op("<")) => CmpOp::Lt,
            Some(Token::Op("<=")) => CmpOp::Le,
            Some(Token::Op(">")) => CmpOp::Gt,
            Some(Token::Op(">=")) => CmpOp::Ge,
            Some(Token::Ident(word)) => match word.as_str() {
                "eq" => CmpOp::Eq,
                "neq" => CmpOp::Ne,
                "lt" => CmpOp::Lt,
                "lte" => CmpOp::Le,
                "gt" => CmpOp::Gt,
                "gte" => CmpOp::Ge,
                _ => return Ok(lhs),
            },
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        Ok(Expr::Compare(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> EvalResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            if self.eat_word(&["+"]) {
                lhs = Expr::Add(Box::new(lhs), Box::new(self.unary()?));
            } else if self.eat_word(&["-"]) {
                lhs = Expr::Sub(Box::new(lhs), Box::new(self.unary()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> EvalResult<Expr> {
        if self.eat_word(&["-"]) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat_word(&["!"]) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> EvalResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let Some(Token::Ident(name)) = self.next() else {
                        return Err("expected a property name after `.`".into());
                    };
                    if self.peek() == Some(&Token::LParen) {
                        self.pos += 1;
                        self.expect(&Token::RParen)?;
                        expr = match name.as_str() {
                            "size" | "length" => Expr::Size(Box::new(expr)),
                            "isEmpty" => Expr::IsEmpty(Box::new(expr)),
                            other => return Err(format!("unsupported method `{other}()`")),
                        };
                    } else {
                        expr = Expr::Member(Box::new(expr), name);
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.or()?;
                    self.expect(&Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => return Ok(expr),
            }
        }
    }

    fn primary(&mut self) -> EvalResult<Expr> {
        match self.next() {
            Some(Token::Int(i)) => Ok(Expr::Literal(Value::Int(i))),
            Some(Token::Float(f)) => Ok(Expr::Literal(Value::Float(f))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::Text(s))),
            Some(Token::LParen) => {
                let inner = self.or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(word)) => Ok(match word.as_str() {
                "null" => Expr::Literal(Value::Null),
                "true" => Expr::Literal(Value::Bool(true)),
                "false" => Expr::Literal(Value::Bool(false)),
                "and" | "or" | "not" | "eq" | "neq" | "lt" | "lte" | "gt" | "gte" => {
                    return Err(format!("unexpected keyword `{word}`"));
                }
                _ => Expr::Var(word),
            }),
            Some(tok) => Err(format!("unexpected token {tok:?}")),
            None => Err("unexpected end of expression".into()),
        }
    }
}
