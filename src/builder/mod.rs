//! Placeholder parsing and statement sources.

pub mod expression;
pub mod source;

pub use expression::{PlaceholderSpec, parse_placeholder};
pub use source::{
    BoundSql, CompileEnv, DynamicSqlSource, ParameterMapping, SqlSource, SqlSourceBuilder,
    StaticSqlSource,
};
