//! Statement templates: the node tree, its expression language and the language
//! driver that compiles a template into a [`crate::builder::SqlSource`].

pub mod context;
pub mod driver;
pub mod expr;
pub mod node;
pub(crate) mod token;

pub use context::{DATABASE_ID_KEY, DynamicContext, PARAMETER_OBJECT_KEY};
pub use driver::LanguageDriver;
pub use expr::{Expression, truthy};
pub use node::{ForEachNode, SqlNode, TextNode, TrimNode};
