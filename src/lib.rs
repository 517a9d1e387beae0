#![forbid(unsafe_code)]

//! A statement-mapping engine: dynamic SQL templates compiled against parameter
//! objects, an execution pipeline with simple, reusing and batching executors, a
//! transactional second-level cache, and interceptors around every pipeline stage.
//!
//! ```no_run
//! use sql_mapper::prelude::*;
//!
//! # fn main() -> Result<(), SqlMapperError> {
//! let data_source = SqliteDataSource::builder("app.db".into()).build()?;
//! let configuration = Configuration::builder()
//!     .perpetual_cache("users")
//!     .statement(
//!         MappedStatementBuilder::select("findUser", "select id, name from users where id = #{id}")
//!             .cache("users"),
//!     )
//!     .data_source(std::sync::Arc::new(data_source))
//!     .build()?;
//! let factory = SqlSessionFactory::new(configuration);
//! let mut session = factory.open_session()?;
//! let user = session.select_one("findUser", &Value::map([("id", 1)]))?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod cache;
pub mod driver;
pub mod error;
pub mod executor;
pub mod mapping;
pub mod plugin;
pub mod prelude;
pub mod results;
pub mod scripting;
pub mod session;
pub mod translation;
pub mod type_handler;
pub mod types;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{Result, SqlMapperError};
pub use session::{Configuration, ConfigurationBuilder, SqlSession, SqlSessionFactory};
pub use types::Value;
