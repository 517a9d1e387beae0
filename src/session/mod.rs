//! Sessions and the configuration they run against.

pub mod configuration;
pub mod factory;
pub mod mapper;
#[allow(clippy::module_inception)]
pub mod session;
pub mod settings;

pub use configuration::{Configuration, ConfigurationBuilder};
pub use factory::SqlSessionFactory;
pub use mapper::Mapper;
pub use session::SqlSession;
pub use settings::{ExecutorType, LocalCacheScope, Settings};
