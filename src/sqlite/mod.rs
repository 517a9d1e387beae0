//! `SQLite` backend: each connection is a `rusqlite::Connection` owned by a worker
//! thread, so the synchronous driver traits can be implemented without holding the
//! connection across threads.

pub mod config;
pub mod connection;
pub mod params;
mod worker;

pub use config::{SqliteDataSource, SqliteOptions, SqliteOptionsBuilder};
pub use connection::{SqliteConnection, SqliteRows, SqliteStatement};
pub use params::{Params, sqlite_extract_value, value_to_sqlite};
