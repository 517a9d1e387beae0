//! Query results: rows as the driver returns them and the values they map to.

pub mod cursor;
pub mod handler;
pub mod mapper;
pub mod result_set;
pub mod row;

pub use cursor::{Cursor, CursorState};
pub use handler::{DefaultResultSetHandler, ResultContext, ResultHandler, ResultSetHandler};
pub use mapper::RowMapper;
pub use result_set::ResultSet;
pub use row::{Columns, Row};
