//! Lazily-mapped query results.

use std::fmt;

use tracing::{debug, warn};

use super::mapper::RowMapper;
use crate::driver::{RowSource, Statement};
use crate::error::Result;
use crate::mapping::RowBounds;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Executed, nothing fetched yet.
    Created,
    Open,
    /// Every row was fetched.
    Consumed,
    /// Closed before or after consumption.
    Closed,
}

/// Rows mapped one at a time as they are pulled.
///
/// The cursor owns the statement that produced it and releases it exactly once: on
/// exhaustion, on [`Cursor::close`], or on drop, whichever comes first.
pub struct Cursor {
    rows: Option<Box<dyn RowSource>>,
    statement: Option<Box<dyn Statement>>,
    mapper: RowMapper,
    bounds: RowBounds,
    state: CursorState,
    skipped: bool,
    yielded: usize,
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("state", &self.state)
            .field("mapper", &self.mapper)
            .field("bounds", &self.bounds)
            .field("yielded", &self.yielded)
            .finish_non_exhaustive()
    }
}

impl Cursor {
    #[must_use]
    pub fn new(rows: Box<dyn RowSource>, mapper: RowMapper, bounds: RowBounds) -> Self {
        Self {
            rows: Some(rows),
            statement: None,
            mapper,
            bounds,
            state: CursorState::Created,
            skipped: false,
            yielded: 0,
        }
    }

    /// Hand the producing statement to the cursor so it closes with it.
    pub fn attach_statement(&mut self, statement: Box<dyn Statement>) {
        if self.state == CursorState::Closed {
            let mut statement = statement;
            if let Err(e) = statement.close() {
                warn!(error = %e, "closing statement of a closed cursor failed");
            }
            return;
        }
        self.statement = Some(statement);
    }

    #[must_use]
    pub fn state(&self) -> CursorState {
        self.state
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.state, CursorState::Created | CursorState::Open)
    }

    #[must_use]
    pub fn is_consumed(&self) -> bool {
        self.state == CursorState::Consumed
    }

    /// Number of mapped rows handed out so far.
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.yielded
    }

    /// Release the row source and the statement. Later calls do nothing.
    ///
    /// # Errors
    ///
    /// The first failure while closing; both resources are still released.
    pub fn close(&mut self) -> Result<()> {
        if self.state != CursorState::Consumed {
            self.state = CursorState::Closed;
        }
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let rows_closed = match self.rows.take() {
            Some(mut rows) => rows.close(),
            None => Ok(()),
        };
        let statement_closed = match self.statement.take() {
            Some(mut statement) => {
                debug!(sql = statement.sql(), "releasing cursor statement");
                statement.close()
            }
            None => Ok(()),
        };
        rows_closed.and(statement_closed)
    }

    fn finish(&mut self) {
        self.state = CursorState::Consumed;
        if let Err(e) = self.release() {
            warn!(error = %e, "closing consumed cursor failed");
        }
    }

    fn fetch(&mut self) -> Result<Option<Value>> {
        let Some(rows) = self.rows.as_mut() else {
            return Ok(None);
        };
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.bounds.offset {
                if rows.next_row()?.is_none() {
                    return Ok(None);
                }
            }
        }
        if self.yielded >= self.bounds.limit {
            return Ok(None);
        }
        match rows.next_row()? {
            Some(row) => self.mapper.map_row(&row).map(Some),
            None => Ok(None),
        }
    }
}

impl Iterator for Cursor {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.is_open() {
            return None;
        }
        self.state = CursorState::Open;
        match self.fetch() {
            Ok(Some(value)) => {
                self.yielded += 1;
                Some(Ok(value))
            }
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                self.state = CursorState::Closed;
                if let Err(close_err) = self.release() {
                    warn!(error = %close_err, "closing failed cursor failed");
                }
                Some(Err(e))
            }
        }
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "closing cursor on drop failed");
        }
    }
}
