use super::session::SqlSession;
use crate::error::Result;
use crate::mapping::RowBounds;
use crate::results::Cursor;
use crate::types::Value;

/// A session bound to one mapper namespace. Statement ids are given without the
/// namespace and qualified on every call.
#[derive(Debug)]
pub struct Mapper<'s> {
    session: &'s mut SqlSession,
    namespace: String,
}

impl<'s> Mapper<'s> {
    pub(crate) fn new(session: &'s mut SqlSession, namespace: String) -> Self {
        Self { session, namespace }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The session this mapper runs on, for commit and rollback.
    pub fn session(&mut self) -> &mut SqlSession {
        self.session
    }

    fn qualify(&self, id: &str) -> String {
        format!("{}.{id}", self.namespace)
    }

    /// # Errors
    ///
    /// As [`SqlSession::select_one`].
    pub fn select_one(&mut self, id: &str, parameter: &Value) -> Result<Option<Value>> {
        let id = self.qualify(id);
        self.session.select_one(&id, parameter)
    }

    /// # Errors
    ///
    /// As [`SqlSession::select_list`].
    pub fn select_list(&mut self, id: &str, parameter: &Value) -> Result<Vec<Value>> {
        let id = self.qualify(id);
        self.session.select_list(&id, parameter)
    }

    /// # Errors
    ///
    /// As [`SqlSession::select_list_with_bounds`].
    pub fn select_list_with_bounds(
        &mut self,
        id: &str,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Vec<Value>> {
        let id = self.qualify(id);
        self.session.select_list_with_bounds(&id, parameter, bounds)
    }

    /// # Errors
    ///
    /// As [`SqlSession::select_cursor`].
    pub fn select_cursor(&mut self, id: &str, parameter: &Value) -> Result<Cursor> {
        let id = self.qualify(id);
        self.session.select_cursor(&id, parameter)
    }

    /// # Errors
    ///
    /// As [`SqlSession::insert`].
    pub fn insert(&mut self, id: &str, parameter: &mut Value) -> Result<usize> {
        let id = self.qualify(id);
        self.session.insert(&id, parameter)
    }

    /// # Errors
    ///
    /// As [`SqlSession::update`].
    pub fn update(&mut self, id: &str, parameter: &mut Value) -> Result<usize> {
        let id = self.qualify(id);
        self.session.update(&id, parameter)
    }

    /// # Errors
    ///
    /// As [`SqlSession::delete`].
    pub fn delete(&mut self, id: &str, parameter: &mut Value) -> Result<usize> {
        let id = self.qualify(id);
        self.session.delete(&id, parameter)
    }
}
