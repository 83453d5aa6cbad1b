//! Error types for rfa-store

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::table::Table;

/// Coarse classification of a [`DbError`], stable across backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidCredentials,
    BackendFailure,
    Conflict,
    InvalidRequest,
    Unknown,
}

/// Errors carried in the `error` half of a [`crate::Response`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    /// No record with the requested id in the table
    #[error("Record not found in {table}: {id}")]
    NotFound { table: Table, id: String },

    /// Stored blob absent at the given key
    #[error("Object not found: {key}")]
    ObjectNotFound { key: String },

    /// Sign-in did not match any known account
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// A record with this id already exists
    #[error("Duplicate id in {table}: {id}")]
    Conflict { table: Table, id: String },

    /// Payload, modifier or locator could not be interpreted
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The remote collaborator reported an error
    #[error("Backend failure: {0}")]
    BackendFailure(String),

    /// Unexpected failure caught at the public boundary
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::NotFound { .. } | DbError::ObjectNotFound { .. } => ErrorKind::NotFound,
            DbError::InvalidCredentials => ErrorKind::InvalidCredentials,
            DbError::Conflict { .. } => ErrorKind::Conflict,
            DbError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            DbError::BackendFailure(_) => ErrorKind::BackendFailure,
            DbError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        DbError::InvalidRequest(msg.into())
    }
}

impl From<surrealdb::Error> for DbError {
    fn from(err: surrealdb::Error) -> Self {
        DbError::BackendFailure(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::InvalidRequest(err.to_string())
    }
}

/// Serialized as `{ "kind": ..., "message": ... }`, the shape callers surface to users.
impl Serialize for DbError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("DbError", 2)?;
        s.serialize_field("kind", &self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_cover_lookup_failures() {
        let err = DbError::NotFound {
            table: Table::Posts,
            id: "p1".into(),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(
            DbError::ObjectNotFound { key: "media/a".into() }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(err.to_string(), "Record not found in posts: p1");
    }

    #[test]
    fn serializes_kind_and_message() {
        let json = serde_json::to_value(DbError::InvalidCredentials).unwrap();
        assert_eq!(json["kind"], "invalid_credentials");
        assert_eq!(json["message"], "Invalid login credentials");
    }
}
