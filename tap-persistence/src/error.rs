use sea_orm::{DbErr, SqlErr};
use tap_types::ProfileId;

use crate::Operation;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Profile {0} not found")]
    NotFound(ProfileId),
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),
    #[error("{operation:?} on profile {owner} denied for {actor}")]
    PermissionDenied {
        operation: Operation,
        actor: ProfileId,
        owner: ProfileId,
    },
    #[error("Score {0} does not fit the score column")]
    ScoreOutOfRange(i64),
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Local store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Local store could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, StoreError::PermissionDenied { .. })
    }

    /// Backend and I/O failures may succeed on another attempt; rejected
    /// writes never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Database(_) | StoreError::Io(_))
    }

    /// Maps a unique-constraint failure on insert to `DuplicateEmail`, so a
    /// sign-up racing another one with the same email is still a conflict.
    pub(crate) fn from_insert(err: DbErr, email: &str) -> StoreError {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                StoreError::DuplicateEmail(email.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}
