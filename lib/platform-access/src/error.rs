//! Error types for the platform-access crate.
//!
//! Store and commerce collaborators fail with `StoreError` wrapped in a
//! rootcause `Report`. The resolver and session manager log the report and
//! surface a `ConnectError` to the callback router.

use stan_easy_connect_core::{SessionToken, UserId};
use std::fmt;

/// Result of a user, session or commerce collaborator call.
pub type StoreResult<T> = stan_easy_connect_core::Result<T, StoreError>;

/// Errors from the user, session and commerce collaborators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or is poisoned.
    Unavailable { details: String },
    /// No user with this id exists.
    UserNotFound { user_id: UserId },
    /// No live session with this token exists.
    SessionNotFound { token: SessionToken },
    /// A unique attribute is already taken by another account.
    Conflict { field: &'static str, value: String },
    /// The commerce collaborator rejected an operation.
    Commerce { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => write!(f, "store unavailable: {details}"),
            Self::UserNotFound { user_id } => write!(f, "user not found: {user_id}"),
            Self::SessionNotFound { token } => write!(f, "session not found: {token}"),
            Self::Conflict { field, value } => write!(f, "{field} '{value}' is already taken"),
            Self::Commerce { details } => write!(f, "commerce operation failed: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_names_field_and_value() {
        let err = StoreError::Conflict {
            field: "email",
            value: "zoe@example.com".to_string(),
        };
        assert_eq!(err.to_string(), "email 'zoe@example.com' is already taken");
    }

    #[test]
    fn session_not_found_shows_token() {
        let token = SessionToken::new();
        let err = StoreError::SessionNotFound { token };
        assert!(err.to_string().contains("sess_"));
    }
}
