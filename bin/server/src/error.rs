//! Errors raised while wiring the server together.

use std::fmt;

/// Failure to assemble the application from its configuration.
#[derive(Debug)]
pub enum StartupError {
    /// The provider configuration holds an unusable URL.
    Provider { details: String },
    /// The outbound HTTP client could not be built.
    Transport { details: String },
    /// A site URL is malformed.
    Site { field: &'static str, details: String },
    /// The session lifetime is not a positive, representable duration.
    Session { duration_minutes: i64 },
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider { details } => write!(f, "invalid provider configuration: {details}"),
            Self::Transport { details } => write!(f, "cannot build http client: {details}"),
            Self::Site { field, details } => write!(f, "invalid site {field}: {details}"),
            Self::Session { duration_minutes } => {
                write!(f, "invalid session duration_minutes: {duration_minutes}")
            }
        }
    }
}

impl std::error::Error for StartupError {}
