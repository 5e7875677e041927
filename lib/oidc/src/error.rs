//! Error types for the OIDC client.
//!
//! - `ConnectError`: a failed step of the login flow, carrying the wire code
//!   that ends up in the `login-error` query parameter and a human-readable
//!   message
//! - `TransportError`: the outbound HTTP call itself failed (reported through
//!   rootcause, then mapped to a `ConnectError` by the caller)
//! - `ConfigError`: the provider configuration is unusable

use std::fmt;

/// Wire codes of every failure the login flow can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// The provider redirected back with an `error` parameter.
    UnknownError,
    MissingCode,
    MissingState,
    InvalidState,
    /// The authorization-code exchange could not reach the provider.
    RequestAuthenticationToken,
    /// The refresh-token exchange could not reach the provider.
    RefreshToken,
    MissingTokenBody,
    /// Error code passed through verbatim from the token endpoint.
    Provider(String),
    InvalidTokenResponse,
    MissingIdToken,
    MissingIdentity,
    BadIdTokenClaim,
    MissingSub,
    BadClaim,
    InvalidUserClaim,
    /// The user-info endpoint answered with an `error` field.
    InvalidUserClaimWith(String),
    IncorrectUserClaim,
    FailRetrieveUser,
    FailedUserCreation,
    InvalidUser,
    FailedSessionCreation,
    FailedSessionUpdate,
}

impl ErrorCode {
    /// Message used when the step has nothing more specific to say.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::UnknownError => "An unknown error occurred.",
            Self::MissingCode => "Missing code.",
            Self::MissingState => "Missing state.",
            Self::InvalidState => "The provided state is invalid.",
            Self::RequestAuthenticationToken => {
                "Server error after requesting for authentication token."
            }
            Self::RefreshToken => "Server error after requesting for authentication refresh token.",
            Self::MissingTokenBody => "The token body is missing.",
            Self::Provider(_) | Self::InvalidUserClaimWith(_) => {
                "The identity provider returned an error."
            }
            Self::InvalidTokenResponse => {
                "The token is invalid, id_token and token_type might be missing, or token_type is not Bearer."
            }
            Self::MissingIdToken => "id_token is missing.",
            Self::MissingIdentity => "Missing identity.",
            Self::BadIdTokenClaim => "Token claim ID is invalid.",
            Self::MissingSub => "Subject Identity is missing from token claim.",
            Self::BadClaim => "Claim invalid or body is missing from claim.",
            Self::InvalidUserClaim => "The user claim must be a JSON object.",
            Self::IncorrectUserClaim => "This user claim is not expected.",
            Self::FailRetrieveUser => "Email is missing, please set one in Stan",
            Self::FailedUserCreation => "Failed user creation.",
            Self::InvalidUser => "The user is invalid.",
            Self::FailedSessionCreation => "The login session could not be created.",
            Self::FailedSessionUpdate => "The login session could not be updated.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownError => write!(f, "unknown-error"),
            Self::MissingCode => write!(f, "missing-code"),
            Self::MissingState => write!(f, "missing-state"),
            Self::InvalidState => write!(f, "invalid-state"),
            Self::RequestAuthenticationToken => write!(f, "request_authentication_token"),
            Self::RefreshToken => write!(f, "refresh_token"),
            Self::MissingTokenBody => write!(f, "missing-token-body"),
            Self::Provider(code) => write!(f, "{code}"),
            Self::InvalidTokenResponse => write!(f, "invalid-token-response"),
            Self::MissingIdToken => write!(f, "missing-id-token"),
            Self::MissingIdentity => write!(f, "missing-identity"),
            Self::BadIdTokenClaim => write!(f, "bad-id-token-claim"),
            Self::MissingSub => write!(f, "missing-sub"),
            Self::BadClaim => write!(f, "bad-claim"),
            Self::InvalidUserClaim => write!(f, "invalid-user-claim"),
            Self::InvalidUserClaimWith(code) => write!(f, "invalid-user-claim-{code}"),
            Self::IncorrectUserClaim => write!(f, "incorrect-user-claim"),
            Self::FailRetrieveUser => write!(f, "fail-retrieve-user"),
            Self::FailedUserCreation => write!(f, "failed-user-creation"),
            Self::InvalidUser => write!(f, "invalid-user"),
            Self::FailedSessionCreation => write!(f, "failed-session-creation"),
            Self::FailedSessionUpdate => write!(f, "failed-session-update"),
        }
    }
}

/// A failed step of the login flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectError {
    code: ErrorCode,
    message: String,
}

impl ConnectError {
    /// Creates an error with an explicit message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns the wire code.
    #[must_use]
    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    /// Returns the human-readable message shown on the destination page.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ErrorCode> for ConnectError {
    fn from(code: ErrorCode) -> Self {
        let message = code.default_message();
        Self::new(code, message)
    }
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ConnectError {}

/// Errors from the outbound HTTP transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    ClientSetup { details: String },
    /// The request never produced a response.
    RequestFailed { url: String, details: String },
    /// The response body could not be read.
    BodyUnreadable { url: String, details: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientSetup { details } => write!(f, "failed to build HTTP client: {details}"),
            Self::RequestFailed { url, details } => {
                write!(f, "request to '{url}' failed: {details}")
            }
            Self::BodyUnreadable { url, details } => {
                write!(f, "response body from '{url}' unreadable: {details}")
            }
        }
    }
}

impl std::error::Error for TransportError {}

/// The provider configuration cannot be turned into a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidUrl { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { field, reason } => write!(f, "invalid {field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_render_as_wire_strings() {
        assert_eq!(ErrorCode::UnknownError.to_string(), "unknown-error");
        assert_eq!(
            ErrorCode::RequestAuthenticationToken.to_string(),
            "request_authentication_token"
        );
        assert_eq!(
            ErrorCode::Provider("invalid_grant".to_string()).to_string(),
            "invalid_grant"
        );
        assert_eq!(
            ErrorCode::InvalidUserClaimWith("expired_token".to_string()).to_string(),
            "invalid-user-claim-expired_token"
        );
    }

    #[test]
    fn error_from_code_uses_default_message() {
        let err = ConnectError::from(ErrorCode::UnknownError);
        assert_eq!(err.message(), "An unknown error occurred.");
        assert_eq!(err.to_string(), "unknown-error: An unknown error occurred.");
    }

    #[test]
    fn explicit_message_wins() {
        let err = ConnectError::new(
            ErrorCode::Provider("invalid_grant".to_string()),
            "Code expired",
        );
        assert_eq!(err.code().to_string(), "invalid_grant");
        assert_eq!(err.message(), "Code expired");
    }

    #[test]
    fn transport_error_display_names_url() {
        let err = TransportError::RequestFailed {
            url: "https://api.stan-app.fr/v1/oauth/token".to_string(),
            details: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("/v1/oauth/token"));
        assert!(err.to_string().contains("connection refused"));
    }
}
