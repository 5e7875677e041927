//! Stan Connect OAuth2/OIDC client.
//!
//! This crate covers the provider-facing half of the login flow:
//! - one-time CSRF `state` tokens (`StateRegistry` over a `StateCache`)
//! - building the authorization URL
//! - validating the callback request
//! - exchanging authorization codes and refresh tokens for a `TokenSet`
//! - decoding and validating the ID-token claim and the user-info claim
//!
//! Every validation step is a pure function returning `Result<_, ConnectError>`;
//! only the state registry and the three provider calls have side effects.
//!
//! # Example
//!
//! ```
//! use stan_easy_connect_oidc::{IdTokenClaim, validate_id_token_claim};
//! use serde_json::json;
//!
//! let claim = IdTokenClaim::from_value(json!({ "sub": "stan|42" }));
//! assert!(validate_id_token_claim(&claim).is_ok());
//! assert_eq!(claim.subject().as_deref(), Some("stan|42"));
//! ```

pub mod claim;
pub mod client;
pub mod config;
pub mod error;
pub mod state;
pub mod token;
pub mod transport;

pub use claim::{Address, UserClaim, UserProfile, validate_user_claim};
pub use client::{AuthorizationRequest, OidcClient};
pub use config::{ProviderConfig, ProviderConfigBuilder, SCOPE};
pub use error::{ConfigError, ConnectError, ErrorCode, TransportError};
pub use state::{InMemoryStateCache, STATE_TTL_MINUTES, StateCache, StateRegistry, StateToken};
pub use token::{
    IdTokenClaim, TokenSet, decode_id_token_claim, parse_token_response, validate_id_token_claim,
    validate_token_set,
};
pub use transport::{
    HttpTransport, ProviderRequest, ProviderResponse, ReqwestTransport, ScriptedTransport,
};
