//! Local accounts and login sessions for Stan Connect sign-in.
//!
//! This crate provides:
//! - the user, session and commerce collaborator traits, with in-memory
//!   implementations
//! - `IdentityResolver`: maps a validated claim to a local account
//! - `SessionManager`: opens sessions, keeps the provider tokens fresh, and
//!   closes sessions
//!
//! # Example
//!
//! ```
//! use stan_easy_connect_platform_access::RefreshMetadata;
//! use stan_easy_connect_oidc::TokenSet;
//!
//! let tokens = TokenSet {
//!     refresh_token: Some("rt".to_string()),
//!     expires_in: Some(300),
//!     refresh_expires_in: Some(3600),
//!     ..TokenSet::default()
//! };
//! let refresh = RefreshMetadata::from_tokens(&tokens, 1_000);
//!
//! assert_eq!(refresh.next_access_token_refresh_time, 1_300);
//! assert_eq!(refresh.refresh_expires, Some(4_595));
//! ```

pub mod commerce;
pub mod error;
pub mod identity;
pub mod manager;
pub mod session;
pub mod user;

pub use commerce::{CartId, Commerce, DisabledCommerce, InMemoryCommerce};
pub use error::{StoreError, StoreResult};
pub use identity::{ADDRESS_COUNTRY, IdentityResolver};
pub use manager::{
    DEFAULT_COUPON_CODE, DEFAULT_SESSION_LIFETIME_MINUTES, LoggedIn, LoginGrant, LoginHook,
    RefreshOutcome, SessionManager,
};
pub use session::{
    InMemorySessionStore, REFRESH_METADATA_KEY, RefreshMetadata, SessionRecord, SessionStore,
};
pub use user::{
    InMemoryUserStore, LAST_ID_TOKEN_CLAIM_KEY, LAST_TOKEN_RESPONSE_KEY, LAST_USER_CLAIM_KEY,
    LocalUser, NewUser, Role, SUBJECT_IDENTITY_KEY, UserStore,
};
