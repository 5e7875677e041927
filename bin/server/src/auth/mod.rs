//! Stan Connect sign-in for the HTTP server.
//!
//! This module provides:
//! - the callback state machine ([`CallbackRouter`])
//! - login, logout and session-status routes
//! - the token-validity middleware that silently refreshes provider tokens
//! - an [`OptionalAuth`] extractor for handlers that care who is signed in
//!
//! Storage is pluggable through [`Collaborators`]; the binary wires the
//! in-memory stores.

pub mod callback;
pub mod cookies;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use chrono::Duration;
use rootcause::Report;
use stan_easy_connect_core::{ActivityLog, Clock, SystemClock, TracingActivityLog};
use stan_easy_connect_oidc::{
    HttpTransport, InMemoryStateCache, OidcClient, ReqwestTransport, StateCache, StateRegistry,
};
use stan_easy_connect_platform_access::{
    Commerce, DisabledCommerce, IdentityResolver, InMemoryCommerce, InMemorySessionStore,
    InMemoryUserStore, LoginHook, SessionManager, SessionStore, UserStore,
};
use url::Url;

use crate::config::{CommerceConfig, ServerConfig, SessionConfig, SiteConfig};
use crate::error::StartupError;

pub use callback::{CallbackRouter, CallbackState, RequestContext, TerminalAction};
pub use middleware::{CurrentSession, OptionalAuth, verify_token_validity};
pub use routes::{CALLBACK_PATH, callback, login, logout, session_status};

/// Stores and services the sign-in flow depends on.
pub struct Collaborators {
    pub transport: Arc<dyn HttpTransport>,
    pub state_cache: Arc<dyn StateCache>,
    pub users: Arc<dyn UserStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub commerce: Arc<dyn Commerce>,
    pub activity: Arc<dyn ActivityLog>,
    pub clock: Arc<dyn Clock>,
    pub hooks: Vec<Arc<dyn LoginHook>>,
}

impl Collaborators {
    /// In-memory stores around the given transport and clock.
    ///
    /// The shop is an [`InMemoryCommerce`] offering the configured coupon
    /// when commerce is enabled.
    #[must_use]
    pub fn in_memory(
        config: &ServerConfig,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let commerce: Arc<dyn Commerce> = if config.commerce.enabled {
            Arc::new(
                InMemoryCommerce::new(config.commerce.checkout_url.clone())
                    .with_coupon(config.commerce.coupon_code.clone()),
            )
        } else {
            Arc::new(DisabledCommerce)
        };

        Self {
            transport,
            state_cache: Arc::new(InMemoryStateCache::with_clock(clock.clone())),
            users: Arc::new(InMemoryUserStore::new()),
            sessions: Arc::new(InMemorySessionStore::with_clock(clock.clone())),
            commerce,
            activity: Arc::new(TracingActivityLog),
            clock,
            hooks: Vec::new(),
        }
    }

    /// In-memory stores talking to the real provider over HTTPS.
    ///
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn production(config: &ServerConfig) -> Result<Self, Report<StartupError>> {
        let transport = ReqwestTransport::new().map_err(|report| StartupError::Transport {
            details: report.to_string(),
        })?;
        Ok(Self::in_memory(config, Arc::new(transport), Arc::new(SystemClock)))
    }
}

/// Shared application state.
pub struct AppState {
    pub oidc: OidcClient,
    pub resolver: IdentityResolver,
    pub sessions: SessionManager,
    pub commerce: Arc<dyn Commerce>,
    pub activity: Arc<dyn ActivityLog>,
    pub site: SiteConfig,
    /// Parsed `site.home_url`, for same-origin checks.
    pub home: Url,
    pub session_config: SessionConfig,
    pub commerce_config: CommerceConfig,
}

impl AppState {
    /// Creates the application state.
    ///
    /// # Errors
    ///
    /// Fails when the home URL or a provider endpoint does not parse, or
    /// when the session lifetime is out of range.
    pub fn new(config: &ServerConfig, deps: Collaborators) -> Result<Self, Report<StartupError>> {
        let duration_minutes = config.session.duration_minutes;
        let lifetime = Duration::try_minutes(duration_minutes)
            .filter(|lifetime| *lifetime > Duration::zero())
            .ok_or(StartupError::Session { duration_minutes })?;
        let home = Url::parse(&config.site.home_url).map_err(|e| StartupError::Site {
            field: "home_url",
            details: e.to_string(),
        })?;
        let oidc = OidcClient::new(
            config.oidc.clone(),
            deps.transport,
            StateRegistry::new(deps.state_cache),
        )
        .map_err(|e| StartupError::Provider {
            details: e.to_string(),
        })?;

        let resolver = IdentityResolver::new(
            deps.users.clone(),
            deps.commerce.clone(),
            deps.activity.clone(),
        );
        let sessions = deps.hooks.into_iter().fold(
            SessionManager::new(
                deps.users,
                deps.sessions,
                deps.commerce.clone(),
                oidc.clone(),
                deps.activity.clone(),
                deps.clock,
            )
            .with_lifetime(lifetime)
            .with_coupon_code(config.commerce.coupon_code.clone()),
            SessionManager::with_hook,
        );

        Ok(Self {
            oidc,
            resolver,
            sessions,
            commerce: deps.commerce,
            activity: deps.activity,
            site: config.site.clone(),
            home,
            session_config: config.session.clone(),
            commerce_config: config.commerce.clone(),
        })
    }
}
