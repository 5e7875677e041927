//! Login sessions backed by Stan tokens.
//!
//! [`SessionManager::login`] opens a session once the callback chain has
//! resolved a local user. [`SessionManager::verify_and_refresh`] runs on
//! later requests and rotates the provider tokens when they are due.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use stan_easy_connect_core::{ActivityLog, Clock, SessionToken, UserId};
use stan_easy_connect_oidc::{ConnectError, ErrorCode, IdTokenClaim, OidcClient, TokenSet, UserClaim};
use tracing::{debug, error, info, warn};

use crate::commerce::{CartId, Commerce};
use crate::session::{RefreshMetadata, SessionStore};
use crate::user::{
    LAST_ID_TOKEN_CLAIM_KEY, LAST_TOKEN_RESPONSE_KEY, LAST_USER_CLAIM_KEY, LocalUser, UserStore,
};

/// Default session lifetime: two days.
pub const DEFAULT_SESSION_LIFETIME_MINUTES: i64 = 2 * 24 * 60;

/// Coupon applied to the cart after login when a shop is active.
pub const DEFAULT_COUPON_CODE: &str = "STANNER";

/// Side effect run after every successful login.
#[async_trait]
pub trait LoginHook: Send + Sync {
    async fn on_login(&self, user: &LocalUser);
}

/// Everything the callback chain learned about the subject.
#[derive(Debug, Clone, Copy)]
pub struct LoginGrant<'a> {
    pub tokens: &'a TokenSet,
    pub id_claim: &'a IdTokenClaim,
    pub user_claim: &'a UserClaim,
    pub subject: &'a str,
}

/// A freshly opened session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedIn {
    pub token: SessionToken,
    pub expires_at: DateTime<Utc>,
}

/// What [`SessionManager::verify_and_refresh`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No user or no live session.
    NotAuthenticated,
    /// The session was not opened through Stan.
    NoRefreshMetadata,
    /// The access token is still fresh.
    NotDue,
    /// New tokens were stored.
    Refreshed,
    /// No usable refresh token; the session was closed.
    LoggedOut,
    /// The provider refused; the session was closed.
    Failed(ConnectError),
}

/// Opens, refreshes and closes login sessions.
#[derive(Clone)]
pub struct SessionManager {
    users: Arc<dyn UserStore>,
    sessions: Arc<dyn SessionStore>,
    commerce: Arc<dyn Commerce>,
    oidc: OidcClient,
    activity: Arc<dyn ActivityLog>,
    clock: Arc<dyn Clock>,
    hooks: Vec<Arc<dyn LoginHook>>,
    lifetime: Duration,
    coupon_code: String,
}

impl SessionManager {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        sessions: Arc<dyn SessionStore>,
        commerce: Arc<dyn Commerce>,
        oidc: OidcClient,
        activity: Arc<dyn ActivityLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            sessions,
            commerce,
            oidc,
            activity,
            clock,
            hooks: Vec::new(),
            lifetime: Duration::minutes(DEFAULT_SESSION_LIFETIME_MINUTES),
            coupon_code: DEFAULT_COUPON_CODE.to_string(),
        }
    }

    #[must_use]
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    #[must_use]
    pub fn with_coupon_code(mut self, code: impl Into<String>) -> Self {
        self.coupon_code = code.into();
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn LoginHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Opens a session for `user`.
    ///
    /// The raw token response and both claims are kept on the user for
    /// audit; failing to write them is logged and ignored. The welcome
    /// coupon is best effort.
    ///
    /// # Errors
    ///
    /// `failed-session-creation` when the session store fails.
    pub async fn login(
        &self,
        user: &LocalUser,
        grant: LoginGrant<'_>,
        cart: Option<&CartId>,
    ) -> Result<LoggedIn, ConnectError> {
        let audit = vec![
            (
                LAST_TOKEN_RESPONSE_KEY.to_string(),
                serde_json::to_value(grant.tokens).unwrap_or(Value::Null),
            ),
            (
                LAST_ID_TOKEN_CLAIM_KEY.to_string(),
                grant.id_claim.as_value().clone(),
            ),
            (
                LAST_USER_CLAIM_KEY.to_string(),
                grant.user_claim.as_value().clone(),
            ),
        ];
        if let Err(report) = self.users.update_meta(user.id(), audit).await {
            warn!(error = %report, user_id = %user.id(), "could not store login audit data");
        }

        let expires_at = self.clock.now() + self.lifetime;
        let token = self
            .sessions
            .create(user.id(), expires_at)
            .await
            .map_err(|report| {
                error!(error = %report, user_id = %user.id(), "session creation failed");
                ConnectError::from(ErrorCode::FailedSessionCreation)
            })?;

        self.activity.record(
            "login-user",
            &format!("Logging in user: {} has ID: {}", user.login(), user.id()),
        );

        if let Err(err) = self.save_refresh_metadata(token, grant.tokens).await {
            if let Err(report) = self.sessions.destroy(token).await {
                warn!(error = %report, "could not discard half-opened session");
            }
            return Err(err);
        }

        info!(user_id = %user.id(), subject = grant.subject, "user logged in");

        for hook in &self.hooks {
            hook.on_login(user).await;
        }

        if self.commerce.is_active() {
            self.apply_welcome_coupon(cart).await;
        }

        Ok(LoggedIn { token, expires_at })
    }

    /// The user owning a live session.
    pub async fn current_user(&self, token: SessionToken) -> Option<UserId> {
        match self.sessions.get(token).await {
            Ok(record) => record.map(|r| r.user_id()),
            Err(report) => {
                warn!(error = %report, "session lookup failed");
                None
            }
        }
    }

    /// Refreshes the provider tokens of a session when they are due.
    ///
    /// Without a usable refresh token, or when the provider refuses, the
    /// session is closed.
    pub async fn verify_and_refresh(
        &self,
        user_id: Option<UserId>,
        token: Option<SessionToken>,
    ) -> RefreshOutcome {
        let (Some(user_id), Some(token)) = (user_id, token) else {
            return RefreshOutcome::NotAuthenticated;
        };

        let mut record = match self.sessions.get(token).await {
            Ok(Some(record)) if record.user_id() == user_id => record,
            Ok(_) => return RefreshOutcome::NotAuthenticated,
            Err(report) => {
                warn!(error = %report, "session lookup failed");
                return RefreshOutcome::NotAuthenticated;
            }
        };

        let Some(refresh) = record.refresh_metadata() else {
            return RefreshOutcome::NoRefreshMetadata;
        };

        let now = self.clock.timestamp();
        if !refresh.is_due(now) {
            return RefreshOutcome::NotDue;
        }

        let Some(refresh_token) = refresh.usable_refresh_token(now) else {
            debug!(user_id = %user_id, "refresh token missing or expired");
            self.logout(token).await;
            return RefreshOutcome::LoggedOut;
        };

        let tokens = match self.oidc.refresh(refresh_token).await {
            Ok(tokens) => tokens,
            Err(err) => {
                warn!(code = %err.code(), message = err.message(), "token refresh failed");
                self.logout(token).await;
                return RefreshOutcome::Failed(err);
            }
        };

        record.set_refresh_metadata(&RefreshMetadata::from_tokens(&tokens, now));
        if let Err(report) = self.sessions.update(&record).await {
            error!(error = %report, "could not store refreshed tokens");
            self.logout(token).await;
            return RefreshOutcome::Failed(ErrorCode::FailedSessionUpdate.into());
        }

        self.activity
            .record("refresh-token", &format!("Refreshed tokens of user {user_id}"));
        RefreshOutcome::Refreshed
    }

    /// Closes the session.
    pub async fn logout(&self, token: SessionToken) {
        if let Err(report) = self.sessions.destroy(token).await {
            warn!(error = %report, "session destroy failed");
        }
        self.activity
            .record("logout-user", &format!("Closed session {token}"));
    }

    async fn save_refresh_metadata(
        &self,
        token: SessionToken,
        tokens: &TokenSet,
    ) -> Result<(), ConnectError> {
        let lookup = self.sessions.get(token).await.map_err(|report| {
            error!(error = %report, "session reload failed");
            ConnectError::from(ErrorCode::FailedSessionCreation)
        })?;
        let mut record = lookup.ok_or_else(|| ConnectError::from(ErrorCode::FailedSessionCreation))?;

        record.set_refresh_metadata(&RefreshMetadata::from_tokens(tokens, self.clock.timestamp()));
        self.sessions.update(&record).await.map_err(|report| {
            error!(error = %report, "refresh metadata write failed");
            ConnectError::from(ErrorCode::FailedSessionCreation)
        })
    }

    async fn apply_welcome_coupon(&self, cart: Option<&CartId>) {
        let code = self.coupon_code.as_str();
        if !self.commerce.coupon_is_valid(code).await {
            self.activity
                .record("coupon-invalid", &format!("Coupon {code} is not valid"));
            return;
        }
        if let Err(report) = self.commerce.apply_coupon(cart, code).await {
            warn!(error = %report, coupon = code, "could not apply welcome coupon");
        }
    }
}
