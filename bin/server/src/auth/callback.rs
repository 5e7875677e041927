//! The OAuth callback as a strictly sequential state machine.
//!
//! Every run ends in a [`TerminalAction`]: a 302 redirect plus the cookies
//! to set. A step that fails diverts straight to the error redirect, so
//! nothing executes after a terminal action has been produced.

use std::collections::HashMap;

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use stan_easy_connect_oidc::{
    ConnectError, ErrorCode, decode_id_token_claim, validate_id_token_claim, validate_token_set,
    validate_user_claim,
};
use stan_easy_connect_platform_access::{CartId, LoggedIn, LoginGrant};
use tracing::{debug, info, warn};
use url::Url;

use super::AppState;
use super::cookies::{self, AUTH_COOKIE, REDIRECT_COOKIE};

/// Progress through the callback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackState {
    Start,
    RequestValidated,
    CodeExchanged,
    TokenValidated,
    IdClaimValidated,
    UserClaimFetched,
    UserClaimValidated,
    UserResolved,
    UserValidated,
    LoggedIn,
    Redirected,
    ErrorRedirect,
}

impl CallbackState {
    fn advance(&mut self, next: Self) {
        debug!(from = ?*self, to = ?next, "callback step");
        *self = next;
    }
}

/// What the router sees of the incoming request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub query: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
}

impl RequestContext {
    #[must_use]
    pub fn new(query: HashMap<String, String>, jar: &CookieJar) -> Self {
        let cookies = jar
            .iter()
            .map(|c| (c.name().to_string(), c.value().to_string()))
            .collect();
        Self { query, cookies }
    }

    /// A cookie value, treating an empty value as absent.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

/// The one response a callback run produces.
#[derive(Debug, Clone)]
pub struct TerminalAction {
    location: String,
    cookies: Vec<Cookie<'static>>,
}

impl TerminalAction {
    #[must_use]
    pub fn redirect(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            cookies: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }

    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn cookies(&self) -> &[Cookie<'static>] {
        &self.cookies
    }
}

impl IntoResponse for TerminalAction {
    fn into_response(self) -> Response {
        let jar = self
            .cookies
            .into_iter()
            .fold(CookieJar::new(), |jar, cookie| jar.add(cookie));
        (StatusCode::FOUND, jar, [(header::LOCATION, self.location)]).into_response()
    }
}

/// Appends `login-error` and `message` to a destination URL.
#[must_use]
pub fn with_login_error(destination: &str, err: &ConnectError) -> String {
    let separator = if destination.contains('?') { '&' } else { '?' };
    format!(
        "{destination}{separator}login-error={}&message={}",
        urlencoding::encode(&err.code().to_string()),
        urlencoding::encode(err.message()),
    )
}

/// Drives one callback request from query parameters to redirect.
pub struct CallbackRouter<'a> {
    state: &'a AppState,
}

impl<'a> CallbackRouter<'a> {
    #[must_use]
    pub fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Runs the whole chain. Never fails: errors become the error redirect.
    pub async fn handle(&self, ctx: &RequestContext) -> TerminalAction {
        let cart = self.cart(ctx);
        let mut progress = CallbackState::Start;

        match self.run(ctx, cart.as_ref(), &mut progress).await {
            Ok(action) => action,
            Err(err) => {
                warn!(
                    failed_after = ?progress,
                    code = %err.code(),
                    message = err.message(),
                    "stan connect callback failed"
                );
                progress.advance(CallbackState::ErrorRedirect);
                self.error_redirect(&err, cart.as_ref()).await
            }
        }
    }

    async fn run(
        &self,
        ctx: &RequestContext,
        cart: Option<&CartId>,
        progress: &mut CallbackState,
    ) -> Result<TerminalAction, ConnectError> {
        let oidc = &self.state.oidc;

        let request = oidc.validate_request(&ctx.query).await?;
        if self.state.session_config.single_use_state {
            oidc.states().invalidate(&request.state).await;
        }
        progress.advance(CallbackState::RequestValidated);

        let tokens = oidc.exchange_code(&request.code).await?;
        progress.advance(CallbackState::CodeExchanged);

        validate_token_set(&tokens)?;
        progress.advance(CallbackState::TokenValidated);

        let id_claim = decode_id_token_claim(&tokens)?;
        validate_id_token_claim(&id_claim)?;
        progress.advance(CallbackState::IdClaimValidated);

        let access_token = tokens
            .access_token
            .as_deref()
            .ok_or_else(|| ConnectError::from(ErrorCode::BadClaim))?;
        let user_claim = oidc.fetch_user_claim(access_token).await?;
        progress.advance(CallbackState::UserClaimFetched);

        validate_user_claim(&user_claim, &id_claim)?;
        progress.advance(CallbackState::UserClaimValidated);

        let subject = id_claim
            .subject()
            .ok_or_else(|| ConnectError::from(ErrorCode::MissingSub))?;
        let user = self.state.resolver.resolve(&subject, &user_claim).await?;
        progress.advance(CallbackState::UserResolved);

        self.state.resolver.validate_user(&user).await?;
        progress.advance(CallbackState::UserValidated);

        let grant = LoginGrant {
            tokens: &tokens,
            id_claim: &id_claim,
            user_claim: &user_claim,
            subject: &subject,
        };
        let logged_in = self.state.sessions.login(&user, grant, cart).await?;
        progress.advance(CallbackState::LoggedIn);

        info!(user_id = %user.id(), "stan connect login complete");
        let action = self.success_redirect(ctx, cart, logged_in).await;
        progress.advance(CallbackState::Redirected);
        Ok(action)
    }

    async fn success_redirect(
        &self,
        ctx: &RequestContext,
        cart: Option<&CartId>,
        logged_in: LoggedIn,
    ) -> TerminalAction {
        let site = &self.state.site;
        let auth = cookies::auth_cookie(
            site,
            logged_in.token,
            self.state.session_config.duration_minutes,
        );

        if let Some(target) = ctx.cookie(REDIRECT_COOKIE) {
            let consumed = cookies::removal(site, REDIRECT_COOKIE);
            let location = if self.is_same_origin(target) {
                target.to_string()
            } else {
                warn!(target, "ignoring off-site redirect cookie");
                self.fallback_destination(cart).await
            };
            return TerminalAction::redirect(location)
                .with_cookie(auth)
                .with_cookie(consumed);
        }

        TerminalAction::redirect(self.fallback_destination(cart).await).with_cookie(auth)
    }

    async fn fallback_destination(&self, cart: Option<&CartId>) -> String {
        let commerce = &self.state.commerce;
        if commerce.is_active() && !commerce.cart_is_empty(cart).await {
            commerce.checkout_url().to_string()
        } else {
            self.state.site.home_url.clone()
        }
    }

    /// Redirects to checkout (non-empty cart) or the login page with the
    /// error attached.
    pub async fn error_redirect(&self, err: &ConnectError, cart: Option<&CartId>) -> TerminalAction {
        let commerce = &self.state.commerce;
        let destination = if commerce.is_active() && !commerce.cart_is_empty(cart).await {
            commerce.checkout_url()
        } else {
            self.state.site.login_url.as_str()
        };

        self.state.activity.record(
            "error-redirect",
            &format!("Redirected after {}: {}", err.code(), err.message()),
        );
        TerminalAction::redirect(with_login_error(destination, err))
    }

    /// Same as [`Self::error_redirect`], also dropping the auth cookie.
    pub async fn logout_redirect(&self, err: &ConnectError, cart: Option<&CartId>) -> TerminalAction {
        self.error_redirect(err, cart)
            .await
            .with_cookie(cookies::removal(&self.state.site, AUTH_COOKIE))
    }

    /// The visitor's cart, from the configured cart cookie.
    #[must_use]
    pub fn cart(&self, ctx: &RequestContext) -> Option<CartId> {
        ctx.cookie(&self.state.commerce_config.cart_cookie)
            .map(CartId::new)
    }

    fn is_same_origin(&self, target: &str) -> bool {
        if target.contains('\\') {
            return false;
        }
        if target.starts_with('/') {
            return !target.starts_with("//");
        }
        Url::parse(target).is_ok_and(|url| url.origin() == self.state.home.origin())
    }
}
