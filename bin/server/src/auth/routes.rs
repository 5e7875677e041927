//! Sign-in routes: callback, login, logout and session status.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{Value, json};

use super::AppState;
use super::callback::{CallbackRouter, RequestContext, TerminalAction};
use super::cookies::{self, AUTH_COOKIE};
use super::middleware::OptionalAuth;

/// Path the provider redirects back to.
pub const CALLBACK_PATH: &str = "/stan-easy-connect-authorize";

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    redirect_to: Option<String>,
}

/// Handles the provider's redirect back to the site.
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
    jar: CookieJar,
) -> TerminalAction {
    let ctx = RequestContext::new(query, &jar);
    CallbackRouter::new(&state).handle(&ctx).await
}

/// Starts a sign-in, remembering where to go afterwards.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> TerminalAction {
    let authorize = state.oidc.build_authorization_url().await;
    let action = TerminalAction::redirect(authorize.to_string());

    match query.redirect_to.filter(|target| !target.is_empty()) {
        Some(target) => action.with_cookie(cookies::redirect_cookie(&state.site, &target)),
        None => action,
    }
}

/// Closes the current session and goes home.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    OptionalAuth(session): OptionalAuth,
) -> TerminalAction {
    if let Some(session) = session {
        state.sessions.logout(session.token).await;
    }
    TerminalAction::redirect(state.site.home_url.clone())
        .with_cookie(cookies::removal(&state.site, AUTH_COOKIE))
}

/// Who is signed in, and whether the Stan button should be offered.
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    OptionalAuth(session): OptionalAuth,
) -> Json<Value> {
    let show_button = session.is_none() && state.oidc.config().stan_connect_in_login();
    Json(json!({
        "authenticated": session.is_some(),
        "user_id": session.map(|s| s.user_id.to_string()),
        "show_login_button": show_button,
    }))
}
