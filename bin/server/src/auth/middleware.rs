//! Session extractor and the token-validity middleware.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::Cookie;
use stan_easy_connect_core::{SessionToken, UserId};
use stan_easy_connect_platform_access::RefreshOutcome;
use tracing::debug;

use super::AppState;
use super::callback::{CallbackRouter, RequestContext};
use super::cookies::{self, AUTH_COOKIE};

/// The live session named by the auth cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentSession {
    pub token: SessionToken,
    pub user_id: UserId,
}

/// Extractor for optionally getting the signed-in session.
///
/// Yields `None` without an auth cookie, or when the session behind it is
/// gone or expired.
pub struct OptionalAuth(pub Option<CurrentSession>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        let Some(token) = session_token(&jar) else {
            return Ok(Self(None));
        };
        let user_id = app_state.sessions.current_user(token).await;
        Ok(Self(user_id.map(|user_id| CurrentSession { token, user_id })))
    }
}

/// The session token carried by the auth cookie, if it parses.
#[must_use]
pub fn session_token(jar: &CookieJar) -> Option<SessionToken> {
    jar.get(AUTH_COOKIE)
        .and_then(|cookie| cookie.value().parse().ok())
}

/// Refreshes the provider tokens of the current session when they are due.
///
/// A session closed for want of a refresh token continues anonymously with
/// the auth cookie cleared, unless the handler issued a new one. A refused
/// refresh ends in the error redirect.
pub async fn verify_token_validity(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let Some(token) = session_token(&jar) else {
        return next.run(request).await;
    };

    let user_id = state.sessions.current_user(token).await;
    match state.sessions.verify_and_refresh(user_id, Some(token)).await {
        RefreshOutcome::LoggedOut => {
            debug!("session closed, continuing anonymously");
            let response = next.run(request).await;
            if sets_auth_cookie(&response) {
                return response;
            }
            let cleared = CookieJar::new().add(cookies::removal(&state.site, AUTH_COOKIE));
            (cleared, response).into_response()
        }
        RefreshOutcome::Failed(err) => {
            let router = CallbackRouter::new(&state);
            let ctx = RequestContext::new(HashMap::new(), &jar);
            router
                .logout_redirect(&err, router.cart(&ctx).as_ref())
                .await
                .into_response()
        }
        outcome => {
            debug!(?outcome, "token validity checked");
            next.run(request).await
        }
    }
}

fn sets_auth_cookie(response: &Response) -> bool {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| Cookie::parse(value).ok())
        .any(|cookie| cookie.name() == AUTH_COOKIE)
}
