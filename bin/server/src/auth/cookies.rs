//! Cookies set by the sign-in flow.
//!
//! Path, domain and the Secure flag always come from [`SiteConfig`] so that
//! a removal cookie matches the one it replaces.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration as TimeDuration;

use crate::config::SiteConfig;

/// Authentication cookie carrying the session token.
pub const AUTH_COOKIE: &str = "stan_easy_connect_auth";

/// Where to send the visitor once signed in.
pub const REDIRECT_COOKIE: &str = "stan-easy-connect-redirect";

/// Lifetime of the redirect-intent cookie.
pub const REDIRECT_COOKIE_TTL: TimeDuration = TimeDuration::days(1);

fn scoped(site: &SiteConfig, name: &'static str, value: String, max_age: TimeDuration) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, value))
        .path(site.cookie_path.clone())
        .http_only(true)
        .secure(site.secure_cookies)
        .same_site(SameSite::Lax)
        .build();
    if let Some(domain) = &site.cookie_domain {
        cookie.set_domain(domain.clone());
    }
    cookie.set_max_age(max_age);
    cookie
}

/// Binds the browser to one session for `lifetime_minutes`.
pub fn auth_cookie(site: &SiteConfig, token: impl ToString, lifetime_minutes: i64) -> Cookie<'static> {
    scoped(
        site,
        AUTH_COOKIE,
        token.to_string(),
        TimeDuration::minutes(lifetime_minutes),
    )
}

pub fn redirect_cookie(site: &SiteConfig, target: &str) -> Cookie<'static> {
    scoped(site, REDIRECT_COOKIE, target.to_string(), REDIRECT_COOKIE_TTL)
}

/// An already-expired cookie that makes the browser drop `name`.
pub fn removal(site: &SiteConfig, name: &'static str) -> Cookie<'static> {
    scoped(site, name, String::new(), TimeDuration::ZERO)
}
