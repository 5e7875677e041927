//! Centralized server configuration.
//!
//! Loaded via the `config` crate from an optional `stan-easy-connect` file
//! in the working directory, then from environment variables with `__` as
//! the nesting separator (`OIDC__CLIENT_ID`, `SITE__HOME_URL`, ...).
//!
//! See [`ProviderConfig`] for the Stan Connect client registration.

use serde::Deserialize;
use stan_easy_connect_oidc::ProviderConfig;
use stan_easy_connect_platform_access::{DEFAULT_COUPON_CODE, DEFAULT_SESSION_LIFETIME_MINUTES};

/// Server configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Stan Connect client registration.
    pub oidc: ProviderConfig,

    pub site: SiteConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub commerce: CommerceConfig,
}

/// Where visitors land and how cookies are scoped.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Landing page after a login with nothing better to show.
    pub home_url: String,

    /// Login page; error redirects land here with `login-error` and
    /// `message` appended.
    pub login_url: String,

    #[serde(default = "default_cookie_path")]
    pub cookie_path: String,

    #[serde(default)]
    pub cookie_domain: Option<String>,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Drop the state value once a callback has consumed it.
    #[serde(default = "default_single_use_state")]
    pub single_use_state: bool,
}

/// Shop integration.
#[derive(Debug, Clone, Deserialize)]
pub struct CommerceConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_checkout_url")]
    pub checkout_url: String,

    /// Coupon applied to the cart after login.
    #[serde(default = "default_coupon_code")]
    pub coupon_code: String,

    /// Cookie naming the visitor's cart.
    #[serde(default = "default_cart_cookie")]
    pub cart_cookie: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_cookie_path() -> String {
    "/".to_string()
}

fn default_secure_cookies() -> bool {
    true
}

fn default_session_duration_minutes() -> i64 {
    DEFAULT_SESSION_LIFETIME_MINUTES
}

fn default_single_use_state() -> bool {
    true
}

fn default_checkout_url() -> String {
    "/checkout".to_string()
}

fn default_coupon_code() -> String {
    DEFAULT_COUPON_CODE.to_string()
}

fn default_cart_cookie() -> String {
    "stan-easy-connect-cart".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
            single_use_state: default_single_use_state(),
        }
    }
}

impl Default for CommerceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            checkout_url: default_checkout_url(),
            coupon_code: default_coupon_code(),
            cart_cookie: default_cart_cookie(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from the optional config file and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(config::Environment::default())
    }

    fn load(environment: config::Environment) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::with_name("stan-easy-connect").required(false))
            .add_source(environment.separator("__").try_parsing(true))
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment(pairs: &[(&str, &str)]) -> config::Environment {
        let vars: config::Map<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        config::Environment::default().source(Some(vars))
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("OIDC__CLIENT_ID", "client-1"),
        ("OIDC__CLIENT_SECRET", "s3cret"),
        ("OIDC__REDIRECT_URI", "https://shop.example/stan-easy-connect-authorize"),
        ("SITE__HOME_URL", "https://shop.example/"),
        ("SITE__LOGIN_URL", "https://shop.example/login"),
    ];

    #[test]
    fn defaults_fill_optional_sections() {
        let config = ServerConfig::load(environment(REQUIRED)).unwrap();

        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.oidc.client_id(), "client-1");
        assert_eq!(
            config.oidc.token_endpoint(),
            "https://api.stan-app.fr/v1/oauth/token"
        );
        assert_eq!(config.session.duration_minutes, 2880);
        assert!(config.session.single_use_state);
        assert!(config.site.secure_cookies);
        assert_eq!(config.site.cookie_path, "/");
        assert!(!config.commerce.enabled);
        assert_eq!(config.commerce.coupon_code, "STANNER");
    }

    #[test]
    fn nested_values_override_defaults() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("SESSION__DURATION_MINUTES", "60"),
            ("SESSION__SINGLE_USE_STATE", "false"),
            ("SITE__SECURE_COOKIES", "false"),
            ("COMMERCE__ENABLED", "true"),
            ("OIDC__STAN_API_AUTH_URL", "https://api.stan.test/"),
        ]);
        let config = ServerConfig::load(environment(&pairs)).unwrap();

        assert_eq!(config.session.duration_minutes, 60);
        assert!(!config.session.single_use_state);
        assert!(!config.site.secure_cookies);
        assert!(config.commerce.enabled);
        assert_eq!(
            config.oidc.login_endpoint(),
            "https://api.stan.test/v1/oauth/auth"
        );
    }

    #[test]
    fn missing_client_registration_is_an_error() {
        let pairs: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| !k.starts_with("OIDC__"))
            .collect();
        assert!(ServerConfig::load(environment(&pairs)).is_err());
    }
}
