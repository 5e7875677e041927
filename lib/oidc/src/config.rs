//! Stan Connect provider configuration.

use serde::{Deserialize, Serialize};

/// Base URL of the production Stan API.
pub const DEFAULT_API_AUTH_URL: &str = "https://api.stan-app.fr";

/// Scopes requested on every authorization.
pub const SCOPE: &str = "openid email phone profile address";

const LOGIN_PATH: &str = "/v1/oauth/auth";
const TOKEN_PATH: &str = "/v1/oauth/token";
const USER_PATH: &str = "/v1/sessions/users";

/// Client registration and endpoints of the Stan Connect provider.
///
/// Endpoints derive from `stan_api_auth_url` unless explicitly overridden.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    #[serde(default = "default_api_auth_url")]
    stan_api_auth_url: String,
    /// Whether the Stan button is rendered on the login page.
    #[serde(default = "default_connect_in_login")]
    stan_connect_in_login: bool,
    #[serde(default)]
    login_endpoint: Option<String>,
    #[serde(default)]
    token_endpoint: Option<String>,
    #[serde(default)]
    user_endpoint: Option<String>,
}

fn default_api_auth_url() -> String {
    DEFAULT_API_AUTH_URL.to_string()
}

fn default_connect_in_login() -> bool {
    true
}

impl ProviderConfig {
    /// Starts a builder with the required client registration.
    #[must_use]
    pub fn builder(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> ProviderConfigBuilder {
        ProviderConfigBuilder::new(client_id, client_secret, redirect_uri)
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    #[must_use]
    pub fn stan_api_auth_url(&self) -> &str {
        &self.stan_api_auth_url
    }

    #[must_use]
    pub fn stan_connect_in_login(&self) -> bool {
        self.stan_connect_in_login
    }

    /// Authorization endpoint the browser is sent to.
    #[must_use]
    pub fn login_endpoint(&self) -> String {
        self.endpoint(self.login_endpoint.as_deref(), LOGIN_PATH)
    }

    /// Token endpoint for code and refresh exchanges.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        self.endpoint(self.token_endpoint.as_deref(), TOKEN_PATH)
    }

    /// User-info endpoint.
    #[must_use]
    pub fn user_endpoint(&self) -> String {
        self.endpoint(self.user_endpoint.as_deref(), USER_PATH)
    }

    fn endpoint(&self, explicit: Option<&str>, path: &str) -> String {
        match explicit {
            Some(url) => url.to_string(),
            None => format!("{}{path}", self.stan_api_auth_url.trim_end_matches('/')),
        }
    }
}

/// Builder for [`ProviderConfig`].
#[derive(Debug, Clone)]
pub struct ProviderConfigBuilder {
    config: ProviderConfig,
}

impl ProviderConfigBuilder {
    fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            config: ProviderConfig {
                client_id: client_id.into(),
                client_secret: client_secret.into(),
                redirect_uri: redirect_uri.into(),
                stan_api_auth_url: default_api_auth_url(),
                stan_connect_in_login: default_connect_in_login(),
                login_endpoint: None,
                token_endpoint: None,
                user_endpoint: None,
            },
        }
    }

    /// Points every derived endpoint at another API host (staging, tests).
    #[must_use]
    pub fn api_auth_url(mut self, url: impl Into<String>) -> Self {
        self.config.stan_api_auth_url = url.into();
        self
    }

    #[must_use]
    pub fn login_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.login_endpoint = Some(url.into());
        self
    }

    #[must_use]
    pub fn token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.token_endpoint = Some(url.into());
        self
    }

    #[must_use]
    pub fn user_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.user_endpoint = Some(url.into());
        self
    }

    #[must_use]
    pub fn connect_in_login(mut self, enabled: bool) -> Self {
        self.config.stan_connect_in_login = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> ProviderConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_derive_from_api_url() {
        let config = ProviderConfig::builder("client", "secret", "https://shop.example/cb").build();

        assert_eq!(config.login_endpoint(), "https://api.stan-app.fr/v1/oauth/auth");
        assert_eq!(config.token_endpoint(), "https://api.stan-app.fr/v1/oauth/token");
        assert_eq!(config.user_endpoint(), "https://api.stan-app.fr/v1/sessions/users");
        assert!(config.stan_connect_in_login());
    }

    #[test]
    fn trailing_slash_on_api_url_is_ignored() {
        let config = ProviderConfig::builder("client", "secret", "https://shop.example/cb")
            .api_auth_url("http://localhost:8080/")
            .build();

        assert_eq!(config.token_endpoint(), "http://localhost:8080/v1/oauth/token");
    }

    #[test]
    fn explicit_endpoint_overrides_derived_one() {
        let config = ProviderConfig::builder("client", "secret", "https://shop.example/cb")
            .user_endpoint("https://users.example/me")
            .build();

        assert_eq!(config.user_endpoint(), "https://users.example/me");
        assert_eq!(config.login_endpoint(), "https://api.stan-app.fr/v1/oauth/auth");
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{"client_id":"c","client_secret":"s","redirect_uri":"https://shop.example/cb"}"#,
        )
        .expect("should deserialize");

        assert_eq!(config.stan_api_auth_url(), DEFAULT_API_AUTH_URL);
        assert!(config.stan_connect_in_login());
    }
}
