//! Stan Connect OAuth2 client.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument, warn};
use url::Url;

use crate::claim::UserClaim;
use crate::config::{ProviderConfig, SCOPE};
use crate::error::{ConfigError, ConnectError, ErrorCode};
use crate::state::StateRegistry;
use crate::token::{TokenSet, parse_token_response};
use crate::transport::{HttpTransport, ProviderRequest};

/// Code and state of a callback that passed [`OidcClient::validate_request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub code: String,
    pub state: String,
}

/// Parsed provider endpoints.
#[derive(Debug, Clone)]
struct Endpoints {
    login: Url,
    token: Url,
    user: Url,
}

/// Client for the Stan Connect authorization server.
#[derive(Clone)]
pub struct OidcClient {
    config: ProviderConfig,
    endpoints: Endpoints,
    transport: Arc<dyn HttpTransport>,
    states: StateRegistry,
}

impl OidcClient {
    /// Creates a client, checking that every endpoint is a valid URL.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unparseable endpoint.
    pub fn new(
        config: ProviderConfig,
        transport: Arc<dyn HttpTransport>,
        states: StateRegistry,
    ) -> Result<Self, ConfigError> {
        Url::parse(config.redirect_uri()).map_err(|e| invalid_url("redirect_uri", e))?;
        let endpoints = Endpoints {
            login: Url::parse(&config.login_endpoint()).map_err(|e| invalid_url("login endpoint", e))?,
            token: Url::parse(&config.token_endpoint()).map_err(|e| invalid_url("token endpoint", e))?,
            user: Url::parse(&config.user_endpoint()).map_err(|e| invalid_url("user endpoint", e))?,
        };

        Ok(Self {
            config,
            endpoints,
            transport,
            states,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    #[must_use]
    pub fn states(&self) -> &StateRegistry {
        &self.states
    }

    /// Issues a fresh state and returns the URL the browser is sent to.
    pub async fn build_authorization_url(&self) -> Url {
        let state = self.states.issue().await;

        let mut url = self.endpoints.login.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("scope", SCOPE)
            .append_pair("client_id", self.config.client_id())
            .append_pair("state", state.as_str())
            .append_pair("redirect_uri", self.config.redirect_uri());

        debug!(endpoint = %self.endpoints.login, "built authorization url");
        url
    }

    /// Checks the callback query parameters.
    ///
    /// # Errors
    ///
    /// In order: `unknown-error` when the provider sent an `error`,
    /// `missing-code`, `missing-state`, then `invalid-state` for a state that
    /// was never issued or has expired.
    pub async fn validate_request(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<AuthorizationRequest, ConnectError> {
        if params.contains_key("error") {
            return Err(ErrorCode::UnknownError.into());
        }
        let code = params
            .get("code")
            .ok_or_else(|| ConnectError::from(ErrorCode::MissingCode))?;
        let state = params
            .get("state")
            .ok_or_else(|| ConnectError::from(ErrorCode::MissingState))?;

        if !self.states.validate(state).await {
            return Err(ErrorCode::InvalidState.into());
        }

        Ok(AuthorizationRequest {
            code: code.trim().to_string(),
            state: state.clone(),
        })
    }

    /// Exchanges an authorization code at the token endpoint.
    ///
    /// # Errors
    ///
    /// `request_authentication_token` when the provider cannot be reached,
    /// otherwise whatever [`parse_token_response`] rejects.
    #[instrument(skip_all, fields(endpoint = %self.endpoints.token))]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet, ConnectError> {
        let request = ProviderRequest::new(self.endpoints.token.clone())
            .form_field("code", code)
            .form_field("client_id", self.config.client_id())
            .form_field("client_secret", self.config.client_secret())
            .form_field("redirect_uri", self.config.redirect_uri())
            .form_field("grant_type", "authorization_code")
            .form_field("scope", SCOPE);

        let response = self.transport.post(request).await.map_err(|report| {
            warn!(error = %report, "authorization code exchange failed");
            ConnectError::from(ErrorCode::RequestAuthenticationToken)
        })?;

        parse_token_response(&response)
    }

    /// Exchanges a refresh token for a new token set.
    ///
    /// # Errors
    ///
    /// `refresh_token` when the provider cannot be reached, otherwise
    /// whatever [`parse_token_response`] rejects.
    #[instrument(skip_all, fields(endpoint = %self.endpoints.token))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, ConnectError> {
        let request = ProviderRequest::new(self.endpoints.token.clone())
            .form_field("refresh_token", refresh_token)
            .form_field("client_id", self.config.client_id())
            .form_field("client_secret", self.config.client_secret())
            .form_field("grant_type", "refresh_token");

        let response = self.transport.post(request).await.map_err(|report| {
            warn!(error = %report, "refresh token exchange failed");
            ConnectError::from(ErrorCode::RefreshToken)
        })?;

        parse_token_response(&response)
    }

    /// Fetches the user-info claim with the access token.
    ///
    /// An unparseable body yields a `Null` claim, which
    /// [`validate_user_claim`](crate::validate_user_claim) then rejects.
    ///
    /// # Errors
    ///
    /// `bad-claim` when the endpoint cannot be reached or answers with an
    /// empty body.
    #[instrument(skip_all, fields(endpoint = %self.endpoints.user))]
    pub async fn fetch_user_claim(&self, access_token: &str) -> Result<UserClaim, ConnectError> {
        let request = ProviderRequest::new(self.endpoints.user.clone())
            .header("Authorization", format!("Bearer {access_token}"));

        let response = self.transport.post(request).await.map_err(|report| {
            warn!(error = %report, "user claim request failed");
            ConnectError::from(ErrorCode::BadClaim)
        })?;

        let body = response
            .body
            .ok_or_else(|| ConnectError::from(ErrorCode::BadClaim))?;

        Ok(UserClaim::from_value(
            serde_json::from_str(&body).unwrap_or(serde_json::Value::Null),
        ))
    }
}

fn invalid_url(field: &'static str, err: url::ParseError) -> ConfigError {
    ConfigError::InvalidUrl {
        field,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::state::InMemoryStateCache;
    use crate::transport::{ProviderResponse, ScriptedTransport};
    use serde_json::json;

    fn client() -> (OidcClient, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let config = ProviderConfig::builder("client-1", "secret-1", "https://shop.example/stan-easy-connect-authorize")
            .api_auth_url("http://localhost:8080")
            .build();
        let states = StateRegistry::new(Arc::new(InMemoryStateCache::new()));
        let client = OidcClient::new(config, transport.clone(), states).unwrap();
        (client, transport)
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        let config = ProviderConfig::builder("c", "s", "https://shop.example/cb")
            .api_auth_url("not a url")
            .build();
        let states = StateRegistry::new(Arc::new(InMemoryStateCache::new()));
        let result = OidcClient::new(config, Arc::new(ScriptedTransport::new()), states);

        assert!(matches!(
            result,
            Err(ConfigError::InvalidUrl { field: "login endpoint", .. })
        ));
    }

    #[tokio::test]
    async fn authorization_url_carries_parameters_in_order() {
        let (client, _) = client();
        let url = client.build_authorization_url().await;

        assert_eq!(url.path(), "/v1/oauth/auth");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["response_type", "scope", "client_id", "state", "redirect_uri"]);
        assert_eq!(pairs[1].1, "openid email phone profile address");
        assert_eq!(pairs[2].1, "client-1");

        let state = &pairs[3].1;
        assert!(client.states().validate(state).await);
    }

    #[tokio::test]
    async fn validate_request_checks_in_order() {
        let (client, _) = client();

        let err = client
            .validate_request(&params(&[("error", "access_denied"), ("code", "c")]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), &ErrorCode::UnknownError);

        let err = client.validate_request(&params(&[("state", "s")])).await.unwrap_err();
        assert_eq!(err.code(), &ErrorCode::MissingCode);

        let err = client.validate_request(&params(&[("code", "c")])).await.unwrap_err();
        assert_eq!(err.code(), &ErrorCode::MissingState);

        let err = client
            .validate_request(&params(&[("code", "c"), ("state", "forged")]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), &ErrorCode::InvalidState);
    }

    #[tokio::test]
    async fn validate_request_accepts_issued_state() {
        let (client, _) = client();
        let state = client.states().issue().await;

        let request = client
            .validate_request(&params(&[("code", " abc "), ("state", state.as_str())]))
            .await
            .unwrap();
        assert_eq!(request.code, "abc");
        assert_eq!(request.state, state.as_str());
    }

    #[tokio::test]
    async fn exchange_code_posts_form_with_host_header() {
        let (client, transport) = client();
        transport.push_json(&json!({
            "access_token": "at",
            "id_token": "h.p.s",
            "token_type": "Bearer",
            "expires_in": 3600
        }));

        let tokens = client.exchange_code("the-code").await.unwrap();
        assert_eq!(tokens.access_token.as_deref(), Some("at"));

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url.as_str(), "http://localhost:8080/v1/oauth/token");
        assert!(sent[0].headers.contains(&("Host".to_string(), "localhost:8080".to_string())));
        assert!(sent[0].form.contains(&("grant_type".to_string(), "authorization_code".to_string())));
        assert!(sent[0].form.contains(&("code".to_string(), "the-code".to_string())));
        assert!(sent[0].form.contains(&("client_secret".to_string(), "secret-1".to_string())));
    }

    #[tokio::test]
    async fn unreachable_token_endpoint_is_request_authentication_token() {
        let (client, transport) = client();
        transport.push(Err(TransportError::RequestFailed {
            url: "http://localhost:8080/v1/oauth/token".to_string(),
            details: "connection refused".to_string(),
        }));

        let err = client.exchange_code("c").await.unwrap_err();
        assert_eq!(err.code(), &ErrorCode::RequestAuthenticationToken);
    }

    #[tokio::test]
    async fn refresh_uses_refresh_grant() {
        let (client, transport) = client();
        transport.push_json(&json!({ "error": "invalid_grant", "error_description": "Refresh token expired" }));

        let err = client.refresh("rt").await.unwrap_err();
        assert_eq!(err.code().to_string(), "invalid_grant");

        let form = &transport.sent()[0].form;
        assert!(form.contains(&("grant_type".to_string(), "refresh_token".to_string())));
        assert!(form.contains(&("refresh_token".to_string(), "rt".to_string())));
        assert!(!form.iter().any(|(k, _)| k == "scope"));
    }

    #[tokio::test]
    async fn unreachable_refresh_is_refresh_token_error() {
        let (client, _) = client();
        let err = client.refresh("rt").await.unwrap_err();
        assert_eq!(err.code(), &ErrorCode::RefreshToken);
    }

    #[tokio::test]
    async fn fetch_user_claim_sends_bearer() {
        let (client, transport) = client();
        transport.push_json(&json!({ "sub": "stan|1", "email": "a@b.c" }));

        let claim = client.fetch_user_claim("at").await.unwrap();
        assert_eq!(claim.subject().as_deref(), Some("stan|1"));

        let sent = transport.sent();
        assert!(sent[0].headers.contains(&("Authorization".to_string(), "Bearer at".to_string())));
        assert!(sent[0].form.is_empty());
    }

    #[tokio::test]
    async fn empty_user_claim_body_is_bad_claim() {
        let (client, transport) = client();
        transport.push(Ok(ProviderResponse::new(200, "")));

        let err = client.fetch_user_claim("at").await.unwrap_err();
        assert_eq!(err.code(), &ErrorCode::BadClaim);
    }
}
