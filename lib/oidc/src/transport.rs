//! Outbound HTTP to the provider.
//!
//! Every provider call is a POST. The client builds a [`ProviderRequest`] and
//! hands it to an [`HttpTransport`], which lets tests script provider answers
//! without a network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use rootcause::Report;
use url::Url;

use crate::error::TransportError;

/// A POST to one provider endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub url: Url,
    pub headers: Vec<(String, String)>,
    /// Sent as `application/x-www-form-urlencoded` when non-empty.
    pub form: Vec<(String, String)>,
}

impl ProviderRequest {
    /// Creates a request carrying the `Host` header the provider expects.
    #[must_use]
    pub fn new(url: Url) -> Self {
        let headers = host_header(&url)
            .map(|host| vec![("Host".to_string(), host)])
            .unwrap_or_default();
        Self {
            url,
            headers,
            form: Vec::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    #[must_use]
    pub fn form_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.form.push((name.to_string(), value.into()));
        self
    }
}

/// Status and raw body of a provider answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    /// `None` when the provider answered with an empty body.
    pub body: Option<String>,
}

impl ProviderResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            status,
            body: (!body.is_empty()).then_some(body),
        }
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post(&self, request: ProviderRequest) -> Result<ProviderResponse, Report<TransportError>>;
}

/// [`HttpTransport`] over a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a client that does not follow redirects.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, Report<TransportError>> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::ClientSetup {
                details: e.to_string(),
            })?;
        Ok(Self { http })
    }

    /// Wraps an already configured client.
    #[must_use]
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: ProviderRequest) -> Result<ProviderResponse, Report<TransportError>> {
        let url = request.url.to_string();
        let mut builder = self.http.post(request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed {
                url: url.clone(),
                details: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::BodyUnreadable {
                url,
                details: e.to_string(),
            })?;

        Ok(ProviderResponse::new(status, body))
    }
}

/// [`HttpTransport`] that answers from a queue and records what it was sent.
///
/// Used to stand in for the provider in tests and local development.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    answers: Mutex<VecDeque<Result<ProviderResponse, TransportError>>>,
    sent: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next answer.
    pub fn push(&self, answer: Result<ProviderResponse, TransportError>) {
        self.answers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(answer);
    }

    /// Queues a JSON answer with status 200.
    pub fn push_json(&self, body: &serde_json::Value) {
        self.push(Ok(ProviderResponse::new(200, body.to_string())));
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<ProviderRequest> {
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post(&self, request: ProviderRequest) -> Result<ProviderResponse, Report<TransportError>> {
        let url = request.url.to_string();
        self.sent
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request);

        let answer = self
            .answers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or(Err(TransportError::RequestFailed {
                url,
                details: "no scripted answer left".to_string(),
            }));
        answer.map_err(Report::from)
    }
}

/// `host[:port]`, with the port only when the URL spells one out.
fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
