use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use syncbridge_domain::{Result, SyncBridgeError};
use tracing::debug;

use crate::errors::{classify_status, InfraError};

/// Thin reqwest wrapper shared by every outbound client.
///
/// Sends each request exactly once. Retry policy belongs to the caller, which
/// knows whether the operation is idempotent.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute the request, mapping transport failures onto the domain
    /// taxonomy. Any status code is returned as-is.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build().map_err(|err| SyncBridgeError::from(InfraError::from(err)))?;

        let method = request.method().clone();
        let url = request.url().clone();
        debug!(%method, %url, "sending HTTP request");

        match self.client.execute(request).await {
            Ok(response) => {
                debug!(%method, %url, status = %response.status(), "received HTTP response");
                Ok(response)
            }
            Err(err) => {
                debug!(%method, %url, error = %err, "HTTP request failed");
                Err(InfraError::from(err).into())
            }
        }
    }

    /// Execute the request and classify any non-success status.
    pub async fn send_checked(&self, builder: RequestBuilder, context: &str) -> Result<Response> {
        let response = self.send(builder).await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(classify_status(status, context))
        }
    }

    /// Execute the request and decode a JSON body from a success response.
    pub async fn send_json<T>(&self, builder: RequestBuilder, context: &str) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send_checked(builder, context).await?;
        response.json::<T>().await.map_err(|err| SyncBridgeError::from(InfraError::from(err)))
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    bearer_token: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: Some(concat!("syncbridge/", env!("CARGO_PKG_VERSION")).to_string()),
            bearer_token: None,
            default_headers: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Pre-acquired token sent as `Authorization: Bearer`.
    pub fn bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let mut headers = self.default_headers.unwrap_or_default();
        if let Some(token) = self.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
                .map_err(|_| SyncBridgeError::Config("bearer token is not a valid header".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        if !headers.is_empty() {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| SyncBridgeError::from(InfraError::from(err)))?;

        Ok(HttpClient { client })
    }
}
