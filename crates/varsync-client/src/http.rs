//! HTTP client utilities for the Varsync backend.
//!
//! This module handles header construction, URL building, HTTP status
//! classification, and opening the server-sent-events push channel. Payloads
//! are returned as raw JSON; shape checks live in [`crate::validation`].

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::ClientError;
use crate::source::{PushSubscription, RemoteSource};
use crate::sse;

/// Path of the handshake endpoint (environment-scoped variant).
const INIT_ENDPOINT: &str = "init";
/// Path prefix of the per-environment snapshot and push endpoint.
const CONFIG_ENDPOINT: &str = "config";
/// Buffered push events before the pump applies backpressure.
const PUSH_CHANNEL_CAPACITY: usize = 16;

/// Additional options governing how the HTTP client is constructed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientOptions {
    /// Whether plaintext (HTTP) endpoints are allowed.
    pub allow_plaintext: bool,
    /// Whether TLS certificate validation should be skipped.
    pub accept_invalid_certs: bool,
}

/// Transport-level error taxonomy.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The access token was rejected by the backend.
    #[error("unauthorized - invalid or revoked access token")]
    Unauthorized,
    /// Request rejected (4xx excluding 401, or an unexpected redirect).
    #[error("request rejected: status {0}")]
    Rejected(u16),
    /// Backend reported a temporary outage (5xx).
    #[error("transient backend error: status {0}")]
    Retryable(u16),
    /// The provided URL violates the required transport policy.
    #[error("insecure base url requires explicit opt-in: {0}")]
    InsecureUrl(String),
    /// The base URL could not be parsed or extended.
    #[error("invalid base url: {0}")]
    InvalidUrl(String),
    /// The access token cannot be carried in an HTTP header.
    #[error("access token contains characters not allowed in a header")]
    InvalidToken,
    /// Transport-level issue (DNS, TLS, socket, etc.).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Response body was not valid JSON.
    #[error("failed to decode json payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// HTTP client encapsulating a reusable `reqwest::Client`, base URL, and headers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: Url,
    headers: HeaderMap,
}

impl HttpClient {
    /// Builds an HTTP client authenticating every request with `access_token`.
    pub fn new(
        base_url: impl AsRef<str>,
        access_token: &str,
        options: HttpClientOptions,
    ) -> Result<Self, HttpError> {
        let raw = base_url.as_ref().trim_end_matches('/');
        // Plaintext endpoints would leak the bearer token; require an explicit opt-in.
        if !options.allow_plaintext && raw.starts_with("http://") {
            return Err(HttpError::InsecureUrl(raw.to_string()));
        }
        let base_url = Url::parse(raw).map_err(|err| HttpError::InvalidUrl(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(HttpError::InvalidUrl(raw.to_string()));
        }

        let mut headers = HeaderMap::new();
        let user_agent = format!("varsync-client/{}", env!("CARGO_PKG_VERSION"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent).map_err(|_| HttpError::InvalidToken)?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|_| HttpError::InvalidToken)?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            base_url,
            headers,
        })
    }

    /// Fetches the token-only bootstrap payload (`GET <base>`).
    pub async fn fetch_bootstrap(&self) -> Result<Value, HttpError> {
        let url = self.base_url.clone();
        self.send_json(Method::GET, url, None).await
    }

    /// Sends the handshake (`POST <base>/init` with `{ env }`).
    pub async fn handshake(&self, environment: &str) -> Result<Value, HttpError> {
        let url = self.endpoint(&[INIT_ENDPOINT])?;
        let body = json!({ "env": environment });
        self.send_json(Method::POST, url, Some(body)).await
    }

    /// Fetches the snapshot for an environment (`GET <base>/config/<env>`).
    pub async fn fetch_environment(&self, environment: &str) -> Result<Value, HttpError> {
        let url = self.endpoint(&[CONFIG_ENDPOINT, environment])?;
        self.send_json(Method::GET, url, None).await
    }

    /// Opens the server-sent-events channel for an environment.
    ///
    /// The returned subscription is fed by a background pump; transport
    /// failures after the handshake arrive as [`crate::source::PushEvent::Error`].
    pub async fn subscribe(&self, environment: &str) -> Result<PushSubscription, HttpError> {
        let url = self.endpoint(&[CONFIG_ENDPOINT, environment])?;
        let mut headers = self.headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        tracing::debug!(url = %url, "varsync opening push channel");

        let response = self.client.get(url).headers(headers).send().await?;
        classify_status(response.status())?;

        let (tx, rx) = mpsc::channel(PUSH_CHANNEL_CAPACITY);
        let task = tokio::spawn(sse::pump_events(response, tx));
        Ok(PushSubscription::new(rx, Some(task)))
    }

    /// Joins path segments onto the base URL, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, HttpError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| HttpError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Internal helper: attaches headers, sends the request, classifies the
    /// HTTP status, and decodes the JSON body.
    async fn send_json(
        &self,
        method: Method,
        url: Url,
        body: Option<Value>,
    ) -> Result<Value, HttpError> {
        tracing::debug!(
            method = %method,
            url = %url,
            headers = ?redact_headers(&self.headers),
            "varsync HTTP request"
        );

        let builder = self
            .client
            .request(method.clone(), url.clone())
            .headers(self.headers.clone());
        let builder = match body {
            Some(payload) => builder.body(payload.to_string()),
            None => builder,
        };
        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        tracing::debug!(
            method = %method,
            url = %url,
            status = %status,
            body_len = bytes.len(),
            "varsync HTTP response"
        );
        classify_status(status)?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl RemoteSource for HttpClient {
    async fn fetch_bootstrap(&self) -> Result<Value, ClientError> {
        Ok(HttpClient::fetch_bootstrap(self).await?)
    }

    async fn handshake(&self, environment: &str) -> Result<Value, ClientError> {
        Ok(HttpClient::handshake(self, environment).await?)
    }

    async fn fetch_environment(&self, environment: &str) -> Result<Value, ClientError> {
        Ok(HttpClient::fetch_environment(self, environment).await?)
    }

    async fn subscribe(&self, environment: &str) -> Result<PushSubscription, ClientError> {
        Ok(HttpClient::subscribe(self, environment).await?)
    }
}

/// Maps HTTP status codes to the transport error taxonomy.
fn classify_status(status: StatusCode) -> Result<(), HttpError> {
    if status.is_redirection() {
        return Err(HttpError::Rejected(status.as_u16()));
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(HttpError::Unauthorized);
    }
    if status.is_client_error() {
        return Err(HttpError::Rejected(status.as_u16()));
    }
    if status.is_server_error() {
        return Err(HttpError::Retryable(status.as_u16()));
    }
    Ok(())
}

/// Returns a redacted view of request headers suitable for debug logging.
fn redact_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    const SENSITIVE_HEADERS: [&str; 2] = ["authorization", "cookie"];

    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.as_str().to_ascii_lowercase();
            let display = if SENSITIVE_HEADERS.contains(&lower.as_str()) {
                "<redacted>".to_string()
            } else {
                value
                    .to_str()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "<non-utf8>".to_string())
            };
            (lower, display)
        })
        .collect()
}
