//! Single-request HTTP layer shared by every market client.
//!
//! [`RequestClient::call`] sends one [`ApiRequest`], enforces a 2xx status and
//! unwraps the response envelope. It never retries; callers wrap it in a
//! [`RetryExecutor`](crate::retry::RetryExecutor).

pub mod graphql;
pub mod rest;

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use shelfscan_core::AppConfig;

use crate::batch::BatchOptions;
use crate::error::ScraperError;
use crate::pagination::{CollectOptions, DEFAULT_MAX_PAGES};
use crate::retry::RetryPolicy;

/// How the response body wraps its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// A JSON array whose first element is the operation result.
    GraphQl,
    /// A plain JSON object.
    Rest,
}

/// Everything needed to issue one HTTP call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub cookies: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            query: Vec::new(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
            body: None,
        }
    }

    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn cookies(mut self, cookies: Vec<(String, String)>) -> Self {
        self.cookies = cookies;
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Thin wrapper around a `reqwest::Client` with the configured timeout and `User-Agent`.
#[derive(Debug, Clone)]
pub struct RequestClient {
    client: Client,
}

impl RequestClient {
    /// # Errors
    ///
    /// Returns [`ScraperError::Transport`] if the underlying client cannot be built.
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Issues `request` once and returns the unwrapped envelope.
    ///
    /// # Errors
    ///
    /// - [`ScraperError::Transport`] on network or timeout failure.
    /// - [`ScraperError::UnexpectedStatus`] for any non-2xx status.
    /// - [`ScraperError::MalformedEnvelope`] if the body does not match `kind`.
    /// - [`ScraperError::ApiLogic`] if a GraphQL envelope carries errors.
    pub async fn call(
        &self,
        request: &ApiRequest,
        kind: EnvelopeKind,
    ) -> Result<Value, ScraperError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(cookie) = request.cookie_header() {
            builder = builder.header(COOKIE, cookie);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::UnexpectedStatus {
                status: status.as_u16(),
                url: request.url.to_string(),
            });
        }
        let body = response.text().await?;
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            bytes = body.len(),
            "response received"
        );
        parse_envelope(&body, kind, request.url.as_str())
    }
}

/// Parses and unwraps a response body.
///
/// For [`EnvelopeKind::GraphQl`] the first array element is returned; a
/// non-empty `errors` array on it becomes [`ScraperError::ApiLogic`] carrying
/// the first error's message.
///
/// # Errors
///
/// See [`RequestClient::call`].
pub fn parse_envelope(body: &str, kind: EnvelopeKind, context: &str) -> Result<Value, ScraperError> {
    let malformed = |reason: &str| ScraperError::MalformedEnvelope {
        context: context.to_string(),
        reason: reason.to_string(),
    };
    let value: Value = serde_json::from_str(body).map_err(|e| malformed(&e.to_string()))?;

    match kind {
        EnvelopeKind::Rest => {
            if value.is_object() {
                Ok(value)
            } else {
                Err(malformed("expected a JSON object"))
            }
        }
        EnvelopeKind::GraphQl => {
            let Value::Array(items) = value else {
                return Err(malformed("expected a JSON array"));
            };
            let Some(first) = items.into_iter().next() else {
                return Err(malformed("empty response array"));
            };
            if !first.is_object() {
                return Err(malformed("first array element is not an object"));
            }
            if let Some(errors) = first.get("errors").and_then(Value::as_array) {
                if let Some(error) = errors.first() {
                    let message = error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unspecified API error");
                    return Err(ScraperError::ApiLogic(message.to_string()));
                }
            }
            Ok(first)
        }
    }
}

/// Builds a header map from configured name/value pairs.
///
/// # Errors
///
/// Returns [`ScraperError::InvalidHeader`] for a name or value that is not a
/// legal HTTP header.
pub fn header_map<'a, I>(pairs: I) -> Result<HeaderMap, ScraperError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let invalid = |reason: String| ScraperError::InvalidHeader {
            name: name.to_string(),
            reason,
        };
        let header_name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(e.to_string()))?;
        let header_value = HeaderValue::from_str(value).map_err(|e| invalid(e.to_string()))?;
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, ScraperError> {
    Url::parse(raw).map_err(|e| ScraperError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn configured_headers(
    defaults: &[(&str, &str)],
    configured: &BTreeMap<String, String>,
) -> Result<HeaderMap, ScraperError> {
    header_map(
        defaults
            .iter()
            .copied()
            .chain(configured.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
    )
}

/// Per-run knobs shared by the market clients.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub retry: RetryPolicy,
    pub inter_page_delay: Duration,
    pub max_pages: usize,
    pub detail_chunk_size: usize,
    pub max_concurrent_chunks: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (compatible; shelfscan/0.1)".to_string(),
            retry: RetryPolicy::default(),
            inter_page_delay: Duration::from_millis(250),
            max_pages: DEFAULT_MAX_PAGES,
            detail_chunk_size: crate::batch::DEFAULT_CHUNK_SIZE,
            max_concurrent_chunks: 1,
        }
    }
}

impl ClientSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            timeout_secs: config.request_timeout_secs,
            user_agent: config.user_agent.clone(),
            retry: RetryPolicy::from_app_config(config),
            inter_page_delay: Duration::from_millis(config.inter_page_delay_ms),
            max_pages: DEFAULT_MAX_PAGES,
            detail_chunk_size: config.detail_chunk_size,
            max_concurrent_chunks: config.max_concurrent_chunks,
        }
    }

    #[must_use]
    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            inter_page_delay: self.inter_page_delay,
            max_pages: self.max_pages,
        }
    }

    #[must_use]
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            chunk_size: self.detail_chunk_size,
            max_concurrent_chunks: self.max_concurrent_chunks,
        }
    }
}
