//! Session handshake for back-ends that guard their JSON API with cookies and
//! a CSRF token.
//!
//! A plain GET of the storefront root sets the session and visitor cookies and
//! embeds the CSRF token in the page's bootstrap JSON. Later API calls must
//! replay all three.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;

use crate::error::ScraperError;

pub const SESSION_COOKIE: &str = "global_sid";
pub const VISITOR_COOKIE: &str = "VISITORID";
pub const CSRF_HEADER: &str = "x-csrf-token";

static CSRF_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""csrf"\s*:\s*\{\s*"token"\s*:\s*"([^"]+)""#).expect("valid regex")
});

/// Credentials captured by [`acquire_session`].
///
/// Any of the three values may be missing if the back-end did not supply it;
/// callers send whatever was captured.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub session_id: Option<String>,
    pub visitor_id: Option<String>,
    pub csrf_token: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[redacted]");
        f.debug_struct("SessionCredentials")
            .field("session_id", &redact(&self.session_id))
            .field("visitor_id", &redact(&self.visitor_id))
            .field("csrf_token", &redact(&self.csrf_token))
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

impl SessionCredentials {
    /// Cookie name/value pairs to replay on API requests.
    #[must_use]
    pub fn cookie_pairs(&self) -> Vec<(String, String)> {
        [
            (SESSION_COOKIE, &self.session_id),
            (VISITOR_COOKIE, &self.visitor_id),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_ref().map(|v| (name.to_string(), v.clone())))
        .collect()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.visitor_id.is_some() && self.csrf_token.is_some()
    }
}

/// Pulls the CSRF token out of the storefront page body.
#[must_use]
pub fn extract_csrf_token(body: &str) -> Option<String> {
    CSRF_TOKEN_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Parses a `Cookie` header value (`a=1; b=2`) into name/value pairs.
fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

fn cookie_from_jar(jar: &Jar, urls: &[&Url], name: &str) -> Option<String> {
    urls.iter()
        .filter_map(|url| jar.cookies(url))
        .filter_map(|header| header.to_str().ok().map(parse_cookie_header))
        .flatten()
        .find(|(n, v)| n == name && !v.is_empty())
        .map(|(_, v)| v)
}

/// Performs the session handshake against `base_url`.
///
/// # Errors
///
/// Returns [`ScraperError::InvalidUrl`] for an unparseable base URL and
/// [`ScraperError::Auth`] on transport failure or a non-2xx status. Missing
/// cookies or token are logged, not treated as errors.
pub async fn acquire_session(
    base_url: &str,
    user_agent: &str,
    timeout: Duration,
) -> Result<SessionCredentials, ScraperError> {
    let url = Url::parse(base_url).map_err(|e| ScraperError::InvalidUrl {
        url: base_url.to_string(),
        reason: e.to_string(),
    })?;
    let auth_error = |reason: String| ScraperError::Auth {
        url: base_url.to_string(),
        reason,
    };

    let jar = Arc::new(Jar::default());
    let client = reqwest::Client::builder()
        .cookie_provider(Arc::clone(&jar))
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
        .map_err(|e| auth_error(e.to_string()))?;

    let response = client
        .get(url.clone())
        .header(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8",
        )
        .send()
        .await
        .map_err(|e| auth_error(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(auth_error(format!("HTTP {}", status.as_u16())));
    }
    let final_url = response.url().clone();
    let body = response
        .text()
        .await
        .map_err(|e| auth_error(e.to_string()))?;

    let urls = [&final_url, &url];
    let credentials = SessionCredentials {
        session_id: cookie_from_jar(&jar, &urls, SESSION_COOKIE),
        visitor_id: cookie_from_jar(&jar, &urls, VISITOR_COOKIE),
        csrf_token: extract_csrf_token(&body),
        acquired_at: Utc::now(),
    };

    if credentials.is_complete() {
        tracing::info!(base_url, "session acquired");
    } else {
        tracing::warn!(
            base_url,
            has_session = credentials.session_id.is_some(),
            has_visitor = credentials.visitor_id.is_some(),
            has_csrf = credentials.csrf_token.is_some(),
            "session handshake returned incomplete credentials"
        );
    }

    Ok(credentials)
}
