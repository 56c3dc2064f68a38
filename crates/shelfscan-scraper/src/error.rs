use thiserror::Error;

use crate::retry::Cancelled;

#[derive(Debug, Error)]
pub enum ScraperError {
    /// Network, TLS, or timeout failure from the underlying HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The back-end answered successfully but reported an application error.
    #[error("API error: {0}")]
    ApiLogic(String),

    #[error("malformed envelope from {context}: {reason}")]
    MalformedEnvelope { context: String, reason: String },

    /// A required container is missing from an otherwise valid envelope.
    #[error("unexpected response shape: missing `{path}`")]
    Shape { path: String },

    #[error("session handshake with {url} failed: {reason}")]
    Auth { url: String, reason: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("pagination limit reached: exceeded {max_pages} pages")]
    PaginationLimit { max_pages: usize },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header \"{name}\": {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] shelfscan_core::ConfigError),
}

impl ScraperError {
    /// Returns `true` for transport-class failures, the only kind worth retrying.
    ///
    /// Application errors, shape drift, auth failures and cancellation all
    /// describe conditions a retry cannot fix.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ScraperError::Transport(_) | ScraperError::UnexpectedStatus { .. }
        )
    }

    pub(crate) fn shape(path: &str) -> Self {
        ScraperError::Shape {
            path: path.to_string(),
        }
    }
}

impl From<Cancelled> for ScraperError {
    fn from(_: Cancelled) -> Self {
        ScraperError::Cancelled
    }
}
