//! Error taxonomy for the harvesting pipeline.
//!
//! Failures fall into two groups:
//! - **Recoverable**: [`FetchError`] and [`ArticleError`] describe a feed or
//!   article that could not be fetched. Callers log them and move on to the
//!   next feed or URL. An [`ArticleError`] carrying HTTP 403 additionally marks
//!   the URL for retraction.
//! - **Fatal**: [`StoreError`] and [`ConfigError`] abort the current stage,
//!   since continuing after a failed write risks leaving a store half-updated.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A failure reported by a [`FeedSource`](crate::scrapers::FeedSource).
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("feed {url} unreachable (status {status:?}): {message}")]
    Transport {
        url: String,
        status: Option<u16>,
        message: String,
    },
    #[error("feed {url} timed out")]
    Timeout { url: String },
    #[error("feed {url} could not be parsed: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    /// Whether retrying the same request later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout { .. } => true,
            FetchError::Transport { status, .. } => status_is_transient(*status),
            FetchError::Parse { .. } => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                status: e.status().map(|s| s.as_u16()),
                message: e.to_string(),
            }
        }
    }
}

/// What went wrong while fetching an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleErrorKind {
    Transport,
    Timeout,
    Http,
    Extract,
}

/// A failure reported by an [`ArticleSource`](crate::scrapers::ArticleSource).
///
/// The `status_code` is the HTTP status of the response when one was received.
/// It is the only signal used to decide retraction.
#[derive(Debug, Error)]
#[error("article {url} failed ({kind:?}, status {status_code:?}): {message}")]
pub struct ArticleError {
    pub url: String,
    pub kind: ArticleErrorKind,
    pub status_code: Option<u16>,
    pub message: String,
}

impl ArticleError {
    pub fn new(
        url: impl Into<String>,
        kind: ArticleErrorKind,
        status_code: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            status_code,
            message: message.into(),
        }
    }

    /// Shorthand for an HTTP error response.
    pub fn http(url: impl Into<String>, status: u16) -> Self {
        Self::new(url, ArticleErrorKind::Http, Some(status), format!("HTTP {status}"))
    }

    /// HTTP 403: the site refuses us and will keep refusing.
    pub fn is_forbidden(&self) -> bool {
        self.status_code == Some(403)
    }

    pub fn is_transient(&self) -> bool {
        match self.kind {
            ArticleErrorKind::Timeout => true,
            ArticleErrorKind::Transport | ArticleErrorKind::Http => {
                status_is_transient(self.status_code)
            }
            ArticleErrorKind::Extract => false,
        }
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            ArticleErrorKind::Timeout
        } else {
            ArticleErrorKind::Transport
        };
        Self::new(url, kind, e.status().map(|s| s.as_u16()), e.to_string())
    }
}

/// No status means the request never got a response (connect reset, DNS...).
fn status_is_transient(status: Option<u16>) -> bool {
    match status {
        None => true,
        Some(429) => true,
        Some(s) => (500..600).contains(&s),
    }
}

/// A local filesystem failure on one of the stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("article store {path} is not valid CSV: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        StoreError::Csv {
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Anything that stops a pipeline stage for one category.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_detection_uses_status_code() {
        assert!(ArticleError::http("https://a.hu/1", 403).is_forbidden());
        assert!(!ArticleError::http("https://a.hu/1", 404).is_forbidden());

        // A message mentioning 403 must not trigger retraction on its own.
        let err = ArticleError::new(
            "https://a.hu/403-reasons",
            ArticleErrorKind::Transport,
            None,
            "connection reset while reading /403-reasons",
        );
        assert!(!err.is_forbidden());
    }

    #[test]
    fn test_article_transient_classification() {
        assert!(ArticleError::http("u", 503).is_transient());
        assert!(ArticleError::http("u", 429).is_transient());
        assert!(!ArticleError::http("u", 403).is_transient());
        assert!(!ArticleError::http("u", 404).is_transient());
        assert!(ArticleError::new("u", ArticleErrorKind::Timeout, None, "slow").is_transient());
        assert!(!ArticleError::new("u", ArticleErrorKind::Extract, Some(200), "no body").is_transient());
    }

    #[test]
    fn test_fetch_transient_classification() {
        let timeout = FetchError::Timeout { url: "u".into() };
        let parse = FetchError::Parse {
            url: "u".into(),
            message: "bad xml".into(),
        };
        let gone = FetchError::Transport {
            url: "u".into(),
            status: Some(410),
            message: "gone".into(),
        };
        let reset = FetchError::Transport {
            url: "u".into(),
            status: None,
            message: "reset".into(),
        };
        assert!(timeout.is_transient());
        assert!(!parse.is_transient());
        assert!(!gone.is_transient());
        assert!(reset.is_transient());
    }
}
