use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a per-item failure.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FetchFailed,
    HandlerFailed,
    Timeout,
    StorageFailed,
    InvalidInput,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FetchFailed => "fetch_failed",
            Self::HandlerFailed => "handler_failed",
            Self::Timeout => "timeout",
            Self::StorageFailed => "storage_failed",
            Self::InvalidInput => "invalid_input",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised by a fetcher before it could produce any page.
#[derive(Debug, Clone, Error)]
#[error("fetch {url}: {message}")]
pub struct FetchError {
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure of a single crawl item. `Display` is the short message written to
/// the catalog and to the event stream.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("{0}")]
    FetchFailed(String),

    #[error("handler {handler} failed: {message}")]
    HandlerFailed { handler: String, message: String },

    #[error("crawl timeout ({}s)", .0.as_secs())]
    Timeout(Duration),

    #[error("storage failed: {0}")]
    StorageFailed(#[from] StorageError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CrawlError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FetchFailed(_) => ErrorKind::FetchFailed,
            Self::HandlerFailed { .. } => ErrorKind::HandlerFailed,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::StorageFailed(_) => ErrorKind::StorageFailed,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    pub fn handler(handler: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerFailed {
            handler: handler.into(),
            message: message.into(),
        }
    }
}

impl From<FetchError> for CrawlError {
    fn from(err: FetchError) -> Self {
        Self::FetchFailed(err.to_string())
    }
}
