use std::fmt;

use harvest_core::ErrorCause;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutput {
    pub bytes: Vec<u8>,
    pub metadata: FetchMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchMetadata {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub byte_len: u64,
}

/// One failed HTTP attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FailureKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Timeouts, connection failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            FailureKind::Timeout | FailureKind::Network | FailureKind::RateLimited => true,
            FailureKind::HttpStatus(code) => code >= 500,
            FailureKind::InvalidUrl | FailureKind::TooLarge { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self.kind {
            FailureKind::HttpStatus(code) => Some(code),
            FailureKind::RateLimited => Some(429),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    RateLimited,
    Timeout,
    TooLarge { max_bytes: u64, actual: Option<u64> },
    Network,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::RateLimited => write!(f, "rate limited"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
            FailureKind::Network => write!(f, "network error"),
        }
    }
}

/// Run-level failures.
///
/// Count and route-map failures end the run; page and card failures are
/// absorbed where they happen and only reach the caller as log events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HarvestError {
    #[error("transport error for {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("rate limited by {url}")]
    RateLimited { url: String },
    #[error("{url} answered with status {status}")]
    NotFound { url: String, status: u16 },
    #[error("no items found for seller {seller_id}")]
    NoItemsFound { seller_id: String },
    #[error("giving up on {url} after {attempts} attempts: {last}")]
    RetryExhausted {
        url: String,
        attempts: u32,
        last: FetchError,
    },
    #[error("unexpected response from {context}: {message}")]
    MalformedResponse { context: String, message: String },
    #[error("harvest cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl HarvestError {
    /// Classifies a single failed attempt that will not be retried.
    pub fn from_fetch(url: &str, err: FetchError) -> Self {
        match err.kind {
            FailureKind::RateLimited => HarvestError::RateLimited {
                url: url.to_owned(),
            },
            FailureKind::HttpStatus(status) if (400..500).contains(&status) => {
                HarvestError::NotFound {
                    url: url.to_owned(),
                    status,
                }
            }
            _ => HarvestError::Transport {
                url: url.to_owned(),
                source: err,
            },
        }
    }

    pub fn malformed(context: impl Into<String>, message: impl fmt::Display) -> Self {
        HarvestError::MalformedResponse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn cause(&self) -> ErrorCause {
        match self {
            HarvestError::NoItemsFound { .. } => ErrorCause::NoItemsFound,
            HarvestError::Cancelled => ErrorCause::Cancelled,
            HarvestError::MalformedResponse { .. } => ErrorCause::Malformed,
            HarvestError::Config(_) => ErrorCause::Internal,
            HarvestError::Transport { .. }
            | HarvestError::RateLimited { .. }
            | HarvestError::NotFound { .. }
            | HarvestError::RetryExhausted { .. } => ErrorCause::Upstream,
        }
    }
}
