use std::fmt;

use serde::Serialize;

use crate::record::HarvestRecord;

/// Why a run ended with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCause {
    /// The seller/filter combination has no products.
    NoItemsFound,
    /// The run was cancelled by the caller.
    Cancelled,
    /// An upstream endpoint could not be reached or kept failing.
    Upstream,
    /// An upstream endpoint answered with an unexpected document.
    Malformed,
    /// Configuration or other local failure.
    Internal,
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCause::NoItemsFound => write!(f, "no items found"),
            ErrorCause::Cancelled => write!(f, "cancelled"),
            ErrorCause::Upstream => write!(f, "upstream failure"),
            ErrorCause::Malformed => write!(f, "malformed response"),
            ErrorCause::Internal => write!(f, "internal error"),
        }
    }
}

/// Event emitted while a harvest runs.
///
/// A run emits exactly one terminal event (`Result` or `Error`) and nothing after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Log {
        message: String,
    },
    Start {
        total: u64,
        message: String,
    },
    Progress {
        current: u64,
        total: u64,
        message: String,
    },
    Result {
        columns: Vec<String>,
        records: Vec<HarvestRecord>,
    },
    Error {
        cause: ErrorCause,
        message: String,
    },
}

impl ProgressEvent {
    pub fn log(message: impl Into<String>) -> Self {
        ProgressEvent::Log {
            message: message.into(),
        }
    }

    pub fn error(cause: ErrorCause, message: impl Into<String>) -> Self {
        ProgressEvent::Error {
            cause,
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Result { .. } | ProgressEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_string(&ProgressEvent::Progress {
            current: 3,
            total: 10,
            message: "x".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"progress","current":3,"total":10,"message":"x"}"#);

        let json =
            serde_json::to_string(&ProgressEvent::error(ErrorCause::Cancelled, "stop")).unwrap();
        assert_eq!(json, r#"{"type":"error","cause":"cancelled","message":"stop"}"#);
    }

    #[test]
    fn only_result_and_error_are_terminal() {
        assert!(!ProgressEvent::log("hi").is_terminal());
        assert!(ProgressEvent::error(ErrorCause::Upstream, "x").is_terminal());
        assert!(ProgressEvent::Result {
            columns: Vec::new(),
            records: Vec::new()
        }
        .is_terminal());
    }
}
