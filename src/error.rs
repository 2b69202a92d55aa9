//! Error types for the widget pipeline.

use thiserror::Error;

/// Everything a widget operation can fail with.
///
/// The first three variants are pipeline failures: they are caught at the
/// submission boundary and turned into a system message. The rest are input
/// rejections handed back to the caller untouched.
#[derive(Debug, Error)]
pub enum WidgetError {
    /// Non-2xx status or a transport-level failure.
    #[error("network error: {message}")]
    Network {
        status: Option<u16>,
        message: String,
    },

    /// The atomic reply had neither a `message` nor a `response` string.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Reading the streamed body failed part way through.
    #[error("stream read error: {0}")]
    StreamRead(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("message is empty")]
    EmptyMessage,

    #[error("message is {length} characters, the limit is {limit}")]
    MessageTooLong { length: usize, limit: usize },

    /// A submission is already outstanding on this widget.
    #[error("widget is busy processing another message")]
    Busy,

    /// The widget task has shut down.
    #[error("widget is closed")]
    Closed,

    #[error("conversation has no assistant message in progress")]
    NoMessageInProgress,

    #[error("speech error: {0}")]
    Speech(String),
}

impl WidgetError {
    /// Whether this failure came out of the request/reply pipeline.
    pub fn is_pipeline_failure(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::MalformedResponse(_) | Self::StreamRead(_)
        )
    }

    pub(crate) fn network(err: reqwest::Error) -> Self {
        Self::Network {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for WidgetError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

/// Result type for widget operations
pub type WidgetResult<T> = Result<T, WidgetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_failures_are_classified() {
        assert!(WidgetError::StreamRead("eof".into()).is_pipeline_failure());
        assert!(WidgetError::MalformedResponse("x".into()).is_pipeline_failure());
        assert!(
            WidgetError::Network {
                status: Some(500),
                message: "boom".into()
            }
            .is_pipeline_failure()
        );
        assert!(!WidgetError::Busy.is_pipeline_failure());
        assert!(!WidgetError::EmptyMessage.is_pipeline_failure());
    }

    #[test]
    fn json_errors_become_malformed_responses() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(WidgetError::from(err), WidgetError::MalformedResponse(_)));
    }
}
