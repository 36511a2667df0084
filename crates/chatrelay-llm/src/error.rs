use http::StatusCode;
use thiserror::Error;

use crate::protocol::openai::OpenAiErrorResponse;

/// Errors that can occur while generating a completion
#[derive(Debug, Error)]
pub enum LlmError {
    /// Provider configuration is missing or unusable
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Backend rejected the credentials (401/403)
    #[error("authentication failed ({status}): {message}")]
    Authentication {
        /// HTTP status returned by the backend
        status: u16,
        /// Backend-provided error message
        message: String,
    },

    /// Backend is rate limiting this client (429)
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds the backend asked us to wait, if it said
        retry_after: Option<u64>,
    },

    /// Connection failure or 5xx/408 response
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// The network call exceeded the configured timeout
    #[error("request timed out")]
    Timeout,

    /// Request was rejected as malformed, or call options are invalid
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Backend returned something that is not a usable completion
    #[error("upstream error: {0}")]
    Upstream(String),

    /// A single event had an unsupported shape; recovered by skipping it
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Response stream died before completion
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The non-streaming retry after an interruption failed as well
    #[error("stream interrupted ({original}) and non-streaming fallback failed ({fallback})")]
    FallbackFailed {
        /// Interruption that triggered the fallback
        original: Box<LlmError>,
        /// Failure of the fallback request
        fallback: Box<LlmError>,
    },

    /// Caller cancelled the generation
    #[error("generation cancelled")]
    Cancelled,

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether the transport may retry the request with backoff
    ///
    /// Only failures that happen before any response body was consumed
    /// reach the retry loop, so a retry never duplicates output. A timeout
    /// while reading a stream is never seen there.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient(_) | Self::Timeout)
    }

    /// Whether this failure qualifies for the one-shot non-streaming fallback
    pub const fn triggers_fallback(&self) -> bool {
        matches!(self, Self::StreamInterrupted(_))
    }

    /// Whether the caller asked for this outcome
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classify a non-success HTTP response
    pub fn from_status(status: StatusCode, body: &str, retry_after: Option<u64>) -> Self {
        let message = error_message(body);

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Authentication {
                status: status.as_u16(),
                message,
            },
            StatusCode::TOO_MANY_REQUESTS => Self::RateLimited { retry_after },
            StatusCode::REQUEST_TIMEOUT => Self::Transient(format!("provider returned {status}: {message}")),
            s if s.is_server_error() => Self::Transient(format!("provider returned {status}: {message}")),
            _ => Self::InvalidRequest(format!("provider returned {status}: {message}")),
        }
    }

    /// Classify a failure to send a request or read a full response body
    pub fn from_request(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Upstream(format!("failed to decode response: {err}"))
        } else {
            Self::Transient(err.to_string())
        }
    }
}

/// Extract the human-readable message from an error body
///
/// Falls back to the raw body for backends that do not use the
/// `{"error": {"message": ...}}` envelope.
fn error_message(body: &str) -> String {
    serde_json::from_str::<OpenAiErrorResponse>(body).map_or_else(|_| body.trim().to_owned(), |e| e.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_authentication() {
        let err = LlmError::from_status(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#,
            None,
        );

        match err {
            LlmError::Authentication { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("expected authentication error, got {other:?}"),
        }
    }

    #[test]
    fn authentication_never_retries_or_falls_back() {
        let err = LlmError::from_status(StatusCode::FORBIDDEN, "forbidden", None);
        assert!(!err.is_retryable());
        assert!(!err.triggers_fallback());
    }

    #[test]
    fn rate_limit_keeps_retry_after() {
        let err = LlmError::from_status(StatusCode::TOO_MANY_REQUESTS, "", Some(7));
        assert!(matches!(err, LlmError::RateLimited { retry_after: Some(7) }));
        assert!(err.is_retryable());
    }

    #[test]
    fn server_errors_are_transient() {
        for status in [StatusCode::BAD_GATEWAY, StatusCode::SERVICE_UNAVAILABLE, StatusCode::REQUEST_TIMEOUT] {
            let err = LlmError::from_status(status, "oops", None);
            assert!(err.is_retryable(), "{status} should be retryable");
        }
    }

    #[test]
    fn timeouts_retry_but_never_fall_back() {
        assert!(LlmError::Timeout.is_retryable());
        assert!(!LlmError::Timeout.triggers_fallback());
    }

    #[test]
    fn other_client_errors_are_invalid_requests() {
        let err = LlmError::from_status(StatusCode::BAD_REQUEST, "plain text body\n", None);
        match err {
            LlmError::InvalidRequest(message) => assert!(message.ends_with("plain text body")),
            other => panic!("expected invalid request, got {other:?}"),
        }
    }

    #[test]
    fn only_interruption_triggers_fallback() {
        assert!(LlmError::StreamInterrupted("closed".to_owned()).triggers_fallback());
        assert!(!LlmError::Timeout.triggers_fallback());
        assert!(!LlmError::Transient("reset".to_owned()).triggers_fallback());
        assert!(!LlmError::Cancelled.triggers_fallback());
    }

    #[test]
    fn fallback_failure_mentions_both_causes() {
        let err = LlmError::FallbackFailed {
            original: Box::new(LlmError::StreamInterrupted("connection reset".to_owned())),
            fallback: Box::new(LlmError::Timeout),
        };
        let text = err.to_string();
        assert!(text.contains("connection reset"));
        assert!(text.contains("timed out"));
    }
}
