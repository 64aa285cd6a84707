//! Provider error taxonomy and retry classification.
//!
//! Every adapter maps its backend's failures into [`ProviderError`] so the
//! orchestrator can make one decision per failure: retry in place
//! ([`ProviderError::is_retryable`]), or fail the role and advance to the
//! next one in the sequence. Adapters never retry internally.

use regex::Regex;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by provider adapters.
///
/// These carry enough structure (message, HTTP-like status) for the
/// orchestrator to classify them without string matching at call sites.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Rate limit exceeded - retryable with backoff.
    #[error("Rate limit exceeded: {message} (retry after {retry_after_secs}s)")]
    RateLimited {
        message: String,
        retry_after_secs: u64,
    },

    /// Backend reports it is overloaded - retryable.
    #[error("Provider overloaded: {message}")]
    Overloaded { message: String },

    /// Timeout waiting for response - retryable.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// Network/connection error - retryable.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Server-side error (HTTP 5xx) - retryable.
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Authentication failed - not retryable, fails the role immediately.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// Invalid request (4xx other than 429) - not retryable.
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Response body could not be understood - not retryable.
    #[error("Invalid provider response: {message}")]
    InvalidResponse { message: String },

    /// The adapter does not implement the requested operation.
    #[error("Provider '{provider}' does not support {operation}")]
    Unsupported { provider: String, operation: String },
}

impl ProviderError {
    /// Check if this error class should be retried in place.
    ///
    /// Matches the transient classes: rate-limit, overload, timeout,
    /// network error, HTTP 429/5xx.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::Overloaded { .. }
                | Self::Timeout { .. }
                | Self::Connection { .. }
                | Self::Server { .. }
        )
    }

    /// Classify an HTTP-like status code and response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let body_lower = body.to_lowercase();

        match status {
            429 => {
                let retry_after = Self::extract_retry_after(body).unwrap_or(60);
                Self::RateLimited {
                    message: body.to_string(),
                    retry_after_secs: retry_after,
                }
            }
            401 | 403 => Self::Authentication {
                message: body.to_string(),
            },
            400..=499 => Self::InvalidRequest {
                message: body.to_string(),
            },
            529 => Self::Overloaded {
                message: body.to_string(),
            },
            500..=599 => {
                if body_lower.contains("overload") {
                    Self::Overloaded {
                        message: body.to_string(),
                    }
                } else {
                    Self::Server {
                        status,
                        message: body.to_string(),
                    }
                }
            }
            _ => Self::InvalidResponse {
                message: format!("HTTP {status}: {body}"),
            },
        }
    }

    /// Get the recommended retry delay if the backend supplied one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }

    /// Extract retry-after seconds from an error response body.
    fn extract_retry_after(body: &str) -> Option<u64> {
        let patterns = [
            r"retry.?after[:\s]+(\d+)",
            r"wait[:\s]+(\d+)",
            r"(\d+)\s*seconds?",
        ];

        let lower = body.to_lowercase();
        for pattern in patterns {
            if let Ok(re) = Regex::new(pattern) {
                if let Some(caps) = re.captures(&lower) {
                    if let Some(m) = caps.get(1) {
                        if let Ok(secs) = m.as_str().parse::<u64>() {
                            return Some(secs);
                        }
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(ProviderError::RateLimited {
            message: "slow down".into(),
            retry_after_secs: 30,
        }
        .is_retryable());
        assert!(ProviderError::Overloaded {
            message: "busy".into()
        }
        .is_retryable());
        assert!(ProviderError::Timeout { timeout_secs: 120 }.is_retryable());
        assert!(ProviderError::Connection {
            message: "refused".into()
        }
        .is_retryable());
        assert!(ProviderError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_non_retryable_classes() {
        assert!(!ProviderError::Authentication {
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!ProviderError::InvalidRequest {
            message: "bad payload".into()
        }
        .is_retryable());
        assert!(!ProviderError::InvalidResponse {
            message: "garbage".into()
        }
        .is_retryable());
        assert!(!ProviderError::Unsupported {
            provider: "local".into(),
            operation: "structured output".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_from_status_429_extracts_retry_after() {
        let err = ProviderError::from_status(429, "rate limited, retry after 17 seconds");
        match err {
            ProviderError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 17),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_from_status_429_defaults_to_60s() {
        let err = ProviderError::from_status(429, "too many requests");
        match err {
            ProviderError::RateLimited {
                retry_after_secs, ..
            } => assert_eq!(retry_after_secs, 60),
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_from_status_auth() {
        assert!(matches!(
            ProviderError::from_status(401, "invalid x-api-key"),
            ProviderError::Authentication { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(403, "forbidden"),
            ProviderError::Authentication { .. }
        ));
    }

    #[test]
    fn test_from_status_4xx_is_invalid_request() {
        let err = ProviderError::from_status(400, "missing field");
        assert!(matches!(err, ProviderError::InvalidRequest { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_status_5xx_is_server_error() {
        let err = ProviderError::from_status(502, "bad gateway");
        assert!(matches!(err, ProviderError::Server { status: 502, .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_status_529_and_overload_body() {
        assert!(matches!(
            ProviderError::from_status(529, "site overloaded"),
            ProviderError::Overloaded { .. }
        ));
        assert!(matches!(
            ProviderError::from_status(500, "model overloaded, try later"),
            ProviderError::Overloaded { .. }
        ));
    }

    #[test]
    fn test_retry_after_only_for_rate_limits() {
        let limited = ProviderError::from_status(429, "wait 5 seconds");
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(5)));

        let server = ProviderError::from_status(500, "oops");
        assert_eq!(server.retry_after(), None);
    }
}
