//! Provider error taxonomy shared by the embedding and LLM domains.
//!
//! Every outbound provider call resolves into a [`ProviderError`] whose
//! [`ErrorKind`] decides — in exactly one place — whether the resilience
//! layer may retry it. Call sites never classify errors ad hoc.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Closed classification of provider failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// 429 from the vendor; may carry an explicit retry hint.
    RateLimit { retry_after: Option<Duration> },
    /// The call exceeded its deadline. Distinct from a network failure.
    Timeout,
    /// 401/403 — credentials are wrong, retrying cannot help.
    Auth,
    /// The prompt does not fit the model's context window.
    ContextLengthExceeded,
    /// The vendor refused the content.
    ContentFiltered,
    /// 5xx from the vendor.
    Server { status: u16 },
    /// Any other 4xx.
    Client { status: u16 },
    /// Connection-level failure (DNS, refused, reset).
    Network,
    /// The vendor returned a body we could not interpret.
    InvalidResponse,
    /// Retry budget exhausted; message carries the last underlying error.
    MaxRetriesExceeded,
    /// Input validation failed before any network call.
    EmptyInput,
    /// The caller cancelled the call.
    Cancelled,
}

impl ErrorKind {
    /// Stable machine-readable code for logs and job records.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit { .. } => "RATE_LIMIT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Auth => "AUTH_ERROR",
            ErrorKind::ContextLengthExceeded => "CONTEXT_LENGTH_EXCEEDED",
            ErrorKind::ContentFiltered => "CONTENT_FILTERED",
            ErrorKind::Server { .. } => "SERVER_ERROR",
            ErrorKind::Client { .. } => "CLIENT_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::InvalidResponse => "INVALID_RESPONSE",
            ErrorKind::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            ErrorKind::EmptyInput => "EMPTY_INPUT",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    /// Whether the resilience layer may retry a call that failed this way.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimit { .. }
                | ErrorKind::Timeout
                | ErrorKind::Server { .. }
                | ErrorKind::Network
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A classified failure from an embedding or LLM provider.
#[derive(Debug, Error)]
#[error("{provider} [{kind}]: {message}")]
pub struct ProviderError {
    /// Provider name ("openai", "anthropic", "gemini", "ollama").
    pub provider: &'static str,
    pub kind: ErrorKind,
    pub message: String,
}

/// Seconds hint from a `retry-after` response header, if parseable.
pub fn retry_after_from_headers(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

impl ProviderError {
    pub fn new(provider: &'static str, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }

    /// Classify a non-2xx HTTP response by status code.
    ///
    /// Vendors refine context-length / content-filter cases themselves before
    /// falling back to this.
    pub fn from_status(
        provider: &'static str,
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    ) -> Self {
        let kind = match status {
            401 | 403 => ErrorKind::Auth,
            429 => ErrorKind::RateLimit { retry_after },
            500..=599 => ErrorKind::Server { status },
            _ => ErrorKind::Client { status },
        };
        Self::new(provider, kind, format!("{status}: {body}"))
    }

    /// Classify a reqwest transport error (timeout vs connection failure).
    pub fn from_reqwest(provider: &'static str, err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else {
            ErrorKind::Network
        };
        Self::new(provider, kind, err.to_string())
    }

    pub fn invalid_response(provider: &'static str, message: impl Into<String>) -> Self {
        Self::new(provider, ErrorKind::InvalidResponse, message)
    }

    pub fn empty_input(provider: &'static str) -> Self {
        Self::new(provider, ErrorKind::EmptyInput, "input must not be empty")
    }

    pub fn retryable(&self) -> bool {
        self.kind.retryable()
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Explicit retry hint from a rate-limit response, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self.kind {
            ErrorKind::RateLimit { retry_after } => retry_after,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        let auth = ProviderError::from_status("openai", 401, "bad key".into(), None);
        assert_eq!(auth.kind, ErrorKind::Auth);
        assert!(!auth.retryable());

        let server = ProviderError::from_status("openai", 503, "overloaded".into(), None);
        assert_eq!(server.kind, ErrorKind::Server { status: 503 });
        assert!(server.retryable());

        let client = ProviderError::from_status("openai", 404, "missing".into(), None);
        assert_eq!(client.kind, ErrorKind::Client { status: 404 });
        assert!(!client.retryable());
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = ProviderError::from_status(
            "anthropic",
            429,
            "slow down".into(),
            Some(Duration::from_millis(500)),
        );
        assert!(err.retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_millis(500)));
        assert_eq!(err.code(), "RATE_LIMIT");
    }

    #[test]
    fn display_includes_provider_and_code() {
        let err = ProviderError::new("gemini", ErrorKind::Timeout, "deadline exceeded");
        let text = err.to_string();
        assert!(text.contains("gemini"));
        assert!(text.contains("TIMEOUT"));
    }
}
