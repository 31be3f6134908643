//! Error types returned by the API client.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Placeholder used when an error envelope omits a field.
pub const UNKNOWN: &str = "unknown";

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Classification of a failed API response.
///
/// Produced by a [`ClassifyError`](crate::classify::ClassifyError) hook.
/// Specialized clients that need a richer taxonomy than the HTTP status
/// mapping use [`ErrorKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Any API failure without a more specific classification.
    Generic,
    /// HTTP 400
    BadRequest,
    /// HTTP 401
    Unauthorized,
    /// HTTP 403
    Forbidden,
    /// HTTP 404
    NotFound,
    /// HTTP 409
    Conflict,
    /// HTTP 429, or a domain code signalling an exhausted quota
    RateLimitExceeded,
    /// A domain code signalling request flooding, treated like 429
    TooManyRequests,
    /// HTTP 5xx
    Server,
    /// Domain-specific kind defined by a specialized client.
    Custom(String),
}

impl ErrorKind {
    /// Whether a request that failed with this kind may succeed if sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::RateLimitExceeded | ErrorKind::TooManyRequests)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Generic => write!(f, "API error"),
            ErrorKind::BadRequest => write!(f, "bad request"),
            ErrorKind::Unauthorized => write!(f, "unauthorized"),
            ErrorKind::Forbidden => write!(f, "forbidden"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::RateLimitExceeded => write!(f, "rate limit exceeded"),
            ErrorKind::TooManyRequests => write!(f, "too many requests"),
            ErrorKind::Server => write!(f, "server error"),
            ErrorKind::Custom(name) => write!(f, "{}", name),
        }
    }
}

/// A classified failure reported by the API, populated from its error envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status_code: u16,
    pub kind: ErrorKind,
    /// `error_type` or `status` from the envelope, `"unknown"` when absent.
    pub constant: String,
    /// `error` or `message` from the envelope.
    pub message: Option<String>,
    /// `errorCode` from the envelope, `"unknown"` when absent.
    pub error_code: String,
    /// `details` from the envelope, the string `"unknown"` when absent.
    pub details: Value,
    /// Raw response body.
    pub body: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (HTTP {}, {})", self.kind, self.status_code, self.constant)?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Error)]
pub enum Error {
    /// The client could not be configured (no base URL, bad proxy, bad header).
    #[error("configuration error: {0}")]
    Config(String),

    /// The API answered with an error envelope.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The API answered on the error path with a body that is not JSON.
    #[error("response from {url} is not valid JSON and cannot be decoded (HTTP {status_code})")]
    JsonDecode {
        url: String,
        status_code: u16,
        body: String,
        #[source]
        source: serde_json::Error,
    },

    /// The request did not complete within the configured timeout.
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    /// Transport failure other than a timeout.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A request body or a result could not be converted to or from JSON.
    #[error("JSON conversion failed: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl Error {
    /// HTTP status of the response that caused this error, if one was received.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api(e) => Some(e.status_code),
            Error::JsonDecode { status_code, .. } => Some(*status_code),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Raw body of the response that caused this error, if one was received.
    pub fn body(&self) -> Option<&str> {
        match self {
            Error::Api(e) => Some(&e.body),
            Error::JsonDecode { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Classification of an API error; `None` for errors that are not API responses.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            Error::Api(e) => Some(&e.kind),
            _ => None,
        }
    }

    /// Rate limits, request flooding and timeouts are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Api(e) => e.kind.is_retryable(),
            Error::Timeout { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(kind: ErrorKind) -> ApiError {
        ApiError {
            status_code: 429,
            kind,
            constant: "rate_limit".to_string(),
            message: Some("slow down".to_string()),
            error_code: UNKNOWN.to_string(),
            details: Value::String(UNKNOWN.to_string()),
            body: r#"{"error":"slow down"}"#.to_string(),
        }
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::RateLimitExceeded.is_retryable());
        assert!(ErrorKind::TooManyRequests.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::Server.is_retryable());
        assert!(!ErrorKind::Custom("quota".to_string()).is_retryable());
    }

    #[test]
    fn test_api_error_display() {
        let err = api_error(ErrorKind::RateLimitExceeded);
        assert_eq!(
            err.to_string(),
            "rate limit exceeded (HTTP 429, rate_limit): slow down"
        );

        let err = ApiError {
            message: None,
            ..api_error(ErrorKind::Custom("asset not found".to_string()))
        };
        assert_eq!(err.to_string(), "asset not found (HTTP 429, rate_limit)");
    }

    #[test]
    fn test_error_accessors() {
        let err = Error::from(api_error(ErrorKind::RateLimitExceeded));
        assert_eq!(err.status_code(), Some(429));
        assert_eq!(err.body(), Some(r#"{"error":"slow down"}"#));
        assert_eq!(err.kind(), Some(&ErrorKind::RateLimitExceeded));
        assert!(err.is_retryable());

        let err = Error::Timeout {
            url: "https://search.censys.io/api/v2".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status_code(), None);
        assert!(err.to_string().contains("timed out"));

        let err = Error::Config("No API url configured.".to_string());
        assert!(!err.is_retryable());
        assert_eq!(err.body(), None);
    }

    #[test]
    fn test_json_decode_error_carries_body() {
        let source = serde_json::from_str::<Value>("<html>").unwrap_err();
        let err = Error::JsonDecode {
            url: "https://search.censys.io/api/v2/hosts".to_string(),
            status_code: 502,
            body: "<html>".to_string(),
            source,
        };
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.body(), Some("<html>"));
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("not valid JSON"));
    }
}
