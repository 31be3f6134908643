//! Mapping of failed responses to an [`ErrorKind`].
//!
//! The base client only knows HTTP status codes. Clients for a specific API
//! surface supply their own [`ClassifyError`] to map domain error codes onto a
//! richer taxonomy.

use reqwest::StatusCode;

use crate::error::ErrorKind;

/// What a classifier gets to look at for a failed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub status: u16,
    /// `errorCode` from the error envelope, `"unknown"` when absent.
    pub error_code: String,
    /// `error_type` or `status` from the error envelope, `"unknown"` when absent.
    pub constant: String,
}

#[cfg_attr(test, mockall::automock)]
pub trait ClassifyError: Send + Sync {
    fn classify(&self, context: &ErrorContext) -> ErrorKind;
}

impl<F> ClassifyError for F
where
    F: Fn(&ErrorContext) -> ErrorKind + Send + Sync,
{
    fn classify(&self, context: &ErrorContext) -> ErrorKind {
        self(context)
    }
}

/// Maps HTTP status codes to error kinds. This is the default classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusClassifier;

impl ClassifyError for StatusClassifier {
    fn classify(&self, context: &ErrorContext) -> ErrorKind {
        let Ok(status) = StatusCode::from_u16(context.status) else {
            return ErrorKind::Generic;
        };

        match status {
            StatusCode::BAD_REQUEST => ErrorKind::BadRequest,
            StatusCode::UNAUTHORIZED => ErrorKind::Unauthorized,
            StatusCode::FORBIDDEN => ErrorKind::Forbidden,
            StatusCode::NOT_FOUND => ErrorKind::NotFound,
            StatusCode::CONFLICT => ErrorKind::Conflict,
            StatusCode::TOO_MANY_REQUESTS => ErrorKind::RateLimitExceeded,
            s if s.is_server_error() => ErrorKind::Server,
            // 200 with an error key, and other statuses, stay generic
            _ => ErrorKind::Generic,
        }
    }
}

/// Classifies every failure as [`ErrorKind::Generic`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericClassifier;

impl ClassifyError for GenericClassifier {
    fn classify(&self, _context: &ErrorContext) -> ErrorKind {
        ErrorKind::Generic
    }
}
