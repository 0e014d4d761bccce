//! Client-facing error taxonomy

use std::fmt;
use std::time::Duration;

use crate::domain::validation::FieldErrors;

/// What the server said about a failure, when it said anything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorInfo {
    /// Machine-readable code (`VALIDATION_ERROR`, `NOT_FOUND`, ...)
    pub code: Option<String>,
    /// Server message; logged, not shown verbatim
    pub message: Option<String>,
    /// Server's own retry hint, overrides the status-based default
    pub retriable: Option<bool>,
    /// Correlation id for support requests
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// 401
    Unauthenticated,
    /// 403
    Forbidden,
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::Unauthenticated => f.write_str("not authenticated"),
            AuthFailure::Forbidden => f.write_str("forbidden"),
        }
    }
}

/// Every way a request can fail, from the caller's point of view
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApiError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("Validation failed ({} field(s))", .fields.len())]
    Validation { info: ErrorInfo, fields: FieldErrors },

    #[error("Authentication error: {kind}")]
    Auth { kind: AuthFailure, info: ErrorInfo },

    #[error("Not found")]
    NotFound { info: ErrorInfo },

    #[error("Conflict")]
    Conflict { info: ErrorInfo },

    #[error("Rate limited")]
    RateLimited { info: ErrorInfo },

    #[error("Server error: HTTP {status}")]
    Server { status: u16, info: ErrorInfo },

    #[error("Unknown error (status {status:?})")]
    Unknown { status: Option<u16>, info: ErrorInfo },

    #[error("Unexpected client error: {message}")]
    Unexpected { message: String },
}

impl ApiError {
    /// Map an HTTP failure status plus the parsed body onto the taxonomy
    pub fn from_status(status: u16, info: ErrorInfo, fields: FieldErrors) -> Self {
        match status {
            401 => ApiError::Auth { kind: AuthFailure::Unauthenticated, info },
            403 => ApiError::Auth { kind: AuthFailure::Forbidden, info },
            404 => ApiError::NotFound { info },
            409 => ApiError::Conflict { info },
            400 | 422 if !fields.is_empty() || status == 422 => ApiError::Validation { info, fields },
            429 => ApiError::RateLimited { info },
            500..=599 => ApiError::Server { status, info },
            _ => ApiError::Unknown { status: Some(status), info },
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network { message: message.into() }
    }

    pub fn info(&self) -> Option<&ErrorInfo> {
        match self {
            ApiError::Validation { info, .. }
            | ApiError::Auth { info, .. }
            | ApiError::NotFound { info }
            | ApiError::Conflict { info }
            | ApiError::RateLimited { info }
            | ApiError::Server { info, .. }
            | ApiError::Unknown { info, .. } => Some(info),
            ApiError::Network { .. } | ApiError::Timeout { .. } | ApiError::Unexpected { .. } => None,
        }
    }

    /// HTTP status, when a response was received
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Validation { .. } => Some(422),
            ApiError::Auth { kind: AuthFailure::Unauthenticated, .. } => Some(401),
            ApiError::Auth { kind: AuthFailure::Forbidden, .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Conflict { .. } => Some(409),
            ApiError::RateLimited { .. } => Some(429),
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Unknown { status, .. } => *status,
            ApiError::Network { .. } | ApiError::Timeout { .. } | ApiError::Unexpected { .. } => None,
        }
    }

    pub fn code(&self) -> &str {
        if let Some(code) = self.info().and_then(|i| i.code.as_deref()) {
            return code;
        }
        match self {
            ApiError::Network { .. } => "NETWORK_ERROR",
            ApiError::Timeout { .. } => "TIMEOUT",
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::Auth { kind: AuthFailure::Unauthenticated, .. } => "AUTHENTICATION_ERROR",
            ApiError::Auth { kind: AuthFailure::Forbidden, .. } => "AUTHORIZATION_ERROR",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::Conflict { .. } => "CONFLICT",
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Server { status: 503, .. } => "SERVICE_UNAVAILABLE",
            ApiError::Server { .. } => "SERVER_ERROR",
            ApiError::Unknown { .. } => "UNKNOWN_ERROR",
            ApiError::Unexpected { .. } => "UNEXPECTED_ERROR",
        }
    }

    pub fn request_id(&self) -> Option<&str> {
        self.info().and_then(|i| i.request_id.as_deref())
    }

    /// Raw server message, for logs only
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Network { message } | ApiError::Unexpected { message } => Some(message),
            _ => self.info().and_then(|i| i.message.as_deref()),
        }
    }

    pub fn fields(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Validation { fields, .. } => Some(fields),
            _ => None,
        }
    }

    pub fn is_retriable(&self) -> bool {
        if let Some(hint) = self.info().and_then(|i| i.retriable) {
            return hint;
        }
        match self {
            ApiError::Network { .. } | ApiError::Timeout { .. } | ApiError::RateLimited { .. } => true,
            ApiError::Server { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            ApiError::Validation { .. }
            | ApiError::Auth { .. }
            | ApiError::NotFound { .. }
            | ApiError::Conflict { .. }
            | ApiError::Unknown { .. }
            | ApiError::Unexpected { .. } => false,
        }
    }

    /// Short message safe to show to a user
    pub fn user_message(&self) -> &'static str {
        match self {
            ApiError::Network { .. } => "Unable to reach the server.",
            ApiError::Timeout { .. } => "The request took too long to complete.",
            ApiError::Validation { .. } => "Some of the information provided is invalid.",
            ApiError::Auth { kind: AuthFailure::Unauthenticated, .. } => "Your session has expired.",
            ApiError::Auth { kind: AuthFailure::Forbidden, .. } => "You don't have permission to do that.",
            ApiError::NotFound { .. } => "We couldn't find what you were looking for.",
            ApiError::Conflict { .. } => "This record was changed by someone else.",
            ApiError::RateLimited { .. } => "Too many requests.",
            ApiError::Server { status: 503, .. } => "The service is temporarily unavailable.",
            ApiError::Server { .. } => "Something went wrong on our end.",
            ApiError::Unknown { .. } | ApiError::Unexpected { .. } => "An unexpected error occurred.",
        }
    }

    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            ApiError::Network { .. } => Some("Check your connection and try again."),
            ApiError::Timeout { .. } => Some("Try again in a moment."),
            ApiError::Validation { .. } => Some("Correct the highlighted fields and resubmit."),
            ApiError::Auth { kind: AuthFailure::Unauthenticated, .. } => Some("Log in again."),
            ApiError::Auth { kind: AuthFailure::Forbidden, .. } => None,
            ApiError::NotFound { .. } => Some("It may have been deleted."),
            ApiError::Conflict { .. } => Some("Reload to see the latest version."),
            ApiError::RateLimited { .. } => Some("Wait a minute before retrying."),
            ApiError::Server { .. } => Some("Try again later."),
            ApiError::Unknown { .. } | ApiError::Unexpected { .. } => None,
        }
    }
}

/// Failures that are not expected HTTP outcomes
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Malformed response body (HTTP {status}): {message}")]
    Decode { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        ApiError::Unexpected { message: err.to_string() }
    }
}
