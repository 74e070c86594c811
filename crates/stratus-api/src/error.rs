//! Upstream request error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Request could not complete (DNS, connection, timeout).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response other than 401.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 401 response. The stored credential has already been cleared;
    /// the caller decides how to re-authenticate.
    #[error("Unauthorized - credential rejected")]
    Unauthorized,

    /// Body was not the expected JSON shape. Treated as transient.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Caller-supplied input missing required fields. Never retried,
    /// no network call attempted.
    #[error("Invalid request: {0}")]
    Validation(String),
}

impl ApiError {
    /// Whether the retry loop should attempt this request again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Http { .. } | ApiError::MalformedResponse(_) => true,
            ApiError::Unauthorized | ApiError::Validation(_) => false,
        }
    }

    /// User-friendly message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Network(_) => "Network error. Check your connection.".to_string(),
            ApiError::Http { status, .. } if *status >= 500 => {
                "The service is experiencing issues. Please try again later.".to_string()
            }
            ApiError::Http { status, .. } => format!("Request failed (HTTP {}).", status),
            ApiError::Unauthorized => "Your session has expired. Please sign in again.".to_string(),
            ApiError::MalformedResponse(_) => {
                "Received an unexpected response. Please try again.".to_string()
            }
            ApiError::Validation(msg) => format!("Invalid input: {}", msg),
        }
    }
}
