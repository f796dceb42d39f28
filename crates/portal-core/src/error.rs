//! Error types for `portal-core`.
//!
//! [`ApiError`] is the only place a 401 is recognized; every consumer asks
//! [`ApiError::is_unauthorized`] instead of inspecting status codes.

/// Fallback message when a failed response carries no readable message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Request failed";

/// Errors from the remote dashboard API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered 401. Routed through forced logout, never shown
    /// as a view error.
    #[error("{message}")]
    Unauthorized { message: String },

    /// Any other non-success status. `message` is the server's own text.
    #[error("{message}")]
    Status { status: u16, message: String },

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Network or HTTP client error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body was not the JSON we expected.
    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),

    /// The response parsed but lacks a required field.
    #[error("{reason}")]
    InvalidResponse { reason: String },
}

impl ApiError {
    /// Whether this failure is the distinguished "unauthorized" signal.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// HTTP status of the failure, when the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Build the error for a non-success status and extracted message.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        if status == 401 {
            Self::Unauthorized { message }
        } else {
            Self::Status { status, message }
        }
    }
}

/// Errors from sign-in and registration.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Another login or register request is still in flight.
    #[error("a sign-in request is already in progress")]
    Pending,

    /// The credentials were rejected before any request was made.
    #[error("{0}")]
    Validation(String),

    /// The server rejected the request or could not be reached.
    #[error(transparent)]
    Api(#[from] ApiError),
}
