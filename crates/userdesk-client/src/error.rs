//! Error types for the HTTP client

use thiserror::Error;
use userdesk_core::Error as CoreError;

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors raised while talking to the administration API
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport failure or unreadable body
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered 401
    #[error("Unauthorized")]
    Unauthorized,

    /// The server answered with a non-success status
    #[error("API returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// `message` from the error body, or the status reason
        message: String,
    },

    /// Response body did not have the expected shape
    #[error("Unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    /// Client settings are unusable
    #[error("Invalid client configuration: {message}")]
    InvalidConfig {
        /// Error message
        message: String,
    },
}

impl ClientError {
    /// Create an API error
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Whether a GET that failed this way may be sent again
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<ClientError> for CoreError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Unauthorized | ClientError::Api { status: 401, .. } => Self::Unauthorized,
            ClientError::Api {
                status: 404,
                message,
            } => Self::NotFound { resource: message },
            ClientError::Api { status, message } => Self::Remote {
                status: Some(status),
                message,
            },
            ClientError::Http(err) => Self::Remote {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            },
            ClientError::Decode(err) => Self::Serialization(err),
            ClientError::InvalidConfig { message } => Self::Configuration { message },
        }
    }
}

impl From<ClientError> for userdesk_core::context_error::ContextError {
    fn from(err: ClientError) -> Self {
        Self::with_context(err, "API client error")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            CoreError::from(ClientError::api(401, "expired")),
            CoreError::Unauthorized
        ));
        assert!(matches!(
            CoreError::from(ClientError::api(404, "User not found")),
            CoreError::NotFound { .. }
        ));
        assert!(matches!(
            CoreError::from(ClientError::api(400, "Field already exists")),
            CoreError::Remote {
                status: Some(400),
                ..
            }
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::api(503, "down").is_retryable());
        assert!(!ClientError::api(400, "bad").is_retryable());
        assert!(!ClientError::Unauthorized.is_retryable());
    }

    #[test]
    fn test_remote_message_survives_conversion() {
        let core = CoreError::from(ClientError::api(409, "Email already in use"));
        assert_eq!(core.user_message(), "Email already in use");
    }
}
