//! Error types for userdesk

use indexmap::IndexMap;
use std::{error::Error as StdError, fmt};

/// Per-field validation messages, keyed by field name in display order
pub type FieldErrors = IndexMap<String, Vec<String>>;

/// Main error type for userdesk
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Configuration {
        /// Error message
        message: String,
    },

    /// Validation error for a single field or schema definition
    Validation {
        /// Field that failed validation
        field: String,
        /// Validation error message
        message: String,
    },

    /// One or more form fields failed validation
    FieldErrors(FieldErrors),

    /// Mutation attempted on a protected schema field
    ProtectedField {
        /// Protected field name
        field: String,
    },

    /// Schema field declared with a type this crate does not know
    SchemaType {
        /// Field name
        field: String,
        /// Raw type name as received
        type_name: String,
    },

    /// Remote API call failed
    Remote {
        /// HTTP status, when the server answered
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// Backend rejected the credentials or token
    Unauthorized,

    /// Session was torn down after an authorization failure
    SessionEnded,

    /// A submit is already in flight for this form
    SubmitInProgress,

    /// Not found error
    NotFound {
        /// Resource that was not found
        resource: String,
    },

    /// Serialization error
    Serialization(serde_json::Error),

    /// Other error
    Other(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a [`Error::Validation`] error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::Remote`] error without a status code
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote {
            status: None,
            message: message.into(),
        }
    }

    /// Whether the error should end the current session
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Whether the error stays local to a form and never reached the network
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::FieldErrors(_)
                | Self::ProtectedField { .. }
                | Self::SubmitInProgress
        )
    }

    /// Message suitable for a transient notification
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Remote { message, .. } if !message.is_empty() => message.clone(),
            Self::Remote { .. } => "Something went wrong. Please try again.".to_string(),
            Self::ProtectedField { field } => {
                format!("'{field}' is a core field and cannot be changed")
            }
            Self::Unauthorized | Self::SessionEnded => {
                "Your session has expired. Please sign in again.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Configuration { message } => write!(f, "Configuration error: {message}"),
            Self::Validation { field, message } => {
                write!(f, "Validation error: {field} - {message}")
            }
            Self::FieldErrors(errors) => {
                let fields: Vec<&str> = errors.keys().map(String::as_str).collect();
                write!(
                    f,
                    "Validation failed for {} field(s): {}",
                    errors.len(),
                    fields.join(", ")
                )
            }
            Self::ProtectedField { field } => {
                write!(f, "Field '{field}' is protected and cannot be modified")
            }
            Self::SchemaType { field, type_name } => {
                write!(f, "Unsupported type '{type_name}' for field '{field}'")
            }
            Self::Remote {
                status: Some(status),
                message,
            } => write!(f, "Remote call failed ({status}): {message}"),
            Self::Remote {
                status: None,
                message,
            } => write!(f, "Remote call failed: {message}"),
            Self::Unauthorized => write!(f, "Unauthorized"),
            Self::SessionEnded => write!(f, "Session ended"),
            Self::SubmitInProgress => write!(f, "A submission is already in progress"),
            Self::NotFound { resource } => write!(f, "Resource not found: {resource}"),
            Self::Serialization(err) => write!(f, "Serialization error: {err}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

// From implementations for automatic conversions
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}

impl From<FieldErrors> for Error {
    fn from(errors: FieldErrors) -> Self {
        Self::FieldErrors(errors)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::uninlined_format_args
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io;

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let app_error = Error::from(io_error);

        match app_error {
            Error::Io(_) => {}
            _ => panic!("Expected Io error variant"),
        }

        assert!(format!("{}", app_error).contains("I/O error"));
        assert!(app_error.source().is_some());
    }

    #[test]
    fn test_validation_error() {
        let error = Error::validation("age", "Minimum value is 18");
        assert_eq!(
            format!("{}", error),
            "Validation error: age - Minimum value is 18"
        );
        assert!(error.is_local());
    }

    #[test]
    fn test_field_errors_display() {
        let mut errors = FieldErrors::new();
        errors.insert("name".to_string(), vec!["name is required".to_string()]);
        errors.insert("age".to_string(), vec!["Minimum value is 18".to_string()]);

        let error = Error::from(errors);
        assert_eq!(
            error.to_string(),
            "Validation failed for 2 field(s): name, age"
        );
    }

    #[test]
    fn test_protected_field_error() {
        let error = Error::ProtectedField {
            field: "status".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Field 'status' is protected and cannot be modified"
        );
        assert!(error.is_local());
        assert!(error.user_message().contains("core field"));
    }

    #[test]
    fn test_schema_type_error() {
        let error = Error::SchemaType {
            field: "tags".to_string(),
            type_name: "Mixed".to_string(),
        };
        assert_eq!(error.to_string(), "Unsupported type 'Mixed' for field 'tags'");
    }

    #[test]
    fn test_remote_error_display() {
        let error = Error::Remote {
            status: Some(500),
            message: "Internal error".to_string(),
        };
        assert_eq!(error.to_string(), "Remote call failed (500): Internal error");
        assert_eq!(error.user_message(), "Internal error");
        assert!(!error.is_local());

        let error = Error::remote("");
        assert_eq!(error.user_message(), "Something went wrong. Please try again.");
    }

    #[test]
    fn test_unauthorized_flags() {
        assert!(Error::Unauthorized.is_unauthorized());
        assert!(!Error::SessionEnded.is_unauthorized());
        assert!(Error::SessionEnded.user_message().contains("sign in"));
    }

    #[test]
    fn test_serialization_error_source() {
        let json_error = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let app_error = Error::from(json_error);

        assert!(app_error.to_string().contains("Serialization error"));
        assert!(app_error.source().is_some());
    }

    #[test]
    fn test_error_source_for_plain_variants() {
        assert!(Error::SubmitInProgress.source().is_none());
        assert!(
            Error::NotFound {
                resource: "user 42".to_string()
            }
            .source()
            .is_none()
        );
    }
}
