//! Core types and utilities for userdesk

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod config;
pub mod error;
pub mod records;
pub mod types;
pub mod utils;

/// Lightweight error context for binaries
pub mod context_error {
    use std::{error::Error as StdError, fmt};

    /// An error message with an optional underlying cause
    #[derive(Debug)]
    pub struct ContextError {
        source: Option<Box<dyn StdError + Send + Sync>>,
        message: String,
    }

    impl ContextError {
        /// Create a context error from a message
        pub fn new<S: Into<String>>(message: S) -> Self {
            Self {
                source: None,
                message: message.into(),
            }
        }

        /// Wrap an existing error with a message
        pub fn with_context<E, S>(error: E, message: S) -> Self
        where
            E: StdError + Send + Sync + 'static,
            S: Into<String>,
        {
            Self {
                source: Some(Box::new(error)),
                message: message.into(),
            }
        }

        /// Message followed by every cause, separated by `: `
        #[must_use]
        pub fn chain(&self) -> String {
            let mut out = self.message.clone();
            let mut cause = StdError::source(self);
            while let Some(err) = cause {
                out.push_str(": ");
                out.push_str(&err.to_string());
                cause = err.source();
            }
            out
        }
    }

    impl fmt::Display for ContextError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl StdError for ContextError {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            self.source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn StdError + 'static))
        }
    }

    /// Result type alias for context errors
    pub type Result<T> = std::result::Result<T, ContextError>;

    /// Build a [`ContextError`] from a message or format string
    #[macro_export]
    macro_rules! context_error {
        ($msg:literal) => {
            $crate::context_error::ContextError::new($msg)
        };
        ($fmt:expr, $($arg:tt)*) => {
            $crate::context_error::ContextError::new(format!($fmt, $($arg)*))
        };
    }

    /// Extension trait for adding context to results
    pub trait ResultExt<T> {
        /// Add context to an error
        ///
        /// # Errors
        ///
        /// Returns the original error wrapped in a [`ContextError`].
        fn with_context<F, S>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> S,
            S: Into<String>;
    }

    impl<T, E> ResultExt<T> for std::result::Result<T, E>
    where
        E: StdError + Send + Sync + 'static,
    {
        fn with_context<F, S>(self, f: F) -> Result<T>
        where
            F: FnOnce() -> S,
            S: Into<String>,
        {
            self.map_err(|e| ContextError::with_context(e, f()))
        }
    }

    impl From<crate::Error> for ContextError {
        fn from(err: crate::Error) -> Self {
            let message = err.user_message();
            Self::with_context(err, message)
        }
    }

    impl From<std::io::Error> for ContextError {
        fn from(err: std::io::Error) -> Self {
            Self::with_context(err, "I/O operation failed")
        }
    }

    impl From<serde_json::Error> for ContextError {
        fn from(err: serde_json::Error) -> Self {
            Self::with_context(err, "JSON serialization failed")
        }
    }
}

// Re-export commonly used types
pub use config::{Config, LoggingConfig};
pub use error::{Error, FieldErrors, Result};
pub use records::{
    AdminProfile, Administrator, AssignedAdmin, Credentials, ExportFormat, ImportSummary,
    LoginResponse, PasswordChange, PasswordReset, Role, UserPage, UserQuery, UserRecord,
    UserStatus,
};
pub use types::{FieldDefinition, FieldKind, FieldPatch, FieldType, Schema};

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `logging.level`. Output goes to stderr so
/// command output on stdout stays machine-readable.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(logging: &LoggingConfig) -> context_error::Result<()> {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if logging.format == "json" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    installed.map_err(|e| context_error::ContextError::new(format!("Logging setup failed: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::context_error::{ContextError, ResultExt};
    use std::io;

    #[test]
    fn test_context_error_chain() {
        let result: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "userdesk.toml"));
        let err = result.with_context(|| "Failed to read config").unwrap_err();

        assert_eq!(err.to_string(), "Failed to read config");
        assert_eq!(err.chain(), "Failed to read config: userdesk.toml");
    }

    #[test]
    fn test_context_error_from_core_error() {
        let err = ContextError::from(crate::Error::remote("Field already exists"));
        assert_eq!(err.to_string(), "Field already exists");
    }

    #[test]
    fn test_context_error_macro() {
        let err = crate::context_error!("bad input: {}", 42);
        assert_eq!(err.to_string(), "bad input: 42");
    }
}
