//! Wiring shared by every command

use crate::output::{render_table, to_json};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use userdesk_client::ApiClient;
use userdesk_core::context_error::{ContextError, Result};
use userdesk_core::{Config, Error};
use userdesk_schema::table::CellFormat;
use userdesk_schema::{SchemaStore, SessionStore, TableProjector, UserDirectory};

/// Client, stores and output settings for one invocation
#[derive(Debug)]
pub struct App {
    /// Resolved configuration
    pub config: Config,
    /// Print JSON instead of tables
    pub json: bool,
    /// HTTP backend
    pub client: Arc<ApiClient>,
    /// Token and profile
    pub session: SessionStore<ApiClient>,
    /// Cached schema
    pub schema: SchemaStore<ApiClient>,
    /// Cached user pages and bulk actions
    pub directory: UserDirectory<ApiClient>,
    /// Cell rendering
    pub projector: TableProjector,
}

impl App {
    /// Build the client and stores from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: Config, json: bool) -> Result<Self> {
        let client = Arc::new(ApiClient::from_config(&config.api)?);
        let session = SessionStore::new(Arc::clone(&client));
        if let Some(token) = config.api.token.as_deref().filter(|t| !t.is_empty()) {
            session.restore(token);
        }

        Ok(Self {
            projector: TableProjector::new(CellFormat::from(&config.display)),
            schema: SchemaStore::new(Arc::clone(&client)),
            directory: UserDirectory::new(Arc::clone(&client)),
            session,
            client,
            config,
            json,
        })
    }

    /// Run a backend call with one token refresh on rejection, and turn the
    /// error into something printable
    ///
    /// # Errors
    ///
    /// Returns the reported error.
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = userdesk_core::Result<T>>,
    {
        self.session.guarded(op).await.map_err(report)
    }

    /// End the session on an authorization failure and turn the error into
    /// something printable; for calls that cannot be repeated
    ///
    /// # Errors
    ///
    /// Returns the reported error.
    pub fn guard<T>(&self, result: userdesk_core::Result<T>) -> Result<T> {
        self.session.guard(result).map_err(report)
    }

    /// Print a serializable value as JSON, or the given table
    ///
    /// # Errors
    ///
    /// Returns an error if JSON encoding fails.
    pub fn emit<T, H>(&self, value: &T, headers: &[H], rows: &[Vec<String>]) -> Result<()>
    where
        T: Serialize + ?Sized,
        H: AsRef<str>,
    {
        if self.json {
            println!("{}", to_json(value)?);
        } else {
            println!("{}", render_table(headers, rows));
        }
        Ok(())
    }
}

/// Printable form of a core error; field errors list every message
#[must_use]
pub fn report(err: Error) -> ContextError {
    match err {
        Error::FieldErrors(errors) => {
            let mut message = String::from("Validation failed");
            for (field, messages) in &errors {
                for text in messages {
                    message.push_str(&format!("\n  {field}: {text}"));
                }
            }
            ContextError::new(message)
        }
        Error::SessionEnded | Error::Unauthorized => {
            ContextError::new("Your session has expired. Run `userdesk login` and pass the new token.")
        }
        other => ContextError::from(other),
    }
}
