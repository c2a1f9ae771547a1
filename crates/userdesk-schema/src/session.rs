//! Session container
//!
//! Holds the bearer token and signed-in profile as explicit, injectable state
//! and broadcasts changes over a `watch` channel. A call run through
//! [`SessionStore::guarded`] that is rejected as unauthorized gets one token
//! refresh and one retry. When that does not help the session is torn down
//! and the call reports [`Error::SessionEnded`], which front ends treat as
//! "go back to sign-in".

use crate::backend::AdminBackend;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use userdesk_core::{
    AdminProfile, Credentials, Error, PasswordChange, PasswordReset, Result, Role,
};

/// Route of the sign-in entry point
pub const LOGIN_ROUTE: &str = "/login";

/// A signed-in session
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Bearer token
    pub token: String,
    /// Profile, unknown when the session was restored from a bare token
    pub admin: Option<AdminProfile>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("admin", &self.admin)
            .finish()
    }
}

/// Owned session state shared by every component that talks to the backend
#[derive(Debug)]
pub struct SessionStore<B: ?Sized> {
    backend: Arc<B>,
    state: watch::Sender<Option<Session>>,
}

impl<B: AdminBackend + ?Sized> SessionStore<B> {
    /// Create a signed-out store
    pub fn new(backend: Arc<B>) -> Self {
        let (state, _) = watch::channel(None);
        Self { backend, state }
    }

    /// Resume a session from a previously issued token
    pub fn restore(&self, token: impl Into<String>) {
        let token = token.into();
        self.backend.set_token(Some(token.clone()));
        self.state.send_replace(Some(Session { token, admin: None }));
    }

    /// Exchange credentials for a session
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] for rejected credentials or the
    /// backend error; the previous state is kept.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<AdminProfile> {
        let response = self.backend.login(credentials).await?;
        self.backend.set_token(Some(response.token.clone()));
        info!(
            admin = %response.admin.username,
            role = ?response.admin.role,
            "signed in"
        );
        self.state.send_replace(Some(Session {
            token: response.token,
            admin: Some(response.admin.clone()),
        }));
        Ok(response.admin)
    }

    /// Swap the current token for a fresh one
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionEnded`] when the token was rejected, or the
    /// backend error.
    pub async fn refresh(&self) -> Result<()> {
        let response = self.guard(self.backend.refresh_token().await)?;
        self.backend.set_token(Some(response.token.clone()));
        info!(admin = %response.admin.username, "token refreshed");
        self.state.send_replace(Some(Session {
            token: response.token,
            admin: Some(response.admin),
        }));
        Ok(())
    }

    /// Run a backend call, refreshing the token once if it is rejected
    ///
    /// An unauthorized result while signed in triggers one refresh and one
    /// retry of `op`. A failed refresh ends the session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionEnded`] when the retry is rejected too or the
    /// refresh fails; other errors pass through unchanged.
    pub async fn guarded<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match op().await {
            Err(err) if err.is_unauthorized() && self.is_signed_in() => {
                debug!("authorization rejected, refreshing token");
                match self.refresh().await {
                    Ok(()) => self.guard(op().await),
                    Err(err) => {
                        warn!(error = %err, "token refresh failed, ending session");
                        self.teardown();
                        Err(Error::SessionEnded)
                    }
                }
            }
            other => self.guard(other),
        }
    }

    /// Ask the server to email a password reset link
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank email, or the backend error.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(Error::validation("email", "Email is required"));
        }
        self.backend.forgot_password(email).await?;
        info!(%email, "password reset requested");
        Ok(())
    }

    /// Set a new password with a reset token
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a blank token or password, or the
    /// backend error.
    pub async fn reset_password(&self, reset: &PasswordReset) -> Result<()> {
        if reset.token.trim().is_empty() {
            return Err(Error::validation("token", "Reset token is required"));
        }
        if reset.password.is_empty() {
            return Err(Error::validation("password", "Password is required"));
        }
        self.backend.reset_password(reset).await?;
        info!("password reset");
        Ok(())
    }

    /// Change the signed-in administrator's password
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the new password is blank or equals
    /// the current one, or the backend error.
    pub async fn change_password(&self, change: &PasswordChange) -> Result<()> {
        if change.new_password.is_empty() {
            return Err(Error::validation("newPassword", "New password is required"));
        }
        if change.new_password == change.current_password {
            return Err(Error::validation(
                "newPassword",
                "New password must differ from the current one",
            ));
        }
        self.backend.change_password(change).await?;
        info!("password changed");
        Ok(())
    }

    /// Update the signed-in profile; the session keeps the returned copy
    ///
    /// # Errors
    ///
    /// Returns the backend error; the session is left unchanged.
    pub async fn update_profile(&self, data: &Map<String, Value>) -> Result<AdminProfile> {
        let profile = self.backend.update_profile(data).await?;
        self.state.send_if_modified(|state| match state {
            Some(session) => {
                session.admin = Some(profile.clone());
                true
            }
            None => false,
        });
        info!(admin = %profile.username, "profile updated");
        Ok(profile)
    }

    /// Sign out; the local session ends even if the remote call fails
    pub async fn sign_out(&self) {
        if self.token().is_some()
            && let Err(err) = self.backend.logout().await
        {
            warn!(error = %err, "remote logout failed, clearing local session anyway");
        }
        self.teardown();
        info!("signed out");
    }

    /// Drop all session state and the backend token
    pub fn teardown(&self) {
        self.backend.set_token(None);
        self.state.send_replace(None);
    }

    /// Pass a result through, ending the session on an authorization failure
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionEnded`] in place of [`Error::Unauthorized`];
    /// other errors pass through unchanged.
    pub fn guard<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Err(err) if err.is_unauthorized() => {
                warn!("authorization rejected, ending session");
                self.teardown();
                Err(Error::SessionEnded)
            }
            other => other,
        }
    }

    /// Current bearer token
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state.borrow().as_ref().map(|s| s.token.clone())
    }

    /// Signed-in profile, if known
    #[must_use]
    pub fn current(&self) -> Option<AdminProfile> {
        self.state.borrow().as_ref().and_then(|s| s.admin.clone())
    }

    /// Whether a token is held
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Observe session changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.state.subscribe()
    }

    /// Whether the signed-in administrator holds an allowed permission
    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.state
            .borrow()
            .as_ref()
            .and_then(|s| s.admin.as_ref())
            .is_some_and(|admin| admin.has_permission(name))
    }

    /// Where the front end should land: the role dashboard or sign-in
    #[must_use]
    pub fn landing_route(&self) -> &'static str {
        self.current()
            .and_then(|admin| admin.role)
            .and_then(Role::dashboard_route)
            .unwrap_or(LOGIN_ROUTE)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use pretty_assertions::assert_eq;

    fn credentials() -> Credentials {
        Credentials {
            email: "ops@example.com".into(),
            password: "secret".into(),
        }
    }

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let backend = Arc::new(MockBackend::new());
        let session = SessionStore::new(Arc::clone(&backend));
        let mut changes = session.subscribe();
        assert_eq!(session.landing_route(), LOGIN_ROUTE);

        let admin = session.sign_in(&credentials()).await.unwrap();
        assert_eq!(admin.role, Some(Role::Admin));
        assert!(changes.has_changed().unwrap());
        assert!(changes.borrow_and_update().is_some());
        assert_eq!(backend.token().as_deref(), Some("mock-token"));
        assert_eq!(session.landing_route(), "/admin/dashboard");
        assert!(session.has_permission("users.export"));
        assert!(!session.has_permission("schema.delete"));

        session.sign_out().await;
        assert!(!session.is_signed_in());
        assert!(backend.token().is_none());
        assert_eq!(backend.call_count("logout"), 1);
    }

    #[tokio::test]
    async fn test_bad_credentials_keep_signed_out() {
        let backend = Arc::new(MockBackend::new());
        backend.fail_next(Error::Unauthorized);
        let session = SessionStore::new(backend);

        let err = session.sign_in(&credentials()).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(!session.is_signed_in());
    }

    #[tokio::test]
    async fn test_guard_tears_down_on_unauthorized() {
        let backend = Arc::new(MockBackend::new());
        let session = SessionStore::new(Arc::clone(&backend));
        session.restore("old-token");
        assert_eq!(session.token().as_deref(), Some("old-token"));

        let result: Result<()> = session.guard(Err(Error::Unauthorized));
        assert!(matches!(result, Err(Error::SessionEnded)));
        assert!(session.token().is_none());
        assert!(backend.token().is_none());

        let passthrough: Result<u8> = session.guard(Err(Error::remote("boom")));
        assert!(matches!(passthrough, Err(Error::Remote { .. })));
    }

    #[tokio::test]
    async fn test_rejected_call_refreshes_and_retries() {
        let backend = Arc::new(MockBackend::new().with_users(["u1"]));
        let session = SessionStore::new(Arc::clone(&backend));
        session.restore("stale-token");
        backend.fail_next(Error::Unauthorized);

        let user = session
            .guarded(|| backend.fetch_user("u1"))
            .await
            .unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(backend.call_count("fetch_user"), 2);
        assert_eq!(backend.call_count("refresh_token"), 1);
        assert_eq!(session.token().as_deref(), Some("mock-token-refreshed"));
        assert_eq!(backend.token().as_deref(), Some("mock-token-refreshed"));
        assert_eq!(session.current().unwrap().username, "mock");
    }

    #[tokio::test]
    async fn test_failed_refresh_ends_session() {
        let backend = Arc::new(MockBackend::new().with_users(["u1"]));
        let session = SessionStore::new(Arc::clone(&backend));
        session.restore("stale-token");
        backend.fail_next(Error::Unauthorized);
        backend.fail_next(Error::Unauthorized);

        let result = session.guarded(|| backend.fetch_user("u1")).await;
        assert!(matches!(result, Err(Error::SessionEnded)));
        assert_eq!(backend.call_count("fetch_user"), 1);
        assert_eq!(backend.call_count("refresh_token"), 1);
        assert!(!session.is_signed_in());
        assert!(backend.token().is_none());
    }

    #[tokio::test]
    async fn test_rejected_retry_ends_session() {
        let backend = Arc::new(MockBackend::new().with_users(["u1"]));
        let session = SessionStore::new(Arc::clone(&backend));
        session.restore("stale-token");
        backend.fail_next(Error::Unauthorized);

        // The fresh token is rejected as well
        let mock = &*backend;
        let result = session
            .guarded(move || async move {
                let user = mock.fetch_user("u1").await?;
                if mock.call_count("refresh_token") > 0 {
                    return Err(Error::Unauthorized);
                }
                Ok(user)
            })
            .await;
        assert!(matches!(result, Err(Error::SessionEnded)));
        assert_eq!(backend.call_count("fetch_user"), 2);
        assert_eq!(backend.call_count("refresh_token"), 1);
        assert!(!session.is_signed_in());
    }

    #[tokio::test]
    async fn test_guarded_passes_other_errors_through() {
        let backend = Arc::new(MockBackend::new());
        let session = SessionStore::new(Arc::clone(&backend));
        session.restore("token");
        backend.fail_next(Error::remote("boom"));

        let result = session.guarded(|| backend.fetch_schema()).await;
        assert!(matches!(result, Err(Error::Remote { .. })));
        assert_eq!(backend.call_count("refresh_token"), 0);
        assert!(session.is_signed_in());
    }

    #[tokio::test]
    async fn test_guarded_without_session_does_not_refresh() {
        let backend = Arc::new(MockBackend::new());
        let session = SessionStore::new(Arc::clone(&backend));
        backend.fail_next(Error::Unauthorized);

        let result = session.guarded(|| backend.fetch_schema()).await;
        assert!(matches!(result, Err(Error::SessionEnded)));
        assert_eq!(backend.call_count("refresh_token"), 0);
    }

    #[tokio::test]
    async fn test_profile_update_refreshes_session_copy() {
        let backend = Arc::new(MockBackend::new());
        let session = SessionStore::new(Arc::clone(&backend));
        session.sign_in(&credentials()).await.unwrap();
        let mut changes = session.subscribe();

        let mut data = Map::new();
        data.insert("username".into(), Value::String("ops".into()));
        let profile = session.update_profile(&data).await.unwrap();

        assert_eq!(profile.username, "ops");
        assert_eq!(session.current().unwrap().username, "ops");
        assert!(changes.has_changed().unwrap());
        assert_eq!(session.token().as_deref(), Some("mock-token"));
    }

    #[tokio::test]
    async fn test_password_checks_run_before_remote_call() {
        let backend = Arc::new(MockBackend::new());
        let session = SessionStore::new(Arc::clone(&backend));

        let same = PasswordChange {
            current_password: "secret".into(),
            new_password: "secret".into(),
        };
        assert!(matches!(
            session.change_password(&same).await,
            Err(Error::Validation { .. })
        ));
        let blank = PasswordReset {
            token: " ".into(),
            password: "new".into(),
        };
        assert!(session.reset_password(&blank).await.is_err());
        assert!(session.forgot_password("  ").await.is_err());
        assert_eq!(backend.total_calls(), 0);

        session.forgot_password("ops@example.com").await.unwrap();
        let change = PasswordChange {
            current_password: "secret".into(),
            new_password: "better".into(),
        };
        session.change_password(&change).await.unwrap();
        assert_eq!(backend.call_count("forgot_password"), 1);
        assert_eq!(backend.call_count("change_password"), 1);
    }

    #[tokio::test]
    async fn test_sign_out_without_session_skips_remote_call() {
        let backend = Arc::new(MockBackend::new());
        let session = SessionStore::new(Arc::clone(&backend));
        session.sign_out().await;
        assert_eq!(backend.call_count("logout"), 0);
    }
}
