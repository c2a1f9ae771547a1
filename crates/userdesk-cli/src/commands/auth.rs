//! `login`, `logout`, `password` and `profile`

use super::parse_assignment;
use crate::app::{App, report};
use crate::cli::{PasswordCommands, ProfileCommands};
use crate::output::to_json;
use serde_json::{Map, Value, json};
use tracing::info;
use userdesk_core::context_error;
use userdesk_core::context_error::Result;
use userdesk_core::{Credentials, PasswordChange, PasswordReset};

/// Exchange credentials for a token and print it
///
/// The token goes to stdout on its own so it can be captured into
/// `USERDESK_TOKEN`.
///
/// # Errors
///
/// Returns an error for rejected credentials or a failed call.
pub async fn login(app: &App, email: String, password: String) -> Result<()> {
    let admin = app
        .session
        .sign_in(&Credentials { email, password })
        .await
        .map_err(|err| match err {
            userdesk_core::Error::Unauthorized => context_error!("Invalid email or password"),
            other => report(other),
        })?;
    let token = app.session.token().unwrap_or_default();

    if app.json {
        let body = json!({
            "token": token,
            "admin": admin,
            "landing": app.session.landing_route(),
        });
        println!("{}", to_json(&body)?);
    } else {
        println!("{token}");
        eprintln!(
            "Signed in as {} <{}>, dashboard {}",
            admin.username,
            admin.email,
            app.session.landing_route()
        );
    }
    info!(admin = %admin.username, "login complete");
    Ok(())
}

/// Invalidate the current token
///
/// # Errors
///
/// Returns an error when no token was given.
pub async fn logout(app: &App) -> Result<()> {
    require_session(app)?;
    app.session.sign_out().await;
    eprintln!("Signed out");
    Ok(())
}

/// Run a password subcommand
///
/// # Errors
///
/// Returns local validation errors before any call, or the backend error.
pub async fn password(app: &App, action: PasswordCommands) -> Result<()> {
    match action {
        PasswordCommands::Forgot { email } => {
            app.session.forgot_password(&email).await.map_err(report)?;
            eprintln!("If {email} has an account, a reset link is on its way");
        }
        PasswordCommands::Reset {
            reset_token,
            password,
        } => {
            let reset = PasswordReset {
                token: reset_token,
                password,
            };
            app.session.reset_password(&reset).await.map_err(report)?;
            eprintln!("Password reset; sign in with the new password");
        }
        PasswordCommands::Change {
            current,
            new_password,
        } => {
            require_session(app)?;
            let change = PasswordChange {
                current_password: current,
                new_password,
            };
            app.call(|| app.session.change_password(&change)).await?;
            eprintln!("Password changed");
        }
    }
    Ok(())
}

/// Run a profile subcommand
///
/// # Errors
///
/// Returns an error for a malformed `--set` or the backend error.
pub async fn profile(app: &App, action: ProfileCommands) -> Result<()> {
    let ProfileCommands::Update { values } = action;
    require_session(app)?;
    let data = profile_data(&values)?;
    let admin = app.call(|| app.session.update_profile(&data)).await?;
    let rows = vec![
        vec!["Id".to_string(), admin.id.clone()],
        vec!["Username".to_string(), admin.username.clone()],
        vec!["Email".to_string(), admin.email.clone()],
    ];
    app.emit(&admin, &["Field", "Value"], &rows)
}

fn require_session(app: &App) -> Result<()> {
    if app.session.is_signed_in() {
        Ok(())
    } else {
        Err(context_error!(
            "Not signed in; pass --token or set USERDESK_TOKEN"
        ))
    }
}

/// `key=value` arguments as a profile body; an empty value sends `null`
///
/// # Errors
///
/// Returns an error for a malformed argument.
pub fn profile_data(values: &[String]) -> Result<Map<String, Value>> {
    values
        .iter()
        .map(|raw| {
            let (key, value) = parse_assignment(raw)?;
            let value = if value.is_empty() {
                Value::Null
            } else {
                Value::String(value)
            };
            Ok((key, value))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_profile_data() {
        let data = profile_data(&["username=ops".to_string(), "phone=".to_string()]).unwrap();
        assert_eq!(
            Value::Object(data),
            json!({"username": "ops", "phone": null})
        );
        assert!(profile_data(&["username".to_string()]).is_err());
    }
}
