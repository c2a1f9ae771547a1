//! Subcommand handlers

pub mod admins;
pub mod auth;
pub mod schema;
pub mod users;

use crate::app::App;
use crate::cli::{AdminCommands, Commands, ConfigCommands};
use userdesk_core::context_error::{Result, ResultExt};
use userdesk_core::context_error;

/// Run one parsed command
///
/// # Errors
///
/// Returns the first error the command hit, ready to print.
pub async fn dispatch(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::Login { email, password } => auth::login(app, email, password).await,
        Commands::Logout => auth::logout(app).await,
        Commands::Password { action } => auth::password(app, action).await,
        Commands::Profile { action } => auth::profile(app, action).await,
        Commands::Schema { action } => schema::run(app, action).await,
        Commands::Users { action } => users::run(app, action).await,
        Commands::Admins {
            action: AdminCommands::List,
        } => admins::list(app).await,
        Commands::Config {
            action: ConfigCommands::Show,
        } => show_config(app),
    }
}

fn show_config(app: &App) -> Result<()> {
    let mut config = app.config.clone();
    if config.api.token.is_some() {
        config.api.token = Some("<redacted>".to_string());
    }
    let rendered = if app.json {
        crate::output::to_json(&config)?
    } else {
        toml::to_string_pretty(&config).with_context(|| "Failed to encode configuration")?
    };
    println!("{rendered}");
    Ok(())
}

/// Split a `key=value` argument; the value may be empty
///
/// # Errors
///
/// Returns an error if there is no `=` or the key is blank.
pub fn parse_assignment(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| context_error!("Expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(context_error!("Missing field name in '{}'", raw));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("age=30", "age", "30")]
    #[case("tier=", "tier", "")]
    #[case(" name =Ada Lovelace", "name", "Ada Lovelace")]
    #[case("note=a=b", "note", "a=b")]
    fn test_parse_assignment(#[case] raw: &str, #[case] key: &str, #[case] value: &str) {
        assert_eq!(
            parse_assignment(raw).unwrap(),
            (key.to_string(), value.to_string())
        );
    }

    #[rstest]
    #[case("age")]
    #[case("=30")]
    fn test_parse_assignment_rejects(#[case] raw: &str) {
        assert!(parse_assignment(raw).is_err());
    }
}
