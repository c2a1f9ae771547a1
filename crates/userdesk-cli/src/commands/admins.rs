//! `admins` subcommands

use crate::app::App;
use userdesk_core::context_error::Result;

/// Print every administrator
///
/// # Errors
///
/// Returns the backend error.
pub async fn list(app: &App) -> Result<()> {
    let admins = app.call(|| app.directory.admins()).await?;
    let rows: Vec<Vec<String>> = admins
        .iter()
        .map(|admin| vec![admin.id.clone(), admin.username.clone(), admin.email.clone()])
        .collect();
    app.emit(&admins, &["Id", "Username", "Email"], &rows)
}
