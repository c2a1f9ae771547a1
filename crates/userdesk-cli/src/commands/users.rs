//! `users` subcommands

use super::parse_assignment;
use crate::app::{App, report};
use crate::cli::UserCommands;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use userdesk_core::context_error;
use userdesk_core::context_error::{Result, ResultExt};
use userdesk_core::types::ASSIGNED_ADMIN_FIELD;
use userdesk_core::utils::value_as_bool;
use userdesk_core::{ExportFormat, FieldKind, Schema, UserQuery, UserStatus};
use userdesk_schema::{FormState, FormValue, UNASSIGNED, build_form, project_columns, submit};

/// Run a users subcommand
///
/// # Errors
///
/// Returns the first validation or backend error.
pub async fn run(app: &App, action: UserCommands) -> Result<()> {
    match action {
        UserCommands::List {
            page,
            limit,
            search,
            sort,
            filters,
        } => {
            let filters = filters
                .iter()
                .map(|raw| parse_assignment(raw))
                .collect::<Result<BTreeMap<_, _>>>()?;
            let query = UserQuery {
                page: page.max(1),
                limit: limit.max(1),
                search,
                sort,
                filters,
            };
            list(app, query).await
        }
        UserCommands::Show { id } => show(app, &id).await,
        UserCommands::Create { values } => {
            let schema = app.call(|| app.schema.fetch_schema()).await?;
            let mut form = build_form(&schema, None);
            apply_values(&mut form, &schema, &values)?;
            let user = app.guard(submit(&mut form, &schema, &app.directory).await)?;
            info!(id = %user.id, "user created");
            if app.json {
                println!("{}", crate::output::to_json(&user)?);
            } else {
                println!("{}", user.id);
            }
            Ok(())
        }
        UserCommands::Update { id, values } => {
            if values.is_empty() {
                return Err(context_error!("Nothing to update; pass at least one --set"));
            }
            let schema = app.call(|| app.schema.fetch_schema()).await?;
            let record = app.call(|| app.directory.fetch_user(&id)).await?;
            let mut form = build_form(&schema, Some(&record));
            apply_values(&mut form, &schema, &values)?;
            let user = app.guard(submit(&mut form, &schema, &app.directory).await)?;
            if app.json {
                println!("{}", crate::output::to_json(&user)?);
            } else {
                eprintln!("Updated user {}", user.id);
            }
            Ok(())
        }
        UserCommands::Delete { ids } => {
            select(app, &ids);
            let count = app.call(|| app.directory.delete_selected()).await?;
            eprintln!("Deleted {count} user(s)");
            Ok(())
        }
        UserCommands::Status { status, ids } => {
            let status: UserStatus = status.parse().map_err(report)?;
            select(app, &ids);
            let count = app.call(|| app.directory.bulk_update_status(status)).await?;
            eprintln!("Set {count} user(s) to {}", status.label());
            Ok(())
        }
        UserCommands::Assign { admin, ids } => {
            app.call(|| app.directory.assign(&admin, &ids)).await?;
            eprintln!("Assigned {} user(s) to {admin}", ids.len());
            Ok(())
        }
        UserCommands::Unassign { admin, ids } => {
            app.call(|| app.directory.unassign(admin.as_deref(), &ids)).await?;
            eprintln!("Unassigned {} user(s)", ids.len());
            Ok(())
        }
        UserCommands::Import { file } => import(app, &file).await,
        UserCommands::Export {
            format,
            fields,
            output,
        } => export(app, &format, fields, output).await,
    }
}

fn select(app: &App, ids: &[String]) {
    app.directory.clear_selection();
    for id in ids {
        if !app.directory.is_selected(id) {
            app.directory.toggle_selection(id);
        }
    }
}

async fn list(app: &App, query: UserQuery) -> Result<()> {
    let schema = app.call(|| app.schema.fetch_schema()).await?;
    let outcome = app.call(|| app.directory.list(query.clone())).await?;
    let page = outcome
        .into_page()
        .ok_or_else(|| context_error!("User list request was superseded"))?;

    if app.json {
        println!("{}", crate::output::to_json(&page)?);
        return Ok(());
    }

    let columns = project_columns(&schema);
    let mut headers = vec!["Id".to_string()];
    headers.extend(columns.iter().map(|c| c.label.clone()));
    let rows: Vec<Vec<String>> = page
        .users
        .iter()
        .map(|user| {
            let mut row = vec![user.id.clone()];
            row.extend(app.projector.render_row(user, &columns));
            row
        })
        .collect();
    app.emit(&page, &headers, &rows)?;

    let total = page.pagination.map_or(page.users.len() as u64, |p| p.total);
    println!(
        "\nPage {} of {}, {} user(s) in total",
        query.page,
        page.page_count(query.limit).max(1),
        total
    );
    Ok(())
}

async fn show(app: &App, id: &str) -> Result<()> {
    let schema = app.call(|| app.schema.fetch_schema()).await?;
    let user = app.call(|| app.directory.fetch_user(id)).await?;
    for problem in user.conformance_errors(&schema) {
        warn!(user = %user.id, %problem, "stored value does not match schema");
    }

    let columns = project_columns(&schema);
    let cells = app.projector.render_row(&user, &columns);
    let rows: Vec<Vec<String>> = std::iter::once(vec!["Id".to_string(), user.id.clone()])
        .chain(
            columns
                .iter()
                .zip(cells)
                .map(|(column, cell)| vec![column.label.clone(), cell]),
        )
        .collect();
    app.emit(&user, &["Field", "Value"], &rows)
}

async fn export(
    app: &App,
    format: &str,
    fields: Vec<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let format: ExportFormat = format.parse().map_err(report)?;
    let fields = if fields.is_empty() {
        let schema = app.call(|| app.schema.fetch_schema()).await?;
        project_columns(&schema).into_iter().map(|c| c.key).collect()
    } else {
        fields
    };

    let body = app.call(|| app.directory.export(format, &fields)).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(format.file_name(Utc::now())));
    tokio::fs::write(&path, &body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(path = %path.display(), bytes = body.len(), format = format.as_str(), "export written");
    if app.json {
        let summary = json!({ "path": path, "bytes": body.len(), "format": format });
        println!("{}", crate::output::to_json(&summary)?);
    } else {
        eprintln!("Exported {} bytes to {}", body.len(), path.display());
    }
    Ok(())
}

async fn import(app: &App, file: &Path) -> Result<()> {
    let contents = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| context_error!("{} is not a file", file.display()))?;

    let summary = app
        .call(|| app.directory.import(&file_name, contents.clone()))
        .await?;
    info!(file = %file_name, imported = ?summary.imported, "import finished");
    if app.json {
        println!("{}", crate::output::to_json(&summary)?);
    } else {
        match (summary.imported, summary.message.as_deref()) {
            (Some(count), _) => eprintln!("Imported {count} user(s) from {file_name}"),
            (None, Some(message)) => eprintln!("{message}"),
            (None, None) => eprintln!("Uploaded {file_name}"),
        }
        for problem in &summary.errors {
            eprintln!("  rejected: {problem}");
        }
    }
    Ok(())
}

/// Write `key=value` arguments into a form
///
/// Boolean fields take `true`/`false`, `assignedAdmin=` unassigns, and an
/// empty value clears any other field.
///
/// # Errors
///
/// Returns an error for a malformed argument, a field the form does not
/// show, or a boolean that does not parse.
pub fn apply_values(form: &mut FormState, schema: &Schema, values: &[String]) -> Result<()> {
    for raw in values {
        let (name, text) = parse_assignment(raw)?;
        let kind = schema.get(&name).map(userdesk_core::FieldDefinition::kind);
        let value = match kind {
            _ if name == ASSIGNED_ADMIN_FIELD && text.trim().is_empty() => {
                FormValue::Text(UNASSIGNED.to_string())
            }
            Some(FieldKind::Boolean) if !text.trim().is_empty() => {
                let flag = value_as_bool(&serde_json::Value::String(text.clone()))
                    .ok_or_else(|| context_error!("{}: '{}' is not true or false", name, text))?;
                FormValue::Bool(flag)
            }
            Some(FieldKind::Boolean) => FormValue::Bool(false),
            _ => FormValue::text(text),
        };
        if !form.set_value(&name, value) {
            return Err(context_error!("Unknown field '{}'", name));
        }
        debug!(field = %name, "form value set");
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use userdesk_core::types::{FieldDefinition, FieldType};

    fn schema() -> Schema {
        Schema::from_fields([
            FieldDefinition::new("name", FieldType::string()).with_required(true),
            FieldDefinition::new("verified", FieldType::boolean()),
            FieldDefinition::new("age", FieldType::number()),
            FieldDefinition::new(ASSIGNED_ADMIN_FIELD, FieldType::string()),
        ])
    }

    #[test]
    fn test_apply_values_by_kind() {
        let schema = schema();
        let mut form = build_form(&schema, None);
        let values = vec![
            "name=Ada".to_string(),
            "verified=yes".to_string(),
            "age=".to_string(),
            "assignedAdmin=".to_string(),
        ];
        apply_values(&mut form, &schema, &values).unwrap();

        assert_eq!(form.value("name"), Some(&FormValue::Text("Ada".into())));
        assert_eq!(form.value("verified"), Some(&FormValue::Bool(true)));
        assert_eq!(form.value("age"), Some(&FormValue::Empty));
        assert_eq!(
            form.value(ASSIGNED_ADMIN_FIELD),
            Some(&FormValue::Text(UNASSIGNED.into()))
        );
    }

    #[test]
    fn test_apply_values_rejects_unknown_field() {
        let schema = schema();
        let mut form = build_form(&schema, None);
        let err = apply_values(&mut form, &schema, &["nickname=Ada".to_string()]).unwrap_err();
        assert_eq!(err.to_string(), "Unknown field 'nickname'");
    }

    #[test]
    fn test_apply_values_rejects_bad_boolean() {
        let schema = schema();
        let mut form = build_form(&schema, None);
        assert!(apply_values(&mut form, &schema, &["verified=maybe".to_string()]).is_err());
    }
}
