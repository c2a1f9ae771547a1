//! `schema` subcommands

use crate::app::{App, report};
use crate::cli::{ConstraintArgs, SchemaCommands};
use serde_json::{Value, json};
use userdesk_core::context_error;
use userdesk_core::context_error::Result;
use userdesk_core::types::WireField;
use userdesk_core::utils::{
    format_iso_date, format_number, number_to_json, parse_iso_date, value_as_bool,
};
use userdesk_core::{Error, FieldDefinition, FieldKind, FieldPatch, FieldType, Schema};
use userdesk_schema::{project_columns, sort_options};

/// Run a schema subcommand
///
/// # Errors
///
/// Returns local validation errors before any call, or the backend error.
pub async fn run(app: &App, action: SchemaCommands) -> Result<()> {
    match action {
        SchemaCommands::Show => show(app).await,
        SchemaCommands::Columns => columns(app).await,
        SchemaCommands::Add {
            name,
            kind,
            required,
            constraints,
        } => {
            let kind: FieldKind = kind.parse().map_err(|_| {
                context_error!(
                    "Unknown field type '{}'; expected string, string_enum, number, boolean or date",
                    kind
                )
            })?;
            let definition =
                build_definition(&name, kind, required, &constraints).map_err(report)?;
            app.call(|| app.schema.add_field(&definition)).await?;
            eprintln!("Added {} field '{name}'", kind.label());
            Ok(())
        }
        SchemaCommands::Update {
            name,
            required,
            constraints,
        } => {
            let schema = app.call(|| app.schema.fetch_schema()).await?;
            let kind = schema
                .get(&name)
                .map(FieldDefinition::kind)
                .ok_or_else(|| context_error!("No field named '{}'", name))?;
            let patch = build_patch(kind, required, &constraints).map_err(report)?;
            if patch.is_empty() {
                return Err(context_error!("Nothing to update for '{}'", name));
            }
            app.call(|| app.schema.update_field(&name, &patch)).await?;
            eprintln!("Updated field '{name}'");
            Ok(())
        }
        SchemaCommands::Delete { name } => {
            app.call(|| app.schema.delete_field(&name)).await?;
            eprintln!("Deleted field '{name}'");
            Ok(())
        }
    }
}

async fn show(app: &App) -> Result<()> {
    let schema = app.call(|| app.schema.fetch_schema()).await?;
    let mut rows: Vec<Vec<String>> = schema
        .fields()
        .map(|def| {
            vec![
                def.name.clone(),
                def.kind().label().to_string(),
                if def.required { "yes" } else { "no" }.to_string(),
                describe_constraints(&def.field_type),
            ]
        })
        .collect();
    rows.extend(schema.unsupported().iter().map(|field| {
        vec![
            field.name.clone(),
            format!("unsupported ({})", field.type_name),
            "-".to_string(),
            String::new(),
        ]
    }));

    app.emit(
        &schema.to_document(),
        &["Field", "Type", "Required", "Constraints"],
        &rows,
    )?;
    warn_missing_protected(&schema);
    Ok(())
}

async fn columns(app: &App) -> Result<()> {
    let schema = app.call(|| app.schema.fetch_schema()).await?;
    let columns = project_columns(&schema);
    let sorts = sort_options(&columns);

    let rows: Vec<Vec<String>> = columns
        .iter()
        .map(|c| {
            vec![
                c.key.clone(),
                c.label.clone(),
                format!("{:?}", c.kind).to_lowercase(),
                if c.sortable { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    app.emit(
        &json!({ "columns": columns, "sort": sorts }),
        &["Key", "Label", "Kind", "Sortable"],
        &rows,
    )?;
    if !app.json {
        let keys: Vec<&str> = sorts.iter().map(|s| s.value.as_str()).collect();
        println!("\nSort keys: {}", keys.join(", "));
    }
    Ok(())
}

fn warn_missing_protected(schema: &Schema) {
    let missing = schema.missing_protected();
    if !missing.is_empty() {
        eprintln!("warning: server schema lacks core field(s): {}", missing.join(", "));
    }
}

/// One-line summary of a field's constraints
#[must_use]
pub fn describe_constraints(field_type: &FieldType) -> String {
    let mut parts = Vec::new();
    let range = |min: Option<String>, max: Option<String>| match (min, max) {
        (None, None) => None,
        (min, max) => Some(format!(
            "{}..{}",
            min.unwrap_or_default(),
            max.unwrap_or_default()
        )),
    };

    match field_type {
        FieldType::String {
            min_length,
            max_length,
            default,
        } => {
            if let Some(r) = range(min_length.map(|n| n.to_string()), max_length.map(|n| n.to_string())) {
                parts.push(format!("length {r}"));
            }
            if let Some(d) = default {
                parts.push(format!("default {d}"));
            }
        }
        FieldType::StringEnum {
            values,
            default,
            ..
        } => {
            parts.push(format!("one of {}", values.join(", ")));
            if let Some(d) = default {
                parts.push(format!("default {d}"));
            }
        }
        FieldType::Number { min, max, default } => {
            if let Some(r) = range(min.map(format_number), max.map(format_number)) {
                parts.push(format!("range {r}"));
            }
            if let Some(d) = default {
                parts.push(format!("default {}", format_number(*d)));
            }
        }
        FieldType::Boolean { default } => {
            if let Some(d) = default {
                parts.push(format!("default {d}"));
            }
        }
        FieldType::Date { min, max, default } => {
            if let Some(r) = range(min.map(format_iso_date), max.map(format_iso_date)) {
                parts.push(format!("dates {r}"));
            }
            if let Some(d) = default {
                parts.push(format!("default {}", format_iso_date(*d)));
            }
        }
    }
    parts.join("; ")
}

/// Build a definition from command line flags
///
/// # Errors
///
/// Returns [`Error::Validation`] for values that do not fit the type.
pub fn build_definition(
    name: &str,
    kind: FieldKind,
    required: bool,
    constraints: &ConstraintArgs,
) -> userdesk_core::Result<FieldDefinition> {
    let has_values = constraints.enum_values.as_ref().is_some_and(|v| !v.is_empty());
    match (kind, has_values) {
        (FieldKind::StringEnum, false) => {
            return Err(Error::validation("enum", "At least one option is required"));
        }
        (FieldKind::StringEnum, true) => {}
        (_, true) => {
            return Err(Error::validation(
                "enum",
                "Options only apply to string_enum fields",
            ));
        }
        (_, false) => {}
    }

    let wire = WireField {
        type_name: kind.wire_name().to_string(),
        required,
        enum_values: constraints.enum_values.clone(),
        default: constraints
            .default
            .as_deref()
            .map(|raw| scalar("default", kind, raw))
            .transpose()?,
        min_length: constraints.min_length.map(Value::from),
        max_length: constraints.max_length.map(Value::from),
        min: constraints
            .min
            .as_deref()
            .map(|raw| bound("min", kind, raw))
            .transpose()?,
        max: constraints
            .max
            .as_deref()
            .map(|raw| bound("max", kind, raw))
            .transpose()?,
    };
    FieldDefinition::from_wire(name, &wire)
}

/// Build a patch from command line flags for a field of `kind`
///
/// # Errors
///
/// Returns [`Error::Validation`] for values that do not fit the type.
pub fn build_patch(
    kind: FieldKind,
    required: Option<bool>,
    constraints: &ConstraintArgs,
) -> userdesk_core::Result<FieldPatch> {
    Ok(FieldPatch {
        required,
        enum_values: constraints.enum_values.clone(),
        default: constraints
            .default
            .as_deref()
            .map(|raw| scalar("default", kind, raw))
            .transpose()?,
        min_length: constraints.min_length.map(Value::from),
        max_length: constraints.max_length.map(Value::from),
        min: constraints
            .min
            .as_deref()
            .map(|raw| bound("min", kind, raw))
            .transpose()?,
        max: constraints
            .max
            .as_deref()
            .map(|raw| bound("max", kind, raw))
            .transpose()?,
    })
}

fn scalar(flag: &str, kind: FieldKind, raw: &str) -> userdesk_core::Result<Value> {
    match kind {
        FieldKind::String | FieldKind::StringEnum => Ok(Value::String(raw.to_string())),
        FieldKind::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(number_to_json)
            .ok_or_else(|| Error::validation(flag, format!("'{raw}' is not a number"))),
        FieldKind::Boolean => value_as_bool(&Value::String(raw.to_string()))
            .map(Value::Bool)
            .ok_or_else(|| Error::validation(flag, format!("'{raw}' is not true or false"))),
        FieldKind::Date => parse_iso_date(raw)
            .map(|d| Value::String(format_iso_date(d)))
            .ok_or_else(|| Error::validation(flag, format!("'{raw}' is not a date (YYYY-MM-DD)"))),
    }
}

fn bound(flag: &str, kind: FieldKind, raw: &str) -> userdesk_core::Result<Value> {
    match kind {
        FieldKind::Number | FieldKind::Date => scalar(flag, kind, raw),
        _ => Err(Error::validation(
            flag,
            "Bounds only apply to number and date fields",
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn constraints() -> ConstraintArgs {
        ConstraintArgs::default()
    }

    #[test]
    fn test_enum_definition() {
        let args = ConstraintArgs {
            enum_values: Some(vec!["free".into(), "pro".into()]),
            default: Some("free".into()),
            ..constraints()
        };
        let def = build_definition("plan", FieldKind::StringEnum, true, &args).unwrap();
        assert_eq!(def.kind(), FieldKind::StringEnum);
        assert!(def.required);
        assert_eq!(describe_constraints(&def.field_type), "one of free, pro; default free");
    }

    #[test]
    fn test_enum_requires_values() {
        let err = build_definition("plan", FieldKind::StringEnum, false, &constraints()).unwrap_err();
        assert!(err.to_string().contains("At least one option is required"));

        let args = ConstraintArgs {
            enum_values: Some(vec!["a".into()]),
            ..constraints()
        };
        assert!(build_definition("age", FieldKind::Number, false, &args).is_err());
    }

    #[test]
    fn test_number_bounds() {
        let args = ConstraintArgs {
            min: Some("18".into()),
            max: Some("65".into()),
            ..constraints()
        };
        let def = build_definition("age", FieldKind::Number, false, &args).unwrap();
        assert_eq!(def.field_type, FieldType::number_between(18.0, 65.0));
        assert_eq!(describe_constraints(&def.field_type), "range 18..65");

        let bad = ConstraintArgs {
            min: Some("eighteen".into()),
            ..constraints()
        };
        assert!(build_definition("age", FieldKind::Number, false, &bad).is_err());
    }

    #[test]
    fn test_date_bounds() {
        let args = ConstraintArgs {
            min: Some("2020-01-01".into()),
            ..constraints()
        };
        let def = build_definition("joined", FieldKind::Date, false, &args).unwrap();
        assert_eq!(
            def.field_type,
            FieldType::Date {
                min: NaiveDate::from_ymd_opt(2020, 1, 1),
                max: None,
                default: None,
            }
        );
    }

    #[test]
    fn test_bounds_rejected_for_text() {
        let args = ConstraintArgs {
            min: Some("1".into()),
            ..constraints()
        };
        assert!(build_definition("nick", FieldKind::String, false, &args).is_err());
    }

    #[test]
    fn test_patch_from_flags() {
        let args = ConstraintArgs {
            max: Some("99".into()),
            ..constraints()
        };
        let patch = build_patch(FieldKind::Number, Some(true), &args).unwrap();
        assert_eq!(patch.required, Some(true));
        assert_eq!(patch.max, Some(json!(99)));
        assert!(build_patch(FieldKind::Number, None, &constraints()).unwrap().is_empty());
    }
}
