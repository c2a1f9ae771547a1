//! Table projection: schema to columns, record to cell text

use serde::Serialize;
use serde_json::Value;
use std::fmt::Write as _;
use userdesk_core::config::DisplayConfig;
use userdesk_core::records::{CREATED_AT_FIELD, UPDATED_AT_FIELD};
use userdesk_core::types::{ASSIGNED_ADMIN_FIELD, FieldKind, NAME_FIELD, NUMBER_FIELD, STATUS_FIELD};
use userdesk_core::utils::{format_number, humanize_field_name, value_as_bool, value_as_date};
use userdesk_core::{Schema, UserRecord, UserStatus};

/// Keys never shown as columns
pub const HIDDEN_COLUMNS: [&str; 3] = ["password", "__v", "metadata"];

/// Columns placed first, in this order, when present
pub const PREFERRED_ORDER: [&str; 6] = [
    NAME_FIELD,
    NUMBER_FIELD,
    STATUS_FIELD,
    ASSIGNED_ADMIN_FIELD,
    CREATED_AT_FIELD,
    UPDATED_AT_FIELD,
];

/// How a column's cells are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Literal text
    Text,
    /// Number without trailing `.0`
    Number,
    /// Yes/No
    Boolean,
    /// Formatted date
    Date,
    /// Capitalised status label
    Status,
    /// `username (email)` of the assigned administrator
    Admin,
    /// Field of unsupported type: arrays joined, objects as JSON
    Raw,
}

impl ColumnKind {
    fn for_field(name: &str, kind: Option<FieldKind>) -> Self {
        match (name, kind) {
            (ASSIGNED_ADMIN_FIELD, _) => Self::Admin,
            (STATUS_FIELD, _) => Self::Status,
            (_, Some(FieldKind::String | FieldKind::StringEnum)) => Self::Text,
            (_, Some(FieldKind::Number)) => Self::Number,
            (_, Some(FieldKind::Boolean)) => Self::Boolean,
            (_, Some(FieldKind::Date)) => Self::Date,
            (_, None) => Self::Raw,
        }
    }
}

/// One table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    /// Record key
    pub key: String,
    /// Header text
    pub label: String,
    /// Cell rendering
    pub kind: ColumnKind,
    /// Whether the list endpoint can sort on it
    pub sortable: bool,
}

/// One entry of a sort picker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortOption {
    /// Value of the `sort` query parameter
    pub value: String,
    /// Shown label
    pub label: String,
}

/// Columns for a schema
///
/// Hidden keys are dropped; the preferred keys lead, the rest follow in schema
/// order with unsupported fields last. Pure: the same schema always yields the
/// same columns.
#[must_use]
pub fn project_columns(schema: &Schema) -> Vec<ColumnDescriptor> {
    let supported = schema
        .fields()
        .map(|def| (def.name.as_str(), Some(def.kind())));
    let unsupported = schema
        .unsupported()
        .iter()
        .map(|field| (field.name.as_str(), None));

    let mut columns: Vec<ColumnDescriptor> = supported
        .chain(unsupported)
        .filter(|(name, _)| !HIDDEN_COLUMNS.contains(name))
        .map(|(name, kind)| {
            let kind = ColumnKind::for_field(name, kind);
            ColumnDescriptor {
                key: name.to_string(),
                label: humanize_field_name(name),
                kind,
                sortable: kind != ColumnKind::Raw,
            }
        })
        .collect();

    columns.sort_by_key(|column| {
        PREFERRED_ORDER
            .iter()
            .position(|key| *key == column.key)
            .unwrap_or(PREFERRED_ORDER.len())
    });
    columns
}

/// Ascending and descending sort keys for every sortable column
#[must_use]
pub fn sort_options(columns: &[ColumnDescriptor]) -> Vec<SortOption> {
    columns
        .iter()
        .filter(|column| column.sortable)
        .flat_map(|column| {
            [
                SortOption {
                    value: column.key.clone(),
                    label: format!("{} (ascending)", column.label),
                },
                SortOption {
                    value: format!("-{}", column.key),
                    label: format!("{} (descending)", column.label),
                },
            ]
        })
        .collect()
}

/// Display settings for cells
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellFormat {
    /// Text for missing values
    pub placeholder: String,
    /// Text for `true`
    pub yes: String,
    /// Text for `false`
    pub no: String,
    /// `chrono` format string for dates
    pub date_format: String,
}

impl Default for CellFormat {
    fn default() -> Self {
        Self::from(&DisplayConfig::default())
    }
}

impl From<&DisplayConfig> for CellFormat {
    fn from(config: &DisplayConfig) -> Self {
        Self {
            placeholder: config.placeholder.clone(),
            yes: config.yes_label.clone(),
            no: config.no_label.clone(),
            date_format: config.date_format.clone(),
        }
    }
}

/// Renders records into cell text
#[derive(Debug, Clone, Default)]
pub struct TableProjector {
    format: CellFormat,
}

impl TableProjector {
    /// Projector with explicit display settings
    #[must_use]
    pub const fn new(format: CellFormat) -> Self {
        Self { format }
    }

    /// Display settings in use
    #[must_use]
    pub const fn format(&self) -> &CellFormat {
        &self.format
    }

    /// Text of one cell
    #[must_use]
    pub fn render_cell(&self, record: &UserRecord, column: &ColumnDescriptor) -> String {
        let Some(value) = record.value(&column.key) else {
            return self.format.placeholder.clone();
        };

        match column.kind {
            ColumnKind::Status => value
                .as_str()
                .map(|raw| {
                    raw.parse::<UserStatus>()
                        .map_or_else(|_| raw.to_string(), |status| status.label().to_string())
                })
                .unwrap_or_else(|| self.render_value(&value)),
            ColumnKind::Admin => match &value {
                Value::Object(admin) => match (
                    admin.get("username").and_then(Value::as_str),
                    admin.get("email").and_then(Value::as_str),
                ) {
                    (Some(username), Some(email)) => format!("{username} ({email})"),
                    (Some(username), None) => username.to_string(),
                    _ => self.format.placeholder.clone(),
                },
                _ => self.format.placeholder.clone(),
            },
            ColumnKind::Boolean => value_as_bool(&value)
                .map_or_else(|| self.render_value(&value), |b| self.yes_no(b)),
            ColumnKind::Date => value_as_date(&value).map_or_else(
                || self.render_value(&value),
                |date| {
                    let mut out = String::new();
                    if write!(out, "{}", date.format(&self.format.date_format)).is_err() {
                        out = date.format("%Y-%m-%d").to_string();
                    }
                    out
                },
            ),
            ColumnKind::Text | ColumnKind::Number | ColumnKind::Raw => self.render_value(&value),
        }
    }

    /// Every cell of a row, in column order
    #[must_use]
    pub fn render_row(&self, record: &UserRecord, columns: &[ColumnDescriptor]) -> Vec<String> {
        columns
            .iter()
            .map(|column| self.render_cell(record, column))
            .collect()
    }

    fn yes_no(&self, value: bool) -> String {
        if value {
            self.format.yes.clone()
        } else {
            self.format.no.clone()
        }
    }

    fn render_value(&self, value: &Value) -> String {
        match value {
            Value::Null => self.format.placeholder.clone(),
            Value::String(s) => s.clone(),
            Value::Bool(b) => self.yes_no(*b),
            Value::Number(n) => n.as_f64().map_or_else(|| n.to_string(), format_number),
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => self.render_value(other),
                })
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(_) => value.to_string(),
        }
    }
}
