//! Field renderer: schema field to control descriptor

use crate::validation::FormValue;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;
use userdesk_core::types::{FieldDefinition, FieldType, STATUS_FIELD, UnsupportedField};
use userdesk_core::utils::{format_iso_date, format_number, humanize_field_name};
use userdesk_core::{Administrator, UserStatus};

/// Choice value meaning "no administrator assigned"
pub const UNASSIGNED: &str = "unassigned";

/// One entry of a closed choice
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    /// Submitted value
    pub value: String,
    /// Shown label
    pub label: String,
}

impl ChoiceOption {
    fn plain(value: &str) -> Self {
        Self {
            value: value.to_string(),
            label: value.to_string(),
        }
    }
}

/// Kind of input and its presentation hints
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Widget {
    /// Free text input
    Text {
        /// Current text
        value: String,
        /// Minimum length hint
        min_length: Option<usize>,
        /// Maximum length hint
        max_length: Option<usize>,
    },
    /// Closed choice
    Choice {
        /// Options in display order
        options: Vec<ChoiceOption>,
        /// Selected option value; `None` is the empty state
        selected: Option<String>,
        /// Whether the empty state can be chosen
        allow_empty: bool,
    },
    /// Numeric input; the raw text is parsed on submit
    Number {
        /// Text as typed
        raw: String,
        /// Lower bound hint
        min: Option<f64>,
        /// Upper bound hint
        max: Option<f64>,
    },
    /// On/off toggle
    Toggle {
        /// Current state
        on: bool,
    },
    /// Date picker holding an ISO date
    Date {
        /// Current value, `YYYY-MM-DD` when parseable
        value: String,
        /// Earliest selectable date
        min: Option<String>,
        /// Latest selectable date
        max: Option<String>,
    },
    /// Read-only text for a field of unknown type
    Fallback {
        /// Declared type as received
        type_name: String,
        /// Stored value as text
        raw: String,
    },
}

/// Descriptor of one form control
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Control {
    /// Field name
    pub field: String,
    /// Label shown next to the control
    pub label: String,
    /// Whether a value must be entered
    pub required: bool,
    /// Whether the control is read-only
    pub disabled: bool,
    /// Input kind
    pub widget: Widget,
}

/// Describe the control for a schema field holding `value`
#[must_use]
pub fn render_control(definition: &FieldDefinition, value: &FormValue) -> Control {
    let text = value.as_text().unwrap_or_default().to_string();

    let widget = match &definition.field_type {
        FieldType::String { .. } | FieldType::StringEnum { .. }
            if definition.name == STATUS_FIELD =>
        {
            Widget::Choice {
                options: status_options(&definition.field_type),
                selected: non_empty(text),
                allow_empty: !definition.required,
            }
        }
        FieldType::String {
            min_length,
            max_length,
            ..
        } => Widget::Text {
            value: text,
            min_length: *min_length,
            max_length: *max_length,
        },
        FieldType::StringEnum { values, .. } => Widget::Choice {
            options: values.iter().map(|v| ChoiceOption::plain(v)).collect(),
            selected: non_empty(text),
            allow_empty: true,
        },
        FieldType::Number { min, max, .. } => Widget::Number {
            raw: text,
            min: *min,
            max: *max,
        },
        FieldType::Boolean { .. } => Widget::Toggle {
            on: matches!(value, FormValue::Bool(true)),
        },
        FieldType::Date { min, max, .. } => Widget::Date {
            value: text,
            min: min.map(format_iso_date),
            max: max.map(format_iso_date),
        },
    };

    Control {
        field: definition.name.clone(),
        label: humanize_field_name(&definition.name),
        required: definition.required,
        disabled: false,
        widget,
    }
}

/// Status choices: the schema's values when it lists any, else the built-in set
fn status_options(field_type: &FieldType) -> Vec<ChoiceOption> {
    match field_type {
        FieldType::StringEnum { values, .. } if !values.is_empty() => values
            .iter()
            .map(|value| ChoiceOption {
                value: value.clone(),
                label: value
                    .parse::<UserStatus>()
                    .map_or_else(|_| value.clone(), |status| status.label().to_string()),
            })
            .collect(),
        _ => UserStatus::ALL
            .iter()
            .map(|status| ChoiceOption {
                value: status.as_str().to_string(),
                label: status.label().to_string(),
            })
            .collect(),
    }
}

/// Describe a disabled control for a field whose type is not supported
#[must_use]
pub fn render_unsupported(field: &UnsupportedField, value: Option<&Value>) -> Control {
    warn!(
        field = %field.name,
        type_name = %field.type_name,
        "rendering fallback control for unsupported field type"
    );

    let raw = match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.as_f64().map_or_else(|| n.to_string(), format_number),
        Some(other) => other.to_string(),
    };

    Control {
        field: field.name.clone(),
        label: humanize_field_name(&field.name),
        required: false,
        disabled: true,
        widget: Widget::Fallback {
            type_name: field.type_name.clone(),
            raw,
        },
    }
}

/// Describe the administrator choice for `assignedAdmin`
///
/// The first option is the [`UNASSIGNED`] sentinel; the rest are labelled
/// `username (email)`.
#[must_use]
pub fn render_admin_control(
    definition: &FieldDefinition,
    admins: &[Administrator],
    value: &FormValue,
) -> Control {
    let mut options = Vec::with_capacity(admins.len() + 1);
    options.push(ChoiceOption {
        value: UNASSIGNED.to_string(),
        label: "None (No Assignment)".to_string(),
    });
    options.extend(admins.iter().map(|admin| ChoiceOption {
        value: admin.id.clone(),
        label: admin.display_name(),
    }));

    let selected = value
        .as_text()
        .filter(|id| !id.trim().is_empty())
        .map_or_else(|| UNASSIGNED.to_string(), str::to_string);

    Control {
        field: definition.name.clone(),
        label: humanize_field_name(&definition.name),
        required: definition.required,
        disabled: false,
        widget: Widget::Choice {
            options,
            selected: Some(selected),
            allow_empty: false,
        },
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() { None } else { Some(text) }
}
