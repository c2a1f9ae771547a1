//! Schema data types for userdesk
//!
//! The server describes each user attribute as a loosely typed JSON object
//! (`type`, `required`, `enum`, `minlength`, ...). Those documents are decoded
//! once, at the boundary, into [`FieldDefinition`]s whose [`FieldType`] carries
//! exactly the constraints that make sense for the kind of field.

use crate::utils::{
    format_iso_date, number_to_json, value_as_bool, value_as_date, value_as_f64, value_as_usize,
};
use crate::{Error, Result};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

/// Name of the core "display name" field
pub const NAME_FIELD: &str = "name";
/// Name of the core phone/number field
pub const NUMBER_FIELD: &str = "number";
/// Name of the administrator reference field
pub const ASSIGNED_ADMIN_FIELD: &str = "assignedAdmin";
/// Name of the account status field
pub const STATUS_FIELD: &str = "status";

/// Fields that can be neither edited nor deleted
pub const PROTECTED_FIELDS: [&str; 4] =
    [NAME_FIELD, NUMBER_FIELD, ASSIGNED_ADMIN_FIELD, STATUS_FIELD];

/// Whether a field name belongs to the protected set
#[must_use]
pub fn is_protected(name: &str) -> bool {
    PROTECTED_FIELDS.contains(&name)
}

/// The five kinds of schema field, without their constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text
    String,
    /// Text restricted to a closed set of options
    StringEnum,
    /// Floating point number
    Number,
    /// True/false
    Boolean,
    /// Calendar date
    Date,
}

impl FieldKind {
    /// All kinds, in the order an authoring UI offers them
    pub const ALL: [Self; 5] = [
        Self::String,
        Self::StringEnum,
        Self::Number,
        Self::Boolean,
        Self::Date,
    ];

    /// Canonical lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::StringEnum => "string_enum",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }

    /// Human readable label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::String => "Text",
            Self::StringEnum => "Text with Options",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
        }
    }

    /// Type name used on the wire; enumerations travel as plain strings
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::String | Self::StringEnum => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FieldKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "string" | "text" => Ok(Self::String),
            "string_enum" | "enum" => Ok(Self::StringEnum),
            "number" => Ok(Self::Number),
            "boolean" | "bool" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            other => Err(Error::SchemaType {
                field: String::new(),
                type_name: other.to_string(),
            }),
        }
    }
}

/// A field's type together with the constraints that apply to it
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// Free text
    String {
        /// Minimum length in characters
        min_length: Option<usize>,
        /// Maximum length in characters
        max_length: Option<usize>,
        /// Default value
        default: Option<String>,
    },
    /// Text restricted to `values`
    StringEnum {
        /// Allowed values, in display order
        values: Vec<String>,
        /// Minimum length in characters
        min_length: Option<usize>,
        /// Maximum length in characters
        max_length: Option<usize>,
        /// Default value, one of `values`
        default: Option<String>,
    },
    /// Floating point number
    Number {
        /// Inclusive lower bound
        min: Option<f64>,
        /// Inclusive upper bound
        max: Option<f64>,
        /// Default value
        default: Option<f64>,
    },
    /// True/false
    Boolean {
        /// Default value
        default: Option<bool>,
    },
    /// Calendar date
    Date {
        /// Earliest allowed date
        min: Option<NaiveDate>,
        /// Latest allowed date
        max: Option<NaiveDate>,
        /// Default value
        default: Option<NaiveDate>,
    },
}

impl FieldType {
    /// Unconstrained text
    #[must_use]
    pub const fn string() -> Self {
        Self::String {
            min_length: None,
            max_length: None,
            default: None,
        }
    }

    /// Closed choice over `values`
    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::StringEnum {
            values: values.into_iter().map(Into::into).collect(),
            min_length: None,
            max_length: None,
            default: None,
        }
    }

    /// Unbounded number
    #[must_use]
    pub const fn number() -> Self {
        Self::Number {
            min: None,
            max: None,
            default: None,
        }
    }

    /// Number within `[min, max]`
    #[must_use]
    pub const fn number_between(min: f64, max: f64) -> Self {
        Self::Number {
            min: Some(min),
            max: Some(max),
            default: None,
        }
    }

    /// Boolean without default
    #[must_use]
    pub const fn boolean() -> Self {
        Self::Boolean { default: None }
    }

    /// Unbounded date
    #[must_use]
    pub const fn date() -> Self {
        Self::Date {
            min: None,
            max: None,
            default: None,
        }
    }

    /// The kind of this type
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        match self {
            Self::String { .. } => FieldKind::String,
            Self::StringEnum { .. } => FieldKind::StringEnum,
            Self::Number { .. } => FieldKind::Number,
            Self::Boolean { .. } => FieldKind::Boolean,
            Self::Date { .. } => FieldKind::Date,
        }
    }

    /// Default value as JSON, if any
    #[must_use]
    pub fn default_json(&self) -> Option<Value> {
        match self {
            Self::String { default, .. } | Self::StringEnum { default, .. } => {
                default.clone().map(Value::String)
            }
            Self::Number { default, .. } => default.map(number_to_json),
            Self::Boolean { default } => default.map(Value::Bool),
            Self::Date { default, .. } => default.map(|d| Value::String(format_iso_date(d))),
        }
    }
}

/// One user-editable attribute of the user schema
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Field name, unique within the schema
    pub name: String,
    /// Whether a value must be supplied
    pub required: bool,
    /// Type and constraints
    pub field_type: FieldType,
}

impl FieldDefinition {
    /// Create an optional field
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            required: false,
            field_type,
        }
    }

    /// Builder-style setter for `required`
    #[must_use]
    pub const fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// The kind of this field
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.field_type.kind()
    }

    /// Whether this field is one of the protected core fields
    #[must_use]
    pub fn is_protected(&self) -> bool {
        is_protected(&self.name)
    }

    /// Decode a field from its wire description
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchemaType`] when the wire type is not one of the five
    /// supported kinds.
    pub fn from_wire(name: &str, wire: &WireField) -> Result<Self> {
        // The admin reference is stored as an object id server-side; it is
        // never rendered from its declared type.
        let kind = if name == ASSIGNED_ADMIN_FIELD {
            FieldKind::String
        } else {
            match wire.type_name.parse::<FieldKind>() {
                Ok(FieldKind::String) if wire.has_enum() => FieldKind::StringEnum,
                Ok(kind) => kind,
                Err(_) => {
                    return Err(Error::SchemaType {
                        field: name.to_string(),
                        type_name: wire.type_name.clone(),
                    });
                }
            }
        };

        let text_default = wire
            .default
            .as_ref()
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let min_length = wire.min_length.as_ref().and_then(value_as_usize);
        let max_length = wire.max_length.as_ref().and_then(value_as_usize);

        let field_type = match kind {
            FieldKind::String => FieldType::String {
                min_length,
                max_length,
                default: text_default,
            },
            FieldKind::StringEnum => FieldType::StringEnum {
                values: wire.enum_values.clone().unwrap_or_default(),
                min_length,
                max_length,
                default: text_default,
            },
            FieldKind::Number => FieldType::Number {
                min: wire.min.as_ref().and_then(value_as_f64),
                max: wire.max.as_ref().and_then(value_as_f64),
                default: wire.default.as_ref().and_then(value_as_f64),
            },
            FieldKind::Boolean => FieldType::Boolean {
                default: wire.default.as_ref().and_then(value_as_bool),
            },
            FieldKind::Date => FieldType::Date {
                min: wire.min.as_ref().and_then(value_as_date),
                max: wire.max.as_ref().and_then(value_as_date),
                default: wire.default.as_ref().and_then(value_as_date),
            },
        };

        Ok(Self {
            name: name.to_string(),
            required: wire.required,
            field_type,
        })
    }

    /// Encode this field the way the update endpoint expects it
    #[must_use]
    pub fn to_wire(&self) -> WireField {
        let mut wire = WireField {
            type_name: self.kind().wire_name().to_string(),
            required: self.required,
            default: self.field_type.default_json(),
            ..WireField::default()
        };

        match &self.field_type {
            FieldType::String {
                min_length,
                max_length,
                ..
            } => {
                wire.min_length = min_length.map(Value::from);
                wire.max_length = max_length.map(Value::from);
            }
            FieldType::StringEnum {
                values,
                min_length,
                max_length,
                ..
            } => {
                if !values.is_empty() {
                    wire.enum_values = Some(values.clone());
                }
                wire.min_length = min_length.map(Value::from);
                wire.max_length = max_length.map(Value::from);
            }
            FieldType::Number { min, max, .. } => {
                wire.min = min.map(number_to_json);
                wire.max = max.map(number_to_json);
            }
            FieldType::Boolean { .. } => {}
            FieldType::Date { min, max, .. } => {
                wire.min = min.map(|d| Value::String(format_iso_date(d)));
                wire.max = max.map(|d| Value::String(format_iso_date(d)));
            }
        }

        wire
    }

    /// Encode this field as an add-field request body
    #[must_use]
    pub fn to_add_request(&self) -> AddFieldRequest {
        let wire = self.to_wire();
        AddFieldRequest {
            field_name: self.name.clone(),
            field_type: wire.type_name.clone(),
            options: FieldOptions {
                required: wire.required,
                enum_values: wire.enum_values,
                default: wire.default,
                min_length: wire.min_length,
                max_length: wire.max_length,
                min: wire.min,
                max: wire.max,
            },
        }
    }
}

/// Field description as exchanged with the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireField {
    /// Declared type, case-insensitive (`String`, `number`, ...)
    #[serde(rename = "type", default)]
    pub type_name: String,

    /// Required flag; mongoose-style `[true, "message"]` arrays are accepted
    #[serde(default, deserialize_with = "lenient_required")]
    pub required: bool,

    /// Closed set of allowed values
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,

    /// Default value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Minimum string length
    #[serde(rename = "minlength", default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<Value>,

    /// Maximum string length
    #[serde(rename = "maxlength", default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<Value>,

    /// Lower bound for numbers and dates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Value>,

    /// Upper bound for numbers and dates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Value>,
}

impl WireField {
    /// Whether the field carries a non-empty `enum` list
    #[must_use]
    pub fn has_enum(&self) -> bool {
        self.enum_values.as_ref().is_some_and(|v| !v.is_empty())
    }
}

fn lenient_required<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Array(items) => items.first().and_then(Value::as_bool).unwrap_or(false),
        _ => false,
    })
}

/// Body of `POST user/schema/add-field`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFieldRequest {
    /// New field name
    pub field_name: String,
    /// Wire type name
    pub field_type: String,
    /// Constraints
    pub options: FieldOptions,
}

/// Constraint block of an add-field request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOptions {
    /// Required flag
    pub required: bool,
    /// Allowed values
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
    /// Default value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Minimum string length
    #[serde(rename = "minlength", skip_serializing_if = "Option::is_none")]
    pub min_length: Option<Value>,
    /// Maximum string length
    #[serde(rename = "maxlength", skip_serializing_if = "Option::is_none")]
    pub max_length: Option<Value>,
    /// Lower bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<Value>,
    /// Upper bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<Value>,
}

/// Partial update of a field's constraints
///
/// `None` leaves a setting untouched; `Some(Value::Null)` clears it. The
/// field's type cannot be changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPatch {
    /// New required flag
    pub required: Option<bool>,
    /// Replacement option list (enumerations only)
    pub enum_values: Option<Vec<String>>,
    /// New default value
    pub default: Option<Value>,
    /// New minimum length (text kinds)
    pub min_length: Option<Value>,
    /// New maximum length (text kinds)
    pub max_length: Option<Value>,
    /// New lower bound (numbers and dates)
    pub min: Option<Value>,
    /// New upper bound (numbers and dates)
    pub max: Option<Value>,
}

impl FieldPatch {
    /// Whether the patch changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to an existing definition
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the patch sets an option that does
    /// not exist for the field's kind, or a value of the wrong type.
    pub fn apply(&self, definition: &FieldDefinition) -> Result<FieldDefinition> {
        let mut updated = definition.clone();
        let name = definition.name.as_str();
        if let Some(required) = self.required {
            updated.required = required;
        }

        let kind = definition.kind();
        let reject = |option: &str| {
            Error::validation(
                name,
                format!("option '{option}' does not apply to {kind} fields"),
            )
        };

        match &mut updated.field_type {
            FieldType::String {
                min_length,
                max_length,
                default,
            } => {
                if self.enum_values.is_some() {
                    return Err(reject("enum"));
                }
                if self.min.is_some() || self.max.is_some() {
                    return Err(reject("min/max"));
                }
                patch_slot(min_length, self.min_length.as_ref(), value_as_usize, name)?;
                patch_slot(max_length, self.max_length.as_ref(), value_as_usize, name)?;
                patch_slot(default, self.default.as_ref(), text_value, name)?;
            }
            FieldType::StringEnum {
                values,
                min_length,
                max_length,
                default,
            } => {
                if self.min.is_some() || self.max.is_some() {
                    return Err(reject("min/max"));
                }
                if let Some(new_values) = &self.enum_values {
                    values.clone_from(new_values);
                }
                patch_slot(min_length, self.min_length.as_ref(), value_as_usize, name)?;
                patch_slot(max_length, self.max_length.as_ref(), value_as_usize, name)?;
                patch_slot(default, self.default.as_ref(), text_value, name)?;
            }
            FieldType::Number { min, max, default } => {
                if self.enum_values.is_some() {
                    return Err(reject("enum"));
                }
                if self.min_length.is_some() || self.max_length.is_some() {
                    return Err(reject("minlength/maxlength"));
                }
                patch_slot(min, self.min.as_ref(), value_as_f64, name)?;
                patch_slot(max, self.max.as_ref(), value_as_f64, name)?;
                patch_slot(default, self.default.as_ref(), value_as_f64, name)?;
            }
            FieldType::Boolean { default } => {
                if self.enum_values.is_some()
                    || self.min_length.is_some()
                    || self.max_length.is_some()
                    || self.min.is_some()
                    || self.max.is_some()
                {
                    return Err(reject("constraints"));
                }
                patch_slot(default, self.default.as_ref(), value_as_bool, name)?;
            }
            FieldType::Date { min, max, default } => {
                if self.enum_values.is_some() {
                    return Err(reject("enum"));
                }
                if self.min_length.is_some() || self.max_length.is_some() {
                    return Err(reject("minlength/maxlength"));
                }
                patch_slot(min, self.min.as_ref(), value_as_date, name)?;
                patch_slot(max, self.max.as_ref(), value_as_date, name)?;
                patch_slot(default, self.default.as_ref(), value_as_date, name)?;
            }
        }

        Ok(updated)
    }
}

fn text_value(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn patch_slot<T>(
    slot: &mut Option<T>,
    update: Option<&Value>,
    convert: impl Fn(&Value) -> Option<T>,
    field: &str,
) -> Result<()> {
    match update {
        None => Ok(()),
        Some(Value::Null) => {
            *slot = None;
            Ok(())
        }
        Some(value) => {
            let converted = convert(value)
                .ok_or_else(|| Error::validation(field, format!("invalid option value {value}")))?;
            *slot = Some(converted);
            Ok(())
        }
    }
}

/// `GET user/schema` response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDocument {
    /// Field descriptions, in server order
    #[serde(default)]
    pub fields: IndexMap<String, WireField>,
}

/// A schema field whose declared type is not supported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedField {
    /// Field name
    pub name: String,
    /// Declared type as received
    pub type_name: String,
}

/// The user schema: field name to definition, in server order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    fields: IndexMap<String, FieldDefinition>,
    unsupported: Vec<UnsupportedField>,
}

impl Schema {
    /// Build a schema from already decoded definitions
    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = FieldDefinition>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|def| (def.name.clone(), def))
                .collect(),
            unsupported: Vec::new(),
        }
    }

    /// Decode a server document
    ///
    /// Fields of unknown type are logged and kept aside in
    /// [`Schema::unsupported`]; they never fail the whole schema.
    #[must_use]
    pub fn from_document(document: &SchemaDocument) -> Self {
        let mut schema = Self::default();

        for (name, wire) in &document.fields {
            match FieldDefinition::from_wire(name, wire) {
                Ok(definition) => {
                    schema.fields.insert(name.clone(), definition);
                }
                Err(err) => {
                    warn!(field = %name, type_name = %wire.type_name, "{err}");
                    schema.unsupported.push(UnsupportedField {
                        name: name.clone(),
                        type_name: wire.type_name.clone(),
                    });
                }
            }
        }

        let missing = schema.missing_protected();
        if !missing.is_empty() {
            warn!(?missing, "schema is missing protected fields");
        }

        schema
    }

    /// Encode back into a server document
    #[must_use]
    pub fn to_document(&self) -> SchemaDocument {
        let mut fields: IndexMap<String, WireField> = self
            .fields
            .iter()
            .map(|(name, def)| (name.clone(), def.to_wire()))
            .collect();
        for field in &self.unsupported {
            fields.insert(
                field.name.clone(),
                WireField {
                    type_name: field.type_name.clone(),
                    ..WireField::default()
                },
            );
        }
        SchemaDocument { fields }
    }

    /// Look up a field
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.get(name)
    }

    /// Whether a field (supported or not) exists
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name) || self.unsupported.iter().any(|f| f.name == name)
    }

    /// Supported fields in server order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.values()
    }

    /// Supported field names in server order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Fields whose type could not be decoded
    #[must_use]
    pub fn unsupported(&self) -> &[UnsupportedField] {
        &self.unsupported
    }

    /// Number of supported fields
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema has no supported fields
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Protected fields the server did not report
    #[must_use]
    pub fn missing_protected(&self) -> Vec<&'static str> {
        PROTECTED_FIELDS
            .iter()
            .copied()
            .filter(|name| !self.contains(name))
            .collect()
    }
}
