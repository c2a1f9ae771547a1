//! Field validation
//!
//! Every check here is pure: it looks at a [`FieldDefinition`] and a raw form
//! value and returns human-readable messages. Nothing in this module performs
//! I/O, so a form that fails validation never reaches the backend.

use chrono::NaiveDate;
use serde_json::Value;
use std::collections::HashSet;
use userdesk_core::types::{FieldDefinition, FieldType};
use userdesk_core::utils::{
    format_iso_date, format_number, is_valid_field_name, number_to_json, parse_iso_date,
};
use userdesk_core::{Error, Result};

/// Raw value held by a form control
///
/// Numbers and dates stay as the text the operator typed until submission, so
/// that a parse failure can be reported instead of silently dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FormValue {
    /// Nothing entered
    #[default]
    Empty,
    /// Text as typed (strings, enum choices, numbers, dates)
    Text(String),
    /// Toggle state
    Bool(bool),
}

impl FormValue {
    /// Text value, or `Empty` for blank input
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.trim().is_empty() {
            Self::Empty
        } else {
            Self::Text(value)
        }
    }

    /// Whether nothing was entered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(text) => text.trim().is_empty(),
            Self::Bool(_) => false,
        }
    }

    /// The text, if this is a text value
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Load a stored JSON value into a control of the given field
    #[must_use]
    pub fn from_json(definition: &FieldDefinition, value: &Value) -> Self {
        match (&definition.field_type, value) {
            (_, Value::Null) => Self::Empty,
            (FieldType::Boolean { .. }, Value::Bool(b)) => Self::Bool(*b),
            (FieldType::Boolean { .. }, other) => {
                Self::Bool(userdesk_core::utils::value_as_bool(other).unwrap_or(false))
            }
            (FieldType::Date { .. }, Value::String(raw)) => parse_iso_date(raw)
                .map_or_else(|| Self::text(raw.clone()), |d| Self::Text(format_iso_date(d))),
            (_, Value::String(text)) => Self::text(text.clone()),
            (_, Value::Number(n)) => Self::Text(n.to_string()),
            (_, Value::Bool(b)) => Self::Text(b.to_string()),
            (_, other) => Self::Text(other.to_string()),
        }
    }

    /// Convert an already validated value into its JSON payload form
    ///
    /// Returns `None` for empty input. Booleans never come back empty.
    #[must_use]
    pub fn to_json(&self, definition: &FieldDefinition) -> Option<Value> {
        match (&definition.field_type, self) {
            (FieldType::Boolean { .. }, Self::Bool(b)) => Some(Value::Bool(*b)),
            (FieldType::Boolean { .. }, Self::Empty) => Some(Value::Bool(false)),
            (_, value) if value.is_empty() => None,
            (FieldType::Number { .. }, Self::Text(text)) => parse_number(text).map(number_to_json),
            (FieldType::Date { .. }, Self::Text(text)) => {
                parse_iso_date(text).map(|d| Value::String(format_iso_date(d)))
            }
            (_, Self::Text(text)) => Some(Value::String(text.clone())),
            (_, Self::Bool(b)) => Some(Value::Bool(*b)),
            (_, Self::Empty) => None,
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Validate a form value against a field definition
///
/// Returns every failed rule; an empty vector means the value is acceptable.
#[must_use]
pub fn validate(definition: &FieldDefinition, value: &FormValue) -> Vec<String> {
    let name = definition.name.as_str();
    let mut errors = Vec::new();

    if value.is_empty() {
        let exempt = matches!(definition.field_type, FieldType::Boolean { .. });
        if definition.required && !exempt {
            errors.push(format!("{name} is required"));
        }
        return errors;
    }

    // Text is sent as typed, so lengths and options are checked untrimmed.
    let raw = match value {
        FormValue::Text(text) => text.clone(),
        FormValue::Bool(b) => b.to_string(),
        FormValue::Empty => String::new(),
    };
    let text = raw.trim().to_string();

    match &definition.field_type {
        FieldType::String {
            min_length,
            max_length,
            ..
        } => check_length(&raw, *min_length, *max_length, &mut errors),
        FieldType::StringEnum {
            values,
            min_length,
            max_length,
            ..
        } => {
            if !values.iter().any(|allowed| *allowed == raw) {
                errors.push(format!("{name} must be one of: {}", values.join(", ")));
            }
            check_length(&raw, *min_length, *max_length, &mut errors);
        }
        FieldType::Number { min, max, .. } => match parse_number(&text) {
            None => errors.push(format!("{name} must be a number")),
            Some(number) => {
                if let Some(min) = min
                    && number < *min
                {
                    errors.push(format!("Minimum value is {}", format_number(*min)));
                }
                if let Some(max) = max
                    && number > *max
                {
                    errors.push(format!("Maximum value is {}", format_number(*max)));
                }
            }
        },
        FieldType::Boolean { .. } => {
            if !matches!(value, FormValue::Bool(_))
                && userdesk_core::utils::value_as_bool(&Value::String(text)).is_none()
            {
                errors.push(format!("{name} must be true or false"));
            }
        }
        FieldType::Date { min, max, .. } => match parse_iso_date(&text) {
            None => errors.push(format!("{name} must be a date (YYYY-MM-DD)")),
            Some(date) => check_date_range(date, *min, *max, &mut errors),
        },
    }

    errors
}

fn check_length(
    text: &str,
    min_length: Option<usize>,
    max_length: Option<usize>,
    errors: &mut Vec<String>,
) {
    let length = text.chars().count();
    if let Some(min) = min_length
        && length < min
    {
        errors.push(format!("Minimum length is {min}"));
    }
    if let Some(max) = max_length
        && length > max
    {
        errors.push(format!("Maximum length is {max}"));
    }
}

fn check_date_range(
    date: NaiveDate,
    min: Option<NaiveDate>,
    max: Option<NaiveDate>,
    errors: &mut Vec<String>,
) {
    if let Some(min) = min
        && date < min
    {
        errors.push(format!("Date must be on or after {}", format_iso_date(min)));
    }
    if let Some(max) = max
        && date > max
    {
        errors.push(format!("Date must be on or before {}", format_iso_date(max)));
    }
}

/// Check a new field name
///
/// # Errors
///
/// Returns [`Error::Validation`] for blank names and names that are not a
/// letter followed by letters and digits.
pub fn validate_field_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation("fieldName", "Field name is required"));
    }
    if !is_valid_field_name(name) {
        return Err(Error::validation(
            "fieldName",
            "Field name must start with a letter and contain only letters and numbers",
        ));
    }
    Ok(())
}

/// Check that a definition is internally consistent
///
/// # Errors
///
/// Returns [`Error::Validation`] naming the field for an invalid name,
/// inverted bounds, empty or duplicate options, or a default value that its
/// own constraints would reject.
pub fn validate_definition(definition: &FieldDefinition) -> Result<()> {
    validate_field_name(&definition.name)?;
    let name = definition.name.as_str();

    match &definition.field_type {
        FieldType::String {
            min_length,
            max_length,
            ..
        } => check_length_bounds(name, *min_length, *max_length)?,
        FieldType::StringEnum {
            values,
            min_length,
            max_length,
            ..
        } => {
            if values.is_empty() {
                return Err(Error::validation(name, "At least one option is required"));
            }
            let mut seen = HashSet::new();
            for value in values {
                if value.trim().is_empty() {
                    return Err(Error::validation(name, "Options must not be blank"));
                }
                if !seen.insert(value.as_str()) {
                    return Err(Error::validation(name, format!("Duplicate option '{value}'")));
                }
            }
            check_length_bounds(name, *min_length, *max_length)?;
        }
        FieldType::Number { min, max, .. } => {
            if min.is_some_and(|v| !v.is_finite()) || max.is_some_and(|v| !v.is_finite()) {
                return Err(Error::validation(name, "Bounds must be finite numbers"));
            }
            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                return Err(Error::validation(
                    name,
                    "Minimum value cannot exceed maximum value",
                ));
            }
        }
        FieldType::Boolean { .. } => {}
        FieldType::Date { min, max, .. } => {
            if let (Some(min), Some(max)) = (min, max)
                && min > max
            {
                return Err(Error::validation(
                    name,
                    "Earliest date cannot be after latest date",
                ));
            }
        }
    }

    if let Some(default) = definition.field_type.default_json() {
        let candidate = FieldDefinition {
            required: false,
            ..definition.clone()
        };
        let errors = validate(&candidate, &FormValue::from_json(&candidate, &default));
        if let Some(first) = errors.first() {
            return Err(Error::validation(
                name,
                format!("Default value is invalid: {first}"),
            ));
        }
    }

    Ok(())
}

fn check_length_bounds(name: &str, min: Option<usize>, max: Option<usize>) -> Result<()> {
    if let (Some(min), Some(max)) = (min, max)
        && min > max
    {
        return Err(Error::validation(
            name,
            "Minimum length cannot exceed maximum length",
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use rstest::rstest;
    use serde_json::json;

    fn text_field(min: Option<usize>, max: Option<usize>) -> FieldDefinition {
        FieldDefinition::new(
            "nickname",
            FieldType::String {
                min_length: min,
                max_length: max,
                default: None,
            },
        )
    }

    #[test]
    fn test_required_text_field() {
        let def = FieldDefinition::new("email", FieldType::string()).with_required(true);

        assert_eq!(validate(&def, &FormValue::Empty), vec!["email is required"]);
        assert_eq!(
            validate(&def, &FormValue::Text("   ".into())),
            vec!["email is required"]
        );
        assert!(validate(&def, &FormValue::text("a@b.c")).is_empty());
    }

    #[test]
    fn test_optional_empty_is_valid() {
        let def = FieldDefinition::new("age", FieldType::number_between(18.0, 65.0));
        assert!(validate(&def, &FormValue::Empty).is_empty());
    }

    #[test]
    fn test_required_boolean_is_exempt() {
        let def = FieldDefinition::new("verified", FieldType::boolean()).with_required(true);
        assert!(validate(&def, &FormValue::Empty).is_empty());
        assert!(validate(&def, &FormValue::Bool(false)).is_empty());
    }

    #[rstest]
    #[case("abc", vec!["Minimum length is 4"])]
    #[case("abcd", vec![])]
    #[case("abcdefgh", vec![])]
    #[case("abcdefghi", vec!["Maximum length is 8"])]
    #[case("ééééé", vec![])]
    #[case("  ab", vec![])]
    #[case(" ab", vec!["Minimum length is 4"])]
    #[case("abcdefg  ", vec!["Maximum length is 8"])]
    fn test_length_bounds(#[case] input: &str, #[case] expected: Vec<&str>) {
        let def = text_field(Some(4), Some(8));
        assert_eq!(validate(&def, &FormValue::text(input)), expected);
    }

    #[rstest]
    #[case("15", vec!["Minimum value is 18"])]
    #[case("18", vec![])]
    #[case("30", vec![])]
    #[case("65", vec![])]
    #[case("70", vec!["Maximum value is 65"])]
    #[case("abc", vec!["age must be a number"])]
    #[case("NaN", vec!["age must be a number"])]
    #[case("inf", vec!["age must be a number"])]
    fn test_number_rules(#[case] input: &str, #[case] expected: Vec<&str>) {
        let def = FieldDefinition::new("age", FieldType::number_between(18.0, 65.0));
        assert_eq!(validate(&def, &FormValue::text(input)), expected);
    }

    #[test]
    fn test_length_counts_what_is_sent() {
        let def = text_field(None, Some(3));
        let value = FormValue::text("ab  ");
        assert_eq!(validate(&def, &value), vec!["Maximum length is 3"]);
        assert_eq!(value.to_json(&def), Some(json!("ab  ")));
    }

    #[test]
    fn test_enum_membership() {
        let def = FieldDefinition::new("plan", FieldType::enumeration(["a", "b"]));
        assert!(validate(&def, &FormValue::text("a")).is_empty());
        assert_eq!(
            validate(&def, &FormValue::text("c")),
            vec!["plan must be one of: a, b"]
        );
    }

    #[test]
    fn test_date_rules() {
        let def = FieldDefinition::new(
            "joined",
            FieldType::Date {
                min: NaiveDate::from_ymd_opt(2020, 1, 1),
                max: NaiveDate::from_ymd_opt(2024, 12, 31),
                default: None,
            },
        );

        assert!(validate(&def, &FormValue::text("2022-06-01")).is_empty());
        assert_eq!(
            validate(&def, &FormValue::text("2019-12-31")),
            vec!["Date must be on or after 2020-01-01"]
        );
        assert_eq!(
            validate(&def, &FormValue::text("2025-01-01")),
            vec!["Date must be on or before 2024-12-31"]
        );
        assert_eq!(
            validate(&def, &FormValue::text("01/06/2022")),
            vec!["joined must be a date (YYYY-MM-DD)"]
        );
    }

    #[test]
    fn test_validate_field_name_messages() {
        assert!(validate_field_name("department").is_ok());
        let err = validate_field_name("").unwrap_err();
        assert!(err.to_string().contains("Field name is required"));
        let err = validate_field_name("2fa").unwrap_err();
        assert!(err.to_string().contains("must start with a letter"));
    }

    #[test]
    fn test_validate_definition_consistency() {
        let ok = FieldDefinition::new("plan", FieldType::enumeration(["free", "pro"]));
        assert!(validate_definition(&ok).is_ok());

        let dup = FieldDefinition::new("plan", FieldType::enumeration(["free", "free"]));
        assert!(validate_definition(&dup).is_err());

        let empty = FieldDefinition::new("plan", FieldType::enumeration(Vec::<String>::new()));
        assert!(validate_definition(&empty).is_err());

        let bad_default = FieldDefinition::new(
            "plan",
            FieldType::StringEnum {
                values: vec!["free".into(), "pro".into()],
                min_length: None,
                max_length: None,
                default: Some("gold".into()),
            },
        );
        let err = validate_definition(&bad_default).unwrap_err();
        assert!(err.to_string().contains("Default value is invalid"));

        let inverted = FieldDefinition::new("age", FieldType::number_between(65.0, 18.0));
        assert!(validate_definition(&inverted).is_err());

        let lengths = text_field(Some(9), Some(3));
        assert!(validate_definition(&lengths).is_err());

        let bad_name = FieldDefinition::new("first name", FieldType::string());
        assert!(validate_definition(&bad_name).is_err());
    }

    #[test]
    fn test_form_value_json_conversion() {
        let age = FieldDefinition::new("age", FieldType::number());
        assert_eq!(FormValue::text("30").to_json(&age), Some(json!(30)));
        assert_eq!(FormValue::text("2.5").to_json(&age), Some(json!(2.5)));
        assert_eq!(FormValue::Empty.to_json(&age), None);
        assert_eq!(
            FormValue::from_json(&age, &json!(30)),
            FormValue::Text("30".into())
        );

        let flag = FieldDefinition::new("verified", FieldType::boolean());
        assert_eq!(FormValue::Empty.to_json(&flag), Some(json!(false)));
        assert_eq!(FormValue::from_json(&flag, &json!(true)), FormValue::Bool(true));

        let joined = FieldDefinition::new("joined", FieldType::date());
        assert_eq!(
            FormValue::from_json(&joined, &json!("2024-03-15T00:00:00.000Z")),
            FormValue::Text("2024-03-15".into())
        );
    }

    proptest! {
        #[test]
        fn prop_required_iff_empty(input in "[ a-z]{0,12}") {
            let def = FieldDefinition::new("note", FieldType::string()).with_required(true);
            let value = FormValue::Text(input.clone());
            let errors = validate(&def, &value);
            let has_required = errors.iter().any(|e| e == "note is required");
            prop_assert_eq!(has_required, input.trim().is_empty());
        }

        #[test]
        fn prop_length_error_iff_out_of_bounds(
            input in "[ a-z]{0,10}[a-z][ a-z]{0,9}",
            min in 0usize..10,
            span in 0usize..10,
        ) {
            let max = min + span;
            let def = text_field(Some(min), Some(max));
            let errors = validate(&def, &FormValue::text(input.clone()));
            let len = input.chars().count();
            prop_assert_eq!(!errors.is_empty(), len < min || len > max);
        }
    }
}
