//! Form assembly: schema plus record to form state, form state to payload

use crate::backend::AdminBackend;
use crate::directory::UserDirectory;
use crate::renderer::{Control, UNASSIGNED, render_admin_control, render_control, render_unsupported};
use crate::validation::{FormValue, validate};
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use userdesk_core::records::{CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use userdesk_core::types::{
    ASSIGNED_ADMIN_FIELD, FieldDefinition, FieldType, NAME_FIELD, NUMBER_FIELD, STATUS_FIELD,
    UnsupportedField,
};
use userdesk_core::{Administrator, Error, FieldErrors, Result, Schema, UserRecord, UserStatus};

/// Fields shown first, in this order, when the schema has them
pub const FORM_PREFIX: [&str; 4] = [NAME_FIELD, NUMBER_FIELD, STATUS_FIELD, ASSIGNED_ADMIN_FIELD];

/// Server-managed keys that never appear in a form or a payload
const SERVER_MANAGED: [&str; 4] = [ID_FIELD, CREATED_AT_FIELD, UPDATED_AT_FIELD, "__v"];

/// Whether the form creates a new user or edits an existing one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormMode {
    /// New user
    Create,
    /// Existing user
    Update {
        /// Identifier of the edited record
        id: String,
    },
}

/// Validated payload ready for the backend
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Body of a create call
    Create(Map<String, Value>),
    /// Body of an update call plus the target id
    Update {
        /// Record identifier
        id: String,
        /// Present fields, with cleared fields as `null`
        data: Map<String, Value>,
    },
}

impl Submission {
    /// The payload body
    #[must_use]
    pub const fn data(&self) -> &Map<String, Value> {
        match self {
            Self::Create(data) | Self::Update { data, .. } => data,
        }
    }
}

/// Working copy of a record being edited
#[derive(Debug, Clone)]
pub struct FormState {
    mode: FormMode,
    values: IndexMap<String, FormValue>,
    original: Map<String, Value>,
    fallback: Vec<(UnsupportedField, Option<Value>)>,
    errors: FieldErrors,
    in_flight: bool,
}

impl FormState {
    /// Create or update mode
    #[must_use]
    pub const fn mode(&self) -> &FormMode {
        &self.mode
    }

    /// Current value of a field
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&FormValue> {
        self.values.get(name)
    }

    /// Field names in display order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Apply an input change
    ///
    /// Clears the field's previous errors. Returns `false` for a field the
    /// form does not show.
    pub fn set_value(&mut self, name: &str, value: FormValue) -> bool {
        let Some(slot) = self.values.get_mut(name) else {
            debug!(field = name, "ignoring change for unknown form field");
            return false;
        };
        *slot = value;
        self.errors.shift_remove(name);
        true
    }

    /// Errors from the last collection attempt
    #[must_use]
    pub const fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    /// Errors for one field
    #[must_use]
    pub fn field_errors(&self, name: &str) -> &[String] {
        self.errors.get(name).map_or(&[][..], Vec::as_slice)
    }

    /// Whether a submit is in flight
    #[must_use]
    pub const fn is_submitting(&self) -> bool {
        self.in_flight
    }

    /// Mark a submit as started
    ///
    /// # Errors
    ///
    /// Returns [`Error::SubmitInProgress`] if one is already running.
    pub fn begin_submit(&mut self) -> Result<()> {
        if self.in_flight {
            return Err(Error::SubmitInProgress);
        }
        self.in_flight = true;
        Ok(())
    }

    /// Mark the running submit as finished
    pub const fn finish_submit(&mut self) {
        self.in_flight = false;
    }

    /// Control descriptors in display order, fallbacks last
    #[must_use]
    pub fn controls(&self, schema: &Schema, admins: &[Administrator]) -> Vec<Control> {
        let mut controls: Vec<Control> = self
            .values
            .iter()
            .filter_map(|(name, value)| {
                let definition = schema.get(name)?;
                Some(if name == ASSIGNED_ADMIN_FIELD {
                    render_admin_control(definition, admins, value)
                } else {
                    render_control(definition, value)
                })
            })
            .collect();
        controls.extend(
            self.fallback
                .iter()
                .map(|(field, raw)| render_unsupported(field, raw.as_ref())),
        );
        controls
    }
}

/// Names of the fields a form shows, in display order
///
/// `name`, `number`, `status` and `assignedAdmin` come first when present;
/// the remaining fields follow in schema order.
#[must_use]
pub fn display_order(schema: &Schema) -> Vec<&str> {
    let mut order: Vec<&str> = FORM_PREFIX
        .iter()
        .copied()
        .filter(|name| schema.get(name).is_some())
        .collect();
    order.extend(
        schema
            .field_names()
            .filter(|name| !FORM_PREFIX.contains(name) && !SERVER_MANAGED.contains(name)),
    );
    order
}

/// Build a form from the schema, optionally pre-filled from a record
#[must_use]
pub fn build_form(schema: &Schema, record: Option<&UserRecord>) -> FormState {
    let mut values = IndexMap::new();

    for name in display_order(schema) {
        let Some(definition) = schema.get(name) else {
            continue;
        };
        let value = match record {
            Some(record) if name == ASSIGNED_ADMIN_FIELD => {
                FormValue::Text(record.assigned_admin_id().unwrap_or(UNASSIGNED).to_string())
            }
            Some(record) => record
                .value(name)
                .map_or_else(|| empty_value(definition), |v| FormValue::from_json(definition, &v)),
            None if name == ASSIGNED_ADMIN_FIELD => FormValue::Text(UNASSIGNED.to_string()),
            None => initial_value(definition),
        };
        values.insert(name.to_string(), value);
    }

    let (mode, original) = match record {
        Some(record) => {
            let original = values
                .iter()
                .filter_map(|(name, value)| {
                    let definition = schema.get(name)?;
                    payload_value(definition, value).map(|v| (name.clone(), v))
                })
                .collect();
            (
                FormMode::Update {
                    id: record.id.clone(),
                },
                original,
            )
        }
        None => (FormMode::Create, Map::new()),
    };

    let fallback = schema
        .unsupported()
        .iter()
        .map(|field| {
            let raw = record.and_then(|r| r.value(&field.name));
            (field.clone(), raw)
        })
        .collect();

    FormState {
        mode,
        values,
        original,
        fallback,
        errors: FieldErrors::new(),
        in_flight: false,
    }
}

fn empty_value(definition: &FieldDefinition) -> FormValue {
    match definition.field_type {
        FieldType::Boolean { .. } => FormValue::Bool(false),
        _ => FormValue::Empty,
    }
}

fn initial_value(definition: &FieldDefinition) -> FormValue {
    match definition.field_type.default_json() {
        Some(default) => FormValue::from_json(definition, &default),
        None if definition.name == STATUS_FIELD => {
            FormValue::Text(UserStatus::default().as_str().to_string())
        }
        None => empty_value(definition),
    }
}

/// JSON value a field contributes to a payload; `None` means "leave out"
fn payload_value(definition: &FieldDefinition, value: &FormValue) -> Option<Value> {
    if definition.name == ASSIGNED_ADMIN_FIELD {
        return Some(match value.as_text().map(str::trim) {
            Some(id) if !id.is_empty() && id != UNASSIGNED => Value::String(id.to_string()),
            _ => Value::Null,
        });
    }
    value.to_json(definition)
}

/// Validate every visible field and build the payload
///
/// On failure the full error map is stored in the form and returned; no
/// payload is produced.
///
/// # Errors
///
/// Returns the per-field messages for every field that failed.
pub fn collect_submission(
    form: &mut FormState,
    schema: &Schema,
) -> std::result::Result<Submission, FieldErrors> {
    let mut errors = FieldErrors::new();

    for (name, value) in &form.values {
        let Some(definition) = schema.get(name) else {
            continue;
        };
        if name == ASSIGNED_ADMIN_FIELD {
            continue;
        }
        let messages = validate(definition, value);
        if !messages.is_empty() {
            errors.insert(name.clone(), messages);
        }
    }

    if !errors.is_empty() {
        debug!(fields = errors.len(), "form failed validation");
        form.errors.clone_from(&errors);
        return Err(errors);
    }
    form.errors.clear();

    let mut data = Map::new();
    for (name, value) in &form.values {
        if SERVER_MANAGED.contains(&name.as_str()) {
            continue;
        }
        let Some(definition) = schema.get(name) else {
            warn!(field = %name, "form field no longer in schema, leaving it out");
            continue;
        };
        match payload_value(definition, value) {
            Some(json) => {
                data.insert(name.clone(), json);
            }
            None if form.original.contains_key(name) => {
                data.insert(name.clone(), Value::Null);
            }
            None => {}
        }
    }

    Ok(match &form.mode {
        FormMode::Create => Submission::Create(data),
        FormMode::Update { id } => Submission::Update {
            id: id.clone(),
            data,
        },
    })
}

/// Clears the in-flight flag on every exit, including a dropped future
struct InFlight<'a> {
    form: &'a mut FormState,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.form.finish_submit();
    }
}

/// Validate, then create or update through the directory
///
/// A second call while one is in flight fails with
/// [`Error::SubmitInProgress`]. Cancelling the returned future releases the
/// form again. Validation failures never reach the backend.
/// On success the directory's list cache is invalidated.
///
/// # Errors
///
/// Returns [`Error::FieldErrors`] for invalid input, or the backend error.
pub async fn submit<B>(
    form: &mut FormState,
    schema: &Schema,
    directory: &UserDirectory<B>,
) -> Result<UserRecord>
where
    B: AdminBackend + ?Sized,
{
    form.begin_submit()?;
    let mut in_flight = InFlight { form };

    let submission =
        collect_submission(&mut *in_flight.form, schema).map_err(Error::FieldErrors)?;
    let result = match &submission {
        Submission::Create(data) => directory.create_user(data).await,
        Submission::Update { id, data } => directory.update_user(id, data).await,
    };
    drop(in_flight);

    if let Err(err) = &result {
        warn!(error = %err, "user submission failed");
    }
    result
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::from_fields([
            FieldDefinition::new("age", FieldType::number_between(18.0, 65.0)),
            FieldDefinition::new(NAME_FIELD, FieldType::string()).with_required(true),
            FieldDefinition::new(ASSIGNED_ADMIN_FIELD, FieldType::string()),
            FieldDefinition::new("verified", FieldType::boolean()),
            FieldDefinition::new(STATUS_FIELD, FieldType::enumeration(["active", "inactive", "blocked"])),
            FieldDefinition::new(NUMBER_FIELD, FieldType::string()),
            FieldDefinition::new("city", FieldType::string()),
        ])
    }

    #[test]
    fn test_display_order() {
        let schema = schema();
        assert_eq!(
            display_order(&schema),
            vec!["name", "number", "status", "assignedAdmin", "age", "verified", "city"]
        );
    }

    #[test]
    fn test_create_form_defaults() {
        let form = build_form(&schema(), None);
        assert_eq!(form.mode(), &FormMode::Create);
        assert_eq!(form.value("status"), Some(&FormValue::Text("active".into())));
        assert_eq!(
            form.value(ASSIGNED_ADMIN_FIELD),
            Some(&FormValue::Text(UNASSIGNED.into()))
        );
        assert_eq!(form.value("verified"), Some(&FormValue::Bool(false)));
        assert_eq!(form.value("age"), Some(&FormValue::Empty));
    }

    #[test]
    fn test_invalid_form_keeps_full_error_map() {
        let schema = schema();
        let mut form = build_form(&schema, None);
        assert!(form.set_value("age", FormValue::text("15")));

        let errors = collect_submission(&mut form, &schema).unwrap_err();
        assert_eq!(errors.get("name"), Some(&vec!["name is required".to_string()]));
        assert_eq!(errors.get("age"), Some(&vec!["Minimum value is 18".to_string()]));
        assert_eq!(form.errors().len(), 2);

        form.set_value("age", FormValue::text("30"));
        assert!(form.field_errors("age").is_empty());
        assert_eq!(form.field_errors("name").len(), 1);
    }

    #[test]
    fn test_create_payload() {
        let schema = schema();
        let mut form = build_form(&schema, None);
        form.set_value("name", FormValue::text("Ada"));
        form.set_value("age", FormValue::text("30"));

        let submission = collect_submission(&mut form, &schema).unwrap();
        let Submission::Create(data) = submission else {
            panic!("expected a create submission");
        };
        assert_eq!(
            Value::Object(data),
            json!({
                "name": "Ada",
                "status": "active",
                "assignedAdmin": null,
                "age": 30,
                "verified": false
            })
        );
    }

    #[test]
    fn test_update_payload_sends_cleared_fields_as_null() {
        let schema = schema();
        let record: UserRecord = serde_json::from_value(json!({
            "_id": "u1",
            "name": "Ada",
            "city": "Paris",
            "age": 40,
            "assignedAdmin": {"_id": "a1", "username": "root", "email": "r@x.io"},
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        let mut form = build_form(&schema, Some(&record));
        assert_eq!(form.value("city"), Some(&FormValue::Text("Paris".into())));
        form.set_value("city", FormValue::Empty);
        form.set_value(ASSIGNED_ADMIN_FIELD, FormValue::text(UNASSIGNED));

        let submission = collect_submission(&mut form, &schema).unwrap();
        let Submission::Update { id, data } = submission else {
            panic!("expected an update submission");
        };
        assert_eq!(id, "u1");
        assert_eq!(data.get("city"), Some(&Value::Null));
        assert_eq!(data.get("assignedAdmin"), Some(&Value::Null));
        assert_eq!(data.get("age"), Some(&json!(40)));
        assert!(!data.contains_key("number"));
        assert!(!data.contains_key("createdAt"));
        assert!(!data.contains_key("_id"));
    }

    #[test]
    fn test_begin_submit_is_exclusive() {
        let mut form = build_form(&schema(), None);
        form.begin_submit().unwrap();
        assert!(form.is_submitting());
        assert!(matches!(form.begin_submit(), Err(Error::SubmitInProgress)));
        form.finish_submit();
        assert!(form.begin_submit().is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_submit_releases_form() {
        use crate::mock::MockBackend;
        use std::sync::Arc;
        use std::time::Duration;

        let backend = Arc::new(MockBackend::new());
        backend.delay_writes(Duration::from_secs(60));
        let directory = UserDirectory::new(Arc::clone(&backend));
        let schema = schema();
        let mut form = build_form(&schema, None);
        assert!(form.set_value(NAME_FIELD, FormValue::text("Ada")));

        let timed = tokio::time::timeout(
            Duration::from_millis(20),
            submit(&mut form, &schema, &directory),
        )
        .await;
        assert!(timed.is_err());
        assert!(!form.is_submitting());
        assert_eq!(backend.call_count("create_user"), 1);
        assert!(form.begin_submit().is_ok());
    }

    #[tokio::test]
    async fn test_failed_validation_releases_form() {
        use crate::mock::MockBackend;
        use std::sync::Arc;

        let directory = UserDirectory::new(Arc::new(MockBackend::new()));
        let schema = schema();
        let mut form = build_form(&schema, None);

        let err = submit(&mut form, &schema, &directory).await.unwrap_err();
        assert!(matches!(err, Error::FieldErrors(_)));
        assert!(!form.is_submitting());
    }

    #[test]
    fn test_set_value_on_unknown_field() {
        let mut form = build_form(&schema(), None);
        assert!(!form.set_value("password", FormValue::text("x")));
    }

    #[test]
    fn test_controls_include_fallbacks() {
        let doc: userdesk_core::types::SchemaDocument = serde_json::from_value(json!({
            "fields": {
                "name": {"type": "string"},
                "tags": {"type": "Mixed"}
            }
        }))
        .unwrap();
        let schema = Schema::from_document(&doc);
        let form = build_form(&schema, None);
        let controls = form.controls(&schema, &[]);

        let fields: Vec<&str> = controls.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "tags"]);
        assert!(controls.last().unwrap().disabled);
    }
}
