//! End-to-end flows over the mock backend: schema, form, directory, table

#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

mod common;

use common::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use userdesk_core::{Error, FieldDefinition, FieldType, UserQuery, UserStatus};
use userdesk_schema::{
    ColumnKind, FormMode, FormValue, ListOutcome, MockBackend, SessionStore, Submission,
    TableProjector, Widget, build_form, collect_submission, project_columns, render_control,
    submit,
};

#[tokio::test]
async fn test_age_bounds_checked_before_any_remote_call() {
    let ws = Workspace::with_mixed_schema();
    let schema = ws.schema.fetch_schema().await.unwrap();

    let mut form = build_form(&schema, None);
    assert!(form.set_value("name", FormValue::text("Ada")));
    assert!(form.set_value("age", FormValue::text("15")));

    let err = submit(&mut form, &schema, &ws.directory).await.unwrap_err();
    let Error::FieldErrors(errors) = err else {
        panic!("expected field errors, got {err:?}");
    };
    assert_eq!(errors["age"], vec!["Minimum value is 18".to_string()]);
    assert_eq!(form.field_errors("age"), ["Minimum value is 18".to_string()]);
    assert_eq!(ws.backend.call_count("create_user"), 0);
    assert!(!form.is_submitting());

    form.set_value("age", FormValue::text("30"));
    assert!(form.field_errors("age").is_empty());
    submit(&mut form, &schema, &ws.directory).await.unwrap();

    let payload = ws.backend.last_payload().unwrap();
    assert_eq!(payload["age"], json!(30));
    assert_eq!(ws.backend.call_count("create_user"), 1);
}

#[tokio::test]
async fn test_deleting_status_rejected_without_remote_call() {
    let ws = Workspace::new(MockBackend::new());

    let err = ws.schema.delete_field("status").await.unwrap_err();

    assert!(matches!(err, Error::ProtectedField { ref field } if field == "status"));
    assert_eq!(ws.backend.total_calls(), 0);
}

#[tokio::test]
async fn test_bulk_block_updates_cached_rows_and_clears_selection() {
    let ws = Workspace::new(MockBackend::new().with_users(["u1", "u2", "u3"]));
    let query = UserQuery::default();
    ws.directory.list(query.clone()).await.unwrap();

    ws.directory.toggle_selection("u1");
    ws.directory.toggle_selection("u2");
    let updated = ws.directory.bulk_update_status(UserStatus::Blocked).await.unwrap();

    assert_eq!(updated, 2);
    assert_eq!(ws.backend.call_count("bulk_update_status"), 1);
    assert!(ws.directory.selection().is_empty());
    assert!(ws.directory.is_stale(&query));

    let statuses: Vec<(String, UserStatus)> = ws
        .directory
        .cached(&query)
        .unwrap()
        .users
        .into_iter()
        .map(|u| (u.id, u.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("u1".to_string(), UserStatus::Blocked),
            ("u2".to_string(), UserStatus::Blocked),
            ("u3".to_string(), UserStatus::Active),
        ]
    );

    // the next list goes back to the backend
    ws.directory.list(query).await.unwrap();
    assert_eq!(ws.backend.call_count("fetch_users"), 2);
}

#[tokio::test]
async fn test_enum_without_default_offers_exactly_its_values() {
    let ws = Workspace::new(MockBackend::new());
    let grade = FieldDefinition::new("grade", FieldType::enumeration(["a", "b"]));
    let schema = ws.schema.add_field(&grade).await.unwrap();

    let definition = schema.get("grade").unwrap();
    let control = render_control(definition, &FormValue::Empty);

    let Widget::Choice {
        options,
        selected,
        allow_empty,
    } = control.widget
    else {
        panic!("expected a choice control");
    };
    let values: Vec<&str> = options.iter().map(|o| o.value.as_str()).collect();
    assert_eq!(values, vec!["a", "b"]);
    assert_eq!(selected, None);
    assert!(allow_empty);
}

#[tokio::test]
async fn test_five_types_round_trip_from_form_to_table() {
    let ws = Workspace::with_mixed_schema();
    let schema = ws.schema.fetch_schema().await.unwrap();

    let mut form = build_form(&schema, None);
    form.set_value("name", FormValue::text("Ada"));
    form.set_value("tier", FormValue::text("pro"));
    form.set_value("age", FormValue::text("30"));
    form.set_value("verified", FormValue::Bool(true));
    form.set_value("joined", FormValue::text("2024-02-29"));

    let record = submit(&mut form, &schema, &ws.directory).await.unwrap();
    assert!(record.conformance_errors(&schema).is_empty());

    let columns = project_columns(&schema);
    let keys: Vec<&str> = columns.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(
        keys,
        vec![
            "name",
            "number",
            "status",
            "assignedAdmin",
            "tier",
            "age",
            "verified",
            "joined",
            "tags"
        ]
    );
    assert_eq!(columns.last().unwrap().kind, ColumnKind::Raw);

    let cells = TableProjector::default().render_row(&record, &columns);
    assert_eq!(
        cells,
        vec!["Ada", "-", "Active", "-", "pro", "30", "Yes", "2024-02-29", "-"]
    );

    // editing the stored record clears a field with an explicit null
    let mut edit = build_form(&schema, Some(&record));
    assert_eq!(edit.mode(), &FormMode::Update { id: record.id.clone() });
    assert_eq!(edit.value("tier"), Some(&FormValue::text("pro")));
    edit.set_value("tier", FormValue::Empty);

    let Submission::Update { id, data } = collect_submission(&mut edit, &schema).unwrap() else {
        panic!("expected an update");
    };
    assert_eq!(id, record.id);
    assert_eq!(data["tier"], serde_json::Value::Null);
    assert_eq!(data["age"], json!(30));
    assert_eq!(data["verified"], json!(true));
}

#[tokio::test]
async fn test_projection_is_stable_across_fetches() {
    let ws = Workspace::with_mixed_schema();
    let first = project_columns(&ws.schema.fetch_schema().await.unwrap());
    let second = project_columns(&ws.schema.refresh().await.unwrap());
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_second_submit_suppressed_while_in_flight() {
    let ws = Workspace::with_mixed_schema();
    let schema = ws.schema.fetch_schema().await.unwrap();
    let mut form = build_form(&schema, None);
    form.set_value("name", FormValue::text("Ada"));

    form.begin_submit().unwrap();
    let err = submit(&mut form, &schema, &ws.directory).await.unwrap_err();
    assert!(matches!(err, Error::SubmitInProgress));
    assert_eq!(ws.backend.call_count("create_user"), 0);

    form.finish_submit();
    submit(&mut form, &schema, &ws.directory).await.unwrap();
    assert_eq!(ws.backend.call_count("create_user"), 1);
}

#[tokio::test]
async fn test_late_response_for_old_search_is_dropped() {
    let ws = Workspace::new(MockBackend::new().with_users(["u1", "u2"]));
    ws.backend.delay_search("User", Duration::from_millis(50));

    let slow = UserQuery {
        search: "User".into(),
        ..UserQuery::default()
    };
    let fast = UserQuery {
        search: "u2".into(),
        ..UserQuery::default()
    };
    let (old, new) = tokio::join!(ws.directory.list(slow), ws.directory.list(fast));

    assert_eq!(old.unwrap(), ListOutcome::Superseded);
    let page = new.unwrap().into_page().unwrap();
    assert_eq!(page.users.len(), 1);
    assert_eq!(ws.directory.current_page(), Some(page));
}

#[tokio::test]
async fn test_unauthorized_list_ends_session() {
    let ws = Workspace::new(MockBackend::new().with_users(["u1"]));
    let session = SessionStore::new(Arc::clone(&ws.backend));
    session.restore("expired");

    ws.backend.fail_next(Error::Unauthorized);
    let result = session.guard(ws.directory.list(UserQuery::default()).await);

    assert!(matches!(result, Err(Error::SessionEnded)));
    assert!(!session.is_signed_in());
    assert_eq!(ws.backend.token(), None);
}
