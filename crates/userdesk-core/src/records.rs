//! User, administrator and session records

use crate::types::{
    ASSIGNED_ADMIN_FIELD, FieldType, STATUS_FIELD, Schema,
};
use crate::utils::parse_iso_date;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Record creation timestamp key
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Record update timestamp key
pub const UPDATED_AT_FIELD: &str = "updatedAt";
/// Record identifier key
pub const ID_FIELD: &str = "_id";

/// Account status of a user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Normal account
    #[default]
    Active,
    /// Dormant account
    Inactive,
    /// Account blocked by an administrator
    Blocked,
    /// Status not known to this client
    #[serde(other)]
    Unknown,
}

impl UserStatus {
    /// Statuses an administrator can set
    pub const ALL: [Self; 3] = [Self::Active, Self::Inactive, Self::Blocked];

    /// Wire value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Blocked => "blocked",
            Self::Unknown => "unknown",
        }
    }

    /// Display label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Inactive => "Inactive",
            Self::Blocked => "Blocked",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "blocked" => Ok(Self::Blocked),
            other => Err(Error::validation(
                STATUS_FIELD,
                format!("unknown status '{other}' (expected active, inactive or blocked)"),
            )),
        }
    }
}

/// An administrator users can be assigned to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Administrator {
    /// Identifier
    #[serde(rename = "_id")]
    pub id: String,
    /// Login name
    #[serde(default)]
    pub username: String,
    /// Email address
    #[serde(default)]
    pub email: String,
}

impl Administrator {
    /// `username (email)`
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.username, self.email)
    }
}

/// `GET admin/list` response body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminList {
    /// Administrators
    #[serde(default)]
    pub admins: Vec<Administrator>,
}

/// Administrator reference on a user: populated object or bare id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AssignedAdmin {
    /// Populated reference
    Embedded(Administrator),
    /// Bare identifier
    Id(String),
}

impl AssignedAdmin {
    /// Identifier of the referenced administrator
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Embedded(admin) => &admin.id,
            Self::Id(id) => id,
        }
    }
}

/// One user as returned by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Server-assigned identifier
    #[serde(rename = "_id")]
    pub id: String,

    /// Assigned administrator, if any
    #[serde(rename = "assignedAdmin", default)]
    pub assigned_admin: Option<AssignedAdmin>,

    /// Account status
    #[serde(default)]
    pub status: UserStatus,

    /// Creation timestamp
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Last update timestamp
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Schema-driven attribute values
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl UserRecord {
    /// Empty record with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            assigned_admin: None,
            status: UserStatus::default(),
            created_at: None,
            updated_at: None,
            fields: Map::new(),
        }
    }

    /// Value of any attribute, including the fixed ones, as JSON
    ///
    /// Returns `None` for absent attributes and for `null` values.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<Value> {
        let value = match name {
            ID_FIELD => Some(Value::String(self.id.clone())),
            ASSIGNED_ADMIN_FIELD => self
                .assigned_admin
                .as_ref()
                .and_then(|admin| serde_json::to_value(admin).ok()),
            STATUS_FIELD => Some(Value::String(self.status.as_str().to_string())),
            CREATED_AT_FIELD => self.created_at.map(|ts| Value::String(ts.to_rfc3339())),
            UPDATED_AT_FIELD => self.updated_at.map(|ts| Value::String(ts.to_rfc3339())),
            _ => self.fields.get(name).cloned(),
        };
        value.filter(|v| !v.is_null())
    }

    /// Identifier of the assigned administrator
    #[must_use]
    pub fn assigned_admin_id(&self) -> Option<&str> {
        self.assigned_admin.as_ref().map(AssignedAdmin::id)
    }

    /// Fields whose stored value does not match the schema's declared type
    #[must_use]
    pub fn conformance_errors(&self, schema: &Schema) -> Vec<String> {
        let mut errors = Vec::new();

        for definition in schema.fields() {
            let name = definition.name.as_str();
            if name == ASSIGNED_ADMIN_FIELD || name == STATUS_FIELD {
                continue;
            }
            let Some(value) = self.fields.get(name).filter(|v| !v.is_null()) else {
                continue;
            };

            let compatible = match &definition.field_type {
                FieldType::String { .. } => value.is_string(),
                FieldType::StringEnum { values, .. } => value
                    .as_str()
                    .is_some_and(|s| values.iter().any(|allowed| allowed == s)),
                FieldType::Number { .. } => value.is_number(),
                FieldType::Boolean { .. } => value.is_boolean(),
                FieldType::Date { .. } => value.as_str().and_then(parse_iso_date).is_some(),
            };

            if !compatible {
                errors.push(format!(
                    "{name}: value {value} is not a valid {}",
                    definition.kind()
                ));
            }
        }

        errors
    }
}

/// Pagination block of a user list response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Total matching users
    #[serde(default)]
    pub total: u64,
    /// Current page (1-based)
    #[serde(default)]
    pub page: Option<u32>,
    /// Page size
    #[serde(default)]
    pub limit: Option<u32>,
}

/// `GET user` response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPage {
    /// Users on this page
    #[serde(default)]
    pub users: Vec<UserRecord>,
    /// Pagination information
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl UserPage {
    /// Number of pages for the given page size
    #[must_use]
    pub fn page_count(&self, limit: u32) -> u64 {
        let total = self.pagination.map_or(self.users.len() as u64, |p| p.total);
        if limit == 0 {
            return 0;
        }
        total.div_ceil(u64::from(limit))
    }
}

/// Parameters of a user list request; doubles as the cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserQuery {
    /// Page number, 1-based
    pub page: u32,
    /// Page size
    pub limit: u32,
    /// Free-text search
    pub search: String,
    /// Sort key; a leading `-` sorts descending
    pub sort: String,
    /// Additional equality filters
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl Default for UserQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: String::new(),
            sort: "-createdAt".to_string(),
            filters: BTreeMap::new(),
        }
    }
}

impl UserQuery {
    /// Query string pairs, filters last
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("page".to_string(), self.page.to_string()),
            ("limit".to_string(), self.limit.to_string()),
            ("search".to_string(), self.search.clone()),
            ("sort".to_string(), self.sort.clone()),
        ];
        pairs.extend(
            self.filters
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        pairs
    }
}

/// Export file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Comma separated values
    #[default]
    Csv,
    /// Excel workbook
    Xlsx,
    /// JSON array
    Json,
}

impl ExportFormat {
    /// Value of the `format` query parameter
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Json => "json",
        }
    }

    /// Suggested file name for an export taken at `now`
    #[must_use]
    pub fn file_name(self, now: DateTime<Utc>) -> String {
        format!(
            "users-export-{}.{}",
            now.format("%Y-%m-%dT%H-%M-%S"),
            self.as_str()
        )
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" => Ok(Self::Xlsx),
            "json" => Ok(Self::Json),
            other => Err(Error::validation(
                "format",
                format!("unsupported export format '{other}'"),
            )),
        }
    }
}

/// Role of a signed-in operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full administrator
    Admin,
    /// Human resources
    Hr,
    /// Vendor
    Vendor,
    /// Sales
    Sales,
    /// Role not known to this client
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Landing route of the role's dashboard
    #[must_use]
    pub const fn dashboard_route(self) -> Option<&'static str> {
        match self {
            Self::Admin => Some("/admin/dashboard"),
            Self::Hr => Some("/hr/dashboard"),
            Self::Vendor => Some("/vendor/dashboard"),
            Self::Sales => Some("/sales/dashboard"),
            Self::Unknown => None,
        }
    }
}

/// A named permission flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Permission name
    pub name: String,
    /// Whether it is granted
    #[serde(default)]
    pub allowed: bool,
}

/// Profile of the signed-in administrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminProfile {
    /// Identifier
    #[serde(rename = "_id", default)]
    pub id: String,
    /// Login name
    #[serde(default)]
    pub username: String,
    /// Email address
    #[serde(default)]
    pub email: String,
    /// Role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Granted permissions
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl AdminProfile {
    /// Whether `name` is present and allowed
    #[must_use]
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.name == name && p.allowed)
    }
}

/// Sign-in credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Email address
    pub email: String,
    /// Password
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// `POST admin/login` response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token
    pub token: String,
    /// Signed-in administrator
    pub admin: AdminProfile,
}

/// `POST admin/change-password` body
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChange {
    /// Password in use now
    pub current_password: String,
    /// Replacement password
    pub new_password: String,
}

impl fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordChange { .. }")
    }
}

/// `POST admin/reset-password` body
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordReset {
    /// Token from the reset email
    pub token: String,
    /// New password
    pub password: String,
}

impl fmt::Debug for PasswordReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordReset { .. }")
    }
}

/// `POST user/import` response body
///
/// Servers report different counters; anything unrecognised is kept in
/// `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    /// Server message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Users created
    #[serde(
        default,
        alias = "count",
        alias = "insertedCount",
        skip_serializing_if = "Option::is_none"
    )]
    pub imported: Option<u64>,
    /// Rows the server rejected
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Value>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::types::{FieldDefinition, FieldType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sample_record() -> UserRecord {
        serde_json::from_value(json!({
            "_id": "u1",
            "name": "Ada",
            "number": "5550100",
            "status": "blocked",
            "assignedAdmin": {"_id": "a1", "username": "root", "email": "root@example.com"},
            "createdAt": "2024-03-15T10:30:00Z",
            "age": 36,
            "nickname": null,
            "__v": 0
        }))
        .unwrap()
    }

    #[test]
    fn test_user_record_deserialization() {
        let record = sample_record();

        assert_eq!(record.id, "u1");
        assert_eq!(record.status, UserStatus::Blocked);
        assert_eq!(record.assigned_admin_id(), Some("a1"));
        assert!(record.created_at.is_some());
        assert!(record.updated_at.is_none());
        assert_eq!(record.fields.get("name"), Some(&json!("Ada")));
        assert!(!record.fields.contains_key("_id"));
        assert!(!record.fields.contains_key("status"));
    }

    #[test]
    fn test_record_value_lookup() {
        let record = sample_record();

        assert_eq!(record.value("status"), Some(json!("blocked")));
        assert_eq!(record.value("age"), Some(json!(36)));
        assert_eq!(record.value("nickname"), None);
        assert_eq!(record.value("missing"), None);
        assert_eq!(
            record.value("assignedAdmin"),
            Some(json!({"_id": "a1", "username": "root", "email": "root@example.com"}))
        );
        assert_eq!(
            record.value("createdAt"),
            Some(json!("2024-03-15T10:30:00+00:00"))
        );
    }

    #[test]
    fn test_assigned_admin_bare_id() {
        let record: UserRecord =
            serde_json::from_value(json!({"_id": "u2", "assignedAdmin": "a9"})).unwrap();
        assert_eq!(record.assigned_admin, Some(AssignedAdmin::Id("a9".into())));
        assert_eq!(record.status, UserStatus::Active);
    }

    #[test]
    fn test_conformance_errors() {
        let schema = Schema::from_fields([
            FieldDefinition::new("name", FieldType::string()),
            FieldDefinition::new("age", FieldType::number()),
            FieldDefinition::new("plan", FieldType::enumeration(["free", "pro"])),
        ]);

        let mut record = sample_record();
        assert!(record.conformance_errors(&schema).is_empty());

        record.fields.insert("age".into(), json!("old"));
        record.fields.insert("plan".into(), json!("gold"));
        let errors = record.conformance_errors(&schema);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("age:"));
        assert!(errors[1].starts_with("plan:"));
    }

    #[test]
    fn test_unknown_status_keeps_page_readable() {
        let page: UserPage = serde_json::from_value(json!({
            "users": [
                {"_id": "u1", "status": "pending"},
                {"_id": "u2", "status": "active"}
            ],
            "pagination": {"total": 2}
        }))
        .unwrap();

        assert_eq!(page.users.len(), 2);
        assert_eq!(page.users[0].status, UserStatus::Unknown);
        assert_eq!(page.users[0].value("status"), Some(json!("unknown")));
        assert_eq!(page.users[1].status, UserStatus::Active);
        assert!(!UserStatus::ALL.contains(&UserStatus::Unknown));
        assert!("unknown".parse::<UserStatus>().is_err());
    }

    #[test]
    fn test_password_bodies_use_wire_names() {
        let change = PasswordChange {
            current_password: "old".into(),
            new_password: "new".into(),
        };
        assert_eq!(
            serde_json::to_value(&change).unwrap(),
            json!({"currentPassword": "old", "newPassword": "new"})
        );
        assert!(!format!("{change:?}").contains("old"));

        let reset = PasswordReset {
            token: "t".into(),
            password: "secret".into(),
        };
        assert!(!format!("{reset:?}").contains("secret"));
    }

    #[test]
    fn test_import_summary_is_lenient() {
        let summary: ImportSummary = serde_json::from_value(json!({
            "message": "Users imported",
            "count": 12,
            "skipped": 1
        }))
        .unwrap();
        assert_eq!(summary.imported, Some(12));
        assert_eq!(summary.extra.get("skipped"), Some(&json!(1)));

        let empty: ImportSummary = serde_json::from_value(json!({})).unwrap();
        assert_eq!(empty, ImportSummary::default());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("Blocked".parse::<UserStatus>().unwrap(), UserStatus::Blocked);
        assert!("deleted".parse::<UserStatus>().is_err());
        assert_eq!(UserStatus::Inactive.label(), "Inactive");
    }

    #[test]
    fn test_user_query_defaults_and_pairs() {
        let mut query = UserQuery::default();
        query.filters.insert("status".into(), "active".into());

        assert_eq!(
            query.to_pairs(),
            vec![
                ("page".to_string(), "1".to_string()),
                ("limit".to_string(), "10".to_string()),
                ("search".to_string(), String::new()),
                ("sort".to_string(), "-createdAt".to_string()),
                ("status".to_string(), "active".to_string()),
            ]
        );
    }

    #[test]
    fn test_page_count() {
        let page = UserPage {
            users: Vec::new(),
            pagination: Some(Pagination {
                total: 21,
                page: Some(1),
                limit: Some(10),
            }),
        };
        assert_eq!(page.page_count(10), 3);
        assert_eq!(page.page_count(0), 0);
    }

    #[test]
    fn test_role_routes_and_unknown_role() {
        assert_eq!(Role::Hr.dashboard_route(), Some("/hr/dashboard"));
        let profile: AdminProfile = serde_json::from_value(json!({
            "_id": "a1",
            "username": "ops",
            "email": "ops@example.com",
            "role": "auditor",
            "permissions": [{"name": "users.export", "allowed": true}, {"name": "users.delete", "allowed": false}]
        }))
        .unwrap();

        assert_eq!(profile.role, Some(Role::Unknown));
        assert!(profile.has_permission("users.export"));
        assert!(!profile.has_permission("users.delete"));
        assert!(!profile.has_permission("schema.edit"));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let credentials = Credentials {
            email: "ops@example.com".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{credentials:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_export_format() {
        assert_eq!("XLSX".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("pdf".parse::<ExportFormat>().is_err());
        let now = DateTime::parse_from_rfc3339("2024-03-15T10:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            ExportFormat::Json.file_name(now),
            "users-export-2024-03-15T10-30-00.json"
        );
    }
}
