//! In-memory backend for tests and offline use

use crate::backend::AdminBackend;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use userdesk_core::records::{Pagination, Permission};
use userdesk_core::types::{AddFieldRequest, SchemaDocument, WireField};
use userdesk_core::{
    AdminProfile, Administrator, AssignedAdmin, Credentials, Error, ExportFormat, ImportSummary,
    LoginResponse, PasswordChange, PasswordReset, Result, Role, UserPage, UserQuery, UserRecord,
    UserStatus,
};

/// Token handed out by [`MockBackend::login`]
pub const MOCK_TOKEN: &str = "mock-token";

#[derive(Debug, Default)]
struct MockState {
    users: Vec<UserRecord>,
    schema: SchemaDocument,
    admins: Vec<Administrator>,
    calls: HashMap<&'static str, usize>,
    failures: VecDeque<Error>,
    token: Option<String>,
    last_add_request: Option<AddFieldRequest>,
    last_payload: Option<Map<String, Value>>,
    search_delays: HashMap<String, Duration>,
    write_delay: Option<Duration>,
    next_id: u64,
}

/// Backend keeping users, schema and administrators in memory
///
/// Every call is counted by name, and [`MockBackend::fail_next`] queues
/// errors that the following calls of any kind fail with, in order.
#[derive(Debug)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Backend with the core schema and no users
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                schema: default_schema(),
                ..MockState::default()
            }),
        }
    }

    /// Seed active users with the given ids, named `User <id>`
    #[must_use]
    pub fn with_users<I, S>(self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        {
            let mut state = self.state.lock();
            for id in ids {
                let mut user = UserRecord::new(id);
                user.fields
                    .insert("name".into(), Value::String(format!("User {}", user.id)));
                user.created_at = Some(Utc::now());
                state.users.push(user);
            }
        }
        self
    }

    /// Seed administrators as `(id, username, email)`
    #[must_use]
    pub fn with_admins<'a, I>(self, admins: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        self.state
            .lock()
            .admins
            .extend(admins.into_iter().map(|(id, username, email)| Administrator {
                id: id.into(),
                username: username.into(),
                email: email.into(),
            }));
        self
    }

    /// Replace the schema document
    #[must_use]
    pub fn with_schema(self, schema: SchemaDocument) -> Self {
        self.state.lock().schema = schema;
        self
    }

    /// Delay list responses for one search term
    pub fn delay_search(&self, search: impl Into<String>, delay: Duration) {
        self.state.lock().search_delays.insert(search.into(), delay);
    }

    /// Delay every create and update call
    pub fn delay_writes(&self, delay: Duration) {
        self.state.lock().write_delay = Some(delay);
    }

    async fn pause_write(&self) {
        let delay = self.state.lock().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    /// Queue `error`; each call takes the oldest queued failure
    pub fn fail_next(&self, error: Error) {
        self.state.lock().failures.push_back(error);
    }

    /// Number of calls made to one operation
    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.state.lock().calls.get(operation).copied().unwrap_or(0)
    }

    /// Number of calls made to any operation
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Token installed through [`AdminBackend::set_token`]
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    /// Body of the last add-field call
    #[must_use]
    pub fn last_add_request(&self) -> Option<AddFieldRequest> {
        self.state.lock().last_add_request.clone()
    }

    /// Body of the last create or update call
    #[must_use]
    pub fn last_payload(&self) -> Option<Map<String, Value>> {
        self.state.lock().last_payload.clone()
    }

    /// Stored copy of a user
    #[must_use]
    pub fn user(&self, id: &str) -> Option<UserRecord> {
        self.state.lock().users.iter().find(|u| u.id == id).cloned()
    }

    fn enter(&self, operation: &'static str) -> Result<()> {
        let mut state = self.state.lock();
        *state.calls.entry(operation).or_insert(0) += 1;
        state.failures.pop_front().map_or(Ok(()), Err)
    }

    fn apply_fields(state: &MockState, user: &mut UserRecord, data: &Map<String, Value>) {
        for (key, value) in data {
            match key.as_str() {
                "status" => {
                    if let Some(status) = value.as_str().and_then(|s| s.parse().ok()) {
                        user.status = status;
                    }
                }
                "assignedAdmin" => {
                    user.assigned_admin = value.as_str().map(|id| {
                        state
                            .admins
                            .iter()
                            .find(|a| a.id == id)
                            .map_or_else(|| AssignedAdmin::Id(id.to_string()), |a| {
                                AssignedAdmin::Embedded(a.clone())
                            })
                    });
                }
                _ if value.is_null() => {
                    user.fields.remove(key);
                }
                _ => {
                    user.fields.insert(key.clone(), value.clone());
                }
            }
        }
        user.updated_at = Some(Utc::now());
    }
}

fn mock_profile(email: &str) -> AdminProfile {
    AdminProfile {
        id: "admin-1".into(),
        username: "mock".into(),
        email: email.to_string(),
        role: Some(Role::Admin),
        permissions: vec![
            Permission {
                name: "users.export".into(),
                allowed: true,
            },
            Permission {
                name: "schema.delete".into(),
                allowed: false,
            },
        ],
    }
}

fn default_schema() -> SchemaDocument {
    serde_json::from_value(json!({
        "fields": {
            "name": {"type": "String", "required": true},
            "number": {"type": "String"},
            "status": {"type": "String", "enum": ["active", "inactive", "blocked"], "default": "active"},
            "assignedAdmin": {"type": "ObjectId"},
            "createdAt": {"type": "Date"},
            "updatedAt": {"type": "Date"}
        }
    }))
    .unwrap_or_default()
}

#[async_trait]
impl AdminBackend for MockBackend {
    async fn fetch_users(&self, query: &UserQuery) -> Result<UserPage> {
        self.enter("fetch_users")?;
        let delay = self.state.lock().search_delays.get(&query.search).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock();
        let needle = query.search.to_lowercase();
        let matching: Vec<&UserRecord> = state
            .users
            .iter()
            .filter(|user| {
                needle.is_empty()
                    || user
                        .fields
                        .get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
            })
            .filter(|user| {
                query
                    .filters
                    .get("status")
                    .is_none_or(|status| user.status.as_str() == status)
            })
            .collect();

        let limit = query.limit.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * limit;
        Ok(UserPage {
            users: matching.iter().skip(skip).take(limit).map(|u| (*u).clone()).collect(),
            pagination: Some(Pagination {
                total: u64::try_from(matching.len()).unwrap_or(u64::MAX),
                page: Some(query.page),
                limit: Some(query.limit),
            }),
        })
    }

    async fn fetch_user(&self, id: &str) -> Result<UserRecord> {
        self.enter("fetch_user")?;
        self.user(id).ok_or_else(|| Error::NotFound {
            resource: format!("user {id}"),
        })
    }

    async fn create_user(&self, data: &Map<String, Value>) -> Result<UserRecord> {
        self.enter("create_user")?;
        self.pause_write().await;
        let mut state = self.state.lock();
        state.next_id += 1;
        let mut user = UserRecord::new(format!("new{}", state.next_id));
        user.created_at = Some(Utc::now());
        Self::apply_fields(&state, &mut user, data);
        state.last_payload = Some(data.clone());
        state.users.push(user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: &str, data: &Map<String, Value>) -> Result<UserRecord> {
        self.enter("update_user")?;
        self.pause_write().await;
        let mut state = self.state.lock();
        let index = state
            .users
            .iter()
            .position(|u| u.id == id)
            .ok_or_else(|| Error::NotFound {
                resource: format!("user {id}"),
            })?;
        let mut user = state.users.get(index).cloned().unwrap_or_else(|| UserRecord::new(id));
        Self::apply_fields(&state, &mut user, data);
        state.last_payload = Some(data.clone());
        if let Some(slot) = state.users.get_mut(index) {
            *slot = user.clone();
        }
        Ok(user)
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        self.enter("delete_user")?;
        self.state.lock().users.retain(|u| u.id != id);
        Ok(())
    }

    async fn bulk_delete_users(&self, ids: &[String]) -> Result<()> {
        self.enter("bulk_delete_users")?;
        self.state.lock().users.retain(|u| !ids.contains(&u.id));
        Ok(())
    }

    async fn update_status(&self, id: &str, status: UserStatus) -> Result<()> {
        self.enter("update_status")?;
        let mut state = self.state.lock();
        let user = state
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or_else(|| Error::NotFound {
                resource: format!("user {id}"),
            })?;
        user.status = status;
        Ok(())
    }

    async fn bulk_update_status(&self, ids: &[String], status: UserStatus) -> Result<()> {
        self.enter("bulk_update_status")?;
        for user in self
            .state
            .lock()
            .users
            .iter_mut()
            .filter(|u| ids.contains(&u.id))
        {
            user.status = status;
        }
        Ok(())
    }

    async fn fetch_schema(&self) -> Result<SchemaDocument> {
        self.enter("fetch_schema")?;
        Ok(self.state.lock().schema.clone())
    }

    async fn add_field(&self, request: &AddFieldRequest) -> Result<()> {
        self.enter("add_field")?;
        let mut state = self.state.lock();
        if state.schema.fields.contains_key(&request.field_name) {
            return Err(Error::Remote {
                status: Some(400),
                message: "Field already exists".into(),
            });
        }
        let options = &request.options;
        state.schema.fields.insert(
            request.field_name.clone(),
            WireField {
                type_name: request.field_type.clone(),
                required: options.required,
                enum_values: options.enum_values.clone(),
                default: options.default.clone(),
                min_length: options.min_length.clone(),
                max_length: options.max_length.clone(),
                min: options.min.clone(),
                max: options.max.clone(),
            },
        );
        state.last_add_request = Some(request.clone());
        Ok(())
    }

    async fn update_field(&self, name: &str, field: &WireField) -> Result<()> {
        self.enter("update_field")?;
        let mut state = self.state.lock();
        let slot = state.schema.fields.get_mut(name).ok_or_else(|| Error::NotFound {
            resource: format!("schema field '{name}'"),
        })?;
        *slot = field.clone();
        Ok(())
    }

    async fn delete_field(&self, name: &str) -> Result<()> {
        self.enter("delete_field")?;
        self.state
            .lock()
            .schema
            .fields
            .shift_remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound {
                resource: format!("schema field '{name}'"),
            })
    }

    async fn fetch_admins(&self) -> Result<Vec<Administrator>> {
        self.enter("fetch_admins")?;
        Ok(self.state.lock().admins.clone())
    }

    async fn assign_users(&self, admin_id: &str, user_ids: &[String]) -> Result<()> {
        self.enter("assign_users")?;
        let mut state = self.state.lock();
        let admin = state
            .admins
            .iter()
            .find(|a| a.id == admin_id)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                resource: format!("admin {admin_id}"),
            })?;
        for user in state.users.iter_mut().filter(|u| user_ids.contains(&u.id)) {
            user.assigned_admin = Some(AssignedAdmin::Embedded(admin.clone()));
        }
        Ok(())
    }

    async fn unassign_users(&self, _admin_id: Option<&str>, user_ids: &[String]) -> Result<()> {
        self.enter("unassign_users")?;
        for user in self
            .state
            .lock()
            .users
            .iter_mut()
            .filter(|u| user_ids.contains(&u.id))
        {
            user.assigned_admin = None;
        }
        Ok(())
    }

    async fn export_users(&self, format: ExportFormat, fields: &[String]) -> Result<Vec<u8>> {
        self.enter("export_users")?;
        if format != ExportFormat::Json {
            return Err(Error::Remote {
                status: Some(501),
                message: format!("{} export is not available offline", format.as_str()),
            });
        }
        let state = self.state.lock();
        let rows: Vec<Map<String, Value>> = state
            .users
            .iter()
            .map(|user| {
                fields
                    .iter()
                    .filter_map(|f| user.value(f).map(|v| (f.clone(), v)))
                    .collect()
            })
            .collect();
        Ok(serde_json::to_vec(&rows)?)
    }

    async fn import_users(&self, file_name: &str, contents: Vec<u8>) -> Result<ImportSummary> {
        self.enter("import_users")?;
        let text = String::from_utf8(contents).map_err(|_| Error::Remote {
            status: Some(400),
            message: format!("{file_name} is not a CSV file"),
        })?;
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let header: Vec<String> = lines
            .next()
            .map(|line| line.split(',').map(|c| c.trim().to_string()).collect())
            .unwrap_or_default();

        let mut state = self.state.lock();
        let mut imported = 0_u64;
        for line in lines {
            let data: Map<String, Value> = header
                .iter()
                .zip(line.split(','))
                .map(|(key, cell)| (key.clone(), Value::String(cell.trim().to_string())))
                .collect();
            state.next_id += 1;
            let mut user = UserRecord::new(format!("new{}", state.next_id));
            user.created_at = Some(Utc::now());
            Self::apply_fields(&state, &mut user, &data);
            state.users.push(user);
            imported += 1;
        }
        Ok(ImportSummary {
            message: Some(format!("Imported {imported} user(s)")),
            imported: Some(imported),
            ..ImportSummary::default()
        })
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse> {
        self.enter("login")?;
        if credentials.password.is_empty() {
            return Err(Error::Unauthorized);
        }
        Ok(LoginResponse {
            token: MOCK_TOKEN.to_string(),
            admin: mock_profile(&credentials.email),
        })
    }

    async fn logout(&self) -> Result<()> {
        self.enter("logout")
    }

    async fn refresh_token(&self) -> Result<LoginResponse> {
        self.enter("refresh_token")?;
        Ok(LoginResponse {
            token: format!("{MOCK_TOKEN}-refreshed"),
            admin: mock_profile("mock@example.com"),
        })
    }

    async fn forgot_password(&self, _email: &str) -> Result<()> {
        self.enter("forgot_password")
    }

    async fn reset_password(&self, reset: &PasswordReset) -> Result<()> {
        self.enter("reset_password")?;
        if reset.token.is_empty() {
            return Err(Error::Remote {
                status: Some(400),
                message: "Invalid or expired token".into(),
            });
        }
        Ok(())
    }

    async fn change_password(&self, change: &PasswordChange) -> Result<()> {
        self.enter("change_password")?;
        if change.current_password.is_empty() {
            return Err(Error::Remote {
                status: Some(400),
                message: "Current password is incorrect".into(),
            });
        }
        Ok(())
    }

    async fn update_profile(&self, data: &Map<String, Value>) -> Result<AdminProfile> {
        self.enter("update_profile")?;
        let mut profile = mock_profile("mock@example.com");
        if let Some(username) = data.get("username").and_then(Value::as_str) {
            profile.username = username.to_string();
        }
        if let Some(email) = data.get("email").and_then(Value::as_str) {
            profile.email = email.to_string();
        }
        Ok(profile)
    }

    fn set_token(&self, token: Option<String>) {
        self.state.lock().token = token;
    }
}
