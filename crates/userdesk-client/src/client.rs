//! REST implementation of [`AdminBackend`]

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::multipart::{Form, Part};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use userdesk_core::config::ApiConfig;
use userdesk_core::records::AdminList;
use userdesk_core::types::{AddFieldRequest, SchemaDocument, WireField};
use userdesk_core::{
    AdminProfile, Administrator, Credentials, ExportFormat, ImportSummary, LoginResponse,
    PasswordChange, PasswordReset, Result, UserPage, UserQuery, UserRecord, UserStatus,
};
use userdesk_schema::AdminBackend;

/// HTTP client for the administration API
///
/// Clones share the bearer token, so a sign-in through one handle is seen by
/// every other.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
    retry: bool,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.read().as_ref().map(|_| "<redacted>"))
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Client with default settings against `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] for a URL that is not http(s).
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        Self::from_config(&ApiConfig {
            base_url: base_url.into(),
            ..ApiConfig::default()
        })
    }

    /// Client built from the `[api]` configuration section
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidConfig`] for an unusable base URL or if
    /// the HTTP client cannot be built.
    pub fn from_config(config: &ApiConfig) -> ClientResult<Self> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::invalid_config(format!(
                "base URL must start with http:// or https://, got '{base_url}'"
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent(concat!("userdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::invalid_config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            token: Arc::new(RwLock::new(config.token.clone())),
            retry: config.retry,
        })
    }

    /// Start with a bearer token
    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        *self.token.write() = Some(token.into());
        self
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Bearer token currently installed
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match self.token.read().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> ClientResult<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        Err(ClientError::api(status.as_u16(), message))
    }

    /// GET with one retry on transport errors and 5xx answers
    async fn get(&self, path: &str, query: &[(String, String)]) -> ClientResult<Response> {
        debug!(%path, "GET");
        let build = || self.request(Method::GET, path).query(query);
        match self.send(build()).await {
            Err(err) if self.retry && err.is_retryable() => {
                warn!(%path, error = %err, "GET failed, retrying once");
                self.send(build()).await
            }
            other => other,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> ClientResult<T> {
        let value: Value = self.get(path, query).await?.json().await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn call<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<Response> {
        debug!(%method, %path, "sending");
        let builder = self.request(method, path);
        let builder = match body {
            Some(body) => builder.json(body),
            None => builder,
        };
        self.send(builder).await
    }

    async fn call_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> ClientResult<T> {
        let value: Value = self.call(method, path, body).await?.json().await?;
        Ok(serde_json::from_value(value)?)
    }

    /// POST a file as the `file` field of a multipart body
    async fn upload(&self, path: &str, file_name: &str, contents: Vec<u8>) -> ClientResult<Value> {
        debug!(%path, file_name, bytes = contents.len(), "uploading");
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str(upload_mime(file_name))?;
        let builder = self
            .request(Method::POST, path)
            .multipart(Form::new().part("file", part));
        Ok(self.send(builder).await?.json().await?)
    }

    async fn call_user(
        &self,
        method: Method,
        path: &str,
        body: Option<&Map<String, Value>>,
    ) -> ClientResult<UserRecord> {
        let value: Value = self.call(method, path, body).await?.json().await?;
        decode_user(value)
    }
}

/// `body[key]` when the body wraps an object under `key`, else the body
fn unwrap_envelope(value: Value, key: &str) -> Value {
    match value {
        Value::Object(mut map) if map.get(key).is_some_and(Value::is_object) => {
            map.remove(key).unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// A user from a body that is either the record or `{ "user": record }`
fn decode_user(value: Value) -> ClientResult<UserRecord> {
    Ok(serde_json::from_value(unwrap_envelope(value, "user"))?)
}

/// Content type of an import file, by extension
fn upload_mime(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => "text/csv",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "xls" => "application/vnd.ms-excel",
        "json" => "application/json",
        _ => "application/octet-stream",
    }
}

fn user_path(id: &str) -> String {
    format!("user/{}", urlencoding::encode(id))
}

#[async_trait]
impl AdminBackend for ApiClient {
    #[instrument(skip(self), fields(page = query.page, search = %query.search))]
    async fn fetch_users(&self, query: &UserQuery) -> Result<UserPage> {
        Ok(self.get_json("user", &query.to_pairs()).await?)
    }

    async fn fetch_user(&self, id: &str) -> Result<UserRecord> {
        let value: Value = self.get_json(&user_path(id), &[]).await?;
        Ok(decode_user(value)?)
    }

    #[instrument(skip(self, data))]
    async fn create_user(&self, data: &Map<String, Value>) -> Result<UserRecord> {
        Ok(self.call_user(Method::POST, "user", Some(data)).await?)
    }

    #[instrument(skip(self, data))]
    async fn update_user(&self, id: &str, data: &Map<String, Value>) -> Result<UserRecord> {
        Ok(self.call_user(Method::PUT, &user_path(id), Some(data)).await?)
    }

    async fn delete_user(&self, id: &str) -> Result<()> {
        self.call::<Value>(Method::DELETE, &user_path(id), None).await?;
        Ok(())
    }

    async fn bulk_delete_users(&self, ids: &[String]) -> Result<()> {
        let body = json!({ "ids": ids });
        self.call(Method::POST, "user/bulk-delete", Some(&body)).await?;
        Ok(())
    }

    async fn update_status(&self, id: &str, status: UserStatus) -> Result<()> {
        let body = json!({ "status": status });
        let path = format!("{}/status", user_path(id));
        self.call(Method::PATCH, &path, Some(&body)).await?;
        Ok(())
    }

    async fn bulk_update_status(&self, ids: &[String], status: UserStatus) -> Result<()> {
        let body = json!({ "ids": ids, "status": status });
        self.call(Method::PATCH, "user/bulk-status", Some(&body)).await?;
        Ok(())
    }

    async fn fetch_schema(&self) -> Result<SchemaDocument> {
        Ok(self.get_json("user/schema", &[]).await?)
    }

    async fn add_field(&self, request: &AddFieldRequest) -> Result<()> {
        self.call(Method::POST, "user/schema/add-field", Some(request))
            .await?;
        Ok(())
    }

    async fn update_field(&self, name: &str, field: &WireField) -> Result<()> {
        let path = format!("user/schema/update/{}", urlencoding::encode(name));
        self.call(Method::PUT, &path, Some(field)).await?;
        Ok(())
    }

    async fn delete_field(&self, name: &str) -> Result<()> {
        let path = format!("user/schema/delete/{}", urlencoding::encode(name));
        self.call::<Value>(Method::DELETE, &path, None).await?;
        Ok(())
    }

    async fn fetch_admins(&self) -> Result<Vec<Administrator>> {
        let list: AdminList = self.get_json("admin/list", &[]).await?;
        Ok(list.admins)
    }

    async fn assign_users(&self, admin_id: &str, user_ids: &[String]) -> Result<()> {
        let body = json!({ "adminId": admin_id, "userIds": user_ids });
        self.call(Method::POST, "user/assign", Some(&body)).await?;
        Ok(())
    }

    async fn unassign_users(&self, admin_id: Option<&str>, user_ids: &[String]) -> Result<()> {
        let mut body = Map::new();
        if let Some(admin_id) = admin_id {
            body.insert("adminId".into(), Value::String(admin_id.to_string()));
        }
        body.insert("userIds".into(), json!(user_ids));
        self.call(Method::POST, "user/unassign", Some(&body)).await?;
        Ok(())
    }

    #[instrument(skip(self, fields), fields(format = format.as_str()))]
    async fn export_users(&self, format: ExportFormat, fields: &[String]) -> Result<Vec<u8>> {
        let mut query = vec![("format".to_string(), format.as_str().to_string())];
        if !fields.is_empty() {
            query.push(("fields".to_string(), fields.join(",")));
        }
        let bytes = self
            .get("user/export", &query)
            .await?
            .bytes()
            .await
            .map_err(ClientError::from)?;
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self, contents), fields(bytes = contents.len()))]
    async fn import_users(&self, file_name: &str, contents: Vec<u8>) -> Result<ImportSummary> {
        let value = self.upload("user/import", file_name, contents).await?;
        Ok(serde_json::from_value(value).map_err(ClientError::from)?)
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse> {
        Ok(self
            .call_json(Method::POST, "admin/login", Some(credentials))
            .await?)
    }

    async fn logout(&self) -> Result<()> {
        self.call::<Value>(Method::POST, "admin/logout", None).await?;
        Ok(())
    }

    async fn refresh_token(&self) -> Result<LoginResponse> {
        Ok(self
            .call_json::<Value, _>(Method::POST, "admin/refresh-token", None)
            .await?)
    }

    async fn forgot_password(&self, email: &str) -> Result<()> {
        let body = json!({ "email": email });
        self.call(Method::POST, "admin/forgot-password", Some(&body))
            .await?;
        Ok(())
    }

    async fn reset_password(&self, reset: &PasswordReset) -> Result<()> {
        self.call(Method::POST, "admin/reset-password", Some(reset))
            .await?;
        Ok(())
    }

    async fn change_password(&self, change: &PasswordChange) -> Result<()> {
        self.call(Method::POST, "admin/change-password", Some(change))
            .await?;
        Ok(())
    }

    async fn update_profile(&self, data: &Map<String, Value>) -> Result<AdminProfile> {
        let value: Value = self
            .call_json(Method::PUT, "admin/profile", Some(data))
            .await?;
        Ok(serde_json::from_value(unwrap_envelope(value, "admin")).map_err(ClientError::from)?)
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}
