//! Backend capability trait

use async_trait::async_trait;
use serde_json::{Map, Value};
use userdesk_core::types::{AddFieldRequest, SchemaDocument, WireField};
use userdesk_core::{
    AdminProfile, Administrator, Credentials, ExportFormat, ImportSummary, LoginResponse,
    PasswordChange, PasswordReset, Result, UserPage, UserQuery, UserRecord, UserStatus,
};

/// Everything the administration core needs from the remote user service
///
/// The REST client is the production implementation; tests use
/// [`crate::mock::MockBackend`]. A hosted document-database backend only has
/// to implement this trait.
#[async_trait]
pub trait AdminBackend: Send + Sync {
    /// One page of users
    async fn fetch_users(&self, query: &UserQuery) -> Result<UserPage>;

    /// A single user
    async fn fetch_user(&self, id: &str) -> Result<UserRecord>;

    /// Create a user from a validated payload
    async fn create_user(&self, data: &Map<String, Value>) -> Result<UserRecord>;

    /// Update a user; `null` values clear fields
    async fn update_user(&self, id: &str, data: &Map<String, Value>) -> Result<UserRecord>;

    /// Delete one user
    async fn delete_user(&self, id: &str) -> Result<()>;

    /// Delete several users in one call
    async fn bulk_delete_users(&self, ids: &[String]) -> Result<()>;

    /// Change one user's status
    async fn update_status(&self, id: &str, status: UserStatus) -> Result<()>;

    /// Change the status of several users in one call
    async fn bulk_update_status(&self, ids: &[String], status: UserStatus) -> Result<()>;

    /// The raw schema document
    async fn fetch_schema(&self) -> Result<SchemaDocument>;

    /// Add a schema field
    async fn add_field(&self, request: &AddFieldRequest) -> Result<()>;

    /// Replace the constraints of an existing schema field
    async fn update_field(&self, name: &str, field: &WireField) -> Result<()>;

    /// Remove a schema field
    async fn delete_field(&self, name: &str) -> Result<()>;

    /// Administrators users can be assigned to
    async fn fetch_admins(&self) -> Result<Vec<Administrator>>;

    /// Assign users to an administrator
    async fn assign_users(&self, admin_id: &str, user_ids: &[String]) -> Result<()>;

    /// Remove users from an administrator
    async fn unassign_users(&self, admin_id: Option<&str>, user_ids: &[String]) -> Result<()>;

    /// Export users as a file body
    async fn export_users(&self, format: ExportFormat, fields: &[String]) -> Result<Vec<u8>>;

    /// Create users from an uploaded spreadsheet or CSV file
    async fn import_users(&self, file_name: &str, contents: Vec<u8>) -> Result<ImportSummary>;

    /// Exchange credentials for a token and profile
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse>;

    /// Invalidate the current token server-side
    async fn logout(&self) -> Result<()>;

    /// Exchange the current token for a fresh one
    async fn refresh_token(&self) -> Result<LoginResponse>;

    /// Ask for a password reset email
    async fn forgot_password(&self, email: &str) -> Result<()>;

    /// Set a new password with the token from a reset email
    async fn reset_password(&self, reset: &PasswordReset) -> Result<()>;

    /// Change the signed-in administrator's password
    async fn change_password(&self, change: &PasswordChange) -> Result<()>;

    /// Update the signed-in administrator's profile
    async fn update_profile(&self, data: &Map<String, Value>) -> Result<AdminProfile>;

    /// Install or clear the bearer token used by later calls
    fn set_token(&self, token: Option<String>);
}
