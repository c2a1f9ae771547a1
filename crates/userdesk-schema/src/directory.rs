//! User directory: list cache, request sequencing, selection and bulk actions
//!
//! Pages are cached per [`UserQuery`]. Any successful mutation marks every
//! cached page stale; stale pages stay readable until a fresh fetch replaces
//! them. Every list request gets a [`QueryTicket`] and only the response for
//! the most recently issued ticket is applied, so a slow answer for an old
//! search term can never overwrite a newer one.

use crate::backend::AdminBackend;
use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument};
use userdesk_core::{
    Administrator, Error, ExportFormat, ImportSummary, Result, UserPage, UserQuery, UserRecord,
    UserStatus,
};

/// Sequence number handed out per list request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTicket {
    seq: u64,
    generation: u64,
    query: UserQuery,
}

impl QueryTicket {
    /// Position in issue order
    #[must_use]
    pub const fn seq(&self) -> u64 {
        self.seq
    }

    /// Query this ticket was issued for
    #[must_use]
    pub const fn query(&self) -> &UserQuery {
        &self.query
    }
}

/// Result of a list request
#[derive(Debug, Clone, PartialEq)]
pub enum ListOutcome {
    /// The page is now the current view
    Applied(UserPage),
    /// A newer request was issued meanwhile; the response was dropped
    Superseded,
}

impl ListOutcome {
    /// The applied page, if any
    #[must_use]
    pub fn into_page(self) -> Option<UserPage> {
        match self {
            Self::Applied(page) => Some(page),
            Self::Superseded => None,
        }
    }
}

/// Most pages kept in the list cache; the least recently fetched go first
pub const PAGE_CACHE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
struct CachedPage {
    page: UserPage,
    stale: bool,
    fetched_at: DateTime<Utc>,
    seq: u64,
}

/// Cached, sequenced access to the user list and user mutations
#[derive(Debug)]
pub struct UserDirectory<B: ?Sized> {
    backend: Arc<B>,
    pages: RwLock<HashMap<UserQuery, CachedPage>>,
    current: RwLock<Option<(UserQuery, UserPage)>>,
    admins: RwLock<Option<Vec<Administrator>>>,
    selection: Mutex<IndexSet<String>>,
    next_seq: AtomicU64,
    latest_seq: AtomicU64,
    generation: AtomicU64,
}

impl<B: AdminBackend + ?Sized> UserDirectory<B> {
    /// Create an empty directory over a backend
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            pages: RwLock::new(HashMap::new()),
            current: RwLock::new(None),
            admins: RwLock::new(None),
            selection: Mutex::new(IndexSet::new()),
            next_seq: AtomicU64::new(0),
            latest_seq: AtomicU64::new(0),
            generation: AtomicU64::new(0),
        }
    }

    /// The backend this directory talks to
    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Issue a ticket; it supersedes every earlier one
    pub fn issue(&self, query: UserQuery) -> QueryTicket {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.latest_seq.store(seq, Ordering::SeqCst);
        QueryTicket {
            seq,
            generation: self.generation.load(Ordering::SeqCst),
            query,
        }
    }

    /// Whether `ticket` is still the most recent one
    #[must_use]
    pub fn is_latest(&self, ticket: &QueryTicket) -> bool {
        self.latest_seq.load(Ordering::SeqCst) == ticket.seq
    }

    /// Apply a fetched page if its ticket is still the latest
    ///
    /// A page fetched before an invalidation is stored as stale.
    pub fn accept(&self, ticket: &QueryTicket, page: UserPage) -> ListOutcome {
        // Holding the view lock across the check keeps an older ticket from
        // landing after a newer one has been applied.
        let mut current = self.current.write();
        if !self.is_latest(ticket) {
            debug!(seq = ticket.seq, "dropping superseded user list response");
            return ListOutcome::Superseded;
        }

        let stale = ticket.generation != self.generation.load(Ordering::SeqCst);
        if stale {
            debug!(seq = ticket.seq, "list fetched before invalidation, caching as stale");
        }
        {
            let mut pages = self.pages.write();
            pages.insert(
                ticket.query.clone(),
                CachedPage {
                    page: page.clone(),
                    stale,
                    fetched_at: Utc::now(),
                    seq: ticket.seq,
                },
            );
            evict_oldest(&mut pages, &ticket.query);
        }
        *current = Some((ticket.query.clone(), page.clone()));
        ListOutcome::Applied(page)
    }

    /// Fetch a page, serving fresh cache entries without a remote call
    ///
    /// # Errors
    ///
    /// Returns the backend error; the cache is left unchanged.
    #[instrument(skip(self), fields(page = query.page, search = %query.search))]
    pub async fn list(&self, query: UserQuery) -> Result<ListOutcome> {
        let ticket = self.issue(query);

        let cached = self
            .pages
            .read()
            .get(&ticket.query)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.page.clone());
        if let Some(page) = cached {
            debug!("serving user list from cache");
            return Ok(self.accept(&ticket, page));
        }

        let page = self.backend.fetch_users(&ticket.query).await?;
        Ok(self.accept(&ticket, page))
    }

    /// Cached page for a query, fresh or stale
    #[must_use]
    pub fn cached(&self, query: &UserQuery) -> Option<UserPage> {
        self.pages.read().get(query).map(|entry| entry.page.clone())
    }

    /// When the cached page for a query was fetched
    #[must_use]
    pub fn fetched_at(&self, query: &UserQuery) -> Option<DateTime<Utc>> {
        self.pages.read().get(query).map(|entry| entry.fetched_at)
    }

    /// Whether a query has no fresh cache entry
    #[must_use]
    pub fn is_stale(&self, query: &UserQuery) -> bool {
        self.pages.read().get(query).is_none_or(|entry| entry.stale)
    }

    /// Number of cached pages, fresh or stale
    #[must_use]
    pub fn cached_pages(&self) -> usize {
        self.pages.read().len()
    }

    /// The page currently on display
    #[must_use]
    pub fn current_page(&self) -> Option<UserPage> {
        self.current.read().as_ref().map(|(_, page)| page.clone())
    }

    /// Mark every cached page stale
    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let mut pages = self.pages.write();
        for entry in pages.values_mut() {
            entry.stale = true;
        }
        debug!(pages = pages.len(), "user list cache invalidated");
    }

    // Selection

    /// Toggle one row; returns whether it is now selected
    pub fn toggle_selection(&self, id: &str) -> bool {
        let mut selection = self.selection.lock();
        if selection.shift_remove(id) {
            false
        } else {
            selection.insert(id.to_string());
            true
        }
    }

    /// Select every row of the current page
    pub fn select_all(&self) {
        let ids: Vec<String> = self
            .current
            .read()
            .as_ref()
            .map(|(_, page)| page.users.iter().map(|u| u.id.clone()).collect())
            .unwrap_or_default();
        self.selection.lock().extend(ids);
    }

    /// Deselect everything
    pub fn clear_selection(&self) {
        self.selection.lock().clear();
    }

    /// Whether a row is selected
    #[must_use]
    pub fn is_selected(&self, id: &str) -> bool {
        self.selection.lock().contains(id)
    }

    /// Selected ids in selection order
    #[must_use]
    pub fn selection(&self) -> Vec<String> {
        self.selection.lock().iter().cloned().collect()
    }

    fn require_selection(&self) -> Result<Vec<String>> {
        let ids = self.selection();
        if ids.is_empty() {
            return Err(Error::validation("selection", "No users selected"));
        }
        Ok(ids)
    }

    // Mutations

    /// Create a user from a validated payload
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn create_user(&self, data: &Map<String, Value>) -> Result<UserRecord> {
        let record = self.backend.create_user(data).await?;
        info!(id = %record.id, "user created");
        self.invalidate_all();
        Ok(record)
    }

    /// Update a user from a validated payload
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn update_user(&self, id: &str, data: &Map<String, Value>) -> Result<UserRecord> {
        let record = self.backend.update_user(id, data).await?;
        info!(id, "user updated");
        self.invalidate_all();
        Ok(record)
    }

    /// Fetch one user
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_user(&self, id: &str) -> Result<UserRecord> {
        self.backend.fetch_user(id).await
    }

    /// Delete one user
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn delete_user(&self, id: &str) -> Result<()> {
        self.backend.delete_user(id).await?;
        info!(id, "user deleted");
        self.selection.lock().shift_remove(id);
        self.invalidate_all();
        Ok(())
    }

    /// Delete the selected users: one call for one id, a bulk call otherwise
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty selection, or the backend
    /// error; the selection is kept on failure.
    pub async fn delete_selected(&self) -> Result<usize> {
        let ids = self.require_selection()?;
        match ids.as_slice() {
            [id] => self.backend.delete_user(id).await?,
            many => self.backend.bulk_delete_users(many).await?,
        }
        info!(count = ids.len(), "selected users deleted");
        self.clear_selection();
        self.invalidate_all();
        Ok(ids.len())
    }

    /// Change one user's status
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn update_status(&self, id: &str, status: UserStatus) -> Result<()> {
        self.backend.update_status(id, status).await?;
        self.apply_status(&[id.to_string()], status);
        self.invalidate_all();
        Ok(())
    }

    /// Change the status of every selected user
    ///
    /// On success cached rows reflect the new status, the list is
    /// invalidated and the selection cleared.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an empty selection, or the backend
    /// error; cache and selection are untouched on failure.
    pub async fn bulk_update_status(&self, status: UserStatus) -> Result<usize> {
        let ids = self.require_selection()?;
        match ids.as_slice() {
            [id] => self.backend.update_status(id, status).await?,
            many => self.backend.bulk_update_status(many, status).await?,
        }
        info!(count = ids.len(), %status, "status updated for selected users");
        self.apply_status(&ids, status);
        self.clear_selection();
        self.invalidate_all();
        Ok(ids.len())
    }

    fn apply_status(&self, ids: &[String], status: UserStatus) {
        let update = |page: &mut UserPage| {
            for user in &mut page.users {
                if ids.contains(&user.id) {
                    user.status = status;
                }
            }
        };
        for entry in self.pages.write().values_mut() {
            update(&mut entry.page);
        }
        if let Some((_, page)) = self.current.write().as_mut() {
            update(page);
        }
    }

    /// Assign users to an administrator
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn assign(&self, admin_id: &str, user_ids: &[String]) -> Result<()> {
        self.backend.assign_users(admin_id, user_ids).await?;
        info!(admin_id, count = user_ids.len(), "users assigned");
        self.invalidate_all();
        Ok(())
    }

    /// Remove users from their administrator
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn unassign(&self, admin_id: Option<&str>, user_ids: &[String]) -> Result<()> {
        self.backend.unassign_users(admin_id, user_ids).await?;
        info!(count = user_ids.len(), "users unassigned");
        self.invalidate_all();
        Ok(())
    }

    /// Administrator list, fetched once and then cached
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn admins(&self) -> Result<Vec<Administrator>> {
        let cached = self.admins.read().clone();
        if let Some(admins) = cached {
            return Ok(admins);
        }
        let admins = self.backend.fetch_admins().await?;
        *self.admins.write() = Some(admins.clone());
        Ok(admins)
    }

    /// Forget the cached administrator list
    pub fn invalidate_admins(&self) {
        *self.admins.write() = None;
    }

    /// Export users as a file body
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn export(&self, format: ExportFormat, fields: &[String]) -> Result<Vec<u8>> {
        self.backend.export_users(format, fields).await
    }

    /// Upload a file of users; every cached page is dropped afterwards
    ///
    /// # Errors
    ///
    /// Returns the backend error; the cache is kept then.
    #[instrument(skip(self, contents), fields(bytes = contents.len()))]
    pub async fn import(&self, file_name: &str, contents: Vec<u8>) -> Result<ImportSummary> {
        let summary = self.backend.import_users(file_name, contents).await?;
        info!(imported = ?summary.imported, "users imported");
        self.invalidate_all();
        Ok(summary)
    }
}

fn evict_oldest(pages: &mut HashMap<UserQuery, CachedPage>, keep: &UserQuery) {
    while pages.len() > PAGE_CACHE_CAPACITY {
        let oldest = pages
            .iter()
            .filter(|(query, _)| *query != keep)
            .min_by_key(|(_, entry)| entry.seq)
            .map(|(query, _)| query.clone());
        let Some(oldest) = oldest else {
            break;
        };
        pages.remove(&oldest);
    }
}
