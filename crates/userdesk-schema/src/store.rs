//! Schema store: cached schema plus guarded field mutations

use crate::backend::AdminBackend;
use crate::validation::validate_definition;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use userdesk_core::types::is_protected;
use userdesk_core::{Error, FieldDefinition, FieldPatch, Result, Schema};

#[derive(Debug, Default)]
struct SchemaCache {
    schema: Option<Arc<Schema>>,
    generation: u64,
    stale: bool,
}

/// Cached access to the user schema
///
/// Every successful mutation invalidates the cache and returns a fresh
/// fetch. Fetches are tagged with the cache generation they started in; a
/// fetch that overlaps an invalidation is handed to its caller but not
/// stored.
#[derive(Debug)]
pub struct SchemaStore<B: ?Sized> {
    backend: Arc<B>,
    cache: RwLock<SchemaCache>,
}

impl<B: AdminBackend + ?Sized> SchemaStore<B> {
    /// Create an empty store over a backend
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            cache: RwLock::new(SchemaCache::default()),
        }
    }

    /// The cached schema, served without a remote call when fresh
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn fetch_schema(&self) -> Result<Arc<Schema>> {
        let (cached, generation) = {
            let cache = self.cache.read();
            let fresh = cache.schema.clone().filter(|_| !cache.stale);
            (fresh, cache.generation)
        };
        if let Some(schema) = cached {
            return Ok(schema);
        }

        let document = self.backend.fetch_schema().await?;
        let schema = Arc::new(Schema::from_document(&document));

        let mut cache = self.cache.write();
        if cache.generation == generation {
            cache.schema = Some(Arc::clone(&schema));
            cache.stale = false;
            debug!(fields = schema.len(), generation, "schema cached");
        } else {
            debug!(generation, current = cache.generation, "schema fetched across an invalidation, not cached");
        }
        Ok(schema)
    }

    /// Invalidate, then fetch
    ///
    /// # Errors
    ///
    /// Returns the backend error.
    pub async fn refresh(&self) -> Result<Arc<Schema>> {
        self.invalidate();
        self.fetch_schema().await
    }

    /// Mark the cached schema stale
    pub fn invalidate(&self) {
        let mut cache = self.cache.write();
        cache.generation += 1;
        cache.stale = true;
    }

    /// Whether the next fetch will go to the backend
    #[must_use]
    pub fn is_stale(&self) -> bool {
        let cache = self.cache.read();
        cache.stale || cache.schema.is_none()
    }

    /// Last cached schema, fresh or stale
    #[must_use]
    pub fn peek(&self) -> Option<Arc<Schema>> {
        self.cache.read().schema.clone()
    }

    /// Add a field after local name and consistency checks
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an invalid or already used name or an
    /// inconsistent definition, before any remote mutation; otherwise the
    /// backend error.
    #[instrument(skip(self, definition), fields(field = %definition.name, kind = %definition.kind()))]
    pub async fn add_field(&self, definition: &FieldDefinition) -> Result<Arc<Schema>> {
        validate_definition(definition)?;

        let current = self.fetch_schema().await?;
        if current.contains(&definition.name) {
            return Err(Error::validation(
                &definition.name,
                format!("Field '{}' already exists", definition.name),
            ));
        }

        self.backend.add_field(&definition.to_add_request()).await?;
        info!("schema field added");
        self.refresh().await
    }

    /// Change the constraints of an existing field
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtectedField`] for protected names before any
    /// remote call, [`Error::NotFound`] for unknown fields,
    /// [`Error::Validation`] for a patch the field cannot take, or the
    /// backend error.
    #[instrument(skip(self, patch))]
    pub async fn update_field(&self, name: &str, patch: &FieldPatch) -> Result<Arc<Schema>> {
        if is_protected(name) {
            return Err(Error::ProtectedField {
                field: name.to_string(),
            });
        }

        let current = self.fetch_schema().await?;
        let existing = current.get(name).ok_or_else(|| Error::NotFound {
            resource: format!("schema field '{name}'"),
        })?;
        let updated = patch.apply(existing)?;
        validate_definition(&updated)?;

        self.backend.update_field(name, &updated.to_wire()).await?;
        info!("schema field updated");
        self.refresh().await
    }

    /// Remove a field
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProtectedField`] for protected names before any
    /// remote call, [`Error::NotFound`] for unknown fields, or the backend
    /// error.
    #[instrument(skip(self))]
    pub async fn delete_field(&self, name: &str) -> Result<Arc<Schema>> {
        if is_protected(name) {
            return Err(Error::ProtectedField {
                field: name.to_string(),
            });
        }

        let current = self.fetch_schema().await?;
        if !current.contains(name) {
            return Err(Error::NotFound {
                resource: format!("schema field '{name}'"),
            });
        }

        self.backend.delete_field(name).await?;
        info!("schema field deleted");
        self.refresh().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::MockBackend;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use userdesk_core::FieldType;

    fn store() -> (Arc<MockBackend>, SchemaStore<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        let store = SchemaStore::new(Arc::clone(&backend));
        (backend, store)
    }

    #[tokio::test]
    async fn test_fetch_is_cached() {
        let (backend, store) = store();
        assert!(store.is_stale());

        let first = store.fetch_schema().await.unwrap();
        let second = store.fetch_schema().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.call_count("fetch_schema"), 1);
        assert!(!store.is_stale());

        store.invalidate();
        assert!(store.is_stale());
        assert!(store.peek().is_some());
        store.fetch_schema().await.unwrap();
        assert_eq!(backend.call_count("fetch_schema"), 2);
    }

    #[tokio::test]
    async fn test_protected_fields_rejected_before_remote_call() {
        let (backend, store) = store();

        for name in ["name", "number", "assignedAdmin", "status"] {
            let err = store.delete_field(name).await.unwrap_err();
            assert!(matches!(err, Error::ProtectedField { .. }));
            let err = store
                .update_field(name, &FieldPatch::default())
                .await
                .unwrap_err();
            assert!(matches!(err, Error::ProtectedField { .. }));
        }
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_add_field_validates_locally() {
        let (backend, store) = store();

        let bad = FieldDefinition::new("2fa", FieldType::boolean());
        assert!(store.add_field(&bad).await.is_err());

        let duplicate = FieldDefinition::new("name", FieldType::string());
        let err = store.add_field(&duplicate).await.unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(backend.call_count("add_field"), 0);
    }

    #[tokio::test]
    async fn test_add_field_returns_fresh_schema() {
        let (backend, store) = store();
        store.fetch_schema().await.unwrap();

        let plan = FieldDefinition::new("plan", FieldType::enumeration(["free", "pro"]));
        let schema = store.add_field(&plan).await.unwrap();

        assert_eq!(schema.get("plan"), Some(&plan));
        assert_eq!(backend.call_count("add_field"), 1);
        assert_eq!(backend.call_count("fetch_schema"), 2);
        assert_eq!(
            backend.last_add_request().unwrap().options.enum_values,
            Some(vec!["free".to_string(), "pro".to_string()])
        );
    }

    #[tokio::test]
    async fn test_failed_mutation_leaves_cache_fresh() {
        let (backend, store) = store();
        store.fetch_schema().await.unwrap();

        backend.fail_next(Error::remote("Field already exists in database"));
        let age = FieldDefinition::new("age", FieldType::number());
        assert!(store.add_field(&age).await.is_err());
        assert!(!store.is_stale());
    }

    #[tokio::test]
    async fn test_update_field_applies_patch() {
        let (_backend, store) = store();
        let age = FieldDefinition::new("age", FieldType::number());
        store.add_field(&age).await.unwrap();

        let patch = FieldPatch {
            min: Some(json!(18)),
            max: Some(json!(65)),
            ..FieldPatch::default()
        };
        let schema = store.update_field("age", &patch).await.unwrap();
        assert_eq!(
            schema.get("age").unwrap().field_type,
            FieldType::number_between(18.0, 65.0)
        );

        let missing = store.update_field("ghost", &patch).await.unwrap_err();
        assert!(matches!(missing, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_field() {
        let (_backend, store) = store();
        let city = FieldDefinition::new("city", FieldType::string());
        store.add_field(&city).await.unwrap();

        let schema = store.delete_field("city").await.unwrap();
        assert!(!schema.contains("city"));
    }
}
