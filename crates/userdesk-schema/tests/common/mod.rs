//! Shared fixtures for userdesk-schema integration tests

#![allow(dead_code, clippy::unwrap_used)]

use serde_json::json;
use std::sync::{Arc, Once};
use userdesk_core::types::SchemaDocument;
use userdesk_schema::{MockBackend, SchemaStore, UserDirectory};

static INIT_LOGGER: Once = Once::new();

/// Route test logs through the test writer once per binary
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("debug")
            .with_test_writer()
            .try_init();
    });
}

/// Schema with one field of every supported type plus an unsupported one
pub fn mixed_schema() -> SchemaDocument {
    serde_json::from_value(json!({
        "fields": {
            "name": {"type": "String", "required": true, "minlength": 2},
            "number": {"type": "String"},
            "status": {"type": "String", "enum": ["active", "inactive", "blocked"], "default": "active"},
            "assignedAdmin": {"type": "ObjectId"},
            "tier": {"type": "string", "enum": ["free", "pro"]},
            "age": {"type": "Number", "min": 18, "max": 65},
            "verified": {"type": "Boolean"},
            "joined": {"type": "Date", "min": "2020-01-01"},
            "tags": {"type": "Array"}
        }
    }))
    .unwrap()
}

/// Everything a front end wires together, over one mock backend
pub struct Workspace {
    pub backend: Arc<MockBackend>,
    pub schema: SchemaStore<MockBackend>,
    pub directory: UserDirectory<MockBackend>,
}

impl Workspace {
    pub fn new(backend: MockBackend) -> Self {
        init_test_logging();
        let backend = Arc::new(backend);
        Self {
            schema: SchemaStore::new(Arc::clone(&backend)),
            directory: UserDirectory::new(Arc::clone(&backend)),
            backend,
        }
    }

    pub fn with_mixed_schema() -> Self {
        Self::new(MockBackend::new().with_schema(mixed_schema()))
    }
}
