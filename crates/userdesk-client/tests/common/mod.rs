//! Shared helpers for userdesk-client integration tests

#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Once;
use userdesk_client::ApiClient;
use userdesk_core::config::ApiConfig;
use wiremock::MockServer;

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

/// A mock API server and a client pointed at its `/api` prefix
pub async fn server_and_client() -> (MockServer, ApiClient) {
    init_test_logging();
    let server = MockServer::start().await;
    let client = ApiClient::from_config(&ApiConfig {
        base_url: format!("{}/api", server.uri()),
        token: Some("test-token".into()),
        timeout_secs: 5,
        retry: true,
    })
    .unwrap();
    (server, client)
}
