//! Common test utilities for in-process API testing.
//!
//! The fixture builds the real router over a file-backed store in a temp
//! directory and a mock catalog, so no network is touched.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use moviecache_core::{
    testing::MockCatalogClient, CatalogClient, Config, MovieCache, MovieStore, SqliteMovieStore,
};
use moviecache_server::state::AppState;

/// Re-export fixtures for test convenience
pub use moviecache_core::testing::fixtures;

/// Test fixture: the router plus handles to its dependencies.
pub struct TestFixture {
    pub router: Router,
    pub state: Arc<AppState>,
    /// Mock catalog - configure collections, trailers and reviews
    pub client: Arc<MockCatalogClient>,
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let mut config = Config::default();
        config.database.path = db_path.clone();
        config.catalog.api_key = "test-key".to_string();
        config.sync.sync_on_start = false;

        let store: Arc<dyn MovieStore> =
            Arc::new(SqliteMovieStore::new(&db_path).expect("Failed to create store"));
        let client = Arc::new(MockCatalogClient::new());
        let cache = MovieCache::new(
            store,
            Arc::clone(&client) as Arc<dyn CatalogClient>,
            config.sync.clone(),
        );

        let state = Arc::new(AppState::new(config, cache));
        let router = moviecache_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            client,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request without a body.
    pub async fn put(&self, path: &str) -> TestResponse {
        self.request("PUT", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        let request = request_builder.body(body).unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status, $response.status, $response.text
        );
    };
}
