// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use sorikama_hub::config::Config;
use sorikama_hub::db::{FirestoreDb, MemoryDb};
use sorikama_hub::middleware::auth::create_jwt;
use sorikama_hub::models::service::hash_api_key;
use sorikama_hub::models::ServiceDescriptor;
use sorikama_hub::routes::create_router;
use sorikama_hub::services::revocation::{CachedRevocationStore, MemoryCache};
use sorikama_hub::AppState;
use std::sync::Arc;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Generate a unique id for test isolation.
#[allow(dead_code)]
pub fn unique_id(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// A hub wired to in-memory backends.
#[allow(dead_code)]
pub struct TestHub {
    pub app: axum::Router,
    pub state: Arc<AppState>,
    pub db: MemoryDb,
    pub cache: MemoryCache,
}

#[allow(dead_code)]
impl TestHub {
    /// Mint a portal session token.
    pub fn token(&self, user_id: &str, role: &str) -> String {
        create_jwt(user_id, role, 3600, &self.state.config.jwt_signing_key)
            .expect("Failed to create JWT")
    }

    /// Register a service and return its descriptor.
    pub fn register_service(&self, slug: &str, base_url: &str) -> ServiceDescriptor {
        let service = ServiceDescriptor {
            id: format!("svc-{}", slug),
            slug: slug.to_string(),
            name: slug.to_string(),
            base_url: base_url.to_string(),
            frontend_url: None,
            enabled: true,
            allowed_roles: vec![],
            api_key_hash: Some(hash_api_key(&api_key_for(slug))),
        };
        self.db.insert_service(service.clone());
        service
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        use tower::ServiceExt;
        self.app
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed")
    }

    /// Authenticated request with an optional JSON body.
    pub async fn call(
        &self,
        method: &str,
        uri: &str,
        token: &str,
        json: Option<serde_json::Value>,
    ) -> Response {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        let request = match json {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();
        self.send(request).await
    }

    /// Authorize `user_id` for a service through the public API.
    pub async fn authorize(&self, token: &str, service_ref: &str) -> Response {
        self.call(
            "POST",
            &format!("/api/v1/authorize/{}", service_ref),
            token,
            None,
        )
        .await
    }
}

/// API key registered for a test service.
#[allow(dead_code)]
pub fn api_key_for(slug: &str) -> String {
    format!("sk_test_{}", slug)
}

/// Create a test app over in-memory backends.
#[allow(dead_code)]
pub fn create_test_hub() -> TestHub {
    create_test_hub_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_hub_with_config(config: Config) -> TestHub {
    let db = MemoryDb::new();
    let cache = MemoryCache::new();
    let revocation = Arc::new(CachedRevocationStore::new(Arc::new(cache.clone())));

    let state = Arc::new(
        AppState::new(
            config,
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            revocation,
        )
        .expect("Failed to build app state"),
    );

    TestHub {
        app: create_router(state.clone()),
        state,
        db,
        cache,
    }
}

/// Read a JSON response body.
#[allow(dead_code)]
pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

/// Wait for spawned audit writes to land.
#[allow(dead_code)]
pub async fn wait_for_audits(db: &MemoryDb, count: usize) -> Vec<sorikama_hub::models::ProxyAuditRecord> {
    for _ in 0..50 {
        let records = db.audit_records();
        if records.len() >= count {
            return records;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    db.audit_records()
}

/// Issue time of a token minted well before anything the test revokes.
#[allow(dead_code)]
pub fn issued_before_now() -> i64 {
    chrono::Utc::now().timestamp() - 60
}
