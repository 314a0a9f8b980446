// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Admin revocation and blacklist management tests.

use axum::http::StatusCode;
use serde_json::json;
use sorikama_hub::db::AuthorizationStore;
use sorikama_hub::models::{ClientContext, RevokedBy};
use sorikama_hub::services::RevocationStore;

mod common;
use common::{create_test_hub, issued_before_now, json_body};

#[tokio::test]
async fn test_admin_revokes_all_services_for_user() {
    let hub = create_test_hub();
    let admin = hub.token("admin-1", "admin");

    let mut service_ids = Vec::new();
    for slug in ["masebuy", "mail", "drive"] {
        let service = hub.register_service(slug, "http://127.0.0.1:1");
        hub.state
            .ledger
            .create_or_refresh("victim", &service.id, "tok", None, &ClientContext::default())
            .await
            .unwrap();
        service_ids.push(service.id);
    }

    let response = hub
        .call(
            "DELETE",
            "/api/v1/admin/users/victim/authorizations?reason=policy%20violation",
            &admin,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"success": true, "revoked": 3}));

    assert!(hub.state.ledger.list_active("victim").await.unwrap().is_empty());
    for id in &service_ids {
        assert!(
            hub.state
                .revocation
                .are_user_service_tokens_revoked("victim", id, issued_before_now())
                .await
        );
    }

    let revoked = hub.db.list_revoked_for_user("victim").await.unwrap();
    assert_eq!(revoked.len(), 3);
    for auth in revoked {
        assert_eq!(auth.revoked_by, Some(RevokedBy::Admin));
        assert_eq!(auth.revoked_by_admin.as_deref(), Some("admin-1"));
        assert_eq!(auth.revoked_reason.as_deref(), Some("policy violation"));
    }

    let stats = json_body(
        hub.call("GET", "/api/v1/admin/blacklist/stats", &admin, None)
            .await,
    )
    .await;
    assert_eq!(stats["backend"], "memory");
    assert_eq!(stats["total_user_service_markers"], 3);
}

#[tokio::test]
async fn test_admin_revoke_single_service() {
    let hub = create_test_hub();
    let admin = hub.token("admin-1", "admin");
    let service = hub.register_service("masebuy", "http://127.0.0.1:1");

    let uri = "/api/v1/admin/users/victim/authorizations/masebuy";
    let response = hub.call("DELETE", uri, &admin, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    hub.state
        .ledger
        .create_or_refresh("victim", &service.id, "tok", None, &ClientContext::default())
        .await
        .unwrap();

    let response = hub.call("DELETE", uri, &admin, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!hub.state.ledger.has_active("victim", &service.id).await.unwrap());

    let revoked = hub.db.list_revoked_for_user("victim").await.unwrap();
    assert_eq!(
        revoked[0].revoked_reason.as_deref(),
        Some("Revoked by administrator")
    );
}

#[tokio::test]
async fn test_admin_blacklist_remove_restores_token() {
    let hub = create_test_hub();
    let admin = hub.token("admin-1", "admin");
    let user = hub.token("user-1", "user");

    hub.call("POST", "/api/v1/auth/logout", &user, None).await;
    assert_eq!(
        hub.call("GET", "/api/v1/authorizations", &user, None)
            .await
            .status(),
        StatusCode::UNAUTHORIZED
    );

    let stats = json_body(
        hub.call("GET", "/api/v1/admin/blacklist/stats", &admin, None)
            .await,
    )
    .await;
    assert_eq!(stats["total_blacklisted"], 1);

    let response = hub
        .call(
            "POST",
            "/api/v1/admin/blacklist/remove",
            &admin,
            Some(json!({"token": user})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"removed": true}));

    assert_eq!(
        hub.call("GET", "/api/v1/authorizations", &user, None)
            .await
            .status(),
        StatusCode::OK
    );
}

#[tokio::test]
async fn test_blacklisted_admin_is_locked_out() {
    let hub = create_test_hub();
    let admin = hub.token("admin-1", "admin");
    hub.state
        .revocation
        .blacklist_token(&admin, "compromised")
        .await
        .unwrap();

    let response = hub
        .call("GET", "/api/v1/admin/blacklist/stats", &admin, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
