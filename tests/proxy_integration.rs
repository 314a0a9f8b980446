// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! End-to-end proxy tests against a fake upstream service.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;
use sorikama_hub::services::RevocationStore;
use wiremock::matchers::{body_string, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{create_test_hub, json_body, wait_for_audits};

#[tokio::test]
async fn test_proxy_forwards_with_masked_identity() {
    let hub = create_test_hub();
    let upstream = MockServer::start().await;
    let service = hub.register_service("masebuy", &upstream.uri());

    Mock::given(method("GET"))
        .and(path("/orders/42"))
        .and(query_param("expand", "items"))
        .and(header_exists("x-sorikama-signature"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-upstream", "yes")
                .set_body_json(json!({"order": 42})),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let token = hub.token("user-1", "user");
    let authorize = hub.authorize(&token, "masebuy").await;
    assert_eq!(authorize.status(), StatusCode::OK);
    let grant_id = json_body(authorize).await["authorization"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = hub
        .send(
            Request::builder()
                .uri("/api/v1/proxy/masebuy/orders/42?expand=items")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(header::COOKIE, "sorikama_token=leak")
                .header("x-api-key", "leak")
                .header("x-sorikama-user-id", "spoofed")
                .header("x-forwarded-for", "203.0.113.7")
                .header(header::USER_AGENT, "proxy-test")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-upstream").unwrap(), "yes");
    assert_eq!(json_body(response).await, json!({"order": 42}));

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let forwarded = &received[0].headers;

    assert!(forwarded.get("authorization").is_none());
    assert!(forwarded.get("cookie").is_none());
    assert!(forwarded.get("x-api-key").is_none());
    assert_eq!(forwarded.get("x-proxied-by").unwrap(), "Sorikama-Hub");
    assert_eq!(forwarded.get("x-sorikama-service-id").unwrap(), service.id.as_str());
    assert_eq!(forwarded.get("x-sorikama-session-id").unwrap(), grant_id.as_str());
    assert!(forwarded
        .get("x-forwarded-for")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("203.0.113.7"));

    let masked = forwarded.get("x-sorikama-user-id").unwrap().to_str().unwrap();
    assert!(masked.starts_with(&format!("enc_{}_", service.id)));
    assert!(!masked.contains("user-1"));
    assert_eq!(
        hub.state.identity.decrypt_user_id(masked, &service.id).unwrap(),
        "user-1"
    );

    let audits = wait_for_audits(&hub.db, 1).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].user_id, "user-1");
    assert_eq!(audits[0].endpoint, "/orders/42");
    assert_eq!(audits[0].status_code, 200);
    assert!(audits[0].success);
    assert_eq!(audits[0].ip_address.as_deref(), Some("203.0.113.7"));
    assert_eq!(audits[0].user_agent.as_deref(), Some("proxy-test"));

    let grant = hub.state.ledger.active_grant("user-1", &service.id).await.unwrap().unwrap();
    assert!(grant.last_used_at.is_some());
}

#[tokio::test]
async fn test_proxy_relays_upstream_errors_verbatim() {
    let hub = create_test_hub();
    let upstream = MockServer::start().await;
    hub.register_service("masebuy", &upstream.uri());

    Mock::given(method("POST"))
        .and(path("/cart"))
        .and(body_string("{\"sku\":\"abc\"}"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"error": "out of stock"})))
        .mount(&upstream)
        .await;

    let token = hub.token("user-1", "user");
    hub.authorize(&token, "masebuy").await;

    let response = hub
        .call("POST", "/api/v1/proxy/masebuy/cart", &token, Some(json!({"sku": "abc"})))
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await, json!({"error": "out of stock"}));

    let audits = wait_for_audits(&hub.db, 1).await;
    assert_eq!(audits[0].status_code, 422);
    assert!(!audits[0].success);
}

#[tokio::test]
async fn test_get_body_is_not_forwarded() {
    let hub = create_test_hub();
    let upstream = MockServer::start().await;
    hub.register_service("masebuy", &upstream.uri());

    Mock::given(method("GET"))
        .and(path("/"))
        .and(body_string(""))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&upstream)
        .await;

    let token = hub.token("user-1", "user");
    hub.authorize(&token, "masebuy").await;

    let response = hub
        .call("GET", "/api/v1/proxy/masebuy", &token, Some(json!({"ignored": true})))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_revoked_pair_is_rejected_before_upstream() {
    let hub = create_test_hub();
    let upstream = MockServer::start().await;
    let service = hub.register_service("masebuy", &upstream.uri());

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let token = hub.token("user-1", "user");
    hub.authorize(&token, "masebuy").await;
    hub.state
        .revocation
        .revoke_user_service_tokens("user-1", &service.id, "compromised")
        .await
        .unwrap();

    let response = hub.call("GET", "/api/v1/proxy/masebuy/orders", &token, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["error"], "token_revoked");
}

#[tokio::test]
async fn test_revoking_authorization_stops_proxying() {
    let hub = create_test_hub();
    let upstream = MockServer::start().await;
    hub.register_service("masebuy", &upstream.uri());

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let token = hub.token("user-1", "user");
    hub.authorize(&token, "masebuy").await;
    assert_eq!(
        hub.call("GET", "/api/v1/proxy/masebuy/a", &token, None).await.status(),
        StatusCode::OK
    );

    let revoke = hub
        .call("DELETE", "/api/v1/authorizations/masebuy", &token, None)
        .await;
    assert_eq!(revoke.status(), StatusCode::OK);

    let response = hub.call("GET", "/api/v1/proxy/masebuy/a", &token, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_after_revocation_restores_access() {
    let hub = create_test_hub();
    let upstream = MockServer::start().await;
    let service = hub.register_service("masebuy", &upstream.uri());

    Mock::given(method("GET"))
        .and(path("/x"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&upstream)
        .await;

    let old_token = hub.token("user-1", "user");
    hub.authorize(&old_token, "masebuy").await;
    let revoke = hub
        .call("DELETE", "/api/v1/authorizations/masebuy", &old_token, None)
        .await;
    assert_eq!(revoke.status(), StatusCode::OK);

    // JWT issue times have one-second resolution.
    tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

    let new_token = hub.token("user-1", "user");
    assert_eq!(hub.authorize(&new_token, "masebuy").await.status(), StatusCode::OK);
    assert!(hub.state.ledger.has_active("user-1", &service.id).await.unwrap());

    let response = hub.call("GET", "/api/v1/proxy/masebuy/x", &new_token, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = hub.call("GET", "/api/v1/proxy/masebuy/x", &old_token, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_proxy_without_grant_is_forbidden() {
    let hub = create_test_hub();
    let upstream = MockServer::start().await;
    hub.register_service("masebuy", &upstream.uri());

    let token = hub.token("user-1", "user");
    let response = hub.call("GET", "/api/v1/proxy/masebuy/a", &token, None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_proxy_service_resolution_errors() {
    let hub = create_test_hub();
    let token = hub.token("user-1", "user");

    let response = hub.call("GET", "/api/v1/proxy/nope/a", &token, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let mut disabled = hub.register_service("offline", "http://127.0.0.1:1");
    disabled.enabled = false;
    hub.db.insert_service(disabled);
    let response = hub.call("GET", "/api/v1/proxy/offline/a", &token, None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let mut admin_only = hub.register_service("console", "http://127.0.0.1:1");
    admin_only.allowed_roles = vec!["admin".to_string()];
    hub.db.insert_service(admin_only);
    let response = hub.call("GET", "/api/v1/proxy/console/a", &token, None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_unreachable_upstream_returns_bad_gateway_and_audits() {
    let hub = create_test_hub();
    // Nothing listens on port 1.
    hub.register_service("down", "http://127.0.0.1:1");

    let token = hub.token("user-1", "user");
    hub.authorize(&token, "down").await;

    let response = hub.call("GET", "/api/v1/proxy/down/ping", &token, None).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(json_body(response).await["error"], "upstream_unavailable");

    let audits = wait_for_audits(&hub.db, 1).await;
    assert_eq!(audits.len(), 1);
    assert_eq!(audits[0].status_code, 500);
    assert!(!audits[0].success);
    assert!(audits[0].error_message.is_some());
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let mut config = sorikama_hub::config::Config::test_default();
    config.proxy_timeout_secs = 1;
    let hub = common::create_test_hub_with_config(config);
    let upstream = MockServer::start().await;
    hub.register_service("slow", &upstream.uri());

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(std::time::Duration::from_secs(3)))
        .mount(&upstream)
        .await;

    let token = hub.token("user-1", "user");
    hub.authorize(&token, "slow").await;

    let response = hub.call("GET", "/api/v1/proxy/slow/x", &token, None).await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}
