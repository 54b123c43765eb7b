//! HTTP API tests driven through the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use custodia_core::identity::{NewUser, Role};
use custodia_core::{Config, Store};
use custodia_server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> (Router, AppState) {
    let store = Arc::new(Store::in_memory().expect("store"));
    let config = Config::default();
    let state = AppState::new(store, &config);
    for (username, role) in [
        ("admin.chief", Role::Admin),
        ("deputy.tadesse", Role::Admin),
        ("supervisor.tadesse", Role::Supervisor),
        ("dawit.haile", Role::WarehouseManager),
        ("officer.bekele", Role::FieldOfficer),
        ("sara.tekle", Role::Auditor),
    ] {
        state
            .registry
            .create_user(&NewUser {
                username: username.to_string(),
                display_name: username.to_string(),
                role,
                station: None,
                password: "password123".to_string(),
                mfa_enabled: false,
            })
            .expect("seed user");
    }
    (build_router(state.clone()), state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    };

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("body").to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

async fn login(app: &Router, username: &str) -> String {
    let (status, body) = send(
        app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": username, "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().expect("token").to_string()
}

#[tokio::test]
async fn unauthenticated_requests_are_rejected() {
    let (app, _state) = app();
    let (status, _) = send(&app, Method::GET, "/seizures", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/seizures", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_bad_credentials_without_detail() {
    let (app, _state) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "admin.chief", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    // Unknown usernames fail identically.
    let (status, _) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "nobody", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_reports_identity_resolved_server_side() {
    let (app, _state) = app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/auth/login",
        None,
        Some(json!({ "username": "sara.tekle", "password": "password123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "Auditor");

    let token = body["token"].as_str().expect("token");
    let (status, body) = send(&app, Method::GET, "/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "sara.tekle");
}

/// Walks the full seizure -> transfer -> receive flow over HTTP and checks
/// the custody chain endpoints.
#[tokio::test]
async fn seizure_transfer_lifecycle_over_http() {
    let (app, _state) = app();
    let admin = login(&app, "admin.chief").await;
    let officer = login(&app, "officer.bekele").await;
    let supervisor = login(&app, "supervisor.tadesse").await;
    let manager = login(&app, "dawit.haile").await;

    let (status, location) = send(
        &app,
        Method::POST,
        "/inventory/locations",
        Some(&admin),
        Some(json!({
            "name": "Warehouse A",
            "kind": "warehouse",
            "capacity": 100,
            "manager": "dawit.haile"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{location}");
    let location_id = location["id"].as_str().expect("location id");

    let (status, item) = send(
        &app,
        Method::POST,
        "/seizures",
        Some(&officer),
        Some(json!({
            "code": "CNB-TEST-1",
            "kind": "Drugs",
            "category": "Cocaine",
            "quantity": 2.5,
            "unit": "kg",
            "seizure_site": "Bole Airport"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{item}");
    assert_eq!(item["status"], "registered");

    let (status, transfer) = send(
        &app,
        Method::POST,
        "/transfers",
        Some(&officer),
        Some(json!({
            "item_code": "CNB-TEST-1",
            "to_location": location_id,
            "reason": "initial storage"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{transfer}");
    let transfer_id = transfer["id"].as_str().expect("transfer id");

    // The requester cannot approve their own transfer.
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/transfers/{transfer_id}/approve"),
        Some(&officer),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "self_approval_forbidden");

    let (status, approved) = send(
        &app,
        Method::POST,
        &format!("/transfers/{transfer_id}/approve"),
        Some(&supervisor),
        Some(json!({ "notes": "cleared" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{approved}");
    assert_eq!(approved["state"], "approved");

    // Approving again conflicts.
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/transfers/{transfer_id}/approve"),
        Some(&supervisor),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, received) = send(
        &app,
        Method::POST,
        &format!("/transfers/{transfer_id}/receive"),
        Some(&manager),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{received}");
    assert_eq!(received["state"], "completed");

    let (status, item) = send(&app, Method::GET, "/seizures/CNB-TEST-1", Some(&officer), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["status"], "in_storage");
    assert_eq!(item["custody_location"], location_id);

    let (status, events) = send(
        &app,
        Method::GET,
        "/items/CNB-TEST-1/custody-events",
        Some(&officer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.as_array().expect("events").len(), 4);

    let (status, verification) = send(
        &app,
        Method::GET,
        "/items/CNB-TEST-1/custody-verify",
        Some(&officer),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verification["status"], "verified");
}

#[tokio::test]
async fn audit_log_is_capability_gated() {
    let (app, _state) = app();
    let auditor = login(&app, "sara.tekle").await;
    let officer = login(&app, "officer.bekele").await;

    let (status, _) = send(&app, Method::GET, "/audit/events", Some(&auditor), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/audit/events", Some(&officer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "denied");
}

#[tokio::test]
async fn user_management_is_admin_only() {
    let (app, _state) = app();
    let admin = login(&app, "admin.chief").await;
    let officer = login(&app, "officer.bekele").await;

    let (status, _) = send(&app, Method::GET, "/users", Some(&officer), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = send(
        &app,
        Method::POST,
        "/users",
        Some(&admin),
        Some(json!({
            "username": "meron.bekele",
            "display_name": "Officer Meron Bekele",
            "role": "FieldOfficer",
            "password": "password123"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let user_id = created["id"].as_str().expect("user id");

    // Deactivation kills the account's sessions and logins.
    let token = login(&app, "meron.bekele").await;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/users/{user_id}/deactivate"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/seizures", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn destruction_flow_over_http() {
    let (app, _state) = app();
    let admin = login(&app, "admin.chief").await;
    let deputy = login(&app, "deputy.tadesse").await;
    let officer = login(&app, "officer.bekele").await;
    let supervisor = login(&app, "supervisor.tadesse").await;
    let manager = login(&app, "dawit.haile").await;

    // Stand the item up in storage first.
    let (_, location) = send(
        &app,
        Method::POST,
        "/inventory/locations",
        Some(&admin),
        Some(json!({
            "name": "Warehouse A",
            "kind": "warehouse",
            "capacity": 100,
            "manager": "dawit.haile"
        })),
    )
    .await;
    let location_id = location["id"].as_str().expect("location id");
    send(
        &app,
        Method::POST,
        "/seizures",
        Some(&officer),
        Some(json!({
            "code": "CNB-TEST-1",
            "kind": "Drugs",
            "category": "Heroin",
            "quantity": 1.0,
            "unit": "kg"
        })),
    )
    .await;
    let (_, transfer) = send(
        &app,
        Method::POST,
        "/transfers",
        Some(&officer),
        Some(json!({
            "item_code": "CNB-TEST-1",
            "to_location": location_id,
            "reason": "initial storage"
        })),
    )
    .await;
    let transfer_id = transfer["id"].as_str().expect("transfer id");
    send(
        &app,
        Method::POST,
        &format!("/transfers/{transfer_id}/approve"),
        Some(&supervisor),
        Some(json!({})),
    )
    .await;
    send(
        &app,
        Method::POST,
        &format!("/transfers/{transfer_id}/receive"),
        Some(&manager),
        None,
    )
    .await;

    let (status, request) = send(
        &app,
        Method::POST,
        "/destruction-requests",
        Some(&admin),
        Some(json!({
            "item_codes": ["CNB-TEST-1"],
            "method": "incineration",
            "legal_reason": "court order for destruction of seized narcotics",
            "witnesses": [
                { "name": "Legal Advisor Hanna", "role": "legal" },
                { "name": "Environmental Officer Sara", "role": "environmental" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    let request_id = request["id"].as_str().expect("request id");
    assert_eq!(request["state"], "draft");

    let (status, submitted) = send(
        &app,
        Method::POST,
        &format!("/destruction-requests/{request_id}/submit"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{submitted}");
    assert_eq!(submitted["state"], "pending_approval");

    // Level 2 before level 1 is out of order.
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/destruction-requests/{request_id}/approve"),
        Some(&deputy),
        Some(json!({ "level": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "out_of_order_approval");

    // The requester may not approve.
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/destruction-requests/{request_id}/approve"),
        Some(&admin),
        Some(json!({ "level": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "self_approval_forbidden");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/destruction-requests/{request_id}/approve"),
        Some(&supervisor),
        Some(json!({ "level": 1, "notes": "reviewed" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, approved) = send(
        &app,
        Method::POST,
        &format!("/destruction-requests/{request_id}/approve"),
        Some(&deputy),
        Some(json!({ "level": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["state"], "approved");

    let (status, executed) = send(
        &app,
        Method::POST,
        &format!("/destruction-requests/{request_id}/execute"),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{executed}");
    assert_eq!(executed["state"], "completed");

    let (_, item) = send(&app, Method::GET, "/seizures/CNB-TEST-1", Some(&officer), None).await;
    assert_eq!(item["status"], "destroyed");

    let (_, verification) = send(
        &app,
        Method::GET,
        "/items/CNB-TEST-1/custody-verify",
        Some(&officer),
        None,
    )
    .await;
    assert_eq!(verification["status"], "verified");
}

#[tokio::test]
async fn health_and_metrics_are_open() {
    let (app, _state) = app();
    let (status, body) = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("ok".to_string()));

    // Serve one request, then confirm the counter family shows up.
    let (status, body) = send(&app, Method::GET, "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().expect("metrics text");
    assert!(text.contains("custodia_http_requests_total"));
}
