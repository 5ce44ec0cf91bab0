//! HTTP tests for the webhook router
//!
//! Requests go straight through the axum router with `oneshot`; storage is a
//! local store in a scratch directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use paypipe_common::config::{Settings, WebhookSettings};
use paypipe_common::storage::{LocalStore, ObjectStore};
use paypipe_common::time;
use paypipe_server::webhook::signing::compute_signature;
use paypipe_server::webhook::WebhookHandler;
use paypipe_server::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "whsec_test";

// ============================================================================
// Helpers
// ============================================================================

fn webhook_settings(verify: bool) -> WebhookSettings {
    let mut settings = Settings::default().webhook;
    settings.verify_signatures = verify;
    settings.secret = Some(SECRET.to_string());
    settings
}

fn app(dir: &TempDir, verify: bool) -> (Arc<LocalStore>, Router) {
    let store = Arc::new(LocalStore::new(dir.path()));
    let state = AppState {
        handler: Arc::new(WebhookHandler::new(store.clone(), webhook_settings(verify))),
    };
    (store, create_router(state))
}

fn post_webhook(body: &'static [u8], signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/stripe")
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Stripe-Signature", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// Routes
// ============================================================================

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (_, app) = app(&dir, false);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_duplicate_delivery_acknowledged_once_stored() {
    let dir = TempDir::new().unwrap();
    let (store, app) = app(&dir, false);
    let body: &[u8] = br#"{"id":"evt_test_1","type":"payment_intent.succeeded"}"#;

    let first = app.clone().oneshot(post_webhook(body, None)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        json_body(first).await,
        json!({"ok": true, "event_id": "evt_test_1", "duplicate": false})
    );

    let second = app.oneshot(post_webhook(body, None)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(json_body(second).await["duplicate"], true);

    let payloads: Vec<String> = store
        .list("bronze/source=stripe/entity=webhook_events")
        .await
        .unwrap()
        .into_iter()
        .filter(|p| p.ends_with("/payload.json"))
        .collect();
    assert_eq!(payloads.len(), 1);

    let envelope = store.get_json(&payloads[0]).await.unwrap().unwrap();
    assert_eq!(envelope["payload"]["type"], "payment_intent.succeeded");
    assert_eq!(envelope["headers"]["content-type"], "application/json");
}

#[tokio::test]
async fn test_valid_signature_accepted() {
    let dir = TempDir::new().unwrap();
    let (_, app) = app(&dir, true);
    let body: &[u8] = br#"{"id":"evt_signed"}"#;
    let ts = time::utc_now().timestamp();
    let sig = compute_signature(SECRET, ts, body).unwrap();

    let response = app
        .oneshot(post_webhook(body, Some(format!("t={ts},v1={sig}"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["event_id"], "evt_signed");
}

#[tokio::test]
async fn test_expired_signature_rejected() {
    let dir = TempDir::new().unwrap();
    let (store, app) = app(&dir, true);
    let body: &[u8] = br#"{"id":"evt_old"}"#;
    let ts = time::utc_now().timestamp() - 3600;
    let sig = compute_signature(SECRET, ts, body).unwrap();

    let response = app
        .oneshot(post_webhook(body, Some(format!("t={ts},v1={sig}"))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = json_body(response).await;
    assert_eq!(json["ok"], false);
    assert!(json["error"].as_str().unwrap().contains("tolerance"));
    assert!(store.list("").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let dir = TempDir::new().unwrap();
    let (_, app) = app(&dir, true);

    let response = app
        .oneshot(post_webhook(br#"{"id":"evt_unsigned"}"#, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
