//! HTTP entry point

use crate::error::AppError;
use crate::middleware;
use crate::webhook::WebhookHandler;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<WebhookHandler>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/stripe", post(stripe_webhook))
        .with_state(state)
        .layer(middleware::tracing_layer())
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// POST /webhooks/stripe
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let result = state.handler.handle(&body, lowercase_headers(&headers)).await?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "ok": true,
            "event_id": result.event_id,
            "duplicate": result.duplicate,
        })),
    ))
}

/// Header map with lower-cased names. Values that are not valid UTF-8 are
/// kept lossily; repeated headers keep the last value.
fn lowercase_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_ascii_lowercase(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
