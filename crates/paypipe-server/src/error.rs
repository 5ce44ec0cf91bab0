//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use paypipe_common::PipelineError;
use serde_json::json;
use thiserror::Error;

/// Error surfaced by HTTP handlers.
///
/// Signature failures become `400`; everything else is a `500`.
#[derive(Error, Debug)]
#[error(transparent)]
pub struct AppError(#[from] pub PipelineError);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            PipelineError::SignatureVerification(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self.0 {
            PipelineError::SignatureVerification(reason) => {
                tracing::warn!(reason = %reason, "Webhook rejected");
            }
            e => {
                tracing::error!(error = ?e, "Webhook handling failed");
            }
        }

        let body = Json(json!({
            "ok": false,
            "error": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}
