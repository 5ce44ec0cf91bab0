//! Paypipe Webhook Server
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Receives payment provider webhooks and lands each event exactly once in
//! the bronze layer.
//!
//! - **webhook**: signature verification, event ids and idempotent storage
//! - **api**: the axum router and HTTP entry point
//! - **error**: mapping of pipeline errors onto HTTP responses

pub mod api;
pub mod error;
pub mod middleware;
pub mod webhook;

pub use api::{create_router, AppState};
pub use error::AppError;
