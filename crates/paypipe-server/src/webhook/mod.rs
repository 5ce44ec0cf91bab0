//! Webhook ingestion

pub mod handler;
pub mod repository;
pub mod signing;

pub use handler::{HandlerResult, WebhookHandler};
pub use repository::{WebhookEnvelope, WebhookRepository};
