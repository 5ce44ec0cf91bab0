//! Webhook intake: verify, identify, deduplicate, store

use super::repository::WebhookRepository;
use super::signing::{self, SIGNATURE_HEADER};
use chrono::{DateTime, Utc};
use paypipe_common::config::WebhookSettings;
use paypipe_common::storage::SharedStore;
use paypipe_common::{time, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerResult {
    pub accepted: bool,
    pub duplicate: bool,
    pub event_id: String,
    pub stored_path: Option<String>,
}

pub struct WebhookHandler {
    repository: WebhookRepository,
    settings: WebhookSettings,
}

impl WebhookHandler {
    pub fn new(store: SharedStore, settings: WebhookSettings) -> Self {
        if settings.verify_signatures && settings.secret.is_none() {
            warn!("VERIFY_WEBHOOK_SIGNATURES is set without WEBHOOK_SECRET; signatures will not be checked");
        }
        Self {
            repository: WebhookRepository::new(store),
            settings,
        }
    }

    pub async fn handle(&self, body: &[u8], headers: BTreeMap<String, String>) -> Result<HandlerResult> {
        self.handle_at(body, headers, time::utc_now()).await
    }

    /// Handle one delivery as if received at `now`.
    ///
    /// Header names are expected lower-cased. A duplicate is acknowledged
    /// without touching storage.
    pub async fn handle_at(
        &self,
        body: &[u8],
        headers: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<HandlerResult> {
        self.verify(body, &headers, now)?;

        let event_id = signing::extract_event_id(body);
        if self.repository.exists(&event_id).await? {
            info!(event_id = %event_id, "Duplicate webhook event");
            return Ok(HandlerResult {
                accepted: true,
                duplicate: true,
                event_id,
                stored_path: None,
            });
        }

        let payload = serde_json::from_slice::<Value>(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
        let stored = self
            .repository
            .write(&event_id, headers, payload, now)
            .await?;
        info!(event_id = %event_id, path = %stored, "Webhook event stored");

        Ok(HandlerResult {
            accepted: true,
            duplicate: false,
            event_id,
            stored_path: Some(stored),
        })
    }

    fn verify(&self, body: &[u8], headers: &BTreeMap<String, String>, now: DateTime<Utc>) -> Result<()> {
        if !self.settings.verify_signatures {
            return Ok(());
        }
        let Some(secret) = self.settings.secret.as_deref() else {
            info!(reason = "missing_secret", "Webhook signature check skipped");
            return Ok(());
        };
        signing::verify_signature(
            body,
            headers.get(SIGNATURE_HEADER).map(String::as_str),
            secret,
            self.settings.tolerance_seconds,
            now.timestamp(),
        )
    }
}
