//! Idempotent webhook storage
//!
//! Each event lands as a date-partitioned `payload.json` envelope plus a
//! marker object keyed by the sanitized event id. The marker is the only
//! thing consulted for existence and is written after the payload, so a
//! marker never exists without its payload.

use chrono::{DateTime, Utc};
use paypipe_common::storage::SharedStore;
use paypipe_common::{ids, paths, time, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

const MARKER_BODY: &[u8] = b"1";

#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope {
    pub event_id: String,
    pub received_at: String,
    pub headers: BTreeMap<String, String>,
    pub payload: Value,
}

#[derive(Clone)]
pub struct WebhookRepository {
    store: SharedStore,
}

impl WebhookRepository {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn exists(&self, event_id: &str) -> Result<bool> {
        let safe = ids::sanitize_id_for_path(event_id);
        self.store.exists(&paths::webhook_marker_path(&safe)).await
    }

    /// Store the envelope, then the marker. Returns the payload location.
    pub async fn write(
        &self,
        event_id: &str,
        headers: BTreeMap<String, String>,
        payload: Value,
        received_at: DateTime<Utc>,
    ) -> Result<String> {
        let safe = ids::sanitize_id_for_path(event_id);
        let payload_path = paths::webhook_payload_path(&time::dt_partition(received_at), &safe);

        let envelope = WebhookEnvelope {
            event_id: event_id.to_string(),
            received_at: time::to_iso(received_at),
            headers,
            payload,
        };
        let location = self
            .store
            .put_atomic(&payload_path, serde_json::to_vec(&envelope)?)
            .await?;

        self.store
            .put_atomic(&paths::webhook_marker_path(&safe), MARKER_BODY.to_vec())
            .await?;
        debug!(event_id, path = %location, "Webhook event persisted");
        Ok(location)
    }
}
