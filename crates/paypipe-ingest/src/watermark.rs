//! Per-entity incremental cursor
//!
//! A watermark records the highest `created` timestamp that has been fully
//! written to bronze. It is committed only after the write for its window
//! succeeded.

use chrono::Utc;
use paypipe_common::storage::SharedStore;
use paypipe_common::{paths, time, PipelineError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub last_success_created_ts: Option<i64>,
    pub last_run_id: Option<String>,
    pub updated_at: Option<String>,
}

/// Inclusive extraction bounds in Unix seconds. `start_ts <= end_ts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start_ts: i64,
    pub end_ts: i64,
}

impl Window {
    /// Build a window, clamping `start_ts` so it never exceeds `end_ts`.
    pub fn clamped(start_ts: i64, end_ts: i64) -> Self {
        Self {
            start_ts: start_ts.min(end_ts),
            end_ts,
        }
    }
}

#[derive(Clone)]
pub struct WatermarkStore {
    store: SharedStore,
}

impl WatermarkStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Current watermark. Missing files are empty; undecodable files are
    /// moved aside to `<entity>.corrupt.json` and treated as empty.
    pub async fn load(&self, entity: &str) -> Result<Watermark> {
        let path = paths::watermark_relative_path(entity);
        let Some(bytes) = self.store.get_bytes(&path).await? else {
            debug!(entity, "No watermark yet");
            return Ok(Watermark::default());
        };

        match serde_json::from_slice::<Watermark>(&bytes) {
            Ok(watermark) => Ok(watermark),
            Err(e) => {
                let corrupt = PipelineError::CorruptState {
                    path: self.store.location(&path),
                    reason: e.to_string(),
                };
                let quarantine = paths::watermark_quarantine_path(entity);
                warn!(
                    entity,
                    error = %corrupt,
                    quarantine = %self.store.location(&quarantine),
                    "Quarantining corrupt watermark"
                );
                self.store.rename(&path, &quarantine).await?;
                Ok(Watermark::default())
            }
        }
    }

    /// Atomically replace the watermark for `entity`.
    pub async fn commit(&self, entity: &str, new_ts: i64, run_id: &str) -> Result<String> {
        let watermark = Watermark {
            last_success_created_ts: Some(new_ts),
            last_run_id: Some(run_id.to_string()),
            updated_at: Some(time::to_iso(Utc::now())),
        };
        let path = paths::watermark_relative_path(entity);
        let body = serde_json::to_vec_pretty(&watermark)?;
        let location = self.store.put_atomic(&path, body).await?;
        info!(entity, new_ts, run_id, "Watermark committed");
        Ok(location)
    }

    /// Window for the next extraction of `entity`.
    ///
    /// Without a watermark the window covers the last `days` days. Otherwise
    /// it restarts `safety_window` seconds before the watermark so records
    /// that became visible late are picked up again.
    pub async fn get_window(
        &self,
        entity: &str,
        now_ts: i64,
        days: i64,
        safety_window: i64,
    ) -> Result<Window> {
        let watermark = self.load(entity).await?;
        let start_ts = match watermark.last_success_created_ts {
            Some(ts) => (ts - safety_window).max(0),
            None => days
                .checked_mul(SECONDS_PER_DAY)
                .and_then(|lookback| now_ts.checked_sub(lookback))
                .map_or(0, |ts| ts.max(0)),
        };
        Ok(Window::clamped(start_ts, now_ts))
    }
}
