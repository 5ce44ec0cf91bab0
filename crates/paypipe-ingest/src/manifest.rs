//! Run manifests, latest-model pointers and reconciliation artifacts
//!
//! Stages of one run accumulate: writing the `quality` stage keeps an
//! earlier `extract` stage of the same run id.

use paypipe_common::storage::SharedStore;
use paypipe_common::{paths, time, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub written_at: String,
    pub payload: Map<String, Value>,
}

/// Most recent successful artifact of a curated model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestPointer {
    pub model: String,
    pub run_id: String,
    pub dt: String,
    pub path: String,
    pub updated_at: String,
}

#[derive(Clone)]
pub struct ManifestStore {
    store: SharedStore,
}

impl ManifestStore {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Merge the top-level stage keys of `payload` into the run's manifest.
    /// A stage written twice keeps its latest payload.
    pub async fn write_run_manifest(&self, run_id: &str, payload: Value) -> Result<String> {
        let path = paths::manifest_relative_path(run_id);
        let mut stages = match self.read_run_manifest(run_id).await? {
            Some(existing) => existing.payload,
            None => Map::new(),
        };

        match payload {
            Value::Object(new_stages) => stages.extend(new_stages),
            other => {
                stages.insert("payload".to_string(), other);
            }
        }

        let manifest = RunManifest {
            run_id: run_id.to_string(),
            written_at: time::to_iso(time::utc_now()),
            payload: stages,
        };
        let location = self
            .store
            .put_atomic(&path, serde_json::to_vec_pretty(&manifest)?)
            .await?;
        debug!(run_id, stages = ?manifest.payload.keys().collect::<Vec<_>>(), "Run manifest written");
        Ok(location)
    }

    pub async fn read_run_manifest(&self, run_id: &str) -> Result<Option<RunManifest>> {
        let path = paths::manifest_relative_path(run_id);
        match self.store.get_bytes(&path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn write_latest_model(
        &self,
        model: &str,
        run_id: &str,
        dt: &str,
        path: &str,
    ) -> Result<String> {
        let pointer = LatestPointer {
            model: model.to_string(),
            run_id: run_id.to_string(),
            dt: dt.to_string(),
            path: path.to_string(),
            updated_at: time::to_iso(time::utc_now()),
        };
        self.put_pointer(&pointer).await
    }

    /// Persist a pointer as given, `updated_at` included.
    pub async fn put_pointer(&self, pointer: &LatestPointer) -> Result<String> {
        let location = self
            .store
            .put_atomic(
                &paths::latest_model_relative_path(&pointer.model),
                serde_json::to_vec_pretty(pointer)?,
            )
            .await?;
        info!(model = %pointer.model, dt = %pointer.dt, run_id = %pointer.run_id, "Latest pointer updated");
        Ok(location)
    }

    pub async fn read_latest_model(&self, model: &str) -> Result<Option<LatestPointer>> {
        let path = paths::latest_model_relative_path(model);
        match self.store.get_bytes(&path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every latest pointer, ordered by model name.
    pub async fn list_latest_models(&self) -> Result<Vec<LatestPointer>> {
        let mut pointers = Vec::new();
        for path in self.store.list(paths::latest_models_prefix()).await? {
            if !path.ends_with(".json") {
                continue;
            }
            if let Some(bytes) = self.store.get_bytes(&path).await? {
                pointers.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(pointers)
    }

    pub async fn write_reconciliation(&self, dt: &str, report: &Value) -> Result<String> {
        let artifact = json!({
            "dt": dt,
            "written_at": time::to_iso(time::utc_now()),
            "report": report,
        });
        self.store
            .put_atomic(
                &paths::recon_relative_path(dt),
                serde_json::to_vec_pretty(&artifact)?,
            )
            .await
    }
}
