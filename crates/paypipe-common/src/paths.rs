//! Naming conventions for bronze/silver/gold/state objects
//!
//! Every path is relative to the object store root and uses `/` separators.
//! The layout is shared with other implementations of the pipeline, so these
//! strings are part of the persisted contract.

pub const SOURCE: &str = "stripe";

pub const WEBHOOK_ENTITY: &str = "webhook_events";

pub fn bronze_entity_prefix(entity: &str) -> String {
    format!("bronze/source={SOURCE}/entity={entity}")
}

pub fn bronze_run_prefix(entity: &str, dt: &str, run_id: &str) -> String {
    format!("{}/dt={dt}/run_id={run_id}", bronze_entity_prefix(entity))
}

pub fn bronze_relative_path(entity: &str, dt: &str, run_id: &str, part: usize) -> String {
    format!("{}/part-{part:05}.jsonl", bronze_run_prefix(entity, dt, run_id))
}

pub fn bronze_metadata_path(entity: &str, dt: &str, run_id: &str) -> String {
    format!("{}/_metadata.json", bronze_run_prefix(entity, dt, run_id))
}

pub fn silver_entity_prefix(entity: &str) -> String {
    format!("silver/source={SOURCE}/entity={entity}")
}

pub fn silver_relative_path(entity: &str, dt: &str) -> String {
    format!("{}/dt={dt}/data.parquet", silver_entity_prefix(entity))
}

pub fn gold_model_prefix(model: &str) -> String {
    format!("gold/model={model}")
}

pub fn gold_relative_path(model: &str, dt: &str) -> String {
    format!("{}/dt={dt}/data.parquet", gold_model_prefix(model))
}

pub fn watermark_relative_path(entity: &str) -> String {
    format!("_state/watermarks/{entity}.json")
}

pub fn watermark_quarantine_path(entity: &str) -> String {
    format!("_state/watermarks/{entity}.corrupt.json")
}

pub fn manifest_relative_path(run_id: &str) -> String {
    format!("_state/manifests/run_{run_id}.json")
}

pub fn latest_models_prefix() -> &'static str {
    "_state/manifests/_latest"
}

pub fn latest_model_relative_path(model: &str) -> String {
    format!("{}/{model}.json", latest_models_prefix())
}

pub fn recon_relative_path(dt: &str) -> String {
    format!("_state/manifests/recon_{dt}.json")
}

/// `safe_event_id` must already be sanitized for path use.
pub fn webhook_payload_path(dt: &str, safe_event_id: &str) -> String {
    format!(
        "{}/dt={dt}/event_id={safe_event_id}/payload.json",
        bronze_entity_prefix(WEBHOOK_ENTITY)
    )
}

pub fn webhook_marker_path(safe_event_id: &str) -> String {
    format!(
        "{}/markers/{safe_event_id}.marker",
        bronze_entity_prefix(WEBHOOK_ENTITY)
    )
}

/// Value of the `dt=` segment of a partitioned path, if any.
pub fn dt_of(path: &str) -> Option<&str> {
    path.split('/').find_map(|segment| segment.strip_prefix("dt="))
}

/// Final path segment.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
