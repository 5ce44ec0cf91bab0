//! Bronze layer writer
//!
//! Envelopes are sorted by record id before chunking so the same input set
//! always produces byte-identical chunk files. Every path contains the run
//! id, so one run never touches another run's files.

use crate::RunContext;
use paypipe_common::storage::SharedStore;
use paypipe_common::{checksum, paths, PipelineError, Result};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub entity: String,
    pub record_count: usize,
    pub chunk_count: usize,
    pub paths: Vec<String>,
    pub schema_hash: String,
}

#[derive(Clone)]
pub struct BronzeWriter {
    store: SharedStore,
}

impl BronzeWriter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Persist `envelopes` as newline-delimited JSON chunks of `chunk_size`
    /// records, followed by a `_metadata.json` sidecar.
    #[instrument(skip_all, fields(entity = %entity, run_id = %ctx.run_id, records = envelopes.len()))]
    pub async fn write(
        &self,
        entity: &str,
        mut envelopes: Vec<Value>,
        ctx: &RunContext,
        chunk_size: usize,
    ) -> Result<WriteResult> {
        envelopes.sort_by(|a, b| sort_key(a).cmp(sort_key(b)));

        let schema_hash = checksum::schema_hash(
            envelopes
                .iter()
                .filter_map(Value::as_object)
                .flat_map(|obj| obj.keys().map(String::as_str)),
        );

        let dt = ctx.dt();
        let mut written = Vec::new();
        for (index, chunk) in envelopes.chunks(chunk_size.max(1)).enumerate() {
            if ctx.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            let path = paths::bronze_relative_path(entity, &dt, &ctx.run_id, index);
            let location = self.store.put_bytes(&path, encode_chunk(chunk)?).await?;
            debug!(chunk = index, records = chunk.len(), "Wrote bronze chunk");
            written.push(location);
        }

        let result = WriteResult {
            entity: entity.to_string(),
            record_count: envelopes.len(),
            chunk_count: written.len(),
            paths: written,
            schema_hash,
        };

        if result.chunk_count > 0 {
            let sidecar = json!({
                "entity": entity,
                "run_id": ctx.run_id,
                "dt": dt,
                "record_count": result.record_count,
                "chunk_count": result.chunk_count,
                "schema_hash": result.schema_hash,
            });
            self.store
                .put_atomic(
                    &paths::bronze_metadata_path(entity, &dt, &ctx.run_id),
                    serde_json::to_vec_pretty(&sidecar)?,
                )
                .await?;
        }

        info!(
            records = result.record_count,
            chunks = result.chunk_count,
            schema_hash = %result.schema_hash,
            "Bronze write complete"
        );
        Ok(result)
    }
}

/// `data.id` of an envelope, falling back to a top-level `id`.
fn sort_key(envelope: &Value) -> &str {
    envelope
        .get("data")
        .and_then(|d| d.get("id"))
        .or_else(|| envelope.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("")
}

fn encode_chunk(chunk: &[Value]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    for envelope in chunk {
        serde_json::to_writer(&mut body, envelope)?;
        body.push(b'\n');
    }
    Ok(body)
}
