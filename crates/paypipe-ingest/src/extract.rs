//! Per-entity incremental extraction

use crate::bronze::BronzeWriter;
use crate::client::{IterStats, PaymentsSource};
use crate::entity::Entity;
use crate::watermark::{WatermarkStore, Window};
use crate::RunContext;
use paypipe_common::storage::SharedStore;
use paypipe_common::{ids, time, PipelineError, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

/// Value of `meta.source` on every bronze envelope
pub const ENVELOPE_SOURCE: &str = "stripe_mock";

#[derive(Debug, Clone, Serialize)]
pub struct ExtractResult {
    pub entity: Entity,
    pub run_id: String,
    pub correlation_id: String,
    pub window: Window,
    pub record_count: usize,
    pub chunk_count: usize,
    #[serde(flatten)]
    pub stats: IterStats,
    /// Candidate watermark: greatest `created` seen in this window
    pub max_created: Option<i64>,
    pub paths: Vec<String>,
    pub schema_hash: String,
    /// Location of the committed watermark, if one was committed
    pub watermark: Option<String>,
}

pub struct Extractor {
    source: Arc<dyn PaymentsSource>,
    watermarks: WatermarkStore,
    writer: BronzeWriter,
}

impl Extractor {
    pub fn new(source: Arc<dyn PaymentsSource>, store: SharedStore) -> Self {
        Self {
            source,
            watermarks: WatermarkStore::new(store.clone()),
            writer: BronzeWriter::new(store),
        }
    }

    pub fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    /// Extract one entity's window into bronze and advance its watermark.
    ///
    /// Any extraction or write error returns before the watermark commit, so
    /// the next run re-reads the same window.
    pub async fn extract_entity(
        &self,
        ctx: &RunContext,
        entity: Entity,
        days: i64,
    ) -> Result<ExtractResult> {
        let settings = &ctx.settings;
        let window = self
            .watermarks
            .get_window(
                entity.as_str(),
                ctx.now_ts(),
                days,
                settings.safety_window_seconds,
            )
            .await?;
        let correlation_id =
            ids::window_correlation_id(&ctx.run_id, entity.as_str(), window.start_ts, window.end_ts);

        let span = info_span!(
            "extract",
            run_id = %ctx.run_id,
            correlation_id = %correlation_id,
            entity = %entity
        );

        async {
            info!(start_ts = window.start_ts, end_ts = window.end_ts, "Extracting window");

            let batch = self
                .source
                .iter_entity(entity, window.start_ts, window.end_ts, settings.max_page_size)
                .await?;

            let max_created = batch
                .records
                .iter()
                .filter_map(|r| r.get("created").and_then(Value::as_i64))
                .max();

            let ingested_at = time::to_iso(ctx.now);
            let envelopes: Vec<Value> = batch
                .records
                .into_iter()
                .map(|record| envelope(entity, record, ctx, &correlation_id, &ingested_at))
                .collect();

            let written = self
                .writer
                .write(entity.as_str(), envelopes, ctx, settings.bronze_chunk_size)
                .await?;

            let watermark = match max_created {
                Some(candidate) => {
                    let previous = self
                        .watermarks
                        .load(entity.as_str())
                        .await?
                        .last_success_created_ts;
                    let new_ts = previous.map_or(candidate, |p| p.max(candidate));
                    Some(
                        self.watermarks
                            .commit(entity.as_str(), new_ts, &ctx.run_id)
                            .await?,
                    )
                }
                None => {
                    if written.record_count > 0 {
                        warn!("No record carried 'created'; watermark left unchanged");
                    }
                    None
                }
            };

            Ok::<_, PipelineError>(ExtractResult {
                entity,
                run_id: ctx.run_id.clone(),
                correlation_id: correlation_id.clone(),
                window,
                record_count: written.record_count,
                chunk_count: written.chunk_count,
                stats: batch.stats,
                max_created,
                paths: written.paths,
                schema_hash: written.schema_hash,
                watermark,
            })
        }
        .instrument(span)
        .await
    }
}

fn envelope(
    entity: Entity,
    record: Value,
    ctx: &RunContext,
    correlation_id: &str,
    ingested_at: &str,
) -> Value {
    let lifted = entity.lift(&record);
    json!({
        "data": record,
        "meta": {
            "entity": entity.as_str(),
            "run_id": ctx.run_id,
            "correlation_id": correlation_id,
            "ingested_at": ingested_at,
            "source": ENVELOPE_SOURCE,
            "lifted": lifted,
        }
    })
}
