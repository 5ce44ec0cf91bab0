//! Command orchestration for the `paypipe` binary

use crate::client::{HttpPaymentsClient, PaymentsSource};
use crate::entity::Entity;
use crate::extract::{ExtractResult, Extractor};
use crate::manifest::ManifestStore;
use crate::quality::{self, QualityReport};
use crate::transform::{self, CommandTransform, TransformMetric, TransformStep};
use crate::RunContext;
use paypipe_common::storage::{self, SharedStore};
use paypipe_common::{PipelineError, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{error, info};

/// Outcome of extracting several entities; entities commit independently.
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub results: Vec<ExtractResult>,
    pub failures: Vec<EntityFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityFailure {
    pub entity: Entity,
    pub error: String,
}

impl BatchSummary {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Default, Serialize)]
pub struct PipelineOutcome {
    pub extract: BatchSummary,
    pub transforms: Option<Vec<TransformMetric>>,
    pub quality: Option<QualityReport>,
}

impl PipelineOutcome {
    pub fn passed(&self) -> bool {
        self.extract.succeeded() && self.quality.as_ref().is_some_and(|q| q.passed)
    }
}

pub struct Pipeline {
    ctx: RunContext,
    store: SharedStore,
    manifests: ManifestStore,
    extractor: Extractor,
    transform: Arc<dyn TransformStep>,
}

impl Pipeline {
    pub fn new(
        ctx: RunContext,
        store: SharedStore,
        source: Arc<dyn PaymentsSource>,
        transform: Arc<dyn TransformStep>,
    ) -> Self {
        Self {
            manifests: ManifestStore::new(store.clone()),
            extractor: Extractor::new(source, store.clone()),
            ctx,
            store,
            transform,
        }
    }

    /// Wire the configured store, HTTP source and transform command.
    pub async fn open(ctx: RunContext) -> Result<Self> {
        let store = storage::open_store(&ctx.settings).await?;
        let source = Arc::new(HttpPaymentsClient::from_context(&ctx)?);
        let transform = Arc::new(CommandTransform::from_context(&ctx, store.clone()));
        Ok(Self::new(ctx, store, source, transform))
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    fn days_or_default(&self, days: Option<i64>) -> Result<i64> {
        match days {
            Some(days) if days < 1 => Err(PipelineError::config(format!(
                "days must be at least 1, got {days}"
            ))),
            Some(days) => Ok(days),
            None => Ok(self.ctx.settings.default_days),
        }
    }

    pub async fn run_batch(&self, entity: Entity, days: Option<i64>) -> Result<ExtractResult> {
        let days = self.days_or_default(days)?;
        match self.extractor.extract_entity(&self.ctx, entity, days).await {
            Ok(result) => {
                self.write_extract_stage(&[(entity, Ok(&result))]).await?;
                Ok(result)
            }
            Err(e) => {
                error!(entity = %entity, error = %e, "Extraction failed");
                if let Err(manifest_err) =
                    self.write_extract_stage(&[(entity, Err(e.to_string()))]).await
                {
                    error!(entity = %entity, error = %manifest_err, "Failed to record extraction failure");
                }
                Err(e)
            }
        }
    }

    /// Extract every entity in turn. A failing entity is recorded and the
    /// remaining ones still run.
    pub async fn run_all(&self, days: Option<i64>) -> Result<BatchSummary> {
        let days = self.days_or_default(days)?;
        let mut summary = BatchSummary::default();

        for entity in Entity::ALL {
            match self.extractor.extract_entity(&self.ctx, entity, days).await {
                Ok(result) => summary.results.push(result),
                Err(e) => {
                    error!(entity = %entity, error = %e, "Extraction failed");
                    summary.failures.push(EntityFailure {
                        entity,
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut entries: Vec<(Entity, std::result::Result<&ExtractResult, String>)> = summary
            .results
            .iter()
            .map(|r| (r.entity, Ok(r)))
            .collect();
        entries.extend(summary.failures.iter().map(|f| (f.entity, Err(f.error.clone()))));
        self.write_extract_stage(&entries).await?;

        info!(
            succeeded = summary.results.len(),
            failed = summary.failures.len(),
            "Extraction finished"
        );
        Ok(summary)
    }

    pub async fn run_transforms(&self) -> Result<Vec<TransformMetric>> {
        transform::run_transforms(self.transform.as_ref(), &self.manifests, &self.ctx).await
    }

    pub async fn run_quality(&self) -> Result<QualityReport> {
        quality::run_quality(self.store.as_ref(), &self.manifests, &self.ctx).await
    }

    /// Extract, transform, then check quality, stopping after the first
    /// stage that fails.
    pub async fn run_pipeline(&self, days: Option<i64>) -> Result<PipelineOutcome> {
        let mut outcome = PipelineOutcome {
            extract: self.run_all(days).await?,
            ..Default::default()
        };
        if !outcome.extract.succeeded() {
            return Ok(outcome);
        }

        outcome.transforms = Some(self.run_transforms().await?);
        outcome.quality = Some(self.run_quality().await?);
        Ok(outcome)
    }

    async fn write_extract_stage(
        &self,
        entries: &[(Entity, std::result::Result<&ExtractResult, String>)],
    ) -> Result<()> {
        let mut entities = Map::new();
        for (entity, outcome) in entries {
            let value = match outcome {
                Ok(result) => serde_json::to_value(result)?,
                Err(message) => json!({ "error": message }),
            };
            entities.insert(entity.as_str().to_string(), value);
        }
        self.manifests
            .write_run_manifest(
                &self.ctx.run_id,
                json!({ "extract": { "entities": Value::Object(entities) } }),
            )
            .await?;
        Ok(())
    }
}
