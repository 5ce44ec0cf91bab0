//! Silver/gold transform orchestration
//!
//! The transforms themselves are external: a [`TransformStep`] is asked to
//! materialize one model at one output path. This module owns the model
//! registry, ordering, metrics and latest pointers.

use crate::manifest::ManifestStore;
use crate::RunContext;
use async_trait::async_trait;
use paypipe_common::storage::SharedStore;
use paypipe_common::{paths, PipelineError, Result};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use std::time::Instant;
use tokio::process::Command;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Silver,
    Gold,
}

impl Layer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Silver => "silver",
            Layer::Gold => "gold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub name: &'static str,
    pub layer: Layer,
}

impl ModelSpec {
    const fn silver(name: &'static str) -> Self {
        Self { name, layer: Layer::Silver }
    }

    const fn gold(name: &'static str) -> Self {
        Self { name, layer: Layer::Gold }
    }

    /// Relative object path of this model's artifact for `dt`.
    pub fn output_path(&self, dt: &str) -> String {
        match self.layer {
            Layer::Silver => paths::silver_relative_path(self.name, dt),
            Layer::Gold => paths::gold_relative_path(self.name, dt),
        }
    }
}

/// Models in execution order: every silver model before any gold model.
pub const MODEL_EXECUTION_ORDER: [ModelSpec; 7] = [
    ModelSpec::silver("payment_intents"),
    ModelSpec::silver("charges"),
    ModelSpec::silver("invoices"),
    ModelSpec::silver("customers"),
    ModelSpec::gold("dim_customers"),
    ModelSpec::gold("fct_payments"),
    ModelSpec::gold("fct_invoices"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformStatus {
    Ok,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformMetric {
    pub model: String,
    pub layer: Layer,
    pub runtime_seconds: f64,
    pub status: TransformStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Materialized,
    Skipped,
}

/// Materializes one curated model
#[async_trait]
pub trait TransformStep: Send + Sync {
    async fn run(&self, model: &ModelSpec, output_path: &str, ctx: &RunContext) -> Result<StepOutcome>;
}

/// Runs `TRANSFORM_COMMAND` through `sh -c` once per model.
///
/// The command receives `PAYPIPE_MODEL`, `PAYPIPE_LAYER`,
/// `PAYPIPE_OUTPUT_PATH`, `PAYPIPE_RUN_ID` and `LOCAL_DATA_DIR`.
pub struct CommandTransform {
    command: Option<String>,
    data_dir: PathBuf,
    store: SharedStore,
}

impl CommandTransform {
    pub fn new(command: Option<String>, data_dir: PathBuf, store: SharedStore) -> Self {
        Self {
            command,
            data_dir,
            store,
        }
    }

    pub fn from_context(ctx: &RunContext, store: SharedStore) -> Self {
        Self::new(
            ctx.settings.transform_command.clone(),
            ctx.settings.local_data_dir.clone(),
            store,
        )
    }
}

#[async_trait]
impl TransformStep for CommandTransform {
    async fn run(&self, model: &ModelSpec, output_path: &str, ctx: &RunContext) -> Result<StepOutcome> {
        let Some(command) = &self.command else {
            warn!(model = model.name, "TRANSFORM_COMMAND not set, skipping model");
            return Ok(StepOutcome::Skipped);
        };

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("PAYPIPE_MODEL", model.name)
            .env("PAYPIPE_LAYER", model.layer.as_str())
            .env("PAYPIPE_OUTPUT_PATH", self.store.location(output_path))
            .env("PAYPIPE_RUN_ID", &ctx.run_id)
            .env("LOCAL_DATA_DIR", &self.data_dir)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Transform {
                model: model.name.to_string(),
                message: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(StepOutcome::Materialized)
    }
}

/// Run every model in order, stopping at the first failure.
///
/// The `transform` stage of the run manifest is written in both cases; on
/// failure the failing model's metric is recorded before the error is
/// returned.
pub async fn run_transforms(
    step: &dyn TransformStep,
    manifests: &ManifestStore,
    ctx: &RunContext,
) -> Result<Vec<TransformMetric>> {
    let dt = ctx.dt();
    let mut metrics = Vec::with_capacity(MODEL_EXECUTION_ORDER.len());
    let mut failure = None;

    for model in MODEL_EXECUTION_ORDER.iter() {
        if ctx.cancel.is_cancelled() {
            failure = Some(PipelineError::Cancelled);
            break;
        }

        let output_path = model.output_path(&dt);
        let started = Instant::now();
        let outcome = step.run(model, &output_path, ctx).await;
        let runtime_seconds = (started.elapsed().as_secs_f64() * 1000.0).round() / 1000.0;

        let outcome = match outcome {
            Ok(StepOutcome::Materialized) if model.layer == Layer::Gold => manifests
                .write_latest_model(model.name, &ctx.run_id, &dt, &output_path)
                .await
                .map(|_| StepOutcome::Materialized),
            other => other,
        };

        let status = match outcome {
            Ok(StepOutcome::Materialized) => TransformStatus::Ok,
            Ok(StepOutcome::Skipped) => TransformStatus::Skipped,
            Err(e) => {
                error!(model = model.name, layer = model.layer.as_str(), error = %e, "Transform failed");
                failure = Some(e);
                TransformStatus::Failed
            }
        };

        metrics.push(TransformMetric {
            model: model.name.to_string(),
            layer: model.layer,
            runtime_seconds,
            status,
        });

        if failure.is_some() {
            break;
        }
    }

    manifests
        .write_run_manifest(&ctx.run_id, json!({ "transform": { "dt": dt, "metrics": metrics } }))
        .await?;

    match failure {
        Some(e) => Err(e),
        None => {
            info!(run_id = %ctx.run_id, models = metrics.len(), "Transforms completed");
            Ok(metrics)
        }
    }
}
