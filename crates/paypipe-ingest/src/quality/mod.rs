//! Quality gate: schema, freshness and reconciliation
//!
//! Check outcomes are data. Errors are reserved for being unable to run a
//! check at all (unreadable store, undecodable artifact).

pub mod freshness;
pub mod parquet;
pub mod reconciliation;
pub mod schema;

use crate::manifest::ManifestStore;
use crate::RunContext;
use freshness::FreshnessResult;
use paypipe_common::storage::ObjectStore;
use paypipe_common::{paths, Result};
use reconciliation::ReconciliationReport;
use schema::SchemaCheckResult;
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub run_id: String,
    pub passed: bool,
    pub schema: Vec<SchemaCheckResult>,
    pub freshness: Vec<FreshnessResult>,
    pub reconciliation: ReconciliationReport,
    /// Location of the persisted reconciliation artifact
    pub reconciliation_path: String,
}

/// `data.parquet` under the greatest `dt=` partition below `prefix`.
pub async fn latest_artifact(store: &dyn ObjectStore, prefix: &str) -> Result<Option<String>> {
    let candidates = store.list(prefix).await?;
    Ok(candidates
        .into_iter()
        .filter(|p| paths::file_name(p) == "data.parquet" && paths::dt_of(p).is_some())
        .max_by(|a, b| paths::dt_of(a).cmp(&paths::dt_of(b))))
}

/// Run all three checks, persist the reconciliation artifact and record the
/// `quality` stage of the run manifest.
pub async fn run_quality(
    store: &dyn ObjectStore,
    manifests: &ManifestStore,
    ctx: &RunContext,
) -> Result<QualityReport> {
    let quality = &ctx.settings.quality;

    let schema = schema::run_schema_checks(store, &schema::MODEL_RULES).await?;
    let freshness =
        freshness::run_freshness_checks(manifests, ctx.now, quality.freshness_max_age_hours).await?;
    let reconciliation =
        reconciliation::run_reconciliation(store, quality.recon_tolerance_ratio).await?;

    let reconciliation_path = manifests
        .write_reconciliation(
            &reconciliation.dt,
            &json!({ "passed": reconciliation.passed, "checks": reconciliation.checks }),
        )
        .await?;

    let passed = schema.iter().all(|r| r.passed)
        && freshness.iter().all(|r| r.passed)
        && reconciliation.passed;

    let report = QualityReport {
        run_id: ctx.run_id.clone(),
        passed,
        schema,
        freshness,
        reconciliation,
        reconciliation_path,
    };

    manifests
        .write_run_manifest(
            &ctx.run_id,
            json!({
                "quality": {
                    "passed": report.passed,
                    "schema": report.schema,
                    "freshness": report.freshness,
                    "reconciliation": report.reconciliation,
                }
            }),
        )
        .await?;

    if report.passed {
        info!(run_id = %ctx.run_id, "Quality gate passed");
    } else {
        warn!(run_id = %ctx.run_id, "Quality gate failed");
    }
    Ok(report)
}
