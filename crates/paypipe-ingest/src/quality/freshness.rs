//! Staleness of curated models, judged from their latest pointers

use crate::manifest::ManifestStore;
use chrono::{DateTime, Duration, Utc};
use paypipe_common::{time, Result};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FreshnessResult {
    pub model: String,
    pub passed: bool,
    pub message: String,
}

/// One result per latest pointer. With no pointers at all a single failing
/// result for model `"all"` is returned.
pub async fn run_freshness_checks(
    manifests: &ManifestStore,
    now: DateTime<Utc>,
    max_age_hours: i64,
) -> Result<Vec<FreshnessResult>> {
    let pointers = manifests.list_latest_models().await?;
    if pointers.is_empty() {
        return Ok(vec![FreshnessResult {
            model: "all".to_string(),
            passed: false,
            message: "No _latest manifests found. Run transforms and ensure gold latest pointers are written."
                .to_string(),
        }]);
    }

    let max_age = Duration::hours(max_age_hours);
    let results: Vec<FreshnessResult> = pointers
        .into_iter()
        .map(|pointer| match time::parse_iso(&pointer.updated_at) {
            None => FreshnessResult {
                model: pointer.model,
                passed: false,
                message: format!("unparseable updated_at '{}'", pointer.updated_at),
            },
            Some(updated_at) => {
                let age = now - updated_at;
                if age > max_age {
                    FreshnessResult {
                        message: format!(
                            "stale by {}. latest dt={} run_id={}",
                            format_age(age),
                            pointer.dt,
                            pointer.run_id
                        ),
                        model: pointer.model,
                        passed: false,
                    }
                } else {
                    FreshnessResult {
                        model: pointer.model,
                        passed: true,
                        message: "ok".to_string(),
                    }
                }
            }
        })
        .collect();

    info!(
        failed = results.iter().filter(|r| !r.passed).count(),
        "Freshness checks complete"
    );
    Ok(results)
}

fn format_age(age: Duration) -> String {
    let total = age.num_seconds();
    format!(
        "{}h{:02}m{:02}s",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
