//! Bronze versus silver consistency checks

use super::latest_artifact;
use super::parquet::CuratedTable;
use crate::entity::Entity;
use paypipe_common::storage::ObjectStore;
use paypipe_common::{paths, Result};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

pub const CHARGES_CUSTOMER_RELATION: &str = "charges.customer_id -> customers.id";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReconCheck {
    Rowcount {
        entity: String,
        bronze_count: usize,
        silver_count: usize,
        diff: usize,
        tolerance: usize,
        passed: bool,
    },
    Referential {
        relation: String,
        missing_refs: usize,
        passed: bool,
        /// Set when the check could not be evaluated
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ReconCheck {
    pub fn passed(&self) -> bool {
        match self {
            ReconCheck::Rowcount { passed, .. } | ReconCheck::Referential { passed, .. } => *passed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub dt: String,
    pub passed: bool,
    pub checks: Vec<ReconCheck>,
}

/// Passes when `|bronze - silver| <= max(1, floor(bronze * ratio))`.
pub fn rowcount_check(entity: &str, bronze_count: usize, silver_count: usize, ratio: f64) -> ReconCheck {
    let diff = bronze_count.abs_diff(silver_count);
    let tolerance = ((bronze_count as f64 * ratio).floor() as usize).max(1);
    ReconCheck::Rowcount {
        entity: entity.to_string(),
        bronze_count,
        silver_count,
        diff,
        tolerance,
        passed: diff <= tolerance,
    }
}

/// Child keys with no matching parent. Keys are trimmed; null and empty
/// child keys are ignored.
pub fn count_missing_refs(children: &[Option<String>], parents: &[Option<String>]) -> usize {
    let parent_ids: HashSet<&str> = parents
        .iter()
        .flatten()
        .map(|p| p.trim())
        .collect();
    children
        .iter()
        .flatten()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty() && !parent_ids.contains(c))
        .count()
}

/// Latest bronze `dt` of `entity` and the number of non-empty JSONL lines in
/// its chunk files.
pub async fn bronze_count(store: &dyn ObjectStore, entity: &str) -> Result<(Option<String>, usize)> {
    let files = store.list(&paths::bronze_entity_prefix(entity)).await?;
    let chunks: Vec<&String> = files
        .iter()
        .filter(|p| {
            let name = paths::file_name(p);
            name.starts_with("part-") && name.ends_with(".jsonl")
        })
        .collect();

    let Some(latest_dt) = chunks.iter().filter_map(|p| paths::dt_of(p)).max() else {
        return Ok((None, 0));
    };
    let latest_dt = latest_dt.to_string();

    let mut count = 0;
    for path in chunks.iter().filter(|p| paths::dt_of(p) == Some(latest_dt.as_str())) {
        if let Some(bytes) = store.get_bytes(path).await? {
            count += bytes
                .split(|b| *b == b'\n')
                .filter(|line| line.iter().any(|b| !b.is_ascii_whitespace()))
                .count();
        }
    }
    Ok((Some(latest_dt), count))
}

/// Orphaned `charges.customer_id` values. A missing key column fails the
/// check rather than counting as zero orphans.
fn referential_check(charges: &CuratedTable, customers: &CuratedTable) -> Result<ReconCheck> {
    let children = charges.string_values("customer_id")?;
    let parents = customers.string_values("id")?;
    let check = match (children, parents) {
        (Some(children), Some(parents)) => {
            let missing_refs = count_missing_refs(&children, &parents);
            ReconCheck::Referential {
                relation: CHARGES_CUSTOMER_RELATION.to_string(),
                missing_refs,
                passed: missing_refs == 0,
                error: None,
            }
        }
        (children, _) => {
            let column = if children.is_none() {
                "charges.customer_id"
            } else {
                "customers.id"
            };
            warn!(column, "Referential check impossible, key column missing");
            ReconCheck::Referential {
                relation: CHARGES_CUSTOMER_RELATION.to_string(),
                missing_refs: 0,
                passed: false,
                error: Some(format!("missing column {column}")),
            }
        }
    };
    Ok(check)
}

async fn latest_silver(store: &dyn ObjectStore, entity: &str) -> Result<Option<CuratedTable>> {
    match latest_artifact(store, &paths::silver_entity_prefix(entity)).await? {
        Some(path) => CuratedTable::load(store, &path).await,
        None => Ok(None),
    }
}

/// Rowcount check per entity plus the charges→customers referential check.
pub async fn run_reconciliation(store: &dyn ObjectStore, tolerance_ratio: f64) -> Result<ReconciliationReport> {
    let mut checks = Vec::new();
    let mut report_dt: Option<String> = None;

    for entity in Entity::ALL {
        let (dt, bronze) = bronze_count(store, entity.as_str()).await?;
        if dt > report_dt {
            report_dt = dt;
        }
        let silver = latest_silver(store, entity.as_str())
            .await?
            .map(|t| t.row_count())
            .unwrap_or(0);
        checks.push(rowcount_check(entity.as_str(), bronze, silver, tolerance_ratio));
    }

    let charges = latest_silver(store, Entity::Charges.as_str()).await?;
    let customers = latest_silver(store, Entity::Customers.as_str()).await?;
    if let (Some(charges), Some(customers)) = (charges, customers) {
        checks.push(referential_check(&charges, &customers)?);
    }

    let passed = checks.iter().all(ReconCheck::passed);
    let report = ReconciliationReport {
        dt: report_dt.unwrap_or_else(|| "unknown".to_string()),
        passed,
        checks,
    };
    info!(dt = %report.dt, passed = report.passed, "Reconciliation complete");
    Ok(report)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::quality::parquet::tests::parquet_bytes;
    use paypipe_common::storage::LocalStore;
    use tempfile::TempDir;

    #[test]
    fn test_rowcount_tolerance() {
        let ok = rowcount_check("charges", 1000, 995, 0.01);
        assert_eq!(
            ok,
            ReconCheck::Rowcount {
                entity: "charges".to_string(),
                bronze_count: 1000,
                silver_count: 995,
                diff: 5,
                tolerance: 10,
                passed: true,
            }
        );
        assert!(!rowcount_check("charges", 1000, 980, 0.01).passed());
        // Small counts still allow a difference of one
        assert!(rowcount_check("customers", 10, 9, 0.01).passed());
        assert!(rowcount_check("customers", 0, 0, 0.01).passed());
    }

    #[test]
    fn test_missing_refs_trims_and_skips_blank() {
        let children = vec![
            Some(" cus_1 ".to_string()),
            Some("cus_2".to_string()),
            Some("   ".to_string()),
            None,
            Some("cus_9".to_string()),
        ];
        let parents = vec![Some("cus_1".to_string()), Some("cus_2 ".to_string()), None];
        assert_eq!(count_missing_refs(&children, &parents), 1);
    }

    #[tokio::test]
    async fn test_bronze_count_uses_latest_dt() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store
            .put_bytes(
                "bronze/source=stripe/entity=charges/dt=2026-02-14/run_id=a/part-00000.jsonl",
                b"{}\n{}\n{}\n".to_vec(),
            )
            .await
            .unwrap();
        store
            .put_bytes(
                "bronze/source=stripe/entity=charges/dt=2026-02-15/run_id=b/part-00000.jsonl",
                b"{}\n{}\n\n".to_vec(),
            )
            .await
            .unwrap();
        store
            .put_bytes(
                "bronze/source=stripe/entity=charges/dt=2026-02-15/run_id=b/part-00001.jsonl",
                b"{}".to_vec(),
            )
            .await
            .unwrap();
        store
            .put_bytes(
                "bronze/source=stripe/entity=charges/dt=2026-02-15/run_id=b/_metadata.json",
                b"{\"record_count\": 3}\n".to_vec(),
            )
            .await
            .unwrap();

        let (dt, count) = bronze_count(&store, "charges").await.unwrap();
        assert_eq!(dt.as_deref(), Some("2026-02-15"));
        assert_eq!(count, 3);

        assert_eq!(bronze_count(&store, "invoices").await.unwrap(), (None, 0));
    }

    #[tokio::test]
    async fn test_report_includes_referential_check() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store
            .put_bytes(
                "bronze/source=stripe/entity=charges/dt=2026-02-15/run_id=b/part-00000.jsonl",
                b"{}\n{}\n".to_vec(),
            )
            .await
            .unwrap();
        store
            .put_bytes(
                "silver/source=stripe/entity=charges/dt=2026-02-15/data.parquet",
                parquet_bytes(&[
                    ("id", vec![Some("ch_1"), Some("ch_2")]),
                    ("customer_id", vec![Some("cus_1"), Some("cus_404")]),
                ]),
            )
            .await
            .unwrap();
        store
            .put_bytes(
                "silver/source=stripe/entity=customers/dt=2026-02-15/data.parquet",
                parquet_bytes(&[("id", vec![Some("cus_1")])]),
            )
            .await
            .unwrap();

        let report = run_reconciliation(&store, 0.01).await.unwrap();
        assert_eq!(report.dt, "2026-02-15");
        assert_eq!(report.checks.len(), 5);
        assert_eq!(
            report.checks[4],
            ReconCheck::Referential {
                relation: CHARGES_CUSTOMER_RELATION.to_string(),
                missing_refs: 1,
                passed: false,
                error: None,
            }
        );
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn test_empty_store_reports_unknown_dt() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        let report = run_reconciliation(&store, 0.01).await.unwrap();
        assert_eq!(report.dt, "unknown");
        assert_eq!(report.checks.len(), 4);
        assert!(report.passed);
    }

    #[tokio::test]
    async fn test_missing_foreign_key_column_fails_referential_check() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store
            .put_bytes(
                "silver/source=stripe/entity=charges/dt=2026-02-15/data.parquet",
                parquet_bytes(&[
                    ("id", vec![Some("ch_1")]),
                    ("customer", vec![Some("cus_404")]),
                ]),
            )
            .await
            .unwrap();
        store
            .put_bytes(
                "silver/source=stripe/entity=customers/dt=2026-02-15/data.parquet",
                parquet_bytes(&[("id", vec![Some("cus_1")])]),
            )
            .await
            .unwrap();

        let report = run_reconciliation(&store, 0.01).await.unwrap();
        assert_eq!(
            report.checks[4],
            ReconCheck::Referential {
                relation: CHARGES_CUSTOMER_RELATION.to_string(),
                missing_refs: 0,
                passed: false,
                error: Some("missing column charges.customer_id".to_string()),
            }
        );
        assert!(!report.passed);
    }
}
