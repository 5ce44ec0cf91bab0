//! Column presence and not-null rules for gold models

use super::latest_artifact;
use super::parquet::CuratedTable;
use paypipe_common::storage::ObjectStore;
use paypipe_common::{paths, Result};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy)]
pub struct SchemaRule {
    pub model: &'static str,
    pub required_columns: &'static [&'static str],
    pub not_null: &'static [&'static str],
}

pub const MODEL_RULES: [SchemaRule; 3] = [
    SchemaRule {
        model: "dim_customers",
        required_columns: &["id"],
        not_null: &["id"],
    },
    SchemaRule {
        model: "fct_payments",
        required_columns: &["id"],
        not_null: &["id"],
    },
    SchemaRule {
        model: "fct_invoices",
        required_columns: &["id"],
        not_null: &["id"],
    },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaCheckResult {
    pub model: String,
    pub passed: bool,
    pub messages: Vec<String>,
}

/// Evaluate one rule against an already loaded table.
pub fn evaluate(rule: &SchemaRule, table: &CuratedTable) -> SchemaCheckResult {
    let mut messages = Vec::new();

    let mut missing: Vec<&str> = rule
        .required_columns
        .iter()
        .copied()
        .filter(|c| !table.has_column(c))
        .collect();
    missing.sort_unstable();
    if !missing.is_empty() {
        messages.push(format!("missing columns: {missing:?}"));
    }

    for column in rule.not_null {
        if let Some(nulls) = table.null_count(column).filter(|n| *n > 0) {
            messages.push(format!("column {column} has {nulls} nulls"));
        }
    }

    let passed = messages.is_empty();
    if passed {
        messages.push("ok".to_string());
    }
    SchemaCheckResult {
        model: rule.model.to_string(),
        passed,
        messages,
    }
}

/// Check the most recent artifact of every gold model in `rules`.
pub async fn run_schema_checks(
    store: &dyn ObjectStore,
    rules: &[SchemaRule],
) -> Result<Vec<SchemaCheckResult>> {
    let mut results = Vec::with_capacity(rules.len());
    for rule in rules {
        let prefix = paths::gold_model_prefix(rule.model);
        let result = match latest_artifact(store, &prefix).await? {
            Some(path) => match CuratedTable::load(store, &path).await? {
                Some(table) => evaluate(rule, &table),
                None => missing_output(rule),
            },
            None => missing_output(rule),
        };
        results.push(result);
    }

    info!(
        failed = results.iter().filter(|r| !r.passed).count(),
        "Schema checks complete"
    );
    Ok(results)
}

fn missing_output(rule: &SchemaRule) -> SchemaCheckResult {
    SchemaCheckResult {
        model: rule.model.to_string(),
        passed: false,
        messages: vec!["missing parquet output".to_string()],
    }
}
