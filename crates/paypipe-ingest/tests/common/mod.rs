//! Shared fixtures for ingest integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use paypipe_common::config::Settings;
use paypipe_common::time;
use paypipe_ingest::RunContext;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Fixed clock for every test run: 2023-11-14T22:13:20Z
pub const NOW_TS: i64 = 1_700_000_000;

/// In-memory upstream that filters by `created` and pages after a cursor id.
pub struct FakeUpstream {
    entities: HashMap<String, Vec<Value>>,
    failures_remaining: AtomicU32,
}

impl FakeUpstream {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            failures_remaining: AtomicU32::new(0),
        }
    }

    pub fn with_records(mut self, entity: &str, mut records: Vec<Value>) -> Self {
        records.sort_by(|a, b| {
            let key = |r: &Value| (r["created"].as_i64().unwrap_or(0), r["id"].as_str().unwrap_or("").to_string());
            key(a).cmp(&key(b))
        });
        self.entities.insert(entity.to_string(), records);
        self
    }

    /// Answer the next `n` requests with HTTP 503.
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }
}

impl Respond for FakeUpstream {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return ResponseTemplate::new(503);
        }

        let entity = request.url.path().trim_start_matches("/v1/").to_string();
        let params: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let int = |key: &str| params.get(key).and_then(|v| v.parse::<i64>().ok());

        let mut data: Vec<Value> = self
            .entities
            .get(&entity)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|r| int("created_gte").map_or(true, |gte| r["created"].as_i64().unwrap() >= gte))
            .filter(|r| int("created_lte").map_or(true, |lte| r["created"].as_i64().unwrap() <= lte))
            .collect();

        if let Some(after) = params.get("starting_after") {
            if let Some(idx) = data.iter().position(|r| r["id"] == after.as_str()) {
                data = data.split_off(idx + 1);
            }
        }

        let limit = int("limit").unwrap_or(100) as usize;
        let has_more = data.len() > limit;
        data.truncate(limit);

        ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": data,
            "has_more": has_more,
            "url": request.url.path(),
        }))
    }
}

pub async fn start_upstream(upstream: FakeUpstream) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/[a-z_]+$"))
        .respond_with(upstream)
        .mount(&server)
        .await;
    server
}

/// `n` records `{prefix}_{i:03}` created one second apart, ending just
/// before [`NOW_TS`].
pub fn records(prefix: &str, n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            json!({
                "id": format!("{prefix}_{i:03}"),
                "object": prefix,
                "created": NOW_TS - 1000 + i as i64,
                "amount": 100 * (i as i64 + 1),
                "currency": "usd",
                "status": "succeeded",
                "customer": format!("cus_{:03}", i % 3),
            })
        })
        .collect()
}

pub fn settings(data_dir: &Path, base_url: &str, extra: &[(&str, &str)]) -> Settings {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("PIPELINE_ENV".to_string(), "LOCAL".to_string()),
        ("LOCAL_DATA_DIR".to_string(), data_dir.display().to_string()),
        ("MOCK_API_BASE_URL".to_string(), base_url.to_string()),
        ("RETRY_BASE_DELAY_MS".to_string(), "1".to_string()),
        ("RETRY_MAX_DELAY_MS".to_string(), "5".to_string()),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    Settings::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn context(settings: Settings, run_id: &str) -> RunContext {
    RunContext::new(Arc::new(settings), Some(run_id.to_string()))
        .unwrap()
        .with_now(time::from_unix(NOW_TS).unwrap())
}
