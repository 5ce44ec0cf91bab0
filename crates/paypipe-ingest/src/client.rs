//! Paginated extraction client for the upstream payments API
//!
//! Upstream contract: `GET /v1/{entity}?created_gte&created_lte&starting_after&limit`
//! answers `{"object": "list", "data": [...], "has_more": bool}`. The cursor is
//! the `id` of the last record of the previous page.

use crate::entity::Entity;
use crate::retry::{retry_call, RetryPolicy, RetryStats};
use crate::RunContext;
use async_trait::async_trait;
use paypipe_common::{PipelineError, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Longest upstream error body echoed into an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallMetadata {
    pub url: String,
    pub status_code: u16,
    pub retries: u32,
    pub failures: u32,
}

/// One page of an entity listing
#[derive(Debug, Clone)]
pub struct ListPage {
    pub entity: Entity,
    pub records: Vec<Value>,
    pub has_more: bool,
    /// Id of the last record when `has_more`, else `None`
    pub next_cursor: Option<String>,
    pub call_metadata: CallMetadata,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IterStats {
    pub api_calls: u32,
    pub pages: u32,
    pub retries: u32,
    pub failures: u32,
}

/// All records of one window plus summed call metrics
#[derive(Debug, Clone, Default)]
pub struct EntityBatch {
    pub records: Vec<Value>,
    pub stats: IterStats,
}

/// Source of paginated entity records
#[async_trait]
pub trait PaymentsSource: Send + Sync {
    async fn list_entity(
        &self,
        entity: Entity,
        start_ts: i64,
        end_ts: i64,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ListPage>;

    /// Follow cursors until the window is exhausted.
    ///
    /// Pages are fetched strictly in sequence since each cursor depends on
    /// the previous response.
    async fn iter_entity(
        &self,
        entity: Entity,
        start_ts: i64,
        end_ts: i64,
        limit: u32,
    ) -> Result<EntityBatch> {
        let mut batch = EntityBatch::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = self
                .list_entity(entity, start_ts, end_ts, cursor.as_deref(), limit)
                .await?;

            batch.stats.api_calls += 1;
            batch.stats.pages += 1;
            batch.stats.retries += page.call_metadata.retries;
            batch.stats.failures += page.call_metadata.failures;
            batch.records.extend(page.records);

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        info!(
            entity = %entity,
            records = batch.records.len(),
            pages = batch.stats.pages,
            retries = batch.stats.retries,
            "Window extracted"
        );
        Ok(batch)
    }
}

/// `PaymentsSource` over HTTP
pub struct HttpPaymentsClient {
    client: Client,
    base_url: String,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl HttpPaymentsClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        policy: RetryPolicy,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            policy,
            cancel,
        })
    }

    pub fn from_context(ctx: &RunContext) -> Result<Self> {
        Self::new(
            ctx.settings.api_base_url.clone(),
            ctx.settings.api_timeout(),
            RetryPolicy::from_settings(&ctx.settings.retry),
            ctx.cancel.clone(),
        )
    }

    fn entity_url(&self, entity: Entity) -> String {
        format!("{}/v1/{}", self.base_url, entity.as_str())
    }

    async fn fetch_once(&self, url: &str, query: &[(&str, String)]) -> Result<(u16, Value)> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| transport_error(url, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(PipelineError::TransientIo(format!(
                "GET {url} returned HTTP {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::Upstream {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(url, e))?;
        let payload: Value = serde_json::from_slice(&body)?;
        Ok((status.as_u16(), payload))
    }
}

#[async_trait]
impl PaymentsSource for HttpPaymentsClient {
    #[instrument(skip_all, fields(entity = %entity, start_ts = start_ts, end_ts = end_ts, cursor = ?cursor))]
    async fn list_entity(
        &self,
        entity: Entity,
        start_ts: i64,
        end_ts: i64,
        cursor: Option<&str>,
        limit: u32,
    ) -> Result<ListPage> {
        let url = self.entity_url(entity);
        let mut query = vec![
            ("created_gte", start_ts.to_string()),
            ("created_lte", end_ts.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("starting_after", cursor.to_string()));
        }

        let mut stats = RetryStats::default();
        let (status_code, mut payload) = retry_call(
            &self.policy,
            &mut stats,
            &self.cancel,
            PipelineError::is_transient,
            || self.fetch_once(&url, &query),
        )
        .await?;

        let records = match payload.get_mut("data").map(Value::take) {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(PipelineError::Upstream {
                    status: status_code,
                    message: format!("expected 'data' array, got {other}"),
                })
            }
        };
        let has_more = payload
            .get("has_more")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let next_cursor = if has_more {
            records
                .last()
                .and_then(|r| r.get("id"))
                .and_then(Value::as_str)
                .map(str::to_string)
        } else {
            None
        };

        debug!(
            records = records.len(),
            has_more,
            cursor = ?next_cursor,
            retries = stats.retries,
            "Fetched page"
        );

        Ok(ListPage {
            entity,
            records,
            has_more,
            next_cursor,
            call_metadata: CallMetadata {
                url,
                status_code,
                retries: stats.retries,
                failures: stats.failures,
            },
        })
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> PipelineError {
    if err.is_builder() {
        PipelineError::config(format!("invalid request for {url}: {err}"))
    } else {
        PipelineError::TransientIo(format!("GET {url}: {err}"))
    }
}
