//! Per-invocation run context

use chrono::{DateTime, Utc};
use paypipe_common::config::{PipelineEnv, Settings};
use paypipe_common::{ids, time, PipelineError, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Immutable state shared by every component for one process invocation.
///
/// `now` is read once so the date partition and every envelope's
/// `ingested_at` agree for the whole run.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub env: PipelineEnv,
    pub now: DateTime<Utc>,
    pub settings: Arc<Settings>,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Build a context. The run id is taken from `run_id`, then `RUN_ID`,
    /// and generated otherwise.
    ///
    /// The run id becomes a path segment, so anything that would not survive
    /// [`ids::sanitize_id_for_path`] unchanged is rejected.
    pub fn new(settings: Arc<Settings>, run_id: Option<String>) -> Result<Self> {
        let run_id = run_id
            .or_else(|| settings.run_id.clone())
            .unwrap_or_else(ids::new_run_id);
        if ids::sanitize_id_for_path(&run_id) != run_id {
            return Err(PipelineError::config(format!(
                "run id {run_id:?} is not a valid path segment"
            )));
        }
        Ok(Self {
            run_id,
            env: settings.pipeline_env,
            now: time::utc_now(),
            settings,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn now_ts(&self) -> i64 {
        self.now.timestamp()
    }

    /// Date partition (`YYYY-MM-DD`) for artifacts written by this run.
    pub fn dt(&self) -> String {
        time::dt_partition(self.now)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_precedence() {
        let mut settings = Settings::default();
        settings.run_id = Some("from-env".to_string());
        let settings = Arc::new(settings);

        let explicit = RunContext::new(settings.clone(), Some("explicit".to_string())).unwrap();
        assert_eq!(explicit.run_id, "explicit");

        let from_env = RunContext::new(settings, None).unwrap();
        assert_eq!(from_env.run_id, "from-env");

        let generated = RunContext::new(Arc::new(Settings::default()), None).unwrap();
        assert_eq!(generated.run_id.len(), 36);
    }

    #[test]
    fn test_dt_follows_fixed_clock() {
        let ctx = RunContext::new(Arc::new(Settings::default()), None)
            .unwrap()
            .with_now(time::from_unix(1_700_000_000).unwrap());
        assert_eq!(ctx.dt(), "2023-11-14");
        assert_eq!(ctx.now_ts(), 1_700_000_000);
    }

    #[test]
    fn test_run_id_must_be_path_safe() {
        let settings = Arc::new(Settings::default());
        for bad in ["x/../../watermarks/charges", "..", "a b", "", "_leading"] {
            let err = RunContext::new(settings.clone(), Some(bad.to_string())).unwrap_err();
            assert!(matches!(err, PipelineError::Configuration(_)), "{bad}");
        }

        let mut from_env = Settings::default();
        from_env.run_id = Some("run/1".to_string());
        assert!(RunContext::new(Arc::new(from_env), None).is_err());

        assert!(RunContext::new(settings, Some("2024-01-01.run_7".to_string())).is_ok());
    }
}
