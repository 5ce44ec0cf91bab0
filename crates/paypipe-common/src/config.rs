//! Configuration management
//!
//! Settings are read once at startup from the process environment (after an
//! optional `.env` file) and then shared immutably.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

pub const DEFAULT_LOCAL_DATA_DIR: &str = "./data";

pub const DEFAULT_AWS_REGION: &str = "us-east-1";

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8001";

pub const DEFAULT_API_TIMEOUT_SECS: u64 = 10;

/// Trailing slice re-fetched behind the watermark on every incremental run.
pub const DEFAULT_SAFETY_WINDOW_SECONDS: i64 = 300;

/// Lookback used when an entity has never been ingested.
pub const DEFAULT_DAYS: i64 = 1;

pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Upper bound the upstream accepts for `limit`.
pub const MAX_PAGE_SIZE_LIMIT: u32 = 500;

pub const DEFAULT_BRONZE_CHUNK_SIZE: usize = 1000;

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 300;
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 5000;
pub const DEFAULT_RETRY_JITTER_RATIO: f64 = 0.2;

pub const DEFAULT_WEBHOOK_TOLERANCE_SECONDS: i64 = 300;
pub const DEFAULT_WEBHOOK_HOST: &str = "0.0.0.0";
pub const DEFAULT_WEBHOOK_PORT: u16 = 8000;

pub const DEFAULT_FRESHNESS_MAX_AGE_HOURS: i64 = 24;
pub const DEFAULT_RECON_TOLERANCE_RATIO: f64 = 0.01;

/// Storage backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PipelineEnv {
    Local,
    Aws,
}

impl std::str::FromStr for PipelineEnv {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "LOCAL" => Ok(PipelineEnv::Local),
            "AWS" => Ok(PipelineEnv::Aws),
            other => Err(PipelineError::config(format!(
                "PIPELINE_ENV must be LOCAL or AWS, got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for PipelineEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEnv::Local => write!(f, "LOCAL"),
            PipelineEnv::Aws => write!(f, "AWS"),
        }
    }
}

/// S3 connection settings, used when `PIPELINE_ENV=AWS`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Settings {
    pub bucket: Option<String>,
    pub region: String,
    /// Custom endpoint for MinIO / LocalStack
    pub endpoint: Option<String>,
    pub path_style: bool,
    /// Static credentials; when absent the default AWS provider chain is used
    pub access_key: Option<String>,
    #[serde(skip_serializing)]
    pub secret_key: Option<String>,
}

/// Backoff parameters for upstream calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSettings {
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub verify_signatures: bool,
    pub tolerance_seconds: i64,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySettings {
    pub freshness_max_age_hours: i64,
    pub recon_tolerance_ratio: f64,
}

/// Process-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub pipeline_env: PipelineEnv,
    pub local_data_dir: PathBuf,
    pub s3: S3Settings,
    pub api_base_url: String,
    pub api_timeout_secs: u64,
    pub safety_window_seconds: i64,
    pub default_days: i64,
    pub max_page_size: u32,
    pub bronze_chunk_size: usize,
    pub retry: RetrySettings,
    pub webhook: WebhookSettings,
    pub quality: QualitySettings,
    /// External program that materializes silver/gold models
    pub transform_command: Option<String>,
    pub run_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pipeline_env: PipelineEnv::Local,
            local_data_dir: PathBuf::from(DEFAULT_LOCAL_DATA_DIR),
            s3: S3Settings {
                bucket: None,
                region: DEFAULT_AWS_REGION.to_string(),
                endpoint: None,
                path_style: false,
                access_key: None,
                secret_key: None,
            },
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_timeout_secs: DEFAULT_API_TIMEOUT_SECS,
            safety_window_seconds: DEFAULT_SAFETY_WINDOW_SECONDS,
            default_days: DEFAULT_DAYS,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            bronze_chunk_size: DEFAULT_BRONZE_CHUNK_SIZE,
            retry: RetrySettings {
                max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
                base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
                max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
                jitter_ratio: DEFAULT_RETRY_JITTER_RATIO,
            },
            webhook: WebhookSettings {
                secret: None,
                verify_signatures: false,
                tolerance_seconds: DEFAULT_WEBHOOK_TOLERANCE_SECONDS,
                host: DEFAULT_WEBHOOK_HOST.to_string(),
                port: DEFAULT_WEBHOOK_PORT,
            },
            quality: QualitySettings {
                freshness_max_age_hours: DEFAULT_FRESHNESS_MAX_AGE_HOURS,
                recon_tolerance_ratio: DEFAULT_RECON_TOLERANCE_RATIO,
            },
            transform_command: None,
            run_id: None,
        }
    }
}

impl Settings {
    /// Load settings from `.env` and the process environment
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup (tests inject maps here)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut s = Self::default();

        if let Some(env) = get("PIPELINE_ENV") {
            s.pipeline_env = env.parse()?;
        }
        if let Some(dir) = get("LOCAL_DATA_DIR") {
            s.local_data_dir = PathBuf::from(dir);
        }

        s.s3.bucket = get("S3_BUCKET");
        if let Some(region) = get("AWS_REGION") {
            s.s3.region = region;
        }
        s.s3.endpoint = get("S3_ENDPOINT");
        s.s3.path_style = parse_or(&get, "S3_PATH_STYLE", false)?;
        s.s3.access_key = get("S3_ACCESS_KEY").or_else(|| get("AWS_ACCESS_KEY_ID"));
        s.s3.secret_key = get("S3_SECRET_KEY").or_else(|| get("AWS_SECRET_ACCESS_KEY"));

        if let Some(url) = get("MOCK_API_BASE_URL") {
            s.api_base_url = url;
        }
        s.api_timeout_secs = parse_or(&get, "API_TIMEOUT_SECS", DEFAULT_API_TIMEOUT_SECS)?;
        s.safety_window_seconds =
            parse_or(&get, "SAFETY_WINDOW_SECONDS", DEFAULT_SAFETY_WINDOW_SECONDS)?;
        s.default_days = parse_or(&get, "DEFAULT_DAYS", DEFAULT_DAYS)?;
        s.max_page_size = parse_or(&get, "MAX_PAGE_SIZE", DEFAULT_MAX_PAGE_SIZE)?;
        s.bronze_chunk_size = parse_or(&get, "BRONZE_CHUNK_SIZE", DEFAULT_BRONZE_CHUNK_SIZE)?;

        s.retry.max_attempts = parse_or(&get, "RETRY_MAX_ATTEMPTS", DEFAULT_RETRY_MAX_ATTEMPTS)?;
        s.retry.base_delay_ms = parse_or(&get, "RETRY_BASE_DELAY_MS", DEFAULT_RETRY_BASE_DELAY_MS)?;
        s.retry.max_delay_ms = parse_or(&get, "RETRY_MAX_DELAY_MS", DEFAULT_RETRY_MAX_DELAY_MS)?;
        s.retry.jitter_ratio = parse_or(&get, "RETRY_JITTER_RATIO", DEFAULT_RETRY_JITTER_RATIO)?;

        s.webhook.secret = get("WEBHOOK_SECRET");
        s.webhook.verify_signatures = parse_or(&get, "VERIFY_WEBHOOK_SIGNATURES", false)?;
        s.webhook.tolerance_seconds =
            parse_or(&get, "WEBHOOK_TOLERANCE_SECONDS", DEFAULT_WEBHOOK_TOLERANCE_SECONDS)?;
        if let Some(host) = get("WEBHOOK_HOST") {
            s.webhook.host = host;
        }
        s.webhook.port = parse_or(&get, "WEBHOOK_PORT", DEFAULT_WEBHOOK_PORT)?;

        s.quality.freshness_max_age_hours =
            parse_or(&get, "FRESHNESS_MAX_AGE_HOURS", DEFAULT_FRESHNESS_MAX_AGE_HOURS)?;
        s.quality.recon_tolerance_ratio =
            parse_or(&get, "RECON_TOLERANCE_RATIO", DEFAULT_RECON_TOLERANCE_RATIO)?;

        s.transform_command = get("TRANSFORM_COMMAND");
        s.run_id = get("RUN_ID");

        s.validate()?;
        Ok(s)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.pipeline_env == PipelineEnv::Aws && self.s3.bucket.is_none() {
            return Err(PipelineError::config(
                "S3_BUCKET is required when PIPELINE_ENV=AWS",
            ));
        }

        if self.api_base_url.trim().is_empty() {
            return Err(PipelineError::config("MOCK_API_BASE_URL cannot be empty"));
        }

        if self.api_timeout_secs == 0 {
            return Err(PipelineError::config("API_TIMEOUT_SECS must be greater than 0"));
        }

        if self.safety_window_seconds < 0 {
            return Err(PipelineError::config("SAFETY_WINDOW_SECONDS must be >= 0"));
        }

        if self.default_days < 1 {
            return Err(PipelineError::config("DEFAULT_DAYS must be >= 1"));
        }

        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_SIZE_LIMIT {
            return Err(PipelineError::config(format!(
                "MAX_PAGE_SIZE must be between 1 and {MAX_PAGE_SIZE_LIMIT}, got {}",
                self.max_page_size
            )));
        }

        if self.bronze_chunk_size == 0 {
            return Err(PipelineError::config("BRONZE_CHUNK_SIZE must be >= 1"));
        }

        if self.retry.max_attempts == 0 {
            return Err(PipelineError::config("RETRY_MAX_ATTEMPTS must be >= 1"));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_ratio) {
            return Err(PipelineError::config("RETRY_JITTER_RATIO must be within 0.0..=1.0"));
        }

        if self.webhook.tolerance_seconds < 0 {
            return Err(PipelineError::config("WEBHOOK_TOLERANCE_SECONDS must be >= 0"));
        }

        if self.webhook.port == 0 {
            return Err(PipelineError::config("WEBHOOK_PORT must be greater than 0"));
        }

        if self.quality.freshness_max_age_hours < 1 {
            return Err(PipelineError::config("FRESHNESS_MAX_AGE_HOURS must be >= 1"));
        }

        if !(0.0..=1.0).contains(&self.quality.recon_tolerance_ratio) {
            return Err(PipelineError::config(
                "RECON_TOLERANCE_RATIO must be within 0.0..=1.0",
            ));
        }

        if self.webhook.verify_signatures && self.webhook.secret.is_none() {
            tracing::warn!(
                "VERIFY_WEBHOOK_SIGNATURES is set but WEBHOOK_SECRET is empty - signatures will not be checked"
            );
        }

        Ok(())
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| PipelineError::config(format!("{key}='{raw}' is invalid: {e}"))),
        None => Ok(default),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = load(&[]).unwrap();
        assert_eq!(settings.pipeline_env, PipelineEnv::Local);
        assert_eq!(settings.safety_window_seconds, 300);
        assert_eq!(settings.max_page_size, 100);
        assert_eq!(settings.retry.max_attempts, 4);
        assert!(!settings.webhook.verify_signatures);
    }

    #[test]
    fn test_overrides() {
        let settings = load(&[
            ("PIPELINE_ENV", "local"),
            ("LOCAL_DATA_DIR", "/tmp/paypipe"),
            ("MAX_PAGE_SIZE", "50"),
            ("VERIFY_WEBHOOK_SIGNATURES", "true"),
            ("WEBHOOK_SECRET", "whsec_test"),
        ])
        .unwrap();
        assert_eq!(settings.local_data_dir, PathBuf::from("/tmp/paypipe"));
        assert_eq!(settings.max_page_size, 50);
        assert!(settings.webhook.verify_signatures);
        assert_eq!(settings.webhook.secret.as_deref(), Some("whsec_test"));
    }

    #[test]
    fn test_aws_requires_bucket() {
        let err = load(&[("PIPELINE_ENV", "AWS")]).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));

        let settings = load(&[("PIPELINE_ENV", "aws"), ("S3_BUCKET", "lake")]).unwrap();
        assert_eq!(settings.pipeline_env, PipelineEnv::Aws);
    }

    #[test]
    fn test_invalid_values_are_configuration_errors() {
        assert!(matches!(
            load(&[("PIPELINE_ENV", "GCP")]).unwrap_err(),
            PipelineError::Configuration(_)
        ));
        assert!(matches!(
            load(&[("MAX_PAGE_SIZE", "501")]).unwrap_err(),
            PipelineError::Configuration(_)
        ));
        assert!(matches!(
            load(&[("DEFAULT_DAYS", "zero")]).unwrap_err(),
            PipelineError::Configuration(_)
        ));
        assert!(matches!(
            load(&[("SAFETY_WINDOW_SECONDS", "-5")]).unwrap_err(),
            PipelineError::Configuration(_)
        ));
    }
}
