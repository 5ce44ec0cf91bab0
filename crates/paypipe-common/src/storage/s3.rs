//! S3 backend
//!
//! `put_atomic` is a single `PutObject`, which S3 applies atomically per key.
//! `rename` is copy-then-delete and is therefore not atomic.

use super::{validate_prefix, validate_relative_path, ObjectStore};
use crate::config::S3Settings;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{http::HttpResponse, BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    Client,
};
use tracing::{debug, info, instrument};

#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store").field("bucket", &self.bucket).finish()
    }
}

impl S3Store {
    pub async fn new(settings: &S3Settings) -> Result<Self> {
        let bucket = settings
            .bucket
            .clone()
            .ok_or_else(|| PipelineError::config("S3_BUCKET is required for the S3 store"))?;

        debug!(
            region = %settings.region,
            endpoint = ?settings.endpoint,
            path_style = settings.path_style,
            "Initializing S3 store"
        );

        let mut builder = match (&settings.access_key, &settings.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "paypipe-storage");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
                    .region(Region::new(settings.region.clone()))
            }
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(Region::new(settings.region.clone()))
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        builder = builder.force_path_style(settings.path_style);
        if let Some(endpoint) = &settings.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(builder.build());
        info!("S3 client initialized for bucket: {}", bucket);

        Ok(Self { client, bucket })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String> {
        debug!("Uploading {} bytes to s3://{}/{}", data.len(), self.bucket, key);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| classify(format!("put s3://{}/{key}", self.bucket), e))?;
        Ok(self.location(key))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put_bytes(&self, path: &str, data: Vec<u8>) -> Result<String> {
        let key = validate_relative_path(path)?;
        self.put(&key, data).await
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put_atomic(&self, path: &str, data: Vec<u8>) -> Result<String> {
        let key = validate_relative_path(path)?;
        self.put(&key, data).await
    }

    #[instrument(skip(self))]
    async fn get_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let key = validate_relative_path(path)?;
        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Ok(None)
            }
            Err(e) => return Err(classify(format!("get s3://{}/{key}", self.bucket), e)),
        };

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| PipelineError::TransientIo(format!("read s3://{}/{key}: {e}", self.bucket)))?
            .into_bytes()
            .to_vec();
        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), self.bucket, key);
        Ok(Some(data))
    }

    #[instrument(skip(self))]
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = validate_prefix(prefix)?;
        let key_prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{prefix}/")
        };

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&key_prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| classify(format!("list s3://{}/{key_prefix}", self.bucket), e))?;

            keys.extend(
                response
                    .contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(|k| k.to_string())),
            );

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    #[instrument(skip(self))]
    async fn exists(&self, path: &str) -> Result<bool> {
        let key = validate_relative_path(path)?;
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(classify(format!("head s3://{}/{key}", self.bucket), e)),
        }
    }

    #[instrument(skip(self))]
    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = validate_relative_path(from)?;
        let target = validate_relative_path(to)?;

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(format!("{}/{}", self.bucket, source))
            .key(&target)
            .send()
            .await
            .map_err(|e| classify(format!("copy s3://{}/{source}", self.bucket), e))?;

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&source)
            .send()
            .await
            .map_err(|e| classify(format!("delete s3://{}/{source}", self.bucket), e))?;

        info!("Moved s3://{}/{} to {}", self.bucket, source, target);
        Ok(())
    }

    fn location(&self, path: &str) -> String {
        format!("s3://{}/{}", self.bucket, path.trim_start_matches('/'))
    }
}

/// Timeouts, dispatch failures, throttling and 5xx are transient; everything
/// else is a hard storage error.
fn classify<E>(context: String, err: SdkError<E, HttpResponse>) -> PipelineError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let transient = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(service) => {
            let status = service.raw().status();
            status.is_server_error() || status.as_u16() == 429
        }
        _ => false,
    };

    let message = format!("{context}: {}", DisplayErrorContext(&err));
    if transient {
        PipelineError::TransientIo(message)
    } else {
        PipelineError::Storage(message)
    }
}
