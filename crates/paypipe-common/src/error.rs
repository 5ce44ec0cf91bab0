//! Error types for paypipe

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the pipeline
///
/// Quality check failures are deliberately absent: they are reported as data
/// (`passed: false`) and never raised.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Network or storage hiccup (timeout, connection reset, 5xx). Retried.
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Upstream answered with a status that retrying will not fix.
    #[error("Upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// State file that could not be decoded.
    #[error("Corrupt state at {path}: {reason}")]
    CorruptState { path: String, reason: String },

    #[error("Unsafe object path: {0}")]
    UnsafePath(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Parquet error: {0}")]
    Parquet(String),

    /// External transform step exited unsuccessfully.
    #[error("Transform '{model}' failed: {message}")]
    Transform { model: String, message: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn signature(message: impl Into<String>) -> Self {
        Self::SignatureVerification(message.into())
    }

    /// Whether the retry executor may try the failed operation again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientIo(_) => true,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::TransientIo("timeout".into()).is_transient());
        assert!(PipelineError::Io(std::io::Error::from(std::io::ErrorKind::TimedOut)).is_transient());
        assert!(!PipelineError::Io(std::io::Error::from(std::io::ErrorKind::NotFound)).is_transient());
        assert!(!PipelineError::Upstream {
            status: 404,
            message: "missing".into()
        }
        .is_transient());
        assert!(!PipelineError::signature("bad").is_transient());
    }
}
