//! Paypipe Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the paypipe workspace.
//!
//! # Overview
//!
//! This crate provides functionality used by both the batch pipeline and the
//! webhook server:
//!
//! - **Error Handling**: the `PipelineError` taxonomy and result alias
//! - **Configuration**: environment-driven `Settings`
//! - **Storage**: the object store adapter (local filesystem or S3)
//! - **Paths**: the persisted bronze/silver/gold/state layout
//! - **Logging**: `tracing` subscriber initialization
//!
//! # Example
//!
//! ```no_run
//! use paypipe_common::{config::Settings, storage};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::from_env()?;
//!     let store = storage::open_store(&settings).await?;
//!     let exists = store.exists("_state/watermarks/charges.json").await?;
//!     println!("watermark present: {exists}");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod config;
pub mod error;
pub mod ids;
pub mod logging;
pub mod paths;
pub mod storage;
pub mod time;

// Re-export commonly used types
pub use error::{PipelineError, Result};
