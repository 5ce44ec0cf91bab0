//! Paypipe Ingest
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental batch ingestion of payments data into the bronze layer, plus
//! the run manifest, transform orchestration and quality gate that follow it.
//!
//! The flow for one entity is:
//!
//! 1. [`watermark::WatermarkStore`] resolves the extraction window
//! 2. [`client::PaymentsSource`] pages through the upstream API, with
//!    [`retry::retry_call`] absorbing transient failures
//! 3. [`bronze::BronzeWriter`] persists sorted, chunked envelopes
//! 4. the watermark is committed only after the write succeeded
//!
//! [`pipeline::Pipeline`] wires these together for the `paypipe` binary.

pub mod bronze;
pub mod client;
pub mod context;
pub mod entity;
pub mod extract;
pub mod manifest;
pub mod pipeline;
pub mod quality;
pub mod retry;
pub mod transform;
pub mod watermark;

pub use context::RunContext;
pub use entity::Entity;
