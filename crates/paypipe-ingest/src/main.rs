//! paypipe - incremental payments ingestion

use anyhow::Result;
use clap::{Parser, Subcommand};
use paypipe_common::config::Settings;
use paypipe_common::logging::{init_logging, LogConfig, LogLevel};
use paypipe_common::PipelineError;
use paypipe_ingest::pipeline::Pipeline;
use paypipe_ingest::{Entity, RunContext};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "paypipe")]
#[command(author, version, about = "Incremental payments ingestion pipeline")]
struct Cli {
    /// Explicit run id for cross-step traceability
    #[arg(long, global = true)]
    run_id: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one entity into bronze
    RunBatch {
        #[arg(long, value_enum)]
        entity: Entity,

        /// Lookback in days when the entity has no watermark yet
        #[arg(long)]
        days: Option<i64>,
    },

    /// Extract every entity
    RunAll {
        #[arg(long)]
        days: Option<i64>,
    },

    /// Materialize silver and gold models
    RunTransforms,

    /// Run schema, freshness and reconciliation checks
    RunQuality,

    /// Extract, transform and check quality
    RunPipeline {
        #[arg(long)]
        days: Option<i64>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::RunBatch { .. } => "run-batch",
            Command::RunAll { .. } => "run-all",
            Command::RunTransforms => "run-transforms",
            Command::RunQuality => "run-quality",
            Command::RunPipeline { .. } => "run-pipeline",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("paypipe".to_string())
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);
    let _log_guard = match init_logging(&log_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let command = cli.command.name();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(command, error = ?e, "Command failed");
            match e.downcast_ref::<PipelineError>() {
                Some(PipelineError::Configuration(_)) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Arc::new(Settings::from_env()?);
    let ctx = RunContext::new(settings, cli.run_id)?;

    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            cancel.cancel();
        }
    });

    info!(run_id = %ctx.run_id, env = %ctx.env, command = cli.command.name(), "Starting");
    let pipeline = Pipeline::open(ctx).await?;

    let code = match cli.command {
        Command::RunBatch { entity, days } => {
            let result = pipeline.run_batch(entity, days).await?;
            info!(
                entity = %result.entity,
                records = result.record_count,
                pages = result.stats.pages,
                retries = result.stats.retries,
                "Batch complete"
            );
            ExitCode::SUCCESS
        }
        Command::RunAll { days } => {
            let summary = pipeline.run_all(days).await?;
            exit_code(summary.succeeded())
        }
        Command::RunTransforms => {
            let metrics = pipeline.run_transforms().await?;
            info!(metrics = %serde_json::to_string(&metrics)?, "Transforms complete");
            ExitCode::SUCCESS
        }
        Command::RunQuality => {
            let report = pipeline.run_quality().await?;
            info!(report = %serde_json::to_string(&report)?, "Quality complete");
            exit_code(report.passed)
        }
        Command::RunPipeline { days } => {
            let outcome = pipeline.run_pipeline(days).await?;
            info!(passed = outcome.passed(), "Pipeline complete");
            exit_code(outcome.passed())
        }
    };

    Ok(code)
}

fn exit_code(passed: bool) -> ExitCode {
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
