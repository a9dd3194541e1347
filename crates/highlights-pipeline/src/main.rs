//! Highlights pipeline - fetch, archive and store basketball highlights

use anyhow::Result;
use clap::Parser;
use highlights_common::logging::{init_logging, LogConfig, LogLevel};
use highlights_pipeline::{config::PipelineConfig, Pipeline, PipelineOptions};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "highlights-pipeline")]
#[command(author, version, about = "Basketball highlights ingestion pipeline")]
struct Cli {
    /// Day to fetch (YYYY-MM-DD), overrides HIGHLIGHTS_DATE
    #[arg(long)]
    date: Option<String>,

    /// League name, overrides HIGHLIGHTS_LEAGUE
    #[arg(long)]
    league: Option<String>,

    /// Maximum highlights to request, overrides HIGHLIGHTS_LIMIT
    #[arg(long)]
    limit: Option<u32>,

    /// Archive object base name, overrides HIGHLIGHTS_ARCHIVE_NAME
    #[arg(long)]
    archive_name: Option<String>,

    /// Attempts per stage, overrides RETRY_COUNT
    #[arg(long)]
    retries: Option<u32>,

    /// Seconds between attempts, overrides RETRY_DELAY_SECS
    #[arg(long)]
    retry_delay: Option<u64>,

    /// Seconds between stages, overrides WAIT_TIME_BETWEEN_STAGES_SECS
    #[arg(long)]
    stage_wait: Option<u64>,

    /// Write to in-memory stores instead of S3 and DynamoDB
    #[arg(long)]
    dry_run: bool,

    /// Run only the ingestion stage
    #[arg(long)]
    ingest_only: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(date) = &self.date {
            config.query.date = date.clone();
        }
        if let Some(league) = &self.league {
            config.query.league = league.clone();
        }
        if let Some(limit) = self.limit {
            config.query.limit = limit;
        }
        if let Some(name) = &self.archive_name {
            config.query.archive_name = name.clone();
        }
        if let Some(retries) = self.retries {
            config.retry.retry_count = retries;
        }
        if let Some(delay) = self.retry_delay {
            config.retry.retry_delay_secs = delay;
        }
        if let Some(wait) = self.stage_wait {
            config.retry.stage_wait_secs = wait;
        }
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            dry_run: self.dry_run,
            ingest_only: self.ingest_only,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // LOG_* variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("highlights-pipeline")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    let mut config = PipelineConfig::from_env()?;
    cli.apply(&mut config);
    config.validate()?;

    info!(
        date = %config.query.date,
        league = %config.query.league,
        bucket = %config.storage.bucket,
        table = %config.storage.table,
        "Configuration loaded"
    );

    let pipeline = Pipeline::from_config(&config, cli.options()).await?;

    if let Err(err) = pipeline.run().await {
        error!(stage = %err.stage, attempts = err.attempts, error = %err, "Pipeline failed");
        return Err(err.into());
    }

    info!("Pipeline complete");
    Ok(())
}
