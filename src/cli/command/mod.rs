pub mod daily;
pub mod monthly;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::{Context, Result};
use indicatif::MultiProgress;
use tracing::{info, warn};

pub use daily::daily;
pub use monthly::monthly;

use crate::{
    config::Config,
    download::{HttpFetcher, RetryingFetcher},
    pipeline::{PeriodPipeline, RunSummary},
};

/// Runs the pipeline over every period of `config`.
///
/// Ctrl-C lets the current period finish, then ends the run.
pub async fn run(config: Config) -> Result<RunSummary> {
    config.prepare_save_directory().with_context(|| {
        format!(
            "cannot create save directory `{}`",
            config.save_directory.display()
        )
    })?;
    let region = config.region().context("invalid region")?;

    let fetcher = RetryingFetcher::new(HttpFetcher::new(config.request_timeout)?, config.retry.clone());
    let pipeline = PeriodPipeline::new(
        fetcher,
        region,
        config.save_directory.clone(),
        config.catalog.clone(),
    )
    .with_overwrite(config.overwrite)
    .with_retry(config.retry.clone())
    .with_progress(MultiProgress::new());

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current period");
            flag.store(true, Ordering::SeqCst);
        }
    });

    info!(
        periods = config.periods.len(),
        save_directory = %config.save_directory.display(),
        crs = %config.crs,
        "Starting run"
    );
    let summary = pipeline.run(&config.periods, &cancel).await?;
    info!(
        processed = summary.processed(),
        done = summary.done,
        skipped = summary.skipped(),
        failed = summary.failed,
        cancelled = summary.cancelled,
        "Run finished"
    );

    Ok(summary)
}
