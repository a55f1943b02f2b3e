//! Drives each period through download, extraction and clipping.
//!
//! A period moves `Pending → Downloading → Downloaded → Extracting →
//! Extracted → Clipping → Done`. Any failure stops it where it is, and the
//! period's transient files are removed before the next period starts,
//! whatever the outcome.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};

use indicatif::{MultiProgress, ProgressDrawTarget};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    asset::{Catalog, RemoteAsset},
    cli::create_progress_bar,
    download::{download_progress_bar, save_stream, Fetcher, RetryPolicy},
    error::{Error, Result},
    extract::decompress,
    period::{Period, PeriodEnumerator},
    raster::{self, Raster},
    region::Region,
};

/// Where a period is in its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pending,
    Downloading,
    Downloaded,
    Extracting,
    Extracted,
    Clipping,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pending => "pending",
            Stage::Downloading => "download",
            Stage::Downloaded => "downloaded",
            Stage::Extracting => "extract",
            Stage::Extracted => "extracted",
            Stage::Clipping => "clip",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// How a single period ended.
#[derive(Debug)]
pub enum PeriodOutcome {
    /// Clipped and saved.
    Saved(PathBuf),
    /// The clipped file was already in the save directory.
    AlreadyPresent(PathBuf),
    /// The server has no asset for this period.
    Unavailable { status: u16 },
    Failed { stage: Stage, reason: Error },
}

impl fmt::Display for PeriodOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodOutcome::Saved(path) => write!(f, "saved `{}`", path.display()),
            PeriodOutcome::AlreadyPresent(path) => {
                write!(f, "skipped, `{}` already exists", path.display())
            }
            PeriodOutcome::Unavailable { status } => {
                write!(f, "skipped, not available (HTTP {})", status)
            }
            PeriodOutcome::Failed { stage, reason } => {
                write!(f, "failed during {}: {}", stage, reason)
            }
        }
    }
}

/// Counts per outcome over a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub done: usize,
    pub unavailable: usize,
    pub already_present: usize,
    pub failed: usize,
    /// The run stopped early on request.
    pub cancelled: bool,
}

impl RunSummary {
    fn record(&mut self, outcome: &PeriodOutcome) {
        match outcome {
            PeriodOutcome::Saved(_) => self.done += 1,
            PeriodOutcome::AlreadyPresent(_) => self.already_present += 1,
            PeriodOutcome::Unavailable { .. } => self.unavailable += 1,
            PeriodOutcome::Failed { .. } => self.failed += 1,
        }
    }

    pub fn skipped(&self) -> usize {
        self.unavailable + self.already_present
    }

    pub fn processed(&self) -> usize {
        self.done + self.skipped() + self.failed
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "done: {}, skipped: {}, failed: {}",
            self.done,
            self.skipped(),
            self.failed
        )
    }
}

/// Transient files of one period. Whatever is still tracked when the guard
/// is cleaned up or dropped gets deleted.
#[derive(Debug, Default)]
struct Scratch {
    paths: Vec<PathBuf>,
}

impl Scratch {
    fn track(&mut self, path: PathBuf) -> PathBuf {
        self.paths.push(path.clone());
        path
    }

    /// Delete a transient file as soon as it is no longer needed.
    fn remove(&mut self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        self.paths.retain(|p| p != path);
        Ok(())
    }

    fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed transient file"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove transient file"),
            }
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Processes periods one at a time against a fixed region.
pub struct PeriodPipeline<F> {
    fetcher: F,
    region: Region,
    save_directory: PathBuf,
    catalog: Catalog,
    overwrite: bool,
    retry: RetryPolicy,
    progress: MultiProgress,
}

impl<F: Fetcher> PeriodPipeline<F> {
    /// `region` is the canonical region; it is reprojected afresh for every
    /// raster.
    pub fn new(fetcher: F, region: Region, save_directory: PathBuf, catalog: Catalog) -> Self {
        Self {
            fetcher,
            region,
            save_directory,
            catalog,
            overwrite: false,
            retry: RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            },
            progress: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
        }
    }

    /// Replace clipped files that already exist instead of skipping them.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Restart downloads whose body breaks off mid-transfer.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_progress(mut self, progress: MultiProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Runs one period to completion. Only fatal errors are returned as
    /// `Err`; everything else is reported in the outcome.
    pub async fn process(&self, period: Period) -> Result<PeriodOutcome> {
        let asset = RemoteAsset::for_period(period, &self.catalog);
        let output = self.save_directory.join(asset.clipped_name());

        if output.exists() && !self.overwrite {
            debug!(period = %period, path = %output.display(), "Clipped file exists");
            return Ok(PeriodOutcome::AlreadyPresent(output));
        }

        let mut scratch = Scratch::default();
        let mut stage = Stage::Pending;
        let result = self.advance(&asset, &output, &mut scratch, &mut stage).await;
        scratch.cleanup();

        match result {
            Ok(()) => {
                info!(period = %period, path = %output.display(), "Clipped and saved");
                Ok(PeriodOutcome::Saved(output))
            }
            Err(Error::FetchFailure { status }) => {
                info!(period = %period, url = %asset.url, status, "Asset unavailable");
                Ok(PeriodOutcome::Unavailable { status })
            }
            Err(e) if e.is_fatal() => {
                error!(period = %period, stage = %stage, error = %e, "Aborting run");
                Err(e)
            }
            Err(e) => {
                warn!(period = %period, stage = %stage, error = %e, "Period failed");
                Ok(PeriodOutcome::Failed { stage, reason: e })
            }
        }
    }

    async fn advance(
        &self,
        asset: &RemoteAsset,
        output: &Path,
        scratch: &mut Scratch,
        stage: &mut Stage,
    ) -> Result<()> {
        *stage = Stage::Downloading;
        let gz_path = scratch.track(self.save_directory.join(&asset.file_name));
        self.download(asset, &gz_path).await?;
        *stage = Stage::Downloaded;

        *stage = Stage::Extracting;
        let raw_path = scratch.track(self.save_directory.join(asset.decompressed_name()));
        decompress(&gz_path)?;
        scratch.remove(&gz_path)?;
        *stage = Stage::Extracted;

        *stage = Stage::Clipping;
        let source = Raster::open(&raw_path)?;
        // Reprojected from the canonical region, never from a previous period.
        let clipped = raster::clip(&source, &self.region)?;
        raster::write(output, &clipped, &source.meta)?;
        scratch.remove(&raw_path)?;
        *stage = Stage::Done;

        Ok(())
    }

    /// Fetches the asset into `dest`, starting over from the first byte when
    /// the body breaks off.
    async fn download(&self, asset: &RemoteAsset, dest: &Path) -> Result<u64> {
        let mut attempt = 0;
        let mut delay = self.retry.initial_delay;

        loop {
            debug!(url = %asset.url, attempt, "Downloading");
            let fetched = self.fetcher.fetch(&asset.url).await?;

            let pb = self.progress.add(download_progress_bar(
                fetched.content_length,
                format!("Downloading {}", asset.file_name),
            ));
            let saved = save_stream(fetched.body, dest, Some(&pb)).await;
            pb.finish_and_clear();
            self.progress.remove(&pb);

            match saved {
                Err(Error::Transfer(reason)) if attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        url = %asset.url,
                        error = %reason,
                        retry = attempt,
                        max_retries = self.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Transfer broke off, restarting download"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.retry.next_delay(delay);
                }
                result => return result,
            }
        }
    }

    /// Processes every period in order, stopping after the current period
    /// once `cancel` is set. A fatal error ends the run with `Err`.
    pub async fn run(&self, periods: &PeriodEnumerator, cancel: &AtomicBool) -> Result<RunSummary> {
        let overall = self
            .progress
            .add(create_progress_bar(periods.len() as u64, "Processing periods".to_string()));
        let mut summary = RunSummary::default();
        if periods.is_empty() {
            info!("No periods to process");
        }

        for period in periods.periods() {
            if cancel.load(Ordering::SeqCst) {
                warn!(next = %period, "Stop requested, ending run");
                summary.cancelled = true;
                break;
            }

            overall.set_message(format!("Processing {}", period));
            let span = info_span!(
                "period",
                key = %period,
                from = ?period.first_instant(),
                to = ?period.last_instant()
            );
            let outcome = match self.process(period).instrument(span).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    overall.abandon_with_message(format!("Aborted at {}", period));
                    return Err(e);
                }
            };

            self.progress
                .suspend(|| println!("{}: {}", period, outcome));
            summary.record(&outcome);
            overall.inc(1);
        }

        overall.finish_with_message(summary.to_string());
        Ok(summary)
    }
}

// -- Tests -------------------------------------------------------------------
