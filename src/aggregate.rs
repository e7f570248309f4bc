//! Metadata table writer
//!
//! The [`Aggregator`] owns the output file. It writes the header row and the
//! first record once a URL has been harvested synchronously, then drains the
//! worker pool, appending one row per harvested file in completion order.
//! Every row is flushed as soon as it is written, so an interrupted run keeps
//! everything but the record in flight.
//!
//! Values are written without quoting or escaping. A value containing a
//! comma would corrupt its row; no such value occurs in target pixel file
//! headers.

use crate::config::Config;
use crate::error::Result;
use crate::metadata::{FIELDS, MetadataRecord};
use crate::pool;
use crate::worker::{HarvestOutcome, HarvestWorker};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

/// Live progress counters of a run, cheap to clone and share
#[derive(Debug, Clone, Default)]
pub struct Progress {
    processed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
}

impl Progress {
    /// URLs with an outcome so far
    pub fn processed(&self) -> usize {
        self.processed.load(Ordering::Relaxed)
    }

    /// URLs in the current run
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    fn start(&self, total: usize) {
        self.processed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    fn advance(&self) -> usize {
        self.processed.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Counts of a finished run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    /// URLs in the input
    pub total: usize,
    /// Data rows written
    pub written: usize,
    /// URLs filtered out
    pub skipped: usize,
    /// URLs that failed
    pub failed: usize,
}

/// Single writer of one metadata table
#[derive(Debug)]
pub struct Aggregator {
    worker: Arc<HarvestWorker>,
    concurrency: usize,
    progress: Progress,
}

impl Aggregator {
    /// Create an aggregator dispatching to `worker`
    pub fn new(config: &Config, worker: Arc<HarvestWorker>) -> Self {
        Self {
            worker,
            concurrency: config.concurrency,
            progress: Progress::default(),
        }
    }

    /// Handle on the progress counters
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Harvest `urls` into a new table at `output` (truncating it)
    ///
    /// URLs are processed one at a time until one yields a record, which
    /// fixes the header row; the rest go to the worker pool. Failed and
    /// skipped URLs are logged and produce no row. If no URL succeeds the
    /// table is left empty.
    ///
    /// # Errors
    ///
    /// Only failures of the output file itself; per-file failures are
    /// counted in the summary.
    pub async fn run(&self, urls: &[String], output: &Path) -> Result<HarvestSummary> {
        let file = tokio::fs::File::create(output).await?;

        self.progress.start(urls.len());
        let mut sink = TableSink {
            file,
            header_written: false,
            summary: HarvestSummary {
                total: urls.len(),
                ..Default::default()
            },
            progress: self.progress.clone(),
        };

        let mut pending = urls.iter();
        for url in pending.by_ref() {
            let outcome = pool::process_isolated(Arc::clone(&self.worker), url.clone()).await;
            sink.accept(outcome).await?;
            if sink.header_written {
                break;
            }
        }

        let remaining: Vec<String> = pending.cloned().collect();
        if !remaining.is_empty() {
            debug!(count = remaining.len(), concurrency = self.concurrency, "dispatching to pool");
            let outcomes = pool::run_all(Arc::clone(&self.worker), remaining, self.concurrency);
            futures::pin_mut!(outcomes);
            while let Some(outcome) = outcomes.next().await {
                sink.accept(outcome).await?;
            }
        }

        sink.file.flush().await?;
        let summary = sink.summary;
        info!(
            output = %output.display(),
            total = summary.total,
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed,
            "metadata table complete"
        );
        Ok(summary)
    }
}

struct TableSink {
    file: tokio::fs::File,
    header_written: bool,
    summary: HarvestSummary,
    progress: Progress,
}

impl TableSink {
    async fn accept(&mut self, outcome: HarvestOutcome) -> Result<()> {
        match outcome {
            HarvestOutcome::Harvested { record, .. } => self.write(&record).await?,
            HarvestOutcome::Skipped { url } => {
                debug!(url = %url, "skipped");
                self.summary.skipped += 1;
            }
            HarvestOutcome::Failed { url, error } => {
                error!(url = %url, error = %error, error_code = error.error_code(), "harvest failed");
                self.summary.failed += 1;
            }
        }

        let processed = self.progress.advance();
        debug!(processed, total = self.summary.total, "progress");
        Ok(())
    }

    async fn write(&mut self, record: &MetadataRecord) -> Result<()> {
        let mut lines = Vec::new();
        if !self.header_written {
            lines.extend(encode_row(FIELDS)?);
        }
        lines.extend(encode_row(record.values())?);

        self.file.write_all(&lines).await?;
        self.file.flush().await?;
        self.header_written = true;
        self.summary.written += 1;
        Ok(())
    }
}

/// One unquoted, newline-terminated CSV row
fn encode_row<I>(fields: I) -> Result<Vec<u8>>
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields)?;
    writer.into_inner().map_err(|e| e.into_error().into())
}
