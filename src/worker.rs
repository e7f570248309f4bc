//! Per-file unit of work
//!
//! [`HarvestWorker::process`] turns one URL into a [`HarvestOutcome`]:
//! acquire the file, decode its headers, build the metadata record, delete
//! the scratch copy. It never returns an error; every failure is classified
//! and reported in the outcome.

use crate::acquire::FileAcquirer;
use crate::config::Config;
use crate::error::{AcquisitionError, FormatError};
use crate::fits::FitsReader;
use crate::metadata::{self, MetadataRecord};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Why a URL produced no record
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The file could not be obtained
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// The file could not be decoded
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The worker panicked or its task was aborted
    #[error("worker fault: {0}")]
    Fault(String),
}

impl HarvestError {
    /// Get a machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            HarvestError::Acquisition(e) => e.error_code(),
            HarvestError::Format(e) => e.error_code(),
            HarvestError::Fault(_) => "fault",
        }
    }
}

/// Result of processing one URL
#[derive(Debug)]
pub enum HarvestOutcome {
    /// The file was decoded
    Harvested {
        /// Source URL
        url: String,
        /// Extracted metadata
        record: MetadataRecord,
    },

    /// The URL was filtered out before any work was done
    Skipped {
        /// Source URL
        url: String,
    },

    /// The file could not be harvested
    Failed {
        /// Source URL
        url: String,
        /// Classified cause
        error: HarvestError,
    },
}

impl HarvestOutcome {
    /// The URL this outcome belongs to
    pub fn url(&self) -> &str {
        match self {
            HarvestOutcome::Harvested { url, .. }
            | HarvestOutcome::Skipped { url }
            | HarvestOutcome::Failed { url, .. } => url,
        }
    }

    /// The record, if the file was decoded
    pub fn record(&self) -> Option<&MetadataRecord> {
        match self {
            HarvestOutcome::Harvested { record, .. } => Some(record),
            _ => None,
        }
    }

    fn failed(url: &str, error: impl Into<HarvestError>) -> Self {
        HarvestOutcome::Failed {
            url: url.to_string(),
            error: error.into(),
        }
    }
}

/// Acquire + extract + cleanup for one URL
#[derive(Debug, Clone)]
pub struct HarvestWorker {
    config: Arc<Config>,
    acquirer: FileAcquirer,
}

impl HarvestWorker {
    /// Create a worker
    pub fn new(config: Arc<Config>, acquirer: FileAcquirer) -> Self {
        Self { config, acquirer }
    }

    /// Process one URL
    ///
    /// A scratch download is deleted before this returns, on every path. If
    /// the returned future is dropped early the scratch guard deletes it then.
    pub async fn process(&self, url: &str) -> HarvestOutcome {
        let url = url.trim();
        if self.config.is_skipped(url) {
            debug!(url, "skipping short cadence file");
            return HarvestOutcome::Skipped {
                url: url.to_string(),
            };
        }

        let acquired = match self.acquirer.acquire(url).await {
            Ok(acquired) => acquired,
            Err(e) => return HarvestOutcome::failed(url, e),
        };

        let path = acquired.path().to_path_buf();
        let record_url = url.to_string();
        debug!(url, path = %path.display(), "reading");

        // Header decoding is blocking file I/O
        let decoded = tokio::task::spawn_blocking(move || {
            let reader = FitsReader::open(&path)?;
            Ok::<_, FormatError>(metadata::extract(&reader, &record_url, &path))
        })
        .await;

        let outcome = match decoded {
            Ok(Ok(record)) => HarvestOutcome::Harvested {
                url: url.to_string(),
                record,
            },
            Ok(Err(e)) => HarvestOutcome::failed(url, e),
            Err(join_error) => HarvestOutcome::failed(url, HarvestError::Fault(join_error.to_string())),
        };

        if let Err(e) = acquired.release().await {
            error!(url, error = %e, error_code = "cleanup_failed", "could not delete scratch file");
        }

        outcome
    }
}
