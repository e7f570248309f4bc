//! # tpf-harvest
//!
//! Resilient, parallel harvesting of K2 target pixel file headers into one
//! metadata table per observing campaign.
//!
//! ## Pipeline
//!
//! For every URL of a campaign's URL list:
//! - [`acquire::FileAcquirer`] resolves it to a local file, preferring the
//!   local mirror and otherwise downloading to a scratch file with bounded
//!   retries
//! - [`fits::FitsReader`] indexes the container's header units and reads only
//!   what is asked of it
//! - [`metadata::extract`] builds the fixed 38-field [`MetadataRecord`]
//! - the scratch file is deleted
//!
//! [`worker::HarvestWorker`] does this for one URL, [`pool::run_all`] runs
//! many of them concurrently and [`aggregate::Aggregator`] writes the
//! results, one flushed row at a time. Per-file failures are logged and
//! dropped; the run as a whole still succeeds.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tpf_harvest::{CampaignOrchestrator, CampaignSelection, Config};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         concurrency: 32,
//!         ..Default::default()
//!     };
//!
//!     let orchestrator = CampaignOrchestrator::new(config)?;
//!     let summary = orchestrator.run_campaign(3).await?;
//!     println!("{} rows written", summary.written);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Local mirror lookup and remote download
pub mod acquire;
/// Metadata table writer
pub mod aggregate;
/// Campaign selection and runs
pub mod campaign;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// FITS container access
pub mod fits;
/// Metadata record extraction
pub mod metadata;
/// Concurrent dispatch
pub mod pool;
/// Retry logic with fixed backoff
pub mod retry;
/// Per-file unit of work
pub mod worker;

pub use acquire::{AcquisitionResult, FileAcquirer, HttpFetcher, RemoteFetcher};
pub use aggregate::{Aggregator, HarvestSummary, Progress};
pub use campaign::{CampaignOrchestrator, CampaignSelection};
pub use config::{Config, MirrorConfig, RetryConfig};
pub use error::{AcquisitionError, CleanupError, ConfigurationError, Error, FormatError, Result};
pub use fits::FitsReader;
pub use metadata::{FIELDS, MetadataRecord};
pub use worker::{HarvestError, HarvestOutcome, HarvestWorker};
