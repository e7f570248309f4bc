//! Campaign runs
//!
//! A campaign is one URL list in, one metadata table out:
//! `<data_dir>/k2-c<CC>-tpf-urls.txt` becomes `<data_dir>/k2-c<CC>-tpf-metadata.csv`.

use crate::acquire::{FileAcquirer, RemoteFetcher};
use crate::aggregate::{Aggregator, HarvestSummary, Progress};
use crate::config::Config;
use crate::error::{ConfigurationError, Result};
use crate::worker::HarvestWorker;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// Campaigns selected by `all`
pub const ALL_CAMPAIGNS: std::ops::RangeInclusive<u32> = 0..=5;

/// Which campaigns to harvest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignSelection {
    /// A single campaign
    One(u32),
    /// Every campaign in [`ALL_CAMPAIGNS`]
    All,
}

impl CampaignSelection {
    /// Campaign numbers in processing order
    pub fn campaigns(&self) -> Vec<u32> {
        match self {
            CampaignSelection::One(campaign) => vec![*campaign],
            CampaignSelection::All => ALL_CAMPAIGNS.collect(),
        }
    }
}

impl FromStr for CampaignSelection {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(CampaignSelection::All);
        }
        s.parse::<u32>()
            .map(CampaignSelection::One)
            .map_err(|_| ConfigurationError::InvalidCampaign(s.to_string()))
    }
}

impl fmt::Display for CampaignSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CampaignSelection::One(campaign) => write!(f, "{campaign}"),
            CampaignSelection::All => f.write_str("all"),
        }
    }
}

/// Input URL list of a campaign
pub fn url_list_path(data_dir: &Path, campaign: u32) -> PathBuf {
    data_dir.join(format!("k2-c{campaign:02}-tpf-urls.txt"))
}

/// Output table of a campaign
pub fn metadata_path(data_dir: &Path, campaign: u32) -> PathBuf {
    data_dir.join(format!("k2-c{campaign:02}-tpf-metadata.csv"))
}

/// Read a URL list: one URL per line, trimmed, blank lines ignored
pub async fn load_urls(path: &Path) -> std::result::Result<Vec<String>, ConfigurationError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigurationError::MissingUrlList {
            path: path.to_path_buf(),
            source,
        })?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if urls.is_empty() {
        return Err(ConfigurationError::EmptyUrlList {
            path: path.to_path_buf(),
        });
    }
    Ok(urls)
}

/// Runs campaigns one after another with a shared worker
#[derive(Debug)]
pub struct CampaignOrchestrator {
    config: Arc<Config>,
    aggregator: Aggregator,
}

impl CampaignOrchestrator {
    /// Create an orchestrator downloading over HTTP
    ///
    /// # Errors
    ///
    /// The configuration is invalid or the HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let acquirer = FileAcquirer::with_http(&config)?;
        Ok(Self::with_acquirer(config, acquirer))
    }

    /// Create an orchestrator using a custom network fetcher
    pub fn with_fetcher(config: Config, fetcher: Arc<dyn RemoteFetcher>) -> Result<Self> {
        config.validate()?;
        let acquirer = FileAcquirer::new(&config, fetcher);
        Ok(Self::with_acquirer(config, acquirer))
    }

    fn with_acquirer(config: Config, acquirer: FileAcquirer) -> Self {
        let config = Arc::new(config);
        let worker = Arc::new(HarvestWorker::new(Arc::clone(&config), acquirer));
        let aggregator = Aggregator::new(&config, worker);
        Self { config, aggregator }
    }

    /// The configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Progress of the campaign currently running
    pub fn progress(&self) -> Progress {
        self.aggregator.progress()
    }

    /// Harvest one campaign
    ///
    /// # Errors
    ///
    /// A missing or empty URL list, or a failure of the output table. Per-file
    /// failures only show up in the summary.
    pub async fn run_campaign(&self, campaign: u32) -> Result<HarvestSummary> {
        let input = url_list_path(&self.config.data_dir, campaign);
        let output = metadata_path(&self.config.data_dir, campaign);
        let urls = load_urls(&input).await?;

        info!(
            campaign,
            urls = urls.len(),
            input = %input.display(),
            output = %output.display(),
            concurrency = self.config.concurrency,
            "starting campaign"
        );
        let summary = self.aggregator.run(&urls, &output).await?;
        info!(
            campaign,
            written = summary.written,
            skipped = summary.skipped,
            failed = summary.failed,
            "campaign finished"
        );
        Ok(summary)
    }

    /// Harvest every selected campaign
    ///
    /// A failing campaign is logged and does not stop the following ones.
    pub async fn run(&self, selection: CampaignSelection) -> Vec<(u32, Result<HarvestSummary>)> {
        let mut results = Vec::new();
        for campaign in selection.campaigns() {
            let result = self.run_campaign(campaign).await;
            if let Err(e) = &result {
                error!(campaign, error = %e, error_code = e.error_code(), "campaign failed");
            }
            results.push((campaign, result));
        }
        results
    }
}
