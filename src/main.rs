//! K2 target pixel file metadata harvester
//!
//! Reads `k2-c<CC>-tpf-urls.txt` from the data directory and writes
//! `k2-c<CC>-tpf-metadata.csv` next to it.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tpf_harvest::{CampaignOrchestrator, CampaignSelection, Config};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tpf-harvest")]
#[command(about = "Harvest K2 target pixel file headers into a metadata table", long_about = None)]
struct Cli {
    /// Campaign number, or "all" for campaigns 0 to 5
    campaign: CampaignSelection,

    /// JSON configuration file; flags below override its values
    #[arg(short, long, env = "TPF_CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding URL lists and output tables
    #[arg(long, env = "TPF_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Local mirror of the archive
    #[arg(long, env = "TPF_MIRROR_ROOT")]
    mirror_root: Option<PathBuf>,

    /// URL prefix corresponding to the mirror root
    #[arg(long, env = "TPF_REMOTE_PREFIX")]
    remote_prefix: Option<String>,

    /// Directory for temporary downloads
    #[arg(long, env = "TPF_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Maximum download attempts per file
    #[arg(long, env = "TPF_MAX_ATTEMPTS")]
    max_attempts: Option<u32>,

    /// Seconds to wait between download attempts
    #[arg(long, env = "TPF_RETRY_BACKOFF_SECS")]
    retry_backoff_secs: Option<u64>,

    /// Skip short cadence files
    #[arg(long, env = "TPF_IGNORE_SHORT_CADENCE")]
    ignore_short_cadence: bool,

    /// Files processed concurrently
    #[arg(short = 'j', long, env = "TPF_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Result<(CampaignSelection, Config), tpf_harvest::Error> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };

        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(root) = self.mirror_root {
            config.mirror.local_root = root;
        }
        if let Some(prefix) = self.remote_prefix {
            config.mirror.remote_prefix = prefix;
        }
        if let Some(dir) = self.scratch_dir {
            config.scratch_dir = dir;
        }
        if let Some(attempts) = self.max_attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(secs) = self.retry_backoff_secs {
            config.retry.backoff = Duration::from_secs(secs);
        }
        if self.ignore_short_cadence {
            config.ignore_short_cadence = true;
        }
        if let Some(concurrency) = self.concurrency {
            config.concurrency = concurrency;
        }

        Ok((self.campaign, config))
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let (selection, config) = cli.into_config()?;
    tracing::info!(campaigns = %selection, data_dir = %config.data_dir.display(), "tpf-harvest starting");

    let orchestrator = CampaignOrchestrator::new(config)?;
    let results = orchestrator.run(selection).await;

    let failed = results.iter().filter(|(_, result)| result.is_err()).count();
    for (campaign, result) in &results {
        match result {
            Ok(summary) => println!(
                "campaign {campaign:2}: {} rows written, {} skipped, {} failed of {} urls",
                summary.written, summary.skipped, summary.failed, summary.total
            ),
            Err(e) => println!("campaign {campaign:2}: not harvested: {e}"),
        }
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
