//! Configuration types for tpf-harvest

use crate::error::{ConfigurationError, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Local mirror of the archive
///
/// A URL starting with `remote_prefix` maps to a local path by substituting
/// the prefix with `local_root`. No network access is involved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// URL prefix of the archive directory being mirrored
    #[serde(default = "default_remote_prefix")]
    pub remote_prefix: String,

    /// Local directory holding the mirrored files
    #[serde(default = "default_local_root")]
    pub local_root: PathBuf,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            remote_prefix: default_remote_prefix(),
            local_root: default_local_root(),
        }
    }
}

/// Download retry policy
///
/// Attempts are bounded; between two attempts the acquirer waits a fixed
/// `backoff` interval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of download attempts, including the first (default: 50)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts (default: 30 seconds)
    #[serde(default = "default_backoff", with = "duration_serde")]
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: default_backoff(),
        }
    }
}

/// Main configuration for a harvesting run
///
/// Built once (defaults, JSON file, CLI/environment overrides) and threaded
/// explicitly into [`FileAcquirer`](crate::acquire::FileAcquirer),
/// [`HarvestWorker`](crate::worker::HarvestWorker) and
/// [`Aggregator`](crate::aggregate::Aggregator).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Local mirror settings
    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Directory receiving temporary downloads (default: "/data/tmp/")
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Download retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Skip short-cadence files (default: false)
    #[serde(default)]
    pub ignore_short_cadence: bool,

    /// URL fragment identifying short-cadence files (default: "spd-targ")
    #[serde(default = "default_short_cadence_marker")]
    pub short_cadence_marker: String,

    /// Number of files processed concurrently (default: available parallelism)
    ///
    /// The work is I/O bound, so values well above the core count are useful.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Write buffer size for downloads in bytes (default: 16 KiB)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Whole-request HTTP timeout, body included (default: 10 minutes)
    ///
    /// With `None` a stalled transfer never fails, so it is never retried and
    /// holds its worker slot for good.
    #[serde(default = "default_http_timeout", with = "optional_duration_serde")]
    pub http_timeout: Option<Duration>,

    /// Directory holding URL lists and output tables (default: "intermediate-data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mirror: MirrorConfig::default(),
            scratch_dir: default_scratch_dir(),
            retry: RetryConfig::default(),
            ignore_short_cadence: false,
            short_cadence_marker: default_short_cadence_marker(),
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            http_timeout: default_http_timeout(),
            data_dir: default_data_dir(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file; absent fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings that would make the pipeline unable to progress
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.concurrency == 0 {
            return Err(invalid("concurrency", "must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be at least 1 byte"));
        }
        if self.mirror.remote_prefix.is_empty() {
            return Err(invalid("mirror.remote_prefix", "must not be empty"));
        }
        Ok(())
    }

    /// Whether a URL is filtered out before any work is done
    pub fn is_skipped(&self, url: &str) -> bool {
        self.ignore_short_cadence && url.contains(&self.short_cadence_marker)
    }
}

fn invalid(key: &str, message: &str) -> ConfigurationError {
    ConfigurationError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn default_remote_prefix() -> String {
    "http://archive.stsci.edu/missions/k2/target_pixel_files".to_string()
}

fn default_local_root() -> PathBuf {
    PathBuf::from("/media/gb/kdata/k2/target_pixel_files")
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("/data/tmp/")
}

fn default_http_timeout() -> Option<Duration> {
    Some(Duration::from_secs(600))
}

fn default_max_attempts() -> u32 {
    50
}

fn default_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_short_cadence_marker() -> String {
    "spd-targ".to_string()
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_chunk_size() -> usize {
    16 * 1024
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("intermediate-data")
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
