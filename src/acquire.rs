//! File acquisition: local mirror first, remote download second
//!
//! [`FileAcquirer::acquire`] resolves a target pixel file URL to a readable
//! local path. A URL under the mirrored archive prefix maps to a path below
//! the mirror root; when that file exists it is used in place. Otherwise the
//! URL is streamed to a uniquely named scratch file, retrying transient
//! failures with a fixed backoff.
//!
//! Scratch files are owned by a [`ScratchFile`] guard. The guard deletes the
//! file when released or dropped, so a scratch copy never outlives the worker
//! that created it, whether processing succeeded, failed or panicked.

use crate::config::{Config, MirrorConfig, RetryConfig};
use crate::error::{AcquisitionError, CleanupError, Result};
use crate::retry::with_retry;
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Process-wide counter making scratch names unique
static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Network access seam
///
/// Implemented by [`HttpFetcher`] in production and by stubs in tests.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    /// Stream the resource at `url` into `dest`, replacing any previous content
    ///
    /// Returns the number of bytes written. The file is complete and flushed
    /// when this returns `Ok`.
    async fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<u64, AcquisitionError>;
}

/// HTTP(S) fetcher backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    chunk_size: usize,
}

impl HttpFetcher {
    /// Build a fetcher using the configured timeout and write buffer size
    pub fn new(config: &Config) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.http_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            chunk_size: config.chunk_size.max(1),
        })
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> std::result::Result<u64, AcquisitionError> {
        let transport = |e: reqwest::Error| AcquisitionError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };
        let scratch = |source: std::io::Error| AcquisitionError::Scratch {
            path: dest.to_path_buf(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let file = tokio::fs::File::create(dest).await.map_err(scratch)?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            writer.write_all(&chunk).await.map_err(scratch)?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(scratch)?;

        Ok(written)
    }
}

/// A temporary download, deleted when released or dropped
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve a unique scratch path for `url` in `dir`
    ///
    /// The name keeps the URL's file name so scratch files stay recognisable;
    /// a sequence number and the process id prevent collisions between
    /// concurrent downloads of equally named files.
    pub fn reserve(dir: &Path, url: &str) -> std::result::Result<Self, AcquisitionError> {
        let name = url_basename(url)?;
        let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
        Ok(Self {
            path: dir.join(format!("{seq}-{}-{name}", std::process::id())),
        })
    }

    /// Location of the scratch file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now, reporting failure
    ///
    /// A file that was never created counts as removed. A failed deletion is
    /// not retried on drop.
    pub async fn remove(mut self) -> std::result::Result<(), CleanupError> {
        let path = std::mem::take(&mut self.path);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed scratch file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CleanupError { path, source }),
        }
    }
}

// Only reached when the owner is dropped without `remove` (cancellation, panic)
impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        if let Err(source) = remove_if_present(&self.path) {
            let err = CleanupError {
                path: self.path.clone(),
                source,
            };
            warn!(error = %err, "failed to delete scratch file");
        }
    }
}

fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed scratch file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// A locally readable copy of a remote file
#[derive(Debug)]
pub struct AcquisitionResult {
    url: String,
    path: PathBuf,
    scratch: Option<ScratchFile>,
}

impl AcquisitionResult {
    /// The URL the file was requested under
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Local path to read
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the path is a scratch download the caller must delete
    pub fn is_temporary(&self) -> bool {
        self.scratch.is_some()
    }

    /// Delete the scratch copy, if any
    pub async fn release(self) -> std::result::Result<(), CleanupError> {
        match self.scratch {
            Some(scratch) => scratch.remove().await,
            None => Ok(()),
        }
    }
}

/// Resolves URLs to local files (see the module documentation)
#[derive(Clone)]
pub struct FileAcquirer {
    mirror: MirrorConfig,
    scratch_dir: PathBuf,
    retry: RetryConfig,
    fetcher: Arc<dyn RemoteFetcher>,
}

impl std::fmt::Debug for FileAcquirer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAcquirer")
            .field("mirror", &self.mirror)
            .field("scratch_dir", &self.scratch_dir)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl FileAcquirer {
    /// Create an acquirer using the given network fetcher
    pub fn new(config: &Config, fetcher: Arc<dyn RemoteFetcher>) -> Self {
        Self {
            mirror: config.mirror.clone(),
            scratch_dir: config.scratch_dir.clone(),
            retry: config.retry.clone(),
            fetcher,
        }
    }

    /// Create an acquirer downloading over HTTP
    pub fn with_http(config: &Config) -> Result<Self> {
        Ok(Self::new(config, Arc::new(HttpFetcher::new(config)?)))
    }

    /// Candidate mirror path for a URL (pure string mapping)
    ///
    /// Returns `None` for URLs outside the mirrored prefix.
    pub fn mirror_path(&self, url: &str) -> Option<PathBuf> {
        let relative = url.strip_prefix(self.mirror.remote_prefix.as_str())?;
        Some(self.mirror.local_root.join(relative.trim_start_matches('/')))
    }

    /// Resolve `url` to a local file
    ///
    /// # Errors
    ///
    /// [`AcquisitionError::AttemptsExhausted`] once every download attempt
    /// failed, or the first non-retryable error. Any partial scratch file has
    /// been deleted by then.
    pub async fn acquire(&self, url: &str) -> std::result::Result<AcquisitionResult, AcquisitionError> {
        if let Some(local) = self.mirror_path(url) {
            let is_file = tokio::fs::metadata(&local)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false);
            if is_file {
                debug!(url, path = %local.display(), "using local mirror");
                return Ok(AcquisitionResult {
                    url: url.to_string(),
                    path: local,
                    scratch: None,
                });
            }
        }

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|source| AcquisitionError::Scratch {
                path: self.scratch_dir.clone(),
                source,
            })?;
        let scratch = ScratchFile::reserve(&self.scratch_dir, url)?;
        debug!(url, path = %scratch.path().display(), "downloading");

        let dest = scratch.path().to_path_buf();
        let fetched = with_retry(&self.retry, |attempt| {
            let dest = dest.clone();
            async move {
                debug!(url, attempt, "fetch attempt");
                self.fetcher.fetch(url, &dest).await
            }
        })
        .await;

        match fetched {
            Ok(bytes) => {
                debug!(url, bytes, "download complete");
                Ok(AcquisitionResult {
                    url: url.to_string(),
                    path: dest,
                    scratch: Some(scratch),
                })
            }
            Err(failure) if failure.attempts > 1 => Err(AcquisitionError::AttemptsExhausted {
                url: url.to_string(),
                attempts: failure.attempts,
                last: Box::new(failure.error),
            }),
            Err(failure) => Err(failure.error),
        }
    }
}

/// File name component of a URL's path
pub fn url_basename(url: &str) -> std::result::Result<String, AcquisitionError> {
    let parsed =
        url::Url::parse(url).map_err(|e| AcquisitionError::InvalidUrl(format!("{url}: {e}")))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AcquisitionError::InvalidUrl(format!("{url}: no file name")))
}
