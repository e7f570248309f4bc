//! Bounded retry with a fixed backoff interval
//!
//! Remote archives drop connections and time out under load; a download is
//! therefore attempted up to [`RetryConfig::max_attempts`] times, sleeping
//! [`RetryConfig::backoff`] between attempts. Errors that a retry cannot fix
//! (local disk failures, malformed URLs) are returned immediately.
//!
//! ```no_run
//! use tpf_harvest::config::RetryConfig;
//! use tpf_harvest::error::AcquisitionError;
//! use tpf_harvest::retry::with_retry;
//!
//! # async fn fetch_once(url: &str) -> Result<u64, AcquisitionError> { Ok(0) }
//! # async fn example() -> Result<(), tpf_harvest::retry::RetryError<AcquisitionError>> {
//! let url = "http://archive.stsci.edu/missions/k2/target_pixel_files/c1/a.fits";
//! let bytes = with_retry(&RetryConfig::default(), |attempt| {
//!     tracing::debug!(attempt, "fetching");
//!     fetch_once(url)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::AcquisitionError;
use std::future::Future;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (timeouts, dropped connections, server errors) return `true`.
/// Failures a retry cannot fix (disk errors, malformed input) return `false`.
pub trait IsRetryable {
    /// Returns true if the operation should be attempted again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for AcquisitionError {
    fn is_retryable(&self) -> bool {
        match self {
            // Any answer from the server may be a transient archive hiccup
            AcquisitionError::Http { .. } => true,
            AcquisitionError::Transport { .. } => true,
            AcquisitionError::Scratch { .. } => false,
            AcquisitionError::InvalidUrl(_) => false,
            AcquisitionError::AttemptsExhausted { .. } => false,
        }
    }
}

/// Final failure of a retried operation
#[derive(Debug)]
pub struct RetryError<E> {
    /// Number of attempts made (1-based)
    pub attempts: u32,
    /// Error returned by the last attempt
    pub error: E,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed after {} attempts: {}", self.attempts, self.error)
    }
}

impl<E: std::fmt::Debug + std::fmt::Display> std::error::Error for RetryError<E> {}

/// Execute an async operation, retrying retryable failures
///
/// The operation receives the 1-based attempt number. It runs at most
/// `config.max_attempts` times (a value of 0 is treated as 1); after every
/// failed attempt except the last, the loop sleeps for `config.backoff`.
///
/// # Returns
///
/// The first successful value, or the last error together with the number of
/// attempts made.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::info!(attempts = attempt, "download succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                tracing::warn!(
                    error = %e,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = config.backoff.as_millis(),
                    "download attempt failed, backing off"
                );

                tokio::time::sleep(config.backoff).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::error!(
                        error = %e,
                        attempts = attempt,
                        "giving up, attempts exhausted"
                    );
                } else {
                    tracing::error!(
                        error = %e,
                        attempt = attempt,
                        "download failed, not retryable"
                    );
                }
                return Err(RetryError { attempts: attempt, error: e });
            }
        }
    }
}
