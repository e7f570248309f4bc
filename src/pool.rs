//! Concurrent dispatch of harvest workers
//!
//! URLs are processed by at most `concurrency` workers at a time; outcomes are
//! yielded in completion order. Each URL runs in its own task so a panicking
//! worker turns into a [`HarvestError::Fault`] outcome instead of taking the
//! whole run down.

use crate::worker::{HarvestError, HarvestOutcome, HarvestWorker};
use futures::stream::{self, Stream, StreamExt};
use std::sync::Arc;

/// Process every URL, yielding exactly one outcome per URL as it completes
///
/// The stream is lazy: no work starts until it is polled, and at most
/// `concurrency` URLs (minimum 1) are in flight at any time. A failure of one
/// URL never affects the others.
pub fn run_all(
    worker: Arc<HarvestWorker>,
    urls: Vec<String>,
    concurrency: usize,
) -> impl Stream<Item = HarvestOutcome> {
    stream::iter(urls)
        .map(move |url| process_isolated(Arc::clone(&worker), url))
        .buffer_unordered(concurrency.max(1))
}

/// Process one URL in a dedicated task
pub async fn process_isolated(worker: Arc<HarvestWorker>, url: String) -> HarvestOutcome {
    let task_url = url.clone();
    match tokio::spawn(async move { worker.process(&task_url).await }).await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            tracing::error!(url = %url, error = %join_error, "harvest task panicked");
            HarvestOutcome::Failed {
                url,
                error: HarvestError::Fault(join_error.to_string()),
            }
        }
    }
}
