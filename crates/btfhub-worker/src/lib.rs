//! The fixed-size worker pool (spec.md §4.2, C2).
//!
//! Each worker drains two job feeds — `btf_feed` and `default_feed` —
//! until both are closed. When both feeds have a ready job, the BTF
//! feed is served first: a non-blocking try on `btf_feed`, falling back
//! to a biased multi-way wait over `{btf_feed, default_feed, cancel}`.
//! This inverts the natural FIFO ordering a single queue would give, so
//! CPU-bound downstream work (BTF generation, merge, compress, upload)
//! is never starved behind a backlog of new extracts.

use btfhub_error::BtfHubError;
use btfhub_job::{CancellationToken, FeedReceiver};
use tracing::{debug, info, warn};

/// How many workers to run when the caller doesn't pick a size:
/// `max(1, hardware_parallelism - 1)` (spec.md §4.2).
#[must_use]
pub fn default_pool_size() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).saturating_sub(1).max(1)
}

/// Spawn `size` worker tasks draining `btf_feed`/`default_feed`.
///
/// Returns the join handles; the caller awaits them (spec.md §4.7: the
/// driver waits for all workers after closing both feeds).
#[must_use]
pub fn spawn_pool(size: usize, btf_feed: FeedReceiver, default_feed: FeedReceiver, cancel: CancellationToken) -> Vec<tokio::task::JoinHandle<Result<(), BtfHubError>>> {
    (0..size)
        .map(|id| {
            let btf_feed = btf_feed.clone();
            let default_feed = default_feed.clone();
            let cancel = cancel.clone();
            tokio::spawn(run_worker(id, btf_feed, default_feed, cancel))
        })
        .collect()
}

/// Drain `btf_feed`/`default_feed` with BTF priority until both close or
/// cancellation fires.
pub async fn run_worker(id: usize, btf_feed: FeedReceiver, default_feed: FeedReceiver, cancel: CancellationToken) -> Result<(), BtfHubError> {
    info!(worker = id, "worker started");
    let mut btf_closed = false;
    let mut default_closed = false;

    loop {
        if btf_closed && default_closed {
            info!(worker = id, "both feeds closed, worker exiting");
            return Ok(());
        }

        // Non-blocking priority poll: if BTF work is ready right now, take
        // it before considering anything else.
        if !btf_closed {
            match btf_feed.try_recv() {
                Ok(job) => {
                    debug!(worker = id, kind = job.kind(), "dispatching (priority poll)");
                    job.execute(&cancel).await;
                    continue;
                }
                Err(async_channel::TryRecvError::Closed) => btf_closed = true,
                Err(async_channel::TryRecvError::Empty) => {}
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!(worker = id, "cancelled, worker exiting");
                return Err(BtfHubError::Cancelled);
            }
            res = btf_feed.recv(), if !btf_closed => {
                match res {
                    Ok(job) => {
                        debug!(worker = id, kind = job.kind(), "dispatching (btf feed)");
                        job.execute(&cancel).await;
                    }
                    Err(_) => btf_closed = true,
                }
            }
            res = default_feed.recv(), if !default_closed => {
                match res {
                    Ok(job) => {
                        debug!(worker = id, kind = job.kind(), "dispatching (default feed)");
                        job.execute(&cancel).await;
                    }
                    Err(_) => default_closed = true,
                }
            }
        }
    }
}
