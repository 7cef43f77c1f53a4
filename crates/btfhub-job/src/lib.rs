//! The job tagged union and one-shot reply protocol (spec.md §4.1, C1).
//!
//! Each job variant carries its inputs, its output path, and a
//! single-use [`tokio::sync::oneshot`] reply channel. A job is created,
//! submitted to one of the worker pool's two feeds, executed exactly
//! once by a worker, then dropped.

mod cancel;
mod kinds;
mod reply;

pub use cancel::CancellationToken;
pub use kinds::{CompressJob, ExtractJob, GenBtfJob, HashJob, MergeJob, UploadJob};
pub use reply::{submit, submit_and_wait, wait, Feed, FeedReceiver, Reply};

use btfhub_error::BtfHubError;
use tracing::error;

/// The tagged union of job kinds the worker pool executes (spec.md §3, §4.1).
pub enum Job {
    /// Download and unpack a kernel debug package.
    Extract(ExtractJob),
    /// Generate a BTF blob from one debug object (vmlinux or a module).
    GenBtf(GenBtfJob),
    /// Merge per-object BTF blobs into one.
    Merge(MergeJob),
    /// Compress the merged BTF tree into the final bundle.
    Compress(CompressJob),
    /// Hash the finished bundle and write the hash file.
    Hash(HashJob),
    /// Upload the finished bundle to the object store.
    Upload(UploadJob),
}

impl Job {
    /// Run this job to completion, delivering exactly one value into its
    /// reply channel if it has one; logs and drops the result if it
    /// doesn't (spec.md §4.1 invariant).
    pub async fn execute(self, cancel: &CancellationToken) {
        match self {
            Job::Extract(j) => j.execute(cancel).await,
            Job::GenBtf(j) => j.execute(cancel).await,
            Job::Merge(j) => j.execute(cancel).await,
            Job::Compress(j) => j.execute(cancel).await,
            Job::Hash(j) => j.execute(cancel).await,
            Job::Upload(j) => j.execute(cancel).await,
        }
    }

    /// Human-readable tag for logging (e.g. `"extract"`, `"gen_btf"`).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Job::Extract(_) => "extract",
            Job::GenBtf(_) => "gen_btf",
            Job::Merge(_) => "merge",
            Job::Compress(_) => "compress",
            Job::Hash(_) => "hash",
            Job::Upload(_) => "upload",
        }
    }
}

/// Deliver `result` into an optional reply sink, logging-and-dropping
/// when there is none (spec.md §4.1: "a job with a nil reply-sink logs
/// errors and drops them").
pub(crate) fn deliver<T>(reply: Option<tokio::sync::oneshot::Sender<Result<T, BtfHubError>>>, result: Result<T, BtfHubError>)
where
    T: Send,
{
    match reply {
        Some(tx) => {
            let _ = tx.send(result);
        }
        None => {
            if let Err(err) = result {
                error!(%err, "job failed with no reply sink attached");
            }
        }
    }
}
