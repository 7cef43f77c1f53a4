use crate::cancel::CancellationToken;
use crate::Job;
use btfhub_error::BtfHubError;
use tokio::sync::oneshot;

/// The sending half of a job feed. Cloneable so many producer tasks can
/// submit concurrently (spec.md §4.4: flavors and distro/release/arch
/// triples run as concurrent producers).
pub type Feed = async_channel::Sender<Job>;

/// The receiving half of a job feed. Cloneable so the fixed-size worker
/// pool (spec.md §4.2) can drain it from multiple tasks at once.
pub type FeedReceiver = async_channel::Receiver<Job>;

/// The receiving half of a job's one-shot reply channel.
pub type Reply<T> = oneshot::Receiver<Result<T, BtfHubError>>;

/// Submit `job` to `feed`, blocking until either it is delivered or
/// `cancel` fires (spec.md §4.1 "Helper contracts").
pub async fn submit(feed: &Feed, job: Job, cancel: &CancellationToken) -> Result<(), BtfHubError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(BtfHubError::Cancelled),
        res = feed.send(job) => res.map_err(|_| BtfHubError::Configuration("job feed closed before delivery".into())),
    }
}

/// Read a job's reply exactly once.
pub async fn wait<T: Send>(reply: Reply<T>) -> Result<T, BtfHubError> {
    match reply.await {
        Ok(result) => result,
        Err(_) => Err(BtfHubError::Configuration("reply channel dropped without a value".into())),
    }
}

/// Convenience composition of [`submit`] followed by [`wait`].
pub async fn submit_and_wait<T: Send>(feed: &Feed, job: Job, reply: Reply<T>, cancel: &CancellationToken) -> Result<T, BtfHubError> {
    submit(feed, job, cancel).await?;
    wait(reply).await
}
