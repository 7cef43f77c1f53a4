//! The top-level driver (spec.md §4.7, C7).
//!
//! Creates the two job feeds, spawns the worker pool (C2) and one
//! producer task per `(distro, release, arch)` triple (C4), waits for
//! producers, closes the Default feed, then waits for workers to drain
//! and exit. A `Ctrl-C` fans the shared [`CancellationToken`] out to
//! every task in flight.

use btfhub_error::BtfHubError;
use btfhub_job::CancellationToken;
use btfhub_pipeline::{Capabilities, PipelineOptions};
use btfhub_producer::{run_producer, ProducerOptions, Triple};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Options spanning the whole run (shared by every producer task).
#[derive(Debug, Clone, Default)]
pub struct DriverOptions {
    /// Worker pool size; `None` defers to [`btfhub_worker::default_pool_size`].
    pub pool_size: Option<usize>,
    pub producer: ProducerOptions,
    pub pipeline: PipelineOptions,
}

/// Run the full matrix: spawn workers, spawn one producer per triple,
/// wait for producers, close the Default feed, wait for workers.
///
/// Returns the first error encountered across producers and workers, if
/// any, after every task has been given a chance to finish.
pub async fn run(
    triples: Vec<Triple>,
    archive_root: &Path,
    package_source: Arc<dyn btfhub_capability::PackageSource>,
    caps: Capabilities,
    options: DriverOptions,
    cancel: CancellationToken,
) -> Result<(), BtfHubError> {
    let pool_size = options.pool_size.unwrap_or_else(btfhub_worker::default_pool_size);
    let (btf_tx, btf_rx) = async_channel::unbounded();
    let (default_tx, default_rx) = async_channel::unbounded();

    info!(pool_size, triples = triples.len(), "starting driver");
    let workers = btfhub_worker::spawn_pool(pool_size, btf_rx, default_rx, cancel.clone());

    let producer_handles: Vec<_> = triples
        .into_iter()
        .map(|triple| {
            let package_source = Arc::clone(&package_source);
            let archive_root = archive_root.to_path_buf();
            let caps = caps.clone();
            let producer_opts = options.producer.clone();
            let pipeline_opts = options.pipeline.clone();
            let btf_tx = btf_tx.clone();
            let default_tx = default_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let result = run_producer(&triple, package_source.as_ref(), &archive_root, &producer_opts, &pipeline_opts, &caps, &btf_tx, &default_tx, &cancel).await;
                (triple, result)
            })
        })
        .collect();
    drop(btf_tx);
    drop(default_tx);

    let mut first_err = None;
    for handle in producer_handles {
        match handle.await {
            Ok((_triple, Ok(()))) => {}
            Ok((triple, Err(e))) if e.is_fatal() => {
                error!(distro = %triple.distro, release = %triple.release, arch = %triple.arch, %e, "producer failed fatally");
                first_err.get_or_insert(e);
            }
            Ok((triple, Err(e))) => {
                warn!(distro = %triple.distro, release = %triple.release, arch = %triple.arch, %e, "producer failed");
                first_err.get_or_insert(e);
            }
            Err(join_err) => {
                error!(%join_err, "producer task panicked");
                first_err.get_or_insert(BtfHubError::Configuration(format!("producer task panicked: {join_err}")));
            }
        }
    }

    for w in workers {
        match w.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_control_signal() => {
                debug!(%e, "worker exited via a control signal, not treated as a run failure");
            }
            Ok(Err(e)) if e.is_fatal() => {
                error!(%e, "worker exited with a fatal error");
                first_err.get_or_insert(e);
            }
            Ok(Err(e)) => {
                warn!(%e, "worker exited with an error");
                first_err.get_or_insert(e);
            }
            Err(join_err) => {
                error!(%join_err, "worker task panicked");
                first_err.get_or_insert(BtfHubError::Configuration(format!("worker task panicked: {join_err}")));
            }
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Resolve `<cwd>/archive` (spec.md §6 filesystem layout).
pub fn archive_root(cwd: &Path) -> PathBuf {
    cwd.join("archive")
}

/// Spawn a task that cancels `cancel` on the process's interrupt signal
/// (spec.md §4.7: "Signal (interrupt) triggers cancellation that fans
/// out via the shared cancellation token").
pub fn install_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            cancel.cancel();
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use btfhub_capability::mock::{ConcatMerger, FakeCompressor, NoopBtfGenerator, ScriptedExtractor, StaticPackageSource};
    use btfhub_types::{layout, Arch, KernelVersion, Package};
    use tempfile::tempdir;

    fn pkg(stem: &str, arch: Arch) -> Package {
        Package {
            name: format!("linux-image-{stem}"),
            stem: stem.into(),
            arch,
            distro: "ubuntu".into(),
            release: "focal".into(),
            version: KernelVersion::parse(stem),
            flavor: Some("generic".into()),
            source_ref: format!("/pkgs/{stem}"),
        }
    }

    fn caps() -> Capabilities {
        Capabilities {
            extractor: Arc::new(ScriptedExtractor::new()),
            btf_generator: Arc::new(NoopBtfGenerator),
            merger: Arc::new(ConcatMerger),
            compressor: Arc::new(FakeCompressor),
            object_store: None,
        }
    }

    #[tokio::test]
    async fn runs_every_triple_to_completion() {
        let root = tempdir().unwrap();
        let triples = vec![
            Triple {
                distro: "ubuntu".into(),
                release: "focal".into(),
                arch: Arch::X86_64,
            },
            Triple {
                distro: "ubuntu".into(),
                release: "focal".into(),
                arch: Arch::Arm64,
            },
        ];
        let source: Arc<dyn btfhub_capability::PackageSource> = Arc::new(StaticPackageSource::new(vec![pkg("5.4.0-1042-aws", Arch::X86_64), pkg("5.4.0-1042-aws", Arch::Arm64)]));

        let result = run(triples, root.path(), source, caps(), DriverOptions::default(), CancellationToken::new()).await;
        assert!(result.is_ok(), "{result:?}");

        let wd_x86 = layout::work_dir(root.path(), "ubuntu", "focal", Arch::X86_64);
        assert!(layout::bundle_path(&wd_x86, "5.4.0-1042-aws").exists());
        let wd_arm = layout::work_dir(root.path(), "ubuntu", "focal", Arch::Arm64);
        assert!(layout::bundle_path(&wd_arm, "5.4.0-1042-aws").exists());
    }

    #[tokio::test]
    async fn empty_matrix_completes_immediately() {
        let root = tempdir().unwrap();
        let source: Arc<dyn btfhub_capability::PackageSource> = Arc::new(StaticPackageSource::new(vec![]));
        let result = run(vec![], root.path(), source, caps(), DriverOptions::default(), CancellationToken::new()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn cancellation_before_run_yields_ok_with_no_bundles() {
        let root = tempdir().unwrap();
        let triple = Triple {
            distro: "ubuntu".into(),
            release: "focal".into(),
            arch: Arch::X86_64,
        };
        let source: Arc<dyn btfhub_capability::PackageSource> = Arc::new(StaticPackageSource::new(vec![pkg("5.4.0-1042-aws", Arch::X86_64)]));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = run(vec![triple], root.path(), source, caps(), DriverOptions::default(), cancel).await;
        assert!(result.is_ok());
        let wd = layout::work_dir(root.path(), "ubuntu", "focal", Arch::X86_64);
        assert!(!layout::bundle_path(&wd, "5.4.0-1042-aws").exists());
    }
}
