//! The per-package job DAG (spec.md §4.3, C3).
//!
//! [`run_pipeline`] is the core algorithm: idempotency checks, a
//! scope-owned temp directory, then the Extract → GenBtf → Merge →
//! Compress → [Upload] → [Hash] sequence, submitting each step to the
//! worker pool's feeds and awaiting its reply.

use btfhub_capability::{BtfGenerator, Compressor, Extractor, Merger, ObjectStore};
use btfhub_error::BtfHubError;
use btfhub_job::{submit, submit_and_wait, wait, CancellationToken, CompressJob, ExtractJob, Feed, GenBtfJob, HashJob, Job, MergeJob, UploadJob};
use btfhub_types::{layout, Package};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// The external collaborators one pipeline invocation needs. `object_store`
/// is `None` when uploads are not configured (spec.md §6: optional).
#[derive(Clone)]
pub struct Capabilities {
    pub extractor: Arc<dyn Extractor>,
    pub btf_generator: Arc<dyn BtfGenerator>,
    pub merger: Arc<dyn Merger>,
    pub compressor: Arc<dyn Compressor>,
    pub object_store: Option<Arc<dyn ObjectStore>>,
}

/// Per-run options threaded into every pipeline invocation (spec.md §4.3.1).
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Re-run even if sentinels/bundle/object-store say this is done.
    pub force: bool,
    /// Stop after the idempotency prelude, performing no jobs.
    pub dry_run: bool,
    /// Whether to extract and process per-module debug objects too.
    pub include_modules: bool,
    /// Object-store key prefix; uploads happen only when this is `Some`.
    pub object_store_prefix: Option<String>,
    /// Root of the per-arch/distro/release hash-file tree; hashing
    /// happens only when this is `Some`.
    pub hash_root: Option<PathBuf>,
}

/// Run the full pipeline for one package. `work_dir` is the package's
/// `<distro>/<release>/<arch>/` directory (spec.md §3 WorkDir).
pub async fn run_pipeline(
    pkg: &Package,
    work_dir: &std::path::Path,
    opts: &PipelineOptions,
    caps: &Capabilities,
    btf_feed: &Feed,
    default_feed: &Feed,
    cancel: &CancellationToken,
) -> Result<(), BtfHubError> {
    if let Some(outcome) = idempotency_prelude(pkg, work_dir, opts, caps).await? {
        return outcome;
    }

    let tmp = tempfile::Builder::new()
        .prefix(&format!("btfhub-{}-", pkg.stem))
        .tempdir()
        .map_err(|e| BtfHubError::Permanent {
            package: pkg.to_string(),
            reason: format!("create temp dir: {e}"),
        })?;
    let extract_dir = tmp.path().join("extract");
    let btfgen_dir = tmp.path().join("btfgen");
    let btfmerge_dir = tmp.path().join("btfmerge");
    for dir in [&extract_dir, &btfgen_dir, &btfmerge_dir] {
        tokio::fs::create_dir_all(dir).await.map_err(|e| BtfHubError::Permanent {
            package: pkg.to_string(),
            reason: format!("create {}: {e}", dir.display()),
        })?;
    }

    run_job_dag(pkg, work_dir, opts, caps, btf_feed, default_feed, cancel, &extract_dir, &btfgen_dir, &btfmerge_dir).await
}

/// Returns `Some(result)` when the prelude decides the pipeline shouldn't
/// run at all (already has BTF, already done, or dry-run); `None` when
/// the caller should proceed to the job DAG.
async fn idempotency_prelude(pkg: &Package, work_dir: &std::path::Path, opts: &PipelineOptions, caps: &Capabilities) -> Result<Option<Result<(), BtfHubError>>, BtfHubError> {
    if btfhub_registry::has_btf(work_dir, &pkg.stem).await {
        return Ok(Some(Err(BtfHubError::KernelAlreadyHasBtf)));
    }

    if !opts.force {
        if btfhub_registry::has_failed(work_dir, &pkg.stem).await {
            info!(package = %pkg, "SKIP: previously failed");
            return Ok(Some(Ok(())));
        }
        if btfhub_registry::bundle_exists(work_dir, &pkg.stem).await {
            info!(package = %pkg, "SKIP: bundle already exists");
            return Ok(Some(Ok(())));
        }
        if let (Some(store), Some(prefix)) = (&caps.object_store, &opts.object_store_prefix) {
            let key = layout::object_store_key(prefix, &pkg.distro, &pkg.release, pkg.arch, &pkg.stem);
            match store.exists(&key).await {
                Ok(true) => {
                    info!(package = %pkg, %key, "SKIP: already present in object store");
                    return Ok(Some(Ok(())));
                }
                Ok(false) => {}
                Err(err) => {
                    return Ok(Some(Err(BtfHubError::Permanent {
                        package: pkg.to_string(),
                        reason: format!("object store exists check: {err}"),
                    })));
                }
            }
        }
    }

    if opts.dry_run {
        return Ok(Some(Ok(())));
    }

    Ok(None)
}

#[allow(clippy::too_many_arguments)]
async fn run_job_dag(
    pkg: &Package,
    work_dir: &std::path::Path,
    opts: &PipelineOptions,
    caps: &Capabilities,
    btf_feed: &Feed,
    default_feed: &Feed,
    cancel: &CancellationToken,
    extract_dir: &std::path::Path,
    btfgen_dir: &std::path::Path,
    btfmerge_dir: &std::path::Path,
) -> Result<(), BtfHubError> {
    let bundle_path = layout::bundle_path(work_dir, &pkg.stem);
    let archive = PathBuf::from(&pkg.source_ref);
    let (tx, rx) = oneshot::channel();
    let extract_job = Job::Extract(ExtractJob {
        archive,
        out_dir: extract_dir.to_path_buf(),
        include_modules: opts.include_modules,
        extractor: caps.extractor.clone(),
        label: pkg.to_string(),
        reply: Some(tx),
    });
    let outcome = match submit_and_wait(default_feed, extract_job, rx, cancel).await {
        Ok(o) => o,
        Err(BtfHubError::KernelAlreadyHasBtf) => {
            btfhub_registry::mark_has_btf(pkg, work_dir).await;
            return Err(BtfHubError::KernelAlreadyHasBtf);
        }
        Err(e) => return Err(finalize_failure(pkg, work_dir, &bundle_path, e).await),
    };

    let base_btf = btfgen_dir.join("vmlinux.btf");
    let (tx, rx) = oneshot::channel();
    let gen_vmlinux = Job::GenBtf(GenBtfJob {
        debug_file: outcome.vmlinux_path.clone(),
        base_btf: None,
        out: base_btf.clone(),
        generator: caps.btf_generator.clone(),
        label: pkg.to_string(),
        reply: Some(tx),
    });
    if let Err(e) = submit_and_wait::<()>(btf_feed, gen_vmlinux, rx, cancel).await {
        return Err(finalize_failure(pkg, work_dir, &bundle_path, e).await);
    }

    let mut module_outputs = Vec::with_capacity(outcome.module_debug_paths.len());
    let mut replies = Vec::with_capacity(outcome.module_debug_paths.len());
    for module_path in &outcome.module_debug_paths {
        let out = btfgen_dir.join(module_btf_filename(module_path));
        let (tx, rx) = oneshot::channel();
        let job = Job::GenBtf(GenBtfJob {
            debug_file: module_path.clone(),
            base_btf: Some(base_btf.clone()),
            out: out.clone(),
            generator: caps.btf_generator.clone(),
            label: pkg.to_string(),
            reply: Some(tx),
        });
        if let Err(e) = submit(btf_feed, job, cancel).await {
            return Err(finalize_failure(pkg, work_dir, &bundle_path, e).await);
        }
        module_outputs.push(out);
        replies.push(rx);
    }

    let mut first_err = None;
    for rx in replies {
        if let Err(e) = wait::<()>(rx).await {
            if first_err.is_none() {
                first_err = Some(e);
            }
        }
    }
    if let Some(e) = first_err {
        return Err(finalize_failure(pkg, work_dir, &bundle_path, e).await);
    }

    let merged_path = btfmerge_dir.join(format!("{}.btf", pkg.stem));
    if module_outputs.is_empty() {
        if let Err(e) = tokio::fs::rename(&base_btf, &merged_path).await {
            return Err(finalize_failure(
                pkg,
                work_dir,
                &bundle_path,
                BtfHubError::Permanent {
                    package: pkg.to_string(),
                    reason: format!("rename vmlinux BTF into place: {e}"),
                },
            )
            .await);
        }
    } else {
        let (tx, rx) = oneshot::channel();
        let merge_job = Job::Merge(MergeJob {
            src_dir: btfgen_dir.to_path_buf(),
            out: merged_path.clone(),
            merger: caps.merger.clone(),
            label: pkg.to_string(),
            reply: Some(tx),
        });
        if let Err(e) = submit_and_wait::<()>(btf_feed, merge_job, rx, cancel).await {
            return Err(finalize_failure(pkg, work_dir, &bundle_path, e).await);
        }
        for module_out in &module_outputs {
            let dest = btfmerge_dir.join(module_out.file_name().expect("module output has a file name"));
            if let Err(e) = tokio::fs::copy(module_out, &dest).await {
                return Err(finalize_failure(
                    pkg,
                    work_dir,
                    &bundle_path,
                    BtfHubError::Permanent {
                        package: pkg.to_string(),
                        reason: format!("stage module BTF into merge dir: {e}"),
                    },
                )
                .await);
            }
        }
    }

    let (tx, rx) = oneshot::channel();
    let compress_job = Job::Compress(CompressJob {
        src_dir: btfmerge_dir.to_path_buf(),
        out: bundle_path.clone(),
        compressor: caps.compressor.clone(),
        label: pkg.to_string(),
        reply: Some(tx),
    });
    if let Err(e) = submit_and_wait::<()>(btf_feed, compress_job, rx, cancel).await {
        return Err(finalize_failure(pkg, work_dir, &bundle_path, e).await);
    }

    if let (Some(store), Some(prefix)) = (&caps.object_store, &opts.object_store_prefix) {
        let key = layout::object_store_key(prefix, &pkg.distro, &pkg.release, pkg.arch, &pkg.stem);
        let (tx, rx) = oneshot::channel();
        let upload_job = Job::Upload(UploadJob {
            source_path: bundle_path.clone(),
            key,
            store: store.clone(),
            label: pkg.to_string(),
            reply: Some(tx),
        });
        if let Err(e) = submit_and_wait::<()>(btf_feed, upload_job, rx, cancel).await {
            return Err(finalize_failure(pkg, work_dir, &bundle_path, e).await);
        }
    }

    if let Some(hash_root) = &opts.hash_root {
        let dest_path = layout::hash_file_path(hash_root, pkg.arch, &pkg.distro, &pkg.release, &pkg.stem);
        let (tx, rx) = oneshot::channel();
        let hash_job = Job::Hash(HashJob {
            source_path: bundle_path.clone(),
            dest_path,
            label: pkg.to_string(),
            reply: Some(tx),
        });
        if let Err(e) = submit_and_wait::<()>(btf_feed, hash_job, rx, cancel).await {
            return Err(finalize_failure(pkg, work_dir, &bundle_path, e).await);
        }
    }

    Ok(())
}

/// Derive a module's BTF output filename from its debug-file name
/// (spec.md: one bundle member per module, "named after the module"),
/// not a positional index.
fn module_btf_filename(module_path: &std::path::Path) -> String {
    let file_name = module_path.file_name().and_then(|n| n.to_str()).unwrap_or("module");
    let stem = file_name.strip_suffix(".ko.debug").unwrap_or(file_name);
    format!("{stem}.btf")
}

/// Classify a terminal job error: permanent failures write `.failed`;
/// transient and cancellation errors do not (spec.md §9 Open Question
/// (b): historical variants disagree here, this workspace sides with
/// "only permanent errors write `.failed`"). A permanent failure also
/// removes `bundle_path` first when it exists, so a late failure
/// (Upload/Hash, after Compress already wrote the bundle) never leaves
/// `.btf.tar.xz` and `.failed` present together for the same stem
/// (spec.md invariant: the two are mutually exclusive).
async fn finalize_failure(pkg: &Package, work_dir: &std::path::Path, bundle_path: &std::path::Path, err: BtfHubError) -> BtfHubError {
    if err.is_permanent() {
        error!(package = %pkg, %err, "package pipeline failed permanently");
        match tokio::fs::remove_file(bundle_path).await {
            Ok(()) => warn!(package = %pkg, bundle = %bundle_path.display(), "removed bundle produced before a later step failed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(package = %pkg, bundle = %bundle_path.display(), %e, "failed to remove bundle after a later step failed"),
        }
        btfhub_registry::mark_failed(pkg, work_dir).await;
        return err;
    }

    match &err {
        BtfHubError::Transient(_) => {
            warn!(package = %pkg, %err, "package pipeline failed transiently, not marking .failed");
        }
        BtfHubError::Cancelled => {
            debug!(package = %pkg, "package pipeline cancelled");
        }
        BtfHubError::Configuration(_) => {
            error!(package = %pkg, %err, "configuration error");
        }
        BtfHubError::KernelAlreadyHasBtf => {}
        BtfHubError::Permanent { .. } => unreachable!("handled by the is_permanent() branch above"),
    }
    err
}
