//! The artifact registry (spec.md §4.5, C5).
//!
//! Pure filesystem predicates and writers over the sentinel paths from
//! [`btfhub_types::layout`]. Writes are best-effort: a failed write is
//! logged and swallowed rather than propagated, since a missing sentinel
//! only costs redundant work on the next run, never correctness.

use btfhub_types::layout::{bundle_path, failed_sentinel_path, has_btf_sentinel_path};
use btfhub_types::Package;
use std::path::Path;
use tracing::warn;

/// `true` if `<stem>.failed` exists in `work_dir`.
pub async fn has_failed(work_dir: &Path, stem: &str) -> bool {
    tokio::fs::try_exists(failed_sentinel_path(work_dir, stem)).await.unwrap_or(false)
}

/// `true` if `<stem>.has_btf` exists in `work_dir`.
pub async fn has_btf(work_dir: &Path, stem: &str) -> bool {
    tokio::fs::try_exists(has_btf_sentinel_path(work_dir, stem)).await.unwrap_or(false)
}

/// `true` if `<stem>.btf.tar.xz` exists in `work_dir`.
pub async fn bundle_exists(work_dir: &Path, stem: &str) -> bool {
    tokio::fs::try_exists(bundle_path(work_dir, stem)).await.unwrap_or(false)
}

/// Write the `.failed` sentinel for `pkg` in `work_dir`. Best-effort.
pub async fn mark_failed(pkg: &Package, work_dir: &Path) {
    let path = failed_sentinel_path(work_dir, &pkg.stem);
    if let Err(err) = write_sentinel(&path).await {
        warn!(package = %pkg, path = %path.display(), %err, "failed to write .failed sentinel");
    }
}

/// Write the `.has_btf` sentinel for `pkg` in `work_dir`. Best-effort.
pub async fn mark_has_btf(pkg: &Package, work_dir: &Path) {
    let path = has_btf_sentinel_path(work_dir, &pkg.stem);
    if let Err(err) = write_sentinel(&path).await {
        warn!(package = %pkg, path = %path.display(), %err, "failed to write .has_btf sentinel");
    }
}

async fn write_sentinel(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, b"").await
}
