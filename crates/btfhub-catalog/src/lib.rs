//! The catalog merger (spec.md §4.6, C6).
//!
//! A separate entry point from the main pipeline: walks a tree of
//! per-package hash files and reconciles them into the JSON catalog,
//! refusing to silently overwrite a conflicting hash.

use btfhub_error::BtfHubError;
use btfhub_job::CancellationToken;
use btfhub_types::{Arch, Catalog, CatalogEntry};
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Reconcile `hash_dir`'s hash-file tree into the catalog at
/// `catalog_json_path`, writing the result back atomically.
pub async fn update_catalog(hash_dir: &Path, catalog_json_path: &Path, cancel: &CancellationToken) -> Result<(), BtfHubError> {
    if !tokio::fs::try_exists(hash_dir).await.unwrap_or(false) {
        info!(hash_dir = %hash_dir.display(), "no hash directory present, nothing to update");
        return Ok(());
    }

    let mut catalog = match tokio::fs::read_to_string(catalog_json_path).await {
        Ok(data) => Catalog::from_json(&data).map_err(|e| BtfHubError::Configuration(format!("parse catalog json: {e}")))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Catalog::new(),
        Err(e) => return Err(BtfHubError::Configuration(format!("read catalog json: {e}"))),
    };

    for entry in WalkDir::new(hash_dir) {
        if cancel.is_cancelled() {
            return Err(BtfHubError::Cancelled);
        }
        let entry = entry.map_err(|e| BtfHubError::Permanent {
            package: hash_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry.path().strip_prefix(hash_dir).expect("walkdir entries are rooted under hash_dir");
        let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
        if parts.len() != 4 {
            debug!(path = %rel.display(), "ignoring hash file at unexpected depth");
            continue;
        }
        let (arch_str, distro, release, version) = (&parts[0], &parts[1], &parts[2], &parts[3]);
        let Some(arch) = Arch::parse(arch_str) else {
            debug!(path = %rel.display(), "ignoring hash file under unrecognized architecture");
            continue;
        };

        let contents = tokio::fs::read_to_string(entry.path()).await.map_err(|e| BtfHubError::Permanent {
            package: entry.path().display().to_string(),
            reason: e.to_string(),
        })?;
        if contents.len() != 64 {
            debug!(path = %rel.display(), len = contents.len(), "ignoring hash file with unexpected length");
            continue;
        }
        let Ok(catalog_entry) = CatalogEntry::new(contents) else {
            debug!(path = %rel.display(), "ignoring hash file with malformed hex");
            continue;
        };

        catalog
            .insert(arch, distro, release, version, catalog_entry)
            .map_err(|conflict| BtfHubError::Configuration(conflict.to_string()))?;
    }

    let json = catalog.to_json_pretty().map_err(|e| BtfHubError::Configuration(format!("serialize catalog: {e}")))?;
    write_atomically(catalog_json_path, &json)
        .await
        .map_err(|e| BtfHubError::Configuration(format!("write catalog json: {e}")))
}

async fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&tmp_path, contents).await?;
    tokio::fs::rename(&tmp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const H1: &str = "aaaaaaaabbbbbbbbccccccccddddddddeeeeeeeeffffffff0000000011111111";
    const H2: &str = "aaaaaaaabbbbbbbbccccccccddddddddeeeeeeeeffffffff1111111122222222";

    async fn write_hash(hash_dir: &Path, arch: &str, distro: &str, release: &str, version: &str, hash: &str) {
        let path = hash_dir.join(arch).join(distro).join(release).join(version);
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, hash).await.unwrap();
    }

    #[tokio::test]
    async fn missing_hash_dir_is_a_fast_no_op() {
        let dir = tempdir().unwrap();
        let catalog_json = dir.path().join("catalog.json");
        let result = update_catalog(&dir.path().join("does-not-exist"), &catalog_json, &CancellationToken::new()).await;
        assert!(result.is_ok());
        assert!(!catalog_json.exists());
    }

    #[tokio::test]
    async fn fresh_hash_file_is_added_to_a_missing_catalog() {
        let dir = tempdir().unwrap();
        let hash_dir = dir.path().join("hashes");
        write_hash(&hash_dir, "x86_64", "amzn", "2", "4.14.355-276.639.amzn2.x86_64", H1).await;
        let catalog_json = dir.path().join("catalog.json");

        update_catalog(&hash_dir, &catalog_json, &CancellationToken::new()).await.unwrap();

        let catalog = Catalog::from_json(&tokio::fs::read_to_string(&catalog_json).await.unwrap()).unwrap();
        assert_eq!(catalog.get(Arch::X86_64, "amzn", "2", "4.14.355-276.639.amzn2.x86_64").unwrap().sha256, H1);
    }

    #[tokio::test]
    async fn conflicting_hash_fails_and_leaves_catalog_untouched() {
        let dir = tempdir().unwrap();
        let hash_dir = dir.path().join("hashes");
        write_hash(&hash_dir, "x86_64", "amzn", "2", "4.14.355-276.639.amzn2.x86_64", H2).await;
        let catalog_json = dir.path().join("catalog.json");

        let mut pre_existing = Catalog::new();
        pre_existing.insert(Arch::X86_64, "amzn", "2", "4.14.355-276.639.amzn2.x86_64", CatalogEntry::new(H1).unwrap()).unwrap();
        let pre_json = pre_existing.to_json_pretty().unwrap();
        tokio::fs::write(&catalog_json, &pre_json).await.unwrap();

        let result = update_catalog(&hash_dir, &catalog_json, &CancellationToken::new()).await;
        assert!(matches!(result, Err(BtfHubError::Configuration(_))));
        assert_eq!(tokio::fs::read_to_string(&catalog_json).await.unwrap(), pre_json, "catalog must be byte-identical to pre-state on conflict");
    }

    #[tokio::test]
    async fn running_twice_with_no_changes_is_byte_identical() {
        let dir = tempdir().unwrap();
        let hash_dir = dir.path().join("hashes");
        write_hash(&hash_dir, "x86_64", "amzn", "2", "4.14.355-276.639.amzn2.x86_64", H1).await;
        write_hash(&hash_dir, "arm64", "ubuntu", "focal", "5.4.0-1042-aws", H2).await;
        let catalog_json = dir.path().join("catalog.json");

        update_catalog(&hash_dir, &catalog_json, &CancellationToken::new()).await.unwrap();
        let first = tokio::fs::read_to_string(&catalog_json).await.unwrap();

        update_catalog(&hash_dir, &catalog_json, &CancellationToken::new()).await.unwrap();
        let second = tokio::fs::read_to_string(&catalog_json).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn malformed_files_are_silently_ignored() {
        let dir = tempdir().unwrap();
        let hash_dir = dir.path().join("hashes");
        write_hash(&hash_dir, "x86_64", "amzn", "2", "short", "abc").await;
        write_hash(&hash_dir, "ppc64le", "amzn", "2", "irrelevant", H1).await;
        tokio::fs::write(hash_dir.join(".gitignore"), b"*").await.unwrap();
        let catalog_json = dir.path().join("catalog.json");

        update_catalog(&hash_dir, &catalog_json, &CancellationToken::new()).await.unwrap();
        let catalog = Catalog::from_json(&tokio::fs::read_to_string(&catalog_json).await.unwrap()).unwrap();
        assert!(catalog.x86_64.is_empty());
    }

    #[tokio::test]
    async fn cancellation_is_surfaced_immediately() {
        let dir = tempdir().unwrap();
        let hash_dir = dir.path().join("hashes");
        write_hash(&hash_dir, "x86_64", "amzn", "2", "v1", H1).await;
        let catalog_json = dir.path().join("catalog.json");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = update_catalog(&hash_dir, &catalog_json, &cancel).await;
        assert!(matches!(result, Err(BtfHubError::Cancelled)));
    }
}
