use crate::cancel::CancellationToken;
use crate::deliver;
use btfhub_capability::{BtfGenerator, Compressor, ExtractOutcome, Extractor, Merger, ObjectStore};
use btfhub_error::BtfHubError;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::oneshot;
use tracing::debug;

fn with_label(err: BtfHubError, label: &str) -> BtfHubError {
    match err {
        BtfHubError::Permanent { reason, .. } => BtfHubError::Permanent {
            package: label.to_string(),
            reason,
        },
        other => other,
    }
}

/// Download and unpack a kernel debug package (spec.md §4.3.3 step 1).
pub struct ExtractJob {
    pub archive: PathBuf,
    pub out_dir: PathBuf,
    pub include_modules: bool,
    pub extractor: Arc<dyn Extractor>,
    pub label: String,
    pub reply: Option<oneshot::Sender<Result<ExtractOutcome, BtfHubError>>>,
}

impl ExtractJob {
    pub(crate) async fn execute(self, cancel: &CancellationToken) {
        debug!(label = %self.label, "extracting vmlinux and modules");
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BtfHubError::Cancelled),
            res = self.extractor.extract_vmlinux_and_modules(&self.archive, &self.out_dir, self.include_modules) => {
                res.map_err(BtfHubError::from).map_err(|e| with_label(e, &self.label))
            }
        };
        deliver(self.reply, result);
    }
}

/// Generate a BTF blob for one debug object (spec.md §4.3.3 steps 3-4).
pub struct GenBtfJob {
    pub debug_file: PathBuf,
    pub base_btf: Option<PathBuf>,
    pub out: PathBuf,
    pub generator: Arc<dyn BtfGenerator>,
    pub label: String,
    pub reply: Option<oneshot::Sender<Result<(), BtfHubError>>>,
}

impl GenBtfJob {
    pub(crate) async fn execute(self, cancel: &CancellationToken) {
        debug!(label = %self.label, debug_file = %self.debug_file.display(), "generating BTF");
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BtfHubError::Cancelled),
            res = self.generator.generate_btf(&self.debug_file, self.base_btf.as_deref(), &self.out) => {
                res.map_err(BtfHubError::from).map_err(|e| with_label(e, &self.label))
            }
        };
        if result.is_err() {
            let _ = fs::remove_file(&self.out).await;
        }
        deliver(self.reply, result);
    }
}

/// Merge per-object BTF blobs (spec.md §4.3.3 step 5).
pub struct MergeJob {
    pub src_dir: PathBuf,
    pub out: PathBuf,
    pub merger: Arc<dyn Merger>,
    pub label: String,
    pub reply: Option<oneshot::Sender<Result<(), BtfHubError>>>,
}

impl MergeJob {
    pub(crate) async fn execute(self, cancel: &CancellationToken) {
        debug!(label = %self.label, "merging BTF");
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BtfHubError::Cancelled),
            res = self.merger.merge_btf(&self.src_dir, &self.out) => {
                res.map_err(BtfHubError::from).map_err(|e| with_label(e, &self.label))
            }
        };
        deliver(self.reply, result);
    }
}

/// Compress the merged BTF tree into the final bundle (spec.md §4.3.3 step 6).
pub struct CompressJob {
    pub src_dir: PathBuf,
    pub out: PathBuf,
    pub compressor: Arc<dyn Compressor>,
    pub label: String,
    pub reply: Option<oneshot::Sender<Result<(), BtfHubError>>>,
}

impl CompressJob {
    pub(crate) async fn execute(self, cancel: &CancellationToken) {
        debug!(label = %self.label, out = %self.out.display(), "compressing bundle");
        let _ = fs::remove_file(&self.out).await;
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BtfHubError::Cancelled),
            res = self.compressor.tarball_btf(&self.src_dir, &self.out) => {
                res.map_err(BtfHubError::from).map_err(|e| with_label(e, &self.label))
            }
        };
        if result.is_err() {
            let _ = fs::remove_file(&self.out).await;
        }
        deliver(self.reply, result);
    }
}

/// Hash the finished bundle and write the hash file (spec.md §4.3.3 step 8).
///
/// Unlike the other job kinds this one has no external capability —
/// SHA-256 is computed in-process, matching
/// `original_source/pkg/job/hash.go`.
pub struct HashJob {
    pub source_path: PathBuf,
    pub dest_path: PathBuf,
    pub label: String,
    pub reply: Option<oneshot::Sender<Result<(), BtfHubError>>>,
}

impl HashJob {
    pub(crate) async fn execute(self, cancel: &CancellationToken) {
        debug!(label = %self.label, dest = %self.dest_path.display(), "hashing bundle");
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BtfHubError::Cancelled),
            res = Self::hash_and_write(&self.source_path, &self.dest_path) => {
                res.map_err(|e| BtfHubError::Permanent { package: self.label.clone(), reason: e })
            }
        };
        deliver(self.reply, result);
    }

    /// Compute the SHA-256 of `source_path` and reconcile it against
    /// whatever is already at `dest_path` (spec.md §4.3.3 step 8): an
    /// identical existing hash is a no-op, a differing one is an error,
    /// and a missing one is written fresh.
    async fn hash_and_write(source_path: &std::path::Path, dest_path: &std::path::Path) -> Result<(), String> {
        let mut file = fs::File::open(source_path).await.map_err(|e| e.to_string())?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await.map_err(|e| e.to_string())?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let digest = hasher.finalize();
        let hex = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();

        match fs::read_to_string(dest_path).await {
            Ok(existing) if existing.trim() == hex => return Ok(()),
            Ok(existing) => {
                return Err(format!("hash mismatch at {}: existing {}, computed {hex}", dest_path.display(), existing.trim()));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.to_string()),
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
        }
        fs::write(dest_path, hex).await.map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Upload the finished bundle to the object store (spec.md §4.3.3 step 7).
pub struct UploadJob {
    pub source_path: PathBuf,
    pub key: String,
    pub store: Arc<dyn ObjectStore>,
    pub label: String,
    pub reply: Option<oneshot::Sender<Result<(), BtfHubError>>>,
}

impl UploadJob {
    pub(crate) async fn execute(self, cancel: &CancellationToken) {
        debug!(label = %self.label, key = %self.key, "uploading bundle");
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BtfHubError::Cancelled),
            res = self.store.put(&self.key, &self.source_path) => {
                res.map_err(BtfHubError::from).map_err(|e| with_label(e, &self.label))
            }
        };
        deliver(self.reply, result);
    }
}
