//! Trait boundary for the pipeline's external collaborators.
//!
//! spec.md §1 explicitly scopes repository discovery, binary/ELF
//! manipulation, and external tool invocation (`pahole`, `bpftool`,
//! `tar`) out of the core. This crate gives those collaborators a
//! concrete Rust shape — trait contracts with the inputs/outputs/failure
//! modes spec.md §6 describes — without implementing any of them for
//! real. [`mock`] provides the in-memory test doubles the pipeline and
//! producer crates exercise in their own test suites.

use async_trait::async_trait;
use btfhub_error::CapabilityError;
use btfhub_types::{Arch, Package};
use std::path::{Path, PathBuf};

/// Successful result of [`Extractor::extract_vmlinux_and_modules`].
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    /// Directory the archive was extracted into.
    pub extract_dir: PathBuf,
    /// Path to the extracted `vmlinux` image.
    pub vmlinux_path: PathBuf,
    /// Paths to extracted per-module debug files, if `include_modules`
    /// was requested.
    pub module_debug_paths: Vec<PathBuf>,
}

/// Downloads and unpacks a kernel debug package.
///
/// Fails with [`CapabilityError::KernelAlreadyHasBtf`] when the
/// extracted `vmlinux` already carries a `.BTF` ELF section (spec.md
/// §4.1); the pipeline translates that into the `.has_btf` sentinel.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract `vmlinux` (and, if `include_modules`, kernel module debug
    /// objects) from `archive` into `out_dir`.
    async fn extract_vmlinux_and_modules(
        &self,
        archive: &Path,
        out_dir: &Path,
        include_modules: bool,
    ) -> Result<ExtractOutcome, CapabilityError>;
}

/// Probes whether an ELF file already carries a `.BTF` section.
#[async_trait]
pub trait BtfSectionProbe: Send + Sync {
    /// `true` if `elf_path` has a `.BTF` section already.
    async fn has_btf_section(&self, elf_path: &Path) -> Result<bool, CapabilityError>;
}

/// Invokes `pahole` to generate a BTF blob from a debug object.
#[async_trait]
pub trait BtfGenerator: Send + Sync {
    /// Generate BTF for `debug_file`, optionally relative to
    /// `base_btf` (used when generating module BTF against the
    /// vmlinux BTF, per spec.md §4.3.3 step 4), writing the result to
    /// `out`.
    ///
    /// Always invoked with float generation on, inconsistent-proto skip
    /// on, optimized generation on, and detached-encoding on (spec.md
    /// §4.3.4) — these flags are contractual and implementations must
    /// not make them configurable per-call.
    async fn generate_btf(&self, debug_file: &Path, base_btf: Option<&Path>, out: &Path) -> Result<(), CapabilityError>;
}

/// Invokes `bpftool btf merge` to combine per-object BTF blobs.
#[async_trait]
pub trait Merger: Send + Sync {
    /// Merge every BTF blob in `src_dir` into a single `out` file.
    async fn merge_btf(&self, src_dir: &Path, out: &Path) -> Result<(), CapabilityError>;
}

/// Invokes `tar` with the fixed, deterministic option set (spec.md §6).
#[async_trait]
pub trait Compressor: Send + Sync {
    /// Produce an xz-compressed tarball of `src_dir` at `out`, with
    /// every member normalized to `mtime=0`, `mode=0o444`, `uid=gid=0`,
    /// in lexicographic order.
    async fn tarball_btf(&self, src_dir: &Path, out: &Path) -> Result<(), CapabilityError>;
}

/// The object store a finished bundle is optionally uploaded to.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `true` if `key` is already present in the store.
    async fn exists(&self, key: &str) -> Result<bool, CapabilityError>;

    /// Upload the file at `path` under `key`, waiting for
    /// read-after-write consistency (spec.md §5: up to 60s).
    async fn put(&self, key: &str, path: &Path) -> Result<(), CapabilityError>;
}

/// Options threaded through to a [`PackageSource`] listing call.
#[derive(Debug, Clone, Default)]
pub struct SourceOptions {
    /// Whether to include per-module debug objects in the resulting
    /// packages' download contract.
    pub include_modules: bool,
    /// Ubuntu-specific: also query Launchpad for additional kernels.
    pub launchpad: bool,
}

/// A polymorphic repository/package-index capability (spec.md §3).
///
/// Implementations are expected to handle paging and retry internally;
/// the core only ever sees the final, ordered list.
#[async_trait]
pub trait PackageSource: Send + Sync {
    /// List the packages available for `release`/`arch`.
    async fn list_packages(&self, release: &str, arch: Arch, options: &SourceOptions) -> Result<Vec<Package>, CapabilityError>;
}

/// In-memory test doubles for every trait in this crate.
///
/// Not used in production — the core never ships a production
/// implementation of these capabilities (spec.md §1 non-goals) — but
/// gives the pipeline, producer, and worker crates real code paths to
/// exercise in their own tests instead of hand-rolled per-test stubs.
pub mod mock {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;
    use tokio::fs;

    /// Extractor whose outcome (or `KernelAlreadyHasBtf` failure) for a
    /// given archive path is scripted ahead of time.
    #[derive(Default)]
    pub struct ScriptedExtractor {
        has_btf: BTreeSet<PathBuf>,
        module_counts: HashMap<PathBuf, usize>,
    }

    impl ScriptedExtractor {
        /// Create an extractor where every package extracts cleanly.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Mark `archive` as a kernel that already has BTF.
        #[must_use]
        pub fn with_has_btf(mut self, archive: impl Into<PathBuf>) -> Self {
            self.has_btf.insert(archive.into());
            self
        }

        /// Mark `archive` as producing `count` module debug files.
        #[must_use]
        pub fn with_modules(mut self, archive: impl Into<PathBuf>, count: usize) -> Self {
            self.module_counts.insert(archive.into(), count);
            self
        }
    }

    #[async_trait]
    impl Extractor for ScriptedExtractor {
        async fn extract_vmlinux_and_modules(
            &self,
            archive: &Path,
            out_dir: &Path,
            include_modules: bool,
        ) -> Result<ExtractOutcome, CapabilityError> {
            if self.has_btf.contains(archive) {
                return Err(CapabilityError::KernelAlreadyHasBtf);
            }
            fs::create_dir_all(out_dir)
                .await
                .map_err(|e| CapabilityError::Permanent(e.to_string()))?;
            let vmlinux_path = out_dir.join("vmlinux");
            fs::write(&vmlinux_path, b"vmlinux-debug-info")
                .await
                .map_err(|e| CapabilityError::Permanent(e.to_string()))?;

            let mut module_debug_paths = Vec::new();
            if include_modules {
                let count = self.module_counts.get(archive).copied().unwrap_or(0);
                for i in 0..count {
                    let path = out_dir.join(format!("module_{i}.ko.debug"));
                    fs::write(&path, b"module-debug-info")
                        .await
                        .map_err(|e| CapabilityError::Permanent(e.to_string()))?;
                    module_debug_paths.push(path);
                }
            }

            Ok(ExtractOutcome {
                extract_dir: out_dir.to_path_buf(),
                vmlinux_path,
                module_debug_paths,
            })
        }
    }

    /// Generates a trivial deterministic "BTF" blob: the source file's
    /// contents wrapped with a marker, so merge/compress have real bytes
    /// to work with in tests.
    pub struct NoopBtfGenerator;

    #[async_trait]
    impl BtfGenerator for NoopBtfGenerator {
        async fn generate_btf(&self, debug_file: &Path, _base_btf: Option<&Path>, out: &Path) -> Result<(), CapabilityError> {
            let data = fs::read(debug_file).await.map_err(|e| CapabilityError::Permanent(e.to_string()))?;
            fs::write(out, data).await.map_err(|e| CapabilityError::Permanent(e.to_string()))?;
            Ok(())
        }
    }

    /// Concatenates every file in `src_dir` (sorted by name) into `out`.
    pub struct ConcatMerger;

    #[async_trait]
    impl Merger for ConcatMerger {
        async fn merge_btf(&self, src_dir: &Path, out: &Path) -> Result<(), CapabilityError> {
            let mut entries = Vec::new();
            let mut rd = fs::read_dir(src_dir).await.map_err(|e| CapabilityError::Permanent(e.to_string()))?;
            while let Some(entry) = rd.next_entry().await.map_err(|e| CapabilityError::Permanent(e.to_string()))? {
                entries.push(entry.path());
            }
            entries.sort();
            let mut merged = Vec::new();
            for path in entries {
                merged.extend(fs::read(&path).await.map_err(|e| CapabilityError::Permanent(e.to_string()))?);
            }
            fs::write(out, merged).await.map_err(|e| CapabilityError::Permanent(e.to_string()))?;
            Ok(())
        }
    }

    /// Writes a fake "tarball" that is just the concatenation of
    /// `src_dir`'s sorted file list, good enough to assert on member
    /// counts and ordering in tests without a real tar/xz dependency.
    pub struct FakeCompressor;

    #[async_trait]
    impl Compressor for FakeCompressor {
        async fn tarball_btf(&self, src_dir: &Path, out: &Path) -> Result<(), CapabilityError> {
            let mut names = Vec::new();
            let mut rd = fs::read_dir(src_dir).await.map_err(|e| CapabilityError::Permanent(e.to_string()))?;
            while let Some(entry) = rd.next_entry().await.map_err(|e| CapabilityError::Permanent(e.to_string()))? {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
            names.sort();
            fs::write(out, names.join("\n")).await.map_err(|e| CapabilityError::Permanent(e.to_string()))?;
            Ok(())
        }
    }

    /// In-memory object store keyed by upload key.
    #[derive(Default)]
    pub struct InMemoryObjectStore {
        objects: Mutex<BTreeSet<String>>,
    }

    impl InMemoryObjectStore {
        /// An empty store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Pre-seed the store as already containing `key`.
        #[must_use]
        pub fn with_existing(self, key: impl Into<String>) -> Self {
            self.objects.lock().unwrap().insert(key.into());
            self
        }
    }

    #[async_trait]
    impl ObjectStore for InMemoryObjectStore {
        async fn exists(&self, key: &str) -> Result<bool, CapabilityError> {
            Ok(self.objects.lock().unwrap().contains(key))
        }

        async fn put(&self, key: &str, _path: &Path) -> Result<(), CapabilityError> {
            self.objects.lock().unwrap().insert(key.to_string());
            Ok(())
        }
    }

    /// Package source returning a fixed, pre-sorted list regardless of
    /// the `release`/`arch` it's asked about.
    pub struct StaticPackageSource {
        packages: Vec<Package>,
    }

    impl StaticPackageSource {
        /// Wrap a fixed package list.
        #[must_use]
        pub fn new(packages: Vec<Package>) -> Self {
            Self { packages }
        }
    }

    #[async_trait]
    impl PackageSource for StaticPackageSource {
        async fn list_packages(&self, _release: &str, _arch: Arch, _options: &SourceOptions) -> Result<Vec<Package>, CapabilityError> {
            Ok(self.packages.clone())
        }
    }
}
