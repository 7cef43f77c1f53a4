//! Typed CLI flags and matrix resolution (spec.md §6, `SPEC_FULL.md` §1).
//!
//! [`Flags`] mirrors every flag `original_source/cmd/btfhub/commands/args.go`
//! recognizes; [`resolve_matrix`] reimplements that file's `processArgs`
//! against [`btfhub_distro`]'s static tables instead of a live registry.

use clap::{Parser, Subcommand};
use regex::Regex;
use std::path::PathBuf;

/// Top-level CLI, shared by every subcommand (spec.md §6: "all read the
/// same flag set").
#[derive(Parser, Debug)]
#[command(name = "btfhub", version, about = "Harvest kernel debug packages into reproducible BTF bundles")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub flags: Flags,
}

/// The four subcommands spec.md §6 defines. `Run` is the default when no
/// subcommand is given.
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Verify every archived bundle's tar members are mtime=0, mode=0444, uid=gid=0.
    Check,
    /// Upload any local bundle missing from the object store.
    Upload,
    /// Reconcile the hash-file tree into the JSON catalog.
    CatalogUpdate,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct Flags {
    /// Distribution(s) to update, space-separated (e.g. `"ubuntu debian"`).
    #[arg(long = "distro", short = 'd')]
    pub distro: Option<String>,

    /// Release(s) to update, space-separated; requires `--distro`.
    #[arg(long = "release", short = 'r')]
    pub release: Option<String>,

    /// Architecture(s) to update, space-separated (`x86_64`, `arm64`).
    #[arg(long = "arch", short = 'a')]
    pub arch: Option<String>,

    /// Regex filter over kernel version stems.
    #[arg(long = "query", short = 'q')]
    pub query: Option<String>,

    /// Worker pool size; 0 or unset defaults to `available_parallelism - 1`.
    #[arg(long = "workers", short = 'j')]
    pub workers: Option<usize>,

    /// Force regeneration regardless of existing sentinel files.
    #[arg(short = 'f')]
    pub force: bool,

    /// Generate BTF for kernel modules in addition to the base kernel.
    #[arg(long = "kmod", default_value_t = true)]
    pub kmod: bool,

    /// Process kernels in ascending version order, skipping the remainder
    /// of a flavor once BTF is detected.
    #[arg(long = "ordered", default_value_t = true)]
    pub ordered: bool,

    /// Do not make changes.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Query Ubuntu Launchpad for additional kernels.
    #[arg(long = "launchpad")]
    pub launchpad: bool,

    /// S3 bucket new bundles are uploaded to.
    #[arg(long = "s3-bucket")]
    pub s3_bucket: Option<String>,

    /// Key prefix used when uploading bundles.
    #[arg(long = "s3-prefix")]
    pub s3_prefix: Option<String>,

    /// Root directory for per-package SHA-256 hash files.
    #[arg(long = "hash-dir")]
    pub hash_dir: Option<PathBuf>,

    /// Path to the JSON catalog file.
    #[arg(long = "catalog-json")]
    pub catalog_json: Option<PathBuf>,

    /// Widen logging to debug level.
    #[arg(long = "debug")]
    pub debug: bool,
}

/// Errors raised while resolving [`Flags`] into a concrete run matrix.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid distribution {0}")]
    InvalidDistro(String),
    #[error("invalid release {release} for distribution {distro}")]
    InvalidRelease { distro: String, release: String },
    #[error("invalid architecture {0}")]
    InvalidArch(String),
    #[error("invalid query regex: {0}")]
    InvalidQuery(#[from] regex::Error),
}

/// One distro's resolved set of releases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixEntry {
    pub distro: String,
    pub releases: Vec<String>,
}

/// The fully resolved run matrix: which distro/release pairs and which
/// architectures this invocation should cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMatrix {
    pub entries: Vec<MatrixEntry>,
    pub archs: Vec<btfhub_types::Arch>,
}

fn split_flag(value: &str) -> Vec<&str> {
    value.split_whitespace().collect()
}

/// Resolve `--distro`/`--release`/`--arch` into a concrete matrix,
/// following `processArgs` in `original_source/cmd/btfhub/commands/misc.go`:
/// an omitted `--distro` falls back to [`btfhub_distro::DEFAULT_DISTROS`]
/// with each distro's default releases; an explicit `--distro` requires
/// every named distro (and, if given, every named release) to be known.
pub fn resolve_matrix(flags: &Flags) -> Result<ResolvedMatrix, ConfigError> {
    let entries = match &flags.distro {
        Some(distro_arg) => {
            let mut entries = Vec::new();
            for distro in split_flag(distro_arg) {
                if !btfhub_distro::is_known_distro(distro) {
                    return Err(ConfigError::InvalidDistro(distro.to_string()));
                }
                let releases = match &flags.release {
                    Some(release_arg) => {
                        let known = btfhub_distro::releases_for(distro).expect("checked known above");
                        let mut releases = Vec::new();
                        for release in split_flag(release_arg) {
                            if !known.contains(&release) {
                                return Err(ConfigError::InvalidRelease {
                                    distro: distro.to_string(),
                                    release: release.to_string(),
                                });
                            }
                            releases.push(release.to_string());
                        }
                        releases
                    }
                    None => btfhub_distro::default_releases_for(distro)
                        .expect("checked known above")
                        .iter()
                        .map(|r| (*r).to_string())
                        .collect(),
                };
                entries.push(MatrixEntry {
                    distro: distro.to_string(),
                    releases,
                });
            }
            entries
        }
        None => btfhub_distro::DEFAULT_DISTROS
            .iter()
            .map(|distro| MatrixEntry {
                distro: (*distro).to_string(),
                releases: btfhub_distro::default_releases_for(distro)
                    .expect("DEFAULT_DISTROS entries are always known")
                    .iter()
                    .map(|r| (*r).to_string())
                    .collect(),
            })
            .collect(),
    };

    let archs = match &flags.arch {
        Some(arch_arg) => split_flag(arch_arg)
            .into_iter()
            .map(|a| btfhub_types::Arch::parse(a).ok_or_else(|| ConfigError::InvalidArch(a.to_string())))
            .collect::<Result<Vec<_>, _>>()?,
        None => btfhub_distro::POSSIBLE_ARCHS
            .iter()
            .map(|a| btfhub_types::Arch::parse(a).expect("POSSIBLE_ARCHS entries always parse"))
            .collect(),
    };

    Ok(ResolvedMatrix { entries, archs })
}

/// Compile `--query` into a [`Regex`], if given.
pub fn compile_query(flags: &Flags) -> Result<Option<Regex>, ConfigError> {
    flags.query.as_deref().map(Regex::new).transpose().map_err(ConfigError::InvalidQuery)
}

#[cfg(test)]
mod tests {
    use super::*;
    use btfhub_types::Arch;

    fn flags() -> Flags {
        Flags::default()
    }

    #[test]
    fn default_flags_resolve_to_default_distros_and_both_archs() {
        let matrix = resolve_matrix(&flags()).unwrap();
        assert_eq!(matrix.entries.len(), btfhub_distro::DEFAULT_DISTROS.len());
        assert_eq!(matrix.archs, vec![Arch::X86_64, Arch::Arm64]);
    }

    #[test]
    fn explicit_distro_without_release_uses_its_defaults() {
        let mut f = flags();
        f.distro = Some("debian".into());
        let matrix = resolve_matrix(&f).unwrap();
        assert_eq!(matrix.entries, vec![MatrixEntry {
            distro: "debian".into(),
            releases: vec!["buster".into()],
        }]);
    }

    #[test]
    fn explicit_distro_and_release_are_validated_together() {
        let mut f = flags();
        f.distro = Some("ubuntu".into());
        f.release = Some("focal".into());
        let matrix = resolve_matrix(&f).unwrap();
        assert_eq!(matrix.entries[0].releases, vec!["focal".to_string()]);
    }

    #[test]
    fn unknown_distro_is_rejected() {
        let mut f = flags();
        f.distro = Some("plan9".into());
        assert!(matches!(resolve_matrix(&f), Err(ConfigError::InvalidDistro(d)) if d == "plan9"));
    }

    #[test]
    fn release_not_valid_for_distro_is_rejected() {
        let mut f = flags();
        f.distro = Some("ubuntu".into());
        f.release = Some("stretch".into());
        assert!(matches!(resolve_matrix(&f), Err(ConfigError::InvalidRelease { .. })));
    }

    #[test]
    fn space_separated_distros_each_resolve_independently() {
        let mut f = flags();
        f.distro = Some("ubuntu debian".into());
        let matrix = resolve_matrix(&f).unwrap();
        assert_eq!(matrix.entries.len(), 2);
        assert_eq!(matrix.entries[0].distro, "ubuntu");
        assert_eq!(matrix.entries[1].distro, "debian");
    }

    #[test]
    fn unknown_arch_is_rejected() {
        let mut f = flags();
        f.arch = Some("ppc64le".into());
        assert!(matches!(resolve_matrix(&f), Err(ConfigError::InvalidArch(a)) if a == "ppc64le"));
    }

    #[test]
    fn query_compiles_to_a_regex() {
        let mut f = flags();
        f.query = Some(r"^5\.4\.".into());
        let re = compile_query(&f).unwrap().unwrap();
        assert!(re.is_match("5.4.0-1042-aws"));
    }

    #[test]
    fn missing_query_compiles_to_none() {
        assert!(compile_query(&flags()).unwrap().is_none());
    }

    #[test]
    fn invalid_query_is_a_config_error() {
        let mut f = flags();
        f.query = Some("(unclosed".into());
        assert!(matches!(compile_query(&f), Err(ConfigError::InvalidQuery(_))));
    }
}
