//! On-disk path layout (spec.md §3 "WorkDir", §6 "Filesystem layout").
//!
//! These are pure path-arithmetic helpers; nothing here touches the
//! filesystem. [`btfhub-registry`](../btfhub_registry/index.html) builds
//! on top of these to read/write the actual sentinel files.

use crate::package::Arch;
use std::path::{Path, PathBuf};

/// `<archive>/<distro>/<release>/<arch>/`
#[must_use]
pub fn work_dir(archive_root: &Path, distro: &str, release: &str, arch: Arch) -> PathBuf {
    archive_root.join(distro).join(release).join(arch.as_str())
}

/// `<work_dir>/<stem>.btf.tar.xz`
#[must_use]
pub fn bundle_path(work_dir: &Path, stem: &str) -> PathBuf {
    work_dir.join(format!("{stem}.btf.tar.xz"))
}

/// `<work_dir>/<stem>.failed`
#[must_use]
pub fn failed_sentinel_path(work_dir: &Path, stem: &str) -> PathBuf {
    work_dir.join(format!("{stem}.failed"))
}

/// `<work_dir>/<stem>.has_btf`
#[must_use]
pub fn has_btf_sentinel_path(work_dir: &Path, stem: &str) -> PathBuf {
    work_dir.join(format!("{stem}.has_btf"))
}

/// `<hash_root>/<arch>/<distro>/<release>/<stem>`
#[must_use]
pub fn hash_file_path(hash_root: &Path, arch: Arch, distro: &str, release: &str, stem: &str) -> PathBuf {
    hash_root.join(arch.as_str()).join(distro).join(release).join(stem)
}

/// `<prefix>/<distro>/<release>/<arch>/<stem>.btf.tar.xz` — the object
/// store key a bundle is uploaded under (spec.md §6).
#[must_use]
pub fn object_store_key(prefix: &str, distro: &str, release: &str, arch: Arch, stem: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    format!("{prefix}/{distro}/{release}/{arch}/{stem}.btf.tar.xz", arch = arch.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_dir_layout_matches_contract() {
        let wd = work_dir(Path::new("/cwd/archive"), "ubuntu", "focal", Arch::X86_64);
        assert_eq!(wd, PathBuf::from("/cwd/archive/ubuntu/focal/x86_64"));
        assert_eq!(bundle_path(&wd, "5.4.0-1042-aws"), wd.join("5.4.0-1042-aws.btf.tar.xz"));
        assert_eq!(failed_sentinel_path(&wd, "stem"), wd.join("stem.failed"));
        assert_eq!(has_btf_sentinel_path(&wd, "stem"), wd.join("stem.has_btf"));
    }

    #[test]
    fn hash_file_layout_matches_contract() {
        let p = hash_file_path(Path::new("/hashes"), Arch::Arm64, "amzn", "2", "stem");
        assert_eq!(p, PathBuf::from("/hashes/arm64/amzn/2/stem"));
    }

    #[test]
    fn object_store_key_strips_trailing_slash_from_prefix() {
        let k = object_store_key("btf/", "ubuntu", "focal", Arch::X86_64, "stem");
        assert_eq!(k, "btf/ubuntu/focal/x86_64/stem.btf.tar.xz");
    }
}
