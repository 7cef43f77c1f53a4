//! The static distro/release/arch matrix.
//!
//! Recovered from `original_source/cmd/btfhub/commands/generate.go`
//! (`distroReleases`, `defaultDistros`, `defaultReleases`,
//! `possibleArchs`). This is matrix *data*, not discovery logic — the
//! actual package-source query for a given distro/release/arch is an
//! external collaborator (spec.md §1, `btfhub-capability::PackageSource`).

/// Every architecture the pipeline ever targets.
pub const POSSIBLE_ARCHS: &[&str] = &["x86_64", "arm64"];

/// Every distro identifier the matrix knows about, with its supported
/// releases.
pub const DISTRO_RELEASES: &[(&str, &[&str])] = &[
    ("ubuntu", &["xenial", "bionic", "focal"]),
    ("debian", &["stretch", "buster"]),
    ("fedora", &["24", "25", "26", "27", "28", "29", "30", "31"]),
    ("centos", &["7", "8"]),
    ("ol", &["7", "8"]),
    ("rhel", &["7", "8"]),
    ("amzn", &["1", "2"]),
    ("sles", &["12.3", "12.4", "12.5", "15.0", "15.1", "15.2", "15.3"]),
    ("opensuse-leap", &["15.0", "15.1", "15.2", "15.3"]),
];

/// Distros included in a run when `--distro` is not given.
///
/// Notably narrower than [`DISTRO_RELEASES`]: `rhel`, `amzn`, `sles`,
/// and `opensuse-leap` require an explicit `--distro` opt-in (matching
/// the original's `defaultDistros`, which excludes them from the
/// unqualified run).
pub const DEFAULT_DISTROS: &[&str] = &["ubuntu", "debian", "fedora", "centos", "ol"];

/// Releases used per distro when `--release` is not given.
///
/// Differs from [`DISTRO_RELEASES`] only for `debian`, which defaults to
/// `buster` alone (no `stretch`).
pub const DEFAULT_RELEASES: &[(&str, &[&str])] = &[
    ("ubuntu", &["xenial", "bionic", "focal"]),
    ("debian", &["buster"]),
    ("fedora", &["24", "25", "26", "27", "28", "29", "30", "31"]),
    ("centos", &["7", "8"]),
    ("ol", &["7", "8"]),
    ("rhel", &["7", "8"]),
    ("amzn", &["1", "2"]),
    ("sles", &["12.3", "12.4", "12.5", "15.0", "15.1", "15.2", "15.3"]),
    ("opensuse-leap", &["15.0", "15.1", "15.2", "15.3"]),
];

fn lookup<'a>(table: &'a [(&'a str, &'a [&'a str])], distro: &str) -> Option<&'a [&'a str]> {
    table.iter().find(|(name, _)| *name == distro).map(|(_, releases)| *releases)
}

/// All releases a distro supports, regardless of defaulting.
#[must_use]
pub fn releases_for(distro: &str) -> Option<&'static [&'static str]> {
    lookup(DISTRO_RELEASES, distro)
}

/// The default releases for a distro (used when `--release` is omitted).
#[must_use]
pub fn default_releases_for(distro: &str) -> Option<&'static [&'static str]> {
    lookup(DEFAULT_RELEASES, distro)
}

/// `true` if `distro` is a recognized identifier in the matrix.
#[must_use]
pub fn is_known_distro(distro: &str) -> bool {
    releases_for(distro).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_distros_are_all_known() {
        for d in DEFAULT_DISTROS {
            assert!(is_known_distro(d), "{d} should be a known distro");
        }
    }

    #[test]
    fn default_releases_are_subsets_of_full_release_lists() {
        for (distro, defaults) in DEFAULT_RELEASES {
            let full = releases_for(distro).unwrap_or_else(|| panic!("{distro} missing from DISTRO_RELEASES"));
            for r in *defaults {
                assert!(full.contains(r), "{distro}/{r} missing from full release list");
            }
        }
    }

    #[test]
    fn unknown_distro_returns_none() {
        assert!(releases_for("plan9").is_none());
        assert!(!is_known_distro("plan9"));
    }

    #[test]
    fn debian_default_excludes_stretch() {
        assert_eq!(default_releases_for("debian"), Some(&["buster"][..]));
        assert!(releases_for("debian").unwrap().contains(&"stretch"));
    }
}
