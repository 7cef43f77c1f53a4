use crate::kernel_version::KernelVersion;
use std::fmt;

/// The two architectures the catalog tracks (spec.md §3, §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    /// `x86_64`.
    X86_64,
    /// `arm64` (aarch64).
    Arm64,
}

impl Arch {
    /// The on-disk / catalog-key spelling of this architecture.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Arm64 => "arm64",
        }
    }

    /// Parse the on-disk spelling back into an [`Arch`], if recognized.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "x86_64" => Some(Arch::X86_64),
            "arm64" => Some(Arch::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handle to one downloadable kernel debug artifact.
///
/// Constructed by a [package source](crate) producer, consumed exactly
/// once by the package pipeline, then dropped. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Package {
    /// Human-readable name, e.g. `linux-image-5.4.0-1042-aws-dbgsym`.
    pub name: String,
    /// File stem used for both the downloaded file and the BTF bundle.
    pub stem: String,
    /// Target architecture.
    pub arch: Arch,
    /// Distribution identifier, e.g. `ubuntu`, `amzn`, `rhel`.
    pub distro: String,
    /// Distribution release, e.g. `focal`, `2`, `8`.
    pub release: String,
    /// Structured, comparable kernel version.
    pub version: KernelVersion,
    /// Kernel variant (`generic`, `aws`, `azure`, `gke`, …); empty if the
    /// distro has no flavor concept.
    pub flavor: Option<String>,
    /// Opaque locator the package source capability uses to fetch and
    /// extract this package (a URL, repo-relative path, or similar).
    pub source_ref: String,
}

impl Package {
    /// The bundle file name for this package (`<stem>.btf.tar.xz`).
    #[must_use]
    pub fn bundle_name(&self) -> String {
        format!("{}.btf.tar.xz", self.stem)
    }

    /// The flavor used for grouping, normalized so `None` and `Some("")`
    /// behave identically (spec.md §3: flavor is "possibly empty").
    #[must_use]
    pub fn flavor_key(&self) -> &str {
        self.flavor.as_deref().unwrap_or("")
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}/{}", self.distro, self.release, self.arch, self.stem)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(stem: &str, flavor: Option<&str>) -> Package {
        Package {
            name: stem.to_string(),
            stem: stem.to_string(),
            arch: Arch::X86_64,
            distro: "ubuntu".to_string(),
            release: "focal".to_string(),
            version: KernelVersion::parse("5.4.0-1042-aws"),
            flavor: flavor.map(str::to_string),
            source_ref: format!("https://example.invalid/{stem}"),
        }
    }

    #[test]
    fn bundle_name_appends_suffix() {
        assert_eq!(pkg("5.4.0-1042-aws", None).bundle_name(), "5.4.0-1042-aws.btf.tar.xz");
    }

    #[test]
    fn flavor_key_normalizes_none_and_empty() {
        assert_eq!(pkg("x", None).flavor_key(), "");
        assert_eq!(pkg("x", Some("")).flavor_key(), "");
        assert_eq!(pkg("x", Some("aws")).flavor_key(), "aws");
    }

    #[test]
    fn arch_round_trips_through_catalog_spelling() {
        assert_eq!(Arch::parse("x86_64"), Some(Arch::X86_64));
        assert_eq!(Arch::parse("arm64"), Some(Arch::Arm64));
        assert_eq!(Arch::parse("ppc64le"), None);
        assert_eq!(Arch::X86_64.as_str(), "x86_64");
    }
}
