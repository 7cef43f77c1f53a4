use crate::package::Arch;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One hash record in the catalog: the SHA-256 of a published bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Lowercase, 64 hex character SHA-256 digest.
    pub sha256: String,
}

impl CatalogEntry {
    /// Build an entry, validating the hash's shape (spec.md §3 invariant).
    pub fn new(sha256: impl Into<String>) -> Result<Self, InvalidHash> {
        let sha256 = sha256.into();
        if sha256.len() == 64 && sha256.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            Ok(Self { sha256 })
        } else {
            Err(InvalidHash(sha256))
        }
    }
}

/// A string that is not a well-formed 64-character lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidHash(pub String);

impl fmt::Display for InvalidHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "not a 64-character lowercase hex sha256: {:?}", self.0)
    }
}

impl std::error::Error for InvalidHash {}

type ReleaseMap = BTreeMap<String, CatalogEntry>;
type DistroMap = BTreeMap<String, ReleaseMap>;
type ArchMap = BTreeMap<String, DistroMap>;

/// Conflict raised when inserting a hash that disagrees with an existing
/// entry for the same `(arch, distro, release, version)` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConflict {
    pub arch: Arch,
    pub distro: String,
    pub release: String,
    pub version: String,
    pub existing: String,
    pub incoming: String,
}

impl fmt::Display for CatalogConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hash mismatch for {}/{}/{}/{} (existing {}, incoming {})",
            self.arch, self.distro, self.release, self.version, self.existing, self.incoming
        )
    }
}

impl std::error::Error for CatalogConflict {}

/// The three-level BTF catalog: arch -> distro -> release -> version -> hash.
///
/// Serializes with exactly the two top-level keys `"x86_64"` and
/// `"arm64"` and nested `BTreeMap`s, so JSON output is deterministic by
/// construction (spec.md §3, §4.6, §8 laws 8-9).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(rename = "x86_64", default)]
    pub x86_64: ArchMap,
    #[serde(rename = "arm64", default)]
    pub arm64: ArchMap,
}

impl Catalog {
    /// An empty catalog with both architecture keys present.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn arch_map(&self, arch: Arch) -> &ArchMap {
        match arch {
            Arch::X86_64 => &self.x86_64,
            Arch::Arm64 => &self.arm64,
        }
    }

    fn arch_map_mut(&mut self, arch: Arch) -> &mut ArchMap {
        match arch {
            Arch::X86_64 => &mut self.x86_64,
            Arch::Arm64 => &mut self.arm64,
        }
    }

    /// Look up the hash recorded for a given key, if any.
    #[must_use]
    pub fn get(&self, arch: Arch, distro: &str, release: &str, version: &str) -> Option<&CatalogEntry> {
        self.arch_map(arch).get(distro)?.get(release)?.get(version)
    }

    /// Insert a hash for the given key.
    ///
    /// If an entry already exists with a *different* hash, returns a
    /// [`CatalogConflict`] and leaves the catalog unchanged (spec.md §4.6
    /// step 3: "Do not overwrite"). Re-inserting the same hash is a no-op
    /// success.
    pub fn insert(
        &mut self,
        arch: Arch,
        distro: &str,
        release: &str,
        version: &str,
        entry: CatalogEntry,
    ) -> Result<(), CatalogConflict> {
        if let Some(existing) = self.get(arch, distro, release, version) {
            if existing.sha256 != entry.sha256 {
                return Err(CatalogConflict {
                    arch,
                    distro: distro.to_string(),
                    release: release.to_string(),
                    version: version.to_string(),
                    existing: existing.sha256.clone(),
                    incoming: entry.sha256,
                });
            }
            return Ok(());
        }
        self.arch_map_mut(arch)
            .entry(distro.to_string())
            .or_default()
            .entry(release.to_string())
            .or_default()
            .insert(version.to_string(), entry);
        Ok(())
    }

    /// Serialize with 4-space indentation, matching spec.md §3's contract
    /// and `encoding/json.MarshalIndent(catalog, "", "    ")` in the
    /// original implementation.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        serde::Serialize::serialize(self, &mut ser)?;
        Ok(String::from_utf8(buf).expect("serde_json output is valid utf8"))
    }

    /// Parse a catalog from its JSON representation.
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: char) -> CatalogEntry {
        CatalogEntry::new(byte.to_string().repeat(64)).unwrap()
    }

    #[test]
    fn invalid_hash_rejected() {
        assert!(CatalogEntry::new("not-a-hash").is_err());
        assert!(CatalogEntry::new("A".repeat(64)).is_err(), "uppercase hex rejected");
        assert!(CatalogEntry::new("a".repeat(63)).is_err(), "wrong length rejected");
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut cat = Catalog::new();
        cat.insert(Arch::X86_64, "amzn", "2", "4.14.355-276.639.amzn2.x86_64", hash('a'))
            .unwrap();
        assert_eq!(
            cat.get(Arch::X86_64, "amzn", "2", "4.14.355-276.639.amzn2.x86_64")
                .unwrap()
                .sha256,
            "a".repeat(64)
        );
    }

    #[test]
    fn conflicting_insert_is_rejected_and_leaves_catalog_unchanged() {
        let mut cat = Catalog::new();
        cat.insert(Arch::X86_64, "amzn", "2", "v1", hash('a')).unwrap();
        let before = cat.clone();
        let err = cat.insert(Arch::X86_64, "amzn", "2", "v1", hash('b')).unwrap_err();
        assert_eq!(err.existing, "a".repeat(64));
        assert_eq!(err.incoming, "b".repeat(64));
        assert_eq!(cat, before);
    }

    #[test]
    fn reinserting_same_hash_is_a_no_op_success() {
        let mut cat = Catalog::new();
        cat.insert(Arch::X86_64, "amzn", "2", "v1", hash('a')).unwrap();
        cat.insert(Arch::X86_64, "amzn", "2", "v1", hash('a')).unwrap();
    }

    #[test]
    fn serialize_round_trip_is_stable() {
        let mut cat = Catalog::new();
        cat.insert(Arch::Arm64, "ubuntu", "focal", "v2", hash('c')).unwrap();
        cat.insert(Arch::X86_64, "ubuntu", "focal", "v1", hash('d')).unwrap();
        let json = cat.to_json_pretty().unwrap();
        let parsed = Catalog::from_json(&json).unwrap();
        assert_eq!(parsed, cat);
        let json2 = parsed.to_json_pretty().unwrap();
        assert_eq!(json, json2, "serialization must be byte-identical across runs");
    }

    #[test]
    fn empty_catalog_still_has_both_top_level_keys() {
        let cat = Catalog::new();
        let json = cat.to_json_pretty().unwrap();
        assert!(json.contains("\"x86_64\""));
        assert!(json.contains("\"arm64\""));
    }
}
