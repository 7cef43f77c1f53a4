//! Property-based tests for [`Catalog`]'s round-trip and insert laws
//! (spec.md §8, catalog round-trip laws 8-10).

use btfhub_types::{Arch, Catalog, CatalogEntry};
use proptest::prelude::*;

fn arb_arch() -> impl Strategy<Value = Arch> {
    prop_oneof![Just(Arch::X86_64), Just(Arch::Arm64)]
}

fn arb_key_component() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9._-]{0,15}"
}

fn arb_hash() -> impl Strategy<Value = CatalogEntry> {
    "[0-9a-f]{64}".prop_map(|h| CatalogEntry::new(h).unwrap())
}

/// One `(arch, distro, release, version, hash)` tuple to insert.
fn arb_record() -> impl Strategy<Value = (Arch, String, String, String, CatalogEntry)> {
    (arb_arch(), arb_key_component(), arb_key_component(), arb_key_component(), arb_hash())
}

fn build_catalog(records: &[(Arch, String, String, String, CatalogEntry)]) -> Catalog {
    let mut cat = Catalog::new();
    for (arch, distro, release, version, entry) in records {
        // Distinct generated tuples can still collide on the key; keep
        // insertion order and skip a record once its key is already
        // taken so the fixture itself never raises a conflict.
        let _ = cat.insert(*arch, distro, release, version, entry.clone());
    }
    cat
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn law_8_serialize_then_parse_round_trips(records in proptest::collection::vec(arb_record(), 0..20)) {
        let cat = build_catalog(&records);
        let json = cat.to_json_pretty().unwrap();
        let parsed = Catalog::from_json(&json).unwrap();
        prop_assert_eq!(parsed, cat, "parse(serialize(C)) must equal C");
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn law_9_inserting_an_absent_key_adds_exactly_one_entry(
        records in proptest::collection::vec(arb_record(), 0..20),
        (arch, distro, release, version, entry) in arb_record(),
    ) {
        let mut cat = build_catalog(&records);
        prop_assume!(cat.get(arch, &distro, &release, &version).is_none());

        let before_count = count_entries(&cat);
        cat.insert(arch, &distro, &release, &version, entry.clone()).unwrap();

        prop_assert_eq!(count_entries(&cat), before_count + 1, "exactly one new entry must appear");
        prop_assert_eq!(cat.get(arch, &distro, &release, &version), Some(&entry));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn law_10_conflicting_insert_errors_and_leaves_catalog_unchanged(
        records in proptest::collection::vec(arb_record(), 1..20),
        other_hash in "[0-9a-f]{64}",
    ) {
        let cat = build_catalog(&records);
        // Pick an existing entry and try to insert a different hash for its key.
        let Some((arch, distro, release, version, existing)) = first_entry(&cat) else {
            return Ok(());
        };
        prop_assume!(other_hash != existing.sha256);

        let mut mutated = cat.clone();
        let conflicting = CatalogEntry::new(other_hash).unwrap();
        let result = mutated.insert(arch, &distro, &release, &version, conflicting);

        prop_assert!(result.is_err(), "a differing hash for an existing key must error");
        prop_assert_eq!(mutated, cat, "catalog must be unchanged after a rejected conflicting insert");
    }
}

fn count_entries(cat: &Catalog) -> usize {
    let per_arch = |distro_map: &std::collections::BTreeMap<_, std::collections::BTreeMap<_, std::collections::BTreeMap<_, CatalogEntry>>>| {
        distro_map.values().flat_map(|release_map| release_map.values()).map(std::collections::BTreeMap::len).sum::<usize>()
    };
    per_arch(&cat.x86_64) + per_arch(&cat.arm64)
}

fn first_entry(cat: &Catalog) -> Option<(Arch, String, String, String, CatalogEntry)> {
    for (arch, distro_map) in [(Arch::X86_64, &cat.x86_64), (Arch::Arm64, &cat.arm64)] {
        for (distro, release_map) in distro_map {
            for (release, version_map) in release_map {
                for (version, entry) in version_map {
                    return Some((arch, distro.clone(), release.clone(), version.clone(), entry.clone()));
                }
            }
        }
    }
    None
}
