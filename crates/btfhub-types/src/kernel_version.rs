use std::cmp::Ordering;
use std::fmt;

/// A total order over kernel version strings.
///
/// Orders by numeric components (the maximal digit runs found in the
/// version string, in order) with the trailing component acting as the
/// tie-break build counter — e.g. `4.14.355-276.639` decomposes to
/// `[4, 14, 355, 276, 639]` and compares element-wise against another
/// decomposed version, padding the shorter one with zeros.
///
/// The zero value (`KernelVersion::default()`, no numeric components)
/// compares less than every non-zero version.
#[derive(Clone, Debug, Eq, serde::Serialize, serde::Deserialize)]
pub struct KernelVersion {
    raw: String,
    components: Vec<u64>,
}

impl KernelVersion {
    /// Parse a kernel version string into its comparable form.
    ///
    /// Non-numeric characters (`.`, `-`, `_`, distro suffixes like
    /// `amzn2`, `aws`, `generic`) are treated purely as separators; only
    /// the digit runs between them contribute to ordering.
    #[must_use]
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut components = Vec::new();
        let mut current = String::new();
        for ch in raw.chars() {
            if ch.is_ascii_digit() {
                current.push(ch);
            } else if !current.is_empty() {
                components.push(current.parse().unwrap_or(0));
                current.clear();
            }
        }
        if !current.is_empty() {
            components.push(current.parse().unwrap_or(0));
        }
        Self { raw, components }
    }

    /// The original, unparsed version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `true` if `self` strictly precedes `other` in version order.
    #[must_use]
    pub fn less(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Less
    }
}

impl Default for KernelVersion {
    fn default() -> Self {
        Self {
            raw: String::new(),
            components: Vec::new(),
        }
    }
}

impl PartialEq for KernelVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for KernelVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KernelVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).copied().unwrap_or(0);
            let b = other.components.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_value_is_less_than_everything_nonzero() {
        let zero = KernelVersion::default();
        let nonzero = KernelVersion::parse("4.14.355-276.639.amzn2.x86_64");
        assert!(zero.less(&nonzero));
        assert!(!nonzero.less(&zero));
    }

    #[test]
    fn numeric_components_order_before_lexicographic_would() {
        let a = KernelVersion::parse("5.9.0-1000-aws");
        let b = KernelVersion::parse("5.10.0-1000-aws");
        assert!(a.less(&b), "5.9 should be less than 5.10 numerically");
    }

    #[test]
    fn build_counter_is_a_tiebreak() {
        let a = KernelVersion::parse("5.4.0-1042-aws");
        let b = KernelVersion::parse("5.4.0-1043-aws");
        assert!(a.less(&b));
        assert!(!b.less(&a));
    }

    #[test]
    fn antisymmetric_for_equal_versions() {
        let a = KernelVersion::parse("5.4.0-1042-aws");
        let b = KernelVersion::parse("5.4.0-1042-generic");
        assert!(!a.less(&b));
        assert!(!b.less(&a));
        assert_eq!(a, b);
    }

    #[test]
    fn sorts_ascending() {
        let mut versions = vec![
            KernelVersion::parse("5.4.0-1043-aws"),
            KernelVersion::parse("4.14.355-276.639.amzn2.x86_64"),
            KernelVersion::parse("5.4.0-1042-aws"),
        ];
        versions.sort();
        assert_eq!(versions[0].as_str(), "4.14.355-276.639.amzn2.x86_64");
        assert_eq!(versions[1].as_str(), "5.4.0-1042-aws");
        assert_eq!(versions[2].as_str(), "5.4.0-1043-aws");
    }
}
