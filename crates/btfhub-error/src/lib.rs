//! The error taxonomy from spec.md §7, given concrete types.
//!
//! Five kinds, not one grab-bag `anyhow::Error`: callers along the
//! pipeline/producer boundary need to distinguish
//! [`BtfHubError::KernelAlreadyHasBtf`] and [`BtfHubError::Cancelled`]
//! from ordinary failures, because those two carry their own control
//! flow (early group exit, silent shutdown) rather than being logged
//! and skipped.

use thiserror::Error;

/// Errors surfaced by capability implementations (extraction, BTF
/// generation, merge, compress, upload, package-source listing).
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// The extracted `vmlinux` already carries a `.BTF` ELF section.
    #[error("kernel already has BTF")]
    KernelAlreadyHasBtf,

    /// A transient condition (HTTP 5xx, retry-exhausted download, …)
    /// that the capability itself could not resolve after its own
    /// retry policy.
    #[error("transient capability error: {0}")]
    Transient(String),

    /// A non-retryable failure: malformed archive, external tool
    /// non-zero exit, checksum mismatch, and the like.
    #[error("capability failed: {0}")]
    Permanent(String),

    /// The operation was cancelled before it could complete.
    #[error("cancelled")]
    Cancelled,
}

/// The classified error kinds from spec.md §7, used at the
/// pipeline/producer/driver boundaries where propagation policy
/// branches on error *kind*.
#[derive(Debug, Error)]
pub enum BtfHubError {
    /// Semantic signal, not a failure: the kernel under test already
    /// ships BTF. Triggers the `.has_btf` sentinel and, in the ordered
    /// producer discipline, early group exit.
    #[error("kernel already has BTF")]
    KernelAlreadyHasBtf,

    /// User-requested shutdown. Propagates silently: sentinel files are
    /// not written, and producers report success rather than error.
    #[error("cancelled")]
    Cancelled,

    /// A capability-level transient error that exhausted its own
    /// retries before surfacing here.
    #[error("transient: {0}")]
    Transient(String),

    /// A permanent, package-local failure. The pipeline writes
    /// `.failed` and the producer logs and continues with the next
    /// package.
    #[error("permanent failure for {package}: {reason}")]
    Permanent {
        /// Identifier of the package that failed (for log correlation).
        package: String,
        /// Human-readable failure detail.
        reason: String,
    },

    /// A configuration or invariant violation: unknown distro, missing
    /// required flag, catalog hash conflict. Immediately fatal.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BtfHubError {
    /// `true` for the two kinds that are not logged-and-skipped failures:
    /// [`BtfHubError::KernelAlreadyHasBtf`] and [`BtfHubError::Cancelled`].
    #[must_use]
    pub fn is_control_signal(&self) -> bool {
        matches!(self, BtfHubError::KernelAlreadyHasBtf | BtfHubError::Cancelled)
    }

    /// `true` for permanent, package-local failures that should cause a
    /// `.failed` sentinel to be written (spec.md §7 kind 4).
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, BtfHubError::Permanent { .. })
    }

    /// `true` for configuration/invariant violations that must abort
    /// the whole run (spec.md §7 kind 5).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, BtfHubError::Configuration(_))
    }
}

impl From<CapabilityError> for BtfHubError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::KernelAlreadyHasBtf => BtfHubError::KernelAlreadyHasBtf,
            CapabilityError::Cancelled => BtfHubError::Cancelled,
            CapabilityError::Transient(msg) => BtfHubError::Transient(msg),
            CapabilityError::Permanent(msg) => BtfHubError::Permanent {
                package: String::new(),
                reason: msg,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_signals_are_classified_correctly() {
        assert!(BtfHubError::KernelAlreadyHasBtf.is_control_signal());
        assert!(BtfHubError::Cancelled.is_control_signal());
        assert!(!BtfHubError::Transient("x".into()).is_control_signal());
    }

    #[test]
    fn capability_error_conversion_preserves_kind() {
        let err: BtfHubError = CapabilityError::KernelAlreadyHasBtf.into();
        assert!(matches!(err, BtfHubError::KernelAlreadyHasBtf));
        let err: BtfHubError = CapabilityError::Permanent("boom".into()).into();
        assert!(err.is_permanent());
    }
}
