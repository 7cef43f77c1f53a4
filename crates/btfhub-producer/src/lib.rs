//! Per-(distro, release, arch) producer orchestration (spec.md §4.4, C4).
//!
//! A producer lists packages for one triple, groups them by flavor,
//! sorts each group by kernel version ascending, then drives each
//! group's packages through [`btfhub_pipeline::run_pipeline`] under one
//! of two disciplines. Flavors within a triple run concurrently with
//! each other so a has-BTF skip on one flavor never delays another.

use btfhub_capability::{PackageSource, SourceOptions};
use btfhub_error::{BtfHubError, CapabilityError};
use btfhub_job::{CancellationToken, Feed};
use btfhub_pipeline::{run_pipeline, Capabilities, PipelineOptions};
use btfhub_types::{layout, Arch, Package};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Identifies one producer's slice of the matrix.
#[derive(Debug, Clone)]
pub struct Triple {
    pub distro: String,
    pub release: String,
    pub arch: Arch,
}

/// Per-producer options (spec.md §4.4's `options.ordered` plus the
/// package-source listing options).
#[derive(Debug, Clone, Default)]
pub struct ProducerOptions {
    /// Ordered (sequential, early-exit-on-has-BTF) vs. unordered
    /// (concurrent, no group-wide early exit) discipline.
    pub ordered: bool,
    pub source_options: SourceOptions,
}

/// Run one producer: list, group, sort, then process every flavor group
/// for this `(distro, release, arch)` triple.
pub async fn run_producer(
    triple: &Triple,
    package_source: &dyn PackageSource,
    archive_root: &Path,
    producer_opts: &ProducerOptions,
    pipeline_opts: &PipelineOptions,
    caps: &Capabilities,
    btf_feed: &Feed,
    default_feed: &Feed,
    cancel: &CancellationToken,
) -> Result<(), BtfHubError> {
    let packages = match package_source.list_packages(&triple.release, triple.arch, &producer_opts.source_options).await {
        Ok(packages) => packages,
        Err(CapabilityError::Cancelled) => return Ok(()),
        Err(e) => {
            return Err(BtfHubError::Configuration(format!(
                "list packages for {}/{}/{}: {e}",
                triple.distro, triple.release, triple.arch
            )))
        }
    };

    let groups = group_by_flavor(packages);
    let work_dir = layout::work_dir(archive_root, &triple.distro, &triple.release, triple.arch);

    let group_futures = groups.into_values().map(|group| {
        let work_dir = &work_dir;
        async move {
            if producer_opts.ordered {
                run_ordered_group(group, work_dir, pipeline_opts, caps, btf_feed, default_feed, cancel).await
            } else {
                run_unordered_group(group, work_dir, pipeline_opts, caps, btf_feed, default_feed, cancel).await
            }
        }
    });

    futures::future::try_join_all(group_futures).await?;
    Ok(())
}

/// Group packages by [`Package::flavor_key`], sorting each group
/// ascending by kernel version (spec.md §4.4).
#[must_use]
pub fn group_by_flavor(packages: Vec<Package>) -> BTreeMap<String, Vec<Package>> {
    let mut groups: BTreeMap<String, Vec<Package>> = BTreeMap::new();
    for pkg in packages {
        groups.entry(pkg.flavor_key().to_string()).or_default().push(pkg);
    }
    for group in groups.values_mut() {
        group.sort_by(|a, b| a.version.cmp(&b.version));
    }
    groups
}

/// Sequential discipline: stop the group on `KernelAlreadyHasBtf`,
/// return success immediately on cancellation, log-and-continue on
/// anything else (spec.md §4.4 "Ordered").
#[allow(clippy::too_many_arguments)]
async fn run_ordered_group(
    group: Vec<Package>,
    work_dir: &Path,
    pipeline_opts: &PipelineOptions,
    caps: &Capabilities,
    btf_feed: &Feed,
    default_feed: &Feed,
    cancel: &CancellationToken,
) -> Result<(), BtfHubError> {
    for pkg in group {
        match run_pipeline(&pkg, work_dir, pipeline_opts, caps, btf_feed, default_feed, cancel).await {
            Ok(()) => {}
            Err(e) if e.is_control_signal() => match e {
                BtfHubError::KernelAlreadyHasBtf => {
                    info!(package = %pkg, "kernel already has BTF, skipping remainder of ordered group");
                    break;
                }
                BtfHubError::Cancelled => {
                    debug!(package = %pkg, "cancelled, stopping ordered group");
                    return Ok(());
                }
                _ => unreachable!("is_control_signal only matches KernelAlreadyHasBtf and Cancelled"),
            },
            Err(e) => {
                warn!(package = %pkg, %e, "package failed, continuing with next package in group");
            }
        }
    }
    Ok(())
}

/// Concurrent discipline: every package in the group runs at once;
/// `KernelAlreadyHasBtf` aborts only that package (spec.md §4.4
/// "Unordered").
#[allow(clippy::too_many_arguments)]
async fn run_unordered_group(
    group: Vec<Package>,
    work_dir: &Path,
    pipeline_opts: &PipelineOptions,
    caps: &Capabilities,
    btf_feed: &Feed,
    default_feed: &Feed,
    cancel: &CancellationToken,
) -> Result<(), BtfHubError> {
    let futures = group.iter().map(|pkg| async move {
        match run_pipeline(pkg, work_dir, pipeline_opts, caps, btf_feed, default_feed, cancel).await {
            Ok(()) => {}
            Err(e) if e.is_control_signal() => {}
            Err(e) => warn!(package = %pkg, %e, "package failed"),
        }
    });
    futures::future::join_all(futures).await;
    Ok(())
}
