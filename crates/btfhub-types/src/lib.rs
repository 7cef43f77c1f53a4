//! Core data model for the btfhub pipeline.
//!
//! This crate holds the types every other crate in the workspace shares:
//! [`Package`], [`KernelVersion`], [`Arch`], and the on-disk layout helpers
//! in [`layout`]. None of these types perform I/O or know about job
//! scheduling — they are the nouns the rest of the workspace operates on.

mod catalog;
mod kernel_version;
mod package;

pub mod layout;

pub use catalog::{Catalog, CatalogEntry};
pub use kernel_version::KernelVersion;
pub use package::{Arch, Package};
