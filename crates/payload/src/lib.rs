#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Payload source for split-package archives
//!
//! An `.apkm` bundle is a zip holding a base APK, any number of split APKs,
//! and optionally an `info.json` metadata file and an `icon.png`. This crate
//! unpacks the APKs into a per-run cache directory, enforces an upper bound on
//! the total extracted size, and returns a [`PackageDescriptor`].

mod extractor;
mod metadata;

pub use extractor::ApkmExtractor;
pub use metadata::ApkmInfo;

use apkm_errors::PayloadError;
use apkm_types::PackageDescriptor;
use std::path::Path;

/// Name of the base payload inside a bundle
pub const BASE_PAYLOAD: &str = "base.apk";

/// Anything able to turn a user-selected archive into a package descriptor
pub trait PayloadSource: Send + Sync {
    /// Extract the archive and describe its package
    ///
    /// # Errors
    ///
    /// Returns a `PayloadError` when the archive is unreadable, holds no
    /// installable payload, or exceeds the extraction size limit.
    fn extract(&self, archive: &Path) -> Result<PackageDescriptor, PayloadError>;
}
