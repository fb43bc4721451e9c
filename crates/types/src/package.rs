//! Package metadata produced by the payload source

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Immutable description of an extracted multi-file package.
///
/// Created once per selected archive and never mutated afterwards. The
/// payload paths are ordered with the base payload first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDescriptor {
    /// Human readable application name
    pub display_name: String,
    /// Unique package identifier (e.g. `com.example.app`)
    pub package_id: String,
    /// Version name as shown to users
    pub version_name: String,
    /// Monotonic version ordinal used for upgrade checks
    pub version_code: i64,
    /// Raw icon bytes, when the archive ships one
    #[serde(default, skip_serializing)]
    pub icon: Option<Vec<u8>>,
    /// Declared permissions
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Extracted payload files, base payload first
    pub payload_paths: Vec<PathBuf>,
    /// Total uncompressed size of all payloads in bytes
    pub total_size: u64,
}

impl PackageDescriptor {
    /// Number of payload files
    #[must_use]
    pub fn payload_count(&self) -> usize {
        self.payload_paths.len()
    }

    /// Whether the archive carried an icon
    #[must_use]
    pub fn has_icon(&self) -> bool {
        self.icon.is_some()
    }

    /// Payload paths that no longer exist on disk
    #[must_use]
    pub fn missing_payloads(&self) -> Vec<&Path> {
        self.payload_paths
            .iter()
            .map(PathBuf::as_path)
            .filter(|path| !path.exists())
            .collect()
    }
}

impl fmt::Display for PackageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} {}, code {})",
            self.display_name, self.package_id, self.version_name, self.version_code
        )
    }
}
