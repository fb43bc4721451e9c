use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::FailureContext;

/// Archive extraction events emitted by the payload source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PayloadEvent {
    /// Extraction of an archive started
    ExtractionStarted { archive: PathBuf, target: PathBuf },

    /// One payload entry was written to the cache
    EntryExtracted {
        name: String,
        bytes: u64,
        total_bytes: u64,
    },

    /// Extraction finished and metadata was read
    ExtractionCompleted {
        package_id: String,
        payloads: usize,
        total_bytes: u64,
    },

    /// Extraction failed; partial output was removed
    ExtractionFailed {
        archive: PathBuf,
        failure: FailureContext,
    },

    /// The extraction cache was cleared
    CacheCleared { path: PathBuf },
}
