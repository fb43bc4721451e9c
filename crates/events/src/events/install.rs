use apkm_types::Phase;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::FailureContext;

/// Pipeline-level install events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InstallEvent {
    /// A pipeline run started
    Started {
        package_id: String,
        version_name: String,
        payloads: usize,
    },

    /// The pipeline advanced to a new phase
    PhaseChanged { package_id: String, phase: Phase },

    /// The run ended in success
    Completed {
        package_id: String,
        elapsed: Duration,
    },

    /// The run ended in failure (including cancellation and timeout)
    Failed {
        package_id: String,
        failure: FailureContext,
        elapsed: Duration,
    },

    /// The wait for a verdict expired and the session was cancelled
    TimedOut {
        package_id: String,
        timeout: Duration,
    },
}
