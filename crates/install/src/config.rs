//! Pipeline configuration

use apkm_config::{Config, TimeoutScope};
use std::time::Duration;

/// Install pipeline configuration
#[derive(Clone, Debug)]
pub struct InstallConfig {
    /// Wall-clock limit for a single install
    pub timeout: Duration,
    /// Which part of the run the timeout covers
    pub timeout_scope: TimeoutScope,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(apkm_config::constants::DEFAULT_INSTALL_TIMEOUT_SECS),
            timeout_scope: TimeoutScope::AwaitOutcome,
        }
    }
}

impl InstallConfig {
    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the timeout scope
    #[must_use]
    pub fn with_scope(mut self, scope: TimeoutScope) -> Self {
        self.timeout_scope = scope;
        self
    }
}

impl From<&Config> for InstallConfig {
    fn from(config: &Config) -> Self {
        Self {
            timeout: config.install.timeout_duration(),
            timeout_scope: config.install.timeout_scope,
        }
    }
}
