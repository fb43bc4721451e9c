//! Installer service seam
//!
//! The service owns install sessions: it accepts payload bytes, decides the
//! verdict and reports it twice, once through the per-session observer and
//! once as a completion notification delivered to the sink handed to
//! `commit`. Callers must tolerate either arriving first, late, or not at all.

mod local;

pub use local::{InstalledPackage, InstalledSplit, LocalInstallerService, LocalServiceOptions};

use apkm_errors::Error;
use apkm_types::{CompletionNotification, PackageDescriptor, SessionId};
use std::io::Write;
use std::sync::Arc;

/// Parameters for a new install session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionParams {
    pub package_id: String,
    pub version_name: String,
    pub version_code: i64,
    /// Total payload size when known, zero otherwise
    pub total_size: u64,
}

impl SessionParams {
    #[must_use]
    pub fn new(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            version_name: String::new(),
            version_code: 0,
            total_size: 0,
        }
    }
}

impl From<&PackageDescriptor> for SessionParams {
    fn from(descriptor: &PackageDescriptor) -> Self {
        Self {
            package_id: descriptor.package_id.clone(),
            version_name: descriptor.version_name.clone(),
            version_code: descriptor.version_code,
            total_size: descriptor.total_size,
        }
    }
}

/// Per-session progress and completion callbacks
pub trait SessionObserver: Send + Sync {
    fn on_progress(&self, session_id: SessionId, progress: f32);

    /// The session reached a verdict
    fn on_finished(&self, session_id: SessionId, success: bool);
}

/// Receiver of asynchronous completion notifications
///
/// Implementations must not block: notifications are delivered on the
/// service's own threads.
pub trait CompletionSink: Send + Sync {
    fn on_notification(&self, notification: CompletionNotification);
}

/// Operations offered by a package installer service
///
/// All calls may block on I/O and are made from blocking worker threads.
pub trait InstallerService: Send + Sync {
    /// Open a new session
    ///
    /// # Errors
    ///
    /// Returns an error when the service refuses or cannot allocate a session.
    fn create_session(&self, params: &SessionParams) -> Result<SessionId, Error>;

    /// Open a named payload stream inside a session
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or already committed sessions and
    /// invalid payload names.
    fn open_write(
        &self,
        session_id: SessionId,
        name: &str,
        length: u64,
    ) -> Result<Box<dyn Write + Send>, Error>;

    /// Attach the progress observer; dropped by the service once the session
    /// finished or was abandoned
    fn register_observer(&self, session_id: SessionId, observer: Arc<dyn SessionObserver>);

    fn unregister_observer(&self, session_id: SessionId);

    /// Hand the session over for installation
    ///
    /// The verdict is reported later through `sink`.
    ///
    /// # Errors
    ///
    /// Returns an error when the session is unknown or cannot be committed.
    fn commit(&self, session_id: SessionId, sink: Arc<dyn CompletionSink>) -> Result<(), Error>;

    /// Discard the session and everything written to it
    ///
    /// # Errors
    ///
    /// Returns an error when the session is unknown.
    fn abandon(&self, session_id: SessionId) -> Result<(), Error>;
}
