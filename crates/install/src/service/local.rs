//! Filesystem-backed installer service
//!
//! Stages each session below `<root>/.sessions/<id>/` and installs committed
//! sessions into `<root>/packages/<package id>/` together with a
//! `package.json` record. Verdicts are decided on a background thread per
//! session and reported through the observer and, after the configured
//! delay, as a completion notification.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use apkm_config::ServiceConfig;
use apkm_errors::{Error, InstallError};
use apkm_types::{CompletionNotification, ServiceStatus, SessionId, UserAction};
use chrono::{DateTime, Utc};
use crossbeam::channel::{self, Sender};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::{CompletionSink, InstallerService, SessionObserver, SessionParams};

const SESSIONS_DIR: &str = ".sessions";
const PACKAGES_DIR: &str = "packages";
const RECORD_FILE: &str = "package.json";

#[derive(Debug, Clone, Default)]
pub struct LocalServiceOptions {
    /// Delay between the observer's verdict and the completion notification
    pub notification_delay: Duration,
    /// Ask for confirmation before installing each session
    pub require_user_action: bool,
    /// Reject sessions whose payload exceeds this many bytes
    pub storage_quota: Option<u64>,
}

impl From<&ServiceConfig> for LocalServiceOptions {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            notification_delay: Duration::from_millis(config.notification_delay_ms),
            require_user_action: config.require_user_action,
            storage_quota: config.storage_quota_bytes,
        }
    }
}

/// One installed payload file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledSplit {
    pub name: String,
    pub size: u64,
    pub blake3: String,
}

/// Record written next to an installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub package_id: String,
    pub version_name: String,
    pub version_code: i64,
    pub splits: Vec<InstalledSplit>,
    pub installed_at: DateTime<Utc>,
}

impl InstalledPackage {
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.splits.iter().map(|split| split.size).sum()
    }
}

#[derive(Debug)]
struct LocalSession {
    params: SessionParams,
    staging: PathBuf,
    files: Vec<String>,
    committed: bool,
}

enum Verdict {
    Installed,
    Rejected(ServiceStatus, String),
    /// The session was abandoned while being processed
    Gone,
}

#[derive(Clone)]
pub struct LocalInstallerService {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    options: LocalServiceOptions,
    next_id: AtomicI32,
    sessions: DashMap<SessionId, LocalSession>,
    observers: DashMap<SessionId, Arc<dyn SessionObserver>>,
    confirmations: DashMap<SessionId, Sender<bool>>,
}

impl std::fmt::Debug for LocalInstallerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalInstallerService")
            .field("root", &self.inner.root)
            .field("options", &self.inner.options)
            .field("sessions", &self.inner.sessions.len())
            .finish()
    }
}

impl LocalInstallerService {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, options: LocalServiceOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                options,
                next_id: AtomicI32::new(1),
                sessions: DashMap::new(),
                observers: DashMap::new(),
                confirmations: DashMap::new(),
            }),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Answer a pending confirmation request
    ///
    /// # Errors
    ///
    /// Returns `UnknownSession` when no confirmation is pending for the session.
    pub fn confirm(&self, session_id: SessionId, accepted: bool) -> Result<(), Error> {
        let sender = self
            .inner
            .confirmations
            .get(&session_id)
            .map(|entry| entry.value().clone())
            .ok_or(InstallError::UnknownSession {
                session_id: session_id.0,
            })?;
        // The waiting thread may already be gone if the session was abandoned
        let _ = sender.try_send(accepted);
        Ok(())
    }

    /// Sessions currently open
    #[must_use]
    pub fn open_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.inner.sessions.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Packages installed under this root, sorted by id
    ///
    /// # Errors
    ///
    /// Returns an error when a package record cannot be read or parsed.
    pub fn installed(&self) -> Result<Vec<InstalledPackage>, Error> {
        let dir = self.inner.root.join(PACKAGES_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io_with_path(&e, dir)),
        };

        let mut packages = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io_with_path(&e, &dir))?;
            let record = entry.path().join(RECORD_FILE);
            if record.is_file() {
                packages.push(read_record(&record)?);
            }
        }
        packages.sort_by(|a, b| a.package_id.cmp(&b.package_id));
        Ok(packages)
    }

    /// Installed record for one package, if present
    ///
    /// # Errors
    ///
    /// Returns an error when the record exists but cannot be read.
    pub fn package(&self, package_id: &str) -> Result<Option<InstalledPackage>, Error> {
        self.inner.package(package_id)
    }
}

impl InstallerService for LocalInstallerService {
    fn create_session(&self, params: &SessionParams) -> Result<SessionId, Error> {
        if !is_plain_name(&params.package_id) {
            return Err(Error::internal(format!(
                "invalid package id: {:?}",
                params.package_id
            )));
        }

        let session_id = SessionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let staging = self
            .inner
            .root
            .join(SESSIONS_DIR)
            .join(session_id.to_string());
        // Leftovers from an earlier process using the same id
        let _ = fs::remove_dir_all(&staging);
        fs::create_dir_all(&staging).map_err(|e| Error::io_with_path(&e, &staging))?;

        self.inner.sessions.insert(
            session_id,
            LocalSession {
                params: params.clone(),
                staging,
                files: Vec::new(),
                committed: false,
            },
        );
        Ok(session_id)
    }

    fn open_write(
        &self,
        session_id: SessionId,
        name: &str,
        length: u64,
    ) -> Result<Box<dyn Write + Send>, Error> {
        if !is_plain_name(name) {
            return Err(Error::internal(format!("invalid payload name: {name:?}")));
        }

        let path = {
            let mut session = self.inner.sessions.get_mut(&session_id).ok_or(
                InstallError::UnknownSession {
                    session_id: session_id.0,
                },
            )?;
            if session.committed {
                return Err(Error::internal(format!(
                    "session {session_id} is already committed"
                )));
            }
            if !session.files.iter().any(|f| f == name) {
                session.files.push(name.to_string());
            }
            session.staging.join(name)
        };

        let file = File::create(&path).map_err(|e| Error::io_with_path(&e, &path))?;
        Ok(Box::new(SessionWriter {
            file,
            remaining: length,
        }))
    }

    fn register_observer(&self, session_id: SessionId, observer: Arc<dyn SessionObserver>) {
        if self.inner.sessions.contains_key(&session_id) {
            self.inner.observers.insert(session_id, observer);
        }
    }

    fn unregister_observer(&self, session_id: SessionId) {
        self.inner.observers.remove(&session_id);
    }

    fn commit(&self, session_id: SessionId, sink: Arc<dyn CompletionSink>) -> Result<(), Error> {
        {
            let mut session = self.inner.sessions.get_mut(&session_id).ok_or(
                InstallError::UnknownSession {
                    session_id: session_id.0,
                },
            )?;
            if session.committed {
                return Err(Error::internal(format!(
                    "session {session_id} is already committed"
                )));
            }
            session.committed = true;
        }

        let inner = self.inner.clone();
        std::thread::Builder::new()
            .name(format!("apkm-session-{session_id}"))
            .spawn(move || inner.process(session_id, &sink))
            .map_err(|e| Error::internal(format!("failed to start session worker: {e}")))?;
        Ok(())
    }

    fn abandon(&self, session_id: SessionId) -> Result<(), Error> {
        let (_, session) =
            self.inner
                .sessions
                .remove(&session_id)
                .ok_or(InstallError::UnknownSession {
                    session_id: session_id.0,
                })?;
        self.inner.observers.remove(&session_id);
        // Dropping the sender releases a worker waiting for confirmation
        self.inner.confirmations.remove(&session_id);
        remove_dir_if_exists(&session.staging)?;
        Ok(())
    }
}

impl Inner {
    fn process(&self, session_id: SessionId, sink: &Arc<dyn CompletionSink>) {
        if self.options.require_user_action && !self.await_confirmation(session_id, sink) {
            if self.sessions.contains_key(&session_id) {
                self.conclude(
                    session_id,
                    sink,
                    Verdict::Rejected(ServiceStatus::Aborted, "Install declined by user".into()),
                );
            }
            return;
        }

        self.progress(session_id, 0.5);
        let verdict = self.install(session_id);
        self.conclude(session_id, sink, verdict);
    }

    /// Returns true when the user accepted
    fn await_confirmation(&self, session_id: SessionId, sink: &Arc<dyn CompletionSink>) -> bool {
        let Some(params) = self.sessions.get(&session_id).map(|s| s.params.clone()) else {
            return false;
        };

        let (tx, rx) = channel::bounded(1);
        self.confirmations.insert(session_id, tx);

        let prompt = if params.version_name.is_empty() {
            format!("Install {}?", params.package_id)
        } else {
            format!("Install {} {}?", params.package_id, params.version_name)
        };
        sink.on_notification(
            CompletionNotification::new(session_id, ServiceStatus::PendingUserAction)
                .with_package(params.package_id.clone())
                .with_user_action(UserAction {
                    session_id,
                    package_id: Some(params.package_id),
                    prompt,
                }),
        );

        let accepted = rx.recv().unwrap_or(false);
        self.confirmations.remove(&session_id);
        accepted
    }

    fn install(&self, session_id: SessionId) -> Verdict {
        let Some((params, staging, files)) = self
            .sessions
            .get(&session_id)
            .map(|s| (s.params.clone(), s.staging.clone(), s.files.clone()))
        else {
            return Verdict::Gone;
        };

        if files.is_empty() {
            return Verdict::Rejected(
                ServiceStatus::Invalid,
                "INSTALL_FAILED_INVALID_APK: session contains no payload".into(),
            );
        }

        let mut splits = Vec::with_capacity(files.len());
        for name in &files {
            match digest(&staging.join(name)) {
                Ok((_, 0)) => {
                    return Verdict::Rejected(
                        ServiceStatus::Invalid,
                        format!("INSTALL_PARSE_FAILED_NOT_APK: {name} is empty"),
                    )
                }
                Ok((blake3, size)) => splits.push(InstalledSplit {
                    name: name.clone(),
                    size,
                    blake3,
                }),
                Err(e) => {
                    return Verdict::Rejected(
                        ServiceStatus::Failure,
                        format!("INSTALL_FAILED_INTERNAL_ERROR: reading {name}: {e}"),
                    )
                }
            }
        }

        let total: u64 = splits.iter().map(|s| s.size).sum();
        if let Some(quota) = self.options.storage_quota {
            if total > quota {
                return Verdict::Rejected(
                    ServiceStatus::Storage,
                    format!(
                        "INSTALL_FAILED_INSUFFICIENT_STORAGE: {total} bytes needed, {quota} available"
                    ),
                );
            }
        }

        match self.package(&params.package_id) {
            Ok(Some(existing)) if existing.version_code > params.version_code => {
                return Verdict::Rejected(
                    ServiceStatus::Incompatible,
                    format!(
                        "INSTALL_FAILED_VERSION_DOWNGRADE: installed version code {} is newer than {}",
                        existing.version_code, params.version_code
                    ),
                );
            }
            Ok(_) => {}
            Err(e) => {
                return Verdict::Rejected(
                    ServiceStatus::Failure,
                    format!("INSTALL_FAILED_INTERNAL_ERROR: {e}"),
                )
            }
        }

        if !self.sessions.contains_key(&session_id) {
            return Verdict::Gone;
        }

        let record = InstalledPackage {
            package_id: params.package_id.clone(),
            version_name: params.version_name,
            version_code: params.version_code,
            splits,
            installed_at: Utc::now(),
        };
        match self.place(&staging, &record) {
            Ok(()) => Verdict::Installed,
            Err(e) => Verdict::Rejected(
                ServiceStatus::Failure,
                format!("INSTALL_FAILED_INTERNAL_ERROR: {e}"),
            ),
        }
    }

    /// Move the staged files into place and write the record
    fn place(&self, staging: &Path, record: &InstalledPackage) -> io::Result<()> {
        let packages = self.root.join(PACKAGES_DIR);
        fs::create_dir_all(&packages)?;
        let target = packages.join(&record.package_id);
        if target.exists() {
            fs::remove_dir_all(&target)?;
        }
        fs::rename(staging, &target)?;

        let json = serde_json::to_vec_pretty(record).map_err(io::Error::other)?;
        fs::write(target.join(RECORD_FILE), json)
    }

    fn conclude(&self, session_id: SessionId, sink: &Arc<dyn CompletionSink>, verdict: Verdict) {
        let Some((_, session)) = self.sessions.remove(&session_id) else {
            return;
        };
        let observer = self.observers.remove(&session_id).map(|(_, o)| o);
        let package_id = session.params.package_id;

        match verdict {
            Verdict::Gone => {}
            Verdict::Installed => {
                if let Some(observer) = &observer {
                    observer.on_progress(session_id, 1.0);
                    observer.on_finished(session_id, true);
                }
                std::thread::sleep(self.options.notification_delay);
                sink.on_notification(
                    CompletionNotification::new(session_id, ServiceStatus::Success)
                        .with_package(package_id),
                );
            }
            Verdict::Rejected(status, message) => {
                let _ = remove_dir_if_exists(&session.staging);
                std::thread::sleep(self.options.notification_delay);
                // The notification carries the diagnostic, so it goes first
                sink.on_notification(
                    CompletionNotification::new(session_id, status)
                        .with_package(package_id)
                        .with_message(message),
                );
                if let Some(observer) = &observer {
                    observer.on_finished(session_id, false);
                }
            }
        }
    }

    fn progress(&self, session_id: SessionId, progress: f32) {
        let observer = self
            .observers
            .get(&session_id)
            .map(|entry| entry.value().clone());
        if let Some(observer) = observer {
            observer.on_progress(session_id, progress);
        }
    }

    fn package(&self, package_id: &str) -> Result<Option<InstalledPackage>, Error> {
        let record = self
            .root
            .join(PACKAGES_DIR)
            .join(package_id)
            .join(RECORD_FILE);
        if record.is_file() {
            read_record(&record).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Payload stream held to its declared length; flush syncs and fails while
/// bytes are still owed
struct SessionWriter {
    file: File,
    remaining: u64,
}

impl Write for SessionWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() as u64 > self.remaining {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "payload exceeds its declared length",
            ));
        }
        let written = self.file.write(buf)?;
        self.remaining -= written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.remaining != 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload is {} bytes short of its declared length", self.remaining),
            ));
        }
        self.file.flush()?;
        self.file.sync_all()
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
}

fn digest(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = blake3::Hasher::new();
    let size = io::copy(&mut file, &mut hasher)?;
    Ok((hasher.finalize().to_hex().to_string(), size))
}

fn read_record(path: &Path) -> Result<InstalledPackage, Error> {
    let bytes = fs::read(path).map_err(|e| Error::io_with_path(&e, path))?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn remove_dir_if_exists(path: &Path) -> Result<(), Error> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io_with_path(&e, path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        notifications: Mutex<Vec<CompletionNotification>>,
    }

    impl CompletionSink for Collect {
        fn on_notification(&self, notification: CompletionNotification) {
            self.notifications.lock().unwrap().push(notification);
        }
    }

    impl Collect {
        fn wait_for(&self, count: usize) -> Vec<CompletionNotification> {
            for _ in 0..500 {
                let seen = self.notifications.lock().unwrap().clone();
                if seen.len() >= count {
                    return seen;
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            panic!("timed out waiting for {count} notifications");
        }
    }

    fn params(version_code: i64) -> SessionParams {
        SessionParams {
            package_id: "com.example".into(),
            version_name: "1.0".into(),
            version_code,
            total_size: 4,
        }
    }

    fn stage(service: &LocalInstallerService, version_code: i64, data: &[u8]) -> SessionId {
        let id = service.create_session(&params(version_code)).unwrap();
        let mut out = service
            .open_write(id, "split_0.apk", data.len() as u64)
            .unwrap();
        out.write_all(data).unwrap();
        out.flush().unwrap();
        id
    }

    #[test]
    fn installs_and_records_package() {
        let temp = tempfile::tempdir().unwrap();
        let service = LocalInstallerService::new(temp.path(), LocalServiceOptions::default());
        let sink = Arc::new(Collect::default());

        let id = stage(&service, 3, b"data");
        service.commit(id, sink.clone()).unwrap();
        let seen = sink.wait_for(1);
        assert_eq!(seen[0].status, ServiceStatus::Success);

        let installed = service.installed().unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].version_code, 3);
        assert_eq!(installed[0].splits[0].size, 4);
        assert_eq!(
            installed[0].splits[0].blake3,
            blake3::hash(b"data").to_hex().to_string()
        );
        assert!(service.open_sessions().is_empty());
    }

    #[test]
    fn downgrade_is_incompatible() {
        let temp = tempfile::tempdir().unwrap();
        let service = LocalInstallerService::new(temp.path(), LocalServiceOptions::default());
        let sink = Arc::new(Collect::default());

        let first = stage(&service, 5, b"data");
        service.commit(first, sink.clone()).unwrap();
        sink.wait_for(1);

        let second = stage(&service, 4, b"data");
        service.commit(second, sink.clone()).unwrap();
        let seen = sink.wait_for(2);
        assert_eq!(seen[1].status, ServiceStatus::Incompatible);
        assert!(seen[1]
            .message
            .as_deref()
            .unwrap()
            .starts_with("INSTALL_FAILED_VERSION_DOWNGRADE"));
    }

    #[test]
    fn writer_rejects_excess_bytes() {
        let temp = tempfile::tempdir().unwrap();
        let service = LocalInstallerService::new(temp.path(), LocalServiceOptions::default());
        let id = service.create_session(&params(1)).unwrap();
        let mut out = service.open_write(id, "split_0.apk", 2).unwrap();
        assert!(out.write_all(b"too long").is_err());
    }

    #[test]
    fn writer_rejects_short_payload_on_flush() {
        let temp = tempfile::tempdir().unwrap();
        let service = LocalInstallerService::new(temp.path(), LocalServiceOptions::default());
        let id = service.create_session(&params(1)).unwrap();
        let mut out = service.open_write(id, "split_0.apk", 8).unwrap();
        out.write_all(b"half").unwrap();

        let err = out.flush().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        assert!(err.to_string().contains("4 bytes short"));

        out.write_all(b"rest").unwrap();
        out.flush().unwrap();
    }

    #[test]
    fn payload_names_cannot_escape_staging() {
        let temp = tempfile::tempdir().unwrap();
        let service = LocalInstallerService::new(temp.path(), LocalServiceOptions::default());
        let id = service.create_session(&params(1)).unwrap();
        assert!(service.open_write(id, "../evil.apk", 1).is_err());
    }

    #[test]
    fn abandon_releases_pending_confirmation() {
        let temp = tempfile::tempdir().unwrap();
        let options = LocalServiceOptions {
            require_user_action: true,
            ..LocalServiceOptions::default()
        };
        let service = LocalInstallerService::new(temp.path(), options);
        let sink = Arc::new(Collect::default());

        let id = stage(&service, 1, b"data");
        service.commit(id, sink.clone()).unwrap();
        let seen = sink.wait_for(1);
        assert_eq!(seen[0].status, ServiceStatus::PendingUserAction);

        service.abandon(id).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        // No verdict for an abandoned session
        assert_eq!(sink.notifications.lock().unwrap().len(), 1);
        assert!(service.installed().unwrap().is_empty());
        assert!(service.abandon(id).is_err());
    }
}
