//! Zip extraction into the per-run cache directory

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use apkm_errors::PayloadError;
use apkm_events::{EventEmitter, EventSender, FailureContext, PayloadEvent};
use apkm_types::PackageDescriptor;
use uuid::Uuid;
use zip::ZipArchive;

use crate::metadata::ApkmInfo;
use crate::{PayloadSource, BASE_PAYLOAD};

const EXTRACT_DIR: &str = "apkm_extract";
const INFO_ENTRY: &str = "info.json";
const ICON_ENTRY: &str = "icon.png";
const MAX_INFO_BYTES: u64 = 1024 * 1024;
const MAX_ICON_BYTES: u64 = 4 * 1024 * 1024;

/// Extracts `.apkm` bundles into `<cache_dir>/apkm_extract/<run id>/`
#[derive(Debug, Clone)]
pub struct ApkmExtractor {
    cache_dir: PathBuf,
    max_extract_bytes: u64,
    event_sender: Option<EventSender>,
}

impl EventEmitter for ApkmExtractor {
    fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_ref()
    }
}

impl ApkmExtractor {
    /// Create an extractor writing below `cache_dir`
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, max_extract_bytes: u64) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_extract_bytes,
            event_sender: None,
        }
    }

    /// Attach an event sender
    #[must_use]
    pub fn with_event_sender(mut self, sender: EventSender) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Root of all extraction runs
    #[must_use]
    pub fn extract_root(&self) -> PathBuf {
        self.cache_dir.join(EXTRACT_DIR)
    }

    /// Delete every extracted payload from the cache
    ///
    /// # Errors
    ///
    /// Returns an I/O payload error if the directory exists but cannot be removed.
    pub fn clear_cache(&self) -> Result<(), PayloadError> {
        let root = self.extract_root();
        match fs::remove_dir_all(&root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(PayloadError::io(&root, &e)),
        }
        self.emit_payload(PayloadEvent::CacheCleared { path: root });
        Ok(())
    }

    fn extract_into(&self, archive: &Path, run_dir: &Path) -> Result<PackageDescriptor, PayloadError> {
        let file = File::open(archive).map_err(|e| PayloadError::io(archive, &e))?;
        let mut zip = ZipArchive::new(file).map_err(|e| not_an_archive(archive, &e))?;

        let mut payloads: Vec<PathBuf> = Vec::new();
        let mut total_bytes: u64 = 0;

        for index in 0..zip.len() {
            let mut entry = zip.by_index(index).map_err(|e| not_an_archive(archive, &e))?;
            if entry.is_dir() || !entry.name().ends_with(".apk") {
                continue;
            }

            // Flatten to the file name so entries cannot escape the run directory
            let name = entry
                .name()
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            if name.is_empty() || name == ".apk" {
                continue;
            }
            let out_path = run_dir.join(&name);
            if payloads.contains(&out_path) {
                return Err(PayloadError::DuplicatePayload { name });
            }

            let mut out = File::create(&out_path).map_err(|e| PayloadError::io(&out_path, &e))?;
            let remaining = self.max_extract_bytes - total_bytes;
            let written = io::copy(&mut (&mut entry).take(remaining.saturating_add(1)), &mut out)
                .map_err(|e| PayloadError::io(&out_path, &e))?;
            total_bytes += written;
            if total_bytes > self.max_extract_bytes {
                return Err(PayloadError::SizeLimitExceeded {
                    limit: self.max_extract_bytes,
                });
            }

            self.emit_payload(PayloadEvent::EntryExtracted {
                name,
                bytes: written,
                total_bytes,
            });
            payloads.push(out_path);
        }

        if payloads.is_empty() {
            return Err(PayloadError::NoInstallablePayload);
        }

        // Base payload first; the rest keep archive order
        payloads.sort_by_key(|path| path.file_name().is_none_or(|name| name != BASE_PAYLOAD));

        let info = match read_entry(&mut zip, INFO_ENTRY, MAX_INFO_BYTES)? {
            Some(bytes) => ApkmInfo::from_json(&String::from_utf8_lossy(&bytes))?,
            None => ApkmInfo::default(),
        };
        let icon = read_entry(&mut zip, ICON_ENTRY, MAX_ICON_BYTES)?;

        let stem = archive
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package".to_string());
        let package_id = info.pname.clone().unwrap_or_else(|| stem.clone());
        let display_name = info.app_name.clone().unwrap_or_else(|| package_id.clone());

        Ok(PackageDescriptor {
            display_name,
            version_name: info
                .release_version
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            version_code: info.version_code()?.unwrap_or(0),
            package_id,
            icon,
            permissions: info.permissions,
            payload_paths: payloads,
            total_size: total_bytes,
        })
    }
}

impl PayloadSource for ApkmExtractor {
    fn extract(&self, archive: &Path) -> Result<PackageDescriptor, PayloadError> {
        let run_dir = self.extract_root().join(Uuid::new_v4().to_string());
        fs::create_dir_all(&run_dir).map_err(|e| PayloadError::io(&run_dir, &e))?;

        self.emit_payload(PayloadEvent::ExtractionStarted {
            archive: archive.to_path_buf(),
            target: run_dir.clone(),
        });

        match self.extract_into(archive, &run_dir) {
            Ok(descriptor) => {
                self.emit_payload(PayloadEvent::ExtractionCompleted {
                    package_id: descriptor.package_id.clone(),
                    payloads: descriptor.payload_count(),
                    total_bytes: descriptor.total_size,
                });
                Ok(descriptor)
            }
            Err(err) => {
                // Best effort: partial output is useless once extraction failed
                let _ = fs::remove_dir_all(&run_dir);
                self.emit_payload(PayloadEvent::ExtractionFailed {
                    archive: archive.to_path_buf(),
                    failure: FailureContext::from_error(&err),
                });
                Err(err)
            }
        }
    }
}

fn not_an_archive(archive: &Path, err: &zip::result::ZipError) -> PayloadError {
    PayloadError::NotAnArchive {
        path: archive.display().to_string(),
        message: err.to_string(),
    }
}

fn read_entry(
    zip: &mut ZipArchive<File>,
    name: &str,
    limit: u64,
) -> Result<Option<Vec<u8>>, PayloadError> {
    let entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => {
            return Err(PayloadError::InvalidMetadata {
                message: format!("{name}: {e}"),
            })
        }
    };
    let mut bytes = Vec::new();
    entry
        .take(limit)
        .read_to_end(&mut bytes)
        .map_err(|e| PayloadError::InvalidMetadata {
            message: format!("{name}: {e}"),
        })?;
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn nested_entries_are_flattened() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("nested.apkm");
        write_zip(&archive, &[("splits/nested/base.apk", b"base")]);

        let extractor = ApkmExtractor::new(temp.path().join("cache"), 1024);
        let desc = extractor.extract(&archive).unwrap();
        let base = &desc.payload_paths[0];
        assert_eq!(base.file_name().unwrap(), "base.apk");
        assert!(base.starts_with(extractor.extract_root()));
    }

    #[test]
    fn same_name_in_two_folders_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("twice.apkm");
        write_zip(&archive, &[("a/base.apk", b"first"), ("b/base.apk", b"second")]);

        let extractor = ApkmExtractor::new(temp.path().join("cache"), 1024);
        let err = extractor.extract(&archive).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::DuplicatePayload { ref name } if name == "base.apk"
        ));
        // The partial run directory is removed
        let leftovers = fs::read_dir(extractor.extract_root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn base_payload_sorted_first() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("order.apkm");
        write_zip(
            &archive,
            &[
                ("split_config.en.apk", b"en"),
                ("base.apk", b"base"),
                ("split_config.xxhdpi.apk", b"dpi"),
            ],
        );

        let desc = ApkmExtractor::new(temp.path(), 1024).extract(&archive).unwrap();
        let names: Vec<_> = desc
            .payload_paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            ["base.apk", "split_config.en.apk", "split_config.xxhdpi.apk"]
        );
        assert_eq!(desc.total_size, 9);
    }
}
