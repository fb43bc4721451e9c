//! Integration tests for payload extraction

#[cfg(test)]
mod tests {
    use apkm_errors::PayloadError;
    use apkm_payload::{ApkmExtractor, PayloadSource};
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_reads_metadata_and_icon() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("example.apkm");
        write_zip(
            &archive,
            &[
                (
                    "info.json",
                    br#"{"app_name":"Example","pname":"com.example.app","release_version":"2.4.1","versioncode":"2041","permissions":["android.permission.CAMERA"]}"#,
                ),
                ("icon.png", b"\x89PNG"),
                ("base.apk", b"base-bytes"),
                ("split_config.arm64_v8a.apk", b"abi"),
            ],
        );

        let (tx, mut rx) = apkm_events::channel();
        let extractor = ApkmExtractor::new(temp.path().join("cache"), 1024).with_event_sender(tx);
        let desc = extractor.extract(&archive).unwrap();

        assert_eq!(desc.display_name, "Example");
        assert_eq!(desc.package_id, "com.example.app");
        assert_eq!(desc.version_name, "2.4.1");
        assert_eq!(desc.version_code, 2041);
        assert_eq!(desc.permissions, vec!["android.permission.CAMERA"]);
        assert_eq!(desc.icon.as_deref(), Some(&b"\x89PNG"[..]));
        assert_eq!(desc.payload_count(), 2);
        assert_eq!(desc.total_size, 13);
        assert!(desc.payload_paths.iter().all(|p| p.exists()));

        let mut saw_completed = false;
        while let Ok(event) = rx.try_recv() {
            if let apkm_events::AppEvent::Payload(apkm_events::PayloadEvent::ExtractionCompleted {
                payloads,
                ..
            }) = event
            {
                assert_eq!(payloads, 2);
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }

    #[test]
    fn test_metadata_falls_back_to_archive_name() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("org.sample.tool.apkm");
        write_zip(&archive, &[("base.apk", b"base")]);

        let desc = ApkmExtractor::new(temp.path(), 1024)
            .extract(&archive)
            .unwrap();
        assert_eq!(desc.package_id, "org.sample.tool");
        assert_eq!(desc.display_name, "org.sample.tool");
        assert_eq!(desc.version_name, "unknown");
        assert_eq!(desc.version_code, 0);
        assert!(desc.icon.is_none());
    }

    #[test]
    fn test_size_limit_enforced_and_partial_output_removed() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("bomb.apkm");
        let big = vec![0u8; 4096];
        write_zip(&archive, &[("base.apk", &big), ("split.apk", &big)]);

        let extractor = ApkmExtractor::new(temp.path().join("cache"), 6000);
        let err = extractor.extract(&archive).unwrap_err();
        assert!(matches!(err, PayloadError::SizeLimitExceeded { limit: 6000 }));

        let leftovers = std::fs::read_dir(extractor.extract_root()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_not_an_archive() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("plain.apkm");
        std::fs::write(&archive, b"definitely not a zip").unwrap();

        let err = ApkmExtractor::new(temp.path(), 1024)
            .extract(&archive)
            .unwrap_err();
        assert!(matches!(err, PayloadError::NotAnArchive { .. }));
    }

    #[test]
    fn test_archive_without_apks() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("empty.apkm");
        write_zip(&archive, &[("README.txt", b"hello")]);

        let err = ApkmExtractor::new(temp.path(), 1024)
            .extract(&archive)
            .unwrap_err();
        assert!(matches!(err, PayloadError::NoInstallablePayload));
    }

    #[test]
    fn test_clear_cache() {
        let temp = tempdir().unwrap();
        let archive = temp.path().join("a.apkm");
        write_zip(&archive, &[("base.apk", b"base")]);

        let extractor = ApkmExtractor::new(temp.path().join("cache"), 1024);
        let desc = extractor.extract(&archive).unwrap();
        assert!(desc.payload_paths[0].exists());

        extractor.clear_cache().unwrap();
        assert!(!extractor.extract_root().exists());
        // Clearing twice is fine
        extractor.clear_cache().unwrap();
    }
}
