//! Integration tests for types

#[cfg(test)]
mod tests {
    use apkm_types::*;
    use std::path::PathBuf;

    fn descriptor(paths: Vec<PathBuf>) -> PackageDescriptor {
        PackageDescriptor {
            display_name: "Example".to_string(),
            package_id: "com.example.app".to_string(),
            version_name: "1.2.3".to_string(),
            version_code: 123,
            icon: None,
            permissions: vec!["android.permission.INTERNET".to_string()],
            payload_paths: paths,
            total_size: 0,
        }
    }

    #[test]
    fn test_missing_payloads_reports_only_absent_files() {
        let temp = std::env::temp_dir().join(format!("apkm-types-{}", std::process::id()));
        std::fs::create_dir_all(&temp).unwrap();
        let present = temp.join("base.apk");
        std::fs::write(&present, b"base").unwrap();
        let absent = temp.join("split_config.arm64_v8a.apk");

        let desc = descriptor(vec![present.clone(), absent.clone()]);
        assert_eq!(desc.missing_payloads(), vec![absent.as_path()]);

        std::fs::remove_dir_all(&temp).unwrap();
    }

    #[test]
    fn test_descriptor_json_skips_icon() {
        let mut desc = descriptor(vec![PathBuf::from("/tmp/base.apk")]);
        desc.icon = Some(vec![0x89, b'P', b'N', b'G']);
        let json = serde_json::to_value(&desc).unwrap();
        assert!(json.get("icon").is_none());
        assert_eq!(json["package_id"], "com.example.app");
    }

    #[test]
    fn test_phase_round_trips_through_json() {
        let phase = Phase::success("com.example.app");
        let json = serde_json::to_string(&phase).unwrap();
        assert_eq!(json, r#"{"phase":"success","package_id":"com.example.app"}"#);
        let back: Phase = serde_json::from_str(&json).unwrap();
        assert_eq!(back, phase);
    }

    #[test]
    fn test_color_choice_serialization() {
        let json = serde_json::to_string(&ColorChoice::Never).unwrap();
        assert_eq!(json, r#""never""#);
    }
}
