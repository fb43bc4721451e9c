//! Integration tests for config

#[cfg(test)]
mod tests {
    use apkm_config::*;
    use apkm_types::{ColorChoice, OutputFormat};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to ensure env var tests don't run concurrently
    static ENV_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[tokio::test]
    async fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[general]
default_output = "plain"
color = "never"

[install]
timeout = 45
timeout_scope = "whole_session"

[payload]
max_extract_bytes = 1048576
cache_dir = "/tmp/apkm-cache"

[service]
root = "/tmp/apkm-root"
notification_delay_ms = 250
require_user_action = true
        "#
        )
        .unwrap();

        let config = Config::load_from_file(temp_file.path()).await.unwrap();
        assert_eq!(config.general.default_output, OutputFormat::Plain);
        assert_eq!(config.general.color, ColorChoice::Never);
        assert_eq!(config.install.timeout, 45);
        assert_eq!(config.install.timeout_scope, TimeoutScope::WholeSession);
        assert_eq!(config.payload.max_extract_bytes, 1_048_576);
        assert_eq!(config.cache_dir(), std::path::PathBuf::from("/tmp/apkm-cache"));
        assert_eq!(config.service_root(), std::path::PathBuf::from("/tmp/apkm-root"));
        assert_eq!(config.service.notification_delay_ms, 250);
        assert!(config.service.require_user_action);
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.install.timeout, constants::DEFAULT_INSTALL_TIMEOUT_SECS);
        assert_eq!(config.install.timeout_scope, TimeoutScope::AwaitOutcome);
        assert_eq!(
            config.payload.max_extract_bytes,
            constants::DEFAULT_MAX_EXTRACT_BYTES
        );
        assert!(!config.service.require_user_action);
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[install]\ntimeout = 0").unwrap();
        assert!(Config::load_from_file(temp_file.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[install\ntimeout = ").unwrap();
        let err = Config::load_from_file(temp_file.path()).await.unwrap_err();
        assert!(err.to_string().contains("parse error"));
    }

    #[test]
    fn test_merge_env() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::set_var("APKM_OUTPUT", "json");
        std::env::set_var("APKM_INSTALL_TIMEOUT", "30");
        std::env::set_var("APKM_TIMEOUT_SCOPE", "whole_session");

        let mut config = Config::default();
        config.merge_env().unwrap();

        assert_eq!(config.general.default_output, OutputFormat::Json);
        assert_eq!(config.install.timeout, 30);
        assert_eq!(config.install.timeout_scope, TimeoutScope::WholeSession);

        std::env::remove_var("APKM_OUTPUT");
        std::env::remove_var("APKM_INSTALL_TIMEOUT");
        std::env::remove_var("APKM_TIMEOUT_SCOPE");
    }

    #[test]
    fn test_merge_env_invalid_value() {
        let _guard = ENV_TEST_MUTEX.lock().unwrap();

        std::env::set_var("APKM_REQUIRE_USER_ACTION", "sometimes");
        let mut config = Config::default();
        assert!(config.merge_env().is_err());
        std::env::remove_var("APKM_REQUIRE_USER_ACTION");
    }
}
