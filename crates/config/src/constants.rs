//! Fixed names and defaults for apkm
//!
//! Directory names are not configurable; only their parent locations are.

pub const APP_DIR: &str = "apkm";
pub const CONFIG_FILE: &str = "config.toml";

pub const SERVICE_DIR: &str = "installer";

/// Background security scans on slow devices can take 90–120 s
pub const DEFAULT_INSTALL_TIMEOUT_SECS: u64 = 180;

/// 2 GiB decompression cap
pub const DEFAULT_MAX_EXTRACT_BYTES: u64 = 2 * 1024 * 1024 * 1024;
