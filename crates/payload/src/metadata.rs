//! `info.json` metadata shipped inside bundles

use apkm_errors::PayloadError;
use serde::Deserialize;

/// Metadata file written by bundle producers next to the APKs.
///
/// Every field is optional; producers disagree on which ones they fill in
/// and whether the version code is a number or a string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApkmInfo {
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub pname: Option<String>,
    #[serde(default)]
    pub release_version: Option<String>,
    #[serde(default)]
    versioncode: Option<VersionCode>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum VersionCode {
    Number(i64),
    Text(String),
}

impl ApkmInfo {
    /// Parse metadata from raw JSON
    ///
    /// # Errors
    ///
    /// Returns `InvalidMetadata` if the JSON is malformed or the version code
    /// is not an integer.
    pub fn from_json(content: &str) -> Result<Self, PayloadError> {
        let info: Self =
            serde_json::from_str(content).map_err(|e| PayloadError::InvalidMetadata {
                message: e.to_string(),
            })?;
        info.version_code()?;
        Ok(info)
    }

    /// Version ordinal, when present
    ///
    /// # Errors
    ///
    /// Returns `InvalidMetadata` for a non-numeric textual version code.
    pub fn version_code(&self) -> Result<Option<i64>, PayloadError> {
        match &self.versioncode {
            None => Ok(None),
            Some(VersionCode::Number(code)) => Ok(Some(*code)),
            Some(VersionCode::Text(text)) => text.trim().parse().map(Some).map_err(|_| {
                PayloadError::InvalidMetadata {
                    message: format!("version code is not an integer: {text}"),
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numeric_and_textual_version_codes() {
        let numeric = ApkmInfo::from_json(r#"{"pname":"a.b","versioncode":42}"#).unwrap();
        assert_eq!(numeric.version_code().unwrap(), Some(42));

        let textual = ApkmInfo::from_json(r#"{"pname":"a.b","versioncode":"1337"}"#).unwrap();
        assert_eq!(textual.version_code().unwrap(), Some(1337));
    }

    #[test]
    fn rejects_garbage_version_code() {
        let err = ApkmInfo::from_json(r#"{"versioncode":"one"}"#).unwrap_err();
        assert!(matches!(err, PayloadError::InvalidMetadata { .. }));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let info = ApkmInfo::from_json(
            r#"{"app_name":"Example","pname":"com.example","min_api":"24","arches":["arm64-v8a"]}"#,
        )
        .unwrap();
        assert_eq!(info.app_name.as_deref(), Some("Example"));
        assert!(info.permissions.is_empty());
        assert_eq!(info.version_code().unwrap(), None);
    }
}
