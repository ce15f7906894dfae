//! Analyzer configuration.
//!
//! The instruction headers and toggles that drive one analysis run. A
//! configuration file is a JSON object keyed by header name:
//!
//! ```json
//! {
//!   "Export-Package": "com.acme.api.*;version=1.2",
//!   "Import-Package": "!com.acme.test, *",
//!   "Bundle-Version": "1.2.3",
//!   "-pedantic": true
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors that can occur while loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the file from disk.
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse JSON content.
    #[error("Failed to parse config JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub const EXPORT_PACKAGE: &str = "Export-Package";
pub const IMPORT_PACKAGE: &str = "Import-Package";
pub const PRIVATE_PACKAGE: &str = "Private-Package";
pub const EXPORT_CONTENTS: &str = "-exportcontents";
pub const CONDITIONAL_PACKAGE: &str = "-conditionalpackage";
pub const BUNDLE_ACTIVATOR: &str = "Bundle-Activator";
pub const CONTRACT: &str = "-contract";
pub const DYNAMICIMPORT_PACKAGE: &str = "DynamicImport-Package";
pub const REMOVE_HEADERS: &str = "-removeheaders";
pub const FIXUP_MESSAGES: &str = "-fixupmessages";
pub const BUNDLE_VERSION: &str = "Bundle-Version";
pub const PROVIDER_POLICY: &str = "-provider-policy";
pub const CONSUMER_POLICY: &str = "-consumer-policy";
pub const PEDANTIC: &str = "-pedantic";
pub const STRICT: &str = "-strict";
pub const NO_CLASS_FOR_NAME: &str = "-noclassforname";
pub const NO_USES: &str = "-nouses";
pub const NO_DEFAULT_VERSION: &str = "-nodefaultversion";

const KNOWN_PROPERTIES: &[&str] = &[
    EXPORT_PACKAGE,
    IMPORT_PACKAGE,
    PRIVATE_PACKAGE,
    EXPORT_CONTENTS,
    CONDITIONAL_PACKAGE,
    BUNDLE_ACTIVATOR,
    CONTRACT,
    DYNAMICIMPORT_PACKAGE,
    REMOVE_HEADERS,
    FIXUP_MESSAGES,
    BUNDLE_VERSION,
    PROVIDER_POLICY,
    CONSUMER_POLICY,
    PEDANTIC,
    STRICT,
    NO_CLASS_FOR_NAME,
    NO_USES,
    NO_DEFAULT_VERSION,
];

/// Instruction headers and toggles for one analysis run.
///
/// Unset headers take their defaults during analysis: `Import-Package`
/// becomes `*` and `-contract` becomes `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(rename = "Export-Package", default, skip_serializing_if = "Option::is_none")]
    pub export_package: Option<String>,
    #[serde(rename = "Import-Package", default, skip_serializing_if = "Option::is_none")]
    pub import_package: Option<String>,
    #[serde(rename = "Private-Package", default, skip_serializing_if = "Option::is_none")]
    pub private_package: Option<String>,
    #[serde(rename = "-exportcontents", default, skip_serializing_if = "Option::is_none")]
    pub export_contents: Option<String>,
    #[serde(rename = "-conditionalpackage", default, skip_serializing_if = "Option::is_none")]
    pub conditional_package: Option<String>,
    #[serde(rename = "Bundle-Activator", default, skip_serializing_if = "Option::is_none")]
    pub bundle_activator: Option<String>,
    #[serde(rename = "-contract", default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    #[serde(rename = "DynamicImport-Package", default, skip_serializing_if = "Option::is_none")]
    pub dynamic_import_package: Option<String>,
    #[serde(rename = "-removeheaders", default, skip_serializing_if = "Option::is_none")]
    pub remove_headers: Option<String>,
    #[serde(rename = "-fixupmessages", default, skip_serializing_if = "Option::is_none")]
    pub fixup_messages: Option<String>,
    #[serde(rename = "Bundle-Version", default, skip_serializing_if = "Option::is_none")]
    pub bundle_version: Option<String>,
    #[serde(rename = "-provider-policy", default, skip_serializing_if = "Option::is_none")]
    pub provider_policy: Option<String>,
    #[serde(rename = "-consumer-policy", default, skip_serializing_if = "Option::is_none")]
    pub consumer_policy: Option<String>,
    #[serde(rename = "-pedantic", default)]
    pub pedantic: bool,
    #[serde(rename = "-strict", default)]
    pub strict: bool,
    #[serde(rename = "-noclassforname", default)]
    pub no_class_for_name: bool,
    #[serde(rename = "-nouses", default)]
    pub no_uses: bool,
    #[serde(rename = "-nodefaultversion", default)]
    pub no_default_version: bool,
}

impl AnalyzerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    /// Parses a JSON configuration, rejecting unknown keys.
    ///
    /// # Example
    ///
    /// ```
    /// use bundlescope::config::AnalyzerConfig;
    ///
    /// let config = AnalyzerConfig::parse_str(r#"{"Export-Package": "com.acme.*", "-pedantic": true}"#).unwrap();
    /// assert_eq!(config.export_package.as_deref(), Some("com.acme.*"));
    /// assert!(config.pedantic);
    /// ```
    pub fn parse_str(content: &str) -> ConfigResult<Self> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        if let Some(object) = value.as_object() {
            if let Some(unknown) = object.keys().find(|k| !KNOWN_PROPERTIES.contains(&k.as_str())) {
                return Err(ConfigError::UnknownProperty(unknown.clone()));
            }
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Sets one property by header name.
    ///
    /// Toggles accept `true` and `false`.
    pub fn set(&mut self, key: &str, value: &str) -> ConfigResult<&mut Self> {
        let text = Some(value.to_string());
        match key {
            EXPORT_PACKAGE => self.export_package = text,
            IMPORT_PACKAGE => self.import_package = text,
            PRIVATE_PACKAGE => self.private_package = text,
            EXPORT_CONTENTS => self.export_contents = text,
            CONDITIONAL_PACKAGE => self.conditional_package = text,
            BUNDLE_ACTIVATOR => self.bundle_activator = text,
            CONTRACT => self.contract = text,
            DYNAMICIMPORT_PACKAGE => self.dynamic_import_package = text,
            REMOVE_HEADERS => self.remove_headers = text,
            FIXUP_MESSAGES => self.fixup_messages = text,
            BUNDLE_VERSION => self.bundle_version = text,
            PROVIDER_POLICY => self.provider_policy = text,
            CONSUMER_POLICY => self.consumer_policy = text,
            PEDANTIC => self.pedantic = parse_toggle(key, value)?,
            STRICT => self.strict = parse_toggle(key, value)?,
            NO_CLASS_FOR_NAME => self.no_class_for_name = parse_toggle(key, value)?,
            NO_USES => self.no_uses = parse_toggle(key, value)?,
            NO_DEFAULT_VERSION => self.no_default_version = parse_toggle(key, value)?,
            _ => return Err(ConfigError::UnknownProperty(key.to_string())),
        }
        Ok(self)
    }
}

fn parse_toggle(key: &str, value: &str) -> ConfigResult<bool> {
    match value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_str() {
        let json = r#"{
            "Export-Package": "com.acme.api",
            "Import-Package": "!com.acme.test, *",
            "Bundle-Version": "1.2.3",
            "-nouses": true
        }"#;
        let config = AnalyzerConfig::parse_str(json).unwrap();
        assert_eq!(config.export_package.as_deref(), Some("com.acme.api"));
        assert_eq!(config.import_package.as_deref(), Some("!com.acme.test, *"));
        assert_eq!(config.bundle_version.as_deref(), Some("1.2.3"));
        assert!(config.no_uses);
        assert!(!config.pedantic);
    }

    #[test]
    fn test_unknown_property() {
        let result = AnalyzerConfig::parse_str(r#"{"Export-Packages": "x"}"#);
        assert!(matches!(result, Err(ConfigError::UnknownProperty(key)) if key == "Export-Packages"));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(AnalyzerConfig::parse_str("{"), Err(ConfigError::JsonError(_))));
    }

    #[test]
    fn test_set() {
        let mut config = AnalyzerConfig::new();
        config
            .set(EXPORT_PACKAGE, "a.*")
            .unwrap()
            .set(PEDANTIC, "true")
            .unwrap();
        assert_eq!(config.export_package.as_deref(), Some("a.*"));
        assert!(config.pedantic);
        assert!(matches!(config.set("Nope", "x"), Err(ConfigError::UnknownProperty(_))));
        assert!(matches!(config.set(STRICT, "yes"), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_round_trip_through_json() {
        let mut config = AnalyzerConfig::new();
        config.set(BUNDLE_ACTIVATOR, "a.Activator").unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(AnalyzerConfig::parse_str(&json).unwrap(), config);
    }
}
