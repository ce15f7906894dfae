//! Version policy: export versions and import ranges.
//!
//! Import ranges come from a policy template evaluated against the
//! exporter's version. The consumer default `${range;[==,+)}` turns `1.2.3`
//! into `[1.2,2)`; the provider default `${range;[==,=+)}` narrows it to
//! `[1.2,1.3)`.

pub mod contracts;

use thiserror::Error;

use crate::graph::PackageInfo;
use crate::header::version::{apply_mask, range_from_mask};
use crate::header::{cleanup_version, HeaderError, Version};

pub const DEFAULT_CONSUMER_POLICY: &str = "${range;[==,+)}";
pub const DEFAULT_PROVIDER_POLICY: &str = "${range;[==,=+)}";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error(transparent)]
    Header(#[from] HeaderError),

    #[error("unknown macro ${{{0}}}")]
    UnknownMacro(String),

    #[error("unterminated macro in {0}")]
    UnterminatedMacro(String),

    #[error("macro ${{{0}}} needs a version but none is set")]
    MissingVersion(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

/// Where an export version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    Instruction,
    Annotation,
    PackageInfo,
    BundleVersion,
}

/// Policy settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPolicy {
    pub consumer: String,
    pub provider: String,
    pub bundle_version: Option<String>,
    /// Do not fall back to the bundle version for unversioned exports.
    pub no_default_version: bool,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self {
            consumer: DEFAULT_CONSUMER_POLICY.to_string(),
            provider: DEFAULT_PROVIDER_POLICY.to_string(),
            bundle_version: None,
            no_default_version: false,
        }
    }
}

impl VersionPolicy {
    /// The version of an exported package.
    ///
    /// Priority: the instruction's explicit version, the `@Version`
    /// annotation, the `packageinfo` marker, then the bundle version unless
    /// default versions are disabled. The result is cleaned up.
    pub fn version_for(&self, explicit: Option<&str>, info: Option<&PackageInfo>) -> Option<(String, VersionSource)> {
        let annotated = info.and_then(|i| i.annotated_version.as_deref());
        let marker = info.and_then(|i| i.marker_version.as_deref());
        let bundle = if self.no_default_version {
            None
        } else {
            self.bundle_version.as_deref()
        };
        let (version, source) = explicit
            .map(|v| (v, VersionSource::Instruction))
            .or_else(|| annotated.map(|v| (v, VersionSource::Annotation)))
            .or_else(|| marker.map(|v| (v, VersionSource::PackageInfo)))
            .or_else(|| bundle.map(|v| (v, VersionSource::BundleVersion)))?;
        Some((cleanup_version(version), source))
    }

    /// The import range for a package exported at `export_version`.
    ///
    /// An explicit `import_range` wins and may refer to the export version
    /// through `${@}`; otherwise the provider or consumer template applies.
    pub fn range_for(&self, export_version: &str, import_range: Option<&str>, provider: bool) -> PolicyResult<String> {
        let template = match import_range {
            Some(range) => cleanup_version(range),
            None if provider => self.provider.clone(),
            None => self.consumer.clone(),
        };
        expand(&template, Some(&cleanup_version(export_version)))
    }
}

/// Expands `${@}`, `${range;MASK[;VERSION]}` and `${version;MASK[;VERSION]}`.
///
/// `at` is the value of `${@}` and the default version for the mask
/// macros. Innermost macros are expanded first.
///
/// # Example
///
/// ```rust
/// use bundlescope::policy::expand;
///
/// assert_eq!(expand("${range;[==,+)}", Some("1.2.3")).unwrap(), "[1.2,2)");
/// assert_eq!(expand("[${version;==;${@}},3)", Some("1.2.3")).unwrap(), "[1.2,3)");
/// ```
pub fn expand(template: &str, at: Option<&str>) -> PolicyResult<String> {
    let mut text = template.to_string();
    while let Some(start) = text.rfind("${") {
        let end = text[start..]
            .find('}')
            .map(|offset| start + offset)
            .ok_or_else(|| PolicyError::UnterminatedMacro(template.to_string()))?;
        let value = evaluate(&text[start + 2..end], at)?;
        text.replace_range(start..=end, &value);
    }
    Ok(text)
}

fn evaluate(body: &str, at: Option<&str>) -> PolicyResult<String> {
    let args: Vec<&str> = body.split(';').map(str::trim).collect();
    let version_arg = |name: &str| -> PolicyResult<Version> {
        let text = args
            .get(2)
            .copied()
            .or(at)
            .ok_or_else(|| PolicyError::MissingVersion(name.to_string()))?;
        Ok(Version::parse(&cleanup_version(text))?)
    };
    match args.as_slice() {
        ["@"] => at
            .map(str::to_string)
            .ok_or_else(|| PolicyError::MissingVersion("@".to_string())),
        ["range", mask, ..] => Ok(range_from_mask(mask, &version_arg("range")?)?),
        ["version", mask, ..] => Ok(apply_mask(mask, &version_arg("version")?)),
        _ => Err(PolicyError::UnknownMacro(body.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(annotated: Option<&str>, marker: Option<&str>) -> PackageInfo {
        PackageInfo {
            annotated_version: annotated.map(str::to_string),
            marker_version: marker.map(str::to_string),
            ..PackageInfo::default()
        }
    }

    #[test]
    fn test_version_priority() {
        let policy = VersionPolicy {
            bundle_version: Some("9.9.9".into()),
            ..VersionPolicy::default()
        };
        let both = info(Some("2.0"), Some("1.0"));
        assert_eq!(
            policy.version_for(Some("3.0"), Some(&both)),
            Some(("3.0".to_string(), VersionSource::Instruction))
        );
        assert_eq!(
            policy.version_for(None, Some(&both)),
            Some(("2.0".to_string(), VersionSource::Annotation))
        );
        assert_eq!(
            policy.version_for(None, Some(&info(None, Some("1.0")))),
            Some(("1.0".to_string(), VersionSource::PackageInfo))
        );
        assert_eq!(
            policy.version_for(None, None),
            Some(("9.9.9".to_string(), VersionSource::BundleVersion))
        );
    }

    #[test]
    fn test_no_default_version() {
        let policy = VersionPolicy {
            bundle_version: Some("1.2.3".into()),
            no_default_version: true,
            ..VersionPolicy::default()
        };
        assert_eq!(policy.version_for(None, None), None);
    }

    #[test]
    fn test_version_is_cleaned_up() {
        let policy = VersionPolicy::default();
        assert_eq!(
            policy.version_for(Some("1.2.3-SNAPSHOT"), None).map(|(v, _)| v),
            Some("1.2.3.SNAPSHOT".to_string())
        );
    }

    #[test]
    fn test_provider_and_consumer_ranges() {
        let policy = VersionPolicy::default();
        assert_eq!(policy.range_for("1.2.3", None, true).unwrap(), "[1.2,1.3)");
        assert_eq!(policy.range_for("1.2.3", None, false).unwrap(), "[1.2,2)");
    }

    #[test]
    fn test_explicit_import_range_wins() {
        let policy = VersionPolicy::default();
        assert_eq!(policy.range_for("1.2.3", Some("[1,5)"), false).unwrap(), "[1,5)");
        assert_eq!(policy.range_for("1.2.3", Some("${@}"), false).unwrap(), "1.2.3");
        assert_eq!(
            policy.range_for("1.2.3", Some("${range;[===,=+]}"), true).unwrap(),
            "[1.2.3,1.3]"
        );
    }

    #[test]
    fn test_custom_policy() {
        let policy = VersionPolicy {
            consumer: "${range;[=,+)}".into(),
            ..VersionPolicy::default()
        };
        assert_eq!(policy.range_for("4.1", None, false).unwrap(), "[4,5)");
    }

    #[test]
    fn test_expand_errors() {
        assert!(matches!(expand("${nope}", Some("1")), Err(PolicyError::UnknownMacro(_))));
        assert!(matches!(expand("${range;[==,+)", Some("1")), Err(PolicyError::UnterminatedMacro(_))));
        assert!(matches!(expand("${@}", None), Err(PolicyError::MissingVersion(_))));
        assert!(matches!(expand("${range;bad}", Some("1.0")), Err(PolicyError::Header(_))));
    }
}
