//! Errors and warnings reported by an analysis run.
//!
//! Message texts are deterministic so that `-fixupmessages` rules and
//! callers can match them with regular expressions.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::header::{Attrs, Parameters};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticKind {
    /// A class file could not be decoded.
    Decode,
    /// An instruction header could not be parsed.
    Instruction,
    /// Unused instructions, empty headers and similar.
    Classification,
    /// Activator and version policy problems.
    Policy,
    /// Conflicting contracts.
    Consistency,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagnosticKind,
    pub message: String,
    /// Header the diagnostic is about.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
    /// Clause or class within the header.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Diagnostic {
    pub fn header(&mut self, header: &str) -> &mut Self {
        self.header = Some(header.to_string());
        self
    }

    pub fn context(&mut self, context: impl Into<String>) -> &mut Self {
        self.context = Some(context.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, kind: DiagnosticKind, message: impl Into<String>) -> &mut Diagnostic {
        self.push(Severity::Error, kind, message.into())
    }

    pub fn warning(&mut self, kind: DiagnosticKind, message: impl Into<String>) -> &mut Diagnostic {
        self.push(Severity::Warning, kind, message.into())
    }

    fn push(&mut self, severity: Severity, kind: DiagnosticKind, message: String) -> &mut Diagnostic {
        debug!(%severity, ?kind, %message, "diagnostic");
        self.entries.push(Diagnostic {
            severity,
            kind,
            message,
            header: None,
            context: None,
        });
        let last = self.entries.len() - 1;
        &mut self.entries[last]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter().filter(|d| d.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    /// No errors and no warnings.
    pub fn is_ok(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if every diagnostic matches one of `patterns` and every pattern
    /// matches some diagnostic. Patterns are regular expressions searched
    /// anywhere in the message.
    pub fn check(&self, patterns: &[&str]) -> bool {
        let regexes: Vec<Regex> = patterns.iter().filter_map(|p| pattern_regex(p)).collect();
        let all_expected = self
            .entries
            .iter()
            .all(|d| regexes.iter().any(|r| r.is_match(&d.message)));
        let all_found = regexes
            .iter()
            .all(|r| self.entries.iter().any(|d| r.is_match(&d.message)));
        all_expected && all_found
    }

    /// Rewrites diagnostics with `-fixupmessages` rules.
    ///
    /// Each clause name is a pattern searched in the message. The first
    /// matching rule applies:
    /// - `restrict:=error|warning` limits the rule to one severity,
    /// - `is:=error|warning` changes the severity, `is:=ignore` drops it,
    /// - `replace:=text` rewrites the matched part of the message,
    /// - a rule with neither `is:` nor `replace:` drops the diagnostic.
    pub fn apply_fixups(&mut self, rules: &Parameters) {
        if rules.is_empty() {
            return;
        }
        let compiled: Vec<(Regex, &Attrs)> = rules
            .iter()
            .filter_map(|(pattern, attrs)| {
                pattern_regex(crate::header::strip_duplicate_marker(pattern)).map(|regex| (regex, attrs))
            })
            .collect();

        let mut fixed = Vec::with_capacity(self.entries.len());
        for mut diagnostic in self.entries.drain(..) {
            let rule = compiled.iter().find(|(regex, attrs)| {
                let restricted = match attrs.get("restrict:") {
                    Some("error") => diagnostic.severity == Severity::Error,
                    Some("warning") => diagnostic.severity == Severity::Warning,
                    _ => true,
                };
                restricted && regex.is_match(&diagnostic.message)
            });
            let Some((regex, attrs)) = rule else {
                fixed.push(diagnostic);
                continue;
            };

            let is = attrs.get("is:");
            let replace = attrs.get("replace:");
            if is.is_none() && replace.is_none() {
                continue;
            }
            match is {
                Some("ignore") => continue,
                Some("error") => diagnostic.severity = Severity::Error,
                Some("warning") => diagnostic.severity = Severity::Warning,
                _ => {}
            }
            if let Some(replacement) = replace {
                diagnostic.message = regex.replace_all(&diagnostic.message, replacement).into_owned();
            }
            fixed.push(diagnostic);
        }
        self.entries = fixed;
    }
}

/// A regex for `pattern`, falling back to a literal match when it does not compile.
fn pattern_regex(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .or_else(|_| Regex::new(&regex::escape(pattern)))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        diagnostics
            .error(DiagnosticKind::Policy, "The Bundle Activator a.A is abstract")
            .header("Bundle-Activator")
            .context("a.A");
        diagnostics.warning(DiagnosticKind::Classification, "Unused Export-Package instructions: [baz.*]");
        diagnostics
    }

    #[test]
    fn test_severity_split() {
        let diagnostics = sample();
        assert_eq!(diagnostics.errors().count(), 1);
        assert_eq!(diagnostics.warnings().count(), 1);
        assert!(diagnostics.has_errors());
        assert!(!diagnostics.is_ok());
        let first = diagnostics.iter().next().unwrap();
        assert_eq!(first.header.as_deref(), Some("Bundle-Activator"));
        assert_eq!(first.to_string(), "error: The Bundle Activator a.A is abstract");
    }

    #[test]
    fn test_check() {
        let diagnostics = sample();
        assert!(diagnostics.check(&["is abstract", "Unused Export-Package instructions: \\[baz"]));
        assert!(!diagnostics.check(&["is abstract"]));
        assert!(!diagnostics.check(&["is abstract", "Unused", "never"]));
        assert!(Diagnostics::new().check(&[]));
    }

    #[test]
    fn test_fixup_ignore_and_downgrade() {
        let mut diagnostics = sample();
        let rules = Parameters::parse("\"is abstract\";is:=warning, Unused").unwrap();
        diagnostics.apply_fixups(&rules);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics.warnings().count(), 1);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn test_fixup_restrict_and_replace() {
        let mut diagnostics = sample();
        let rules = Parameters::parse("Unused;restrict:=error;is:=ignore, baz;replace:=qux").unwrap();
        diagnostics.apply_fixups(&rules);
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.check(&["is abstract", "instructions: \\[qux"]));
    }

    #[test]
    fn test_invalid_pattern_matches_literally() {
        let regex = pattern_regex("[baz.*").unwrap();
        assert!(regex.is_match("Unused [baz.* here"));
    }
}
