use std::fmt;

use regex::Regex;

use super::{InstructionError, InstructionResult};
use crate::header::DUPLICATE_MARKER;

const METACHARS: &[char] = &['*', '?', '[', ']', '{', '}', '(', ')', '|', '+', '^', '\\'];

/// One name pattern.
///
/// Syntax:
/// - `!p` negates the match,
/// - `=p` matches `p` literally, even if it contains metacharacters,
/// - a trailing `~` marks an allowed duplicate name,
/// - a trailing `:i` makes the match case insensitive,
/// - `*` and `?` are wildcards, while `{n,m}`, brackets and groups pass
///   through to the regex engine,
/// - `com.acme.*` also matches `com.acme` itself.
#[derive(Debug, Clone)]
pub struct Instruction {
    input: String,
    pattern: String,
    negated: bool,
    literal: bool,
    duplicate: bool,
    case_insensitive: bool,
    matcher: Option<Regex>,
}

impl Instruction {
    pub fn new(input: &str) -> InstructionResult<Self> {
        let mut text = input.trim();
        if text.is_empty() {
            return Err(InstructionError::Empty);
        }

        let mut duplicate = false;
        while let Some(stripped) = text.strip_suffix(DUPLICATE_MARKER) {
            duplicate = true;
            text = stripped;
        }

        let mut case_insensitive = false;
        if let Some(stripped) = text.strip_suffix(":i") {
            case_insensitive = true;
            text = stripped;
        }

        let mut negated = false;
        if let Some(stripped) = text.strip_prefix('!') {
            negated = true;
            text = stripped;
        }

        let mut literal = false;
        if let Some(stripped) = text.strip_prefix('=') {
            literal = true;
            text = stripped;
        } else if !text.contains(METACHARS) {
            literal = true;
        }

        let matcher = if literal {
            None
        } else {
            let mut source = String::from(if case_insensitive { "(?i)^" } else { "^" });
            source.push_str(&glob_to_regex(text));
            source.push('$');
            Some(Regex::new(&source).map_err(|e| InstructionError::InvalidPattern {
                pattern: input.to_string(),
                reason: e.to_string(),
            })?)
        };

        Ok(Self {
            input: input.trim().to_string(),
            pattern: text.to_string(),
            negated,
            literal,
            duplicate,
            case_insensitive,
            matcher,
        })
    }

    /// True if `candidate` matches the pattern, ignoring negation.
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.matcher {
            Some(regex) => regex.is_match(candidate),
            None if self.case_insensitive => self.pattern.eq_ignore_ascii_case(candidate),
            None => self.pattern == candidate,
        }
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn is_literal(&self) -> bool {
        self.literal
    }

    pub fn is_duplicate(&self) -> bool {
        self.duplicate
    }

    /// `*` without negation.
    pub fn is_any(&self) -> bool {
        !self.negated && !self.literal && self.pattern == "*"
    }

    /// The pattern without markers.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The literal name, for literal instructions.
    pub fn literal(&self) -> Option<&str> {
        self.literal.then_some(self.pattern.as_str())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.input)
    }
}

impl PartialEq for Instruction {
    fn eq(&self, other: &Self) -> bool {
        self.input == other.input
    }
}

impl Eq for Instruction {}

fn glob_to_regex(glob: &str) -> String {
    let (body, subpackages) = match glob.strip_suffix(".*") {
        Some(prefix) if !prefix.is_empty() => (prefix, true),
        _ => (glob, false),
    };
    let mut regex = String::with_capacity(glob.len() * 2);
    for c in body.chars() {
        match c {
            '.' => regex.push_str("\\."),
            '$' => regex.push_str("\\$"),
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            _ => regex.push(c),
        }
    }
    if subpackages {
        regex.push_str("(\\..*)?");
    }
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal() {
        let i = Instruction::new("com.acme").unwrap();
        assert!(i.is_literal());
        assert!(i.matches("com.acme"));
        assert!(!i.matches("com.acme.api"));
        assert!(!i.matches("comXacme"));
    }

    #[test]
    fn test_wildcard_includes_parent() {
        let i = Instruction::new("com.acme.*").unwrap();
        assert!(!i.is_literal());
        assert!(i.matches("com.acme"));
        assert!(i.matches("com.acme.api"));
        assert!(i.matches("com.acme.api.spi"));
        assert!(!i.matches("com.acmeX"));
    }

    #[test]
    fn test_any() {
        let i = Instruction::new("*").unwrap();
        assert!(i.is_any());
        assert!(i.matches("anything.at.all"));
        assert!(!Instruction::new("!*").unwrap().is_any());
    }

    #[test]
    fn test_markers() {
        let i = Instruction::new("!com.acme.impl~").unwrap();
        assert!(i.is_negated());
        assert!(i.is_duplicate());
        assert!(i.matches("com.acme.impl"));
        assert_eq!(i.pattern(), "com.acme.impl");
        assert_eq!(i.to_string(), "!com.acme.impl~");
    }

    #[test]
    fn test_forced_literal() {
        let i = Instruction::new("=a.b*").unwrap();
        assert!(i.is_literal());
        assert!(i.matches("a.b*"));
        assert!(!i.matches("a.bc"));
    }

    #[test]
    fn test_regex_passthrough() {
        let i = Instruction::new("com.(foo|bar).x{1,2}").unwrap();
        assert!(i.matches("com.foo.x"));
        assert!(i.matches("com.bar.xx"));
        assert!(!i.matches("com.baz.x"));

        let q = Instruction::new("a?c").unwrap();
        assert!(q.matches("abc"));
        assert!(!q.matches("ac"));
    }

    #[test]
    fn test_case_insensitive() {
        let i = Instruction::new("COM.Acme:i").unwrap();
        assert!(i.matches("com.acme"));
        let g = Instruction::new("COM.*:i").unwrap();
        assert!(g.matches("com.acme"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            Instruction::new("a(b"),
            Err(InstructionError::InvalidPattern { .. })
        ));
        assert!(matches!(Instruction::new("  "), Err(InstructionError::Empty)));
    }
}
