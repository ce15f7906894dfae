//! Ordered header clauses.

use std::fmt;

use super::attrs::Attrs;
use super::{HeaderError, HeaderResult};

/// Suffix appended to a clause name that already occurs in the header.
pub const DUPLICATE_MARKER: char = '~';

pub fn is_duplicate(name: &str) -> bool {
    name.ends_with(DUPLICATE_MARKER)
}

pub fn strip_duplicate_marker(name: &str) -> &str {
    name.trim_end_matches(DUPLICATE_MARKER)
}

/// The clauses of one header, in declaration order.
///
/// A name declared twice is kept as a second entry whose key carries a
/// [`DUPLICATE_MARKER`] suffix, so `a;x=1, a;x=2` keeps both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: Vec<(String, Attrs)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `name;key=value;dir:=value, name2, ...`.
    ///
    /// Empty clauses are skipped. Several names may share one set of
    /// attributes: `a;b;version=1` declares both `a` and `b`.
    pub fn parse(header: &str) -> HeaderResult<Self> {
        let mut parameters = Parameters::new();
        for clause in split_unquoted(header, ',')? {
            if clause.trim().is_empty() {
                continue;
            }
            let mut names = Vec::new();
            let mut attrs = Attrs::new();
            for part in split_unquoted(clause, ';')? {
                let part = part.trim();
                if part.is_empty() {
                    continue;
                }
                match find_unquoted(part, '=') {
                    None => {
                        if !attrs.is_empty() {
                            return Err(HeaderError::NameAfterAttributes {
                                name: part.to_string(),
                                clause: clause.trim().to_string(),
                            });
                        }
                        names.push(unquote(part));
                    }
                    Some(at) => {
                        let key = part[..at].trim();
                        let raw = part[at + 1..].trim();
                        if key.is_empty() || key == ":" {
                            return Err(HeaderError::MissingKey {
                                clause: clause.trim().to_string(),
                            });
                        }
                        if Attrs::is_directive(key) && raw.is_empty() {
                            return Err(HeaderError::EmptyDirective {
                                key: key.to_string(),
                                clause: clause.trim().to_string(),
                            });
                        }
                        attrs.put(key, unquote(raw));
                    }
                }
            }
            if names.is_empty() {
                return Err(HeaderError::MissingName {
                    clause: clause.trim().to_string(),
                });
            }
            for name in names {
                parameters.insert(name, attrs.clone());
            }
        }
        Ok(parameters)
    }

    /// Adds a clause, marking the name as a duplicate if it already exists.
    pub fn insert(&mut self, name: impl Into<String>, attrs: Attrs) {
        let mut name = name.into();
        while self.contains_key(&name) {
            name.push(DUPLICATE_MARKER);
        }
        self.entries.push((name, attrs));
    }

    /// Sets the attributes of `name`, replacing an existing clause in place.
    pub fn put(&mut self, name: impl Into<String>, attrs: Attrs) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = attrs,
            None => self.entries.push((name, attrs)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Attrs> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, a)| a)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Attrs> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == name)
            .map(|(_, a)| a)
    }

    pub fn remove(&mut self, name: &str) -> Option<Attrs> {
        let index = self.entries.iter().position(|(k, _)| k == name)?;
        Some(self.entries.remove(index).1)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attrs)> {
        self.entries.iter().map(|(k, a)| (k.as_str(), a))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copies clauses from `other`. Existing names are kept unless `overwrite`.
    pub fn merge_with(&mut self, other: &Parameters, overwrite: bool) {
        for (name, attrs) in other.iter() {
            if overwrite || !self.contains_key(name) {
                self.put(name, attrs.clone());
            }
        }
    }
}

impl FromIterator<(String, Attrs)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, Attrs)>>(iter: I) -> Self {
        let mut parameters = Parameters::new();
        for (name, attrs) in iter {
            parameters.insert(name, attrs);
        }
        parameters
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, attrs)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(strip_duplicate_marker(name))?;
            if !attrs.is_empty() {
                write!(f, ";{}", attrs)?;
            }
        }
        Ok(())
    }
}

/// Splits on `separator` outside double quotes.
fn split_unquoted(text: &str, separator: char) -> HeaderResult<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c == separator && !quoted => {
                parts.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    if quoted {
        return Err(HeaderError::UnterminatedQuote {
            header: text.to_string(),
        });
    }
    parts.push(&text[start..]);
    Ok(parts)
}

fn find_unquoted(text: &str, needle: char) -> Option<usize> {
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            c if c == needle && !quoted => return Some(i),
            _ => {}
        }
    }
    None
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() < 2 || !value.starts_with('"') || !value.ends_with('"') {
        return value.to_string();
    }
    let mut result = String::with_capacity(value.len());
    let mut chars = value[1..value.len() - 1].chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                result.push(next);
                continue;
            }
        }
        result.push(c);
    }
    result
}
