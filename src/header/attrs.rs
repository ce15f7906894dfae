//! Typed attributes and directives of one header clause.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::version::Version;
use super::{quote_if_needed, HeaderError, HeaderResult};

static TYPED_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*([-0-9a-zA-Z._]+)\s*:\s*(String|Version|Long|Double|List\s*<\s*(String|Version|Long|Double)\s*>)\s*$",
    )
    .expect("invalid typed key regex")
});

/// Declared type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttrType {
    #[default]
    String,
    Long,
    Double,
    Version,
    StringList,
    LongList,
    DoubleList,
    VersionList,
}

impl AttrType {
    fn scalar(name: &str) -> Option<Self> {
        match name {
            "String" => Some(AttrType::String),
            "Long" => Some(AttrType::Long),
            "Double" => Some(AttrType::Double),
            "Version" => Some(AttrType::Version),
            _ => None,
        }
    }

    fn list_of(self) -> Self {
        match self {
            AttrType::String | AttrType::StringList => AttrType::StringList,
            AttrType::Long | AttrType::LongList => AttrType::LongList,
            AttrType::Double | AttrType::DoubleList => AttrType::DoubleList,
            AttrType::Version | AttrType::VersionList => AttrType::VersionList,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(
            self,
            AttrType::StringList | AttrType::LongList | AttrType::DoubleList | AttrType::VersionList
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            AttrType::String => "String",
            AttrType::Long => "Long",
            AttrType::Double => "Double",
            AttrType::Version => "Version",
            AttrType::StringList => "List<String>",
            AttrType::LongList => "List<Long>",
            AttrType::DoubleList => "List<Double>",
            AttrType::VersionList => "List<Version>",
        }
    }

    fn validate(&self, key: &str, value: &str) -> HeaderResult<()> {
        let invalid = || HeaderError::InvalidTypedValue {
            key: key.to_string(),
            ty: self.name().to_string(),
            value: value.to_string(),
        };
        let items: Vec<&str> = if self.is_list() {
            split_list(value)
        } else {
            vec![value.trim()]
        };
        for item in items {
            let ok = match self {
                AttrType::Long | AttrType::LongList => item.parse::<i64>().is_ok(),
                AttrType::Double | AttrType::DoubleList => item.parse::<f64>().is_ok(),
                AttrType::Version | AttrType::VersionList => Version::is_version(item),
                AttrType::String | AttrType::StringList => true,
            };
            if !ok {
                return Err(invalid());
            }
        }
        Ok(())
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    key: String,
    value: String,
    ty: AttrType,
}

/// Ordered attributes and directives of one clause.
///
/// Directive keys keep their trailing `:`, so `uses:` and `uses` are
/// different keys and never collide.
#[derive(Debug, Clone, Default, Eq)]
pub struct Attrs {
    entries: Vec<Entry>,
}

impl Attrs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value. A key of the form `name:Type` declares the value's type.
    pub fn put(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(caps) = TYPED_KEY.captures(key) {
            let name = caps[1].to_string();
            let ty = match caps.get(3) {
                Some(inner) => AttrType::scalar(inner.as_str()).map(AttrType::list_of),
                None => AttrType::scalar(&caps[2]),
            }
            .unwrap_or_default();
            self.insert(name, value, ty);
        } else {
            self.insert(key.trim().to_string(), value, AttrType::String);
        }
    }

    /// Sets a value with an explicit type, checking that it parses as that type.
    pub fn put_typed(&mut self, key: &str, value: impl Into<String>, ty: AttrType) -> HeaderResult<()> {
        let value = value.into();
        ty.validate(key, &value)?;
        self.insert(key.trim().to_string(), value, ty);
        Ok(())
    }

    fn insert(&mut self, key: String, value: String, ty: AttrType) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => {
                entry.value = value;
                entry.ty = ty;
            }
            None => self.entries.push(Entry { key, value, ty }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    }

    pub fn get_type(&self, key: &str) -> Option<AttrType> {
        self.entries.iter().find(|e| e.key == key).map(|e| e.ty)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.key == key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let index = self.entries.iter().position(|e| e.key == key)?;
        Some(self.entries.remove(index).value)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|e| keep(&e.key, &e.value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|e| (e.key.as_str(), e.value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_directive(key: &str) -> bool {
        key.ends_with(':')
    }

    pub fn version(&self) -> Option<&str> {
        self.get("version")
    }

    pub fn get_long(&self, key: &str) -> Option<i64> {
        self.get(key)?.trim().parse().ok()
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        self.get(key)?.trim().parse().ok()
    }

    pub fn get_version(&self, key: &str) -> Option<Version> {
        Version::parse(self.get(key)?).ok()
    }

    /// Comma separated items of a value, trimmed.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| split_list(v).into_iter().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn get_versions(&self, key: &str) -> Vec<Version> {
        self.get_list(key)
            .iter()
            .filter_map(|v| Version::parse(v).ok())
            .collect()
    }

    /// Copies entries from `other`. Existing keys are kept unless `overwrite`.
    pub fn merge_with(&mut self, other: &Attrs, overwrite: bool) {
        for entry in &other.entries {
            if overwrite || !self.contains_key(&entry.key) {
                self.insert(entry.key.clone(), entry.value.clone(), entry.ty);
            }
        }
    }

    pub fn put_all(&mut self, other: &Attrs) {
        self.merge_with(other, true);
    }
}

/// Splits a list value on commas, trimming items and dropping empty ones.
pub(crate) fn split_list(value: &str) -> Vec<&str> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

impl PartialEq for Attrs {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self.entries.iter().all(|e| {
                other
                    .entries
                    .iter()
                    .any(|o| o.key == e.key && o.value == e.value && o.ty == e.ty)
            })
    }
}

impl fmt::Display for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            f.write_str(&entry.key)?;
            if entry.ty != AttrType::String {
                write!(f, ":{}", entry.ty)?;
            }
            write!(f, "={}", quote_if_needed(&entry.value))?;
        }
        Ok(())
    }
}
