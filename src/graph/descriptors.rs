//! Interned package identities.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

/// Canonical identity of a package.
///
/// Equality and hashing use the interned id, so two refs for the same name
/// from the same [`Descriptors`] always compare equal. Ordering follows
/// the dotted name.
#[derive(Debug, Clone)]
pub struct PackageRef {
    id: u32,
    binary: Arc<str>,
    fqn: Arc<str>,
}

impl PackageRef {
    /// Slash separated name, empty for the default package.
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Dotted name, `.` for the default package.
    pub fn fqn(&self) -> &str {
        &self.fqn
    }

    pub fn is_default(&self) -> bool {
        self.binary.is_empty()
    }

    pub fn is_java(&self) -> bool {
        self.binary.starts_with("java/") || &*self.binary == "java"
    }

    /// `META-INF` and `OSGI-OPT` style resource directories.
    pub fn is_metadata(&self) -> bool {
        self.binary.starts_with("META-INF") || self.binary.starts_with("OSGI-OPT")
    }
}

impl PartialEq for PackageRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PackageRef {}

impl Hash for PackageRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for PackageRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fqn.cmp(&other.fqn).then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for PackageRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fqn)
    }
}

/// Name to [`PackageRef`] interner for one analysis run.
///
/// Lookups take `&self`, so the table can be shared while the model that
/// owns it is read.
#[derive(Debug, Default)]
pub struct Descriptors {
    table: RwLock<HashMap<String, PackageRef>>,
}

impl Descriptors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a package by binary (`a/b`) or dotted (`a.b`) name.
    ///
    /// # Example
    ///
    /// ```rust
    /// use bundlescope::graph::Descriptors;
    ///
    /// let descriptors = Descriptors::new();
    /// let a = descriptors.package_ref("com/acme");
    /// let b = descriptors.package_ref("com.acme");
    /// assert_eq!(a, b);
    /// assert_eq!(a.fqn(), "com.acme");
    /// ```
    pub fn package_ref(&self, name: &str) -> PackageRef {
        let binary = normalize(name);
        if let Some(existing) = self
            .table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&binary)
        {
            return existing.clone();
        }

        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let next_id = table.len() as u32;
        table
            .entry(binary.clone())
            .or_insert_with(|| {
                let fqn = if binary.is_empty() {
                    ".".to_string()
                } else {
                    binary.replace('/', ".")
                };
                PackageRef {
                    id: next_id,
                    binary: Arc::from(binary.as_str()),
                    fqn: Arc::from(fqn),
                }
            })
            .clone()
    }

    /// The package of a binary class name.
    pub fn package_of_class(&self, binary_class: &str) -> PackageRef {
        self.package_ref(crate::classfile::record::package_of(binary_class))
    }

    pub fn len(&self) -> usize {
        self.table.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn normalize(name: &str) -> String {
    let name = name.trim();
    if name == "." {
        return String::new();
    }
    name.trim_matches('/').replace('.', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning() {
        let d = Descriptors::new();
        let a = d.package_ref("a/b");
        let b = d.package_ref("a.b");
        let c = d.package_ref("a.c");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(d.len(), 2);
        assert!(a < c);
    }

    #[test]
    fn test_default_package() {
        let d = Descriptors::new();
        let p = d.package_ref(".");
        assert!(p.is_default());
        assert_eq!(p.fqn(), ".");
        assert_eq!(d.package_ref(""), p);
        assert_eq!(d.package_of_class("Foo"), p);
    }

    #[test]
    fn test_java_packages() {
        let d = Descriptors::new();
        assert!(d.package_ref("java/lang").is_java());
        assert!(!d.package_ref("javax/net").is_java());
        assert!(d.package_ref("META-INF/maven").is_metadata());
    }
}
