//! Package clauses keyed by [`PackageRef`].

use std::fmt;

use super::PackageRef;
use crate::header::{Attrs, Parameters, DUPLICATE_MARKER};

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    package: PackageRef,
    /// 0 for the primary clause, n for the n-th duplicate.
    duplicate: usize,
    attrs: Attrs,
}

/// One header's worth of package clauses, such as the exports or imports.
///
/// There is at most one primary clause per package. A package declared
/// again is kept as a duplicate clause instead of overwriting the first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Packages {
    entries: Vec<Entry>,
}

impl Packages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the primary clause of `package`.
    pub fn put(&mut self, package: PackageRef, attrs: Attrs) {
        match self
            .entries
            .iter_mut()
            .find(|e| e.package == package && e.duplicate == 0)
        {
            Some(entry) => entry.attrs = attrs,
            None => self.entries.push(Entry {
                package,
                duplicate: 0,
                attrs,
            }),
        }
    }

    /// Merges `sources` into a clause for `package`, later sources winning.
    ///
    /// With `duplicate`, an existing package gets an extra clause rather
    /// than having its primary clause merged.
    pub fn merge(&mut self, package: &PackageRef, duplicate: bool, sources: &[Option<&Attrs>]) -> &mut Attrs {
        let index = match self.primary_index(package) {
            Some(index) if !duplicate => index,
            Some(_) => {
                let next = self
                    .entries
                    .iter()
                    .filter(|e| e.package == *package)
                    .map(|e| e.duplicate)
                    .max()
                    .unwrap_or(0)
                    + 1;
                self.entries.push(Entry {
                    package: package.clone(),
                    duplicate: next,
                    attrs: Attrs::new(),
                });
                self.entries.len() - 1
            }
            None => {
                self.entries.push(Entry {
                    package: package.clone(),
                    duplicate: 0,
                    attrs: Attrs::new(),
                });
                self.entries.len() - 1
            }
        };
        let attrs = &mut self.entries[index].attrs;
        for source in sources.iter().flatten() {
            attrs.put_all(source);
        }
        attrs
    }

    fn primary_index(&self, package: &PackageRef) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.package == *package && e.duplicate == 0)
    }

    pub fn get(&self, package: &PackageRef) -> Option<&Attrs> {
        self.primary_index(package).map(|i| &self.entries[i].attrs)
    }

    pub fn get_mut(&mut self, package: &PackageRef) -> Option<&mut Attrs> {
        self.primary_index(package).map(|i| &mut self.entries[i].attrs)
    }

    pub fn contains(&self, package: &PackageRef) -> bool {
        self.primary_index(package).is_some()
    }

    /// Removes every clause for `package`, returning the primary one.
    pub fn remove(&mut self, package: &PackageRef) -> Option<Attrs> {
        let primary = self.primary_index(package).map(|i| self.entries[i].attrs.clone());
        self.entries.retain(|e| e.package != *package);
        primary
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&PackageRef, &Attrs) -> bool) {
        self.entries.retain(|e| keep(&e.package, &e.attrs));
    }

    /// Distinct packages in declaration order.
    pub fn keys(&self) -> impl Iterator<Item = &PackageRef> {
        self.entries
            .iter()
            .filter(|e| e.duplicate == 0)
            .map(|e| &e.package)
    }

    /// All clauses, duplicates included.
    pub fn iter(&self) -> impl Iterator<Item = (&PackageRef, &Attrs)> {
        self.entries.iter().map(|e| (&e.package, &e.attrs))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PackageRef, &mut Attrs)> {
        self.entries.iter_mut().map(|e| (&e.package, &mut e.attrs))
    }

    /// Number of distinct packages.
    pub fn len(&self) -> usize {
        self.keys().count()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sort(&mut self) {
        self.entries
            .sort_by(|a, b| a.package.cmp(&b.package).then(a.duplicate.cmp(&b.duplicate)));
    }

    /// Clauses keyed by dotted name, duplicates carrying their marker.
    pub fn to_parameters(&self) -> Parameters {
        let mut parameters = Parameters::new();
        for entry in &self.entries {
            let mut name = entry.package.fqn().to_string();
            name.extend(std::iter::repeat(DUPLICATE_MARKER).take(entry.duplicate));
            parameters.put(name, entry.attrs.clone());
        }
        parameters
    }
}

impl fmt::Display for Packages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_parameters())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Descriptors;

    fn attrs(key: &str, value: &str) -> Attrs {
        let mut a = Attrs::new();
        a.put(key, value);
        a
    }

    #[test]
    fn test_merge_later_sources_win() {
        let d = Descriptors::new();
        let p = d.package_ref("p");
        let mut packages = Packages::new();
        let merged = packages.merge(&p, false, &[Some(&attrs("v", "1")), None, Some(&attrs("v", "2"))]);
        assert_eq!(merged.get("v"), Some("2"));
        assert_eq!(packages.len(), 1);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let d = Descriptors::new();
        let p = d.package_ref("p");
        let mut packages = Packages::new();
        packages.merge(&p, false, &[Some(&attrs("x", "1"))]);
        packages.merge(&p, true, &[Some(&attrs("x", "2"))]);

        assert_eq!(packages.len(), 1);
        assert_eq!(packages.iter().count(), 2);
        assert_eq!(packages.get(&p).unwrap().get("x"), Some("1"));
        assert_eq!(packages.to_string(), "p;x=1,p;x=2");
        assert_eq!(packages.to_parameters().keys().collect::<Vec<_>>(), vec!["p", "p~"]);

        packages.remove(&p);
        assert!(packages.is_empty());
    }

    #[test]
    fn test_sort_by_name() {
        let d = Descriptors::new();
        let mut packages = Packages::new();
        packages.put(d.package_ref("b"), Attrs::new());
        packages.put(d.package_ref("a"), Attrs::new());
        packages.sort();
        let names: Vec<&str> = packages.keys().map(|p| p.fqn()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
