//! Package-level view of the decoded classes.
//!
//! Provides the [`PackageModel`], a directed graph whose nodes are packages
//! and whose edges point from a package to each package its classes
//! mention. Packages with at least one class of the bundle are "contained";
//! all other nodes are purely external.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::{trace, warn};

use super::{Descriptors, PackageRef, Packages};
use crate::classfile::annotation::{ConstValue, ElementValue};
use crate::classfile::{decode, ClassRecord, DecodeError, DecodeOptions};
use crate::header::{Attrs, Parameters};

pub const VERSION_ANNOTATION: &str = "org/osgi/annotation/versioning/Version";
pub const EXPORT_ANNOTATION: &str = "org/osgi/annotation/bundle/Export";
pub const PROVIDER_TYPE_ANNOTATION: &str = "org/osgi/annotation/versioning/ProviderType";

/// A class file that could not be decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeFailure {
    pub path: String,
    pub error: DecodeError,
}

/// What a package says about itself through `package-info` and `packageinfo`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackageInfo {
    /// Value of the versioning `@Version` annotation.
    pub annotated_version: Option<String>,
    /// `version` line of a `packageinfo` resource.
    pub marker_version: Option<String>,
    /// True when `package-info` carries the bundle `@Export` annotation.
    pub exported: bool,
    /// Directives and attributes derived from the annotations, such as
    /// `uses:`, `provide:` and `-noimport:`.
    pub attrs: Attrs,
}

/// A dependency on the class path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClasspathEntry {
    pub name: String,
    /// `Export-Package` of the dependency's manifest.
    pub exports: Parameters,
    /// `Provide-Capability` of the dependency's manifest.
    pub capabilities: Parameters,
}

impl ClasspathEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
struct PackageNode {
    package: PackageRef,
    contained: bool,
}

/// Edge weight: whether any reference along the edge is part of a public API.
#[derive(Debug, Clone, Copy, Default)]
struct Reference {
    api: bool,
}

/// Contained and class-path classes, grouped by package.
///
/// # Example
///
/// ```rust
/// use bundlescope::classfile::builder::ClassFileBuilder;
/// use bundlescope::graph::PackageModel;
///
/// let mut model = PackageModel::default();
/// let mut class = ClassFileBuilder::new("com/acme/Service");
/// class.add_interface("org/osgi/framework/BundleActivator");
/// model.add_class_bytes("com/acme/Service.class", &class.build());
///
/// let acme = model.package_ref("com.acme");
/// let osgi = model.package_ref("org.osgi.framework");
/// assert!(model.is_contained(&acme));
/// assert!(model.referred(&acme).contains(&osgi));
/// assert!(!model.is_contained(&osgi));
/// ```
#[derive(Debug)]
pub struct PackageModel {
    options: DecodeOptions,
    descriptors: Descriptors,
    graph: DiGraph<PackageNode, Reference>,
    node_indices: HashMap<PackageRef, NodeIndex>,
    classes: BTreeMap<String, ClassRecord>,
    package_info: HashMap<PackageRef, PackageInfo>,
    classpath: Vec<ClasspathEntry>,
    classpath_classes: BTreeMap<String, (usize, ClassRecord)>,
    classpath_info: HashMap<PackageRef, PackageInfo>,
    failures: Vec<DecodeFailure>,
}

impl Default for PackageModel {
    fn default() -> Self {
        Self::new(DecodeOptions::default())
    }
}

impl PackageModel {
    pub fn new(options: DecodeOptions) -> Self {
        Self {
            options,
            descriptors: Descriptors::new(),
            graph: DiGraph::new(),
            node_indices: HashMap::new(),
            classes: BTreeMap::new(),
            package_info: HashMap::new(),
            classpath: Vec::new(),
            classpath_classes: BTreeMap::new(),
            classpath_info: HashMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    pub fn package_ref(&self, name: &str) -> PackageRef {
        self.descriptors.package_ref(name)
    }

    fn node(&mut self, package: &PackageRef) -> NodeIndex {
        if let Some(&idx) = self.node_indices.get(package) {
            return idx;
        }
        let idx = self.graph.add_node(PackageNode {
            package: package.clone(),
            contained: false,
        });
        self.node_indices.insert(package.clone(), idx);
        idx
    }

    fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, api: bool) {
        match self.graph.find_edge(from, to) {
            Some(edge) => {
                if let Some(weight) = self.graph.edge_weight_mut(edge) {
                    weight.api |= api;
                }
            }
            None => {
                self.graph.add_edge(from, to, Reference { api });
            }
        }
    }

    /// Decodes a class of the bundle and registers it.
    ///
    /// A decode failure is recorded against `path` and `None` is returned;
    /// the model stays usable.
    pub fn add_class_bytes(&mut self, path: &str, bytes: &[u8]) -> Option<PackageRef> {
        match decode(bytes, &self.options) {
            Ok(class) => Some(self.register(class)),
            Err(error) => {
                warn!(path, %error, "failed to decode class");
                self.failures.push(DecodeFailure {
                    path: path.to_string(),
                    error,
                });
                None
            }
        }
    }

    /// Adds a resource of the bundle: a class file or a `packageinfo` marker.
    pub fn add_resource(&mut self, path: &str, bytes: &[u8]) {
        if path.ends_with(".class") {
            self.add_class_bytes(path, bytes);
        } else if let Some(dir) = path.strip_suffix("packageinfo") {
            if let Some(version) = parse_packageinfo(bytes) {
                let package = self.package_ref(dir.trim_end_matches('/'));
                self.package_info.entry(package).or_default().marker_version = Some(version);
            }
        }
    }

    /// Adds a decoded class to its package's contained set and records the
    /// packages it refers to.
    pub fn register(&mut self, class: ClassRecord) -> PackageRef {
        let package = self.descriptors.package_of_class(&class.name);
        trace!(class = %class.name, package = %package, "register class");
        let from = self.node(&package);
        self.graph[from].contained = true;

        for referenced in &class.referenced_packages {
            let target = self.descriptors.package_ref(referenced);
            if target == package {
                continue;
            }
            let to = self.node(&target);
            self.add_edge(from, to, class.api_packages.contains(referenced));
        }

        if class.is_package_info() {
            let info = self.package_info.entry(package.clone()).or_default();
            learn_package_info(&class, info);
        }
        self.classes.insert(class.name.clone(), class);
        package
    }

    /// Adds a class-path dependency and returns its index.
    pub fn add_classpath(&mut self, entry: ClasspathEntry) -> usize {
        self.classpath.push(entry);
        self.classpath.len() - 1
    }

    /// Adds a resource of class-path entry `entry`. The first definition of a
    /// class wins.
    pub fn add_classpath_resource(&mut self, entry: usize, path: &str, bytes: &[u8]) {
        if path.ends_with(".class") {
            match decode(bytes, &self.options) {
                Ok(class) => {
                    let package = self.descriptors.package_of_class(&class.name);
                    if class.is_package_info() {
                        learn_package_info(&class, self.classpath_info.entry(package).or_default());
                    }
                    self.classpath_classes
                        .entry(class.name.clone())
                        .or_insert((entry, class));
                }
                Err(error) => {
                    warn!(path, %error, "failed to decode class-path class");
                    self.failures.push(DecodeFailure {
                        path: path.to_string(),
                        error,
                    });
                }
            }
        } else if let Some(dir) = path.strip_suffix("packageinfo") {
            if let Some(version) = parse_packageinfo(bytes) {
                let package = self.package_ref(dir.trim_end_matches('/'));
                self.classpath_info
                    .entry(package)
                    .or_default()
                    .marker_version
                    .get_or_insert(version);
            }
        }
    }

    /// Pulls a class-path package into the bundle, returning true if any
    /// class moved.
    pub fn absorb(&mut self, package: &PackageRef) -> bool {
        let names: Vec<String> = self
            .classpath_classes
            .iter()
            .filter(|(name, _)| crate::classfile::record::package_of(name) == package.binary())
            .map(|(name, _)| name.clone())
            .collect();
        if names.is_empty() {
            return false;
        }
        for name in names {
            if let Some((_, class)) = self.classpath_classes.remove(&name) {
                if !self.classes.contains_key(&class.name) {
                    self.register(class);
                }
            }
        }
        if let Some(info) = self.classpath_info.remove(package) {
            let own = self.package_info.entry(package.clone()).or_default();
            if own.marker_version.is_none() {
                own.marker_version = info.marker_version;
            }
            if own.annotated_version.is_none() {
                own.annotated_version = info.annotated_version;
            }
            own.exported |= info.exported;
            own.attrs.merge_with(&info.attrs, false);
        }
        true
    }

    pub fn is_contained(&self, package: &PackageRef) -> bool {
        self.node_indices
            .get(package)
            .map(|&idx| self.graph[idx].contained)
            .unwrap_or(false)
    }

    /// Packages with at least one class of the bundle, sorted by name.
    pub fn contained(&self) -> Vec<PackageRef> {
        let mut contained: Vec<PackageRef> = self
            .graph
            .node_weights()
            .filter(|node| node.contained)
            .map(|node| node.package.clone())
            .collect();
        contained.sort();
        contained
    }

    /// Packages directly mentioned by classes of `package`.
    pub fn referred(&self, package: &PackageRef) -> BTreeSet<PackageRef> {
        self.targets(package, false)
    }

    /// Packages mentioned by the public API of `package`.
    pub fn api_referred(&self, package: &PackageRef) -> BTreeSet<PackageRef> {
        self.targets(package, true)
    }

    fn targets(&self, package: &PackageRef, api_only: bool) -> BTreeSet<PackageRef> {
        let Some(&idx) = self.node_indices.get(package) else {
            return BTreeSet::new();
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .filter(|edge| !api_only || edge.weight().api)
            .map(|edge| self.graph[edge.target()].package.clone())
            .collect()
    }

    /// Union of the referred sets of all contained packages.
    pub fn all_referenced(&self) -> BTreeSet<PackageRef> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph[idx].contained)
            .flat_map(|idx| self.graph.edges_directed(idx, Direction::Outgoing))
            .map(|edge| self.graph[edge.target()].package.clone())
            .collect()
    }

    /// Referenced packages that are not contained.
    pub fn external_references(&self) -> BTreeSet<PackageRef> {
        self.all_referenced()
            .into_iter()
            .filter(|package| !self.is_contained(package))
            .collect()
    }

    /// Packages reachable from `package` without leaving `allowed`.
    ///
    /// The walk starts at the packages `package` refers to and only
    /// continues through members of `allowed`. `package` itself is never
    /// part of the result.
    pub fn reachable_within(&self, package: &PackageRef, allowed: &HashSet<PackageRef>) -> BTreeSet<PackageRef> {
        let mut reached = BTreeSet::new();
        let Some(&start) = self.node_indices.get(package) else {
            return reached;
        };
        let mut visited = HashSet::from([start]);
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for edge in self.graph.edges_directed(idx, Direction::Outgoing) {
                let next = edge.target();
                let target = &self.graph[next].package;
                if !allowed.contains(target) || !visited.insert(next) {
                    continue;
                }
                reached.insert(target.clone());
                stack.push(next);
            }
        }
        reached
    }

    /// Contained packages whose classes refer to `package`.
    pub fn referrers(&self, package: &PackageRef) -> BTreeSet<PackageRef> {
        let Some(&idx) = self.node_indices.get(package) else {
            return BTreeSet::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|edge| &self.graph[edge.source()])
            .filter(|node| node.contained)
            .map(|node| node.package.clone())
            .collect()
    }

    /// Contained classes in name order.
    pub fn classes(&self) -> impl Iterator<Item = &ClassRecord> {
        self.classes.values()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// A contained class, or else a class-path class, by binary name.
    pub fn find_class(&self, binary_name: &str) -> Option<&ClassRecord> {
        self.classes
            .get(binary_name)
            .or_else(|| self.classpath_classes.get(binary_name).map(|(_, class)| class))
    }

    pub fn is_contained_class(&self, binary_name: &str) -> bool {
        self.classes.contains_key(binary_name)
    }

    /// Packages that have classes on the class path but not in the bundle.
    pub fn classpath_packages(&self) -> BTreeSet<PackageRef> {
        self.classpath_classes
            .keys()
            .map(|name| self.descriptors.package_of_class(name))
            .filter(|package| !self.is_contained(package))
            .collect()
    }

    pub fn classpath(&self) -> &[ClasspathEntry] {
        &self.classpath
    }

    /// Exports of the class path, the first entry exporting a package
    /// winning. Class-path packages without a manifest export are added with
    /// whatever version their package info declares.
    pub fn classpath_exports(&self) -> Packages {
        let mut exports = Packages::new();
        for entry in &self.classpath {
            for (name, attrs) in entry.exports.iter() {
                let package = self.package_ref(crate::header::strip_duplicate_marker(name));
                if exports.contains(&package) {
                    continue;
                }
                let mut attrs = attrs.clone();
                attrs.put("-internal-source:", entry.name.clone());
                exports.put(package, attrs);
            }
        }
        for package in self.classpath_packages() {
            if exports.contains(&package) {
                continue;
            }
            let mut attrs = Attrs::new();
            if let Some(info) = self.classpath_info.get(&package) {
                if let Some(version) = info.annotated_version.as_ref().or(info.marker_version.as_ref()) {
                    attrs.put("version", version.clone());
                }
                attrs.merge_with(&info.attrs, false);
            }
            if let Some(source) = self.classpath_source(&package) {
                attrs.put("-internal-source:", source.to_string());
            }
            exports.put(package, attrs);
        }
        exports
    }

    fn classpath_source(&self, package: &PackageRef) -> Option<&str> {
        self.classpath_classes
            .iter()
            .find(|(name, _)| crate::classfile::record::package_of(name) == package.binary())
            .and_then(|(_, (entry, _))| self.classpath.get(*entry))
            .map(|entry| entry.name.as_str())
    }

    pub fn package_info(&self, package: &PackageRef) -> Option<&PackageInfo> {
        self.package_info.get(package)
    }

    pub fn failures(&self) -> &[DecodeFailure] {
        &self.failures
    }
}

/// Reads the `version` line of a `packageinfo` resource.
fn parse_packageinfo(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    text.lines().find_map(|line| {
        let line = line.trim();
        let rest = line.strip_prefix("version")?;
        let version = rest.trim();
        (!version.is_empty() && rest.starts_with(char::is_whitespace)).then(|| version.to_string())
    })
}

fn learn_package_info(class: &ClassRecord, info: &mut PackageInfo) {
    for annotation in class.annotations.iter().filter(|a| a.member.is_none()) {
        match annotation.type_name.as_str() {
            VERSION_ANNOTATION => {
                if let Some(version) = annotation.string("value") {
                    info.annotated_version = Some(version.to_string());
                }
            }
            PROVIDER_TYPE_ANNOTATION => {
                if !info.attrs.contains_key("provide:") {
                    info.attrs.put("provide:", "true");
                }
            }
            EXPORT_ANNOTATION => {
                info.exported = true;
                let uses = strings(annotation.get("uses"));
                if !uses.is_empty() {
                    info.attrs.put("uses:", uses.join(","));
                }
                if let Some(ElementValue::Enum { const_name, .. }) = annotation.get("substitution") {
                    match const_name.as_str() {
                        "CONSUMER" => info.attrs.put("provide:", "false"),
                        "PROVIDER" => info.attrs.put("provide:", "true"),
                        "NOIMPORT" => info.attrs.put("-noimport:", "true"),
                        _ => {}
                    }
                }
                for attribute in strings(annotation.get("attribute")) {
                    if let Ok(parsed) = Parameters::parse(&format!("x;{attribute}")) {
                        if let Some(attrs) = parsed.get("x") {
                            info.attrs.merge_with(attrs, false);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

fn strings(value: Option<&ElementValue>) -> Vec<String> {
    match value {
        Some(ElementValue::Const {
            value: ConstValue::String(s),
            ..
        }) => vec![s.clone()],
        Some(ElementValue::Array(items)) => items.iter().flat_map(|item| strings(Some(item))).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::builder::{AnnotationSpec, ClassFileBuilder, ElementSpec};

    fn class(name: &str, interfaces: &[&str]) -> Vec<u8> {
        let mut builder = ClassFileBuilder::new(name);
        for interface in interfaces {
            builder.add_interface(interface);
        }
        builder.build()
    }

    #[test]
    fn test_contained_and_referred() {
        let mut model = PackageModel::default();
        model.add_class_bytes("a/A.class", &class("a/A", &["b/B", "x/X"]));
        model.add_class_bytes("b/B.class", &class("b/B", &["c/C"]));

        let a = model.package_ref("a");
        let b = model.package_ref("b");
        let x = model.package_ref("x");
        assert_eq!(model.contained(), vec![a.clone(), b.clone()]);
        assert!(model.referred(&a).contains(&b));
        assert!(model.referred(&a).contains(&x));
        assert!(!model.referred(&a).contains(&a));
        assert!(model.all_referenced().contains(&model.package_ref("c")));
        assert!(!model.external_references().contains(&b));
        assert_eq!(model.referrers(&x), BTreeSet::from([a]));
    }

    #[test]
    fn test_reachable_within_stays_inside_allowed() {
        let mut model = PackageModel::default();
        model.add_class_bytes("a/A.class", &class("a/A", &["b/B", "p/P"]));
        model.add_class_bytes("b/B.class", &class("b/B", &["c/C"]));
        model.add_class_bytes("p/P.class", &class("p/P", &["d/D"]));

        let allowed: HashSet<PackageRef> = ["a", "b", "c"].iter().map(|n| model.package_ref(n)).collect();
        let reached = model.reachable_within(&model.package_ref("a"), &allowed);
        let names: Vec<&str> = reached.iter().map(|p| p.fqn()).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn test_decode_failure_is_recorded() {
        let mut model = PackageModel::default();
        assert!(model.add_class_bytes("bad/Bad.class", &[0xCA, 0xFE]).is_none());
        model.add_class_bytes("a/A.class", &class("a/A", &[]));
        assert_eq!(model.failures().len(), 1);
        assert_eq!(model.failures()[0].path, "bad/Bad.class");
        assert_eq!(model.class_count(), 1);
    }

    #[test]
    fn test_package_info_annotations() {
        let mut builder = ClassFileBuilder::new("a/package-info");
        let annotations = builder.annotations_attribute(
            false,
            &[
                AnnotationSpec::new("Lorg/osgi/annotation/versioning/Version;")
                    .with("value", ElementSpec::Str("1.4.0".into())),
                AnnotationSpec::new("Lorg/osgi/annotation/bundle/Export;")
                    .with("substitution", ElementSpec::Enum(
                        "Lorg/osgi/annotation/bundle/Export$Substitution;".into(),
                        "PROVIDER".into(),
                    )),
            ],
        );
        builder.add_attribute(annotations);

        let mut model = PackageModel::default();
        model.add_class_bytes("a/package-info.class", &builder.build());
        model.add_resource("a/packageinfo", b"version 1.3\n");

        let info = model.package_info(&model.package_ref("a")).unwrap();
        assert_eq!(info.annotated_version.as_deref(), Some("1.4.0"));
        assert_eq!(info.marker_version.as_deref(), Some("1.3"));
        assert!(info.exported);
        assert_eq!(info.attrs.get("provide:"), Some("true"));
    }

    #[test]
    fn test_classpath_exports_and_absorb() {
        let mut model = PackageModel::default();
        let mut entry = ClasspathEntry::new("dep.jar");
        entry.exports = Parameters::parse("dep.api;version=2.1").unwrap();
        let index = model.add_classpath(entry);
        model.add_classpath_resource(index, "dep/api/Api.class", &class("dep/api/Api", &[]));
        model.add_classpath_resource(index, "dep/impl/Impl.class", &class("dep/impl/Impl", &["dep/api/Api"]));
        model.add_classpath_resource(index, "dep/impl/packageinfo", b"version 3.0");

        let exports = model.classpath_exports();
        let api = model.package_ref("dep.api");
        let implementation = model.package_ref("dep.impl");
        assert_eq!(exports.get(&api).unwrap().version(), Some("2.1"));
        assert_eq!(exports.get(&implementation).unwrap().version(), Some("3.0"));
        assert_eq!(exports.get(&api).unwrap().get("-internal-source:"), Some("dep.jar"));

        assert!(model.absorb(&implementation));
        assert!(model.is_contained(&implementation));
        assert!(model.referred(&implementation).contains(&api));
        assert!(!model.classpath_packages().contains(&implementation));
        assert!(!model.absorb(&model.package_ref("nothing.here")));
    }

    #[test]
    fn test_parse_packageinfo() {
        assert_eq!(parse_packageinfo(b"# comment\nversion 1.2.3\n"), Some("1.2.3".to_string()));
        assert_eq!(parse_packageinfo(b"versions 1"), None);
        assert_eq!(parse_packageinfo(b""), None);
    }
}
