//! Class queries and the `${classes;...}` macro.
//!
//! A query is a keyword, optionally followed by a pattern. The macro takes
//! a sequence of queries and returns the contained classes matching all of
//! them, dotted and comma separated:
//!
//! ```text
//! ${classes;IMPLEMENTS;org.osgi.framework.BundleActivator;CONCRETE}
//! ```

use std::collections::{HashSet, VecDeque};
use std::fmt;

use thiserror::Error;

use crate::classfile::ClassRecord;
use crate::graph::PackageModel;
use crate::instruction::{Instruction, InstructionError};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("${{classes}} has no query named {0}")]
    UnknownQuery(String),

    #[error("${{classes}} query {0} must have a pattern argument")]
    MissingPattern(QueryKind),

    #[error("unterminated ${{classes}} macro in {0}")]
    Unterminated(String),

    #[error(transparent)]
    Instruction(#[from] InstructionError),
}

pub type QueryResult<T> = Result<T, QueryError>;

/// The predicates a class can be selected by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Named,
    Any,
    Version,
    Implements,
    Extends,
    Imports,
    Annotated,
    IndirectlyAnnotated,
    HierarchyAnnotated,
    HierarchyIndirectlyAnnotated,
    RuntimeAnnotations,
    ClassAnnotations,
    Public,
    Abstract,
    Concrete,
    DefaultConstructor,
    Static,
    Inner,
}

impl QueryKind {
    /// Parses a keyword, case insensitively, including the aliases
    /// `EXTENDING`, `IMPLEMENTING`, `IMPORTING` and `ANNOTATION`.
    pub fn parse(keyword: &str) -> Option<Self> {
        let kind = match keyword.trim().to_ascii_uppercase().as_str() {
            "NAMED" => Self::Named,
            "ANY" => Self::Any,
            "VERSION" => Self::Version,
            "IMPLEMENTS" | "IMPLEMENTING" => Self::Implements,
            "EXTENDS" | "EXTENDING" => Self::Extends,
            "IMPORTS" | "IMPORTING" => Self::Imports,
            "ANNOTATED" | "ANNOTATION" => Self::Annotated,
            "INDIRECTLY_ANNOTATED" => Self::IndirectlyAnnotated,
            "HIERARCHY_ANNOTATED" => Self::HierarchyAnnotated,
            "HIERARCHY_INDIRECTLY_ANNOTATED" => Self::HierarchyIndirectlyAnnotated,
            "RUNTIMEANNOTATIONS" => Self::RuntimeAnnotations,
            "CLASSANNOTATIONS" => Self::ClassAnnotations,
            "PUBLIC" => Self::Public,
            "ABSTRACT" => Self::Abstract,
            "CONCRETE" => Self::Concrete,
            "DEFAULT_CONSTRUCTOR" => Self::DefaultConstructor,
            "STATIC" => Self::Static,
            "INNER" => Self::Inner,
            _ => return None,
        };
        Some(kind)
    }

    pub fn takes_pattern(&self) -> bool {
        matches!(
            self,
            Self::Named
                | Self::Version
                | Self::Implements
                | Self::Extends
                | Self::Imports
                | Self::Annotated
                | Self::IndirectlyAnnotated
                | Self::HierarchyAnnotated
                | Self::HierarchyIndirectlyAnnotated
        )
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Named => "NAMED",
            Self::Any => "ANY",
            Self::Version => "VERSION",
            Self::Implements => "IMPLEMENTS",
            Self::Extends => "EXTENDS",
            Self::Imports => "IMPORTS",
            Self::Annotated => "ANNOTATED",
            Self::IndirectlyAnnotated => "INDIRECTLY_ANNOTATED",
            Self::HierarchyAnnotated => "HIERARCHY_ANNOTATED",
            Self::HierarchyIndirectlyAnnotated => "HIERARCHY_INDIRECTLY_ANNOTATED",
            Self::RuntimeAnnotations => "RUNTIMEANNOTATIONS",
            Self::ClassAnnotations => "CLASSANNOTATIONS",
            Self::Public => "PUBLIC",
            Self::Abstract => "ABSTRACT",
            Self::Concrete => "CONCRETE",
            Self::DefaultConstructor => "DEFAULT_CONSTRUCTOR",
            Self::Static => "STATIC",
            Self::Inner => "INNER",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One predicate with its pattern.
#[derive(Debug, Clone)]
pub struct Query {
    pub kind: QueryKind,
    pub pattern: Option<Instruction>,
}

impl Query {
    /// Parses `KEYWORD[;PATTERN];KEYWORD...` arguments into queries.
    pub fn parse_all(args: &[&str]) -> QueryResult<Vec<Query>> {
        let mut queries = Vec::new();
        let mut args = args.iter().map(|a| a.trim()).filter(|a| !a.is_empty());
        while let Some(keyword) = args.next() {
            let kind = QueryKind::parse(keyword).ok_or_else(|| QueryError::UnknownQuery(keyword.to_string()))?;
            let pattern = if kind.takes_pattern() {
                let text = args.next().ok_or(QueryError::MissingPattern(kind))?;
                Some(Instruction::new(text)?)
            } else {
                None
            };
            queries.push(Query { kind, pattern });
        }
        Ok(queries)
    }

    /// True if `class` satisfies this predicate. Supertypes and annotation
    /// types are looked up in `model`; missing ones end the walk.
    pub fn matches(&self, class: &ClassRecord, model: &PackageModel) -> bool {
        let Some(pattern) = &self.pattern else {
            return match self.kind {
                QueryKind::Any => true,
                QueryKind::RuntimeAnnotations => class.has_runtime_annotations,
                QueryKind::ClassAnnotations => class.has_class_annotations,
                QueryKind::Public => class.is_public(),
                QueryKind::Abstract => class.is_abstract(),
                QueryKind::Concrete => !class.is_abstract(),
                QueryKind::DefaultConstructor => class.has_default_constructor,
                QueryKind::Static => !class.nest.is_inner(),
                QueryKind::Inner => class.nest.is_inner(),
                _ => false,
            };
        };

        let found = match self.kind {
            QueryKind::Named => pattern.matches(&class.fqn()),
            QueryKind::Version => pattern.matches(&format!("{}.{}", class.major, class.minor)),
            QueryKind::Implements => {
                let mut visited = HashSet::new();
                hierarchy(class, model).any(|c| {
                    interfaces(c, model, &mut visited)
                        .iter()
                        .any(|name| pattern.matches(&dotted(name)))
                })
            }
            QueryKind::Extends => supertypes(class, model).any(|name| pattern.matches(&dotted(name))),
            QueryKind::Imports => hierarchy(class, model)
                .flat_map(|c| c.referenced_packages.iter())
                .any(|package| pattern.matches(&dotted(package))),
            QueryKind::Annotated => annotations(class, model, None)
                .iter()
                .any(|name| pattern.matches(&annotation_fqn(name))),
            QueryKind::IndirectlyAnnotated => annotations(class, model, Some(&mut HashSet::new()))
                .iter()
                .any(|name| pattern.matches(&annotation_fqn(name))),
            QueryKind::HierarchyAnnotated => hierarchy(class, model).any(|c| {
                annotations(c, model, None)
                    .iter()
                    .any(|name| pattern.matches(&annotation_fqn(name)))
            }),
            QueryKind::HierarchyIndirectlyAnnotated => {
                let mut visited = HashSet::new();
                hierarchy(class, model).any(|c| {
                    annotations(c, model, Some(&mut visited))
                        .iter()
                        .any(|name| pattern.matches(&annotation_fqn(name)))
                })
            }
            _ => false,
        };
        found ^ pattern.is_negated()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pattern {
            Some(pattern) => write!(f, "{};{}", self.kind, pattern),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Contained classes matching every query, in name order.
pub fn select_classes<'a>(model: &'a PackageModel, queries: &[Query]) -> Vec<&'a ClassRecord> {
    model
        .classes()
        .filter(|class| queries.iter().all(|query| query.matches(class, model)))
        .collect()
}

/// Replaces every `${classes;...}` in `value` with the matching class names.
///
/// # Example
///
/// ```rust
/// use bundlescope::analysis::query::expand_classes;
/// use bundlescope::classfile::builder::ClassFileBuilder;
/// use bundlescope::graph::PackageModel;
///
/// let mut model = PackageModel::default();
/// let mut activator = ClassFileBuilder::new("com/acme/Activator");
/// activator.add_interface("org/osgi/framework/BundleActivator");
/// model.add_class_bytes("com/acme/Activator.class", &activator.build());
///
/// let value = expand_classes("${classes;IMPLEMENTS;org.osgi.framework.*}", &model).unwrap();
/// assert_eq!(value, "com.acme.Activator");
/// ```
pub fn expand_classes(value: &str, model: &PackageModel) -> QueryResult<String> {
    const MACRO: &str = "${classes";
    let mut result = String::new();
    let mut rest = value;
    while let Some(start) = rest.find(MACRO) {
        result.push_str(&rest[..start]);
        let body_start = start + MACRO.len();
        let end = rest[body_start..]
            .find('}')
            .map(|offset| body_start + offset)
            .ok_or_else(|| QueryError::Unterminated(value.to_string()))?;
        let args: Vec<&str> = rest[body_start..end].split(';').collect();
        let queries = Query::parse_all(&args)?;
        let names: Vec<String> = select_classes(model, &queries).iter().map(|c| c.fqn()).collect();
        result.push_str(&names.join(","));
        rest = &rest[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}

fn dotted(binary: &str) -> String {
    binary.replace('/', ".")
}

fn annotation_fqn(binary: &str) -> String {
    binary.replace(['/', '$'], ".")
}

/// `class` followed by the superclasses that can be found.
fn hierarchy<'a>(class: &'a ClassRecord, model: &'a PackageModel) -> impl Iterator<Item = &'a ClassRecord> + 'a {
    let mut seen = HashSet::new();
    std::iter::successors(Some(class), move |current| {
        let next = model.find_class(current.super_class.as_deref()?)?;
        seen.insert(current.name.clone());
        (!seen.contains(&next.name)).then_some(next)
    })
}

/// Names of all superclasses, including the first one that cannot be found.
fn supertypes<'a>(class: &'a ClassRecord, model: &'a PackageModel) -> impl Iterator<Item = &'a str> + 'a {
    let mut seen = HashSet::new();
    std::iter::successors(class.super_class.as_deref(), move |name| {
        if !seen.insert(*name) {
            return None;
        }
        model.find_class(name)?.super_class.as_deref()
    })
}

/// Interfaces of `class` and their super-interfaces, skipping those in `visited`.
fn interfaces<'a>(class: &'a ClassRecord, model: &'a PackageModel, visited: &mut HashSet<&'a str>) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut queue: VecDeque<&str> = class.interfaces.iter().map(String::as_str).collect();
    while let Some(name) = queue.pop_front() {
        if !visited.insert(name) {
            continue;
        }
        found.push(name);
        if let Some(interface) = model.find_class(name) {
            queue.extend(interface.interfaces.iter().map(String::as_str));
        }
    }
    found
}

/// Annotation types of `class`. With `visited`, the annotations of those
/// annotation types are followed as well.
fn annotations<'a>(
    class: &'a ClassRecord,
    model: &'a PackageModel,
    visited: Option<&mut HashSet<&'a str>>,
) -> Vec<&'a str> {
    let direct: Vec<&str> = class.annotation_types().collect();
    let Some(visited) = visited else {
        return direct;
    };
    let mut found = Vec::new();
    let mut queue: VecDeque<&str> = direct.into_iter().collect();
    while let Some(name) = queue.pop_front() {
        if !visited.insert(name) {
            continue;
        }
        found.push(name);
        if let Some(annotation) = model.find_class(name) {
            queue.extend(annotation.annotation_types());
        }
    }
    found
}
