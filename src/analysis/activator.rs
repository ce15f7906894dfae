//! `Bundle-Activator` resolution and validation.

use serde::Serialize;

use super::query::{expand_classes, Query};
use crate::diagnostics::Severity;
use crate::graph::{PackageModel, PackageRef};

pub const BUNDLE_ACTIVATOR_INTERFACE: &str = "org.osgi.framework.BundleActivator";

/// What is wrong with the activator. Each kind has its own message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivatorErrorType {
    Empty,
    InvalidTypeName,
    InvalidMacro,
    NoMatch,
    MultipleMatches,
    IsInterface,
    IsAbstract,
    NotPublic,
    NoSuitableConstructor,
    NotAnActivator,
    DefaultPackage,
    NotAccessible,
    IsImported,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivatorProblem {
    pub error_type: ActivatorErrorType,
    pub severity: Severity,
    pub message: String,
}

impl ActivatorProblem {
    fn error(error_type: ActivatorErrorType, message: String) -> Self {
        Self {
            error_type,
            severity: Severity::Error,
            message,
        }
    }

    fn warning(error_type: ActivatorErrorType, message: String) -> Self {
        Self {
            error_type,
            severity: Severity::Warning,
            message,
        }
    }
}

/// Outcome of activator validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivatorStatus {
    /// Dotted name of the resolved activator class.
    pub class: Option<String>,
    pub problems: Vec<ActivatorProblem>,
}

impl ActivatorStatus {
    pub fn is_valid(&self) -> bool {
        self.class.is_some() && self.problems.iter().all(|p| p.severity != Severity::Error)
    }
}

/// Resolves a `Bundle-Activator` value to exactly one dotted class name.
///
/// The value may be a `${classes;...}` query.
pub fn resolve(value: &str, model: &PackageModel) -> Result<String, ActivatorProblem> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ActivatorProblem::warning(
            ActivatorErrorType::Empty,
            "A Bundle-Activator header was present but no activator class was defined".to_string(),
        ));
    }

    let expanded = if value.contains("${") {
        expand_classes(value, model).map_err(|error| {
            ActivatorProblem::error(
                ActivatorErrorType::InvalidMacro,
                format!("The Bundle-Activator macro {value} is invalid: {error}"),
            )
        })?
    } else {
        value.to_string()
    };

    let names: Vec<&str> = expanded.split(',').map(str::trim).filter(|n| !n.is_empty()).collect();
    match names.as_slice() {
        [] => Err(ActivatorProblem::error(
            ActivatorErrorType::NoMatch,
            format!("A Bundle-Activator header is present but no activator class was found using the macro {value}"),
        )),
        [name] if is_type_name(name) => Ok(name.to_string()),
        [name] => Err(ActivatorProblem::error(
            ActivatorErrorType::InvalidTypeName,
            format!("A Bundle-Activator header is present and its value is not a valid type name {name}"),
        )),
        _ => Err(ActivatorProblem::error(
            ActivatorErrorType::MultipleMatches,
            format!(
                "The Bundle-Activator header only supports a single type. The following types were found: {}. This usually happens when a macro resolves to multiple types",
                names.join(",")
            ),
        )),
    }
}

/// Checks a resolved activator against the bundle.
///
/// A contained class must be a public, concrete, non-interface class with a
/// public zero-argument constructor that implements `BundleActivator`. A
/// class that is not contained must at least be imported.
pub fn verify(name: &str, model: &PackageModel, is_imported: impl Fn(&PackageRef) -> bool) -> Vec<ActivatorProblem> {
    let binary = name.replace('.', "/");
    let mut problems = Vec::new();

    if model.is_contained_class(&binary) {
        let Some(class) = model.find_class(&binary) else {
            return problems;
        };
        if class.is_interface() {
            problems.push(ActivatorProblem::error(
                ActivatorErrorType::IsInterface,
                format!("The Bundle Activator {name} is an interface and therefore cannot be instantiated."),
            ));
            return problems;
        }
        if class.is_abstract() {
            problems.push(ActivatorProblem::error(
                ActivatorErrorType::IsAbstract,
                format!("The Bundle Activator {name} is abstract and therefore cannot be instantiated."),
            ));
        }
        if !class.is_public() {
            problems.push(ActivatorProblem::error(
                ActivatorErrorType::NotPublic,
                format!("Bundle Activator classes must be public, and {name} is not."),
            ));
        }
        if !class.has_default_constructor {
            problems.push(ActivatorProblem::error(
                ActivatorErrorType::NoSuitableConstructor,
                format!("Bundle Activator classes must have a public zero-argument constructor and {name} does not."),
            ));
        }
        let implements = Query::parse_all(&["IMPLEMENTS", BUNDLE_ACTIVATOR_INTERFACE])
            .map(|queries| queries.iter().all(|q| q.matches(class, model)))
            .unwrap_or(false);
        if !implements {
            problems.push(ActivatorProblem::error(
                ActivatorErrorType::NotAnActivator,
                format!("The Bundle Activator {name} does not implement BundleActivator."),
            ));
        }
        return problems;
    }

    let package = model.descriptors().package_of_class(&binary);
    if package.is_default() {
        problems.push(ActivatorProblem::error(
            ActivatorErrorType::DefaultPackage,
            "The Bundle Activator is not in the bundle and it is in the default package".to_string(),
        ));
    } else if !is_imported(&package) {
        problems.push(ActivatorProblem::error(
            ActivatorErrorType::NotAccessible,
            format!("Bundle-Activator not found on the bundle class path nor in imports: {name}"),
        ));
    } else {
        problems.push(ActivatorProblem::warning(
            ActivatorErrorType::IsImported,
            format!(
                "Bundle-Activator {name} is being imported into the bundle rather than being contained inside it. This is usually a bundle packaging error"
            ),
        ));
    }
    problems
}

/// Dotted Java type name: identifiers separated by single dots.
fn is_type_name(name: &str) -> bool {
    name.split('.').all(|segment| {
        let mut chars = segment.chars();
        matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_' || c == '$')
            && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::builder::ClassFileBuilder;
    use crate::classfile::record::{ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC, ACC_SUPER};

    fn model_with(builder: ClassFileBuilder, name: &str) -> PackageModel {
        let mut model = PackageModel::default();
        model.add_class_bytes(&format!("{name}.class"), &builder.build());
        model
    }

    fn activator(name: &str) -> ClassFileBuilder {
        let mut builder = ClassFileBuilder::new(name);
        builder
            .add_interface("org/osgi/framework/BundleActivator")
            .add_default_constructor();
        builder
    }

    fn kinds(problems: &[ActivatorProblem]) -> Vec<ActivatorErrorType> {
        problems.iter().map(|p| p.error_type).collect()
    }

    #[test]
    fn test_valid_activator() {
        let model = model_with(activator("a/Activator"), "a/Activator");
        assert_eq!(resolve("a.Activator", &model).unwrap(), "a.Activator");
        assert!(verify("a.Activator", &model, |_| false).is_empty());
    }

    #[test]
    fn test_abstract_activator() {
        let mut builder = activator("a/Activator");
        builder.set_access(ACC_PUBLIC | ACC_SUPER | ACC_ABSTRACT);
        let model = model_with(builder, "a/Activator");
        let problems = verify("a.Activator", &model, |_| false);
        assert_eq!(kinds(&problems), vec![ActivatorErrorType::IsAbstract]);
        assert_eq!(
            problems[0].message,
            "The Bundle Activator a.Activator is abstract and therefore cannot be instantiated."
        );
    }

    #[test]
    fn test_interface_activator_reports_only_interface() {
        let mut builder = ClassFileBuilder::new("a/Activator");
        builder.set_access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
        let model = model_with(builder, "a/Activator");
        assert_eq!(
            kinds(&verify("a.Activator", &model, |_| false)),
            vec![ActivatorErrorType::IsInterface]
        );
    }

    #[test]
    fn test_each_failure_is_distinct() {
        let mut builder = ClassFileBuilder::new("a/Activator");
        builder.set_access(ACC_SUPER);
        let model = model_with(builder, "a/Activator");
        assert_eq!(
            kinds(&verify("a.Activator", &model, |_| false)),
            vec![
                ActivatorErrorType::NotPublic,
                ActivatorErrorType::NoSuitableConstructor,
                ActivatorErrorType::NotAnActivator,
            ]
        );
    }

    #[test]
    fn test_activator_outside_bundle() {
        let model = PackageModel::default();
        assert_eq!(
            kinds(&verify("Activator", &model, |_| true)),
            vec![ActivatorErrorType::DefaultPackage]
        );
        assert_eq!(
            kinds(&verify("x.Activator", &model, |_| false)),
            vec![ActivatorErrorType::NotAccessible]
        );
        let imported = verify("x.Activator", &model, |p| p.fqn() == "x");
        assert_eq!(kinds(&imported), vec![ActivatorErrorType::IsImported]);
        assert_eq!(imported[0].severity, Severity::Warning);
    }

    #[test]
    fn test_resolve_failures() {
        let mut model = model_with(activator("a/One"), "a/One");
        model.add_class_bytes("a/Two.class", &activator("a/Two").build());

        assert_eq!(resolve("  ", &model).unwrap_err().error_type, ActivatorErrorType::Empty);
        assert_eq!(resolve("  ", &model).unwrap_err().severity, Severity::Warning);
        assert_eq!(resolve("a..B", &model).unwrap_err().error_type, ActivatorErrorType::InvalidTypeName);
        assert_eq!(
            resolve("${classes;NAMED;none.*}", &model).unwrap_err().error_type,
            ActivatorErrorType::NoMatch
        );
        assert_eq!(
            resolve("${classes;IMPLEMENTS;org.osgi.framework.BundleActivator}", &model)
                .unwrap_err()
                .error_type,
            ActivatorErrorType::MultipleMatches
        );
        assert_eq!(resolve("${classes;BOGUS}", &model).unwrap_err().error_type, ActivatorErrorType::InvalidMacro);
        assert_eq!(resolve("${classes;NAMED;*Two}", &model).unwrap(), "a.Two");
    }

    #[test]
    fn test_status_validity() {
        let mut status = ActivatorStatus {
            class: Some("a.A".into()),
            problems: Vec::new(),
        };
        assert!(status.is_valid());
        status.problems.push(ActivatorProblem::warning(ActivatorErrorType::IsImported, "w".into()));
        assert!(status.is_valid());
        status.problems.push(ActivatorProblem::error(ActivatorErrorType::NotPublic, "e".into()));
        assert!(!status.is_valid());
    }
}
