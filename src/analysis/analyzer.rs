//! The dependency analyzer.
//!
//! One run walks a fixed sequence of states over a [`PackageModel`]:
//! Discover, Classify, ResolveVersions, ComputeImports, ComputeUses,
//! DynamicImports, Activator, Done. No state is entered twice. Problems
//! found along the way are collected as diagnostics and never stop the run.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use tracing::debug;

use super::activator::{self, ActivatorStatus};
use crate::classfile::java::lenient_filter;
use crate::classfile::{DecodeOptions, ExecutionEnvironment};
use crate::config::{self, AnalyzerConfig};
use crate::diagnostics::{DiagnosticKind, Diagnostics, Severity};
use crate::graph::{PackageModel, PackageRef, Packages, PROVIDER_TYPE_ANNOTATION};
use crate::header::{Attrs, Parameters, Version, VersionRange};
use crate::instruction::{Instruction, Instructions};
use crate::policy::contracts::Contracts;
use crate::policy::VersionPolicy;

pub const USES_MARKER: &str = "<<USES>>";
const NOIMPORT_DIRECTIVE: &str = "-noimport:";
const REMOVE_ATTRIBUTE_DIRECTIVE: &str = "-remove-attribute:";

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerState {
    Discover,
    Classify,
    ResolveVersions,
    ComputeImports,
    ComputeUses,
    DynamicImports,
    Activator,
    Done,
}

impl AnalyzerState {
    pub fn next(self) -> Self {
        match self {
            Self::Discover => Self::Classify,
            Self::Classify => Self::ResolveVersions,
            Self::ResolveVersions => Self::ComputeImports,
            Self::ComputeImports => Self::ComputeUses,
            Self::ComputeUses => Self::DynamicImports,
            Self::DynamicImports => Self::Activator,
            Self::Activator | Self::Done => Self::Done,
        }
    }
}

impl fmt::Display for AnalyzerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Everything one run produces.
#[derive(Debug, Clone, Default)]
pub struct AnalysisResult {
    pub exports: Packages,
    pub imports: Packages,
    pub dynamic_imports: Parameters,
    /// Contained packages that are not exported.
    pub private_packages: Vec<PackageRef>,
    pub contained: Vec<PackageRef>,
    /// `Require-Capability` clauses for contracts and the execution environment.
    pub requirements: Parameters,
    /// Highest execution environment among contained classes.
    pub execution_environment: Option<ExecutionEnvironment>,
    pub activator: Option<ActivatorStatus>,
    pub diagnostics: Diagnostics,
    remove_headers: Instructions,
}

impl AnalysisResult {
    /// The `uses:` directive of an exported package, split into names.
    pub fn uses(&self, package: &PackageRef) -> Vec<String> {
        self.exports
            .get(package)
            .map(|attrs| attrs.get_list("uses:"))
            .unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }

    /// The manifest headers of the bundle, in a fixed order.
    ///
    /// Headers selected by `-removeheaders` are left out, as are empty
    /// headers and directives starting with `-`.
    pub fn headers(&self) -> Vec<(String, String)> {
        let mut headers = Vec::new();
        if let Some(class) = self.activator.as_ref().and_then(|a| a.class.as_ref()) {
            headers.push(("Bundle-Activator".to_string(), class.clone()));
        }
        headers.push((config::EXPORT_PACKAGE.to_string(), clauses(&self.exports.to_parameters())));
        headers.push((config::IMPORT_PACKAGE.to_string(), clauses(&self.imports.to_parameters())));
        headers.push((config::DYNAMICIMPORT_PACKAGE.to_string(), clauses(&self.dynamic_imports)));
        let private: Vec<&str> = self.private_packages.iter().map(|p| p.fqn()).collect();
        headers.push((config::PRIVATE_PACKAGE.to_string(), private.join(",")));
        headers.push(("Require-Capability".to_string(), clauses(&self.requirements)));

        headers
            .into_iter()
            .filter(|(name, value)| !value.is_empty() && !self.remove_headers.selects(name))
            .collect()
    }
}

/// Clauses without internal directives.
fn clauses(parameters: &Parameters) -> String {
    let cleaned: Parameters = parameters
        .iter()
        .map(|(name, attrs)| {
            let mut attrs = attrs.clone();
            attrs.retain(|key, _| !key.starts_with('-'));
            (name.to_string(), attrs)
        })
        .collect();
    cleaned.to_string()
}

/// Runs the analysis pipeline with one configuration.
///
/// # Example
///
/// ```rust
/// use bundlescope::analysis::Analyzer;
/// use bundlescope::classfile::builder::ClassFileBuilder;
/// use bundlescope::config::AnalyzerConfig;
///
/// let mut config = AnalyzerConfig::new();
/// config.set("Export-Package", "com.acme.api").unwrap();
/// config.set("Bundle-Version", "1.2.3").unwrap();
/// let analyzer = Analyzer::new(config);
///
/// let mut model = analyzer.model();
/// let mut api = ClassFileBuilder::new("com/acme/api/Greeter");
/// api.add_interface("org/slf4j/Logger");
/// model.add_class_bytes("com/acme/api/Greeter.class", &api.build());
///
/// let result = analyzer.analyze(&mut model);
/// let exported = model.package_ref("com.acme.api");
/// assert_eq!(result.exports.get(&exported).unwrap().version(), Some("1.2.3"));
/// assert!(result.imports.contains(&model.package_ref("org.slf4j")));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            class_for_name: !self.config.no_class_for_name,
        }
    }

    /// An empty model that decodes classes the way this configuration asks.
    pub fn model(&self) -> PackageModel {
        PackageModel::new(self.decode_options())
    }

    /// Runs every state over `model`.
    ///
    /// The model is only changed during Discover, when class-path packages
    /// are pulled into the bundle.
    pub fn analyze(&self, model: &mut PackageModel) -> AnalysisResult {
        let mut run = Run::new(&self.config, model);
        let mut state = AnalyzerState::Discover;
        while state != AnalyzerState::Done {
            debug!(%state, "enter state");
            match state {
                AnalyzerState::Discover => run.discover(),
                AnalyzerState::Classify => run.classify(),
                AnalyzerState::ResolveVersions => run.resolve_versions(),
                AnalyzerState::ComputeImports => run.compute_imports(),
                AnalyzerState::ComputeUses => run.compute_uses(),
                AnalyzerState::DynamicImports => run.dynamic_imports(),
                AnalyzerState::Activator => run.verify_activator(),
                AnalyzerState::Done => {}
            }
            state = state.next();
        }
        debug!(state = %AnalyzerState::Done, "analysis finished");
        run.finish()
    }
}

/// Working state of one run.
struct Run<'a> {
    config: &'a AnalyzerConfig,
    model: &'a mut PackageModel,
    diagnostics: Diagnostics,
    policy: VersionPolicy,
    activator: Option<String>,
    activator_status: Option<ActivatorStatus>,
    /// References that do not come from classes.
    extra_referred: BTreeSet<PackageRef>,
    classpath_exports: Packages,
    contracts: Contracts,
    exports: Packages,
    imports: Packages,
    dynamic_imports: Parameters,
}

impl<'a> Run<'a> {
    fn new(config: &'a AnalyzerConfig, model: &'a mut PackageModel) -> Self {
        let mut policy = VersionPolicy {
            bundle_version: config.bundle_version.clone(),
            no_default_version: config.no_default_version,
            ..VersionPolicy::default()
        };
        if let Some(consumer) = &config.consumer_policy {
            policy.consumer = consumer.clone();
        }
        if let Some(provider) = &config.provider_policy {
            policy.provider = provider.clone();
        }
        Self {
            config,
            model,
            diagnostics: Diagnostics::new(),
            policy,
            activator: None,
            activator_status: None,
            extra_referred: BTreeSet::new(),
            classpath_exports: Packages::new(),
            contracts: Contracts::default(),
            exports: Packages::new(),
            imports: Packages::new(),
            dynamic_imports: Parameters::new(),
        }
    }

    /// Parses an instruction header. A syntax error is reported and the
    /// header is treated as empty.
    fn instructions(&mut self, header: &str, value: Option<&str>) -> Instructions {
        let Some(value) = value else {
            return Instructions::new();
        };
        match Instructions::parse(value) {
            Ok(instructions) => instructions,
            Err(error) => {
                let message = format!("Invalid {header} header {value}: {error}");
                let diagnostic = if self.config.strict {
                    self.diagnostics.error(DiagnosticKind::Instruction, message)
                } else {
                    self.diagnostics.warning(DiagnosticKind::Instruction, message)
                };
                diagnostic.header(header);
                Instructions::new()
            }
        }
    }

    fn parameters(&mut self, header: &str, value: Option<&str>) -> Parameters {
        let Some(value) = value else {
            return Parameters::new();
        };
        match Parameters::parse(value) {
            Ok(parameters) => parameters,
            Err(error) => {
                let message = format!("Invalid {header} header {value}: {error}");
                let diagnostic = if self.config.strict {
                    self.diagnostics.error(DiagnosticKind::Instruction, message)
                } else {
                    self.diagnostics.warning(DiagnosticKind::Instruction, message)
                };
                diagnostic.header(header);
                Parameters::new()
            }
        }
    }

    /// Pulls private and conditional class-path packages into the bundle,
    /// resolves the activator and reports decode failures.
    fn discover(&mut self) {
        let settings = self.config;
        for failure in self.model.failures() {
            self.diagnostics
                .error(
                    DiagnosticKind::Decode,
                    format!("Failed to decode class file {}: {}", failure.path, failure.error),
                )
                .context(failure.path.clone());
        }

        let private = self.instructions(config::PRIVATE_PACKAGE, settings.private_package.as_deref());
        if !private.is_empty() {
            let mut candidates: Vec<PackageRef> = self.model.contained();
            candidates.extend(self.model.classpath_packages());
            for package in self.model.classpath_packages() {
                if private.selects(package.fqn()) {
                    debug!(package = %package, "private package from class path");
                    self.model.absorb(&package);
                }
            }
            let unused: Vec<&Instruction> = private
                .iter()
                .map(|(instruction, _)| instruction)
                .filter(|instruction| {
                    !instruction.is_negated() && !candidates.iter().any(|p| instruction.matches(p.fqn()))
                })
                .collect();
            if !unused.is_empty() {
                self.diagnostics
                    .warning(
                        DiagnosticKind::Classification,
                        format!(
                            "Unused {} instructions, no such package(s) on the class path: {}",
                            config::PRIVATE_PACKAGE,
                            bracket(&unused)
                        ),
                    )
                    .header(config::PRIVATE_PACKAGE)
                    .context(unused[0].to_string());
            }
        }

        let conditional = self.instructions(
            config::CONDITIONAL_PACKAGE,
            settings.conditional_package.as_deref(),
        );
        if !conditional.is_empty() {
            loop {
                let available = self.model.classpath_packages();
                let selected: Vec<PackageRef> = self
                    .model
                    .external_references()
                    .into_iter()
                    .filter(|p| available.contains(p) && conditional.selects(p.fqn()))
                    .collect();
                if selected.is_empty() {
                    break;
                }
                for package in selected {
                    debug!(package = %package, "conditional package from class path");
                    self.model.absorb(&package);
                }
            }
        }

        if let Some(value) = settings.bundle_activator.as_deref() {
            match activator::resolve(value, self.model) {
                Ok(name) => {
                    let package = self.model.descriptors().package_of_class(&name.replace('.', "/"));
                    self.extra_referred.insert(package);
                    self.activator = Some(name);
                }
                Err(problem) => {
                    self.report_activator_problem(&problem);
                    self.activator_status = Some(ActivatorStatus {
                        class: None,
                        problems: vec![problem],
                    });
                }
            }
        }

        self.classpath_exports = self.model.classpath_exports();
        let contract_instructions =
            self.instructions(config::CONTRACT, Some(settings.contract.as_deref().unwrap_or("*")));
        self.contracts = Contracts::collect(&contract_instructions, self.model.classpath());
        for warning in self.contracts.warnings().to_vec() {
            self.diagnostics
                .warning(DiagnosticKind::Consistency, warning)
                .header(config::CONTRACT);
        }
    }

    fn report_activator_problem(&mut self, problem: &activator::ActivatorProblem) {
        let diagnostic = match problem.severity {
            Severity::Error => self.diagnostics.error(DiagnosticKind::Policy, problem.message.clone()),
            Severity::Warning => self.diagnostics.warning(DiagnosticKind::Policy, problem.message.clone()),
        };
        diagnostic.header(config::BUNDLE_ACTIVATOR);
        if let Some(class) = &self.activator {
            diagnostic.context(class.clone());
        }
    }

    /// Selects the exports among the contained packages.
    fn classify(&mut self) {
        let settings = self.config;
        let mut instructions = self.instructions(config::EXPORT_PACKAGE, settings.export_package.as_deref());
        let contents = self.instructions(config::EXPORT_CONTENTS, settings.export_contents.as_deref());
        for (instruction, attrs) in contents.iter() {
            instructions.append_if_absent(instruction.clone(), attrs.clone());
        }

        let private_names = self.parameters(config::PRIVATE_PACKAGE, settings.private_package.as_deref());
        let mut source = Packages::new();
        for package in self.model.contained() {
            let info = self.model.package_info(&package);
            let attrs = info.map(|i| i.attrs.clone()).unwrap_or_default();
            if info.is_some_and(|i| i.exported) && !private_names.contains_key(package.fqn()) {
                if let Ok(instruction) = Instruction::new(package.fqn()) {
                    instructions.append_if_absent(instruction, Attrs::new());
                }
            }
            source.put(package, attrs);
        }

        let (exports, unused) = filter(self.model, &instructions, &source);
        if !unused.is_empty() {
            self.diagnostics
                .warning(
                    DiagnosticKind::Classification,
                    format!("Unused {} instructions: {}", config::EXPORT_PACKAGE, bracket(&unused)),
                )
                .header(config::EXPORT_PACKAGE)
                .context(unused[0].to_string());
        }
        self.exports = exports;
    }

    /// Stamps a version on each export and copies class-path attributes.
    fn resolve_versions(&mut self) {
        let packages: Vec<PackageRef> = self.exports.keys().cloned().collect();
        for package in packages {
            let info = self.model.package_info(&package).cloned();
            let Some(attrs) = self.exports.get_mut(&package) else {
                continue;
            };
            let explicit = attrs.version().map(str::to_string);
            match self.policy.version_for(explicit.as_deref(), info.as_ref()) {
                Some((version, source)) => {
                    debug!(package = %package, %version, ?source, "export version");
                    if Version::parse(&version).is_err() {
                        self.diagnostics
                            .error(
                                DiagnosticKind::Policy,
                                format!("Export-Package {package} has an invalid version {version}"),
                            )
                            .header(config::EXPORT_PACKAGE)
                            .context(package.fqn());
                    }
                    attrs.put("version", version);
                }
                None => {
                    attrs.remove("version");
                }
            }

            if let Some(exporter) = self.classpath_exports.get(&package) {
                for (key, value) in exporter.iter() {
                    if !Attrs::is_directive(key) && !attrs.contains_key(key) {
                        attrs.put(key, value);
                    }
                }
            }
            remove_attributes(attrs);
        }
    }

    /// Collects referenced packages, filters them with Import-Package and
    /// applies the version policy.
    fn compute_imports(&mut self) {
        let settings = self.config;
        let contained: HashSet<PackageRef> = self.model.contained().into_iter().collect();
        let privates: HashSet<PackageRef> = contained
            .iter()
            .filter(|p| !self.exports.contains(p))
            .cloned()
            .collect();

        let mut referred: BTreeSet<PackageRef> = self.model.external_references();
        referred.extend(
            self.extra_referred
                .iter()
                .filter(|p| !contained.contains(*p))
                .cloned(),
        );

        if referred.iter().any(PackageRef::is_default) || contained.iter().any(PackageRef::is_default) {
            let default = self.model.package_ref(".");
            let names: Vec<String> = self.model.referrers(&default).iter().map(|p| p.fqn().to_string()).collect();
            self.diagnostics
                .error(
                    DiagnosticKind::Classification,
                    format!(
                        "The default package '.' is not permitted by the Import-Package syntax. The following package(s) import from the default package [{}]",
                        names.join(", ")
                    ),
                )
                .header(config::IMPORT_PACKAGE);
        }

        let mut candidates = Packages::new();
        for package in &referred {
            candidates.put(package.clone(), Attrs::new());
        }
        for package in self.exports_to_imports(&privates) {
            candidates.put(package, Attrs::new());
        }
        candidates.retain(|package, _| !package.is_java() && !package.is_default());

        let header = settings.import_package.as_deref().unwrap_or("*");
        if settings.pedantic && header.trim().is_empty() {
            self.diagnostics
                .warning(DiagnosticKind::Classification, format!("Empty {} header", config::IMPORT_PACKAGE))
                .header(config::IMPORT_PACKAGE);
        }
        let instructions = self.instructions(config::IMPORT_PACKAGE, Some(header));
        let (imports, unused) = filter(self.model, &instructions, &candidates);
        let only_wildcard = unused.len() == 1 && unused[0].to_string() == "*";
        if !unused.is_empty() && !only_wildcard {
            self.diagnostics
                .warning(
                    DiagnosticKind::Classification,
                    format!("Unused {} instructions: {}", config::IMPORT_PACKAGE, bracket(&unused)),
                )
                .header(config::IMPORT_PACKAGE)
                .context(unused[0].to_string());
        }
        self.imports = imports;
        self.augment_imports();
    }

    /// Exports that another contained package refers to and that can be
    /// substituted.
    fn exports_to_imports(&self, privates: &HashSet<PackageRef>) -> Vec<PackageRef> {
        self.exports
            .iter()
            .filter(|(package, attrs)| {
                let used = !self.model.referrers(package).is_empty();
                let private_use = self.model.referred(package).iter().any(|r| privates.contains(r));
                let no_import = attrs
                    .get(NOIMPORT_DIRECTIVE)
                    .is_some_and(|v| v.eq_ignore_ascii_case("true"));
                used && !private_use && !no_import
            })
            .map(|(package, _)| package.clone())
            .collect()
    }

    /// Packages of interfaces with the provider-type annotation that a
    /// contained class of another package implements.
    fn provided_packages(&self) -> HashSet<PackageRef> {
        let mut provided = HashSet::new();
        for class in self.model.classes() {
            for interface in &class.interfaces {
                let package = self.model.descriptors().package_of_class(interface);
                if package.binary() == class.package() || provided.contains(&package) {
                    continue;
                }
                let is_provider = self
                    .model
                    .find_class(interface)
                    .is_some_and(|c| c.annotation_types().any(|t| t == PROVIDER_TYPE_ANNOTATION));
                if is_provider {
                    provided.insert(package);
                }
            }
        }
        provided
    }

    fn augment_imports(&mut self) {
        let provided = self.provided_packages();
        let mut unversioned = Vec::new();
        let packages: Vec<PackageRef> = self.imports.keys().cloned().collect();

        for package in packages {
            let export = self
                .exports
                .get(&package)
                .or_else(|| self.classpath_exports.get(&package))
                .cloned()
                .unwrap_or_default();
            let Some(attrs) = self.imports.get_mut(&package) else {
                continue;
            };

            match self.contracts.is_contracted(package.fqn()) {
                Ok(true) => {
                    attrs.remove("version");
                    continue;
                }
                Ok(false) => {}
                Err(error) => {
                    self.diagnostics
                        .error(DiagnosticKind::Consistency, error.to_string())
                        .header(config::IMPORT_PACKAGE)
                        .context(package.fqn());
                }
            }

            if let Some(export_version) = export.version() {
                let provider = match (attrs.get("provide:"), export.get("provide:")) {
                    (Some(value), _) | (None, Some(value)) => value.eq_ignore_ascii_case("true"),
                    (None, None) => provided.contains(&package),
                };
                match self.policy.range_for(export_version, attrs.version(), provider) {
                    Ok(range) if !range.trim().is_empty() => attrs.put("version", range),
                    Ok(_) => {}
                    Err(error) => {
                        self.diagnostics
                            .error(
                                DiagnosticKind::Policy,
                                format!("Invalid version policy for import {package}: {error}"),
                            )
                            .header(config::IMPORT_PACKAGE)
                            .context(package.fqn());
                    }
                }
            }

            if let Some(mandatory) = export.get("mandatory:") {
                for key in mandatory.split(',').map(str::trim).filter(|k| !k.is_empty()) {
                    if !attrs.contains_key(key) {
                        if let Some(value) = export.get(key) {
                            attrs.put(key, value);
                        }
                    }
                }
            }

            remove_attributes(attrs);
            if !attrs.version().is_some_and(VersionRange::is_range) {
                unversioned.push(package.clone());
            }
        }

        if self.config.pedantic && !unversioned.is_empty() {
            let names: Vec<&str> = unversioned.iter().map(|p| p.fqn()).collect();
            self.diagnostics
                .warning(
                    DiagnosticKind::Classification,
                    format!("Imports that lack version ranges: [{}]", names.join(", ")),
                )
                .header(config::IMPORT_PACKAGE);
        }
    }

    /// Adds the `uses:` directive to each export and reports exports whose
    /// API refers to private packages.
    fn compute_uses(&mut self) {
        let shared: HashSet<PackageRef> = self.exports.keys().chain(self.imports.keys()).cloned().collect();

        if !self.config.no_uses {
            let packages: Vec<PackageRef> = self.exports.keys().cloned().collect();
            for package in packages {
                let used: Vec<String> = self
                    .model
                    .reachable_within(&package, &shared)
                    .into_iter()
                    .filter(|p| *p != package && !p.is_java())
                    .map(|p| p.fqn().to_string())
                    .collect();
                let computed = used.join(",");
                let Some(attrs) = self.exports.get_mut(&package) else {
                    continue;
                };
                let uses = match attrs.get("uses:") {
                    Some(existing) => existing.replace(USES_MARKER, &computed).trim().to_string(),
                    None => computed,
                };
                if uses.is_empty() {
                    attrs.remove("uses:");
                } else {
                    attrs.put("uses:", uses);
                }
            }
        }

        let privates: BTreeSet<PackageRef> = self
            .model
            .contained()
            .into_iter()
            .filter(|p| !self.exports.contains(p) && !p.is_java())
            .collect();
        let exported: Vec<PackageRef> = self.exports.keys().cloned().collect();
        for package in exported {
            let references: Vec<String> = self
                .model
                .api_referred(&package)
                .intersection(&privates)
                .map(|p| p.fqn().to_string())
                .collect();
            if !references.is_empty() {
                self.diagnostics
                    .warning(
                        DiagnosticKind::Classification,
                        format!(
                            "Export {},  has {},  private references [{}]",
                            package,
                            references.len(),
                            references.join(", ")
                        ),
                    )
                    .header(config::EXPORT_PACKAGE)
                    .context(package.fqn());
            }
        }
    }

    /// Moves `resolution:=dynamic` imports into DynamicImport-Package.
    fn dynamic_imports(&mut self) {
        let settings = self.config;
        self.dynamic_imports = self.parameters(config::DYNAMICIMPORT_PACKAGE, settings.dynamic_import_package.as_deref());
        let mut moved = Vec::new();
        self.imports.retain(|package, attrs| {
            if attrs.get("resolution:") == Some("dynamic") {
                let mut attrs = attrs.clone();
                attrs.remove("resolution:");
                moved.push((package.fqn().to_string(), attrs));
                false
            } else {
                true
            }
        });
        for (name, attrs) in moved {
            debug!(package = %name, "dynamic import");
            self.dynamic_imports.put(name, attrs);
        }
    }

    fn verify_activator(&mut self) {
        let Some(name) = self.activator.clone() else {
            return;
        };
        let imports = &self.imports;
        let problems = activator::verify(&name, self.model, |package| imports.contains(package));
        for problem in &problems {
            self.report_activator_problem(problem);
        }
        self.activator_status = Some(ActivatorStatus {
            class: Some(name),
            problems,
        });
    }

    fn finish(mut self) -> AnalysisResult {
        let settings = self.config;
        let contained = self.model.contained();
        let private_packages = contained
            .iter()
            .filter(|p| !self.exports.contains(p))
            .cloned()
            .collect();

        let mut requirements = self.contracts.requirements();
        let highest = self.model.classes().map(|c| c.major).max();
        let execution_environment = highest.map(ExecutionEnvironment::from_major);
        if let (Some(major), Some(ee)) = (highest, execution_environment) {
            let ee_filter = if ee.is_unknown() {
                lenient_filter(u32::from(major))
            } else {
                ee.filter()
            };
            let mut attrs = Attrs::new();
            attrs.put("filter:", ee_filter);
            requirements.insert("osgi.ee", attrs);
        }

        let remove_headers = self.instructions(config::REMOVE_HEADERS, settings.remove_headers.as_deref());
        let fixups = self.parameters(config::FIXUP_MESSAGES, settings.fixup_messages.as_deref());
        self.diagnostics.apply_fixups(&fixups);

        self.exports.sort();
        self.imports.sort();
        AnalysisResult {
            exports: self.exports,
            imports: self.imports,
            dynamic_imports: self.dynamic_imports,
            private_packages,
            contained,
            requirements,
            execution_environment,
            activator: self.activator_status,
            diagnostics: self.diagnostics,
            remove_headers,
        }
    }
}

/// Selects and decorates `source` packages with `instructions`.
///
/// Packages are tried in name order. Each instruction, in declaration
/// order, takes every remaining package it matches: negated instructions
/// drop them, others merge the package's attributes with their own. A
/// literal instruction that matched nothing still adds its package. The
/// other instructions that matched nothing, except `*`, are returned.
pub fn filter<'i>(
    model: &PackageModel,
    instructions: &'i Instructions,
    source: &Packages,
) -> (Packages, Vec<&'i Instruction>) {
    let mut result = Packages::new();
    let mut remaining: Vec<PackageRef> = source.keys().filter(|p| !p.is_metadata()).cloned().collect();
    remaining.sort();
    let mut unmatched = Vec::new();

    for (instruction, overlay) in instructions.iter() {
        let mut matched = false;
        remaining.retain(|package| {
            if !instruction.matches(package.fqn()) {
                return true;
            }
            matched = true;
            if !instruction.is_negated() {
                result.merge(package, instruction.is_duplicate(), &[source.get(package), Some(overlay)]);
            }
            false
        });
        if !matched && !instruction.is_any() {
            unmatched.push((instruction, overlay));
        }
    }

    let mut unused = Vec::new();
    for (instruction, overlay) in unmatched {
        match instruction.literal() {
            Some(name) if !instruction.is_negated() => {
                let package = model.package_ref(name);
                result.merge(&package, true, &[Some(overlay)]);
            }
            _ if instruction.is_negated() => {}
            _ => unused.push(instruction),
        }
    }
    (result, unused)
}

/// Applies `-remove-attribute:` and drops attributes whose value is `!`.
fn remove_attributes(attrs: &mut Attrs) {
    if let Some(remove) = attrs.remove(REMOVE_ATTRIBUTE_DIRECTIVE) {
        if let Ok(instructions) = Instructions::parse(&remove) {
            attrs.retain(|key, _| !instructions.selects(key));
        }
    }
    attrs.retain(|_, value| value != "!");
}

fn bracket(instructions: &[&Instruction]) -> String {
    let names: Vec<String> = instructions.iter().map(|i| i.to_string()).collect();
    format!("[{}]", names.join(", "))
}
