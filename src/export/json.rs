//! JSON export implementation.
//!
//! Exports analysis results in JSON format for machine-readable output.

use super::{ExportData, Exporter};
use crate::analysis::ActivatorStatus;
use crate::diagnostics::Diagnostics;
use crate::graph::Packages;
use crate::header::{strip_duplicate_marker, Attrs, Parameters};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};

/// JSON exporter implementation.
pub struct JsonExporter;

/// One clause of a header.
#[derive(Serialize)]
struct JsonClause {
    name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct JsonSummary {
    classes: usize,
    contained_packages: usize,
    exports: usize,
    imports: usize,
    errors: usize,
    warnings: usize,
}

/// Root JSON export structure.
#[derive(Serialize)]
struct JsonExport<'a> {
    bundle: &'a str,
    summary: JsonSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    execution_environment: Option<String>,
    exports: Vec<JsonClause>,
    imports: Vec<JsonClause>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    dynamic_imports: Vec<JsonClause>,
    private_packages: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    requirements: Vec<JsonClause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    activator: Option<&'a ActivatorStatus>,
    diagnostics: &'a Diagnostics,
    headers: BTreeMap<String, String>,
}

fn clause(name: &str, attrs: &Attrs) -> JsonClause {
    JsonClause {
        name: strip_duplicate_marker(name).to_string(),
        attributes: attrs
            .iter()
            .filter(|(key, _)| !key.starts_with('-'))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect(),
    }
}

fn packages(packages: &Packages) -> Vec<JsonClause> {
    packages.iter().map(|(p, attrs)| clause(p.fqn(), attrs)).collect()
}

fn parameters(parameters: &Parameters) -> Vec<JsonClause> {
    parameters.iter().map(|(name, attrs)| clause(name, attrs)).collect()
}

impl Exporter for JsonExporter {
    fn export<W: Write>(&self, data: &ExportData<'_>, writer: &mut W) -> io::Result<()> {
        let result = data.result;
        let export = JsonExport {
            bundle: &data.bundle_name,
            summary: JsonSummary {
                classes: data.class_count,
                contained_packages: result.contained.len(),
                exports: result.exports.len(),
                imports: result.imports.len(),
                errors: data.error_count(),
                warnings: data.warning_count(),
            },
            execution_environment: result.execution_environment.map(|ee| ee.name()),
            exports: packages(&result.exports),
            imports: packages(&result.imports),
            dynamic_imports: parameters(&result.dynamic_imports),
            private_packages: result.private_packages.iter().map(|p| p.fqn()).collect(),
            requirements: parameters(&result.requirements),
            activator: result.activator.as_ref(),
            diagnostics: &result.diagnostics,
            headers: result.headers().into_iter().collect(),
        };

        let json = serde_json::to_string_pretty(&export)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        writeln!(writer, "{}", json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures;

    fn exported() -> serde_json::Value {
        let (model, result) = fixtures::analyzed();
        let data = ExportData::new("acme", &model, &result);
        let mut output = Vec::new();
        JsonExporter.export(&data, &mut output).unwrap();
        serde_json::from_slice(&output).unwrap()
    }

    #[test]
    fn test_json_export_summary() {
        let parsed = exported();
        assert_eq!(parsed["bundle"], "acme");
        assert_eq!(parsed["summary"]["classes"], 2);
        assert_eq!(parsed["summary"]["exports"], 1);
        assert_eq!(parsed["summary"]["errors"], 1);
        assert_eq!(parsed["execution_environment"], "JavaSE-1.8");
    }

    #[test]
    fn test_json_export_clauses() {
        let parsed = exported();
        let exports = parsed["exports"].as_array().unwrap();
        assert_eq!(exports[0]["name"], "com.acme.api");
        assert_eq!(exports[0]["attributes"]["version"], "1.2.0");
        assert_eq!(exports[0]["attributes"]["uses:"], "org.slf4j");

        let imports: Vec<&str> = parsed["imports"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|i| i["name"].as_str())
            .collect();
        assert_eq!(imports, vec!["com.acme.api", "org.osgi.framework", "org.slf4j"]);
        assert_eq!(parsed["private_packages"][0], "com.acme.impl");
    }

    #[test]
    fn test_json_export_activator_and_diagnostics() {
        let parsed = exported();
        assert_eq!(parsed["activator"]["class"], "com.acme.impl.Activator");
        assert_eq!(parsed["activator"]["problems"][0]["error_type"], "IS_ABSTRACT");
        assert_eq!(parsed["diagnostics"][0]["severity"], "error");
        assert_eq!(parsed["diagnostics"][0]["kind"], "policy");
        assert_eq!(parsed["headers"]["Bundle-Activator"], "com.acme.impl.Activator");
    }
}
