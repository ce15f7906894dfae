//! Output of analysis results.
//!
//! This module provides exporters for analysis results in several
//! formats: manifest headers, JSON and Markdown.

pub mod json;
pub mod manifest;
pub mod markdown;

use crate::analysis::AnalysisResult;
use crate::graph::PackageModel;
use std::io::{self, Write};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Manifest headers, wrapped as in `META-INF/MANIFEST.MF`
    Manifest,
    /// JSON format - machine-readable, full data
    Json,
    /// Markdown format - documentation/reporting
    Markdown,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "manifest" | "mf" => Ok(ExportFormat::Manifest),
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            _ => Err(format!(
                "Unknown export format: '{}'. Valid formats: manifest, json, markdown",
                s
            )),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Manifest => write!(f, "manifest"),
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Markdown => write!(f, "markdown"),
        }
    }
}

/// Data container for export operations.
#[derive(Debug, Clone)]
pub struct ExportData<'a> {
    /// Name of the analyzed bundle, usually its directory name
    pub bundle_name: String,
    /// Number of classes in the bundle
    pub class_count: usize,
    pub result: &'a AnalysisResult,
}

impl<'a> ExportData<'a> {
    pub fn new(bundle_name: impl Into<String>, model: &PackageModel, result: &'a AnalysisResult) -> Self {
        Self {
            bundle_name: bundle_name.into(),
            class_count: model.class_count(),
            result,
        }
    }

    pub fn error_count(&self) -> usize {
        self.result.diagnostics.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.result.diagnostics.warnings().count()
    }
}

/// Trait for exporters.
pub trait Exporter {
    /// Export the data to the given writer.
    fn export<W: Write>(&self, data: &ExportData<'_>, writer: &mut W) -> io::Result<()>;
}

/// Export data in the specified format.
pub fn export<W: Write>(format: ExportFormat, data: &ExportData<'_>, writer: &mut W) -> io::Result<()> {
    match format {
        ExportFormat::Manifest => manifest::ManifestExporter.export(data, writer),
        ExportFormat::Json => json::JsonExporter.export(data, writer),
        ExportFormat::Markdown => markdown::MarkdownExporter.export(data, writer),
    }
}

/// Export data to a string.
pub fn export_to_string(format: ExportFormat, data: &ExportData<'_>) -> io::Result<String> {
    let mut buffer = Vec::new();
    export(format, data, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::analysis::{AnalysisResult, Analyzer};
    use crate::classfile::builder::ClassFileBuilder;
    use crate::config::AnalyzerConfig;
    use crate::graph::PackageModel;

    /// A small bundle: an exported API with a versioned export, a private
    /// implementation and an abstract activator.
    pub fn analyzed() -> (PackageModel, AnalysisResult) {
        let mut config = AnalyzerConfig::new();
        config
            .set("Export-Package", "com.acme.api;version=1.2")
            .unwrap()
            .set("Bundle-Activator", "com.acme.impl.Activator")
            .unwrap();
        let analyzer = Analyzer::new(config);
        let mut model = analyzer.model();

        let mut api = ClassFileBuilder::new("com/acme/api/Greeter");
        api.add_field(0x0001, "log", "Lorg/slf4j/Logger;", Vec::new());
        model.add_class_bytes("com/acme/api/Greeter.class", &api.build());

        let mut activator = ClassFileBuilder::new("com/acme/impl/Activator");
        activator
            .set_access(0x0001 | 0x0020 | 0x0400)
            .add_interface("org/osgi/framework/BundleActivator")
            .add_interface("com/acme/api/Greeter")
            .add_default_constructor();
        model.add_class_bytes("com/acme/impl/Activator.class", &activator.build());

        let result = analyzer.analyze(&mut model);
        (model, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert_eq!("MF".parse::<ExportFormat>().unwrap(), ExportFormat::Manifest);
        assert_eq!("md".parse::<ExportFormat>().unwrap(), ExportFormat::Markdown);
        assert!("csv".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_export_format_display() {
        assert_eq!(format!("{}", ExportFormat::Manifest), "manifest");
        assert_eq!(format!("{}", ExportFormat::Json), "json");
        assert_eq!(format!("{}", ExportFormat::Markdown), "markdown");
    }

    #[test]
    fn test_export_data_counts() {
        let (model, result) = fixtures::analyzed();
        let data = ExportData::new("acme", &model, &result);
        assert_eq!(data.class_count, 2);
        assert_eq!(data.error_count(), 1);
        assert_eq!(data.warning_count(), 0);
        for format in [ExportFormat::Manifest, ExportFormat::Json, ExportFormat::Markdown] {
            assert!(!export_to_string(format, &data).unwrap().is_empty());
        }
    }
}
