//! Markdown export implementation.
//!
//! Exports analysis results in Markdown format for documentation and reporting.

use super::{ExportData, Exporter};
use crate::graph::Packages;
use crate::header::Attrs;
use std::io::{self, Write};

/// Markdown exporter implementation.
pub struct MarkdownExporter;

/// Attributes other than `version` and `uses:`, as `key=value` pairs.
fn other_attributes(attrs: &Attrs) -> String {
    let others: Vec<String> = attrs
        .iter()
        .filter(|(key, _)| !matches!(*key, "version" | "uses:") && !key.starts_with('-'))
        .map(|(key, value)| format!("`{}={}`", key, value))
        .collect();
    others.join(" ")
}

fn write_packages<W: Write>(writer: &mut W, title: &str, packages: &Packages, with_uses: bool) -> io::Result<()> {
    if packages.is_empty() {
        return Ok(());
    }
    writeln!(writer, "### {} ({})", title, packages.len())?;
    writeln!(writer)?;
    if with_uses {
        writeln!(writer, "| Package | Version | Uses |")?;
        writeln!(writer, "|---------|---------|------|")?;
    } else {
        writeln!(writer, "| Package | Version | Attributes |")?;
        writeln!(writer, "|---------|---------|------------|")?;
    }
    for (package, attrs) in packages.iter() {
        let last = if with_uses {
            attrs.get_list("uses:").join(", ")
        } else {
            other_attributes(attrs)
        };
        writeln!(
            writer,
            "| {} | {} | {} |",
            package,
            attrs.version().unwrap_or("-"),
            last
        )?;
    }
    writeln!(writer)
}

impl Exporter for MarkdownExporter {
    fn export<W: Write>(&self, data: &ExportData<'_>, writer: &mut W) -> io::Result<()> {
        let result = data.result;

        // Title
        writeln!(writer, "# Bundle Analysis Report")?;
        writeln!(writer)?;
        writeln!(writer, "**Bundle:** {}", data.bundle_name)?;
        writeln!(writer)?;

        // Summary section
        writeln!(writer, "## Summary")?;
        writeln!(writer)?;
        writeln!(writer, "| Metric | Count |")?;
        writeln!(writer, "|--------|-------|")?;
        writeln!(writer, "| Classes | {} |", data.class_count)?;
        writeln!(writer, "| Contained Packages | {} |", result.contained.len())?;
        writeln!(writer, "| Exported Packages | {} |", result.exports.len())?;
        writeln!(writer, "| Imported Packages | {} |", result.imports.len())?;
        writeln!(writer, "| Private Packages | {} |", result.private_packages.len())?;
        writeln!(writer, "| Errors | {} |", data.error_count())?;
        writeln!(writer, "| Warnings | {} |", data.warning_count())?;
        if let Some(ee) = result.execution_environment {
            writeln!(writer, "| Execution Environment | {} |", ee)?;
        }
        writeln!(writer)?;

        writeln!(writer, "## Packages")?;
        writeln!(writer)?;
        write_packages(writer, "Exported Packages", &result.exports, true)?;
        write_packages(writer, "Imported Packages", &result.imports, false)?;

        if !result.dynamic_imports.is_empty() {
            writeln!(writer, "### Dynamic Imports")?;
            writeln!(writer)?;
            for (name, attrs) in result.dynamic_imports.iter() {
                match attrs.version() {
                    Some(version) => writeln!(writer, "- `{}` {}", name, version)?,
                    None => writeln!(writer, "- `{}`", name)?,
                }
            }
            writeln!(writer)?;
        }

        if !result.private_packages.is_empty() {
            writeln!(writer, "### Private Packages ({})", result.private_packages.len())?;
            writeln!(writer)?;
            for package in &result.private_packages {
                writeln!(writer, "- `{}`", package)?;
            }
            writeln!(writer)?;
        }

        if let Some(status) = &result.activator {
            writeln!(writer, "## Activator")?;
            writeln!(writer)?;
            match &status.class {
                Some(class) => writeln!(writer, "**Class:** `{}`", class)?,
                None => writeln!(writer, "**Class:** unresolved")?,
            }
            writeln!(writer)?;
            if status.is_valid() {
                writeln!(writer, "The activator is valid.")?;
                writeln!(writer)?;
            }
        }

        // Issues section
        if !result.diagnostics.is_empty() {
            writeln!(writer, "## Issues")?;
            writeln!(writer)?;
            writeln!(writer, "| Severity | Header | Message |")?;
            writeln!(writer, "|----------|--------|---------|")?;
            for diagnostic in result.diagnostics.iter() {
                writeln!(
                    writer,
                    "| {} | {} | {} |",
                    diagnostic.severity,
                    diagnostic.header.as_deref().unwrap_or("-"),
                    diagnostic.message.replace('|', "\\|")
                )?;
            }
            writeln!(writer)?;
        }

        // Footer
        writeln!(writer, "---")?;
        writeln!(writer, "*Generated by bundlescope*")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::fixtures;

    fn report() -> String {
        let (model, result) = fixtures::analyzed();
        let data = ExportData::new("acme", &model, &result);
        let mut output = Vec::new();
        MarkdownExporter.export(&data, &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_markdown_export_basic() {
        let md = report();
        assert!(md.contains("# Bundle Analysis Report"));
        assert!(md.contains("**Bundle:** acme"));
        assert!(md.contains("| Classes | 2 |"));
        assert!(md.contains("| Execution Environment | JavaSE-1.8 |"));
        assert!(md.contains("*Generated by bundlescope*"));
    }

    #[test]
    fn test_markdown_export_packages() {
        let md = report();
        assert!(md.contains("### Exported Packages (1)"));
        assert!(md.contains("| com.acme.api | 1.2.0 | org.slf4j |"));
        assert!(md.contains("| org.slf4j | - |  |"));
        assert!(md.contains("- `com.acme.impl`"));
    }

    #[test]
    fn test_markdown_export_issues() {
        let md = report();
        assert!(md.contains("## Activator"));
        assert!(md.contains("**Class:** `com.acme.impl.Activator`"));
        assert!(!md.contains("The activator is valid."));
        assert!(md.contains("| error | Bundle-Activator | The Bundle Activator com.acme.impl.Activator is abstract"));
    }

    #[test]
    fn test_other_attributes() {
        let mut attrs = Attrs::new();
        attrs.put("version", "1.0");
        attrs.put("resolution:", "optional");
        attrs.put("-internal-source:", "x");
        assert_eq!(other_attributes(&attrs), "`resolution:=optional`");
    }
}
