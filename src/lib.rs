//! BundleScope - class-file dependency analyzer for OSGi bundles
//!
//! This crate decodes Java class files, builds a package dependency graph
//! and computes the manifest headers of an OSGi bundle from it:
//! `Export-Package`, `Import-Package` with version ranges, `uses:`
//! constraints, `DynamicImport-Package` and `Require-Capability`.
//!
//! The pipeline is:
//!
//! 1. [`classfile`] decodes class files into [`classfile::ClassRecord`]s.
//! 2. [`graph::PackageModel`] groups them into packages and tracks which
//!    packages refer to which.
//! 3. [`analysis::Analyzer`] applies the instruction headers of an
//!    [`config::AnalyzerConfig`] and reports problems as
//!    [`diagnostics::Diagnostics`].
//! 4. [`export`] writes the result as a manifest, JSON or Markdown.

pub mod analysis;
pub mod classfile;
pub mod config;
pub mod diagnostics;
pub mod export;
pub mod graph;
pub mod header;
pub mod instruction;
pub mod policy;
pub mod source;
