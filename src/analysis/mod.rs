//! Bundle analysis.
//!
//! Given a [`PackageModel`](crate::graph::PackageModel) and an
//! [`AnalyzerConfig`](crate::config::AnalyzerConfig), computes the
//! `Export-Package`, `Import-Package` and `DynamicImport-Package` headers
//! of a bundle, the `uses:` constraints between its packages, the
//! requirements it carries and whether its activator is usable.
//!
//! # Example
//!
//! ```rust
//! use bundlescope::analysis::Analyzer;
//! use bundlescope::classfile::builder::ClassFileBuilder;
//! use bundlescope::config::AnalyzerConfig;
//!
//! let mut config = AnalyzerConfig::new();
//! config.set("Export-Package", "com.acme.*").unwrap();
//! let analyzer = Analyzer::new(config);
//!
//! let mut model = analyzer.model();
//! let mut widget = ClassFileBuilder::new("com/acme/Widget");
//! widget.add_field(0x0001, "log", "Lorg/slf4j/Logger;", Vec::new());
//! model.add_class_bytes("com/acme/Widget.class", &widget.build());
//!
//! let result = analyzer.analyze(&mut model);
//! for (name, value) in result.headers() {
//!     println!("{name}: {value}");
//! }
//! assert!(!result.has_errors());
//! ```

pub mod activator;
mod analyzer;
pub mod query;


pub use activator::{ActivatorErrorType, ActivatorProblem, ActivatorStatus};
pub use analyzer::{filter, AnalysisResult, Analyzer, AnalyzerState, USES_MARKER};
pub use query::{expand_classes, select_classes, Query, QueryError, QueryKind};
