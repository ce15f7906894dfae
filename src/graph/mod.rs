//! Package graph module.
//!
//! This module provides the [`PackageModel`], which aggregates decoded
//! classes into packages and tracks which packages each package refers to,
//! together with the [`Descriptors`] interner and the [`Packages`] clause
//! map used for the export and import headers.
//!
//! # Example
//!
//! ```rust
//! use bundlescope::classfile::builder::ClassFileBuilder;
//! use bundlescope::graph::PackageModel;
//!
//! let mut model = PackageModel::default();
//! let mut api = ClassFileBuilder::new("com/acme/api/Greeter");
//! api.add_interface("org/slf4j/Logger");
//! model.add_class_bytes("com/acme/api/Greeter.class", &api.build());
//!
//! assert_eq!(model.contained().len(), 1);
//! assert!(model
//!     .external_references()
//!     .contains(&model.package_ref("org.slf4j")));
//! ```

mod descriptors;
mod package_model;
mod packages;

pub use descriptors::{Descriptors, PackageRef};
pub use package_model::{
    ClasspathEntry, DecodeFailure, PackageInfo, PackageModel, EXPORT_ANNOTATION, PROVIDER_TYPE_ANNOTATION,
    VERSION_ANNOTATION,
};
pub use packages::Packages;
