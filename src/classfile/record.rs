//! The decoded form of one class file.

use std::collections::BTreeSet;

use super::annotation::{Annotation, ConstValue, ElementValue, TypeAnnotation};
use super::java::ExecutionEnvironment;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SUPER: u16 = 0x0020;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;
pub const ACC_MODULE: u16 = 0x8000;

/// Access flags of a class or member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AccessFlags(pub u16);

impl AccessFlags {
    pub fn contains(&self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    pub fn is_public(&self) -> bool {
        self.contains(ACC_PUBLIC)
    }

    pub fn is_protected(&self) -> bool {
        self.contains(ACC_PROTECTED)
    }

    pub fn is_static(&self) -> bool {
        self.contains(ACC_STATIC)
    }

    pub fn is_abstract(&self) -> bool {
        self.contains(ACC_ABSTRACT)
    }

    pub fn is_interface(&self) -> bool {
        self.contains(ACC_INTERFACE)
    }

    pub fn is_annotation(&self) -> bool {
        self.contains(ACC_ANNOTATION)
    }

    pub fn is_enum(&self) -> bool {
        self.contains(ACC_ENUM)
    }

    pub fn is_synthetic(&self) -> bool {
        self.contains(ACC_SYNTHETIC)
    }

    pub fn is_module(&self) -> bool {
        self.contains(ACC_MODULE)
    }
}

/// Nesting of a class relative to its enclosing class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NestKind {
    #[default]
    TopLevel,
    StaticNested,
    Inner,
    Local,
    Anonymous,
}

impl NestKind {
    /// Inner, local and anonymous classes capture an enclosing instance.
    pub fn is_inner(&self) -> bool {
        matches!(self, NestKind::Inner | NestKind::Local | NestKind::Anonymous)
    }
}

/// One `InnerClasses` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassEntry {
    pub inner_class: String,
    pub outer_class: Option<String>,
    pub inner_name: Option<String>,
    pub access: AccessFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnclosingMethod {
    pub class: String,
    pub method: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub constant: Option<ConstValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub access: AccessFlags,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub parameter_names: Vec<Option<String>>,
    pub default_value: Option<ElementValue>,
}

impl MethodDef {
    pub fn is_constructor(&self) -> bool {
        self.name == "<init>"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleDescriptor {
    pub name: String,
    pub version: Option<String>,
    pub requires: Vec<String>,
    /// Exported packages, slash separated.
    pub exports: Vec<String>,
    pub opens: Vec<String>,
    pub uses: Vec<String>,
    pub provides: Vec<(String, Vec<String>)>,
}

/// One decoded class file.
///
/// Type and package names are binary names, slash separated. Records are
/// built by [`super::decode`] and never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassRecord {
    pub name: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub access: AccessFlags,
    pub major: u16,
    pub minor: u16,
    pub source_file: Option<String>,
    pub signature: Option<String>,
    /// Every class this class mentions.
    pub referenced_types: BTreeSet<String>,
    /// Packages of `referenced_types`, without primitives.
    pub referenced_packages: BTreeSet<String>,
    /// Packages visible through the public or protected API.
    pub api_packages: BTreeSet<String>,
    pub annotations: Vec<Annotation>,
    pub type_annotations: Vec<TypeAnnotation>,
    pub nest: NestKind,
    pub inner_classes: Vec<InnerClassEntry>,
    pub enclosing_method: Option<EnclosingMethod>,
    pub fields: Vec<FieldDef>,
    pub methods: Vec<MethodDef>,
    pub module: Option<ModuleDescriptor>,
    pub has_runtime_annotations: bool,
    pub has_class_annotations: bool,
    pub has_default_constructor: bool,
}

impl ClassRecord {
    /// Slash separated package of this class, empty for the default package.
    pub fn package(&self) -> &str {
        package_of(&self.name)
    }

    /// Dotted name, keeping `$` for nested classes.
    pub fn fqn(&self) -> String {
        self.name.replace('/', ".")
    }

    pub fn execution_environment(&self) -> ExecutionEnvironment {
        ExecutionEnvironment::from_major(self.major)
    }

    pub fn is_module(&self) -> bool {
        self.access.is_module()
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn is_abstract(&self) -> bool {
        self.access.is_abstract()
    }

    pub fn is_public(&self) -> bool {
        self.access.is_public()
    }

    pub fn is_package_info(&self) -> bool {
        self.name == "package-info" || self.name.ends_with("/package-info")
    }

    /// Binary names of all annotation types on the class or its members.
    pub fn annotation_types(&self) -> impl Iterator<Item = &str> {
        self.annotations.iter().map(|a| a.type_name.as_str())
    }

    pub fn class_annotation(&self, type_name: &str) -> Option<&Annotation> {
        self.annotations
            .iter()
            .find(|a| a.member.is_none() && a.parameter.is_none() && a.type_name == type_name)
    }
}

/// Slash separated package of a binary type name.
pub fn package_of(binary_name: &str) -> &str {
    match binary_name.rfind('/') {
        Some(i) => &binary_name[..i],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_of() {
        assert_eq!(package_of("a/b/C"), "a/b");
        assert_eq!(package_of("C"), "");
        assert_eq!(package_of("a/b/C$D"), "a/b");
    }

    #[test]
    fn test_nest_kind_inner() {
        assert!(!NestKind::TopLevel.is_inner());
        assert!(!NestKind::StaticNested.is_inner());
        assert!(NestKind::Inner.is_inner());
        assert!(NestKind::Local.is_inner());
        assert!(NestKind::Anonymous.is_inner());
    }

    #[test]
    fn test_access_flags() {
        let flags = AccessFlags(ACC_PUBLIC | ACC_ABSTRACT | ACC_INTERFACE);
        assert!(flags.is_public());
        assert!(flags.is_interface());
        assert!(!flags.is_enum());
    }
}
