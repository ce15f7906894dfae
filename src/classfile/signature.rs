//! Descriptor and generic signature parsing.
//!
//! Field and method descriptors are a subset of the generic signature
//! grammar, so one recursive-descent parser handles both. The resulting AST
//! can be walked to collect every class a signature mentions, including
//! classes nested inside type arguments, bounds and generic arrays.
//!
//! # Example
//!
//! ```rust
//! use bundlescope::classfile::signature::parse_field_signature;
//! use std::collections::BTreeSet;
//!
//! let ty = parse_field_signature("Ljava/util/Map<Ljava/lang/String;+La/B;>;").unwrap();
//! let mut classes = BTreeSet::new();
//! ty.collect_classes(&mut classes);
//! assert!(classes.contains("a/B"));
//! assert!(classes.contains("java/util/Map"));
//! ```

use std::collections::BTreeSet;
use std::fmt;

use super::{DecodeError, DecodeResult};

/// A Java type as it appears in a descriptor or signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JavaType {
    /// One of `B C D F I J S Z`.
    Base(char),
    Class(ClassTypeSignature),
    Array(Box<JavaType>),
    TypeVariable(String),
}

/// One segment of a possibly nested class type, `Outer<T>.Inner<U>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleClassType {
    pub name: String,
    pub type_arguments: Vec<TypeArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassTypeSignature {
    /// Slash separated package, empty for the default package.
    pub package: String,
    pub segments: Vec<SimpleClassType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeArgument {
    /// `*`
    Unbounded,
    /// `+T`
    Extends(JavaType),
    /// `-T`
    Super(JavaType),
    Exact(JavaType),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeParameter {
    pub name: String,
    pub class_bound: Option<JavaType>,
    pub interface_bounds: Vec<JavaType>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub superclass: ClassTypeSignature,
    pub interfaces: Vec<ClassTypeSignature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub type_parameters: Vec<TypeParameter>,
    pub parameters: Vec<JavaType>,
    /// `None` for `void`.
    pub result: Option<JavaType>,
    pub throws: Vec<JavaType>,
}

impl ClassTypeSignature {
    /// Binary name with nested segments joined by `$`.
    pub fn binary_name(&self) -> String {
        let simple = self
            .segments
            .iter()
            .map(|segment| segment.name.as_str())
            .collect::<Vec<_>>()
            .join("$");
        if self.package.is_empty() {
            simple
        } else {
            format!("{}/{}", self.package, simple)
        }
    }

    pub fn collect_classes(&self, out: &mut BTreeSet<String>) {
        out.insert(self.binary_name());
        for segment in &self.segments {
            for argument in &segment.type_arguments {
                argument.collect_classes(out);
            }
        }
    }
}

impl TypeArgument {
    pub fn collect_classes(&self, out: &mut BTreeSet<String>) {
        match self {
            TypeArgument::Unbounded => {}
            TypeArgument::Extends(ty) | TypeArgument::Super(ty) | TypeArgument::Exact(ty) => {
                ty.collect_classes(out)
            }
        }
    }
}

impl JavaType {
    /// Adds the binary name of every class this type mentions to `out`.
    pub fn collect_classes(&self, out: &mut BTreeSet<String>) {
        match self {
            JavaType::Base(_) | JavaType::TypeVariable(_) => {}
            JavaType::Class(class) => class.collect_classes(out),
            JavaType::Array(component) => component.collect_classes(out),
        }
    }

    /// Innermost non-array type.
    pub fn element_type(&self) -> &JavaType {
        match self {
            JavaType::Array(component) => component.element_type(),
            other => other,
        }
    }
}

impl TypeParameter {
    fn collect_classes(&self, out: &mut BTreeSet<String>) {
        if let Some(bound) = &self.class_bound {
            bound.collect_classes(out);
        }
        for bound in &self.interface_bounds {
            bound.collect_classes(out);
        }
    }
}

impl ClassSignature {
    pub fn collect_classes(&self, out: &mut BTreeSet<String>) {
        for parameter in &self.type_parameters {
            parameter.collect_classes(out);
        }
        self.superclass.collect_classes(out);
        for interface in &self.interfaces {
            interface.collect_classes(out);
        }
    }
}

impl MethodSignature {
    pub fn collect_classes(&self, out: &mut BTreeSet<String>) {
        for parameter in &self.type_parameters {
            parameter.collect_classes(out);
        }
        for ty in self.parameters.iter().chain(&self.result).chain(&self.throws) {
            ty.collect_classes(out);
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Base(c) => write!(f, "{c}"),
            JavaType::Class(class) => write!(f, "{class}"),
            JavaType::Array(component) => write!(f, "[{component}"),
            JavaType::TypeVariable(name) => write!(f, "T{name};"),
        }
    }
}

impl fmt::Display for ClassTypeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L")?;
        if !self.package.is_empty() {
            write!(f, "{}/", self.package)?;
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", segment.name)?;
            if !segment.type_arguments.is_empty() {
                write!(f, "<")?;
                for argument in &segment.type_arguments {
                    match argument {
                        TypeArgument::Unbounded => write!(f, "*")?,
                        TypeArgument::Extends(ty) => write!(f, "+{ty}")?,
                        TypeArgument::Super(ty) => write!(f, "-{ty}")?,
                        TypeArgument::Exact(ty) => write!(f, "{ty}")?,
                    }
                }
                write!(f, ">")?;
            }
        }
        write!(f, ";")
    }
}

/// Parses a field descriptor or a field signature.
pub fn parse_field_signature(signature: &str) -> DecodeResult<JavaType> {
    let mut parser = SignatureParser::new(signature);
    let ty = parser.field_type()?;
    parser.finish()?;
    Ok(ty)
}

/// Parses a method descriptor or a method signature.
pub fn parse_method_signature(signature: &str) -> DecodeResult<MethodSignature> {
    let mut parser = SignatureParser::new(signature);
    let type_parameters = parser.type_parameters()?;
    parser.expect(b'(')?;
    let mut parameters = Vec::new();
    while parser.peek() != Some(b')') {
        parameters.push(parser.field_type()?);
    }
    parser.expect(b')')?;
    let result = if parser.peek() == Some(b'V') {
        parser.bump();
        None
    } else {
        Some(parser.field_type()?)
    };
    let mut throws = Vec::new();
    while parser.peek() == Some(b'^') {
        parser.bump();
        throws.push(parser.field_type()?);
    }
    parser.finish()?;
    Ok(MethodSignature {
        type_parameters,
        parameters,
        result,
        throws,
    })
}

/// Parses a class signature.
pub fn parse_class_signature(signature: &str) -> DecodeResult<ClassSignature> {
    let mut parser = SignatureParser::new(signature);
    let type_parameters = parser.type_parameters()?;
    let superclass = parser.class_type()?;
    let mut interfaces = Vec::new();
    while parser.peek().is_some() {
        interfaces.push(parser.class_type()?);
    }
    Ok(ClassSignature {
        type_parameters,
        superclass,
        interfaces,
    })
}

/// Parses a `CONSTANT_Class` name, which is either a binary class name or an
/// array descriptor, and returns the class it names, if any.
pub fn class_constant_target(name: &str) -> DecodeResult<Option<String>> {
    if name.starts_with('[') {
        let ty = parse_field_signature(name)?;
        Ok(match ty.element_type() {
            JavaType::Class(class) => Some(class.binary_name()),
            _ => None,
        })
    } else {
        Ok(Some(name.to_string()))
    }
}

struct SignatureParser<'a> {
    text: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SignatureParser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            bytes: text.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, reason: &str) -> DecodeError {
        DecodeError::InvalidSignature {
            signature: self.text.to_string(),
            reason: format!("{reason} at position {}", self.pos),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn expect(&mut self, expected: u8) -> DecodeResult<()> {
        if self.peek() == Some(expected) {
            self.bump();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected as char)))
        }
    }

    fn finish(&self) -> DecodeResult<()> {
        if self.pos == self.bytes.len() {
            Ok(())
        } else {
            Err(self.error("trailing characters"))
        }
    }

    fn identifier(&mut self, terminators: &[u8]) -> DecodeResult<&'a str> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if terminators.contains(&b) {
                break;
            }
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("empty identifier"));
        }
        Ok(&self.text[start..self.pos])
    }

    fn type_parameters(&mut self) -> DecodeResult<Vec<TypeParameter>> {
        let mut parameters = Vec::new();
        if self.peek() != Some(b'<') {
            return Ok(parameters);
        }
        self.bump();
        while self.peek() != Some(b'>') {
            let name = self.identifier(b":>;")?.to_string();
            self.expect(b':')?;
            let class_bound = match self.peek() {
                Some(b':') | Some(b'>') | None => None,
                _ => Some(self.field_type()?),
            };
            let mut interface_bounds = Vec::new();
            while self.peek() == Some(b':') {
                self.bump();
                interface_bounds.push(self.field_type()?);
            }
            parameters.push(TypeParameter {
                name,
                class_bound,
                interface_bounds,
            });
        }
        self.expect(b'>')?;
        if parameters.is_empty() {
            return Err(self.error("empty type parameter list"));
        }
        Ok(parameters)
    }

    fn field_type(&mut self) -> DecodeResult<JavaType> {
        match self.peek() {
            Some(c @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z')) => {
                self.bump();
                Ok(JavaType::Base(c as char))
            }
            Some(b'L') => Ok(JavaType::Class(self.class_type()?)),
            Some(b'[') => {
                self.bump();
                Ok(JavaType::Array(Box::new(self.field_type()?)))
            }
            Some(b'T') => {
                self.bump();
                let name = self.identifier(b";")?.to_string();
                self.expect(b';')?;
                Ok(JavaType::TypeVariable(name))
            }
            Some(_) => Err(self.error("unexpected type tag")),
            None => Err(self.error("unexpected end of signature")),
        }
    }

    fn class_type(&mut self) -> DecodeResult<ClassTypeSignature> {
        self.expect(b'L')?;
        let path = self.identifier(b"<.;")?;
        let (package, first) = match path.rfind('/') {
            Some(i) => (&path[..i], &path[i + 1..]),
            None => ("", path),
        };
        if first.is_empty() {
            return Err(self.error("empty class name"));
        }

        let mut segments = vec![SimpleClassType {
            name: first.to_string(),
            type_arguments: self.type_arguments()?,
        }];
        while self.peek() == Some(b'.') {
            self.bump();
            let name = self.identifier(b"<.;")?.to_string();
            segments.push(SimpleClassType {
                name,
                type_arguments: self.type_arguments()?,
            });
        }
        self.expect(b';')?;
        Ok(ClassTypeSignature {
            package: package.to_string(),
            segments,
        })
    }

    fn type_arguments(&mut self) -> DecodeResult<Vec<TypeArgument>> {
        let mut arguments = Vec::new();
        if self.peek() != Some(b'<') {
            return Ok(arguments);
        }
        self.bump();
        while self.peek() != Some(b'>') {
            let argument = match self.peek() {
                Some(b'*') => {
                    self.bump();
                    TypeArgument::Unbounded
                }
                Some(b'+') => {
                    self.bump();
                    TypeArgument::Extends(self.field_type()?)
                }
                Some(b'-') => {
                    self.bump();
                    TypeArgument::Super(self.field_type()?)
                }
                None => return Err(self.error("unterminated type arguments")),
                _ => TypeArgument::Exact(self.field_type()?),
            };
            arguments.push(argument);
        }
        self.bump();
        if arguments.is_empty() {
            return Err(self.error("empty type argument list"));
        }
        Ok(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classes_of(ty: &JavaType) -> Vec<String> {
        let mut out = BTreeSet::new();
        ty.collect_classes(&mut out);
        out.into_iter().collect()
    }

    #[test]
    fn test_base_and_array_descriptors() {
        assert_eq!(parse_field_signature("I").unwrap(), JavaType::Base('I'));
        let ty = parse_field_signature("[[Ljava/lang/String;").unwrap();
        assert_eq!(classes_of(&ty), vec!["java/lang/String"]);
        assert_eq!(ty.to_string(), "[[Ljava/lang/String;");
    }

    #[test]
    fn test_nested_generic_arguments() {
        let ty = parse_field_signature(
            "Ljava/util/Map<La/K;Ljava/util/List<+Lb/V<-Lc/W;>;>;>;",
        )
        .unwrap();
        assert_eq!(
            classes_of(&ty),
            vec!["a/K", "b/V", "c/W", "java/util/List", "java/util/Map"]
        );
    }

    #[test]
    fn test_inner_class_segments() {
        let ty = parse_field_signature("Lp/Outer<TT;>.Inner<Lq/Arg;>;").unwrap();
        match &ty {
            JavaType::Class(class) => {
                assert_eq!(class.binary_name(), "p/Outer$Inner");
                assert_eq!(class.segments.len(), 2);
            }
            other => panic!("unexpected type {other:?}"),
        }
        assert_eq!(classes_of(&ty), vec!["p/Outer$Inner", "q/Arg"]);
    }

    #[test]
    fn test_generic_array_and_wildcards() {
        let ty = parse_field_signature("[Ljava/util/List<*>;").unwrap();
        assert_eq!(classes_of(&ty), vec!["java/util/List"]);
        let ty = parse_field_signature("[TT;").unwrap();
        assert!(classes_of(&ty).is_empty());
    }

    #[test]
    fn test_method_signature_with_bounds_and_throws() {
        let sig = parse_method_signature(
            "<T:Ljava/lang/Object;:Lx/Marker;>(TT;[I)Ly/Result<TT;>;^Lz/Failure;^TE;",
        )
        .unwrap();
        assert_eq!(sig.type_parameters.len(), 1);
        assert_eq!(sig.type_parameters[0].interface_bounds.len(), 1);
        assert_eq!(sig.parameters.len(), 2);
        assert_eq!(sig.throws.len(), 2);
        let mut out = BTreeSet::new();
        sig.collect_classes(&mut out);
        assert!(out.contains("x/Marker"));
        assert!(out.contains("y/Result"));
        assert!(out.contains("z/Failure"));
    }

    #[test]
    fn test_void_method_descriptor() {
        let sig = parse_method_signature("()V").unwrap();
        assert!(sig.parameters.is_empty());
        assert!(sig.result.is_none());
    }

    #[test]
    fn test_interface_only_type_parameter_bound() {
        let sig = parse_class_signature("<T::Ljava/lang/Comparable<TT;>;>Ljava/lang/Object;La/I<TT;>;").unwrap();
        assert!(sig.type_parameters[0].class_bound.is_none());
        assert_eq!(sig.interfaces[0].binary_name(), "a/I");
    }

    #[test]
    fn test_class_constant_target() {
        assert_eq!(class_constant_target("a/B").unwrap().as_deref(), Some("a/B"));
        assert_eq!(class_constant_target("[[La/B;").unwrap().as_deref(), Some("a/B"));
        assert_eq!(class_constant_target("[I").unwrap(), None);
    }

    #[test]
    fn test_malformed_signatures_are_errors() {
        for bad in ["", "L;", "Ljava/util/List<>;", "Ljava/lang/String", "Q", "(I", "II"] {
            assert!(parse_field_signature(bad).is_err() || parse_method_signature(bad).is_err(), "{bad}");
        }
        assert!(parse_field_signature("Ljava/util/List<").is_err());
    }
}
