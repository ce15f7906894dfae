//! A small class-file writer.
//!
//! Tests and benchmarks use it to synthesize real class files instead of
//! checking binary fixtures into the repository. It writes structurally
//! valid files; it does not compute `max_stack` or verify bytecode.
//!
//! # Example
//!
//! ```rust
//! use bundlescope::classfile::builder::ClassFileBuilder;
//! use bundlescope::classfile::{decode, DecodeOptions};
//!
//! let mut builder = ClassFileBuilder::new("com/acme/Widget");
//! builder.add_field(0x0001, "parts", "Ljava/util/List;", Vec::new());
//! let record = decode(&builder.build(), &DecodeOptions::default()).unwrap();
//! assert!(record.referenced_packages.contains("java/util"));
//! ```

use std::collections::HashMap;

use super::constant_pool::{
    CONSTANT_CLASS, CONSTANT_FIELDREF, CONSTANT_INTEGER, CONSTANT_LONG, CONSTANT_METHODREF,
    CONSTANT_METHOD_TYPE, CONSTANT_MODULE, CONSTANT_NAME_AND_TYPE, CONSTANT_PACKAGE,
    CONSTANT_STRING, CONSTANT_UTF8,
};
use super::record::{ACC_MODULE, ACC_PUBLIC, ACC_SUPER};

/// A named attribute body ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub body: Vec<u8>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

/// An annotation to encode, with the annotation type as a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationSpec {
    pub descriptor: String,
    pub elements: Vec<(String, ElementSpec)>,
}

impl AnnotationSpec {
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            elements: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: ElementSpec) -> Self {
        self.elements.push((name.into(), value));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementSpec {
    Int(i32),
    Str(String),
    /// Enum descriptor and constant name.
    Enum(String, String),
    /// Return descriptor of a class literal.
    Class(String),
    Annotation(AnnotationSpec),
    Array(Vec<ElementSpec>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotationSpec {
    pub target_type: u8,
    pub target_info: Vec<u8>,
    /// Path entries without the length byte.
    pub type_path: Vec<u8>,
    pub annotation: AnnotationSpec,
}

#[derive(Debug, Clone)]
pub struct ClassFileBuilder {
    pool: Vec<u8>,
    pool_count: u16,
    pool_index: HashMap<(u8, Vec<u8>), u16>,
    major: u16,
    minor: u16,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    fields: Vec<Vec<u8>>,
    methods: Vec<Vec<u8>>,
    attributes: Vec<(u16, Vec<u8>)>,
}

impl ClassFileBuilder {
    /// A public class extending `java/lang/Object`, major version 52.
    pub fn new(name: &str) -> Self {
        let mut builder = Self {
            pool: Vec::new(),
            pool_count: 1,
            pool_index: HashMap::new(),
            major: 52,
            minor: 0,
            access: ACC_PUBLIC | ACC_SUPER,
            this_class: 0,
            super_class: 0,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            attributes: Vec::new(),
        };
        builder.this_class = builder.class_ref(name);
        builder.super_class = builder.class_ref("java/lang/Object");
        builder
    }

    /// A `module-info` class with a `Module` attribute.
    pub fn module(name: &str, requires: &[&str], exports: &[&str]) -> Self {
        let mut builder = Self::new("module-info");
        builder.access = ACC_MODULE;
        builder.super_class = 0;
        builder.major = 53;

        let mut body = Vec::new();
        let module = builder.module_ref(name);
        push_u2(&mut body, module);
        push_u2(&mut body, 0);
        push_u2(&mut body, 0);
        push_u2(&mut body, requires.len() as u16);
        for required in requires {
            let index = builder.module_ref(required);
            push_u2(&mut body, index);
            push_u2(&mut body, 0);
            push_u2(&mut body, 0);
        }
        push_u2(&mut body, exports.len() as u16);
        for exported in exports {
            let index = builder.package_ref(exported);
            push_u2(&mut body, index);
            push_u2(&mut body, 0);
            push_u2(&mut body, 0);
        }
        // opens, uses, provides
        push_u2(&mut body, 0);
        push_u2(&mut body, 0);
        push_u2(&mut body, 0);
        builder.add_attribute(Attribute::new("Module", body));
        builder
    }

    pub fn set_version(&mut self, major: u16, minor: u16) -> &mut Self {
        self.major = major;
        self.minor = minor;
        self
    }

    pub fn set_access(&mut self, access: u16) -> &mut Self {
        self.access = access;
        self
    }

    pub fn set_super_class(&mut self, name: &str) -> &mut Self {
        self.super_class = self.class_ref(name);
        self
    }

    pub fn add_interface(&mut self, name: &str) -> &mut Self {
        let index = self.class_ref(name);
        self.interfaces.push(index);
        self
    }

    pub fn add_field(&mut self, access: u16, name: &str, descriptor: &str, attributes: Vec<Attribute>) -> &mut Self {
        let member = self.member(access, name, descriptor, attributes);
        self.fields.push(member);
        self
    }

    pub fn add_method(&mut self, access: u16, name: &str, descriptor: &str, attributes: Vec<Attribute>) -> &mut Self {
        let member = self.member(access, name, descriptor, attributes);
        self.methods.push(member);
        self
    }

    /// Adds a public `<init>()V`.
    pub fn add_default_constructor(&mut self) -> &mut Self {
        let code = self.code_attribute(vec![0xb1], &[], Vec::new());
        self.add_method(ACC_PUBLIC, "<init>", "()V", vec![code])
    }

    pub fn add_attribute(&mut self, attribute: Attribute) -> &mut Self {
        let name = self.utf8(&attribute.name);
        self.attributes.push((name, attribute.body));
        self
    }

    pub fn utf8(&mut self, value: &str) -> u16 {
        self.constant(CONSTANT_UTF8, utf8_payload(value))
    }

    pub fn class_ref(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.constant(CONSTANT_CLASS, name.to_be_bytes().to_vec())
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let value = self.utf8(value);
        self.constant(CONSTANT_STRING, value.to_be_bytes().to_vec())
    }

    pub fn integer(&mut self, value: i32) -> u16 {
        self.constant(CONSTANT_INTEGER, value.to_be_bytes().to_vec())
    }

    pub fn long(&mut self, value: i64) -> u16 {
        self.constant(CONSTANT_LONG, value.to_be_bytes().to_vec())
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> u16 {
        let mut payload = self.utf8(name).to_be_bytes().to_vec();
        payload.extend_from_slice(&self.utf8(descriptor).to_be_bytes());
        self.constant(CONSTANT_NAME_AND_TYPE, payload)
    }

    pub fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let mut payload = self.class_ref(owner).to_be_bytes().to_vec();
        payload.extend_from_slice(&self.name_and_type(name, descriptor).to_be_bytes());
        self.constant(CONSTANT_METHODREF, payload)
    }

    pub fn field_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let mut payload = self.class_ref(owner).to_be_bytes().to_vec();
        payload.extend_from_slice(&self.name_and_type(name, descriptor).to_be_bytes());
        self.constant(CONSTANT_FIELDREF, payload)
    }

    pub fn method_type(&mut self, descriptor: &str) -> u16 {
        let descriptor = self.utf8(descriptor);
        self.constant(CONSTANT_METHOD_TYPE, descriptor.to_be_bytes().to_vec())
    }

    fn module_ref(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.constant(CONSTANT_MODULE, name.to_be_bytes().to_vec())
    }

    fn package_ref(&mut self, name: &str) -> u16 {
        let name = self.utf8(name);
        self.constant(CONSTANT_PACKAGE, name.to_be_bytes().to_vec())
    }

    fn constant(&mut self, tag: u8, payload: Vec<u8>) -> u16 {
        if let Some(index) = self.pool_index.get(&(tag, payload.clone())) {
            return *index;
        }
        let index = self.pool_count;
        self.pool.push(tag);
        self.pool.extend_from_slice(&payload);
        self.pool_count += if tag == CONSTANT_LONG { 2 } else { 1 };
        self.pool_index.insert((tag, payload), index);
        index
    }

    fn member(&mut self, access: u16, name: &str, descriptor: &str, attributes: Vec<Attribute>) -> Vec<u8> {
        let mut bytes = Vec::new();
        push_u2(&mut bytes, access);
        push_u2(&mut bytes, self.utf8(name));
        push_u2(&mut bytes, self.utf8(descriptor));
        self.write_attributes(&mut bytes, &attributes);
        bytes
    }

    fn write_attributes(&mut self, out: &mut Vec<u8>, attributes: &[Attribute]) {
        push_u2(out, attributes.len() as u16);
        for attribute in attributes {
            push_u2(out, self.utf8(&attribute.name));
            out.extend_from_slice(&(attribute.body.len() as u32).to_be_bytes());
            out.extend_from_slice(&attribute.body);
        }
    }

    pub fn signature_attribute(&mut self, signature: &str) -> Attribute {
        Attribute::new("Signature", self.utf8(signature).to_be_bytes().to_vec())
    }

    pub fn source_file_attribute(&mut self, file: &str) -> Attribute {
        Attribute::new("SourceFile", self.utf8(file).to_be_bytes().to_vec())
    }

    pub fn constant_value_attribute(&mut self, value: i32) -> Attribute {
        Attribute::new("ConstantValue", self.integer(value).to_be_bytes().to_vec())
    }

    pub fn exceptions_attribute(&mut self, classes: &[&str]) -> Attribute {
        let mut body = Vec::new();
        push_u2(&mut body, classes.len() as u16);
        for class in classes {
            push_u2(&mut body, self.class_ref(class));
        }
        Attribute::new("Exceptions", body)
    }

    /// Entries of `(inner, outer, simple name, access)`.
    pub fn inner_classes_attribute(&mut self, entries: &[(&str, Option<&str>, Option<&str>, u16)]) -> Attribute {
        let mut body = Vec::new();
        push_u2(&mut body, entries.len() as u16);
        for (inner, outer, name, access) in entries {
            push_u2(&mut body, self.class_ref(inner));
            let outer = outer.map(|o| self.class_ref(o)).unwrap_or(0);
            push_u2(&mut body, outer);
            let name = name.map(|n| self.utf8(n)).unwrap_or(0);
            push_u2(&mut body, name);
            push_u2(&mut body, *access);
        }
        Attribute::new("InnerClasses", body)
    }

    pub fn enclosing_method_attribute(&mut self, class: &str, method: Option<(&str, &str)>) -> Attribute {
        let mut body = Vec::new();
        push_u2(&mut body, self.class_ref(class));
        let method = method
            .map(|(name, descriptor)| self.name_and_type(name, descriptor))
            .unwrap_or(0);
        push_u2(&mut body, method);
        Attribute::new("EnclosingMethod", body)
    }

    pub fn annotations_attribute(&mut self, visible: bool, annotations: &[AnnotationSpec]) -> Attribute {
        let mut body = Vec::new();
        push_u2(&mut body, annotations.len() as u16);
        for annotation in annotations {
            self.write_annotation(&mut body, annotation);
        }
        let name = if visible {
            "RuntimeVisibleAnnotations"
        } else {
            "RuntimeInvisibleAnnotations"
        };
        Attribute::new(name, body)
    }

    pub fn parameter_annotations_attribute(&mut self, visible: bool, parameters: &[Vec<AnnotationSpec>]) -> Attribute {
        let mut body = vec![parameters.len() as u8];
        for annotations in parameters {
            push_u2(&mut body, annotations.len() as u16);
            for annotation in annotations {
                self.write_annotation(&mut body, annotation);
            }
        }
        let name = if visible {
            "RuntimeVisibleParameterAnnotations"
        } else {
            "RuntimeInvisibleParameterAnnotations"
        };
        Attribute::new(name, body)
    }

    pub fn type_annotations_attribute(&mut self, visible: bool, annotations: &[TypeAnnotationSpec]) -> Attribute {
        let mut body = Vec::new();
        push_u2(&mut body, annotations.len() as u16);
        for spec in annotations {
            body.push(spec.target_type);
            body.extend_from_slice(&spec.target_info);
            body.push((spec.type_path.len() / 2) as u8);
            body.extend_from_slice(&spec.type_path);
            self.write_annotation(&mut body, &spec.annotation);
        }
        let name = if visible {
            "RuntimeVisibleTypeAnnotations"
        } else {
            "RuntimeInvisibleTypeAnnotations"
        };
        Attribute::new(name, body)
    }

    pub fn annotation_default_attribute(&mut self, value: &ElementSpec) -> Attribute {
        let mut body = Vec::new();
        self.write_element(&mut body, value);
        Attribute::new("AnnotationDefault", body)
    }

    /// A `Code` attribute; `catch_types` become exception table entries.
    pub fn code_attribute(&mut self, code: Vec<u8>, catch_types: &[&str], attributes: Vec<Attribute>) -> Attribute {
        let mut body = Vec::new();
        push_u2(&mut body, 8);
        push_u2(&mut body, 8);
        body.extend_from_slice(&(code.len() as u32).to_be_bytes());
        let code_len = code.len() as u16;
        body.extend_from_slice(&code);
        push_u2(&mut body, catch_types.len() as u16);
        for catch_type in catch_types {
            push_u2(&mut body, 0);
            push_u2(&mut body, code_len);
            push_u2(&mut body, 0);
            push_u2(&mut body, self.class_ref(catch_type));
        }
        self.write_attributes(&mut body, &attributes);
        Attribute::new("Code", body)
    }

    fn write_annotation(&mut self, out: &mut Vec<u8>, annotation: &AnnotationSpec) {
        push_u2(out, self.utf8(&annotation.descriptor));
        push_u2(out, annotation.elements.len() as u16);
        for (name, value) in &annotation.elements {
            push_u2(out, self.utf8(name));
            self.write_element(out, value);
        }
    }

    fn write_element(&mut self, out: &mut Vec<u8>, value: &ElementSpec) {
        match value {
            ElementSpec::Int(v) => {
                out.push(b'I');
                push_u2(out, self.integer(*v));
            }
            ElementSpec::Str(v) => {
                out.push(b's');
                push_u2(out, self.utf8(v));
            }
            ElementSpec::Enum(descriptor, name) => {
                out.push(b'e');
                push_u2(out, self.utf8(descriptor));
                push_u2(out, self.utf8(name));
            }
            ElementSpec::Class(descriptor) => {
                out.push(b'c');
                push_u2(out, self.utf8(descriptor));
            }
            ElementSpec::Annotation(nested) => {
                out.push(b'@');
                self.write_annotation(out, nested);
            }
            ElementSpec::Array(values) => {
                out.push(b'[');
                push_u2(out, values.len() as u16);
                for value in values {
                    self.write_element(out, value);
                }
            }
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pool.len() + 64);
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        push_u2(&mut out, self.minor);
        push_u2(&mut out, self.major);
        push_u2(&mut out, self.pool_count);
        out.extend_from_slice(&self.pool);
        push_u2(&mut out, self.access);
        push_u2(&mut out, self.this_class);
        push_u2(&mut out, self.super_class);
        push_u2(&mut out, self.interfaces.len() as u16);
        for interface in &self.interfaces {
            push_u2(&mut out, *interface);
        }
        push_u2(&mut out, self.fields.len() as u16);
        for field in &self.fields {
            out.extend_from_slice(field);
        }
        push_u2(&mut out, self.methods.len() as u16);
        for method in &self.methods {
            out.extend_from_slice(method);
        }

        push_u2(&mut out, self.attributes.len() as u16);
        for (name, body) in &self.attributes {
            push_u2(&mut out, *name);
            out.extend_from_slice(&(body.len() as u32).to_be_bytes());
            out.extend_from_slice(body);
        }
        out
    }
}

fn push_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

fn utf8_payload(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut payload = (bytes.len() as u16).to_be_bytes().to_vec();
    payload.extend_from_slice(bytes);
    payload
}
