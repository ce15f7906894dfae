//! Class-file decoding.
//!
//! Turns the bytes of one compiled class into a [`ClassRecord`]: its
//! structure, its annotations and the set of packages it refers to.
//!
//! # Example
//!
//! ```rust
//! use bundlescope::classfile::builder::ClassFileBuilder;
//! use bundlescope::classfile::{decode, DecodeOptions};
//!
//! let mut builder = ClassFileBuilder::new("com/acme/Service");
//! builder.add_interface("org/osgi/framework/BundleActivator");
//! let record = decode(&builder.build(), &DecodeOptions::default()).unwrap();
//!
//! assert_eq!(record.package(), "com/acme");
//! assert!(record.referenced_packages.contains("org/osgi/framework"));
//! ```

pub mod annotation;
pub mod builder;
pub mod constant_pool;
pub mod java;
pub mod opcodes;
pub mod parser;
pub mod reader;
pub mod record;
pub mod signature;

pub use annotation::{Annotation, ElementType, ElementValue, Retention, TypeAnnotation};
pub use java::ExecutionEnvironment;
pub use parser::{decode, DecodeOptions};
pub use record::{AccessFlags, ClassRecord, NestKind};

/// Errors produced while decoding a class file.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of class file at offset {offset} in {section}")]
    UnexpectedEof { offset: usize, section: &'static str },

    #[error("invalid class file magic {found:#010x}")]
    InvalidMagic { found: u32 },

    #[error("unsupported constant pool tag {tag} at offset {offset}")]
    UnsupportedConstant { tag: u8, offset: usize },

    #[error("invalid constant pool index {index} in {section}")]
    InvalidConstantIndex { index: u16, section: &'static str },

    #[error("invalid modified UTF-8 in constant at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("invalid signature {signature:?}: {reason}")]
    InvalidSignature { signature: String, reason: String },

    #[error("malformed {section} at offset {offset}: {reason}")]
    Malformed {
        offset: usize,
        section: &'static str,
        reason: String,
    },
}

/// Result type for class-file decoding.
pub type DecodeResult<T> = Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::builder::{AnnotationSpec, ClassFileBuilder, ElementSpec, TypeAnnotationSpec};
    use super::record::{ACC_ABSTRACT, ACC_INTERFACE, ACC_PUBLIC, ACC_STATIC, ACC_SYNTHETIC};
    use super::*;

    fn decode_default(builder: &ClassFileBuilder) -> ClassRecord {
        decode(&builder.build(), &DecodeOptions::default()).unwrap()
    }

    #[test]
    fn test_minimal_class() {
        let builder = ClassFileBuilder::new("a/b/C");
        let record = decode_default(&builder);
        assert_eq!(record.name, "a/b/C");
        assert_eq!(record.super_class.as_deref(), Some("java/lang/Object"));
        assert_eq!(record.major, 52);
        assert_eq!(record.nest, NestKind::TopLevel);
        assert!(record.referenced_packages.contains("a/b"));
        assert!(record.referenced_packages.contains("java/lang"));
        assert!(!record.has_default_constructor);
    }

    #[test]
    fn test_generic_signature_references() {
        let mut builder = ClassFileBuilder::new("a/Holder");
        let signature = builder.signature_attribute("Ljava/util/Map<Lk/Key;[Ljava/util/List<+Lv/Value;>;>;");
        builder.add_field(ACC_PUBLIC, "map", "Ljava/util/Map;", vec![signature]);
        let signature = builder.signature_attribute("<T:Lb/Bound;>(TT;)Lr/Result<-Ls/Sup;>;");
        builder.add_method(ACC_PUBLIC, "apply", "(Ljava/lang/Object;)Lr/Result;", vec![signature]);
        let record = decode_default(&builder);

        for package in ["k", "v", "b", "r", "s", "java/util"] {
            assert!(record.referenced_packages.contains(package), "missing {package}");
        }
        assert!(record.api_packages.contains("v"));
        assert_eq!(record.fields[0].signature.as_deref(), Some("Ljava/util/Map<Lk/Key;[Ljava/util/List<+Lv/Value;>;>;"));
    }

    #[test]
    fn test_synthetic_member_signature_is_not_a_reference() {
        let mut builder = ClassFileBuilder::new("a/Holder");
        let signature = builder.signature_attribute("Ljava/util/List<Lhidden/Thing;>;");
        builder.add_field(ACC_SYNTHETIC, "x", "Ljava/util/List;", vec![signature]);
        let record = decode_default(&builder);
        assert!(!record.referenced_packages.contains("hidden"));
    }

    #[test]
    fn test_runtime_and_class_annotations() {
        let mut builder = ClassFileBuilder::new("a/Annotated");
        let visible = builder.annotations_attribute(
            true,
            &[AnnotationSpec::new("Lrt/Marker;")
                .with("kind", ElementSpec::Enum("Lrt/Kind;".into(), "FAST".into()))
                .with(
                    "types",
                    ElementSpec::Array(vec![
                        ElementSpec::Class("Lct/Listed;".into()),
                        ElementSpec::Class("V".into()),
                    ]),
                )],
        );
        let invisible = builder.annotations_attribute(false, &[AnnotationSpec::new("Lcl/Build;")]);
        builder.add_attribute(visible);
        builder.add_attribute(invisible);
        let record = decode_default(&builder);

        assert!(record.has_runtime_annotations);
        assert!(record.has_class_annotations);
        assert!(record.referenced_packages.contains("rt"));
        assert!(record.referenced_packages.contains("ct"));
        assert!(!record.referenced_packages.contains("cl"));
        assert_eq!(record.annotations.len(), 2);
        assert_eq!(record.annotations[1].retention, Retention::Class);
        assert_eq!(record.annotations[0].element_type, ElementType::Type);
    }

    #[test]
    fn test_repeated_annotation_container_refers_to_nested_types() {
        let mut builder = ClassFileBuilder::new("a/Repeated");
        let container = AnnotationSpec::new("Lrep/Roles;").with(
            "value",
            ElementSpec::Array(vec![
                ElementSpec::Annotation(AnnotationSpec::new("Lrep/Role;").with("name", ElementSpec::Str("x".into()))),
                ElementSpec::Annotation(AnnotationSpec::new("Lrep/Role;")),
            ]),
        );
        let attribute = builder.annotations_attribute(true, &[container]);
        builder.add_attribute(attribute);
        let record = decode_default(&builder);
        assert!(record.referenced_types.contains("rep/Roles"));
        assert!(record.referenced_types.contains("rep/Role"));
        match record.annotations[0].get("value") {
            Some(ElementValue::Array(values)) => assert_eq!(values.len(), 2),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn test_parameter_annotations_and_default_value() {
        let mut builder = ClassFileBuilder::new("a/Api");
        let params = builder.parameter_annotations_attribute(
            true,
            &[vec![], vec![AnnotationSpec::new("Lpa/NotNull;")]],
        );
        builder.add_method(ACC_PUBLIC, "call", "(II)V", vec![params]);
        let default = builder.annotation_default_attribute(&ElementSpec::Array(vec![ElementSpec::Class(
            "Ldf/Default;".into(),
        )]));
        builder.add_method(ACC_PUBLIC | ACC_ABSTRACT, "types", "()[Ljava/lang/Class;", vec![default]);
        let record = decode_default(&builder);

        let param = record
            .annotations
            .iter()
            .find(|a| a.type_name == "pa/NotNull")
            .unwrap();
        assert_eq!(param.parameter, Some(1));
        assert_eq!(param.element_type, ElementType::Parameter);
        assert!(record.referenced_packages.contains("df"));
        assert!(record.methods[1].default_value.is_some());
    }

    #[test]
    fn test_type_annotations_keep_target_and_path() {
        let mut builder = ClassFileBuilder::new("a/Typed");
        builder.add_interface("a/Iface");
        let attribute = builder.type_annotations_attribute(
            true,
            &[
                TypeAnnotationSpec {
                    target_type: 0x10,
                    target_info: vec![0xFF, 0xFF],
                    type_path: vec![],
                    annotation: AnnotationSpec::new("Lta/OnExtends;"),
                },
                TypeAnnotationSpec {
                    target_type: 0x10,
                    target_info: vec![0x00, 0x00],
                    type_path: vec![3, 0],
                    annotation: AnnotationSpec::new("Lta/OnImplements;"),
                },
            ],
        );
        builder.add_attribute(attribute);
        let record = decode_default(&builder);

        assert_eq!(record.type_annotations.len(), 2);
        let extends = &record.type_annotations[0];
        assert!(extends.is_on_extends());
        assert_eq!(extends.target_info, vec![0xFF, 0xFF]);
        let implements = &record.type_annotations[1];
        assert!(implements.is_on_implements());
        assert_eq!(implements.target_index, 0);
        assert_eq!(implements.type_path, vec![3, 0]);
        assert!(record.referenced_packages.contains("ta"));
    }

    #[test]
    fn test_formal_parameter_type_annotation() {
        let mut builder = ClassFileBuilder::new("a/Typed");
        let attribute = builder.type_annotations_attribute(
            false,
            &[TypeAnnotationSpec {
                target_type: 0x16,
                target_info: vec![1],
                type_path: vec![],
                annotation: AnnotationSpec::new("Lta/Param;"),
            }],
        );
        builder.add_method(ACC_PUBLIC, "m", "(II)V", vec![attribute]);
        let record = decode_default(&builder);
        let annotation = &record.type_annotations[0];
        assert!(annotation.is_on_formal_parameter());
        assert_eq!(annotation.target_index, 1);
        assert_eq!(annotation.annotation.retention, Retention::Class);
    }

    #[test]
    fn test_code_scan_and_stack_map() {
        let mut builder = ClassFileBuilder::new("a/Code");
        let created = builder.class_ref("n/Created");
        let frame_class = builder.class_ref("sm/Frame");
        let mut code = vec![0xbb];
        code.extend_from_slice(&created.to_be_bytes());
        code.push(0xb1);
        // full_frame with one Object local, then an append frame with one Uninitialized
        let mut stack_map = vec![0, 2, 255, 0, 0, 0, 1, 7];
        stack_map.extend_from_slice(&frame_class.to_be_bytes());
        stack_map.extend_from_slice(&[0, 0, 252, 0, 1, 8, 0, 0]);
        let stack_map = super::builder::Attribute::new("StackMapTable", stack_map);
        let code = builder.code_attribute(code, &["ex/Failure"], vec![stack_map]);
        builder.add_method(ACC_PUBLIC | ACC_STATIC, "run", "()V", vec![code]);
        let record = decode_default(&builder);

        assert!(record.referenced_packages.contains("n"));
        assert!(record.referenced_packages.contains("sm"));
        assert!(record.referenced_packages.contains("ex"));
    }

    #[test]
    fn test_stack_map_with_trailing_bytes_is_error() {
        let mut builder = ClassFileBuilder::new("a/Code");
        let stack_map = super::builder::Attribute::new("StackMapTable", vec![0, 1, 0, 9, 9]);
        let code = builder.code_attribute(vec![0xb1], &[], vec![stack_map]);
        builder.add_method(ACC_PUBLIC, "run", "()V", vec![code]);
        let err = decode(&builder.build(), &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { section: "StackMapTable", .. }));
    }

    fn for_name_class(target: &str) -> ClassFileBuilder {
        let mut builder = ClassFileBuilder::new("a/Loader");
        let string = builder.string(target);
        let for_name = builder.method_ref("java/lang/Class", "forName", "(Ljava/lang/String;)Ljava/lang/Class;");
        let mut code = vec![0x12, string as u8, 0xb8];
        code.extend_from_slice(&for_name.to_be_bytes());
        code.extend_from_slice(&[0x57, 0xb1]);
        let code = builder.code_attribute(code, &[], Vec::new());
        builder.add_method(ACC_PUBLIC | ACC_STATIC, "load", "()V", vec![code]);
        builder
    }

    #[test]
    fn test_class_for_name_heuristic() {
        let record = decode_default(&for_name_class("x.y.Z"));
        assert!(record.referenced_types.contains("x/y/Z"));

        let record = decode_default(&for_name_class("class"));
        assert!(!record.referenced_types.iter().any(|t| t == "class"));

        let record = decode_default(&for_name_class(".hidden"));
        assert!(!record.referenced_packages.contains(""));

        let disabled = DecodeOptions {
            class_for_name: false,
        };
        let record = decode(&for_name_class("x.y.Z").build(), &disabled).unwrap();
        assert!(!record.referenced_types.contains("x/y/Z"));
    }

    #[test]
    fn test_tableswitch_padding_is_skipped() {
        let mut builder = ClassFileBuilder::new("a/Switch");
        let created = builder.class_ref("sw/After");
        // iconst_0 at pc 0, tableswitch at pc 1, 2 bytes padding, low=0 high=1
        let mut code = vec![0x03, 0xaa, 0, 0];
        for value in [0i32, 0, 1, 0, 0] {
            code.extend_from_slice(&value.to_be_bytes());
        }
        code.push(0xbb);
        code.extend_from_slice(&created.to_be_bytes());
        code.push(0xb1);
        let code = builder.code_attribute(code, &[], Vec::new());
        builder.add_method(ACC_PUBLIC, "s", "()V", vec![code]);
        let record = decode_default(&builder);
        assert!(record.referenced_packages.contains("sw"));
    }

    #[test]
    fn test_nested_class_classification() {
        let mut builder = ClassFileBuilder::new("a/Outer$Inner");
        let attribute = builder.inner_classes_attribute(&[("a/Outer$Inner", Some("a/Outer"), Some("Inner"), ACC_PUBLIC)]);
        builder.add_attribute(attribute);
        assert_eq!(decode_default(&builder).nest, NestKind::Inner);

        let mut builder = ClassFileBuilder::new("a/Outer$Nested");
        let attribute = builder.inner_classes_attribute(&[(
            "a/Outer$Nested",
            Some("a/Outer"),
            Some("Nested"),
            ACC_PUBLIC | ACC_STATIC,
        )]);
        builder.add_attribute(attribute);
        assert_eq!(decode_default(&builder).nest, NestKind::StaticNested);

        let mut builder = ClassFileBuilder::new("a/Outer$1");
        let inner = builder.inner_classes_attribute(&[("a/Outer$1", None, None, 0)]);
        let enclosing = builder.enclosing_method_attribute("a/Outer", Some(("run", "(Lq/Arg;)V")));
        builder.add_attribute(inner);
        builder.add_attribute(enclosing);
        let record = decode_default(&builder);
        assert_eq!(record.nest, NestKind::Anonymous);
        assert!(record.referenced_packages.contains("q"));
        assert_eq!(record.enclosing_method.unwrap().class, "a/Outer");
    }

    #[test]
    fn test_interface_and_default_constructor() {
        let mut builder = ClassFileBuilder::new("a/Iface");
        builder.set_access(ACC_PUBLIC | ACC_INTERFACE | ACC_ABSTRACT);
        assert!(decode_default(&builder).is_interface());

        let mut builder = ClassFileBuilder::new("a/Impl");
        builder.add_default_constructor();
        assert!(decode_default(&builder).has_default_constructor);
    }

    #[test]
    fn test_module_descriptor() {
        let builder = ClassFileBuilder::module("com.acme.app", &["java.base"], &["com/acme/api"]);
        let record = decode_default(&builder);
        assert!(record.is_module());
        assert!(!record.referenced_types.contains("module-info"));
        let module = record.module.unwrap();
        assert_eq!(module.name, "com.acme.app");
        assert_eq!(module.requires, vec!["java.base"]);
        assert_eq!(module.exports, vec!["com/acme/api"]);
    }

    #[test]
    fn test_unknown_major_version_decodes() {
        let mut builder = ClassFileBuilder::new("a/Future");
        builder.set_version(10000, 0);
        let record = decode_default(&builder);
        assert_eq!(record.major, 10000);
        assert!(record.execution_environment().is_unknown());
        assert_eq!(java::lenient_filter(record.major as u32), "(&(osgi.ee=JavaSE)(version=9955))");
    }

    #[test]
    fn test_exceptions_are_api_references() {
        let mut builder = ClassFileBuilder::new("a/Thrower");
        let exceptions = builder.exceptions_attribute(&["err/Problem"]);
        builder.add_method(ACC_PUBLIC, "go", "()V", vec![exceptions]);
        let record = decode_default(&builder);
        assert!(record.api_packages.contains("err"));
        assert_eq!(record.methods[0].exceptions, vec!["err/Problem"]);
    }

    #[test]
    fn test_malformed_inputs_are_errors() {
        assert!(matches!(
            decode(&[0, 1, 2, 3, 0, 0, 0, 52], &DecodeOptions::default()),
            Err(DecodeError::InvalidMagic { .. })
        ));

        let bytes = ClassFileBuilder::new("a/Truncated").build();
        for len in 0..bytes.len() {
            assert!(decode(&bytes[..len], &DecodeOptions::default()).is_err(), "prefix {len}");
        }

        let mut corrupted = bytes.clone();
        // constant pool count far larger than the pool
        corrupted[8] = 0xFF;
        assert!(decode(&corrupted, &DecodeOptions::default()).is_err());

        let mut trailing = bytes;
        trailing.push(0);
        assert!(decode(&trailing, &DecodeOptions::default()).is_err());
    }
}
