//! The decode walk from class-file bytes to a [`ClassRecord`].

use std::collections::BTreeSet;

use tracing::trace;

use super::annotation::{
    Annotation, ConstValue, ElementType, ElementValue, Retention, TypeAnnotation,
    TYPEUSE_INDEX_NONE,
};
use super::constant_pool::{Constant, ConstantPool};
use super::opcodes::{self, operand_length};
use super::reader::ClassReader;
use super::record::{
    package_of, AccessFlags, ClassRecord, EnclosingMethod, FieldDef, InnerClassEntry, MethodDef,
    ModuleDescriptor, NestKind,
};
use super::signature::{
    class_constant_target, parse_class_signature, parse_field_signature, parse_method_signature,
    JavaType,
};
use super::{DecodeError, DecodeResult};

const MAGIC: u32 = 0xCAFE_BABE;
const FOR_NAME_DESCRIPTOR: &str = "(Ljava/lang/String;)Ljava/lang/Class;";

/// Switches for the reference scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Count `Class.forName("a.b.C")` string constants as references.
    pub class_for_name: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            class_for_name: true,
        }
    }
}

/// Decodes one class file.
///
/// Any truncated, out-of-range or inconsistent structure is returned as a
/// [`DecodeError`] naming the offset and section; decoding never panics.
pub fn decode(bytes: &[u8], options: &DecodeOptions) -> DecodeResult<ClassRecord> {
    let mut reader = ClassReader::new(bytes);
    reader.enter("header");
    let magic = reader.read_u4()?;
    if magic != MAGIC {
        return Err(DecodeError::InvalidMagic { found: magic });
    }
    let minor = reader.read_u2()?;
    let major = reader.read_u2()?;
    let pool = ConstantPool::parse(&mut reader)?;

    reader.enter("class_header");
    let access = AccessFlags(reader.read_u2()?);
    let this_index = reader.read_u2()?;
    let name = pool.class_name(this_index, "this_class")?.to_string();
    let super_class = pool
        .optional_class_name(reader.read_u2()?, "super_class")?
        .map(str::to_string);
    if super_class.is_none() && name != "java/lang/Object" && !access.is_module() {
        return Err(reader.malformed(format!("class {name} has no super class")));
    }

    reader.enter("interfaces");
    let interface_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(pool.class_name(reader.read_u2()?, "interfaces")?.to_string());
    }

    let mut parser = ClassParser::new(&pool, options, &name, access);
    parser.scan_header(super_class.as_deref(), &interfaces)?;
    parser.scan_constant_pool()?;

    reader.enter("fields");
    let field_count = reader.read_u2()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(parser.field(&mut reader)?);
    }

    reader.enter("methods");
    let method_count = reader.read_u2()?;
    let mut methods = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        methods.push(parser.method(&mut reader)?);
    }

    reader.enter("class_attributes");
    let attributes = parser.attributes(&mut reader, &Target::Class)?;
    if !reader.is_empty() {
        return Err(reader.malformed(format!("{} trailing bytes", reader.remaining())));
    }

    if let Some(signature) = &attributes.signature {
        if !access.is_synthetic() {
            let signature = parse_class_signature(signature)?;
            let mut classes = BTreeSet::new();
            signature.collect_classes(&mut classes);
            for class in classes {
                parser.refer_api(&class, access.is_public());
            }
        }
    }

    let nest = nest_kind(&name, &attributes.inner_classes);
    let has_default_constructor = methods
        .iter()
        .any(|m| m.is_constructor() && m.access.is_public() && m.descriptor == "()V");

    trace!(class = %name, major, references = parser.referenced.len(), "decoded class");

    let ClassParser {
        referenced,
        api,
        annotations,
        type_annotations,
        has_runtime_annotations,
        has_class_annotations,
        ..
    } = parser;
    let referenced_packages = referenced.iter().map(|t| package_of(t).to_string()).collect();
    let api_packages = api.iter().map(|t| package_of(t).to_string()).collect();

    Ok(ClassRecord {
        name,
        super_class,
        interfaces,
        access,
        major,
        minor,
        source_file: attributes.source_file,
        signature: attributes.signature,
        referenced_types: referenced,
        referenced_packages,
        api_packages,
        annotations,
        type_annotations,
        nest,
        inner_classes: attributes.inner_classes,
        enclosing_method: attributes.enclosing_method,
        fields,
        methods,
        module: attributes.module,
        has_runtime_annotations,
        has_class_annotations,
        has_default_constructor,
    })
}

fn nest_kind(name: &str, entries: &[InnerClassEntry]) -> NestKind {
    match entries.iter().find(|entry| entry.inner_class == name) {
        None => NestKind::TopLevel,
        Some(entry) if entry.inner_name.is_none() => NestKind::Anonymous,
        Some(entry) if entry.outer_class.is_none() => NestKind::Local,
        Some(entry) if !entry.access.is_static() => NestKind::Inner,
        Some(_) => NestKind::StaticNested,
    }
}

/// True for strings that look like a dotted class name, `a.b.C`.
pub fn looks_like_class_name(text: &str) -> bool {
    text != "class"
        && text.find('.').is_some_and(|i| i > 0)
        && text.split('.').all(is_java_identifier)
}

fn is_java_identifier(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

/// What the attributes being read belong to.
enum Target {
    Class,
    Field { member: String, api: bool, synthetic: bool },
    Method { member: String, api: bool, synthetic: bool, constructor: bool },
    Code,
    RecordComponent,
}

#[derive(Default)]
struct Attributes {
    signature: Option<String>,
    source_file: Option<String>,
    constant: Option<ConstValue>,
    exceptions: Vec<String>,
    default_value: Option<ElementValue>,
    parameter_names: Vec<Option<String>>,
    inner_classes: Vec<InnerClassEntry>,
    enclosing_method: Option<EnclosingMethod>,
    module: Option<ModuleDescriptor>,
}

struct ClassParser<'p> {
    pool: &'p ConstantPool,
    name: &'p str,
    access: AccessFlags,
    for_name: Option<u16>,
    class_helper: Option<u16>,
    referenced: BTreeSet<String>,
    api: BTreeSet<String>,
    annotations: Vec<Annotation>,
    type_annotations: Vec<TypeAnnotation>,
    has_runtime_annotations: bool,
    has_class_annotations: bool,
}

impl<'p> ClassParser<'p> {
    fn new(pool: &'p ConstantPool, options: &DecodeOptions, name: &'p str, access: AccessFlags) -> Self {
        let (for_name, class_helper) = if options.class_for_name {
            (
                pool.find_method_ref("java/lang/Class", "forName", FOR_NAME_DESCRIPTOR),
                pool.find_method_ref(name, "class$", FOR_NAME_DESCRIPTOR),
            )
        } else {
            (None, None)
        };
        Self {
            pool,
            name,
            access,
            for_name,
            class_helper,
            referenced: BTreeSet::new(),
            api: BTreeSet::new(),
            annotations: Vec::new(),
            type_annotations: Vec::new(),
            has_runtime_annotations: false,
            has_class_annotations: false,
        }
    }

    fn refer(&mut self, binary_name: &str) {
        if !binary_name.is_empty() {
            self.referenced.insert(binary_name.to_string());
        }
    }

    fn refer_api(&mut self, binary_name: &str, api: bool) {
        self.refer(binary_name);
        if api && !binary_name.is_empty() {
            self.api.insert(binary_name.to_string());
        }
    }

    fn refer_class_constant(&mut self, index: u16, section: &'static str) -> DecodeResult<()> {
        let name = self.pool.class_name(index, section)?;
        if let Some(class) = class_constant_target(name)? {
            self.refer(&class);
        }
        Ok(())
    }

    fn refer_type(&mut self, ty: &JavaType, api: bool) {
        let mut classes = BTreeSet::new();
        ty.collect_classes(&mut classes);
        for class in classes {
            self.refer_api(&class, api);
        }
    }

    fn refer_descriptor(&mut self, descriptor: &str, api: bool) -> DecodeResult<()> {
        let mut classes = BTreeSet::new();
        if descriptor.starts_with('(') || descriptor.starts_with('<') {
            parse_method_signature(descriptor)?.collect_classes(&mut classes);
        } else {
            parse_field_signature(descriptor)?.collect_classes(&mut classes);
        }
        for class in classes {
            self.refer_api(&class, api);
        }
        Ok(())
    }

    fn scan_header(&mut self, super_class: Option<&str>, interfaces: &[String]) -> DecodeResult<()> {
        let public = self.access.is_public();
        if !self.access.is_module() {
            let name = self.name;
            self.refer(name);
        }
        if let Some(super_class) = super_class {
            self.refer_api(super_class, public);
        }
        for interface in interfaces {
            self.refer_api(interface, public);
        }
        Ok(())
    }

    /// Picks up references that are only visible through the pool.
    fn scan_constant_pool(&mut self) -> DecodeResult<()> {
        let pool = self.pool;
        for (index, entry) in pool.iter() {
            match entry {
                Constant::Class { .. } => {
                    if self.access.is_module() && pool.class_name(index, "constant_pool")? == self.name {
                        continue;
                    }
                    self.refer_class_constant(index, "constant_pool")?;
                }
                Constant::NameAndType {
                    descriptor_index, ..
                }
                | Constant::MethodType { descriptor_index } => {
                    let descriptor = pool.utf8(*descriptor_index, "constant_pool")?;
                    self.refer_descriptor(descriptor, false)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn field(&mut self, reader: &mut ClassReader<'_>) -> DecodeResult<FieldDef> {
        let access = AccessFlags(reader.read_u2()?);
        let name = self.pool.utf8(reader.read_u2()?, "fields")?.to_string();
        let descriptor = self.pool.utf8(reader.read_u2()?, "fields")?.to_string();
        let api = self.access.is_public() && (access.is_public() || access.is_protected());
        self.refer_descriptor(&descriptor, api)?;

        let target = Target::Field {
            member: format!("{name}:{descriptor}"),
            api,
            synthetic: access.is_synthetic(),
        };
        let attributes = self.attributes(reader, &target)?;
        reader.enter("fields");
        Ok(FieldDef {
            access,
            name,
            descriptor,
            signature: attributes.signature,
            constant: attributes.constant,
        })
    }

    fn method(&mut self, reader: &mut ClassReader<'_>) -> DecodeResult<MethodDef> {
        let access = AccessFlags(reader.read_u2()?);
        let name = self.pool.utf8(reader.read_u2()?, "methods")?.to_string();
        let descriptor = self.pool.utf8(reader.read_u2()?, "methods")?.to_string();
        let api = self.access.is_public() && (access.is_public() || access.is_protected());
        self.refer_descriptor(&descriptor, api)?;

        let target = Target::Method {
            member: format!("{name}{descriptor}"),
            api,
            synthetic: access.is_synthetic(),
            constructor: name == "<init>",
        };
        let attributes = self.attributes(reader, &target)?;
        reader.enter("methods");
        Ok(MethodDef {
            access,
            name,
            descriptor,
            signature: attributes.signature,
            exceptions: attributes.exceptions,
            parameter_names: attributes.parameter_names,
            default_value: attributes.default_value,
        })
    }

    fn attributes(&mut self, reader: &mut ClassReader<'_>, target: &Target) -> DecodeResult<Attributes> {
        let count = reader.read_u2()?;
        let mut result = Attributes::default();
        for _ in 0..count {
            let name_index = reader.read_u2()?;
            let name = self.pool.utf8(name_index, "attributes")?;
            let length = reader.read_u4()? as usize;
            let mut attr = reader.sub_reader(length, "attribute")?;
            self.attribute(name, &mut attr, target, &mut result)?;
        }
        Ok(result)
    }

    fn attribute(
        &mut self,
        name: &str,
        reader: &mut ClassReader<'_>,
        target: &Target,
        result: &mut Attributes,
    ) -> DecodeResult<()> {
        let pool = self.pool;
        let (element_type, member, api, synthetic) = match target {
            Target::Class => {
                let element_type = if self.access.is_module() {
                    ElementType::Module
                } else if self.name.ends_with("package-info") {
                    ElementType::Package
                } else {
                    ElementType::Type
                };
                (element_type, None, self.access.is_public(), self.access.is_synthetic())
            }
            Target::Field {
                member,
                api,
                synthetic,
            } => (ElementType::Field, Some(member.clone()), *api, *synthetic),
            Target::Method {
                member,
                api,
                synthetic,
                constructor,
            } => {
                let element_type = if *constructor {
                    ElementType::Constructor
                } else {
                    ElementType::Method
                };
                (element_type, Some(member.clone()), *api, *synthetic)
            }
            Target::Code => (ElementType::TypeUse, None, false, false),
            Target::RecordComponent => (ElementType::Field, None, false, false),
        };

        match name {
            "RuntimeVisibleAnnotations" => {
                reader.enter("RuntimeVisibleAnnotations");
                self.annotations(reader, Retention::Runtime, element_type, member, None)?;
            }
            "RuntimeInvisibleAnnotations" => {
                reader.enter("RuntimeInvisibleAnnotations");
                self.annotations(reader, Retention::Class, element_type, member, None)?;
            }
            "RuntimeVisibleParameterAnnotations" => {
                reader.enter("RuntimeVisibleParameterAnnotations");
                self.parameter_annotations(reader, Retention::Runtime, member)?;
            }
            "RuntimeInvisibleParameterAnnotations" => {
                reader.enter("RuntimeInvisibleParameterAnnotations");
                self.parameter_annotations(reader, Retention::Class, member)?;
            }
            "RuntimeVisibleTypeAnnotations" => {
                reader.enter("RuntimeVisibleTypeAnnotations");
                self.type_annotations(reader, Retention::Runtime, member)?;
            }
            "RuntimeInvisibleTypeAnnotations" => {
                reader.enter("RuntimeInvisibleTypeAnnotations");
                self.type_annotations(reader, Retention::Class, member)?;
            }
            "AnnotationDefault" => {
                reader.enter("AnnotationDefault");
                result.default_value = Some(self.element_value(reader, Retention::Runtime)?);
            }
            "Signature" => {
                reader.enter("Signature");
                let signature = pool.utf8(reader.read_u2()?, "Signature")?.to_string();
                if !synthetic {
                    match target {
                        Target::Class => {}
                        Target::Method { .. } => {
                            let mut classes = BTreeSet::new();
                            parse_method_signature(&signature)?.collect_classes(&mut classes);
                            for class in classes {
                                self.refer_api(&class, api);
                            }
                        }
                        _ => {
                            let ty = parse_field_signature(&signature)?;
                            self.refer_type(&ty, api);
                        }
                    }
                }
                result.signature = Some(signature);
            }
            "Exceptions" => {
                reader.enter("Exceptions");
                let count = reader.read_u2()?;
                for _ in 0..count {
                    let class = pool.class_name(reader.read_u2()?, "Exceptions")?.to_string();
                    self.refer_api(&class, api);
                    result.exceptions.push(class);
                }
            }
            "ConstantValue" => {
                reader.enter("ConstantValue");
                let index = reader.read_u2()?;
                result.constant = Some(self.const_value(index, "ConstantValue")?);
            }
            "Code" => {
                reader.enter("Code");
                self.code(reader)?;
            }
            "StackMapTable" => {
                reader.enter("StackMapTable");
                self.stack_map_table(reader)?;
            }
            "SourceFile" => {
                reader.enter("SourceFile");
                result.source_file = Some(pool.utf8(reader.read_u2()?, "SourceFile")?.to_string());
            }
            "InnerClasses" => {
                reader.enter("InnerClasses");
                let count = reader.read_u2()?;
                for _ in 0..count {
                    let inner_class = pool.class_name(reader.read_u2()?, "InnerClasses")?.to_string();
                    let outer_class = pool
                        .optional_class_name(reader.read_u2()?, "InnerClasses")?
                        .map(str::to_string);
                    let inner_name = pool
                        .optional_utf8(reader.read_u2()?, "InnerClasses")?
                        .map(str::to_string);
                    let access = AccessFlags(reader.read_u2()?);
                    result.inner_classes.push(InnerClassEntry {
                        inner_class,
                        outer_class,
                        inner_name,
                        access,
                    });
                }
            }
            "EnclosingMethod" => {
                reader.enter("EnclosingMethod");
                let class = pool.class_name(reader.read_u2()?, "EnclosingMethod")?.to_string();
                self.refer(&class);
                let method_index = reader.read_u2()?;
                let method = if method_index == 0 {
                    None
                } else {
                    let (name, descriptor) = pool.name_and_type(method_index, "EnclosingMethod")?;
                    self.refer_descriptor(descriptor, false)?;
                    Some((name.to_string(), descriptor.to_string()))
                };
                result.enclosing_method = Some(EnclosingMethod { class, method });
            }
            "MethodParameters" => {
                reader.enter("MethodParameters");
                let count = reader.read_u1()?;
                for _ in 0..count {
                    let name = pool
                        .optional_utf8(reader.read_u2()?, "MethodParameters")?
                        .map(str::to_string);
                    reader.read_u2()?;
                    result.parameter_names.push(name);
                }
            }
            "NestHost" => {
                reader.enter("NestHost");
                let index = reader.read_u2()?;
                self.refer_class_constant(index, "NestHost")?;
            }
            "NestMembers" | "PermittedSubclasses" => {
                reader.enter("NestMembers");
                let count = reader.read_u2()?;
                for _ in 0..count {
                    let index = reader.read_u2()?;
                    self.refer_class_constant(index, "NestMembers")?;
                }
            }
            "Record" => {
                reader.enter("Record");
                let count = reader.read_u2()?;
                for _ in 0..count {
                    reader.read_u2()?;
                    let descriptor = pool.utf8(reader.read_u2()?, "Record")?;
                    self.refer_descriptor(descriptor, self.access.is_public())?;
                    self.attributes(reader, &Target::RecordComponent)?;
                }
            }
            "Module" => {
                reader.enter("Module");
                result.module = Some(self.module(reader)?);
            }
            _ => {}
        }
        Ok(())
    }

    fn const_value(&self, index: u16, section: &'static str) -> DecodeResult<ConstValue> {
        Ok(match self.pool.get(index, section)? {
            Constant::Integer(v) => ConstValue::Int(*v),
            Constant::Long(v) => ConstValue::Long(*v),
            Constant::Float(v) => ConstValue::Float(*v),
            Constant::Double(v) => ConstValue::Double(*v),
            Constant::String { string_index } => {
                ConstValue::String(self.pool.utf8(*string_index, section)?.to_string())
            }
            Constant::Utf8(v) => ConstValue::String(v.clone()),
            _ => return Err(DecodeError::InvalidConstantIndex { index, section }),
        })
    }

    fn annotations(
        &mut self,
        reader: &mut ClassReader<'_>,
        retention: Retention,
        element_type: ElementType,
        member: Option<String>,
        parameter: Option<u8>,
    ) -> DecodeResult<()> {
        let count = reader.read_u2()?;
        for _ in 0..count {
            let annotation = self.annotation(reader, retention, element_type, member.clone(), parameter)?;
            self.annotations.push(annotation);
        }
        Ok(())
    }

    fn parameter_annotations(
        &mut self,
        reader: &mut ClassReader<'_>,
        retention: Retention,
        member: Option<String>,
    ) -> DecodeResult<()> {
        let parameters = reader.read_u1()?;
        for parameter in 0..parameters {
            self.annotations(reader, retention, ElementType::Parameter, member.clone(), Some(parameter))?;
        }
        Ok(())
    }

    fn annotation(
        &mut self,
        reader: &mut ClassReader<'_>,
        retention: Retention,
        element_type: ElementType,
        member: Option<String>,
        parameter: Option<u8>,
    ) -> DecodeResult<Annotation> {
        let descriptor = self.pool.utf8(reader.read_u2()?, "annotation")?;
        let type_name = match parse_field_signature(descriptor)? {
            JavaType::Class(class) => class.binary_name(),
            _ => return Err(reader.malformed(format!("annotation type {descriptor} is not a class"))),
        };
        match retention {
            Retention::Runtime => {
                self.has_runtime_annotations = true;
                self.refer(&type_name);
            }
            Retention::Class => self.has_class_annotations = true,
        }

        let pairs = reader.read_u2()?;
        let mut elements = Vec::with_capacity(pairs as usize);
        for _ in 0..pairs {
            let name = self.pool.utf8(reader.read_u2()?, "annotation")?.to_string();
            let value = self.element_value(reader, retention)?;
            elements.push((name, value));
        }
        Ok(Annotation {
            type_name,
            retention,
            element_type,
            member,
            parameter,
            elements,
        })
    }

    fn element_value(&mut self, reader: &mut ClassReader<'_>, retention: Retention) -> DecodeResult<ElementValue> {
        let tag = reader.read_u1()? as char;
        let value = match tag {
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' | 's' => {
                let index = reader.read_u2()?;
                ElementValue::Const {
                    tag,
                    value: self.const_value(index, "element_value")?,
                }
            }
            'e' => {
                let type_descriptor = self.pool.utf8(reader.read_u2()?, "element_value")?.to_string();
                let const_name = self.pool.utf8(reader.read_u2()?, "element_value")?.to_string();
                if retention == Retention::Runtime {
                    self.refer_descriptor(&type_descriptor, false)?;
                }
                ElementValue::Enum {
                    type_descriptor,
                    const_name,
                }
            }
            'c' => {
                let descriptor = self.pool.utf8(reader.read_u2()?, "element_value")?.to_string();
                if retention == Retention::Runtime && descriptor != "V" {
                    self.refer_descriptor(&descriptor, false)?;
                }
                ElementValue::Class(descriptor)
            }
            '@' => {
                let nested = self.annotation(reader, retention, ElementType::Type, None, None)?;
                ElementValue::Annotation(Box::new(nested))
            }
            '[' => {
                let count = reader.read_u2()?;
                let mut values = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    values.push(self.element_value(reader, retention)?);
                }
                ElementValue::Array(values)
            }
            other => return Err(reader.malformed(format!("unknown element value tag '{other}'"))),
        };
        Ok(value)
    }

    fn type_annotations(
        &mut self,
        reader: &mut ClassReader<'_>,
        retention: Retention,
        member: Option<String>,
    ) -> DecodeResult<()> {
        let count = reader.read_u2()?;
        for _ in 0..count {
            let target_type = reader.read_u1()?;
            let mut start = reader.clone();
            let target_index = match target_type {
                0x00 | 0x01 | 0x16 => reader.read_u1()? as i32,
                0x10 | 0x17 | 0x42 => reader.read_u2()? as i32,
                0x11 | 0x12 => {
                    let index = reader.read_u1()? as i32;
                    reader.read_u1()?;
                    index
                }
                0x13..=0x15 => TYPEUSE_INDEX_NONE,
                0x40 | 0x41 => {
                    let entries = reader.read_u2()? as usize;
                    reader.skip(entries * 6)?;
                    TYPEUSE_INDEX_NONE
                }
                0x43..=0x46 => {
                    reader.read_u2()?;
                    TYPEUSE_INDEX_NONE
                }
                0x47..=0x4B => {
                    reader.read_u2()?;
                    reader.read_u1()? as i32
                }
                other => {
                    return Err(reader.malformed(format!("unknown type annotation target {other:#04x}")))
                }
            };
            let consumed = reader.offset() - start.offset();
            let target_info = start.read_slice(consumed)?.to_vec();

            let path_length = reader.read_u1()? as usize;
            let type_path = reader.read_slice(path_length * 2)?.to_vec();
            let annotation = self.annotation(reader, retention, ElementType::TypeUse, member.clone(), None)?;
            self.type_annotations.push(TypeAnnotation {
                annotation,
                target_type,
                target_info,
                target_index,
                type_path,
            });
        }
        Ok(())
    }

    fn code(&mut self, reader: &mut ClassReader<'_>) -> DecodeResult<()> {
        reader.read_u2()?;
        reader.read_u2()?;
        let code_length = reader.read_u4()? as usize;
        let mut code = reader.sub_reader(code_length, "bytecode")?;
        self.scan_code(&mut code)?;

        reader.enter("exception_table");
        let handlers = reader.read_u2()?;
        for _ in 0..handlers {
            reader.skip(6)?;
            let catch_type = reader.read_u2()?;
            if catch_type != 0 {
                self.refer_class_constant(catch_type, "exception_table")?;
            }
        }
        reader.enter("Code");
        self.attributes(reader, &Target::Code)?;
        Ok(())
    }

    fn scan_code(&mut self, code: &mut ClassReader<'_>) -> DecodeResult<()> {
        let start = code.offset();
        let mut last_ldc: Option<u16> = None;
        while !code.is_empty() {
            let pc = code.offset() - start;
            let opcode = code.read_u1()?;
            match opcode {
                opcodes::LDC => {
                    last_ldc = Some(code.read_u1()? as u16);
                    continue;
                }
                opcodes::LDC_W => {
                    last_ldc = Some(code.read_u2()?);
                    continue;
                }
                opcodes::INVOKESTATIC => {
                    let index = code.read_u2()?;
                    if Some(index) == self.for_name || Some(index) == self.class_helper {
                        self.class_for_name(last_ldc);
                    }
                }
                opcodes::NEW
                | opcodes::ANEWARRAY
                | opcodes::CHECKCAST
                | opcodes::INSTANCEOF => {
                    let index = code.read_u2()?;
                    self.refer_class_constant(index, "bytecode")?;
                }
                opcodes::MULTIANEWARRAY => {
                    let index = code.read_u2()?;
                    code.read_u1()?;
                    self.refer_class_constant(index, "bytecode")?;
                }
                opcodes::WIDE => {
                    let modified = code.read_u1()?;
                    code.skip(if modified == opcodes::IINC { 4 } else { 2 })?;
                }
                opcodes::TABLESWITCH => {
                    code.skip(switch_padding(pc))?;
                    code.read_i4()?;
                    let low = code.read_i4()? as i64;
                    let high = code.read_i4()? as i64;
                    if high < low {
                        return Err(code.malformed(format!("tableswitch high {high} below low {low}")));
                    }
                    let targets = ((high - low + 1) as usize)
                        .checked_mul(4)
                        .ok_or_else(|| code.malformed("tableswitch too large"))?;
                    code.skip(targets)?;
                }
                opcodes::LOOKUPSWITCH => {
                    code.skip(switch_padding(pc))?;
                    code.read_i4()?;
                    let pairs = code.read_i4()?;
                    if pairs < 0 {
                        return Err(code.malformed(format!("lookupswitch with {pairs} pairs")));
                    }
                    let bytes = (pairs as usize)
                        .checked_mul(8)
                        .ok_or_else(|| code.malformed("lookupswitch too large"))?;
                    code.skip(bytes)?;
                }
                other => {
                    let len = operand_length(other).unwrap_or(0);
                    code.skip(len)?;
                }
            }
            last_ldc = None;
        }
        Ok(())
    }

    fn class_for_name(&mut self, last_ldc: Option<u16>) {
        let Some(index) = last_ldc else {
            return;
        };
        if let Some(name) = self.pool.string(index) {
            if looks_like_class_name(name) {
                let binary = name.replace('.', "/");
                self.refer(&binary);
            }
        }
    }

    fn stack_map_table(&mut self, reader: &mut ClassReader<'_>) -> DecodeResult<()> {
        let entries = reader.read_u2()?;
        for _ in 0..entries {
            let frame_type = reader.read_u1()?;
            match frame_type {
                0..=63 => {}
                64..=127 => self.verification_type(reader)?,
                128..=246 => {
                    return Err(reader.malformed(format!("reserved stack map frame type {frame_type}")))
                }
                247 => {
                    reader.read_u2()?;
                    self.verification_type(reader)?;
                }
                248..=251 => {
                    reader.read_u2()?;
                }
                252..=254 => {
                    reader.read_u2()?;
                    for _ in 0..(frame_type - 251) {
                        self.verification_type(reader)?;
                    }
                }
                255 => {
                    reader.read_u2()?;
                    let locals = reader.read_u2()?;
                    for _ in 0..locals {
                        self.verification_type(reader)?;
                    }
                    let stack = reader.read_u2()?;
                    for _ in 0..stack {
                        self.verification_type(reader)?;
                    }
                }
            }
        }
        if !reader.is_empty() {
            return Err(reader.malformed(format!(
                "{} bytes left after {entries} stack map frames",
                reader.remaining()
            )));
        }
        Ok(())
    }

    fn verification_type(&mut self, reader: &mut ClassReader<'_>) -> DecodeResult<()> {
        match reader.read_u1()? {
            0..=6 => Ok(()),
            7 => {
                let index = reader.read_u2()?;
                self.refer_class_constant(index, "StackMapTable")
            }
            8 => reader.read_u2().map(|_| ()),
            tag => Err(reader.malformed(format!("unknown verification type {tag}"))),
        }
    }

    fn module(&mut self, reader: &mut ClassReader<'_>) -> DecodeResult<ModuleDescriptor> {
        let pool = self.pool;
        let name = self.module_name(reader.read_u2()?)?;
        reader.read_u2()?;
        let version = pool.optional_utf8(reader.read_u2()?, "Module")?.map(str::to_string);
        let mut module = ModuleDescriptor {
            name,
            version,
            ..ModuleDescriptor::default()
        };

        let requires = reader.read_u2()?;
        for _ in 0..requires {
            module.requires.push(self.module_name(reader.read_u2()?)?);
            reader.read_u2()?;
            reader.read_u2()?;
        }
        for opens in [false, true] {
            let count = reader.read_u2()?;
            for _ in 0..count {
                let package = self.package_name(reader.read_u2()?)?;
                reader.read_u2()?;
                let to = reader.read_u2()?;
                for _ in 0..to {
                    self.module_name(reader.read_u2()?)?;
                }
                if opens {
                    module.opens.push(package);
                } else {
                    module.exports.push(package);
                }
            }
        }
        let uses = reader.read_u2()?;
        for _ in 0..uses {
            let class = pool.class_name(reader.read_u2()?, "Module")?.to_string();
            self.refer(&class);
            module.uses.push(class);
        }
        let provides = reader.read_u2()?;
        for _ in 0..provides {
            let service = pool.class_name(reader.read_u2()?, "Module")?.to_string();
            self.refer(&service);
            let with = reader.read_u2()?;
            let mut implementations = Vec::with_capacity(with as usize);
            for _ in 0..with {
                let implementation = pool.class_name(reader.read_u2()?, "Module")?.to_string();
                self.refer(&implementation);
                implementations.push(implementation);
            }
            module.provides.push((service, implementations));
        }
        Ok(module)
    }

    fn module_name(&self, index: u16) -> DecodeResult<String> {
        match self.pool.get(index, "Module")? {
            Constant::Module { name_index } => Ok(self.pool.utf8(*name_index, "Module")?.to_string()),
            _ => Err(DecodeError::InvalidConstantIndex {
                index,
                section: "Module",
            }),
        }
    }

    fn package_name(&self, index: u16) -> DecodeResult<String> {
        match self.pool.get(index, "Module")? {
            Constant::Package { name_index } => Ok(self.pool.utf8(*name_index, "Module")?.to_string()),
            _ => Err(DecodeError::InvalidConstantIndex {
                index,
                section: "Module",
            }),
        }
    }
}

/// Bytes of padding after a switch opcode at `pc` so operands are 4-aligned.
fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_looks_like_class_name() {
        assert!(looks_like_class_name("x.y.Z"));
        assert!(looks_like_class_name("com.acme.Outer$Inner"));
        assert!(!looks_like_class_name("class"));
        assert!(!looks_like_class_name(".foo"));
        assert!(!looks_like_class_name("nodots"));
        assert!(!looks_like_class_name("a..b"));
        assert!(!looks_like_class_name("hello world.txt"));
        assert!(!looks_like_class_name("1.2.3"));
    }

    #[test]
    fn test_switch_padding() {
        assert_eq!(switch_padding(0), 3);
        assert_eq!(switch_padding(3), 0);
        assert_eq!(switch_padding(2), 1);
    }

    #[test]
    fn test_nest_kind_from_entries() {
        let entry = |inner: &str, outer: Option<&str>, name: Option<&str>, access: u16| InnerClassEntry {
            inner_class: inner.to_string(),
            outer_class: outer.map(str::to_string),
            inner_name: name.map(str::to_string),
            access: AccessFlags(access),
        };
        assert_eq!(nest_kind("a/B", &[]), NestKind::TopLevel);
        assert_eq!(
            nest_kind("a/B$C", &[entry("a/B$C", Some("a/B"), Some("C"), 0x8)]),
            NestKind::StaticNested
        );
        assert_eq!(
            nest_kind("a/B$C", &[entry("a/B$C", Some("a/B"), Some("C"), 0)]),
            NestKind::Inner
        );
        assert_eq!(
            nest_kind("a/B$1C", &[entry("a/B$1C", None, Some("C"), 0)]),
            NestKind::Local
        );
        assert_eq!(nest_kind("a/B$1", &[entry("a/B$1", None, None, 0)]), NestKind::Anonymous);
    }
}
