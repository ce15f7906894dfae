//! Annotation, element value and type-annotation model.

use std::fmt;

/// Retention of an annotation as encoded in the class file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Retention {
    /// `RuntimeVisible*` attributes.
    Runtime,
    /// `RuntimeInvisible*` attributes.
    Class,
}

/// The element an annotation is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    Type,
    Field,
    Method,
    Constructor,
    Parameter,
    Package,
    Module,
    TypeUse,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "TYPE"),
            Self::Field => write!(f, "FIELD"),
            Self::Method => write!(f, "METHOD"),
            Self::Constructor => write!(f, "CONSTRUCTOR"),
            Self::Parameter => write!(f, "PARAMETER"),
            Self::Package => write!(f, "PACKAGE"),
            Self::Module => write!(f, "MODULE"),
            Self::TypeUse => write!(f, "TYPE_USE"),
        }
    }
}

/// A primitive or string constant inside an element value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    /// `B`, `C`, `I`, `S` and `Z` are all stored as ints in the pool.
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Long(v) => write!(f, "{v}"),
            ConstValue::Float(v) => write!(f, "{v}"),
            ConstValue::Double(v) => write!(f, "{v}"),
            ConstValue::String(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    Const { tag: char, value: ConstValue },
    /// Enum constant, with the descriptor of the enum type.
    Enum { type_descriptor: String, const_name: String },
    /// Class literal as a return descriptor, `V` for `void.class`.
    Class(String),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

/// One decoded annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Binary name of the annotation type.
    pub type_name: String,
    pub retention: Retention,
    pub element_type: ElementType,
    /// Name and descriptor of the annotated member, if not the class itself.
    pub member: Option<String>,
    /// Parameter index for parameter annotations.
    pub parameter: Option<u8>,
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    pub fn get(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// String value of an element, when it is a string constant.
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            ElementValue::Const {
                value: ConstValue::String(s),
                ..
            } => Some(s),
            _ => None,
        }
    }
}

/// `target_index` when the target kind carries no index.
pub const TYPEUSE_INDEX_NONE: i32 = -1;
/// `supertype_target` index meaning the `extends` clause.
pub const TYPEUSE_TARGET_INDEX_EXTENDS: i32 = 65535;

/// A type annotation together with its raw target information.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAnnotation {
    pub annotation: Annotation,
    pub target_type: u8,
    /// The `target_info` bytes exactly as encoded.
    pub target_info: Vec<u8>,
    /// Index carried by the target, see [`TYPEUSE_INDEX_NONE`].
    pub target_index: i32,
    /// The `type_path` entries exactly as encoded, without the length byte.
    pub type_path: Vec<u8>,
}

impl TypeAnnotation {
    /// True for annotations on the `extends` clause of a class.
    pub fn is_on_extends(&self) -> bool {
        self.target_type == 0x10 && self.target_index == TYPEUSE_TARGET_INDEX_EXTENDS
    }

    /// True for annotations on the n-th `implements` clause.
    pub fn is_on_implements(&self) -> bool {
        self.target_type == 0x10 && self.target_index != TYPEUSE_TARGET_INDEX_EXTENDS
    }

    pub fn is_on_formal_parameter(&self) -> bool {
        self.target_type == 0x16
    }
}
