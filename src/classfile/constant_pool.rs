//! Constant pool decoding.

use super::reader::ClassReader;
use super::{DecodeError, DecodeResult};

pub const CONSTANT_UTF8: u8 = 1;
pub const CONSTANT_INTEGER: u8 = 3;
pub const CONSTANT_FLOAT: u8 = 4;
pub const CONSTANT_LONG: u8 = 5;
pub const CONSTANT_DOUBLE: u8 = 6;
pub const CONSTANT_CLASS: u8 = 7;
pub const CONSTANT_STRING: u8 = 8;
pub const CONSTANT_FIELDREF: u8 = 9;
pub const CONSTANT_METHODREF: u8 = 10;
pub const CONSTANT_INTERFACE_METHODREF: u8 = 11;
pub const CONSTANT_NAME_AND_TYPE: u8 = 12;
pub const CONSTANT_METHOD_HANDLE: u8 = 15;
pub const CONSTANT_METHOD_TYPE: u8 = 16;
pub const CONSTANT_DYNAMIC: u8 = 17;
pub const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
pub const CONSTANT_MODULE: u8 = 19;
pub const CONSTANT_PACKAGE: u8 = 20;

/// One constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name_index: u16 },
    String { string_index: u16 },
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { reference_kind: u8, reference_index: u16 },
    MethodType { descriptor_index: u16 },
    Dynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_method_attr_index: u16, name_and_type_index: u16 },
    Module { name_index: u16 },
    Package { name_index: u16 },
    /// Index 0 and the second slot of a Long or Double.
    Unusable,
}

/// A resolved field, method or interface method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn parse(reader: &mut ClassReader<'_>) -> DecodeResult<Self> {
        reader.enter("constant_pool");
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);

        let mut index = 1;
        while index < count {
            let offset = reader.offset();
            let tag = reader.read_u1()?;
            let entry = match tag {
                CONSTANT_UTF8 => {
                    let len = reader.read_u2()? as usize;
                    let bytes = reader.read_slice(len)?;
                    Constant::Utf8(decode_modified_utf8(bytes, offset)?)
                }
                CONSTANT_INTEGER => Constant::Integer(reader.read_i4()?),
                CONSTANT_FLOAT => Constant::Float(f32::from_bits(reader.read_u4()?)),
                CONSTANT_LONG => Constant::Long(reader.read_u8()? as i64),
                CONSTANT_DOUBLE => Constant::Double(f64::from_bits(reader.read_u8()?)),
                CONSTANT_CLASS => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                CONSTANT_STRING => Constant::String {
                    string_index: reader.read_u2()?,
                },
                CONSTANT_FIELDREF => Constant::Fieldref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_METHODREF => Constant::Methodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_INTERFACE_METHODREF => Constant::InterfaceMethodref {
                    class_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_NAME_AND_TYPE => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                CONSTANT_METHOD_HANDLE => Constant::MethodHandle {
                    reference_kind: reader.read_u1()?,
                    reference_index: reader.read_u2()?,
                },
                CONSTANT_METHOD_TYPE => Constant::MethodType {
                    descriptor_index: reader.read_u2()?,
                },
                CONSTANT_DYNAMIC => Constant::Dynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap_method_attr_index: reader.read_u2()?,
                    name_and_type_index: reader.read_u2()?,
                },
                CONSTANT_MODULE => Constant::Module {
                    name_index: reader.read_u2()?,
                },
                CONSTANT_PACKAGE => Constant::Package {
                    name_index: reader.read_u2()?,
                },
                other => return Err(DecodeError::UnsupportedConstant { tag: other, offset }),
            };

            let wide = matches!(entry, Constant::Long(_) | Constant::Double(_));
            entries.push(entry);
            index += 1;
            if wide {
                entries.push(Constant::Unusable);
                index += 1;
            }
        }

        // A Long or Double in the last slot spills one entry past the count.
        entries.truncate(count.max(1));
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, &Constant)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (index as u16, entry))
    }

    pub fn get(&self, index: u16, section: &'static str) -> DecodeResult<&Constant> {
        match self.entries.get(index as usize) {
            Some(Constant::Unusable) | None => {
                Err(DecodeError::InvalidConstantIndex { index, section })
            }
            Some(entry) => Ok(entry),
        }
    }

    pub fn utf8(&self, index: u16, section: &'static str) -> DecodeResult<&str> {
        match self.get(index, section)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(DecodeError::InvalidConstantIndex { index, section }),
        }
    }

    /// Reads an optional UTF-8 constant where index 0 means absent.
    pub fn optional_utf8(&self, index: u16, section: &'static str) -> DecodeResult<Option<&str>> {
        if index == 0 {
            Ok(None)
        } else {
            self.utf8(index, section).map(Some)
        }
    }

    /// Binary name of a `CONSTANT_Class` entry.
    pub fn class_name(&self, index: u16, section: &'static str) -> DecodeResult<&str> {
        match self.get(index, section)? {
            Constant::Class { name_index } => self.utf8(*name_index, section),
            _ => Err(DecodeError::InvalidConstantIndex { index, section }),
        }
    }

    pub fn optional_class_name(&self, index: u16, section: &'static str) -> DecodeResult<Option<&str>> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index, section).map(Some)
        }
    }

    /// Value of a `CONSTANT_String` entry, `None` for any other tag.
    pub fn string(&self, index: u16) -> Option<&str> {
        match self.entries.get(index as usize) {
            Some(Constant::String { string_index }) => match self.entries.get(*string_index as usize) {
                Some(Constant::Utf8(value)) => Some(value),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn name_and_type(&self, index: u16, section: &'static str) -> DecodeResult<(&str, &str)> {
        match self.get(index, section)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index, section)?, self.utf8(*descriptor_index, section)?)),
            _ => Err(DecodeError::InvalidConstantIndex { index, section }),
        }
    }

    pub fn member_ref(&self, index: u16, section: &'static str) -> DecodeResult<MemberRef<'_>> {
        match self.get(index, section)? {
            Constant::Fieldref {
                class_index,
                name_and_type_index,
            }
            | Constant::Methodref {
                class_index,
                name_and_type_index,
            }
            | Constant::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => {
                let class = self.class_name(*class_index, section)?;
                let (name, descriptor) = self.name_and_type(*name_and_type_index, section)?;
                Ok(MemberRef {
                    class,
                    name,
                    descriptor,
                })
            }
            _ => Err(DecodeError::InvalidConstantIndex { index, section }),
        }
    }

    /// Finds the index of a `Methodref` to the given method, if present.
    pub fn find_method_ref(&self, class: &str, name: &str, descriptor: &str) -> Option<u16> {
        self.iter().find_map(|(index, entry)| match entry {
            Constant::Methodref { .. } => {
                let member = self.member_ref(index, "constant_pool").ok()?;
                (member.class == class && member.name == name && member.descriptor == descriptor)
                    .then_some(index)
            }
            _ => None,
        })
    }
}

/// Decodes the JVM's modified UTF-8 encoding.
///
/// NUL is encoded as `C0 80` and supplementary characters as surrogate pairs
/// of three-byte sequences. Unpaired surrogates become U+FFFD.
pub fn decode_modified_utf8(bytes: &[u8], offset: usize) -> DecodeResult<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return Ok(text.to_string());
    }

    let invalid = || DecodeError::InvalidUtf8 { offset };
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *bytes.get(i + 1).ok_or_else(invalid)?;
            if b2 & 0xC0 != 0x80 {
                return Err(invalid());
            }
            units.push((((b & 0x1F) as u16) << 6) | (b2 & 0x3F) as u16);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *bytes.get(i + 1).ok_or_else(invalid)?;
            let b3 = *bytes.get(i + 2).ok_or_else(invalid)?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return Err(invalid());
            }
            units.push((((b & 0x0F) as u16) << 12) | (((b2 & 0x3F) as u16) << 6) | (b3 & 0x3F) as u16);
            i += 3;
        } else {
            return Err(invalid());
        }
    }

    Ok(char::decode_utf16(units)
        .map(|unit| unit.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_bytes(count: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = count.to_be_bytes().to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_parses_class_and_utf8() {
        let bytes = pool_bytes(3, &[1, 0, 3, b'a', b'/', b'B', 7, 0, 1]);
        let pool = ConstantPool::parse(&mut ClassReader::new(&bytes)).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.class_name(2, "test").unwrap(), "a/B");
    }

    #[test]
    fn test_long_takes_two_slots() {
        let bytes = pool_bytes(4, &[5, 0, 0, 0, 0, 0, 0, 0, 42, 1, 0, 1, b'x']);
        let pool = ConstantPool::parse(&mut ClassReader::new(&bytes)).unwrap();
        assert_eq!(pool.get(1, "test").unwrap(), &Constant::Long(42));
        assert!(pool.get(2, "test").is_err());
        assert_eq!(pool.utf8(3, "test").unwrap(), "x");
    }

    #[test]
    fn test_unknown_tag_is_error() {
        let bytes = pool_bytes(2, &[99]);
        let err = ConstantPool::parse(&mut ClassReader::new(&bytes)).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedConstant { tag: 99, offset: 2 }));
    }

    #[test]
    fn test_truncated_pool_is_error() {
        let bytes = pool_bytes(2, &[1, 0, 10, b'a']);
        let err = ConstantPool::parse(&mut ClassReader::new(&bytes)).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { section: "constant_pool", .. }));
    }

    #[test]
    fn test_modified_utf8_nul_and_surrogates() {
        assert_eq!(decode_modified_utf8(&[0x61, 0xC0, 0x80, 0x62], 0).unwrap(), "a\0b");
        // U+1F600 as a surrogate pair of three-byte sequences
        let bytes = [0xED, 0xA0, 0xBD, 0xED, 0xB8, 0x80];
        assert_eq!(decode_modified_utf8(&bytes, 0).unwrap(), "\u{1F600}");
        assert!(decode_modified_utf8(&[0xF8], 0).is_err());
    }
}
