//! Bounds-checked big-endian cursor over class-file bytes.

use super::{DecodeError, DecodeResult};

/// Cursor over a slice of class-file bytes.
///
/// Every read is bounds-checked and reports the absolute offset and the
/// section being decoded when it runs out of input. Sub-readers created with
/// [`ClassReader::sub_reader`] keep absolute offsets so errors point into the
/// original file.
#[derive(Debug, Clone)]
pub struct ClassReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    base: usize,
    section: &'static str,
}

impl<'a> ClassReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            base: 0,
            section: "header",
        }
    }

    /// Names the section subsequent errors are attributed to.
    pub fn enter(&mut self, section: &'static str) {
        self.section = section;
    }

    pub fn section(&self) -> &'static str {
        self.section
    }

    /// Absolute offset of the next byte to read.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u1(&mut self) -> DecodeResult<u8> {
        let slice = self.read_slice(1)?;
        Ok(slice[0])
    }

    pub fn read_u2(&mut self) -> DecodeResult<u16> {
        let slice = self.read_slice(2)?;
        Ok(u16::from_be_bytes([slice[0], slice[1]]))
    }

    pub fn read_u4(&mut self) -> DecodeResult<u32> {
        let slice = self.read_slice(4)?;
        Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
    }

    pub fn read_i4(&mut self) -> DecodeResult<i32> {
        Ok(self.read_u4()? as i32)
    }

    pub fn read_u8(&mut self) -> DecodeResult<u64> {
        let high = self.read_u4()? as u64;
        let low = self.read_u4()? as u64;
        Ok((high << 32) | low)
    }

    pub fn read_slice(&mut self, len: usize) -> DecodeResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEof {
                offset: self.offset(),
                section: self.section,
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> DecodeResult<()> {
        self.read_slice(len).map(|_| ())
    }

    /// Splits off exactly `len` bytes as an independent reader and advances
    /// past them, whatever the sub-reader later consumes.
    pub fn sub_reader(&mut self, len: usize, section: &'static str) -> DecodeResult<ClassReader<'a>> {
        let base = self.offset();
        let bytes = self.read_slice(len)?;
        Ok(ClassReader {
            bytes,
            pos: 0,
            base,
            section,
        })
    }

    /// Builds a [`DecodeError::Malformed`] at the current position.
    pub fn malformed(&self, reason: impl Into<String>) -> DecodeError {
        DecodeError::Malformed {
            offset: self.offset(),
            section: self.section,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_big_endian() {
        let mut reader = ClassReader::new(&[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x34, 0x07]);
        assert_eq!(reader.read_u4().unwrap(), 0xCAFE_BABE);
        assert_eq!(reader.read_u2().unwrap(), 52);
        assert_eq!(reader.read_u1().unwrap(), 7);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_eof_reports_offset_and_section() {
        let mut reader = ClassReader::new(&[0, 1, 2]);
        reader.enter("fields");
        reader.skip(2).unwrap();
        let err = reader.read_u2().unwrap_err();
        match err {
            DecodeError::UnexpectedEof { offset, section } => {
                assert_eq!(offset, 2);
                assert_eq!(section, "fields");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_sub_reader_keeps_absolute_offsets() {
        let mut reader = ClassReader::new(&[9, 9, 1, 2, 3, 4]);
        reader.skip(2).unwrap();
        let mut sub = reader.sub_reader(2, "attribute").unwrap();
        assert_eq!(reader.offset(), 4);
        assert_eq!(sub.offset(), 2);
        sub.read_u2().unwrap();
        let err = sub.read_u1().unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { offset: 4, section: "attribute" }));
    }

    #[test]
    fn test_huge_length_does_not_overflow() {
        let mut reader = ClassReader::new(&[1, 2, 3]);
        reader.skip(1).unwrap();
        assert!(reader.read_slice(usize::MAX).is_err());
    }
}
