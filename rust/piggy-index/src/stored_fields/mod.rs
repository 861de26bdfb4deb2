//! Chunked stored-field format.
//!
//! Data file (`.fdt`): the header string, then chunk records. Each record is
//! `docBase`, `docCount`, `docCount` field counts, `docCount` document byte lengths
//! (all varints), followed by the concatenated encoded fields of those documents.
//! A field is a varint-64 tag `(fieldNumber << 3) | typeCode` and a payload.
//!
//! Metadata file (`.fdm`): the header string, the chunk count, one
//! `(docBase, docCount, startPointer)` record per chunk, the total document count,
//! and the trailer string.

use piggy_common::{Result, error::Error};
use piggy_io::{
    ByteSink, ByteSource,
    codec::{
        read_length_prefixed, read_string, read_tlong, read_zdouble, read_zfloat, read_zint,
        write_length_prefixed, write_string, write_tlong, write_zdouble, write_zfloat,
        write_zint,
    },
};

use crate::document::{IndexableField, NumericValue};

pub mod reader;
pub mod writer;

pub use reader::{Chunk, ChunkHeader, StoredDocument, StoredFieldsMeta, StoredFieldsReader};
pub use writer::{ChunkInfo, StoredFieldsStats, StoredFieldsWriter};

pub const CODEC_HEADER: &str = "piggySearch";
pub const CODEC_FOOTER: &str = "hcraeSyggip";

pub const TYPE_BITS: u32 = 3;
pub const TYPE_MASK: u64 = (1 << TYPE_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StoredFieldType {
    String = 0,
    Bytes = 1,
    Int = 2,
    Float = 3,
    Long = 4,
    Double = 5,
}

impl StoredFieldType {
    pub fn from_code(code: u64) -> Option<StoredFieldType> {
        Some(match code {
            0 => StoredFieldType::String,
            1 => StoredFieldType::Bytes,
            2 => StoredFieldType::Int,
            3 => StoredFieldType::Float,
            4 => StoredFieldType::Long,
            5 => StoredFieldType::Double,
            _ => return None,
        })
    }

    #[inline]
    pub fn code(self) -> u64 {
        self as u64
    }
}

pub fn make_tag(field_number: u32, field_type: StoredFieldType) -> u64 {
    ((field_number as u64) << TYPE_BITS) | field_type.code()
}

pub fn split_tag(tag: u64) -> Result<(u32, StoredFieldType)> {
    let field_type = StoredFieldType::from_code(tag & TYPE_MASK).ok_or_else(|| {
        Error::encoding("field tag", format!("unknown type code {}", tag & TYPE_MASK))
    })?;
    let number = u32::try_from(tag >> TYPE_BITS)
        .map_err(|_| Error::encoding("field tag", format!("field number overflow in {tag}")))?;
    Ok((number, field_type))
}

/// A borrowed stored value, ready to be encoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StoredValueRef<'a> {
    String(&'a str),
    Bytes(&'a [u8]),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
}

impl<'a> StoredValueRef<'a> {
    /// Picks the stored representation of a field: numeric first, then string, then bytes.
    pub fn from_field<F: IndexableField + ?Sized>(field: &'a F) -> Result<StoredValueRef<'a>> {
        if let Some(number) = field.numeric_value() {
            return Ok(match number {
                NumericValue::Int(v) => StoredValueRef::Int(v),
                NumericValue::Long(v) => StoredValueRef::Long(v),
                NumericValue::Float(v) => StoredValueRef::Float(v),
                NumericValue::Double(v) => StoredValueRef::Double(v),
            });
        }
        if let Some(s) = field.string_value() {
            return Ok(StoredValueRef::String(s));
        }
        if let Some(b) = field.binary_value() {
            return Ok(StoredValueRef::Bytes(b));
        }
        Err(Error::validation(
            field.name(),
            "stored field has no string, binary or numeric value",
        ))
    }

    pub fn field_type(&self) -> StoredFieldType {
        match self {
            StoredValueRef::String(_) => StoredFieldType::String,
            StoredValueRef::Bytes(_) => StoredFieldType::Bytes,
            StoredValueRef::Int(_) => StoredFieldType::Int,
            StoredValueRef::Float(_) => StoredFieldType::Float,
            StoredValueRef::Long(_) => StoredFieldType::Long,
            StoredValueRef::Double(_) => StoredFieldType::Double,
        }
    }

    pub fn write_to<S: ByteSink + ?Sized>(&self, sink: &mut S) -> Result<()> {
        match *self {
            StoredValueRef::String(s) => write_string(sink, s),
            StoredValueRef::Bytes(b) => write_length_prefixed(sink, b),
            StoredValueRef::Int(v) => write_zint(sink, v),
            StoredValueRef::Float(v) => write_zfloat(sink, v),
            StoredValueRef::Long(v) => write_tlong(sink, v),
            StoredValueRef::Double(v) => write_zdouble(sink, v),
        }
    }

    pub fn to_owned(&self) -> StoredValue {
        match *self {
            StoredValueRef::String(s) => StoredValue::String(s.to_string()),
            StoredValueRef::Bytes(b) => StoredValue::Bytes(b.to_vec()),
            StoredValueRef::Int(v) => StoredValue::Int(v),
            StoredValueRef::Float(v) => StoredValue::Float(v),
            StoredValueRef::Long(v) => StoredValue::Long(v),
            StoredValueRef::Double(v) => StoredValue::Double(v),
        }
    }
}

/// A decoded stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    String(String),
    Bytes(Vec<u8>),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
}

impl StoredValue {
    pub fn read_from<S: ByteSource + ?Sized>(
        source: &mut S,
        field_type: StoredFieldType,
    ) -> Result<StoredValue> {
        Ok(match field_type {
            StoredFieldType::String => StoredValue::String(read_string(source)?),
            StoredFieldType::Bytes => StoredValue::Bytes(read_length_prefixed(source)?),
            StoredFieldType::Int => StoredValue::Int(read_zint(source)?),
            StoredFieldType::Float => StoredValue::Float(read_zfloat(source)?),
            StoredFieldType::Long => StoredValue::Long(read_tlong(source)?),
            StoredFieldType::Double => StoredValue::Double(read_zdouble(source)?),
        })
    }

    pub fn field_type(&self) -> StoredFieldType {
        match self {
            StoredValue::String(_) => StoredFieldType::String,
            StoredValue::Bytes(_) => StoredFieldType::Bytes,
            StoredValue::Int(_) => StoredFieldType::Int,
            StoredValue::Float(_) => StoredFieldType::Float,
            StoredValue::Long(_) => StoredFieldType::Long,
            StoredValue::Double(_) => StoredFieldType::Double,
        }
    }
}

impl std::fmt::Display for StoredValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoredValue::String(s) => write!(f, "{s:?}"),
            StoredValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            StoredValue::Int(v) => write!(f, "{v}"),
            StoredValue::Float(v) => write!(f, "{v}f"),
            StoredValue::Long(v) => write!(f, "{v}L"),
            StoredValue::Double(v) => write!(f, "{v}d"),
        }
    }
}

/// Length of `s` in UTF-16 code units, or `None` if it is certainly within `limit`.
///
/// UTF-8 is never shorter than UTF-16 in code units, so strings whose byte length is
/// within the limit skip the transcoding count.
pub(crate) fn utf16_len_over(s: &str, limit: usize) -> Option<usize> {
    if s.len() <= limit {
        return None;
    }
    let len = s.encode_utf16().count();
    (len > limit).then_some(len)
}

#[cfg(test)]
mod tests {
    use crate::document::Field;

    use super::{
        StoredFieldType, StoredValue, StoredValueRef, make_tag, split_tag, utf16_len_over,
    };

    #[test]
    fn test_tags() {
        assert_eq!(make_tag(1, StoredFieldType::String), 8);
        assert_eq!(make_tag(2, StoredFieldType::Int), 18);
        assert_eq!(split_tag(18).unwrap(), (2, StoredFieldType::Int));
        assert_eq!(split_tag(8 | 5).unwrap(), (1, StoredFieldType::Double));
        assert!(split_tag(8 | 6).is_err());
        assert!(split_tag(u64::MAX & !7).is_err());
    }

    #[test]
    fn test_value_resolution() {
        let f = Field::numeric("n", 42);
        assert_eq!(StoredValueRef::from_field(&f).unwrap(), StoredValueRef::Int(42));
        let f = Field::text("s", "x");
        assert_eq!(StoredValueRef::from_field(&f).unwrap(), StoredValueRef::String("x"));
        let f = Field::binary("b", vec![1u8]);
        assert_eq!(
            StoredValueRef::from_field(&f).unwrap().field_type(),
            StoredFieldType::Bytes
        );
    }

    #[test]
    fn test_value_encoding() {
        let values = [
            StoredValueRef::String("hello,world"),
            StoredValueRef::Bytes(&[0, 1, 2]),
            StoredValueRef::Int(-5),
            StoredValueRef::Float(0.25),
            StoredValueRef::Long(86_400_000),
            StoredValueRef::Double(-1.0e100),
        ];
        let mut buf = Vec::new();
        for v in &values {
            v.write_to(&mut buf).unwrap();
        }
        let mut source = &buf[..];
        for v in &values {
            let decoded = StoredValue::read_from(&mut source, v.field_type()).unwrap();
            assert_eq!(decoded, v.to_owned());
        }
        assert!(source.is_empty());
    }

    #[test]
    fn test_utf16_len_over() {
        assert_eq!(utf16_len_over("abc", 3), None);
        assert_eq!(utf16_len_over("abcd", 3), Some(4));
        // 3 UTF-8 bytes, 1 UTF-16 unit.
        assert_eq!(utf16_len_over("你", 1), None);
        // Surrogate pair: 4 UTF-8 bytes, 2 UTF-16 units.
        assert_eq!(utf16_len_over("😀", 1), Some(2));
        assert_eq!(utf16_len_over("😀", 2), None);
    }
}
