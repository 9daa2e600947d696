use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::schema::ExtraBytesEntry;

pub mod codec;

pub use codec::{decode, decode_at, encode, encode_into, AttributeValue};

const NO_DATA_BIT: u8 = 0x01;
const MIN_BIT: u8 = 0x02;
const MAX_BIT: u8 = 0x04;
const SCALE_BIT: u8 = 0x08;
const OFFSET_BIT: u8 = 0x10;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("extra bytes attribute '{name}' has unsupported data type {data_type}")]
    UnsupportedType { name: String, data_type: u8 },
    #[error(
        "extra bytes attribute '{name}' is an array of {dimension} values, only scalar attributes are supported"
    )]
    UnsupportedDimension { name: String, dimension: u8 },
    #[error("extra bytes attribute '{name}' needs {needed} bytes but the point carries {available}")]
    BufferTooShort {
        name: String,
        needed: usize,
        available: usize,
    },
    #[error("extra bytes attribute '{0}' has no no-data value, a missing value cannot be written")]
    MissingWithoutNoData(String),
}

/// Storage type of an extra-bytes attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeTag {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
}

impl TypeTag {
    pub fn from_index(index: u8) -> Option<Self> {
        let tag = match index {
            0 => TypeTag::U8,
            1 => TypeTag::I8,
            2 => TypeTag::U16,
            3 => TypeTag::I16,
            4 => TypeTag::U32,
            5 => TypeTag::I32,
            6 => TypeTag::U64,
            7 => TypeTag::I64,
            8 => TypeTag::F32,
            9 => TypeTag::F64,
            _ => return None,
        };
        Some(tag)
    }

    /// 1-based data type as written in an extra-bytes description (scalar form).
    pub fn data_type(self) -> u8 {
        self as u8 + 1
    }

    pub fn size(self) -> usize {
        match self {
            TypeTag::U8 | TypeTag::I8 => 1,
            TypeTag::U16 | TypeTag::I16 => 2,
            TypeTag::U32 | TypeTag::I32 | TypeTag::F32 => 4,
            TypeTag::U64 | TypeTag::I64 | TypeTag::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, TypeTag::F32 | TypeTag::F64)
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            TypeTag::I8 | TypeTag::I16 | TypeTag::I32 | TypeTag::I64
        )
    }

    /// Integer types of at most 32 bits.
    pub fn is_small_integer(self) -> bool {
        matches!(
            self,
            TypeTag::U8 | TypeTag::I8 | TypeTag::U16 | TypeTag::I16 | TypeTag::U32 | TypeTag::I32
        )
    }

    /// Smallest and largest raw values, used to saturate on encode.
    pub fn raw_range(self) -> (f64, f64) {
        match self {
            TypeTag::U8 => (u8::MIN as f64, u8::MAX as f64),
            TypeTag::I8 => (i8::MIN as f64, i8::MAX as f64),
            TypeTag::U16 => (u16::MIN as f64, u16::MAX as f64),
            TypeTag::I16 => (i16::MIN as f64, i16::MAX as f64),
            TypeTag::U32 => (u32::MIN as f64, u32::MAX as f64),
            TypeTag::I32 => (i32::MIN as f64, i32::MAX as f64),
            TypeTag::U64 => (u64::MIN as f64, u64::MAX as f64),
            TypeTag::I64 => (i64::MIN as f64, i64::MAX as f64),
            TypeTag::F32 => (f32::MIN as f64, f32::MAX as f64),
            TypeTag::F64 => (f64::MIN, f64::MAX),
        }
    }
}

/// Decoding parameters of one extra-bytes attribute. Built once per stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub id: usize,
    pub byte_offset: usize,
    pub type_tag: TypeTag,
    pub has_no_data: bool,
    pub has_min: bool,
    pub has_max: bool,
    pub has_scale: bool,
    pub has_offset: bool,
    pub no_data: f64,
    pub min: f64,
    pub max: f64,
    pub scale: f64,
    pub offset: f64,
    pub name: String,
    pub description: String,
}

impl AttributeDescriptor {
    pub fn new(id: usize, byte_offset: usize, type_tag: TypeTag, name: &str) -> Self {
        AttributeDescriptor {
            id,
            byte_offset,
            type_tag,
            has_no_data: false,
            has_min: false,
            has_max: false,
            has_scale: false,
            has_offset: false,
            no_data: 0.0,
            min: 0.0,
            max: 0.0,
            scale: 1.0,
            offset: 0.0,
            name: name.to_string(),
            description: String::new(),
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.has_scale = true;
        self.scale = scale;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.has_offset = true;
        self.offset = offset;
        self
    }

    pub fn with_no_data(mut self, raw: f64) -> Self {
        self.has_no_data = true;
        self.no_data = raw;
        self
    }

    /// Decoded values fit a 32-bit integer column without loss.
    pub fn is_narrow(&self) -> bool {
        self.type_tag.is_small_integer() && !(self.has_scale || self.has_offset)
    }

    pub fn options(&self) -> u8 {
        let mut options = 0;
        for (set, bit) in [
            (self.has_no_data, NO_DATA_BIT),
            (self.has_min, MIN_BIT),
            (self.has_max, MAX_BIT),
            (self.has_scale, SCALE_BIT),
            (self.has_offset, OFFSET_BIT),
        ] {
            if set {
                options |= bit;
            }
        }
        options
    }

    /// Back to a description entry, e.g. to declare the attribute in an output header.
    pub fn to_entry(&self) -> ExtraBytesEntry {
        ExtraBytesEntry {
            data_type: self.type_tag.data_type(),
            options: self.options(),
            name: self.name.clone(),
            description: self.description.clone(),
            no_data: self.no_data,
            min: self.min,
            max: self.max,
            scale: if self.has_scale { self.scale } else { 0.0 },
            offset: if self.has_offset { self.offset } else { 0.0 },
        }
    }
}

/// Builds the descriptor of attribute `id` from its description entry.
///
/// The declared data type is 1-based and encodes the array dimension:
/// `type_tag = (data_type - 1) % 10`, `dimension = (data_type - 1) / 10 + 1`.
/// Opaque (type 0), unknown (> 30) and array attributes are refused.
pub fn describe(
    id: usize,
    byte_offset: usize,
    entry: &ExtraBytesEntry,
) -> Result<AttributeDescriptor, CodecError> {
    if entry.data_type == 0 || entry.data_type > 30 {
        return Err(CodecError::UnsupportedType {
            name: entry.name.clone(),
            data_type: entry.data_type,
        });
    }

    let dimension = (entry.data_type - 1) / 10 + 1;
    if dimension > 1 {
        return Err(CodecError::UnsupportedDimension {
            name: entry.name.clone(),
            dimension,
        });
    }

    let type_tag =
        TypeTag::from_index((entry.data_type - 1) % 10).ok_or_else(|| {
            CodecError::UnsupportedType {
                name: entry.name.clone(),
                data_type: entry.data_type,
            }
        })?;

    let options = entry.options;
    let mut descriptor = AttributeDescriptor::new(id, byte_offset, type_tag, &entry.name);
    descriptor.description = entry.description.clone();
    descriptor.has_no_data = options & NO_DATA_BIT != 0;
    descriptor.has_min = options & MIN_BIT != 0;
    descriptor.has_max = options & MAX_BIT != 0;
    descriptor.has_scale = options & SCALE_BIT != 0;
    descriptor.has_offset = options & OFFSET_BIT != 0;

    if descriptor.has_no_data {
        descriptor.no_data = entry.no_data;
    }
    if descriptor.has_min {
        descriptor.min = entry.min;
    }
    if descriptor.has_max {
        descriptor.max = entry.max;
    }
    if descriptor.has_scale {
        descriptor.scale = entry.scale;
    }
    if descriptor.has_offset {
        descriptor.offset = entry.offset;
    }

    Ok(descriptor)
}
