use byteorder::{ByteOrder as _, LittleEndian};

use super::{AttributeDescriptor, CodecError, TypeTag};

/// A decoded extra-bytes value: 64-bit integer for narrow attributes,
/// double for everything else.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue {
    Integer(i64),
    Double(f64),
}

impl AttributeValue {
    pub fn as_f64(self) -> f64 {
        match self {
            AttributeValue::Integer(v) => v as f64,
            AttributeValue::Double(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Raw {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl Raw {
    fn as_f64(self) -> f64 {
        match self {
            Raw::Unsigned(v) => v as f64,
            Raw::Signed(v) => v as f64,
            Raw::Float(v) => v,
        }
    }
}

fn field<'a>(
    buffer: &'a [u8],
    offset: usize,
    descriptor: &AttributeDescriptor,
) -> Result<&'a [u8], CodecError> {
    let needed = offset + descriptor.type_tag.size();
    buffer
        .get(offset..needed)
        .ok_or_else(|| CodecError::BufferTooShort {
            name: descriptor.name.clone(),
            needed,
            available: buffer.len(),
        })
}

fn field_mut<'a>(
    buffer: &'a mut [u8],
    offset: usize,
    descriptor: &AttributeDescriptor,
) -> Result<&'a mut [u8], CodecError> {
    let needed = offset + descriptor.type_tag.size();
    let available = buffer.len();
    buffer
        .get_mut(offset..needed)
        .ok_or_else(|| CodecError::BufferTooShort {
            name: descriptor.name.clone(),
            needed,
            available,
        })
}

fn read_raw(bytes: &[u8], type_tag: TypeTag) -> Raw {
    match type_tag {
        TypeTag::U8 => Raw::Unsigned(bytes[0] as u64),
        TypeTag::I8 => Raw::Signed(bytes[0] as i8 as i64),
        TypeTag::U16 => Raw::Unsigned(LittleEndian::read_u16(bytes) as u64),
        TypeTag::I16 => Raw::Signed(LittleEndian::read_i16(bytes) as i64),
        TypeTag::U32 => Raw::Unsigned(LittleEndian::read_u32(bytes) as u64),
        TypeTag::I32 => Raw::Signed(LittleEndian::read_i32(bytes) as i64),
        TypeTag::U64 => Raw::Unsigned(LittleEndian::read_u64(bytes)),
        TypeTag::I64 => Raw::Signed(LittleEndian::read_i64(bytes)),
        TypeTag::F32 => Raw::Float(LittleEndian::read_f32(bytes) as f64),
        TypeTag::F64 => Raw::Float(LittleEndian::read_f64(bytes)),
    }
}

/// Decodes the attribute stored at `offset` in `buffer`.
///
/// `Ok(None)` is the missing value: the raw value equals the declared no-data
/// sentinel. Scale and offset are applied in double precision as
/// `raw * scale + offset`.
pub fn decode_at(
    buffer: &[u8],
    offset: usize,
    descriptor: &AttributeDescriptor,
) -> Result<Option<AttributeValue>, CodecError> {
    let raw = read_raw(field(buffer, offset, descriptor)?, descriptor.type_tag);

    if descriptor.has_no_data && raw.as_f64() == descriptor.no_data {
        return Ok(None);
    }

    if descriptor.is_narrow() {
        let value = match raw {
            Raw::Unsigned(v) => v as i64,
            Raw::Signed(v) => v,
            Raw::Float(v) => v as i64,
        };
        return Ok(Some(AttributeValue::Integer(value)));
    }

    let mut value = raw.as_f64();
    if descriptor.has_scale || descriptor.has_offset {
        value = value * descriptor.scale + descriptor.offset;
    }
    Ok(Some(AttributeValue::Double(value)))
}

pub fn decode(
    buffer: &[u8],
    descriptor: &AttributeDescriptor,
) -> Result<Option<AttributeValue>, CodecError> {
    decode_at(buffer, descriptor.byte_offset, descriptor)
}

fn quantize(value: f64, type_tag: TypeTag) -> f64 {
    let (min, max) = type_tag.raw_range();
    let value = if type_tag.is_float() {
        value
    } else {
        value.round()
    };
    value.clamp(min, max)
}

fn write_raw(bytes: &mut [u8], raw: f64, type_tag: TypeTag) {
    // `raw` is already clamped to the type range
    match type_tag {
        TypeTag::U8 => bytes[0] = raw as u8,
        TypeTag::I8 => bytes[0] = raw as i8 as u8,
        TypeTag::U16 => LittleEndian::write_u16(bytes, raw as u16),
        TypeTag::I16 => LittleEndian::write_i16(bytes, raw as i16),
        TypeTag::U32 => LittleEndian::write_u32(bytes, raw as u32),
        TypeTag::I32 => LittleEndian::write_i32(bytes, raw as i32),
        TypeTag::U64 => LittleEndian::write_u64(bytes, raw as u64),
        TypeTag::I64 => LittleEndian::write_i64(bytes, raw as i64),
        TypeTag::F32 => LittleEndian::write_f32(bytes, raw as f32),
        TypeTag::F64 => LittleEndian::write_f64(bytes, raw),
    }
}

/// Raw value that `encode` stores for `value`, before narrowing to the type width.
///
/// NaN has no integer representation and is written as a missing value.
pub fn to_raw(value: Option<f64>, descriptor: &AttributeDescriptor) -> Result<f64, CodecError> {
    let value = value.filter(|v| !v.is_nan() || descriptor.type_tag.is_float());
    let raw = match value {
        None if descriptor.has_no_data => descriptor.no_data,
        None => return Err(CodecError::MissingWithoutNoData(descriptor.name.clone())),
        Some(v) if descriptor.has_scale || descriptor.has_offset => {
            (v - descriptor.offset) / descriptor.scale
        }
        Some(v) => v,
    };
    Ok(quantize(raw, descriptor.type_tag))
}

/// Writes `value` into the attribute's slot of `buffer`, saturating at the
/// type's range. `None` writes the no-data sentinel.
pub fn encode_into(
    buffer: &mut [u8],
    value: Option<f64>,
    descriptor: &AttributeDescriptor,
) -> Result<(), CodecError> {
    let raw = to_raw(value, descriptor)?;
    let bytes = field_mut(buffer, descriptor.byte_offset, descriptor)?;
    write_raw(bytes, raw, descriptor.type_tag);
    Ok(())
}

/// Encodes `value` into a standalone buffer of the type's width.
pub fn encode(value: Option<f64>, descriptor: &AttributeDescriptor) -> Result<Vec<u8>, CodecError> {
    let raw = to_raw(value, descriptor)?;
    let mut bytes = vec![0u8; descriptor.type_tag.size()];
    write_raw(&mut bytes, raw, descriptor.type_tag);
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_TAGS: [TypeTag; 10] = [
        TypeTag::U8,
        TypeTag::I8,
        TypeTag::U16,
        TypeTag::I16,
        TypeTag::U32,
        TypeTag::I32,
        TypeTag::U64,
        TypeTag::I64,
        TypeTag::F32,
        TypeTag::F64,
    ];

    fn standalone(type_tag: TypeTag) -> AttributeDescriptor {
        AttributeDescriptor::new(0, 0, type_tag, "attr")
    }

    #[test]
    fn scaled_int16_with_no_data() {
        let d = standalone(TypeTag::I16)
            .with_scale(0.01)
            .with_offset(0.0)
            .with_no_data(-32768.0);

        let missing = (-32768i16).to_le_bytes();
        assert_eq!(decode(&missing, &d).unwrap(), None);

        let value = 500i16.to_le_bytes();
        match decode(&value, &d).unwrap() {
            Some(AttributeValue::Double(v)) => assert!((v - 5.0).abs() < 1e-12),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn narrow_values_decode_to_integers() {
        let d = AttributeDescriptor::new(1, 2, TypeTag::U32, "count");
        let mut buffer = vec![0xff, 0xff];
        buffer.extend_from_slice(&4_000_000_000u32.to_le_bytes());
        assert_eq!(
            decode(&buffer, &d).unwrap(),
            Some(AttributeValue::Integer(4_000_000_000))
        );

        let d = standalone(TypeTag::I8);
        assert_eq!(
            decode(&[0xfe], &d).unwrap(),
            Some(AttributeValue::Integer(-2))
        );
    }

    #[test]
    fn wide_values_decode_to_doubles() {
        let d = standalone(TypeTag::U64);
        assert_eq!(
            decode(&u64::MAX.to_le_bytes(), &d).unwrap(),
            Some(AttributeValue::Double(u64::MAX as f64))
        );

        let d = standalone(TypeTag::F32).with_offset(1.0);
        assert_eq!(
            decode(&2.5f32.to_le_bytes(), &d).unwrap(),
            Some(AttributeValue::Double(3.5))
        );
    }

    #[test]
    fn no_data_compares_raw_value() {
        // raw 0 scaled is 10.0; the sentinel is the raw 0, not 10.0
        let d = standalone(TypeTag::U8)
            .with_scale(1.0)
            .with_offset(10.0)
            .with_no_data(0.0);
        assert_eq!(decode(&[0], &d).unwrap(), None);
        assert_eq!(
            decode(&[10], &d).unwrap(),
            Some(AttributeValue::Double(20.0))
        );
    }

    #[test]
    fn short_buffers_are_errors() {
        let d = AttributeDescriptor::new(0, 3, TypeTag::I32, "short");
        assert!(matches!(
            decode(&[0, 0, 0, 0], &d),
            Err(CodecError::BufferTooShort {
                needed: 7,
                available: 4,
                ..
            })
        ));
        let mut buffer = [0u8; 4];
        assert!(encode_into(&mut buffer, Some(1.0), &d).is_err());
    }

    #[test]
    fn encode_decode_within_quantization_error() {
        for tag in ALL_TAGS {
            let d = standalone(tag).with_scale(0.01).with_offset(2.0);
            for v in [2.0, 2.37, 3.141, 1.0, 0.99] {
                if !tag.is_signed() && !tag.is_float() && v < 2.0 {
                    continue;
                }
                let bytes = encode(Some(v), &d).unwrap();
                assert_eq!(bytes.len(), tag.size());
                let back = decode(&bytes, &d).unwrap().unwrap().as_f64();
                let bound = if tag == TypeTag::F32 { 1e-6 } else { 0.005 + 1e-9 };
                assert!((back - v).abs() <= bound, "{:?}: {} -> {}", tag, v, back);
            }
        }
    }

    #[test]
    fn encode_decode_unscaled_integers_exactly() {
        for tag in ALL_TAGS {
            let d = standalone(tag);
            let bytes = encode(Some(42.0), &d).unwrap();
            assert_eq!(decode(&bytes, &d).unwrap().unwrap().as_f64(), 42.0);
        }
    }

    #[test]
    fn encode_saturates_out_of_range_values() {
        let d = standalone(TypeTag::I16);
        assert_eq!(encode(Some(1e9), &d).unwrap(), i16::MAX.to_le_bytes().to_vec());
        assert_eq!(encode(Some(-1e9), &d).unwrap(), i16::MIN.to_le_bytes().to_vec());

        let d = standalone(TypeTag::U8);
        assert_eq!(encode(Some(-5.0), &d).unwrap(), vec![0]);
        assert_eq!(encode(Some(300.0), &d).unwrap(), vec![255]);

        let d = standalone(TypeTag::U16).with_scale(0.001);
        let bytes = encode(Some(1000.0), &d).unwrap();
        assert_eq!(bytes, u16::MAX.to_le_bytes().to_vec());
        assert_eq!(
            decode(&bytes, &d).unwrap(),
            Some(AttributeValue::Double(u16::MAX as f64 * 0.001))
        );

        let d = standalone(TypeTag::I64);
        let bytes = encode(Some(1e30), &d).unwrap();
        assert_eq!(bytes, i64::MAX.to_le_bytes().to_vec());
    }

    #[test]
    fn encode_rounds_half_away_from_zero() {
        let d = standalone(TypeTag::I32);
        assert_eq!(encode(Some(2.5), &d).unwrap(), 3i32.to_le_bytes().to_vec());
        assert_eq!(encode(Some(-2.5), &d).unwrap(), (-3i32).to_le_bytes().to_vec());
    }

    #[test]
    fn missing_value_round_trips_through_no_data() {
        let d = standalone(TypeTag::I16)
            .with_scale(0.01)
            .with_no_data(-32768.0);
        let bytes = encode(None, &d).unwrap();
        assert_eq!(bytes, (-32768i16).to_le_bytes().to_vec());
        assert_eq!(decode(&bytes, &d).unwrap(), None);

        let d = standalone(TypeTag::F64).with_no_data(-9999.0);
        let bytes = encode(None, &d).unwrap();
        assert_eq!(decode(&bytes, &d).unwrap(), None);
    }

    #[test]
    fn missing_value_without_no_data_is_an_error() {
        let d = standalone(TypeTag::U8);
        assert!(matches!(
            encode(None, &d),
            Err(CodecError::MissingWithoutNoData(_))
        ));
    }

    #[test]
    fn nan_is_written_as_missing() {
        let d = standalone(TypeTag::I16).with_no_data(-32768.0);
        assert_eq!(
            encode(Some(f64::NAN), &d).unwrap(),
            (-32768i16).to_le_bytes().to_vec()
        );
        assert_eq!(decode(&encode(Some(f64::NAN), &d).unwrap(), &d).unwrap(), None);

        let d = standalone(TypeTag::U8);
        assert!(matches!(
            encode(Some(f64::NAN), &d),
            Err(CodecError::MissingWithoutNoData(_))
        ));

        let d = standalone(TypeTag::F64);
        let bytes: [u8; 8] = encode(Some(f64::NAN), &d).unwrap().try_into().unwrap();
        assert!(f64::from_le_bytes(bytes).is_nan());
    }

    #[test]
    fn encode_into_uses_descriptor_offset() {
        let d = AttributeDescriptor::new(0, 2, TypeTag::U16, "slot");
        let mut buffer = vec![7u8; 4];
        encode_into(&mut buffer, Some(258.0), &d).unwrap();
        assert_eq!(buffer, vec![7, 7, 2, 1]);
    }
}
