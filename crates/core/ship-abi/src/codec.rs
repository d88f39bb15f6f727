//! Binary encoding of [`Value`]s against registry types.
//!
//! Fixed-width integers and floats are little-endian. Lengths, array sizes and variant indexes
//! are LEB128 `varuint32`. Optionals carry a one-byte presence flag; binary extensions are only
//! read when input remains.

use crate::{
    error::{DecodeError, EncodeError},
    name::Name,
    registry::{TypeKind, TypeRef, TypeRegistry},
    types::ScalarType,
    value::{Key, Value},
};

const KEY_LEN: usize = 33;
const SIGNATURE_LEN: usize = 65;
const KEY_TYPE_WEBAUTHN: u8 = 2;

impl TypeRegistry {
    /// Decodes `bytes` as a value of the type expression `expr`.
    pub fn decode_named(&self, expr: &str, bytes: &[u8]) -> Result<Value, DecodeError> {
        let ty = self.resolve(expr)?;
        self.decode(&ty, bytes)
    }

    /// Decodes `bytes` as one value of `ty`; the whole buffer must be consumed.
    pub fn decode(&self, ty: &TypeRef, bytes: &[u8]) -> Result<Value, DecodeError> {
        let mut reader = Reader::new(bytes);
        let value = self.read(&mut reader, ty)?;
        if reader.remaining() > 0 {
            return Err(DecodeError::TrailingBytes {
                ty: self.display(ty),
                remaining: reader.remaining(),
            });
        }
        Ok(value)
    }

    /// Encodes `value` as the type expression `expr`.
    pub fn encode_named(&self, expr: &str, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let ty = self
            .resolve(expr)
            .map_err(|_| EncodeError::UnknownType(expr.to_string()))?;
        self.encode(&ty, value)
    }

    pub fn encode(&self, ty: &TypeRef, value: &Value) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();
        self.write(&mut out, ty, value)?;
        Ok(out)
    }

    fn read(&self, reader: &mut Reader<'_>, ty: &TypeRef) -> Result<Value, DecodeError> {
        match ty {
            TypeRef::Defined(id) => {
                let descriptor = self.descriptor(*id);
                match &descriptor.kind {
                    TypeKind::Scalar(scalar) => read_scalar(reader, *scalar),
                    TypeKind::Struct(fields) => {
                        let mut values = Vec::with_capacity(fields.len());
                        for field in fields {
                            values.push((field.name.clone(), self.read(reader, &field.ty)?));
                        }
                        Ok(Value::Struct(values))
                    }
                    TypeKind::Variant(alternatives) => {
                        let index = reader.varuint32()?;
                        let (name, alternative) =
                            alternatives.get(index as usize).ok_or_else(|| {
                                DecodeError::InvalidVariantIndex {
                                    ty: descriptor.name.clone(),
                                    index,
                                }
                            })?;
                        Ok(Value::Variant(
                            name.clone(),
                            Box::new(self.read(reader, alternative)?),
                        ))
                    }
                }
            }
            TypeRef::Array(inner) => {
                let len = reader.varuint32()? as usize;
                let mut items = Vec::with_capacity(len.min(reader.remaining()));
                for _ in 0..len {
                    items.push(self.read(reader, inner)?);
                }
                Ok(Value::Array(items))
            }
            TypeRef::Optional(inner) => {
                if reader.bool()? {
                    Ok(Value::some(self.read(reader, inner)?))
                } else {
                    Ok(Value::Optional(None))
                }
            }
            TypeRef::Extension(inner) => {
                if reader.remaining() == 0 {
                    Ok(Value::Optional(None))
                } else {
                    Ok(Value::some(self.read(reader, inner)?))
                }
            }
        }
    }

    fn write(&self, out: &mut Vec<u8>, ty: &TypeRef, value: &Value) -> Result<(), EncodeError> {
        match ty {
            TypeRef::Defined(id) => {
                let descriptor = self.descriptor(*id);
                match &descriptor.kind {
                    TypeKind::Scalar(scalar) => write_scalar(out, *scalar, value),
                    TypeKind::Struct(fields) => {
                        if !matches!(value, Value::Struct(_)) {
                            return Err(mismatch(&descriptor.name, value));
                        }
                        for field in fields {
                            match value.field(&field.name) {
                                Some(field_value) => self.write(out, &field.ty, field_value)?,
                                // Trailing extensions may be left out.
                                None if matches!(field.ty, TypeRef::Extension(_)) => break,
                                None => {
                                    return Err(EncodeError::MissingField {
                                        ty: descriptor.name.clone(),
                                        field: field.name.clone(),
                                    });
                                }
                            }
                        }
                        Ok(())
                    }
                    TypeKind::Variant(alternatives) => {
                        let Value::Variant(name, inner) = value else {
                            return Err(mismatch(&descriptor.name, value));
                        };
                        let index = alternatives
                            .iter()
                            .position(|(alternative, _)| alternative == name)
                            .ok_or_else(|| EncodeError::UnknownVariant {
                                ty: descriptor.name.clone(),
                                name: name.clone(),
                            })?;
                        write_varuint32(out, index as u32);
                        self.write(out, &alternatives[index].1, inner)
                    }
                }
            }
            TypeRef::Array(inner) => {
                let Value::Array(items) = value else {
                    return Err(mismatch(&self.display(ty), value));
                };
                write_len(out, items.len(), "array")?;
                for item in items {
                    self.write(out, inner, item)?;
                }
                Ok(())
            }
            TypeRef::Optional(inner) => match value {
                Value::Optional(None) => {
                    out.push(0);
                    Ok(())
                }
                Value::Optional(Some(present)) => {
                    out.push(1);
                    self.write(out, inner, present)
                }
                other => Err(mismatch(&self.display(ty), other)),
            },
            TypeRef::Extension(inner) => match value {
                Value::Optional(None) => Ok(()),
                Value::Optional(Some(present)) => self.write(out, inner, present),
                other => self.write(out, inner, other),
            },
        }
    }
}

fn mismatch(expected: &str, found: &Value) -> EncodeError {
    EncodeError::TypeMismatch {
        expected: expected.to_string(),
        found: found.kind(),
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEnd {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn bool(&mut self) -> Result<bool, DecodeError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }

    fn varuint32(&mut self) -> Result<u32, DecodeError> {
        let start = self.pos;
        let mut result = 0u64;
        let mut shift = 0;
        loop {
            let byte = self.u8()?;
            result |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 35 {
                return Err(DecodeError::VarintOverflow { offset: start });
            }
        }
        u32::try_from(result).map_err(|_| DecodeError::VarintOverflow { offset: start })
    }

    /// A `varuint32` length followed by that many bytes.
    fn sized(&mut self) -> Result<&'a [u8], DecodeError> {
        let offset = self.pos;
        let length = self.varuint32()? as usize;
        if length > self.remaining() {
            return Err(DecodeError::LengthOverflow { offset, length });
        }
        self.take(length)
    }
}

fn read_scalar(reader: &mut Reader<'_>, scalar: ScalarType) -> Result<Value, DecodeError> {
    let value = match scalar {
        ScalarType::Bool => Value::Bool(reader.bool()?),
        ScalarType::Int8 => Value::Int(i8::from_le_bytes(reader.array()?).into()),
        ScalarType::UInt8 => Value::UInt(reader.u8()?.into()),
        ScalarType::Int16 => Value::Int(i16::from_le_bytes(reader.array()?).into()),
        ScalarType::UInt16 => Value::UInt(u16::from_le_bytes(reader.array()?).into()),
        ScalarType::Int32 => Value::Int(i32::from_le_bytes(reader.array()?).into()),
        ScalarType::UInt32 => Value::UInt(u32::from_le_bytes(reader.array()?).into()),
        ScalarType::Int64 => Value::Int(i64::from_le_bytes(reader.array()?)),
        ScalarType::UInt64 => Value::UInt(u64::from_le_bytes(reader.array()?)),
        ScalarType::Int128 => Value::Int128(i128::from_le_bytes(reader.array()?)),
        ScalarType::UInt128 => Value::UInt128(u128::from_le_bytes(reader.array()?)),
        ScalarType::VarUInt32 => Value::UInt(reader.varuint32()?.into()),
        ScalarType::VarInt32 => {
            let raw = reader.varuint32()?;
            Value::Int(((raw >> 1) as i32 ^ -((raw & 1) as i32)).into())
        }
        ScalarType::Float32 => Value::Float32(f32::from_le_bytes(reader.array()?)),
        ScalarType::Float64 => Value::Float64(f64::from_le_bytes(reader.array()?)),
        ScalarType::Float128 => Value::Float128(reader.array()?),
        ScalarType::TimePoint => Value::TimePoint(i64::from_le_bytes(reader.array()?)),
        ScalarType::TimePointSec => Value::TimePointSec(u32::from_le_bytes(reader.array()?)),
        ScalarType::BlockTimestamp => Value::BlockTimestamp(u32::from_le_bytes(reader.array()?)),
        ScalarType::Name => Value::Name(Name(u64::from_le_bytes(reader.array()?))),
        ScalarType::Bytes => Value::Bytes(reader.sized()?.to_vec()),
        ScalarType::String => Value::String(
            String::from_utf8(reader.sized()?.to_vec()).map_err(DecodeError::InvalidUtf8)?,
        ),
        ScalarType::Checksum160 | ScalarType::Checksum256 | ScalarType::Checksum512 => {
            let len = scalar.checksum_len().unwrap_or_default();
            Value::Checksum(reader.take(len)?.to_vec())
        }
        ScalarType::PublicKey => Value::PublicKey(read_key(reader, KEY_LEN, false)?),
        ScalarType::Signature => Value::Signature(read_key(reader, SIGNATURE_LEN, true)?),
    };
    Ok(value)
}

/// Reads a curve tag and its key material. WebAuthn material is variable-length and kept raw.
fn read_key(reader: &mut Reader<'_>, len: usize, signature: bool) -> Result<Key, DecodeError> {
    let kind = reader.u8()?;
    let start = reader.pos;
    match kind {
        0 | 1 => {
            reader.take(len)?;
        }
        KEY_TYPE_WEBAUTHN => {
            reader.take(len)?;
            if signature {
                reader.sized()?; // authenticator data
                reader.sized()?; // client json
            } else {
                reader.u8()?; // user presence
                reader.sized()?; // relying party id
            }
        }
        other => return Err(DecodeError::InvalidKeyType(other)),
    }
    Ok(Key {
        kind,
        data: reader.buf[start..reader.pos].to_vec(),
    })
}

fn write_varuint32(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn write_len(out: &mut Vec<u8>, len: usize, ty: &'static str) -> Result<(), EncodeError> {
    let len = u32::try_from(len).map_err(|_| EncodeError::OutOfRange {
        ty,
        value: len.to_string(),
    })?;
    write_varuint32(out, len);
    Ok(())
}

fn integer(value: &Value) -> Option<i128> {
    match value {
        Value::Int(v) => Some((*v).into()),
        Value::UInt(v) => Some((*v).into()),
        Value::Int128(v) => Some(*v),
        Value::UInt128(v) => i128::try_from(*v).ok(),
        _ => None,
    }
}

fn write_scalar(out: &mut Vec<u8>, scalar: ScalarType, value: &Value) -> Result<(), EncodeError> {
    let ty = scalar.as_str();
    let mismatch = || EncodeError::TypeMismatch {
        expected: ty.to_string(),
        found: value.kind(),
    };
    macro_rules! int {
        ($t:ty) => {{
            let wide = integer(value).ok_or_else(mismatch)?;
            let narrow = <$t>::try_from(wide).map_err(|_| EncodeError::OutOfRange {
                ty,
                value: wide.to_string(),
            })?;
            out.extend_from_slice(&narrow.to_le_bytes());
        }};
    }

    match scalar {
        ScalarType::Bool => out.push(u8::from(value.as_bool().ok_or_else(mismatch)?)),
        ScalarType::Int8 => int!(i8),
        ScalarType::UInt8 => int!(u8),
        ScalarType::Int16 => int!(i16),
        ScalarType::UInt16 => int!(u16),
        ScalarType::Int32 => int!(i32),
        ScalarType::UInt32 => int!(u32),
        ScalarType::Int64 => int!(i64),
        ScalarType::UInt64 => int!(u64),
        ScalarType::Int128 => int!(i128),
        ScalarType::UInt128 => {
            let wide = match value {
                Value::UInt128(v) => *v,
                other => {
                    let signed = integer(other).ok_or_else(mismatch)?;
                    u128::try_from(signed).map_err(|_| EncodeError::OutOfRange {
                        ty,
                        value: signed.to_string(),
                    })?
                }
            };
            out.extend_from_slice(&wide.to_le_bytes());
        }
        ScalarType::VarUInt32 => {
            let wide = integer(value).ok_or_else(mismatch)?;
            let narrow = u32::try_from(wide).map_err(|_| EncodeError::OutOfRange {
                ty,
                value: wide.to_string(),
            })?;
            write_varuint32(out, narrow);
        }
        ScalarType::VarInt32 => {
            let wide = integer(value).ok_or_else(mismatch)?;
            let narrow = i32::try_from(wide).map_err(|_| EncodeError::OutOfRange {
                ty,
                value: wide.to_string(),
            })?;
            write_varuint32(out, ((narrow << 1) ^ (narrow >> 31)) as u32);
        }
        ScalarType::Float32 => match value {
            Value::Float32(v) => out.extend_from_slice(&v.to_le_bytes()),
            _ => return Err(mismatch()),
        },
        ScalarType::Float64 => match value {
            Value::Float64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Value::Float32(v) => out.extend_from_slice(&f64::from(*v).to_le_bytes()),
            _ => return Err(mismatch()),
        },
        ScalarType::Float128 => match value {
            Value::Float128(raw) => out.extend_from_slice(raw),
            _ => return Err(mismatch()),
        },
        ScalarType::TimePoint => match value {
            Value::TimePoint(v) => out.extend_from_slice(&v.to_le_bytes()),
            _ => return Err(mismatch()),
        },
        ScalarType::TimePointSec => match value {
            Value::TimePointSec(v) => out.extend_from_slice(&v.to_le_bytes()),
            _ => return Err(mismatch()),
        },
        ScalarType::BlockTimestamp => match value {
            Value::BlockTimestamp(v) => out.extend_from_slice(&v.to_le_bytes()),
            _ => return Err(mismatch()),
        },
        ScalarType::Name => {
            let name = match value {
                Value::Name(name) => *name,
                Value::String(text) => text.parse::<Name>().map_err(|_| mismatch())?,
                _ => return Err(mismatch()),
            };
            out.extend_from_slice(&name.0.to_le_bytes());
        }
        ScalarType::Bytes => {
            let bytes = value.as_bytes().ok_or_else(mismatch)?;
            write_len(out, bytes.len(), ty)?;
            out.extend_from_slice(bytes);
        }
        ScalarType::String => {
            let text = value.as_str().ok_or_else(mismatch)?;
            write_len(out, text.len(), ty)?;
            out.extend_from_slice(text.as_bytes());
        }
        ScalarType::Checksum160 | ScalarType::Checksum256 | ScalarType::Checksum512 => {
            let bytes = value.as_bytes().ok_or_else(mismatch)?;
            let expected = scalar.checksum_len().unwrap_or_default();
            if bytes.len() != expected {
                return Err(EncodeError::InvalidLength {
                    ty,
                    expected,
                    actual: bytes.len(),
                });
            }
            out.extend_from_slice(bytes);
        }
        ScalarType::PublicKey | ScalarType::Signature => {
            let (key, fixed_len) = match (scalar, value) {
                (ScalarType::PublicKey, Value::PublicKey(key)) => (key, KEY_LEN),
                (ScalarType::Signature, Value::Signature(key)) => (key, SIGNATURE_LEN),
                _ => return Err(mismatch()),
            };
            if key.kind != KEY_TYPE_WEBAUTHN && key.data.len() != fixed_len {
                return Err(EncodeError::InvalidLength {
                    ty,
                    expected: fixed_len,
                    actual: key.data.len(),
                });
            }
            out.push(key.kind);
            out.extend_from_slice(&key.data);
        }
    }
    Ok(())
}
