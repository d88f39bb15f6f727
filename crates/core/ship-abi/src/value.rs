//! Dynamic values produced and consumed by the codec.

use crate::name::Name;

/// A public key or signature: the curve tag and the raw key material that follows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// 0 = K1, 1 = R1, 2 = WebAuthn.
    pub kind: u8,
    pub data: Vec<u8>,
}

impl Key {
    pub fn prefix(&self) -> &'static str {
        match self.kind {
            0 => "K1",
            1 => "R1",
            2 => "WA",
            _ => "UNKNOWN",
        }
    }
}

/// A decoded value of any type the registry can describe.
///
/// Integers of up to 64 bits share the `Int`/`UInt` variants whatever their declared width; the
/// declared type decides the wire width on encode.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Int128(i128),
    UInt128(u128),
    Float32(f32),
    Float64(f64),
    /// IEEE quad precision is carried as its 16 raw little-endian bytes.
    Float128([u8; 16]),
    Name(Name),
    String(String),
    Bytes(Vec<u8>),
    Checksum(Vec<u8>),
    /// Microseconds since the Unix epoch.
    TimePoint(i64),
    /// Seconds since the Unix epoch.
    TimePointSec(u32),
    /// Half-second slots since 2000-01-01T00:00:00Z.
    BlockTimestamp(u32),
    PublicKey(Key),
    Signature(Key),
    Array(Vec<Value>),
    Optional(Option<Box<Value>>),
    /// Fields in declaration order.
    Struct(Vec<(String, Value)>),
    /// Alternative name and payload.
    Variant(String, Box<Value>),
}

impl Value {
    /// Builds a struct value from `(name, value)` pairs.
    pub fn record<I, S>(fields: I) -> Value
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        Value::Struct(
            fields
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn variant(name: impl Into<String>, value: Value) -> Value {
        Value::Variant(name.into(), Box::new(value))
    }

    pub fn some(value: Value) -> Value {
        Value::Optional(Some(Box::new(value)))
    }

    /// Looks up a struct field by name.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn field_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self {
            Value::Struct(fields) => fields
                .iter_mut()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// The payload of a variant, or the value itself for anything else.
    pub fn unwrap_variant(self) -> Value {
        match self {
            Value::Variant(_, inner) => *inner,
            other => other,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Any integer that fits in `u64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::UInt128(v) => u64::try_from(*v).ok(),
            Value::Int128(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) | Value::Checksum(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<Name> {
        match self {
            Value::Name(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Inner value of a present optional; `None` for absent optionals and non-optionals.
    pub fn as_optional(&self) -> Option<&Value> {
        match self {
            Value::Optional(inner) => inner.as_deref(),
            _ => None,
        }
    }

    /// Short description of the value's shape, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "signed integer",
            Value::UInt(_) => "unsigned integer",
            Value::Int128(_) => "int128",
            Value::UInt128(_) => "uint128",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Float128(_) => "float128",
            Value::Name(_) => "name",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Checksum(_) => "checksum",
            Value::TimePoint(_) => "time_point",
            Value::TimePointSec(_) => "time_point_sec",
            Value::BlockTimestamp(_) => "block_timestamp_type",
            Value::PublicKey(_) => "public_key",
            Value::Signature(_) => "signature",
            Value::Array(_) => "array",
            Value::Optional(_) => "optional",
            Value::Struct(_) => "struct",
            Value::Variant(_, _) => "variant",
        }
    }
}
