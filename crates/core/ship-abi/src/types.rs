//! Built-in scalar kinds of the schema language.

use std::{fmt, str::FromStr};

/// Every built-in (non-composite) type the protocol uses.
///
/// The set is closed: schema documents can only build structs, variants, arrays, optionals and
/// aliases on top of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Int128,
    UInt128,
    VarInt32,
    VarUInt32,
    Float32,
    Float64,
    Float128,
    TimePoint,
    TimePointSec,
    BlockTimestamp,
    Name,
    Bytes,
    String,
    Checksum160,
    Checksum256,
    Checksum512,
    PublicKey,
    Signature,
}

impl ScalarType {
    pub const ALL: [ScalarType; 27] = [
        ScalarType::Bool,
        ScalarType::Int8,
        ScalarType::UInt8,
        ScalarType::Int16,
        ScalarType::UInt16,
        ScalarType::Int32,
        ScalarType::UInt32,
        ScalarType::Int64,
        ScalarType::UInt64,
        ScalarType::Int128,
        ScalarType::UInt128,
        ScalarType::VarInt32,
        ScalarType::VarUInt32,
        ScalarType::Float32,
        ScalarType::Float64,
        ScalarType::Float128,
        ScalarType::TimePoint,
        ScalarType::TimePointSec,
        ScalarType::BlockTimestamp,
        ScalarType::Name,
        ScalarType::Bytes,
        ScalarType::String,
        ScalarType::Checksum160,
        ScalarType::Checksum256,
        ScalarType::Checksum512,
        ScalarType::PublicKey,
        ScalarType::Signature,
    ];

    /// The name this scalar has in schema documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int8 => "int8",
            ScalarType::UInt8 => "uint8",
            ScalarType::Int16 => "int16",
            ScalarType::UInt16 => "uint16",
            ScalarType::Int32 => "int32",
            ScalarType::UInt32 => "uint32",
            ScalarType::Int64 => "int64",
            ScalarType::UInt64 => "uint64",
            ScalarType::Int128 => "int128",
            ScalarType::UInt128 => "uint128",
            ScalarType::VarInt32 => "varint32",
            ScalarType::VarUInt32 => "varuint32",
            ScalarType::Float32 => "float32",
            ScalarType::Float64 => "float64",
            ScalarType::Float128 => "float128",
            ScalarType::TimePoint => "time_point",
            ScalarType::TimePointSec => "time_point_sec",
            ScalarType::BlockTimestamp => "block_timestamp_type",
            ScalarType::Name => "name",
            ScalarType::Bytes => "bytes",
            ScalarType::String => "string",
            ScalarType::Checksum160 => "checksum160",
            ScalarType::Checksum256 => "checksum256",
            ScalarType::Checksum512 => "checksum512",
            ScalarType::PublicKey => "public_key",
            ScalarType::Signature => "signature",
        }
    }

    /// Byte length of checksum kinds.
    pub(crate) fn checksum_len(&self) -> Option<usize> {
        match self {
            ScalarType::Checksum160 => Some(20),
            ScalarType::Checksum256 => Some(32),
            ScalarType::Checksum512 => Some(64),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScalarType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ScalarType::ALL
            .into_iter()
            .find(|scalar| scalar.as_str() == s)
            .ok_or(())
    }
}
