//! Error types for schema resolution and the binary codec.

/// Errors raised while building a [`TypeRegistry`](crate::TypeRegistry) from a schema document.
#[derive(Debug, thiserror::Error)]
pub enum AbiError {
    /// The schema document is not valid JSON or does not match the expected shape
    #[error("malformed schema document")]
    Json(#[source] serde_json::Error),

    /// A field, alias, variant alternative or table references a type that is never defined
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// The same type name is defined twice (as struct, variant, alias or built-in)
    #[error("type '{0}' is defined more than once")]
    DuplicateType(String),

    /// A struct's `base` is not a struct
    #[error("base '{base}' of struct '{name}' is not a struct")]
    InvalidBase { name: String, base: String },

    /// Following `base` (or alias) links leads back to the starting type
    #[error("type '{0}' is defined in terms of itself")]
    Recursive(String),
}

/// Errors raised while decoding a binary payload.
///
/// During handshake and protocol decoding these are fatal; during delta row iteration they only
/// cost the row that failed.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The type name does not resolve in the registry
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// The buffer ended before the value was complete
    #[error("unexpected end of input at offset {offset}: needed {needed} more bytes")]
    UnexpectedEnd { offset: usize, needed: usize },

    /// The value decoded but did not consume the whole buffer
    #[error("decoding '{ty}' left {remaining} trailing bytes")]
    TrailingBytes { ty: String, remaining: usize },

    /// A `bool` byte other than 0 or 1
    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),

    /// A variable-length integer does not fit in 32 bits
    #[error("variable-length integer overflows 32 bits at offset {offset}")]
    VarintOverflow { offset: usize },

    /// A variant index beyond the declared alternatives
    #[error("variant '{ty}' has no alternative at index {index}")]
    InvalidVariantIndex { ty: String, index: u32 },

    /// A public key or signature with an unsupported key type tag
    #[error("unsupported key type {0}")]
    InvalidKeyType(u8),

    /// A `string` payload is not UTF-8
    #[error("invalid UTF-8 in string")]
    InvalidUtf8(#[source] std::string::FromUtf8Error),

    /// A length prefix larger than the remaining input
    #[error("length {length} at offset {offset} exceeds remaining input")]
    LengthOverflow { offset: usize, length: usize },
}

/// Errors raised while encoding a [`Value`](crate::Value) against a type.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// The type name does not resolve in the registry
    #[error("unknown type '{0}'")]
    UnknownType(String),

    /// The value's shape does not match the declared type
    #[error("expected a value of type '{expected}', found {found}")]
    TypeMismatch { expected: String, found: &'static str },

    /// A struct value lacks a field the type declares
    #[error("missing field '{field}' of struct '{ty}'")]
    MissingField { ty: String, field: String },

    /// An integer does not fit the declared width
    #[error("value {value} out of range for '{ty}'")]
    OutOfRange { ty: &'static str, value: String },

    /// A fixed-size payload (checksum, key) has the wrong length
    #[error("'{ty}' requires {expected} bytes, found {actual}")]
    InvalidLength {
        ty: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A variant value names an alternative the variant does not declare
    #[error("variant '{ty}' has no alternative named '{name}'")]
    UnknownVariant { ty: String, name: String },
}
