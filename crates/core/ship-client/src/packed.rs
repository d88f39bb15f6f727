//! Expansion of packed transactions embedded in decoded values.
//!
//! The schema marks two places that carry an encoded `transaction`: the `packed_trx` field of
//! `packed_transaction` (compressed according to its `compression` tag) and the `packed_trx`
//! field of `generated_transaction_v0` (never compressed). [`TransactionUnpacker`] finds them by
//! type while walking a value alongside its type, and replaces the payload with the decoded
//! transaction.

use std::io::Read;

use flate2::read::ZlibDecoder;
use ship_abi::{TypeId, TypeKind, TypeRef, TypeRegistry, Value};

use crate::error::UnpackError;

const TRANSACTION_TYPE: &str = "transaction";
const PACKED_FIELD: &str = "packed_trx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
}

impl TryFrom<u64> for Compression {
    type Error = UnpackError;

    fn try_from(tag: u64) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zlib),
            other => Err(UnpackError::UnknownCompression(other)),
        }
    }
}

/// Packed transaction sites of one schema, resolved once.
#[derive(Debug, Clone, Default)]
pub struct TransactionUnpacker {
    transaction: Option<TypeRef>,
    packed_transaction: Option<TypeId>,
    generated_transaction: Option<TypeId>,
}

impl TransactionUnpacker {
    pub fn new(registry: &TypeRegistry) -> Self {
        let struct_with = |name: &str, fields: &[&str]| {
            let id = registry.id_of(name)?;
            match &registry.descriptor(id).kind {
                TypeKind::Struct(declared)
                    if fields
                        .iter()
                        .all(|field| declared.iter().any(|d| d.name == *field)) =>
                {
                    Some(id)
                }
                _ => None,
            }
        };

        TransactionUnpacker {
            transaction: registry.resolve(TRANSACTION_TYPE).ok(),
            packed_transaction: struct_with("packed_transaction", &["compression", PACKED_FIELD]),
            generated_transaction: struct_with("generated_transaction_v0", &[PACKED_FIELD]),
        }
    }

    /// Decodes a packed transaction payload.
    pub fn unpack(
        &self,
        registry: &TypeRegistry,
        compression: Compression,
        payload: &[u8],
    ) -> Result<Value, UnpackError> {
        let ty = self
            .transaction
            .as_ref()
            .ok_or(UnpackError::MissingTransactionType)?;
        match compression {
            Compression::None => registry.decode(ty, payload),
            Compression::Zlib => registry.decode(ty, &inflate(payload)?),
        }
        .map_err(UnpackError::Decode)
    }

    /// Replaces every packed transaction payload inside `value` (of type `ty`) with the
    /// decoded transaction.
    pub fn expand(
        &self,
        registry: &TypeRegistry,
        ty: &TypeRef,
        value: &mut Value,
    ) -> Result<(), UnpackError> {
        match (ty, value) {
            (TypeRef::Defined(id), value) => {
                if Some(*id) == self.packed_transaction {
                    return self.expand_site(registry, value, true);
                }
                if Some(*id) == self.generated_transaction {
                    return self.expand_site(registry, value, false);
                }
                match &registry.descriptor(*id).kind {
                    TypeKind::Scalar(_) => Ok(()),
                    TypeKind::Struct(fields) => {
                        for field in fields {
                            if let Some(field_value) = value.field_mut(&field.name) {
                                self.expand(registry, &field.ty, field_value)?;
                            }
                        }
                        Ok(())
                    }
                    TypeKind::Variant(alternatives) => {
                        let Value::Variant(name, inner) = value else {
                            return Ok(());
                        };
                        match alternatives.iter().find(|(alt, _)| alt.as_str() == name.as_str()) {
                            Some((_, alt_ty)) => self.expand(registry, alt_ty, inner),
                            None => Ok(()),
                        }
                    }
                }
            }
            (TypeRef::Array(inner), Value::Array(items)) => items
                .iter_mut()
                .try_for_each(|item| self.expand(registry, inner, item)),
            (TypeRef::Optional(inner) | TypeRef::Extension(inner), Value::Optional(Some(present))) => {
                self.expand(registry, inner, present)
            }
            _ => Ok(()),
        }
    }

    fn expand_site(
        &self,
        registry: &TypeRegistry,
        value: &mut Value,
        compressed: bool,
    ) -> Result<(), UnpackError> {
        let compression = if compressed {
            let tag = value
                .field("compression")
                .and_then(Value::as_u64)
                .ok_or(UnpackError::Malformed("compression"))?;
            Compression::try_from(tag)?
        } else {
            Compression::None
        };
        let slot = value
            .field_mut(PACKED_FIELD)
            .ok_or(UnpackError::Malformed(PACKED_FIELD))?;
        let transaction = match &*slot {
            Value::Bytes(payload) => self.unpack(registry, compression, payload)?,
            // Already expanded.
            Value::Struct(_) => return Ok(()),
            _ => return Err(UnpackError::Malformed(PACKED_FIELD)),
        };
        *slot = transaction;
        Ok(())
    }
}

fn inflate(payload: &[u8]) -> Result<Vec<u8>, UnpackError> {
    let mut decoder = ZlibDecoder::new(payload);
    let mut inflated = Vec::with_capacity(payload.len() * 2);
    decoder
        .read_to_end(&mut inflated)
        .map_err(UnpackError::Inflate)?;
    Ok(inflated)
}
