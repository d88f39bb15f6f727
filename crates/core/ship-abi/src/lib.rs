//! Self-describing type catalog of the ledger state-history protocol.
//!
//! The producer sends its schema document (the "ABI") as the first message of every connection.
//! This crate parses that document ([`AbiDef`]), resolves it into an immutable
//! [`TypeRegistry`], and encodes/decodes protocol payloads against it as dynamic [`Value`]s.
//!
//! ```rust,ignore
//! use ship_abi::{AbiDef, TypeRegistry};
//!
//! let abi: AbiDef = serde_json::from_str(&schema_document)?;
//! let registry = TypeRegistry::from_abi(&abi)?;
//! let result = registry.decode_named("result", &frame)?;
//! ```

mod abi;
mod codec;
pub mod error;
mod name;
mod registry;
pub mod render;
mod types;
mod value;

pub use self::{
    abi::{AbiDef, AbiField, AbiStruct, AbiTable, AbiTypeDef, AbiVariant},
    error::{AbiError, DecodeError, EncodeError},
    name::{Name, ParseNameError},
    registry::{Field, TypeDescriptor, TypeId, TypeKind, TypeRef, TypeRegistry},
    types::ScalarType,
    value::{Key, Value},
};
