//! Serde model of the schema document sent by the producer at handshake.

use serde::{Deserialize, Serialize};

use crate::error::AbiError;

/// The schema document: type aliases, structs, variants and the table catalog.
///
/// Only the sections the protocol needs are modelled; other keys (`actions`, `ricardian_clauses`,
/// ...) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiDef {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub types: Vec<AbiTypeDef>,
    #[serde(default)]
    pub structs: Vec<AbiStruct>,
    #[serde(default)]
    pub variants: Vec<AbiVariant>,
    #[serde(default)]
    pub tables: Vec<AbiTable>,
}

impl AbiDef {
    /// Parses a schema document from its JSON text.
    pub fn from_json(text: &str) -> Result<Self, AbiError> {
        serde_json::from_str(text).map_err(AbiError::Json)
    }

    /// Parses a schema document delivered as raw bytes (UTF-8 JSON).
    pub fn from_slice(bytes: &[u8]) -> Result<Self, AbiError> {
        serde_json::from_slice(bytes).map_err(AbiError::Json)
    }
}

/// Alias declaration: `new_type_name` is another name for `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiTypeDef {
    pub new_type_name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiStruct {
    pub name: String,
    /// Name of a struct whose fields precede this struct's own fields. Empty when absent.
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub fields: Vec<AbiField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiField {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiVariant {
    pub name: String,
    #[serde(default)]
    pub types: Vec<String>,
}

/// Table catalog entry.
///
/// `ty` names the type of one row (usually a variant over versioned row structs), `key_names`
/// the row fields forming the table's key, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiTable {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub key_names: Vec<String>,
}
