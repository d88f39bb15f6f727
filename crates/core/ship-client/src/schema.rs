//! Per-connection view of the handshake schema document.

use std::collections::HashMap;

use ship_abi::{AbiDef, Field, TypeKind, TypeRef, TypeRegistry};

use crate::{error::SchemaError, packed::TransactionUnpacker};

/// One table of the schema's table catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    /// Declared row type; usually a variant whose alternatives are versions of the row struct.
    pub row_type: TypeRef,
    /// Primary key fields, in declared order.
    pub key_names: Vec<String>,
}

/// Type registry and table catalog of one connection.
///
/// Built once from the first message of the connection and read-only afterwards.
#[derive(Debug, Clone)]
pub struct ShipSchema {
    registry: TypeRegistry,
    tables: Vec<TableDescriptor>,
    by_name: HashMap<String, usize>,
    unpacker: TransactionUnpacker,
}

impl ShipSchema {
    /// Parses the handshake message (UTF-8 JSON) and resolves its types and tables.
    pub fn from_document(document: &[u8]) -> Result<Self, SchemaError> {
        let abi = AbiDef::from_slice(document)?;
        Self::from_abi(&abi)
    }

    pub fn from_abi(abi: &AbiDef) -> Result<Self, SchemaError> {
        let registry = TypeRegistry::from_abi(abi)?;

        let mut tables = Vec::with_capacity(abi.tables.len());
        let mut by_name = HashMap::with_capacity(abi.tables.len());
        for table in &abi.tables {
            let row_type =
                registry
                    .resolve(&table.ty)
                    .map_err(|source| SchemaError::UnknownRowType {
                        table: table.name.clone(),
                        ty: table.ty.clone(),
                        source,
                    })?;
            if by_name.insert(table.name.clone(), tables.len()).is_some() {
                return Err(SchemaError::DuplicateTable(table.name.clone()));
            }
            tables.push(TableDescriptor {
                name: table.name.clone(),
                row_type,
                key_names: table.key_names.clone(),
            });
        }

        let unpacker = TransactionUnpacker::new(&registry);
        Ok(ShipSchema {
            registry,
            tables,
            by_name,
            unpacker,
        })
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Tables in declaration order.
    pub fn tables(&self) -> &[TableDescriptor] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.by_name.get(name).map(|idx| &self.tables[*idx])
    }

    pub fn unpacker(&self) -> &TransactionUnpacker {
        &self.unpacker
    }

    /// Fields of a table's row struct.
    ///
    /// A variant row type stands for its first alternative, which must be a struct.
    pub fn row_fields(&self, table: &TableDescriptor) -> Result<&[Field], SchemaError> {
        let not_struct = || SchemaError::RowNotStruct {
            table: table.name.clone(),
            ty: self.registry.display(&table.row_type),
        };

        let TypeRef::Defined(mut id) = table.row_type else {
            return Err(not_struct());
        };
        if let TypeKind::Variant(alternatives) = &self.registry.descriptor(id).kind {
            match alternatives.first() {
                Some((_, TypeRef::Defined(first))) => id = *first,
                _ => return Err(not_struct()),
            }
        }
        match &self.registry.descriptor(id).kind {
            TypeKind::Struct(fields) => Ok(fields.as_slice()),
            _ => Err(not_struct()),
        }
    }
}
