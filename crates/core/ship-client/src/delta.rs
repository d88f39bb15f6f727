//! Table deltas and row iteration.

use ship_abi::{TypeKind, TypeRef, TypeRegistry, Value};

use crate::{
    error::{ProtocolError, RowError},
    protocol::Fields,
    schema::ShipSchema,
};

/// Row-level changes to one table within a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDelta {
    pub name: String,
    pub rows: Vec<DeltaRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaRow {
    /// `true` for an insert or update, `false` for a deletion.
    pub present: bool,
    /// Row payload, encoded as the table's row type.
    pub data: Vec<u8>,
}

/// A delta row decoded through its table's row type.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRow {
    pub present: bool,
    /// Type of `value`: the decoded alternative's type for variant row types.
    pub ty: TypeRef,
    pub value: Value,
}

impl TableDelta {
    /// Converts one decoded element of `table_delta[]`.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let mut fields = Fields::new("table_delta_v0", value.unwrap_variant())?;
        let name = fields.string("name")?;
        let rows = fields
            .array("rows")?
            .into_iter()
            .map(|row| {
                let mut row = Fields::new("row", row)?;
                Ok(DeltaRow {
                    present: row.bool("present")?,
                    data: row.bytes("data")?,
                })
            })
            .collect::<Result<_, ProtocolError>>()?;
        Ok(TableDelta { name, rows })
    }
}

/// Iterator over the decodable rows of one delta. Rows that fail to decode are logged and
/// skipped.
pub struct Rows<'a> {
    registry: &'a TypeRegistry,
    table: &'a str,
    row_type: &'a TypeRef,
    rows: std::iter::Enumerate<std::slice::Iter<'a, DeltaRow>>,
}

impl Iterator for Rows<'_> {
    type Item = DecodedRow;

    fn next(&mut self) -> Option<Self::Item> {
        for (index, row) in self.rows.by_ref() {
            match self.registry.decode(self.row_type, &row.data) {
                Ok(Value::Variant(alternative, value)) => {
                    return Some(DecodedRow {
                        present: row.present,
                        ty: alternative_type(self.registry, self.row_type, &alternative)
                            .unwrap_or_else(|| self.row_type.clone()),
                        value: *value,
                    });
                }
                Ok(value) => {
                    return Some(DecodedRow {
                        present: row.present,
                        ty: self.row_type.clone(),
                        value,
                    });
                }
                Err(source) => {
                    let err = RowError::Decode {
                        table: self.table.to_string(),
                        index,
                        source,
                    };
                    tracing::warn!(
                        table = self.table,
                        row = index,
                        error = %err,
                        error_source = monitoring::logging::error_source(&err),
                        "delta_row_skipped"
                    );
                }
            }
        }
        None
    }
}

fn alternative_type(registry: &TypeRegistry, ty: &TypeRef, alternative: &str) -> Option<TypeRef> {
    let TypeRef::Defined(id) = ty else {
        return None;
    };
    match &registry.descriptor(*id).kind {
        TypeKind::Variant(alternatives) => alternatives
            .iter()
            .find(|(name, _)| name == alternative)
            .map(|(_, alt_ty)| alt_ty.clone()),
        _ => None,
    }
}

impl ShipSchema {
    /// Decodes the rows of `delta` through its table's row type.
    ///
    /// Variant row types yield the value of the decoded alternative.
    pub fn rows<'a>(&'a self, delta: &'a TableDelta) -> Result<Rows<'a>, RowError> {
        let table = self
            .table(&delta.name)
            .ok_or_else(|| RowError::UnknownTable(delta.name.clone()))?;
        Ok(Rows {
            registry: self.registry(),
            table: &table.name,
            row_type: &table.row_type,
            rows: delta.rows.iter().enumerate(),
        })
    }

    /// Visits every decodable row of `delta`; returns the number of rows visited.
    ///
    /// A delta for a table the schema does not declare is logged and visits nothing.
    pub fn for_each_row(&self, delta: &TableDelta, mut visit: impl FnMut(bool, Value)) -> usize {
        let rows = match self.rows(delta) {
            Ok(rows) => rows,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    error_source = monitoring::logging::error_source(&err),
                    "delta_skipped"
                );
                return 0;
            }
        };
        let mut visited = 0;
        for row in rows {
            visit(row.present, row.value);
            visited += 1;
        }
        visited
    }
}
