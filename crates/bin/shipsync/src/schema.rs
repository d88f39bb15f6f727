//! Reflection of the producer's table catalog into relational table definitions.
//!
//! Every table becomes one relational table: two synthetic columns (`block_index`, `present`)
//! followed by the plain scalar fields of the table's row struct. Array, optional, struct and
//! variant fields are composite and have no column. A scalar without a relational mapping fails
//! reflection as a whole.

use std::fmt;

use ship_abi::{
    ScalarType, TypeKind, TypeRef, Value,
    render::{format_block_timestamp, format_time_point, format_time_point_sec},
};
use ship_client::{SchemaError, ShipSchema, TableDescriptor};

use crate::sql::{self, ValidateIdentifierError};

pub const BLOCK_INDEX_COLUMN: &str = "block_index";
pub const PRESENT_COLUMN: &str = "present";

/// Errors that occur while reflecting the table catalog.
#[derive(Debug, thiserror::Error)]
pub enum SchemaMappingError {
    /// A row field has a scalar type the relational schema cannot represent
    #[error("field '{field}' of table '{table}' has type {scalar}, which has no column mapping")]
    UnmappedScalar {
        table: String,
        field: String,
        scalar: ScalarType,
    },

    /// The table's row type does not resolve to a struct
    #[error("row type of table '{table}' cannot be reflected")]
    RowType {
        table: String,
        #[source]
        source: SchemaError,
    },

    /// A declared key field is not one of the table's columns
    #[error("key '{key}' of table '{table}' is not a scalar column")]
    UnknownKey { table: String, key: String },

    /// A row field reuses the name of a synthetic column
    #[error("field '{column}' of table '{table}' collides with a synthetic column")]
    DuplicateColumn { table: String, column: String },

    /// The table name is not usable as a PostgreSQL identifier
    #[error("table name '{table}' is not a valid identifier")]
    InvalidTableName {
        table: String,
        #[source]
        source: ValidateIdentifierError,
    },
}

/// Errors that occur while converting a decoded row into column values.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The decoded row has no value for the column
    #[error("row has no value for column '{column}'")]
    Missing { column: String },

    /// The decoded value's shape does not match the column's scalar type
    #[error("column '{column}' ({scalar}) cannot hold a {found} value")]
    Mismatch {
        column: String,
        scalar: ScalarType,
        found: &'static str,
    },

    /// The value does not fit the column's SQL type
    #[error("value of column '{column}' is out of range for {sql_type}")]
    OutOfRange { column: String, sql_type: SqlType },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Decimal,
    Float8,
    Bytea,
    /// Bounded when the length is known.
    Varchar(Option<u16>),
}

impl SqlType {
    /// Column type for a scalar field, if it has one.
    pub fn for_scalar(scalar: ScalarType) -> Option<SqlType> {
        let sql_type = match scalar {
            ScalarType::Bool => SqlType::Boolean,
            ScalarType::VarUInt32 => SqlType::BigInt,
            ScalarType::VarInt32 => SqlType::Integer,
            ScalarType::UInt8 => SqlType::SmallInt,
            ScalarType::UInt16 => SqlType::Integer,
            ScalarType::UInt32 => SqlType::BigInt,
            ScalarType::UInt64 | ScalarType::UInt128 => SqlType::Decimal,
            ScalarType::Int8 | ScalarType::Int16 => SqlType::SmallInt,
            ScalarType::Int32 => SqlType::Integer,
            ScalarType::Int64 => SqlType::BigInt,
            ScalarType::Int128 => SqlType::Decimal,
            ScalarType::Float64 => SqlType::Float8,
            ScalarType::Float128 => SqlType::Bytea,
            ScalarType::Name => SqlType::Varchar(Some(13)),
            ScalarType::TimePoint | ScalarType::TimePointSec | ScalarType::BlockTimestamp => {
                SqlType::Varchar(None)
            }
            ScalarType::Checksum256 => SqlType::Varchar(Some(64)),
            ScalarType::Bytes => SqlType::Bytea,
            _ => return None,
        };
        Some(sql_type)
    }

    /// Value expression for the `index`th bind parameter.
    ///
    /// Decimals are bound as text and bytes as hex text, so both are converted in SQL.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlType::Decimal => format!("${index}::numeric"),
            SqlType::Bytea => format!("decode(${index}, 'hex')"),
            _ => format!("${index}"),
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Boolean => f.write_str("boolean"),
            SqlType::SmallInt => f.write_str("smallint"),
            SqlType::Integer => f.write_str("integer"),
            SqlType::BigInt => f.write_str("bigint"),
            SqlType::Decimal => f.write_str("decimal"),
            SqlType::Float8 => f.write_str("float8"),
            SqlType::Bytea => f.write_str("bytea"),
            SqlType::Varchar(None) => f.write_str("varchar"),
            SqlType::Varchar(Some(len)) => write!(f, "varchar({len})"),
        }
    }
}

/// A bind parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float8(f64),
    Text(String),
}

/// A reflected column: one scalar field of the row struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub scalar: ScalarType,
    pub sql_type: SqlType,
}

impl Column {
    pub fn convert(&self, value: &Value) -> Result<SqlValue, ConvertError> {
        let mismatch = || ConvertError::Mismatch {
            column: self.name.clone(),
            scalar: self.scalar,
            found: value.kind(),
        };
        let out_of_range = || ConvertError::OutOfRange {
            column: self.name.clone(),
            sql_type: self.sql_type,
        };

        let converted = match (self.sql_type, value) {
            (SqlType::Boolean, Value::Bool(b)) => SqlValue::Bool(*b),
            (SqlType::SmallInt, _) => {
                let v = integer(value).ok_or_else(mismatch)?;
                SqlValue::Int2(i16::try_from(v).map_err(|_| out_of_range())?)
            }
            (SqlType::Integer, _) => {
                let v = integer(value).ok_or_else(mismatch)?;
                SqlValue::Int4(i32::try_from(v).map_err(|_| out_of_range())?)
            }
            (SqlType::BigInt, _) => {
                let v = integer(value).ok_or_else(mismatch)?;
                SqlValue::Int8(i64::try_from(v).map_err(|_| out_of_range())?)
            }
            (SqlType::Decimal, Value::Int(v)) => SqlValue::Text(v.to_string()),
            (SqlType::Decimal, Value::UInt(v)) => SqlValue::Text(v.to_string()),
            (SqlType::Decimal, Value::Int128(v)) => SqlValue::Text(v.to_string()),
            (SqlType::Decimal, Value::UInt128(v)) => SqlValue::Text(v.to_string()),
            (SqlType::Float8, Value::Float64(v)) => SqlValue::Float8(*v),
            (SqlType::Bytea, Value::Float128(raw)) => SqlValue::Text(hex::encode(raw)),
            (SqlType::Bytea, Value::Bytes(bytes)) => SqlValue::Text(hex::encode(bytes)),
            (SqlType::Varchar(_), Value::Name(name)) => SqlValue::Text(name.to_string()),
            (SqlType::Varchar(_), Value::Checksum(bytes)) => {
                SqlValue::Text(hex::encode_upper(bytes))
            }
            (SqlType::Varchar(_), Value::TimePoint(micros)) => {
                SqlValue::Text(format_time_point(*micros))
            }
            (SqlType::Varchar(_), Value::TimePointSec(secs)) => {
                SqlValue::Text(format_time_point_sec(*secs))
            }
            (SqlType::Varchar(_), Value::BlockTimestamp(slot)) => {
                SqlValue::Text(format_block_timestamp(*slot))
            }
            _ => return Err(mismatch()),
        };
        Ok(converted)
    }
}

fn integer(value: &Value) -> Option<i128> {
    match value {
        Value::Int(v) => Some(i128::from(*v)),
        Value::UInt(v) => Some(i128::from(*v)),
        Value::Int128(v) => Some(*v),
        Value::UInt128(v) => i128::try_from(*v).ok(),
        _ => None,
    }
}

/// Relational shape of one ledger table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    /// Reflected columns in field order; the synthetic columns precede them.
    pub columns: Vec<Column>,
    pub key_names: Vec<String>,
}

impl TableDefinition {
    /// Every column name in insert order, synthetic columns first.
    pub fn column_names(&self) -> Vec<&str> {
        [BLOCK_INDEX_COLUMN, PRESENT_COLUMN]
            .into_iter()
            .chain(self.columns.iter().map(|column| column.name.as_str()))
            .collect()
    }

    pub fn create_sql(&self, schema: &str) -> String {
        let columns = [
            sql::column_definition(BLOCK_INDEX_COLUMN, &SqlType::BigInt.to_string(), false),
            sql::column_definition(PRESENT_COLUMN, &SqlType::Boolean.to_string(), false),
        ]
        .into_iter()
        .chain(
            self.columns
                .iter()
                .map(|column| sql::column_definition(&column.name, &column.sql_type.to_string(), true)),
        )
        .collect::<Vec<_>>();
        let primary_key = std::iter::once(BLOCK_INDEX_COLUMN)
            .chain(self.key_names.iter().map(String::as_str))
            .collect::<Vec<_>>();
        sql::create_table(schema, &self.name, &columns, &primary_key)
    }

    /// Parameterized insert, one placeholder per column in [`column_names`](Self::column_names)
    /// order.
    pub fn insert_sql(&self, schema: &str) -> String {
        let placeholders = [SqlType::BigInt, SqlType::Boolean]
            .into_iter()
            .chain(self.columns.iter().map(|column| column.sql_type))
            .enumerate()
            .map(|(index, sql_type)| sql_type.placeholder(index + 1))
            .collect::<Vec<_>>();
        sql::insert(schema, &self.name, &self.column_names(), &placeholders)
    }

    /// Bind parameters for one decoded row, matching [`insert_sql`](Self::insert_sql).
    pub fn row_values(
        &self,
        block_num: u32,
        present: bool,
        row: &Value,
    ) -> Result<Vec<SqlValue>, ConvertError> {
        let mut values = Vec::with_capacity(self.columns.len() + 2);
        values.push(SqlValue::Int8(i64::from(block_num)));
        values.push(SqlValue::Bool(present));
        for column in &self.columns {
            let value = row.field(&column.name).ok_or_else(|| ConvertError::Missing {
                column: column.name.clone(),
            })?;
            values.push(column.convert(value)?);
        }
        Ok(values)
    }
}

/// Reflects every table of the catalog, in catalog order.
pub fn reflect(schema: &ShipSchema) -> Result<Vec<TableDefinition>, SchemaMappingError> {
    schema
        .tables()
        .iter()
        .map(|table| reflect_table(schema, table))
        .collect()
}

pub fn reflect_table(
    schema: &ShipSchema,
    table: &TableDescriptor,
) -> Result<TableDefinition, SchemaMappingError> {
    sql::validate_identifier(&table.name).map_err(|source| {
        SchemaMappingError::InvalidTableName {
            table: table.name.clone(),
            source,
        }
    })?;

    let fields = schema
        .row_fields(table)
        .map_err(|source| SchemaMappingError::RowType {
            table: table.name.clone(),
            source,
        })?;

    let mut columns = Vec::new();
    for field in fields {
        let TypeRef::Defined(id) = &field.ty else {
            continue;
        };
        let TypeKind::Scalar(scalar) = &schema.registry().descriptor(*id).kind else {
            continue;
        };
        let scalar = *scalar;
        let sql_type = SqlType::for_scalar(scalar).ok_or_else(|| {
            SchemaMappingError::UnmappedScalar {
                table: table.name.clone(),
                field: field.name.clone(),
                scalar,
            }
        })?;
        if field.name == BLOCK_INDEX_COLUMN || field.name == PRESENT_COLUMN {
            return Err(SchemaMappingError::DuplicateColumn {
                table: table.name.clone(),
                column: field.name.clone(),
            });
        }
        columns.push(Column {
            name: field.name.clone(),
            scalar,
            sql_type,
        });
    }

    if let Some(key) = table
        .key_names
        .iter()
        .find(|key| !columns.iter().any(|column| &column.name == *key))
    {
        return Err(SchemaMappingError::UnknownKey {
            table: table.name.clone(),
            key: key.clone(),
        });
    }

    Ok(TableDefinition {
        name: table.name.clone(),
        columns,
        key_names: table.key_names.clone(),
    })
}

#[cfg(test)]
mod tests {
    use ship_abi::Name;

    use super::*;

    fn column(name: &str, scalar: ScalarType) -> Column {
        Column {
            name: name.to_string(),
            scalar,
            sql_type: SqlType::for_scalar(scalar).expect("mapped scalar"),
        }
    }

    #[test]
    fn mapping_table_matches_column_types() {
        let expected = [
            (ScalarType::Bool, "boolean"),
            (ScalarType::VarUInt32, "bigint"),
            (ScalarType::VarInt32, "integer"),
            (ScalarType::UInt8, "smallint"),
            (ScalarType::UInt16, "integer"),
            (ScalarType::UInt32, "bigint"),
            (ScalarType::UInt64, "decimal"),
            (ScalarType::UInt128, "decimal"),
            (ScalarType::Int8, "smallint"),
            (ScalarType::Int16, "smallint"),
            (ScalarType::Int32, "integer"),
            (ScalarType::Int64, "bigint"),
            (ScalarType::Int128, "decimal"),
            (ScalarType::Float64, "float8"),
            (ScalarType::Float128, "bytea"),
            (ScalarType::Name, "varchar(13)"),
            (ScalarType::TimePoint, "varchar"),
            (ScalarType::TimePointSec, "varchar"),
            (ScalarType::BlockTimestamp, "varchar"),
            (ScalarType::Checksum256, "varchar(64)"),
            (ScalarType::Bytes, "bytea"),
        ];

        for (scalar, sql_type) in expected {
            let mapped = SqlType::for_scalar(scalar).map(|t| t.to_string());
            assert_eq!(mapped.as_deref(), Some(sql_type), "mapping of {scalar}");
        }
    }

    #[test]
    fn scalars_without_a_column_type_are_unmapped() {
        for scalar in [
            ScalarType::String,
            ScalarType::Float32,
            ScalarType::Checksum160,
            ScalarType::Checksum512,
            ScalarType::PublicKey,
            ScalarType::Signature,
        ] {
            assert_eq!(SqlType::for_scalar(scalar), None, "mapping of {scalar}");
        }
    }

    #[test]
    fn placeholders_cast_decimal_and_bytes() {
        assert_eq!(SqlType::Decimal.placeholder(3), "$3::numeric");
        assert_eq!(SqlType::Bytea.placeholder(4), "decode($4, 'hex')");
        assert_eq!(SqlType::Varchar(Some(13)).placeholder(5), "$5");
    }

    #[test]
    fn convert_binds_each_scalar_kind() {
        let name: Name = "alice".parse().expect("valid name");

        assert_eq!(
            column("primary_key", ScalarType::UInt64).convert(&Value::UInt(u64::MAX)).unwrap(),
            SqlValue::Text("18446744073709551615".into())
        );
        assert_eq!(
            column("status", ScalarType::UInt8).convert(&Value::UInt(200)).unwrap(),
            SqlValue::Int2(200)
        );
        assert_eq!(
            column("cpu", ScalarType::UInt32).convert(&Value::UInt(u64::from(u32::MAX))).unwrap(),
            SqlValue::Int8(i64::from(u32::MAX))
        );
        assert_eq!(
            column("payer", ScalarType::Name).convert(&Value::Name(name)).unwrap(),
            SqlValue::Text("alice".into())
        );
        assert_eq!(
            column("value", ScalarType::Bytes).convert(&Value::Bytes(vec![0xde, 0xad])).unwrap(),
            SqlValue::Text("dead".into())
        );
        assert_eq!(
            column("id", ScalarType::Checksum256).convert(&Value::Checksum(vec![0xab; 32])).unwrap(),
            SqlValue::Text("AB".repeat(32))
        );
        assert_eq!(
            column("creation_date", ScalarType::BlockTimestamp)
                .convert(&Value::BlockTimestamp(0))
                .unwrap(),
            SqlValue::Text("2000-01-01T00:00:00.000".into())
        );
    }

    #[test]
    fn convert_rejects_mismatched_values() {
        let err = column("payer", ScalarType::Name)
            .convert(&Value::String("alice".into()))
            .unwrap_err();

        assert!(matches!(
            err,
            ConvertError::Mismatch { found: "string", .. }
        ));
    }

    #[test]
    fn convert_rejects_out_of_range_integers() {
        let err = column("delay", ScalarType::Int16)
            .convert(&Value::Int(i64::from(i16::MAX) + 1))
            .unwrap_err();

        assert!(matches!(
            err,
            ConvertError::OutOfRange {
                sql_type: SqlType::SmallInt,
                ..
            }
        ));
    }

    #[test]
    fn row_values_prepend_block_and_presence() {
        //* Given
        let table = TableDefinition {
            name: "account".into(),
            columns: vec![column("name", ScalarType::Name)],
            key_names: vec!["name".into()],
        };
        let row = Value::record([("name", Value::Name("bob".parse().expect("valid name")))]);

        //* When
        let values = table.row_values(42, false, &row).expect("row should convert");

        //* Then
        assert_eq!(
            values,
            vec![
                SqlValue::Int8(42),
                SqlValue::Bool(false),
                SqlValue::Text("bob".into())
            ]
        );
    }

    #[test]
    fn row_values_report_missing_fields() {
        let table = TableDefinition {
            name: "account".into(),
            columns: vec![column("name", ScalarType::Name)],
            key_names: vec![],
        };

        let err = table.row_values(1, true, &Value::record(Vec::<(String, Value)>::new())).unwrap_err();

        assert!(matches!(err, ConvertError::Missing { column } if column == "name"));
    }
}
