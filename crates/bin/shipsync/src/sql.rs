//! SQL text for the sink: identifier validation and quoting, and the statements the sink runs.
//!
//! Schema and table names come from configuration and from the producer's table catalog, so
//! they pass through [`validate_identifier`] before any statement is built. Column names are
//! field names of ledger row types; several of them are reserved words (`table`, `value`), so
//! every identifier is quoted with `pg_escape` rather than validated.

use pg_escape::quote_identifier;
use sqlparser::{dialect::PostgreSqlDialect, parser::Parser};

/// Errors that occur during SQL identifier validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidateIdentifierError {
    /// Identifier is empty
    #[error("Identifier cannot be empty")]
    Empty,

    /// Identifier exceeds PostgreSQL's 63-byte limit
    #[error("Identifier exceeds PostgreSQL limit of 63 bytes (got {length})")]
    TooLong { length: usize },

    /// Identifier contains a character outside `[A-Za-z0-9_$]`
    #[error("Identifier contains invalid character: '{character}'")]
    InvalidCharacter { character: char },

    /// Identifier must start with letter or underscore
    #[error("Identifier must start with letter or underscore, got '{first_char}'")]
    InvalidFirstCharacter { first_char: char },

    /// Identifier failed SQL parser validation
    #[error("Not a valid SQL identifier: {reason}")]
    ParserError { reason: String },

    /// Identifier parsed as multiple SQL statements
    #[error("Identifier parsed as multiple SQL statements")]
    MultipleStatements,
}

/// Checks that `name` is a simple, unqualified PostgreSQL identifier.
///
/// Besides the character rules, the name must parse as the table of `SELECT * FROM {name}`,
/// which rejects reserved words that cannot stand alone as a relation name.
pub fn validate_identifier(name: &str) -> Result<(), ValidateIdentifierError> {
    let Some(first_char) = name.chars().next() else {
        return Err(ValidateIdentifierError::Empty);
    };

    if name.len() > 63 {
        return Err(ValidateIdentifierError::TooLong { length: name.len() });
    }

    if let Some(character) = name
        .chars()
        .find(|ch| !ch.is_ascii_alphanumeric() && *ch != '_' && *ch != '$')
    {
        return Err(ValidateIdentifierError::InvalidCharacter { character });
    }

    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(ValidateIdentifierError::InvalidFirstCharacter { first_char });
    }

    let sql = format!("SELECT * FROM {name}");
    match Parser::parse_sql(&PostgreSqlDialect {}, &sql) {
        Ok(statements) if statements.len() == 1 => Ok(()),
        Ok(_) => Err(ValidateIdentifierError::MultipleStatements),
        Err(err) => Err(ValidateIdentifierError::ParserError {
            reason: err.to_string(),
        }),
    }
}

/// `"schema"."table"`
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_identifier(schema), quote_identifier(table))
}

pub fn quote_column(column_name: &str) -> String {
    quote_identifier(column_name).to_string()
}

/// Drops the schema and everything in it. A missing schema is not an error.
pub fn drop_schema(schema: &str) -> String {
    format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_identifier(schema))
}

pub fn create_schema(schema: &str) -> String {
    format!("CREATE SCHEMA {}", quote_identifier(schema))
}

/// Formats a column as `"name" TYPE [NOT NULL]`.
pub fn column_definition(column_name: &str, pg_type: &str, nullable: bool) -> String {
    let nullability = if nullable { "" } else { " NOT NULL" };
    format!("{} {pg_type}{nullability}", quote_identifier(column_name))
}

/// `CREATE TABLE "schema"."table" (columns..., PRIMARY KEY ("k1", ...))`
///
/// `columns` are complete column definitions (see [`column_definition`]).
pub fn create_table(schema: &str, table: &str, columns: &[String], primary_key: &[&str]) -> String {
    let key = primary_key
        .iter()
        .map(|column| quote_column(column))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE {} ({}, PRIMARY KEY ({key}))",
        qualified_table(schema, table),
        columns.join(", ")
    )
}

/// `INSERT INTO "schema"."table" ("c1", ...) VALUES (p1, ...)`
///
/// `placeholders` are the value expressions, one per column, usually `$n` with a cast.
pub fn insert(schema: &str, table: &str, columns: &[&str], placeholders: &[String]) -> String {
    let columns = columns
        .iter()
        .map(|column| quote_column(column))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({columns}) VALUES ({})",
        qualified_table(schema, table),
        placeholders.join(", ")
    )
}
