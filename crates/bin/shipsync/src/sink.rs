//! Relational sink: recreates the target schema from the table catalog, then persists every
//! block's table deltas in one transaction per block.

use std::collections::HashMap;

use async_trait::async_trait;
use monitoring::logging;
use ship_client::{BlockHandler, BoxError, ReceivedBlock, ShipSchema};
use tracing::{debug, info, warn};

use crate::{
    schema::{self, SchemaMappingError, TableDefinition},
    sql::{self, ValidateIdentifierError},
    store::{SinkStore, SinkTransaction, StoreError},
};

/// Blocks between progress reports.
pub const PROGRESS_INTERVAL: u32 = 100;

/// Errors that stop the sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The configured schema name is not usable as a PostgreSQL identifier
    #[error("invalid schema name '{schema}'")]
    InvalidSchemaName {
        schema: String,
        #[source]
        source: ValidateIdentifierError,
    },

    /// The table catalog could not be reflected
    #[error("failed to reflect the table catalog")]
    Reflect(#[source] SchemaMappingError),

    /// Dropping or creating the schema or one of its tables failed
    #[error("failed to create schema '{schema}'")]
    CreateSchema {
        schema: String,
        #[source]
        source: StoreError,
    },

    /// A block's transaction could not be opened or committed
    #[error("transaction for block {block_num} failed")]
    Transaction {
        block_num: u32,
        #[source]
        source: StoreError,
    },
}

/// A prepared table: its definition and statement text for the target schema.
struct SinkTable {
    definition: TableDefinition,
    insert_sql: String,
}

/// [`BlockHandler`] filling one PostgreSQL schema.
pub struct FillSink<S> {
    store: S,
    schema: String,
    tables: HashMap<String, SinkTable>,
    rows_since_report: u64,
}

impl<S: SinkStore> FillSink<S> {
    pub fn new(store: S, schema: impl Into<String>) -> Self {
        FillSink {
            store,
            schema: schema.into(),
            tables: HashMap::new(),
            rows_since_report: 0,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Drops and recreates the target schema with one table per catalog entry.
    pub async fn create_schema(&mut self, catalog: &ShipSchema) -> Result<(), SinkError> {
        sql::validate_identifier(&self.schema).map_err(|source| SinkError::InvalidSchemaName {
            schema: self.schema.clone(),
            source,
        })?;
        let definitions = schema::reflect(catalog).map_err(SinkError::Reflect)?;

        let create_failed = |source| SinkError::CreateSchema {
            schema: self.schema.clone(),
            source,
        };
        self.store
            .execute(&sql::drop_schema(&self.schema))
            .await
            .map_err(create_failed)?;
        self.store
            .execute(&sql::create_schema(&self.schema))
            .await
            .map_err(create_failed)?;

        let mut tables = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            self.store
                .execute(&definition.create_sql(&self.schema))
                .await
                .map_err(create_failed)?;
            debug!(schema = %self.schema, table = %definition.name, "table_created");
            tables.insert(
                definition.name.clone(),
                SinkTable {
                    insert_sql: definition.insert_sql(&self.schema),
                    definition,
                },
            );
        }
        info!(schema = %self.schema, tables = tables.len(), "schema_created");
        self.tables = tables;
        Ok(())
    }

    /// Persists the deltas of one block in a single transaction.
    ///
    /// Rows that do not convert and inserts that fail are logged and skipped; the transaction
    /// still commits.
    pub async fn persist(
        &mut self,
        catalog: &ShipSchema,
        block: &ReceivedBlock,
    ) -> Result<(), SinkError> {
        let Some(this_block) = block.result.this_block else {
            return Ok(());
        };
        let block_num = this_block.block_num;
        if block_num % PROGRESS_INTERVAL == 0 {
            self.report_progress(block_num);
        }

        let transaction_failed = |source| SinkError::Transaction { block_num, source };
        let mut tx = self.store.begin().await.map_err(transaction_failed)?;

        for delta in &block.deltas {
            let Some(table) = self.tables.get(&delta.name) else {
                warn!(block_num, table = %delta.name, "delta_table_unknown");
                continue;
            };
            let rows = match catalog.rows(delta) {
                Ok(rows) => rows,
                Err(err) => {
                    warn!(
                        block_num,
                        error = %err,
                        error_source = logging::error_source(&err),
                        "delta_skipped"
                    );
                    continue;
                }
            };

            for row in rows {
                let values = match table.definition.row_values(block_num, row.present, &row.value)
                {
                    Ok(values) => values,
                    Err(err) => {
                        warn!(
                            block_num,
                            table = %delta.name,
                            error = %err,
                            error_source = logging::error_source(&err),
                            "row_conversion_failed"
                        );
                        continue;
                    }
                };

                match tx.insert(&table.insert_sql, &values).await {
                    Ok(()) => self.rows_since_report += 1,
                    Err(err @ StoreError::Persistence(_)) => {
                        warn!(
                            block_num,
                            statement = %table.insert_sql,
                            parameters = ?values,
                            error = %err,
                            error_source = logging::error_source(&err),
                            "insert_failed"
                        );
                    }
                    Err(err) => return Err(transaction_failed(err)),
                }
            }
        }

        tx.commit().await.map_err(transaction_failed)
    }

    fn report_progress(&mut self, block_num: u32) {
        info!(block = %thousands(u64::from(block_num)), "block_progress");
        if self.rows_since_report > 0 {
            info!(rows = %thousands(self.rows_since_report), "rows_created");
            self.rows_since_report = 0;
        }
    }
}

#[async_trait]
impl<S: SinkStore> BlockHandler for FillSink<S> {
    async fn schema_ready(&mut self, schema: &ShipSchema) -> Result<(), BoxError> {
        Ok(self.create_schema(schema).await?)
    }

    async fn block(&mut self, schema: &ShipSchema, block: ReceivedBlock) -> Result<(), BoxError> {
        Ok(self.persist(schema, &block).await?)
    }
}

/// Formats `n` with `,` between groups of three digits.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thousands_groups_digits() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(12_345_678), "12,345,678");
    }
}
