//! Database access of the relational sink.
//!
//! [`SinkStore`] and [`SinkTransaction`] are the only surface the sink uses, so the sink can run
//! against [`PgStore`] or an in-memory double.

use async_trait::async_trait;
use sqlx::{Acquire, Postgres, Transaction, postgres::PgArguments, query::Query};

use crate::{conn::DbConnPool, schema::SqlValue};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A single statement failed. An open transaction stays usable.
    #[error("statement failed")]
    Persistence(#[source] sqlx::Error),

    /// Opening, committing or rolling back a transaction failed; the sink's state in the
    /// database is unknown.
    #[error("transaction failed")]
    Transaction(#[source] sqlx::Error),
}

#[async_trait]
pub trait SinkStore: Send + Sync {
    type Transaction: SinkTransaction;

    /// Runs one statement outside any transaction.
    async fn execute(&self, sql: &str) -> Result<(), StoreError>;

    async fn begin(&self) -> Result<Self::Transaction, StoreError>;
}

#[async_trait]
pub trait SinkTransaction: Send {
    /// Runs one insert.
    ///
    /// A [`StoreError::Persistence`] leaves the transaction able to run further statements and
    /// commit.
    async fn insert(&mut self, sql: &str, values: &[SqlValue]) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbConnPool,
}

impl PgStore {
    pub fn new(pool: DbConnPool) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl SinkStore for PgStore {
    type Transaction = PgTransaction;

    async fn execute(&self, sql: &str) -> Result<(), StoreError> {
        sqlx::query(sql)
            .execute(&*self.pool)
            .await
            .map_err(StoreError::Persistence)?;
        Ok(())
    }

    async fn begin(&self) -> Result<PgTransaction, StoreError> {
        let tx = self.pool.begin().await.map_err(StoreError::Transaction)?;
        Ok(PgTransaction { tx })
    }
}

/// A Postgres transaction running each insert under its own savepoint, so a failed insert is
/// rolled back alone instead of aborting the transaction.
pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SinkTransaction for PgTransaction {
    async fn insert(&mut self, sql: &str, values: &[SqlValue]) -> Result<(), StoreError> {
        let mut savepoint = Acquire::begin(&mut self.tx)
            .await
            .map_err(StoreError::Transaction)?;

        let query = values.iter().fold(sqlx::query(sql), bind);
        match query.execute(&mut *savepoint).await {
            Ok(_) => savepoint.commit().await.map_err(StoreError::Transaction),
            Err(err) => {
                savepoint
                    .rollback()
                    .await
                    .map_err(StoreError::Transaction)?;
                Err(StoreError::Persistence(err))
            }
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(StoreError::Transaction)
    }
}

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int2(v) => query.bind(*v),
        SqlValue::Int4(v) => query.bind(*v),
        SqlValue::Int8(v) => query.bind(*v),
        SqlValue::Float8(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
    }
}
