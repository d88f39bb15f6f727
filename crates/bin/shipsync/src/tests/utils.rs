//! Store double and block builders for sink and monitor tests.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use ship_client::{BlocksResult, ReceivedBlock, ShipSchema, TableDelta, test_utils::position};

use crate::{
    schema::SqlValue,
    store::{SinkStore, SinkTransaction, StoreError},
};

/// Everything a [`RecordingStore`] was asked to do.
#[derive(Debug, Default)]
pub struct StoreLog {
    /// Statements run outside a transaction, in order.
    pub executed: Vec<String>,
    /// Inserts that succeeded.
    pub inserted: Vec<(String, Vec<SqlValue>)>,
    /// Inserts that were rejected.
    pub rejected: Vec<(String, Vec<SqlValue>)>,
    pub begun: usize,
    pub committed: usize,
}

/// In-memory [`SinkStore`] recording every statement.
#[derive(Debug, Clone, Default)]
pub struct RecordingStore {
    log: Arc<Mutex<StoreLog>>,
    /// Inserts binding this value fail as the database would reject them.
    reject: Option<SqlValue>,
    fail_commit: bool,
}

impl RecordingStore {
    pub fn rejecting(value: SqlValue) -> Self {
        RecordingStore {
            reject: Some(value),
            ..Default::default()
        }
    }

    pub fn failing_commit() -> Self {
        RecordingStore {
            fail_commit: true,
            ..Default::default()
        }
    }

    pub fn log(&self) -> MutexGuard<'_, StoreLog> {
        self.log.lock().expect("store log poisoned")
    }
}

#[async_trait]
impl SinkStore for RecordingStore {
    type Transaction = RecordingTransaction;

    async fn execute(&self, sql: &str) -> Result<(), StoreError> {
        self.log().executed.push(sql.to_string());
        Ok(())
    }

    async fn begin(&self) -> Result<RecordingTransaction, StoreError> {
        self.log().begun += 1;
        Ok(RecordingTransaction {
            store: self.clone(),
        })
    }
}

pub struct RecordingTransaction {
    store: RecordingStore,
}

#[async_trait]
impl SinkTransaction for RecordingTransaction {
    async fn insert(&mut self, sql: &str, values: &[SqlValue]) -> Result<(), StoreError> {
        let entry = (sql.to_string(), values.to_vec());
        if self
            .store
            .reject
            .as_ref()
            .is_some_and(|reject| values.contains(reject))
        {
            self.store.log().rejected.push(entry);
            return Err(StoreError::Persistence(sqlx::Error::Protocol(
                "duplicate key value violates unique constraint".into(),
            )));
        }
        self.store.log().inserted.push(entry);
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        if self.store.fail_commit {
            return Err(StoreError::Transaction(sqlx::Error::PoolClosed));
        }
        self.store.log().committed += 1;
        Ok(())
    }
}

/// A received block numbered `block_num` carrying `deltas`.
pub fn received(block_num: u32, deltas: Vec<TableDelta>) -> ReceivedBlock {
    ReceivedBlock {
        result: BlocksResult {
            head: position(block_num),
            last_irreversible: position(block_num),
            this_block: Some(position(block_num)),
            prev_block: block_num.checked_sub(1).map(position),
            block: None,
            traces: None,
            deltas: None,
        },
        block: None,
        traces: Vec::new(),
        deltas,
    }
}

/// Loads an inline schema document.
pub fn schema_from(document: &str) -> ShipSchema {
    ShipSchema::from_document(document.as_bytes()).expect("schema document should load")
}
