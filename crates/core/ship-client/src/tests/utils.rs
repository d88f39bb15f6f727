//! Handler doubles for connection tests.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{BlockHandler, BoxError, ReceivedBlock, ShipSchema};

/// Records every block it is handed, optionally slowly or failing at a given block.
#[derive(Default)]
pub struct RecordingHandler {
    pub schema_tables: Option<usize>,
    pub blocks: Vec<ReceivedBlock>,
    /// Requests the connection had sent when each `block` call started.
    pub sent_at_start: Vec<usize>,
    pub sent: Option<Arc<AtomicUsize>>,
    pub delay: Option<Duration>,
    pub fail_at: Option<u32>,
    /// Set while a `block` call is in progress.
    pub active: bool,
}

impl RecordingHandler {
    pub fn watching(sent: &Arc<AtomicUsize>) -> Self {
        RecordingHandler {
            sent: Some(Arc::clone(sent)),
            ..Default::default()
        }
    }

    pub fn block_nums(&self) -> Vec<u32> {
        self.blocks.iter().map(|b| b.result.block_num()).collect()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("handler refused block {0}")]
pub struct Refused(pub u32);

#[async_trait]
impl BlockHandler for RecordingHandler {
    async fn schema_ready(&mut self, schema: &ShipSchema) -> Result<(), BoxError> {
        self.schema_tables = Some(schema.tables().len());
        Ok(())
    }

    async fn block(&mut self, _schema: &ShipSchema, block: ReceivedBlock) -> Result<(), BoxError> {
        assert!(!self.active, "handler entered while a block was in progress");
        self.active = true;

        if let Some(sent) = &self.sent {
            self.sent_at_start.push(sent.load(Ordering::SeqCst));
        }
        let block_num = block.result.block_num();
        if self.fail_at == Some(block_num) {
            return Err(Refused(block_num).into());
        }
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        self.blocks.push(block);

        self.active = false;
        Ok(())
    }
}
