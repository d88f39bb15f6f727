//! Logging consumer: writes blocks, traces and delta rows as JSON and follows a few well-known
//! tables.
//!
//! This is a debugging consumer. Output is written synchronously from the handler, so the
//! writer should be buffered; it is flushed once per block.

use std::{collections::HashSet, io::Write};

use async_trait::async_trait;
use monitoring::logging;
use serde_json::{Value as Json, json};
use ship_abi::{
    Name, TypeRef, Value,
    render::{self, RenderOptions},
};
use ship_client::{BlockHandler, BoxError, ReceivedBlock, SIGNED_BLOCK_TYPE, ShipSchema};
use tracing::{info, warn};

use crate::sink::{PROGRESS_INTERVAL, thousands};

const ACCOUNT_TABLE: &str = "account";
const GENERATED_TRANSACTION_TABLE: &str = "generated_transaction";

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Writing to the output failed
    #[error("failed to write monitor output")]
    Output(#[source] std::io::Error),
}

/// [`BlockHandler`] writing one JSON document per line item to `out`.
pub struct Monitor<W> {
    out: W,
    /// Accounts whose latest `account` row carried a non-empty ABI.
    accounts_with_abi: HashSet<Name>,
}

impl<W: Write + Send> Monitor<W> {
    pub fn new(out: W) -> Self {
        Monitor {
            out,
            accounts_with_abi: HashSet::new(),
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    pub fn has_abi(&self, account: Name) -> bool {
        self.accounts_with_abi.contains(&account)
    }

    pub fn observe(&mut self, schema: &ShipSchema, block: ReceivedBlock) -> Result<(), MonitorError> {
        let Some(this_block) = block.result.this_block else {
            return Ok(());
        };
        let block_num = this_block.block_num;
        if block_num % PROGRESS_INTERVAL == 0 {
            info!(block = %thousands(u64::from(block_num)), "block_progress");
        }

        if let Some(mut signed_block) = block.block {
            if let Ok(ty) = schema.registry().resolve(SIGNED_BLOCK_TYPE) {
                expand(schema, &ty, &mut signed_block);
            }
            self.write("block", &render::to_json(&signed_block))?;
        }

        if !block.traces.is_empty() {
            let elided = RenderOptions { elide_binary: true };
            let traces = block
                .traces
                .iter()
                .map(|trace| render::to_json_with(trace, elided))
                .collect();
            self.write("traces", &Json::Array(traces))?;
        }

        for delta in &block.deltas {
            let rows = match schema.rows(delta) {
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
            for mut row in rows {
                expand(schema, &row.ty, &mut row.value);
                let data = render::to_json(&row.value);
                self.write(
                    "row",
                    &json!({
                        "name": delta.name,
                        "block_num": block_num,
                        "present": row.present,
                        "data": data,
                    }),
                )?;

                match delta.name.as_str() {
                    ACCOUNT_TABLE => self.account(block_num, row.present, &row.value),
                    GENERATED_TRANSACTION_TABLE => {
                        self.generated_transaction(block_num, row.present, &row.value, data)?
                    }
                    _ => {}
                }
            }
        }
        self.out.flush().map_err(MonitorError::Output)
    }

    fn account(&mut self, block_num: u32, present: bool, row: &Value) {
        let Some(account) = row.field("name").and_then(Value::as_name) else {
            return;
        };
        let abi_len = row.field("abi").map_or(0, |abi| {
            abi.as_bytes()
                .map(<[u8]>::len)
                .or_else(|| abi.as_array().map(<[Value]>::len))
                .unwrap_or(0)
        });

        if present && abi_len > 0 {
            info!(block_num, %account, abi_len, "abi_set");
            self.accounts_with_abi.insert(account);
        } else if self.accounts_with_abi.remove(&account) {
            info!(block_num, %account, "abi_cleared");
        }
    }

    fn generated_transaction(
        &mut self,
        block_num: u32,
        present: bool,
        row: &Value,
        data: Json,
    ) -> Result<(), MonitorError> {
        let sender = row.field("sender").and_then(Value::as_name).unwrap_or_default();
        if sender == Name::default() {
            return Ok(());
        }
        info!(block_num, %sender, present, "generated_transaction");
        self.write("generated_transaction", &json!({ "present": present, "data": data }))
    }

    fn write(&mut self, label: &str, document: &Json) -> Result<(), MonitorError> {
        writeln!(self.out, "{label} {document}").map_err(MonitorError::Output)
    }
}

/// Replaces packed transaction payloads in `value` with decoded transactions. A payload that
/// does not unpack stays as it is.
fn expand(schema: &ShipSchema, ty: &TypeRef, value: &mut Value) {
    if let Err(err) = schema.unpacker().expand(schema.registry(), ty, value) {
        warn!(
            error = %err,
            error_source = logging::error_source(&err),
            "packed_transaction_not_expanded"
        );
    }
}

#[async_trait]
impl<W: Write + Send> BlockHandler for Monitor<W> {
    async fn block(&mut self, schema: &ShipSchema, block: ReceivedBlock) -> Result<(), BoxError> {
        Ok(self.observe(schema, block)?)
    }
}
