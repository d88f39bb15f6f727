use std::num::NonZeroUsize;

use clap::{Args, Parser, Subcommand};
use ship_client::{ConnectionConfig, GetBlocksRequest, QueueBound};

#[derive(Parser, Debug, Clone)]
#[command(name = "shipsync")]
#[command(version)]
#[command(about = "Ledger state-history stream consumer", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Recreate a PostgreSQL schema from the producer's table catalog and fill it with every
    /// block's table deltas
    Fill(FillConfig),
    /// Log blocks, traces and table deltas as they arrive
    Monitor(MonitorConfig),
}

/// Connection parameters shared by every mode.
#[derive(Args, Debug, Clone)]
pub struct StreamConfig {
    /// State-history WebSocket endpoint (default: ws://localhost:8080/)
    ///
    /// Can also be set via SHIP_ENDPOINT environment variable
    #[arg(long, env = "SHIP_ENDPOINT", default_value = "ws://localhost:8080/")]
    pub endpoint: String,

    /// First block to request (default: 0)
    ///
    /// Can also be set via START_BLOCK environment variable
    #[arg(long, env = "START_BLOCK", default_value_t = 0)]
    pub start_block: u32,

    /// Block to stop before (default: 4294967295, end of chain)
    ///
    /// Can also be set via END_BLOCK environment variable
    #[arg(long, env = "END_BLOCK", default_value_t = u32::MAX)]
    pub end_block: u32,

    /// Unacknowledged messages the producer may have in flight (default: 5, minimum: 1)
    ///
    /// Can also be set via MAX_MESSAGES_IN_FLIGHT environment variable
    #[arg(long, env = "MAX_MESSAGES_IN_FLIGHT", default_value_t = 5, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_messages_in_flight: u32,

    /// Only stream irreversible blocks
    ///
    /// Can also be set via IRREVERSIBLE_ONLY environment variable
    #[arg(long, env = "IRREVERSIBLE_ONLY")]
    pub irreversible_only: bool,

    /// Blocks buffered locally before reading from the endpoint pauses (default: unbounded)
    ///
    /// Can also be set via QUEUE_CAPACITY environment variable
    #[arg(long, env = "QUEUE_CAPACITY")]
    pub queue_capacity: Option<NonZeroUsize>,
}

impl StreamConfig {
    /// Connection settings with the given payload selection.
    pub fn connection_config(&self, fetch: Fetch) -> ConnectionConfig {
        ConnectionConfig {
            request: GetBlocksRequest {
                start_block_num: self.start_block,
                end_block_num: self.end_block,
                max_messages_in_flight: self.max_messages_in_flight,
                irreversible_only: self.irreversible_only,
                fetch_block: fetch.block,
                fetch_traces: fetch.traces,
                fetch_deltas: fetch.deltas,
                ..Default::default()
            },
            queue: self
                .queue_capacity
                .map_or(QueueBound::Unbounded, QueueBound::Bounded),
        }
    }
}

/// Payloads to request with every block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fetch {
    pub block: bool,
    pub traces: bool,
    pub deltas: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FillConfig {
    #[command(flatten)]
    pub stream: StreamConfig,

    /// PostgreSQL connection URL (required)
    ///
    /// Format: postgresql://[user]:[password]@[host]:[port]/[database]
    /// Can also be set via DATABASE_URL environment variable
    #[arg(long, env = "DATABASE_URL", required = true)]
    pub database_url: String,

    /// Schema to drop and recreate (default: "chain")
    ///
    /// Can also be set via DATABASE_SCHEMA environment variable
    #[arg(long, env = "DATABASE_SCHEMA", default_value = "chain")]
    pub database_schema: String,

    /// Maximum database connections (default: 10, valid range: 1-1000)
    ///
    /// Can also be set via MAX_DB_CONNECTIONS environment variable
    #[arg(long, env = "MAX_DB_CONNECTIONS", default_value_t = 10, value_parser = clap::value_parser!(u32).range(1..=1000))]
    pub max_db_connections: u32,
}

#[derive(Args, Debug, Clone)]
pub struct MonitorConfig {
    #[command(flatten)]
    pub stream: StreamConfig,

    /// Request and log the signed block
    ///
    /// Can also be set via FETCH_BLOCK environment variable
    #[arg(long, env = "FETCH_BLOCK")]
    pub fetch_block: bool,

    /// Request and log transaction traces
    ///
    /// Can also be set via FETCH_TRACES environment variable
    #[arg(long, env = "FETCH_TRACES")]
    pub fetch_traces: bool,

    /// Request and log table deltas
    ///
    /// Can also be set via FETCH_DELTAS environment variable
    #[arg(long, env = "FETCH_DELTAS")]
    pub fetch_deltas: bool,
}

impl MonitorConfig {
    pub fn fetch(&self) -> Fetch {
        Fetch {
            block: self.fetch_block,
            traces: self.fetch_traces,
            deltas: self.fetch_deltas,
        }
    }
}
