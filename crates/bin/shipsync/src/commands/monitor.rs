use std::io::{self, BufWriter};

use anyhow::{Context, Result};
use ship_client::Connection;
use tracing::info;

use crate::{config::MonitorConfig, monitor::Monitor};

pub async fn run(config: MonitorConfig) -> Result<()> {
    info!(endpoint = %config.stream.endpoint, fetch = ?config.fetch(), "monitor_starting");

    let mut monitor = Monitor::new(BufWriter::new(io::stdout()));
    let connection = Connection::new(config.stream.connection_config(config.fetch()));

    connection
        .connect(&config.stream.endpoint, &mut monitor)
        .await
        .with_context(|| format!("State history stream from {} failed", config.stream.endpoint))?;

    info!("State history stream ended");
    Ok(())
}
