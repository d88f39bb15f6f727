use anyhow::{Context, Result};
use ship_client::Connection;
use tracing::info;

use crate::{
    config::{Fetch, FillConfig},
    conn::DbConnPool,
    sink::FillSink,
    store::PgStore,
};

pub async fn run(config: FillConfig) -> Result<()> {
    info!(
        endpoint = %config.stream.endpoint,
        schema = %config.database_schema,
        "fill_starting"
    );

    let pool = DbConnPool::connect(&config.database_url, config.max_db_connections)
        .await
        .context("Failed to connect to database")?;

    let mut sink = FillSink::new(PgStore::new(pool), config.database_schema.clone());
    let connection = Connection::new(config.stream.connection_config(Fetch {
        deltas: true,
        ..Default::default()
    }));

    connection
        .connect(&config.stream.endpoint, &mut sink)
        .await
        .with_context(|| format!("State history stream from {} failed", config.stream.endpoint))?;

    info!("State history stream ended");
    Ok(())
}
