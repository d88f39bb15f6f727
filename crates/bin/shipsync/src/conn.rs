//! Connection pool to the PostgreSQL database the sink fills.
//!
//! The pool is opened once, before the stream connects. The database often starts alongside the
//! producer, so refused or saturated connections are retried with exponential backoff; a
//! malformed URL or rejected credentials fail immediately.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use sqlx::{
    Pool, Postgres,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::{info, instrument, warn};

/// Errors that can occur when connecting to the sink database.
#[derive(Debug, thiserror::Error)]
pub enum ConnError {
    /// The database URL could not be parsed
    #[error("invalid database URL")]
    InvalidUrl(#[source] sqlx::Error),

    /// The database stayed unreachable after every retry, or refused the connection outright
    #[error("failed to connect to database {database} on {host}")]
    ConnectionError {
        host: String,
        database: String,
        #[source]
        source: sqlx::Error,
    },
}

/// A connection pool to the sink database.
#[derive(Debug, Clone)]
pub struct DbConnPool(Pool<Postgres>);

impl DbConnPool {
    /// Opens a pool of at most `pool_size` connections to `url`.
    #[instrument(skip_all, err)]
    pub async fn connect(url: &str, pool_size: u32) -> Result<Self, ConnError> {
        let options: PgConnectOptions = url.parse().map_err(ConnError::InvalidUrl)?;
        let host = options.get_host().to_string();
        let database = options.get_database().unwrap_or("postgres").to_string();

        let pool_options = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(5));

        let pool = (|| pool_options.clone().connect_with(options.clone()))
            .retry(retry_policy())
            .when(is_transient)
            .notify(|err, delay| notify_retry(&host, err, delay))
            .await
            .map_err(|source| ConnError::ConnectionError {
                host: host.clone(),
                database: database.clone(),
                source,
            })?;

        info!(%host, %database, pool_size, "db_pool_ready");
        Ok(Self(pool))
    }
}

/// Ten retries, backing off from 100ms to at most 30s between attempts.
fn retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(30))
        .with_max_times(10)
}

/// Connection failures worth retrying: the server is starting, saturated or briefly unreachable.
fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| {
            matches!(
                code.as_ref(),
                "57P03" | // cannot_connect_now
                "53300" | // too_many_connections
                "08006" | // connection_failure
                "08001" | // sqlclient_unable_to_establish_sqlconnection
                "08004" // sqlserver_rejected_establishment_of_sqlconnection
            )
        }),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

fn notify_retry(host: &str, err: &sqlx::Error, delay: Duration) {
    warn!(
        %host,
        error = %err,
        retry_delay_secs = delay.as_secs_f32(),
        "db_connection_retry"
    );
}

impl std::ops::Deref for DbConnPool {
    type Target = Pool<Postgres>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
