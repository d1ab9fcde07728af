//! Database probe
//!
//! Verifies that a service host can reach its database with the settings
//! the service scripts would use, and reports the server clock as seen
//! through the timestamp normalizer.
//!
//! # Usage
//!
//! ```bash
//! # Settings from .env / environment
//! cargo run --bin db-probe
//!
//! DB_HOST=db DB_USER=cipuser DB_PASSWORD=... DB_NAME=cipdb LOG_FORMAT=json \
//!     cargo run --bin db-probe
//! ```
//!
//! # Environment Variables
//!
//! * `APP_ENV` - development, staging or production (default: development)
//! * `DB_*` - database settings, see `common_db::config`
//! * `LOG_LEVEL` - trace, debug, info, warning, error, critical (default: info)
//! * `LOG_FORMAT` - colored, text or json (default: colored)
//!
//! Exits non-zero if the database cannot be reached within the retry budget.

use anyhow::Context;
use common::{telemetry, Common, DatabaseError, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("loading settings")?;
    telemetry::init_tracing(&settings.logging).context("initialising logging")?;

    println!("{}", settings.display());
    tracing::info!(
        env = %settings.env,
        interface_version = common::INTERFACE_VERSION,
        "Starting database probe"
    );

    let common = Common::init(settings.db);
    let result = probe(&common).await;

    let status = common.connections().status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    common.shutdown().await;
    result
}

/// Reads the server clock over a scoped connection
async fn probe(common: &Common) -> anyhow::Result<()> {
    let epoch: f64 = common
        .connections()
        .with_connection(|conn| {
            Box::pin(async move {
                let row: (f64,) = sqlx::query_as("SELECT extract(epoch FROM now())::float8")
                    .fetch_one(&mut ***conn)
                    .await
                    .map_err(DatabaseError::from)?;
                Ok::<_, DatabaseError>(row.0)
            })
        })
        .await
        .context("querying server clock")?;

    let server_time = common.to_timestamp(epoch)?;
    tracing::info!(%server_time, "Database reachable");
    println!("server time: {}", server_time);
    Ok(())
}
