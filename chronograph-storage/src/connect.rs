//! Pool construction and schema migration, grounded on `tycho_storage::postgres::connect`/
//! `run_migrations`: build the async pool, then run pending migrations over a
//! throwaway synchronous connection before handing the pool to the caller.

use diesel::{Connection, PgConnection};
use diesel_async::pooled_connection::deadpool::Pool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

use chronograph_core::ChronographError;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

fn run_migrations(db_url: &str) -> Result<(), ChronographError> {
    info!("running pending migrations");
    let mut conn = PgConnection::establish(db_url)
        .map_err(|e| ChronographError::database(anyhow::anyhow!(e)))?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| ChronographError::database(anyhow::anyhow!(e.to_string())))?;
    Ok(())
}

/// Builds the deadpool-backed async connection pool, running pending
/// migrations first over a dedicated synchronous connection (mixing async
/// and migration-harness connections the same way the teacher does, since
/// `diesel_migrations` has no async harness).
pub async fn connect(db_url: &str) -> Result<Pool<AsyncPgConnection>, ChronographError> {
    run_migrations(db_url)?;
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    Pool::builder(config)
        .build()
        .map_err(|e| ChronographError::database(anyhow::anyhow!(e)))
}
