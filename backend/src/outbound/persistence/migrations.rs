//! Embedded schema migrations for the metadata and datadump tables.

use diesel::{Connection, PgConnection};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use super::pool::PoolError;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Apply pending migrations on a blocking connection to `database_url`.
///
/// # Errors
///
/// Returns [`PoolError::Build`] when the connection or a migration fails.
pub async fn run_migrations(database_url: &str) -> Result<(), PoolError> {
    let url = database_url.to_owned();
    let applied = tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&url)
            .map_err(|err| PoolError::build(format!("migration connection: {err}")))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map(|versions| versions.len())
            .map_err(|err| PoolError::build(format!("migration: {err}")))
    })
    .await
    .map_err(|err| PoolError::build(format!("migration task: {err}")))??;
    info!(applied, "database migrations applied");
    Ok(())
}
