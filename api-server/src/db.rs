use rocket_db_pools::Database;
use rocket_db_pools::sqlx::{self, PgPool, migrate::Migrator};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Shared pool for users, refresh tokens and reports. Configured under
/// `databases.lapor_db`.
#[derive(Database)]
#[database("lapor_db")]
pub struct LaporDb(sqlx::PgPool);

/// Apply pending migrations. Already applied migrations are skipped and
/// checksum drift aborts startup.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    log::info!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("database migrations up to date");
    Ok(())
}
