//! Database migration support.
//!
//! Embeds and runs the SQL migrations in `warden_core/migrations/`.

use sqlx::PgPool;

/// Run all embedded migrations against `pool`. Already-applied migrations
/// are skipped.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
