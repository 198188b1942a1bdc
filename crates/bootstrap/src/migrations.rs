use bigskies_core::CoordinatorError;
use sqlx::pool::PoolConnection;
use sqlx::{PgPool, Postgres};
use tracing::info;

/// Advisory-lock key reserved for the schema migration run, shared across
/// every Bootstrap replica in the fleet (spec: "exactly one concurrent
/// migration run across the fleet").
const MIGRATION_LOCK_KEY: &str = "migrations";

/// Take the fleet-wide advisory lock, apply every script under
/// `./migrations` in declared order, then release the lock. A checksum
/// mismatch against an already-recorded migration surfaces as
/// [`CoordinatorError::MigrationDrift`] rather than the bare sqlx error.
///
/// Postgres advisory locks are scoped to the session that took them, so the
/// acquire, the migration run, and the release all have to share one
/// physical connection checked out of `pool` — handing each step its own
/// connection would let a second replica's `acquire_lock` succeed while
/// this replica's migration is still running.
pub async fn run_migrations(pool: &PgPool) -> Result<(), CoordinatorError> {
    let mut conn = pool.acquire().await?;

    acquire_lock(&mut conn).await?;
    let result = sqlx::migrate!("./migrations").run(&mut *conn).await;
    release_lock(&mut conn).await?;

    match result {
        Ok(()) => {
            info!("bootstrap schema migrations applied");
            Ok(())
        }
        Err(e) => {
            let message = e.to_string();
            if message.to_lowercase().contains("checksum") {
                Err(CoordinatorError::MigrationDrift { name: message })
            } else {
                Err(CoordinatorError::Other(message))
            }
        }
    }
}

async fn acquire_lock(conn: &mut PoolConnection<Postgres>) -> Result<(), CoordinatorError> {
    sqlx::query("SELECT pg_advisory_lock(hashtext($1)::bigint)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut **conn)
        .await?;
    Ok(())
}

async fn release_lock(conn: &mut PoolConnection<Postgres>) -> Result<(), CoordinatorError> {
    sqlx::query("SELECT pg_advisory_unlock(hashtext($1)::bigint)")
        .bind(MIGRATION_LOCK_KEY)
        .execute(&mut **conn)
        .await?;
    Ok(())
}
