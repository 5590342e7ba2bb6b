use crate::db::{run_migrations, SqliteJournal};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// Helper to create an in-memory test database with migrations applied
pub async fn create_test_db() -> SqlitePool {
    // Every pooled connection to `sqlite::memory:` opens its own database,
    // so keep the pool at a single connection.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// In-memory SQLite journal, for tests that want the real persistence path.
pub async fn create_test_journal() -> SqliteJournal {
    SqliteJournal::new(create_test_db().await)
}
