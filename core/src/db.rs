use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::Error;

pub async fn connect(database_url: &str) -> Result<PgPool, Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| Error::Database {
            message: format!("Failed to connect to {database_url}: {e}"),
        })
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Database {
            message: format!("Migration failed: {e}"),
        })
}
