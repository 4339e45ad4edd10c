// Copyright 2023 Remi Bernotavicius

use diesel::connection::SimpleConnection as _;
use diesel::r2d2::{ConnectionManager, CustomizeConnection};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::error::Error;

pub mod models;
pub mod schema;

pub type Connection = diesel::sqlite::SqliteConnection;
pub type Pool = diesel::r2d2::Pool<ConnectionManager<Connection>>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// SQLite leaves foreign keys off unless asked, and the cascade from
/// recipes to ingredients depends on them.
#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<Connection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), diesel::r2d2::Error> {
        conn.batch_execute("PRAGMA busy_timeout = 1000; PRAGMA foreign_keys = ON;")
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

pub fn establish_pool(
    database_url: &str,
    max_size: u32,
) -> Result<Pool, Box<dyn Error + Send + Sync + 'static>> {
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_customizer(Box::new(ConnectionOptions))
        .build(ConnectionManager::new(database_url))?;
    pool.get()?.run_pending_migrations(MIGRATIONS)?;
    Ok(pool)
}

/// A single-connection pool over an in-memory database. Every test gets a
/// fresh schema and the data dies with the pool.
#[cfg(test)]
pub fn test_pool() -> Pool {
    establish_pool(":memory:", 1).unwrap()
}

#[test]
fn migrations() {
    let pool = test_pool();
    let mut conn = pool.get().unwrap();

    assert!(!conn.applied_migrations().unwrap().is_empty());
}
