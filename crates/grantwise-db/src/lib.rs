//! Database layer for grantwise.
//!
//! Provides the SQLite connection pool (via `r2d2`) used by the local vector
//! store and the update history, plus the embedded migrations that create
//! every table. Migration SQL is compiled into the binary with
//! `include_str!` so the schema always ships with the code that reads it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
