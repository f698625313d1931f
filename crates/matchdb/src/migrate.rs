//! SQL migrations via [`refinery`].
//!
//! The schema lives in versioned SQL files under this crate's
//! `migrations/` directory; applications embed and run them at startup.
//! The query compiler relies on the collaborator guarantee that, at query
//! time, every table, column and view the registry references exists with
//! the documented types and a `0` default on statistic columns;
//! `migrations/V1__schema.sql` is that guarantee's implementation.
//!
//! # Example (embedded SQL migrations)
//!
//! ```ignore
//! use matchdb::{create_pool, migrate};
//! use std::env;
//!
//! mod embedded {
//!     use matchdb::migrate::embed_migrations;
//!     embed_migrations!("./migrations");
//! }
//!
//! # async fn main_impl() -> matchdb::StoreResult<()> {
//! let pool = create_pool(&env::var("DATABASE_URL").unwrap())?;
//! migrate::run_pool(&pool, embedded::migrations::runner()).await?;
//! # Ok(()) }
//! ```

use crate::error::StoreResult;

pub use refinery::{Migration, Report, Runner, embed_migrations};

/// Run a refinery migration runner against a client connection.
pub async fn run(client: &mut tokio_postgres::Client, runner: Runner) -> StoreResult<Report> {
    Ok(runner.run_async(client).await?)
}

/// Acquire a connection from a pool and run migrations on it.
#[cfg(feature = "pool")]
pub async fn run_pool(pool: &deadpool_postgres::Pool, runner: Runner) -> StoreResult<Report> {
    let mut client = pool.get().await?;
    run(&mut client, runner).await
}
