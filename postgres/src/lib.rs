//! # Cliniq Postgres
//!
//! `PostgreSQL` implementations of the Cliniq storage seams:
//!
//! - [`PostgresRecordStore`]: queues and tickets with storage-level atomic
//!   counter updates
//! - [`PostgresSubscriptionStore`]: push subscriptions keyed by endpoint
//!
//! All queries are runtime-checked so the workspace builds without a live
//! `DATABASE_URL`.
//!
//! # Example
//!
//! ```ignore
//! use cliniq_postgres::{connect_pool, PostgresRecordStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect_pool("postgres://localhost/cliniq", 10).await?;
//!     let store = PostgresRecordStore::new(pool);
//!     store.ensure_schema().await?;
//!     Ok(())
//! }
//! ```

pub mod record_store;
pub mod subscription_store;

pub use record_store::PostgresRecordStore;
pub use subscription_store::PostgresSubscriptionStore;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Build a connection pool with the given size bound.
///
/// # Errors
///
/// Returns the underlying `sqlx` error if the pool cannot connect.
pub async fn connect_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
