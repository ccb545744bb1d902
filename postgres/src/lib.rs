//! # Admission Postgres
//!
//! `PostgreSQL` implementations of the admission system's collaborator
//! traits:
//!
//! - [`PgBookingStore`] / [`PgConferenceStore`]: record stores with
//!   optimistic concurrency (version-guarded upserts)
//! - [`PgWaitlistChannel`]: table-backed FIFO-with-priority queues with a
//!   durable enqueue log for idempotent, rollback-safe enqueues
//! - [`PostgresConfig`] / [`connect`] / [`ensure_schema`]: pool construction
//!   and idempotent schema bootstrap
//!
//! ## Example
//!
//! ```no_run
//! use admission_postgres::{connect, ensure_schema, PostgresConfig,
//!     PgBookingStore, PgConferenceStore, PgWaitlistChannel};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PostgresConfig::from_env();
//! let pool = connect(&config).await?;
//! ensure_schema(&pool).await?;
//!
//! let bookings = PgBookingStore::new(pool.clone());
//! let conferences = PgConferenceStore::new(pool.clone());
//! let channel = PgWaitlistChannel::new(pool);
//! # Ok(())
//! # }
//! ```
//!
//! Live-database tests are intentionally not bundled; the in-memory
//! implementations in `admission-testing` carry the behavioral test suite
//! and mirror the semantics implemented here.

pub mod channel;
pub mod config;
pub mod schema;
pub mod stores;

// Re-export commonly used items
pub use channel::PgWaitlistChannel;
pub use config::{PostgresConfig, connect};
pub use schema::ensure_schema;
pub use stores::{PgBookingStore, PgConferenceStore};
