//! PostgreSQL implementations of the storage traits.
//!
//! The reference schema lives in `sql/schema.sql`.

pub mod cards;
pub mod idempotency;

pub use cards::PgCardStore;
pub use idempotency::PgIdempotencyStore;
