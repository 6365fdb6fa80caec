//! # storage-adapters
//!
//! Implementations of the repository ports in `domains::ports`.
//!
//! - [`memory::MemoryStore`]: `DashMap`-backed, always compiled.
//! - [`postgres::PgStore`]: `sqlx` over PostgreSQL, behind `db-postgres`.

pub mod memory;
#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "db-postgres")]
pub use postgres::{PgOptions, PgStore};
