//! # domains
//!
//! Entities, feed plan types, the error taxonomy and the port traits of
//! Communiverse. No I/O lives here.

pub mod errors;
pub mod feed;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
pub use feed::*;
pub use models::*;
pub use ports::*;
