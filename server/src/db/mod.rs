//! Database module for PostgreSQL persistence.

mod pool;
mod tables;

pub use pool::*;
pub use tables::*;
