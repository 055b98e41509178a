//! Request handlers.

mod sync;
mod tables;

pub use sync::*;
pub use tables::*;
