//! Sync pass orchestration.

mod driver;
mod guard;

pub use driver::*;
pub use guard::*;
