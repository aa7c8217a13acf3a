//! Helpers shared by the unit tests.
mod common;
mod entry_builder;
mod mock;

pub use common::*;
pub use entry_builder::*;
pub use mock::*;
