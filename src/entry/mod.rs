//! Log entry object model: levels, timestamps, tags, exceptions, the
//! `LogRecord` itself and the pool that recycles records.

mod exception;
mod level;
mod pool;
mod record;
mod tags;
mod time;

pub use exception::*;
pub use level::*;
pub use pool::*;
pub use record::*;
pub use tags::*;
pub use time::*;

#[cfg(test)]
mod pool_test;
