pub mod backoff;
pub mod file_io;
pub mod rate_limited;
