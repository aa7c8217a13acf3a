mod stream_reader;

pub use stream_reader::*;

#[cfg(test)]
mod stream_reader_test;
