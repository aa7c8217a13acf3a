//! Log Pipeline Error Hierarchy
//!
//! Defines the error types of the pipeline, categorized by layer:
//! configuration, binary codec, output handlers, senders and the dispatcher.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration values that loaded but do not make sense
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Binary stream encoding/decoding failures
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Output handler failures (only ever remove the faulty handler)
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// Sender failures that cannot be absorbed by buffering
    #[error(transparent)]
    Sender(#[from] SenderError),

    /// Dispatcher lifecycle failures
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Raw I/O failures outside of a handler
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Errors raised while reading or writing a `.ckmon` stream.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Stream does not start with the `CKMON` magic
    #[error("Invalid stream header: missing CKMON magic")]
    InvalidMagic,

    /// Stream version this reader has no decoder for
    #[error("Unsupported stream version {0}")]
    UnsupportedVersion(i32),

    /// Level or flag bits that no writer produces
    #[error("Invalid entry header (level: {level:#04x}, flags: {flags:#04x})")]
    InvalidHeader { level: u8, flags: u8 },

    /// Unknown entry kind code
    #[error("Invalid entry kind {0}")]
    InvalidKind(u8),

    /// Tick count outside of years 1..=9999
    #[error("Timestamp ticks {0} are out of the supported year range")]
    OutOfRangeYear(i64),

    /// Length prefix that cannot be right
    #[error("Corrupt length {length} while reading {field}")]
    InvalidLength { field: &'static str, length: u64 },

    /// String payload that is not UTF-8
    #[error("Invalid UTF-8 string in {0}")]
    InvalidUtf8(&'static str),

    /// Exception payload version this reader does not know
    #[error("Unsupported exception payload version {0}")]
    InvalidExceptionVersion(u8),

    /// Record violating the entry invariants (encode side)
    #[error("Invalid record: {0}")]
    InvalidRecord(&'static str),

    /// Physical end of stream in the middle of a record
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Underlying reader/writer failure
    #[error(transparent)]
    Io(std::io::Error),
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            CodecError::UnexpectedEof
        } else {
            CodecError::Io(e)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// File system failure with path context
    #[error("I/O error on {path}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding the entry for the output failed
    #[error("Failed to encode entry: {0}")]
    Encode(#[from] CodecError),

    /// Console or stream write failure
    #[error("Write failed: {0}")]
    Write(#[from] std::io::Error),

    /// Handler-specific failure reported by a dynamic handler
    #[error("Handler {name} failed: {reason}")]
    Failed { name: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    /// Sink cannot be built from its configuration (never retried)
    #[error("Sink configuration error: {0}")]
    Persistent(String),

    /// Connection attempt failed (absorbed by buffering)
    #[error("Connection to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection attempt timed out (absorbed by buffering)
    #[error("Connection to {address} timed out after {duration:?}")]
    ConnectTimeout { address: String, duration: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The dispatcher no longer accepts input
    #[error("Dispatcher is closed")]
    Closed,

    /// The dispatch loop task could not be joined
    #[error("Dispatch loop failed: {0}")]
    LoopFailed(#[from] tokio::task::JoinError),

    /// The engine did not confirm a configuration in time
    #[error("Configuration version {version} not applied within {timeout:?}")]
    ConfigurationTimeout { version: u64, timeout: Duration },
}
