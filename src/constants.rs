use std::time::Duration;

/// Magic bytes opening every `.ckmon` stream.
pub const STREAM_MAGIC: &[u8; 5] = b"CKMON";

/// Version written by this crate.
pub const CURRENT_STREAM_VERSION: u32 = 9;

/// Oldest version the decode table still understands.
pub const MIN_STREAM_VERSION: u32 = 5;

/// Standard gzip magic, checked before the CKMON header.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

pub const BINARY_FILE_EXTENSION: &str = ".ckmon";
pub const TEXT_FILE_EXTENSION: &str = ".log";
pub const OPEN_FILE_SUFFIX: &str = ".tmp";

/// Pool defaults
pub const DEFAULT_POOL_CAPACITY: usize = 1024;
pub const DEFAULT_POOL_MAX_CAPACITY: usize = 16 * 1024;

/// Minimal delay between two identical pool/leak diagnostics.
pub const DIAGNOSTIC_INTERVAL: Duration = Duration::from_secs(1);

/// Source id used by the dispatcher for the entries it emits itself.
pub const PIPELINE_SOURCE_ID: &str = "§dispatcher";

/// Upper bound for any single length prefix read from a stream.
pub const MAX_STRING_LENGTH: u64 = 16 * 1024 * 1024;
pub const MAX_COLLECTION_LENGTH: u64 = 1024 * 1024;
