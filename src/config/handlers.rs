//! Handler configuration values and the name convention used to resolve a
//! configuration section to a handler kind.
//!
//! A section names its handler through `type` (or `handler`, which wins
//! when both are present). The name is matched case-insensitively after
//! stripping a trailing `Configuration`; a path-qualified name such as
//! `CK.Monitoring.TextFile` or `ckmon::handlers::TextFile` falls back to its
//! last segment.
//!
//! ```toml
//! [[dispatcher.handlers]]
//! type = "TextFileConfiguration"
//! path = "Text"
//! max_count_per_file = 10000
//! ```

use std::fmt;

use serde::de::Error as DeError;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use super::BackoffPolicy;
use crate::Error;
use crate::Result;

const CONFIGURATION_SUFFIX: &str = "Configuration";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    BinaryFile,
    TextFile,
    Console,
    TcpSender,
    Memory,
}

impl HandlerKind {
    pub const ALL: [HandlerKind; 5] = [
        HandlerKind::BinaryFile,
        HandlerKind::TextFile,
        HandlerKind::Console,
        HandlerKind::TcpSender,
        HandlerKind::Memory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HandlerKind::BinaryFile => "BinaryFile",
            HandlerKind::TextFile => "TextFile",
            HandlerKind::Console => "Console",
            HandlerKind::TcpSender => "TcpSender",
            HandlerKind::Memory => "Memory",
        }
    }

    fn by_simple_name(name: &str) -> Option<HandlerKind> {
        Self::ALL.into_iter().find(|k| k.name().eq_ignore_ascii_case(name))
    }

    /// Resolves a configured handler name.
    pub fn resolve(name: &str) -> Option<HandlerKind> {
        let name = strip_configuration_suffix(name.trim());
        Self::by_simple_name(name).or_else(|| {
            let last = name.rsplit(['.', ':']).next()?;
            Self::by_simple_name(strip_configuration_suffix(last))
        })
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn strip_configuration_suffix(name: &str) -> &str {
    let cut = name.len().saturating_sub(CONFIGURATION_SUFFIX.len());
    match name.get(cut..) {
        Some(tail) if cut > 0 && tail.eq_ignore_ascii_case(CONFIGURATION_SUFFIX) => &name[..cut],
        _ => name,
    }
}

/// Parameters shared by the binary and text file handlers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FileConfig {
    /// Folder relative to the log root; identifies the handler
    pub path: String,

    /// Entries per file before rotating
    ///
    /// Default: 20000
    #[serde(default = "default_max_count_per_file")]
    pub max_count_per_file: u32,

    /// Compress closed files with gzip
    #[serde(default)]
    pub use_gzip_compression: bool,

    /// Timer ticks between two housekeeping passes
    ///
    /// Default: 1800 (15 minutes with the default 500ms timer)
    #[serde(default = "default_housekeeping_rate")]
    pub housekeeping_rate: u32,

    /// Files younger than this are never deleted
    ///
    /// Default: 60
    #[serde(default = "default_minimum_days_to_keep")]
    pub minimum_days_to_keep: u32,

    /// Total size above which old files are deleted (0 disables deletion)
    ///
    /// Default: 100000 (about 100 MB)
    #[serde(default = "default_maximum_total_kb_to_keep")]
    pub maximum_total_kb_to_keep: u64,
}

fn default_max_count_per_file() -> u32 {
    20_000
}
fn default_housekeeping_rate() -> u32 {
    1_800
}
fn default_minimum_days_to_keep() -> u32 {
    60
}
fn default_maximum_total_kb_to_keep() -> u64 {
    100_000
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            max_count_per_file: default_max_count_per_file(),
            use_gzip_compression: false,
            housekeeping_rate: default_housekeeping_rate(),
            minimum_days_to_keep: default_minimum_days_to_keep(),
            maximum_total_kb_to_keep: default_maximum_total_kb_to_keep(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(Error::InvalidConfig("file handler path cannot be empty".into()));
        }
        if self.max_count_per_file == 0 {
            return Err(Error::InvalidConfig(format!(
                "file handler '{}': max_count_per_file must be greater than 0",
                self.path
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Write to stderr instead of stdout
    #[serde(default)]
    pub use_stderr: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TcpSenderConfig {
    /// `host:port` of the collector; identifies the handler
    pub address: String,

    /// Buffer size while the sink is not ready yet
    ///
    /// Default: 2048
    #[serde(default = "default_initial_buffer_size")]
    pub initial_buffer_size: usize,

    /// Buffer size once entries flow
    ///
    /// Default: 256
    #[serde(default = "default_steady_buffer_size")]
    pub steady_buffer_size: usize,

    #[serde(default)]
    pub backoff: BackoffPolicy,
}

fn default_initial_buffer_size() -> usize {
    2048
}
fn default_steady_buffer_size() -> usize {
    256
}

impl TcpSenderConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            initial_buffer_size: default_initial_buffer_size(),
            steady_buffer_size: default_steady_buffer_size(),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    /// Name of the shared collector; identifies the handler
    pub name: String,

    /// Oldest entries are evicted beyond this count (0 keeps everything)
    #[serde(default)]
    pub max_entries: usize,
}

impl MemoryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_entries: 0,
        }
    }
}

/// Configuration of one output handler.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum HandlerConfig {
    BinaryFile(FileConfig),
    TextFile(FileConfig),
    Console(ConsoleConfig),
    TcpSender(TcpSenderConfig),
    Memory(MemoryConfig),
}

impl HandlerConfig {
    pub fn kind(&self) -> HandlerKind {
        match self {
            HandlerConfig::BinaryFile(_) => HandlerKind::BinaryFile,
            HandlerConfig::TextFile(_) => HandlerKind::TextFile,
            HandlerConfig::Console(_) => HandlerKind::Console,
            HandlerConfig::TcpSender(_) => HandlerKind::TcpSender,
            HandlerConfig::Memory(_) => HandlerKind::Memory,
        }
    }

    /// Value identifying "the same handler" across configurations.
    pub fn key(&self) -> &str {
        match self {
            HandlerConfig::BinaryFile(c) | HandlerConfig::TextFile(c) => &c.path,
            HandlerConfig::Console(c) => {
                if c.use_stderr {
                    "stderr"
                } else {
                    "stdout"
                }
            }
            HandlerConfig::TcpSender(c) => &c.address,
            HandlerConfig::Memory(c) => &c.name,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            HandlerConfig::BinaryFile(c) | HandlerConfig::TextFile(c) => c.validate(),
            HandlerConfig::Console(_) => Ok(()),
            HandlerConfig::TcpSender(c) => {
                if c.address.trim().is_empty() {
                    return Err(Error::InvalidConfig("tcp sender address cannot be empty".into()));
                }
                if c.steady_buffer_size == 0 || c.initial_buffer_size == 0 {
                    return Err(Error::InvalidConfig(format!(
                        "tcp sender '{}': buffer sizes must be greater than 0",
                        c.address
                    )));
                }
                c.backoff.validate()
            }
            HandlerConfig::Memory(c) => {
                if c.name.trim().is_empty() {
                    return Err(Error::InvalidConfig("memory collector name cannot be empty".into()));
                }
                Ok(())
            }
        }
    }

    fn from_params(
        kind: HandlerKind,
        params: serde_json::Value,
    ) -> serde_json::Result<Self> {
        Ok(match kind {
            HandlerKind::BinaryFile => HandlerConfig::BinaryFile(serde_json::from_value(params)?),
            HandlerKind::TextFile => HandlerConfig::TextFile(serde_json::from_value(params)?),
            HandlerKind::Console => HandlerConfig::Console(serde_json::from_value(params)?),
            HandlerKind::TcpSender => HandlerConfig::TcpSender(serde_json::from_value(params)?),
            HandlerKind::Memory => HandlerConfig::Memory(serde_json::from_value(params)?),
        })
    }
}

#[derive(Deserialize)]
struct RawHandlerConfig {
    #[serde(rename = "type", default)]
    type_name: Option<String>,
    #[serde(default)]
    handler: Option<String>,
    #[serde(flatten)]
    params: serde_json::Map<String, serde_json::Value>,
}

impl<'de> Deserialize<'de> for HandlerConfig {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawHandlerConfig::deserialize(deserializer)?;
        let name = raw
            .handler
            .or(raw.type_name)
            .ok_or_else(|| D::Error::custom("handler configuration needs a `type` or `handler` property"))?;
        let kind = HandlerKind::resolve(&name)
            .ok_or_else(|| D::Error::custom(format!("unknown handler type '{name}'")))?;
        HandlerConfig::from_params(kind, serde_json::Value::Object(raw.params))
            .map_err(|e| D::Error::custom(format!("invalid {kind} configuration: {e}")))
    }
}
