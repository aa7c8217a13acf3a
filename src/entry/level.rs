use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Severity of an entry. Values are single bits so that they fit in the low
/// six bits of the codec's level byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 1,
    Trace = 2,
    #[default]
    Info = 4,
    Warn = 8,
    Error = 16,
    Fatal = 32,
}

impl LogLevel {
    pub const MASK: u8 = 0x3F;

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(LogLevel::Debug),
            2 => Some(LogLevel::Trace),
            4 => Some(LogLevel::Info),
            8 => Some(LogLevel::Warn),
            16 => Some(LogLevel::Error),
            32 => Some(LogLevel::Fatal),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "Debug",
            LogLevel::Trace => "Trace",
            LogLevel::Info => "Info",
            LogLevel::Warn => "Warn",
            LogLevel::Error => "Error",
            LogLevel::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shape of an entry inside its source's group structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryKind {
    #[default]
    Line = 1,
    OpenGroup = 2,
    CloseGroup = 3,
}

impl EntryKind {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EntryKind::Line),
            2 => Some(EntryKind::OpenGroup),
            3 => Some(EntryKind::CloseGroup),
            _ => None,
        }
    }
}

/// Minimal level a line or group must have to be emitted.
///
/// `None` accepts everything, `Off` rejects everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelFilter {
    #[default]
    None,
    Debug,
    Trace,
    Info,
    Warn,
    Error,
    Fatal,
    Off,
}

impl LevelFilter {
    pub fn accepts(
        self,
        level: LogLevel,
    ) -> bool {
        match self {
            LevelFilter::None => true,
            LevelFilter::Off => false,
            LevelFilter::Debug => level >= LogLevel::Debug,
            LevelFilter::Trace => level >= LogLevel::Trace,
            LevelFilter::Info => level >= LogLevel::Info,
            LevelFilter::Warn => level >= LogLevel::Warn,
            LevelFilter::Error => level >= LogLevel::Error,
            LevelFilter::Fatal => level >= LogLevel::Fatal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LevelFilter::None => "None",
            LevelFilter::Debug => "Debug",
            LevelFilter::Trace => "Trace",
            LevelFilter::Info => "Info",
            LevelFilter::Warn => "Warn",
            LevelFilter::Error => "Error",
            LevelFilter::Fatal => "Fatal",
            LevelFilter::Off => "Off",
        }
    }
}

impl Serialize for LevelFilter {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// Case-insensitive, so that `CKMON__...=warn` works as well as `Warn`.
impl<'de> Deserialize<'de> for LevelFilter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

impl FromStr for LevelFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "undefined" => Ok(LevelFilter::None),
            "debug" => Ok(LevelFilter::Debug),
            "trace" => Ok(LevelFilter::Trace),
            "info" => Ok(LevelFilter::Info),
            "warn" => Ok(LevelFilter::Warn),
            "error" => Ok(LevelFilter::Error),
            "fatal" => Ok(LevelFilter::Fatal),
            "off" => Ok(LevelFilter::Off),
            other => Err(format!("unknown level filter '{other}'")),
        }
    }
}

/// Group and line filters applied together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LogFilter {
    #[serde(default)]
    pub group: LevelFilter,
    #[serde(default)]
    pub line: LevelFilter,
}

impl LogFilter {
    pub const ALL: LogFilter = LogFilter {
        group: LevelFilter::None,
        line: LevelFilter::None,
    };

    pub fn new(
        group: LevelFilter,
        line: LevelFilter,
    ) -> Self {
        Self { group, line }
    }
}
