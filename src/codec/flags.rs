//! Bit layout of the two header bytes opening every record.
//!
//! Level byte: bits 0-5 carry the `LogLevel`, the two high bits are
//! auxiliary flags. A zero level byte is the end-of-stream marker.
//!
//! Flags byte: bits 0-1 carry the `EntryKind`, the remaining bits announce
//! optional sections.

use crate::entry::LogLevel;

pub const END_OF_STREAM: u8 = 0x00;

pub const LEVEL_TEXT_IS_EXCEPTION_MESSAGE: u8 = 0x40;
pub const LEVEL_PREVIOUS_KNOWN: u8 = 0x80;

pub const FLAG_KIND_MASK: u8 = 0x03;
pub const FLAG_HAS_TAGS: u8 = 0x04;
pub const FLAG_HAS_EXCEPTION: u8 = 0x08;
pub const FLAG_HAS_FILE: u8 = 0x10;
pub const FLAG_HAS_CONCLUSIONS: u8 = 0x20;
pub const FLAG_HAS_UNIQUIFIER: u8 = 0x40;
pub const FLAG_MULTICAST: u8 = 0x80;

/// Version byte of the exception payload.
pub const EXCEPTION_PAYLOAD_VERSION: u8 = 1;

/// Maximal nesting of inner/aggregated exceptions accepted by the decoder.
pub const MAX_EXCEPTION_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryHeader {
    pub level: u8,
    pub flags: u8,
}

impl EntryHeader {
    pub fn level_bits(&self) -> u8 {
        self.level & LogLevel::MASK
    }

    pub fn kind_bits(&self) -> u8 {
        self.flags & FLAG_KIND_MASK
    }

    pub fn has_level(
        &self,
        bit: u8,
    ) -> bool {
        self.level & bit != 0
    }

    pub fn has(
        &self,
        flag: u8,
    ) -> bool {
        self.flags & flag != 0
    }
}
