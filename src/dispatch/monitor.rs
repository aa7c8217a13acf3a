//! Producer bound to one source.
//!
//! A `SourceMonitor` numbers its entries (timestamps strictly increase),
//! tracks the group depth and the previous entry, consults the
//! [`FilterAuthority`](super::FilterAuthority) and sends multicast entries to
//! its dispatcher.

use std::error::Error as StdError;

use tracing::debug;

use super::Dispatcher;
use crate::entry::Conclusion;
use crate::entry::DateTimeStamp;
use crate::entry::EntryKind;
use crate::entry::ExceptionData;
use crate::entry::LogLevel;
use crate::entry::MulticastInfo;
use crate::entry::PreviousEntry;
use crate::entry::TagSet;

pub struct SourceMonitor {
    dispatcher: Dispatcher,
    source_id: String,
    /// One item per open group: its level when it was emitted, `None` when
    /// the filter rejected it.
    groups: Vec<Option<LogLevel>>,
    depth: u32,
    previous: Option<PreviousEntry>,
    last_time: DateTimeStamp,
}

impl SourceMonitor {
    pub fn new(
        dispatcher: Dispatcher,
        source_id: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            source_id: source_id.into(),
            groups: Vec::new(),
            depth: 0,
            previous: None,
            last_time: DateTimeStamp::MIN,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Number of emitted groups currently open.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn open_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn log(
        &mut self,
        level: LogLevel,
        text: &str,
    ) -> bool {
        self.log_with(level, "", text, None)
    }

    pub fn log_tagged(
        &mut self,
        level: LogLevel,
        tags: &str,
        text: &str,
    ) -> bool {
        self.log_with(level, tags, text, None)
    }

    pub fn log_error<E>(
        &mut self,
        level: LogLevel,
        text: &str,
        error: &E,
    ) -> bool
    where
        E: StdError + ?Sized,
    {
        self.log_with(level, "", text, Some(ExceptionData::from_error(error)))
    }

    /// Emits a line; `false` when filtered out or not accepted by the
    /// dispatcher.
    pub fn log_with(
        &mut self,
        level: LogLevel,
        tags: &str,
        text: &str,
        exception: Option<ExceptionData>,
    ) -> bool {
        let tags = TagSet::parse(tags);
        if !self.dispatcher.filter().should_log_line(level, &tags) {
            return false;
        }
        self.emit(EntryKind::Line, level, Some(text), tags, exception, Vec::new())
    }

    pub fn open_group(
        &mut self,
        level: LogLevel,
        text: &str,
    ) -> bool {
        self.open_group_tagged(level, "", text)
    }

    /// Opens a group. A rejected group is still tracked, so that the
    /// matching [`close_group`](Self::close_group) stays balanced.
    pub fn open_group_tagged(
        &mut self,
        level: LogLevel,
        tags: &str,
        text: &str,
    ) -> bool {
        let tags = TagSet::parse(tags);
        if !self.dispatcher.filter().should_open_group(level, &tags) {
            self.groups.push(None);
            return false;
        }
        let sent = self.emit(EntryKind::OpenGroup, level, Some(text), tags, None, Vec::new());
        self.groups.push(Some(level));
        self.depth += 1;
        sent
    }

    /// Closes the innermost open group.
    pub fn close_group(
        &mut self,
        conclusions: Vec<Conclusion>,
    ) -> bool {
        let level = match self.groups.pop() {
            Some(Some(level)) => level,
            Some(None) => return false,
            None => {
                debug!(source = %self.source_id, "close_group without an open group");
                return false;
            }
        };
        self.depth = self.depth.saturating_sub(1);
        self.emit(EntryKind::CloseGroup, level, None, TagSet::new(), None, conclusions)
    }

    fn emit(
        &mut self,
        kind: EntryKind,
        level: LogLevel,
        text: Option<&str>,
        tags: TagSet,
        exception: Option<ExceptionData>,
        conclusions: Vec<Conclusion>,
    ) -> bool {
        let time = DateTimeStamp::now().after(self.last_time);
        self.last_time = time;

        let mut entry = self.dispatcher.pool().acquire();
        entry.kind = kind;
        entry.level = level;
        entry.time = time;
        entry.text = text.map(str::to_string);
        entry.tags = tags;
        entry.exception = exception;
        entry.conclusions = conclusions;
        entry.source_id.push_str(&self.source_id);
        entry.depth = self.depth;
        entry.multicast = Some(MulticastInfo {
            pipeline_id: self.dispatcher.pipeline_id().to_string(),
            previous: self.previous,
        });

        self.previous = Some(PreviousEntry { kind, time });
        self.dispatcher.send(entry.freeze())
    }
}

impl std::fmt::Debug for SourceMonitor {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SourceMonitor")
            .field("source_id", &self.source_id)
            .field("depth", &self.depth)
            .field("open_groups", &self.groups.len())
            .finish()
    }
}
