use super::DateTimeStamp;
use super::EntryKind;
use super::ExceptionData;
use super::LogLevel;
use super::TagSet;

/// Tagged text attached to a group when it closes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Conclusion {
    pub tag: String,
    pub text: String,
}

impl Conclusion {
    pub fn new(
        tag: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
        }
    }
}

/// Kind and time of the entry emitted just before, by the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousEntry {
    pub kind: EntryKind,
    pub time: DateTimeStamp,
}

/// Cross-source enrichment: which pipeline forwarded the entry and what the
/// source emitted before it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MulticastInfo {
    pub pipeline_id: String,
    pub previous: Option<PreviousEntry>,
}

/// One unit of log data flowing through the pipeline.
///
/// `source_id` and `depth` are the local enrichment; `multicast` is set for
/// entries that may be merged with other sources.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LogRecord {
    pub kind: EntryKind,
    pub level: LogLevel,
    pub time: DateTimeStamp,
    pub text: Option<String>,
    pub tags: TagSet,
    pub exception: Option<ExceptionData>,
    pub file_name: Option<String>,
    pub line_number: i32,
    pub conclusions: Vec<Conclusion>,
    pub source_id: String,
    pub depth: u32,
    pub multicast: Option<MulticastInfo>,
}

impl LogRecord {
    pub fn line(
        level: LogLevel,
        time: DateTimeStamp,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: EntryKind::Line,
            level,
            time,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn open_group(
        level: LogLevel,
        time: DateTimeStamp,
        text: impl Into<String>,
    ) -> Self {
        Self {
            kind: EntryKind::OpenGroup,
            level,
            time,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn close_group(
        level: LogLevel,
        time: DateTimeStamp,
        conclusions: Vec<Conclusion>,
    ) -> Self {
        Self {
            kind: EntryKind::CloseGroup,
            level,
            time,
            conclusions,
            ..Default::default()
        }
    }

    pub fn with_tags(
        mut self,
        tags: &str,
    ) -> Self {
        self.tags.extend_from_str(tags);
        self
    }

    pub fn with_exception(
        mut self,
        exception: ExceptionData,
    ) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_file(
        mut self,
        file_name: impl Into<String>,
        line_number: i32,
    ) -> Self {
        self.file_name = Some(file_name.into());
        self.line_number = line_number;
        self
    }

    pub fn with_source(
        mut self,
        source_id: impl Into<String>,
        depth: u32,
    ) -> Self {
        self.source_id = source_id.into();
        self.depth = depth;
        self
    }

    pub fn with_multicast(
        mut self,
        pipeline_id: impl Into<String>,
        previous: Option<PreviousEntry>,
    ) -> Self {
        self.multicast = Some(MulticastInfo {
            pipeline_id: pipeline_id.into(),
            previous,
        });
        self
    }

    pub fn is_multicast(&self) -> bool {
        self.multicast.is_some()
    }

    /// Text of the entry, or the empty string for group closings.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// Checks the kind-dependent invariants.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self.kind {
            EntryKind::CloseGroup => {
                if self.text.is_some() {
                    return Err("group closing cannot carry text");
                }
                if self.file_name.is_some() {
                    return Err("group closing cannot carry a file name");
                }
                if self.exception.is_some() {
                    return Err("group closing cannot carry an exception");
                }
            }
            EntryKind::Line | EntryKind::OpenGroup => {
                if self.text.is_none() {
                    return Err("lines and group openings must carry text");
                }
                if !self.conclusions.is_empty() {
                    return Err("only group closings carry conclusions");
                }
            }
        }
        Ok(())
    }

    /// Clears every field while keeping the allocated buffers that can be
    /// reused by the next owner.
    pub fn reset(&mut self) {
        self.kind = EntryKind::Line;
        self.level = LogLevel::Info;
        self.time = DateTimeStamp::MIN;
        self.text = None;
        self.tags.clear();
        self.exception = None;
        self.file_name = None;
        self.line_number = 0;
        self.conclusions.clear();
        self.source_id.clear();
        self.depth = 0;
        self.multicast = None;
    }

    /// Copies `other` into `self`, reusing buffers.
    pub fn assign(
        &mut self,
        other: &LogRecord,
    ) {
        self.kind = other.kind;
        self.level = other.level;
        self.time = other.time;
        self.text.clone_from(&other.text);
        self.tags.clone_from(&other.tags);
        self.exception.clone_from(&other.exception);
        self.file_name.clone_from(&other.file_name);
        self.line_number = other.line_number;
        self.conclusions.clone_from(&other.conclusions);
        self.source_id.clone_from(&other.source_id);
        self.depth = other.depth;
        self.multicast.clone_from(&other.multicast);
    }
}
