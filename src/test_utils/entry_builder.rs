use crate::entry::Conclusion;
use crate::entry::DateTimeStamp;
use crate::entry::LogLevel;
use crate::entry::LogRecord;

/// Produces records of one source with strictly increasing timestamps.
pub struct RecordBuilder {
    source_id: String,
    ticks: i64,
}

impl RecordBuilder {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            // 2024-01-01T00:00:00Z
            ticks: 638_396_640_000_000_000,
        }
    }

    fn next_time(&mut self) -> DateTimeStamp {
        self.ticks += 10_000;
        DateTimeStamp::new(self.ticks, 0)
    }

    pub fn line(
        &mut self,
        level: LogLevel,
        text: &str,
    ) -> LogRecord {
        let time = self.next_time();
        LogRecord::line(level, time, text).with_source(self.source_id.clone(), 0)
    }

    pub fn open_group(
        &mut self,
        text: &str,
    ) -> LogRecord {
        let time = self.next_time();
        LogRecord::open_group(LogLevel::Info, time, text).with_source(self.source_id.clone(), 0)
    }

    pub fn close_group(
        &mut self,
        conclusions: Vec<Conclusion>,
    ) -> LogRecord {
        let time = self.next_time();
        LogRecord::close_group(LogLevel::Info, time, conclusions).with_source(self.source_id.clone(), 0)
    }
}
