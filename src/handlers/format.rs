use std::fmt::Write;

use crate::entry::EntryKind;
use crate::entry::ExceptionData;
use crate::entry::LogRecord;

const INDENT: &str = "| ";

/// Renders records as human-readable lines for the text outputs.
///
/// ```text
/// 2024-05-17 10:30:00.0000000 Info  [source] | > Opening group [Sql]
/// 2024-05-17 10:30:01.0000000 Info  [source] | < Rows: 12
/// ```
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    /// Omit the source column
    pub hide_source: bool,
}

impl TextFormatter {
    pub fn format(
        &self,
        record: &LogRecord,
    ) -> String {
        let mut out = String::with_capacity(96);
        let _ = write!(out, "{} {:<5} ", record.time, record.level.as_str());
        if !self.hide_source && !record.source_id.is_empty() {
            let _ = write!(out, "[{}] ", record.source_id);
        }
        let indent = INDENT.repeat(record.depth as usize);
        out.push_str(&indent);

        match record.kind {
            EntryKind::Line => out.push_str(record.text_or_empty()),
            EntryKind::OpenGroup => {
                out.push_str("> ");
                out.push_str(record.text_or_empty());
            }
            EntryKind::CloseGroup => {
                out.push('<');
                for (i, c) in record.conclusions.iter().enumerate() {
                    out.push_str(if i == 0 { " " } else { ", " });
                    if c.tag.is_empty() {
                        out.push_str(&c.text);
                    } else {
                        let _ = write!(out, "{}: {}", c.tag, c.text);
                    }
                }
            }
        }
        if !record.tags.is_empty() {
            let _ = write!(out, " [{}]", record.tags);
        }
        if let Some(file) = &record.file_name {
            let _ = write!(out, " ({}:{})", file, record.line_number);
        }
        out.push('\n');

        if let Some(exception) = &record.exception {
            format_exception(&mut out, exception, &indent, 1);
        }
        out
    }
}

fn format_exception(
    out: &mut String,
    exception: &ExceptionData,
    indent: &str,
    level: usize,
) {
    let pad = format!("{indent}{}", "  ".repeat(level));
    let _ = writeln!(out, "{pad}! {}: {}", exception.type_name, exception.message);
    if let Some(stack) = &exception.stack_trace {
        for line in stack.lines() {
            let _ = writeln!(out, "{pad}  {}", line.trim_end());
        }
    }
    if let Some(detail) = &exception.detail_info {
        let _ = writeln!(out, "{pad}  {detail}");
    }
    if let Some(inner) = &exception.inner {
        format_exception(out, inner, indent, level + 1);
    }
    for aggregated in &exception.aggregated {
        format_exception(out, aggregated, indent, level + 1);
    }
}
