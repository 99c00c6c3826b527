//! Text renderer
//!
//! Stateless per-event transform over the reader's ordered sequence:
//! - open markers print nothing
//! - close markers print `END`
//! - TEXT / DATA print the message, every line behind the writer's margin
//! - LIST prints one `* <key> : <value>` line per entry, keys sorted and padded
//!   to the longest key
//!
//! A LIST that cannot be decoded becomes a `!!` diagnostic line and the dump
//! goes on; any other error stops it.

use std::collections::BTreeMap;
use std::io::Write;

use tracing::{debug, warn};

use crate::config::RenderConfig;
use crate::error::{Result, TraceError};
use crate::model::{Entry, Payload};
use crate::reader::{Reader, TraceView};

/// Literal line printed for a close marker
pub const END_MARKER: &str = "END";

/// Counters of one dump
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DumpStats {
    pub tracers: usize,
    /// Printed lines (one per non-open event, diagnostics included)
    pub lines: usize,
    pub malformed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct TextRenderer {
    config: RenderConfig,
}

impl TextRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Assemble the printed text of one event, `None` for open markers
    pub fn render(&self, view: &TraceView) -> Result<Option<String>> {
        let margin = view.margin(&self.config.indent);
        let body = match &view.record.entry {
            Entry::Open => return Ok(None),
            Entry::Close => END_MARKER.to_string(),
            Entry::Message { kind, body } => {
                match Payload::decode(*kind, body, view.record.id)? {
                    Payload::Text(text) | Payload::Data(text) => indent_lines(&text, &margin),
                    Payload::List(entries) => indent_lines(&format_list(&entries), &margin),
                }
            }
        };
        Ok(Some(self.assemble(view, &margin, &body)))
    }

    /// Render every tracer of the reader into `out`
    pub fn dump(&self, reader: &Reader<'_>, out: &mut dyn Write) -> Result<DumpStats> {
        let mut stats = DumpStats::default();

        for tracer in reader.tracers() {
            let tracer = tracer?;
            stats.tracers += 1;

            for view in reader.traces(tracer.id) {
                let view = view?;
                let line = match self.render(&view) {
                    Ok(Some(line)) => line,
                    Ok(None) => continue,
                    Err(e) if !e.is_fatal() => {
                        warn!(trace = view.record.id.0, error = %e, "Skipping undecodable event");
                        stats.malformed += 1;
                        self.diagnostic(&view, &e)
                    }
                    Err(e) => return Err(e),
                };
                writeln!(out, "{}", line)?;
                stats.lines += 1;
            }
        }

        out.flush()?;
        debug!(
            tracers = stats.tracers,
            lines = stats.lines,
            malformed = stats.malformed,
            "Dump complete"
        );
        Ok(stats)
    }

    /// Line printed in place of an event that cannot be rendered
    fn diagnostic(&self, view: &TraceView, error: &TraceError) -> String {
        let margin = view.margin(&self.config.indent);
        let details = match error {
            TraceError::MalformedPayload { details, .. } => details.clone(),
            other => other.to_string(),
        };
        let body = format!(
            "!! malformed LIST payload in trace #{}: {}",
            view.record.id.0, details
        );
        self.assemble(view, &margin, &body)
    }

    fn assemble(&self, view: &TraceView, margin: &str, body: &str) -> String {
        if self.config.timestamps {
            format!("[{}] {}{}", view.record.timestamp, margin, body)
        } else {
            format!("{}{}", margin, body)
        }
    }
}

/// Prefix every line but the first with `margin`
///
/// The first line's margin is added by the caller, after the optional
/// timestamp prefix.
pub fn indent_lines(text: &str, margin: &str) -> String {
    if !text.contains('\n') {
        return text.to_string();
    }
    text.split('\n')
        .collect::<Vec<_>>()
        .join(&format!("\n{}", margin))
}

/// `* <key> : <value>` lines, keys sorted and right-padded to the longest one
pub fn format_list(entries: &BTreeMap<String, String>) -> String {
    let width = entries.keys().map(|k| k.chars().count()).max().unwrap_or(0);
    entries
        .iter()
        .map(|(key, value)| format!("* {:<width$}: {}", key, value, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessageType, TraceId, TraceRecord, TracerId, WriterId};

    fn view(entry: Entry, depth: u32) -> TraceView {
        TraceView {
            record: TraceRecord {
                id: TraceId(5),
                tracer: TracerId(1),
                writer: WriterId(2),
                timestamp: "2024-03-01 10:00:00.000".to_string(),
                entry,
                depth: Some(depth),
            },
            depth,
        }
    }

    fn message(kind: MessageType, body: &str, depth: u32) -> TraceView {
        view(
            Entry::Message {
                kind,
                body: body.to_string(),
            },
            depth,
        )
    }

    fn tabs() -> TextRenderer {
        TextRenderer::new(RenderConfig {
            indent: "\t".to_string(),
            timestamps: false,
        })
    }

    #[test]
    fn open_marker_is_skipped() {
        assert_eq!(tabs().render(&view(Entry::Open, 2)).unwrap(), None);
    }

    #[test]
    fn close_marker_prints_end_behind_margin() {
        assert_eq!(
            tabs().render(&view(Entry::Close, 2)).unwrap().as_deref(),
            Some("\t\tEND")
        );
    }

    #[test]
    fn single_line_text() {
        let line = tabs()
            .render(&message(MessageType::Text, "Call fib(2)", 1))
            .unwrap();
        assert_eq!(line.as_deref(), Some("\tCall fib(2)"));
    }

    #[test]
    fn multi_line_data_gets_margin_on_every_line() {
        let line = tabs()
            .render(&message(MessageType::Data, "v = [\n    1,\n]", 2))
            .unwrap();
        assert_eq!(line.as_deref(), Some("\t\tv = [\n\t\t    1,\n\t\t]"));
    }

    #[test]
    fn list_keys_are_sorted_and_padded() {
        let line = tabs()
            .render(&message(MessageType::List, r#"{"k20":"9","k1":"4"}"#, 1))
            .unwrap();
        assert_eq!(line.as_deref(), Some("\t* k1 : 4\n\t* k20: 9"));
    }

    #[test]
    fn list_padding_counts_characters() {
        let entries: BTreeMap<String, String> =
            [("é", "1"), ("ab", "2")].iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        assert_eq!(format_list(&entries), "* ab: 2\n* é : 1");
    }

    #[test]
    fn empty_list_renders_margin_only() {
        let line = tabs().render(&message(MessageType::List, "{}", 1)).unwrap();
        assert_eq!(line.as_deref(), Some("\t"));
    }

    #[test]
    fn malformed_list_is_an_error() {
        let err = tabs()
            .render(&message(MessageType::List, "[1, 2]", 0))
            .unwrap_err();
        assert!(matches!(err, TraceError::MalformedPayload { trace: 5, .. }));
    }

    #[test]
    fn timestamp_prefix_comes_before_margin() {
        let renderer = TextRenderer::new(RenderConfig {
            indent: " ".to_string(),
            timestamps: true,
        });
        let line = renderer
            .render(&message(MessageType::Text, "a\nb", 1))
            .unwrap();
        assert_eq!(
            line.as_deref(),
            Some("[2024-03-01 10:00:00.000]  a\n b")
        );
    }

    #[test]
    fn diagnostic_line_format() {
        let v = message(MessageType::List, "nope", 1);
        let err = tabs().render(&v).unwrap_err();
        let line = tabs().diagnostic(&v, &err);
        assert!(line.starts_with("\t!! malformed LIST payload in trace #5: "));
    }

    #[test]
    fn indent_lines_leaves_first_line_bare() {
        assert_eq!(indent_lines("one", ".."), "one");
        assert_eq!(indent_lines("one\ntwo\n", ".."), "one\n..two\n..");
    }
}
