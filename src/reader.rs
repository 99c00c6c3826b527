//! Trace reader
//!
//! Replays a resolved container: tracers in ascending id, and for each tracer
//! its events in global id order (interleaved across writers exactly as they
//! were written), each one carrying the depth of its writer.

use crate::container::{Cursor, LogContainer};
use crate::error::{Result, TraceError};
use crate::model::{TraceRecord, TracerId, TracerRecord, WriterRecord};
use crate::resolver::{ResolveSummary, Resolver};

/// One event plus the resolved depth of its writer
#[derive(Debug, Clone, PartialEq)]
pub struct TraceView {
    pub record: TraceRecord,
    pub depth: u32,
}

impl TraceView {
    pub fn is_open_marker(&self) -> bool {
        self.record.is_open()
    }

    pub fn is_close_marker(&self) -> bool {
        self.record.is_close()
    }

    /// Indentation unit repeated `depth` times
    pub fn margin(&self, unit: &str) -> String {
        unit.repeat(self.depth as usize)
    }
}

pub struct Reader<'c> {
    container: &'c dyn LogContainer,
    summary: ResolveSummary,
}

impl<'c> Reader<'c> {
    /// Resolve every tracer of the container, then expose it for reading
    pub fn new(container: &'c dyn LogContainer) -> Result<Self> {
        let summary = Resolver::new(container).resolve_all()?;
        Ok(Self { container, summary })
    }

    /// What the resolution pass found
    pub fn summary(&self) -> &ResolveSummary {
        &self.summary
    }

    pub fn tracers(&self) -> Cursor<'c, TracerRecord> {
        self.container.tracers()
    }

    pub fn writers(&self, tracer: TracerId) -> Cursor<'c, WriterRecord> {
        self.container.writers(tracer)
    }

    /// Events of one tracer; call again to restart from the beginning
    pub fn traces(&self, tracer: TracerId) -> TraceViews<'c> {
        TraceViews {
            inner: self.container.traces(tracer),
        }
    }
}

impl std::fmt::Debug for Reader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("summary", &self.summary)
            .finish()
    }
}

/// Lazy sequence of `TraceView`s over one tracer
#[derive(Debug)]
pub struct TraceViews<'c> {
    inner: Cursor<'c, TraceRecord>,
}

impl Iterator for TraceViews<'_> {
    type Item = Result<TraceView>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.inner.next()? {
            Ok(record) => record,
            Err(e) => return Some(Err(e)),
        };
        Some(match record.depth {
            Some(depth) => Ok(TraceView { record, depth }),
            None => Err(TraceError::Unresolved {
                writer: record.writer.0,
            }),
        })
    }
}
