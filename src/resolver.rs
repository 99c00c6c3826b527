//! Hierarchy resolver
//!
//! Writers never record their parent. The parent of a writer is the nearest
//! writer whose [open, close] interval encloses its open marker, and its depth
//! is the parent's depth + 1 (roots are 0).
//!
//! Per tracer:
//! 1. one sweep over the events collects each writer's open/close ids and
//!    checks marker placement
//! 2. writers sorted by open id go through a stack of enclosing intervals;
//!    intervals that ended before the current open are popped, the top is the
//!    parent, and an interval that outlives its parent is a partial overlap
//! 3. depths are committed in one batch, only if the whole tracer resolved

use std::collections::BTreeMap;

use tracing::debug;

use crate::container::LogContainer;
use crate::error::{Result, TraceError};
use crate::model::{Entry, TraceId, TracerId, WriterId};

/// Resolved position of one writer in its call tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Node {
    pub parent: Option<WriterId>,
    pub depth: u32,
}

/// Call tree of one tracer
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub tracer: TracerId,
    pub nodes: BTreeMap<WriterId, Node>,
}

impl Resolution {
    pub fn depth_of(&self, writer: WriterId) -> Option<u32> {
        self.nodes.get(&writer).map(|n| n.depth)
    }

    pub fn parent_of(&self, writer: WriterId) -> Option<WriterId> {
        self.nodes.get(&writer).and_then(|n| n.parent)
    }

    pub fn max_depth(&self) -> Option<u32> {
        self.nodes.values().map(|n| n.depth).max()
    }

    pub fn roots(&self) -> impl Iterator<Item = WriterId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(id, _)| *id)
    }
}

/// Totals over every resolved tracer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveSummary {
    pub tracers: usize,
    pub writers: usize,
    pub max_depth: Option<u32>,
}

#[derive(Debug, Default)]
struct Span {
    open: Option<TraceId>,
    close: Option<TraceId>,
}

pub struct Resolver<'c> {
    container: &'c dyn LogContainer,
}

impl<'c> Resolver<'c> {
    pub fn new(container: &'c dyn LogContainer) -> Self {
        Self { container }
    }

    /// Compute parents and depths of one tracer without storing them
    pub fn resolve_tracer(&self, tracer: TracerId) -> Result<Resolution> {
        let spans = self.collect_spans(tracer)?;

        let mut ordered = Vec::with_capacity(spans.len());
        for (writer, span) in spans {
            let Some(open) = span.open else {
                return Err(broken(tracer, writer, "no open marker"));
            };
            let Some(close) = span.close else {
                return Err(broken(tracer, writer, "open marker without close marker"));
            };
            ordered.push((open.0, close.0, writer));
        }
        ordered.sort_unstable();

        let mut nodes: BTreeMap<WriterId, Node> = BTreeMap::new();
        // (writer, close id) of the intervals enclosing the current open marker
        let mut stack: Vec<(WriterId, u64)> = Vec::new();

        for (open, close, writer) in ordered {
            while let Some(&(_, top_close)) = stack.last() {
                if top_close < open {
                    stack.pop();
                } else {
                    break;
                }
            }

            let node = match stack.last() {
                Some(&(parent, parent_close)) => {
                    if close > parent_close {
                        return Err(broken(
                            tracer,
                            writer,
                            &format!(
                                "interval partially overlaps writer #{} (closed after its enclosing scope)",
                                parent.0
                            ),
                        ));
                    }
                    let parent_depth = nodes.get(&parent).map(|n| n.depth).unwrap_or(0);
                    Node {
                        parent: Some(parent),
                        depth: parent_depth + 1,
                    }
                }
                None => Node {
                    parent: None,
                    depth: 0,
                },
            };

            nodes.insert(writer, node);
            stack.push((writer, close));
        }

        debug!(tracer = tracer.0, writers = nodes.len(), "Resolved tracer");
        Ok(Resolution { tracer, nodes })
    }

    /// Store the depths of a resolution
    pub fn commit(&self, resolution: &Resolution) -> Result<()> {
        let depths: Vec<(WriterId, u32)> = resolution
            .nodes
            .iter()
            .map(|(id, node)| (*id, node.depth))
            .collect();
        self.container.set_depths(&depths)?;
        debug!(
            tracer = resolution.tracer.0,
            writers = depths.len(),
            "Committed depths"
        );
        Ok(())
    }

    /// Resolve and commit every tracer, stopping at the first failure
    pub fn resolve_all(&self) -> Result<ResolveSummary> {
        self.sweep(true)
    }

    /// Resolve every tracer without writing anything back
    pub fn check_all(&self) -> Result<ResolveSummary> {
        self.sweep(false)
    }

    fn sweep(&self, commit: bool) -> Result<ResolveSummary> {
        let mut summary = ResolveSummary::default();
        for tracer in self.container.tracers() {
            let tracer = tracer?;
            let resolution = self.resolve_tracer(tracer.id)?;
            if commit {
                self.commit(&resolution)?;
            }

            summary.tracers += 1;
            summary.writers += resolution.nodes.len();
            summary.max_depth = summary.max_depth.max(resolution.max_depth());
        }
        Ok(summary)
    }

    /// One pass over the events: open/close ids per writer, marker placement checks
    fn collect_spans(&self, tracer: TracerId) -> Result<BTreeMap<WriterId, Span>> {
        let mut spans: BTreeMap<WriterId, Span> = BTreeMap::new();

        for writer in self.container.writers(tracer) {
            spans.entry(writer?.id).or_default();
        }

        for record in self.container.traces(tracer) {
            let record = record?;
            let span = spans.entry(record.writer).or_default();
            match record.entry {
                Entry::Open => {
                    if span.open.is_some() {
                        return Err(broken(tracer, record.writer, "duplicate open marker"));
                    }
                    span.open = Some(record.id);
                }
                Entry::Close => {
                    if span.open.is_none() {
                        return Err(broken(tracer, record.writer, "close marker without open marker"));
                    }
                    if span.close.is_some() {
                        return Err(broken(tracer, record.writer, "duplicate close marker"));
                    }
                    span.close = Some(record.id);
                }
                Entry::Message { .. } => {
                    if span.open.is_none() {
                        return Err(broken(tracer, record.writer, "message before open marker"));
                    }
                    if span.close.is_some() {
                        return Err(broken(tracer, record.writer, "message after close marker"));
                    }
                }
            }
        }

        Ok(spans)
    }
}

fn broken(tracer: TracerId, writer: WriterId, reason: &str) -> TraceError {
    TraceError::BrokenInvariant {
        tracer: tracer.0,
        writer: writer.0,
        reason: reason.to_string(),
    }
}
