//! Log containers (append-only event store)
//!
//! A container is the only shared resource: instrumented code appends to it,
//! the resolver writes depths back once, and the reader replays it in id order.
//!
//! - `LogContainer`: storage contract, object safe
//! - `Cursor`: lazy, paged, single-pass sequence over a container
//! - `MemoryContainer` / `SqliteContainer`: the two backends

use std::collections::VecDeque;

use crate::error::Result;
use crate::model::{
    Payload, TraceId, TraceRecord, TracerId, TracerRecord, WriterId, WriterRecord,
};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryContainer;
pub use sqlite::SqliteContainer;

/// Rows fetched per round-trip by the cursors
pub const PAGE_SIZE: usize = 256;

/// Storage contract for tracers, writers and trace events
///
/// Ids increase in allocation order. Every `fetch_*` returns rows with an id
/// strictly greater than `after`, ascending, at most `limit` of them.
pub trait LogContainer {
    /// Allocate a new tracer (one execution session)
    fn open_tracer(&self) -> Result<TracerId>;

    /// Allocate a writer under `tracer` and append its open marker
    fn open_writer(&self, tracer: TracerId) -> Result<WriterId>;

    /// Append the close marker of `writer`
    fn close_writer(&self, writer: WriterId) -> Result<()>;

    /// Append a message under an open writer
    fn append(&self, writer: WriterId, payload: &Payload) -> Result<TraceId>;

    /// Store the resolved depth of a writer
    fn set_depth(&self, writer: WriterId, depth: u32) -> Result<()>;

    /// Store several depths at once
    ///
    /// Backends that support transactions commit all or nothing.
    fn set_depths(&self, depths: &[(WriterId, u32)]) -> Result<()> {
        for &(writer, depth) in depths {
            self.set_depth(writer, depth)?;
        }
        Ok(())
    }

    fn fetch_tracers(&self, after: Option<TracerId>, limit: usize) -> Result<Vec<TracerRecord>>;

    fn fetch_writers(
        &self,
        tracer: TracerId,
        after: Option<WriterId>,
        limit: usize,
    ) -> Result<Vec<WriterRecord>>;

    /// Events of every writer of `tracer`, interleaved in global id order
    fn fetch_traces(
        &self,
        tracer: TracerId,
        after: Option<TraceId>,
        limit: usize,
    ) -> Result<Vec<TraceRecord>>;

    /// All tracers, ascending id
    fn tracers(&self) -> Cursor<'_, TracerRecord> {
        Cursor::new(PAGE_SIZE, move |after, limit| self.fetch_tracers(after, limit))
    }

    /// Writers of one tracer, ascending id
    fn writers(&self, tracer: TracerId) -> Cursor<'_, WriterRecord> {
        Cursor::new(PAGE_SIZE, move |after, limit| {
            self.fetch_writers(tracer, after, limit)
        })
    }

    /// Events of one tracer, ascending id
    fn traces(&self, tracer: TracerId) -> Cursor<'_, TraceRecord> {
        Cursor::new(PAGE_SIZE, move |after, limit| {
            self.fetch_traces(tracer, after, limit)
        })
    }
}

/// Record with an ordering key usable for keyset paging
pub trait Sequenced {
    type Key: Copy;

    fn key(&self) -> Self::Key;
}

impl Sequenced for TracerRecord {
    type Key = TracerId;

    fn key(&self) -> TracerId {
        self.id
    }
}

impl Sequenced for WriterRecord {
    type Key = WriterId;

    fn key(&self) -> WriterId {
        self.id
    }
}

impl Sequenced for TraceRecord {
    type Key = TraceId;

    fn key(&self) -> TraceId {
        self.id
    }
}

type FetchFn<'c, T> = Box<dyn FnMut(Option<<T as Sequenced>::Key>, usize) -> Result<Vec<T>> + 'c>;

/// Lazy forward-only sequence fetched page by page
///
/// Single pass: once exhausted (or after yielding an error) it stays empty.
/// Ask the container for a new cursor to start over.
pub struct Cursor<'c, T: Sequenced> {
    fetch: FetchFn<'c, T>,
    page: VecDeque<T>,
    last: Option<T::Key>,
    page_size: usize,
    done: bool,
}

impl<'c, T: Sequenced> Cursor<'c, T> {
    pub fn new<F>(page_size: usize, fetch: F) -> Self
    where
        F: FnMut(Option<T::Key>, usize) -> Result<Vec<T>> + 'c,
    {
        Self {
            fetch: Box::new(fetch),
            page: VecDeque::new(),
            last: None,
            page_size: page_size.max(1),
            done: false,
        }
    }
}

impl<T: Sequenced> Iterator for Cursor<'_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.page.pop_front() {
            return Some(Ok(item));
        }
        if self.done {
            return None;
        }

        match (self.fetch)(self.last, self.page_size) {
            Ok(rows) => {
                if rows.len() < self.page_size {
                    self.done = true;
                }
                if let Some(last) = rows.last() {
                    self.last = Some(last.key());
                }
                self.page.extend(rows);
                self.page.pop_front().map(Ok)
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<T: Sequenced> std::fmt::Debug for Cursor<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("buffered", &self.page.len())
            .field("page_size", &self.page_size)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TraceError;
    use std::cell::Cell;

    fn numbers(n: u64) -> Vec<TracerRecord> {
        (1..=n).map(|i| TracerRecord { id: TracerId(i) }).collect()
    }

    #[test]
    fn cursor_pages_through_all_rows() {
        let rows = numbers(10);
        let calls = Cell::new(0);
        let cursor = Cursor::new(3, |after: Option<TracerId>, limit| {
            calls.set(calls.get() + 1);
            let start = after.map(|id| id.0).unwrap_or(0);
            Ok(rows
                .iter()
                .filter(|r| r.id.0 > start)
                .take(limit)
                .cloned()
                .collect())
        });

        let ids: Vec<u64> = cursor.map(|r| r.unwrap().id.0).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        // 3 + 3 + 3 + 1 (short page ends the cursor)
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn cursor_is_lazy() {
        let calls = Cell::new(0);
        let mut cursor = Cursor::new(2, |_after: Option<TracerId>, _limit| {
            calls.set(calls.get() + 1);
            Ok(numbers(2))
        });
        assert_eq!(calls.get(), 0);
        cursor.next();
        assert_eq!(calls.get(), 1);
        cursor.next();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn cursor_stops_after_error() {
        let mut cursor = Cursor::new(2, |_after: Option<TracerId>, _limit| {
            Err::<Vec<TracerRecord>, _>(TraceError::TracerNotFound { id: 1 })
        });
        assert!(matches!(cursor.next(), Some(Err(_))));
        assert!(cursor.next().is_none());
    }

    #[test]
    fn empty_source_yields_nothing() {
        let mut cursor = Cursor::new(PAGE_SIZE, |_after: Option<TracerId>, _limit| {
            Ok(Vec::<TracerRecord>::new())
        });
        assert!(cursor.next().is_none());
    }
}
