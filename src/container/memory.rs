//! In-process log container
//!
//! Append-only vectors behind one lock. Ids start at 1 and follow insertion
//! order, like the SQLite container, so both backends replay identically.

use std::sync::Arc;

use parking_lot::RwLock;

use super::LogContainer;
use crate::error::{Result, TraceError};
use crate::model::{
    now_timestamp, Entry, Payload, TraceId, TraceRecord, TracerId, TracerRecord, WriterId,
    WriterRecord,
};

#[derive(Debug)]
struct WriterSlot {
    tracer: TracerId,
    depth: Option<u32>,
    closed: bool,
}

#[derive(Debug)]
struct StoredTrace {
    id: TraceId,
    writer: WriterId,
    timestamp: String,
    entry: Entry,
}

#[derive(Debug, Default)]
struct State {
    tracers: usize,
    /// Indexed by writer id - 1
    writers: Vec<WriterSlot>,
    /// Sorted by id (append-only)
    traces: Vec<StoredTrace>,
}

impl State {
    fn writer(&self, id: WriterId) -> Result<&WriterSlot> {
        index(id.0)
            .and_then(|i| self.writers.get(i))
            .ok_or(TraceError::WriterNotFound { id: id.0 })
    }

    fn writer_mut(&mut self, id: WriterId) -> Result<&mut WriterSlot> {
        index(id.0)
            .and_then(|i| self.writers.get_mut(i))
            .ok_or(TraceError::WriterNotFound { id: id.0 })
    }

    fn push(&mut self, writer: WriterId, entry: Entry) -> TraceId {
        let id = TraceId(self.traces.len() as u64 + 1);
        self.traces.push(StoredTrace {
            id,
            writer,
            timestamp: now_timestamp(),
            entry,
        });
        id
    }
}

fn index(id: u64) -> Option<usize> {
    usize::try_from(id).ok()?.checked_sub(1)
}

/// Thread-safe, append-only, in-memory container
///
/// Clones share the same underlying log.
#[derive(Clone, Default)]
pub struct MemoryContainer {
    state: Arc<RwLock<State>>,
}

impl MemoryContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events (markers included)
    pub fn len(&self) -> usize {
        self.state.read().traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LogContainer for MemoryContainer {
    fn open_tracer(&self) -> Result<TracerId> {
        let mut state = self.state.write();
        state.tracers += 1;
        Ok(TracerId(state.tracers as u64))
    }

    fn open_writer(&self, tracer: TracerId) -> Result<WriterId> {
        let mut state = self.state.write();
        if tracer.0 == 0 || tracer.0 > state.tracers as u64 {
            return Err(TraceError::TracerNotFound { id: tracer.0 });
        }

        state.writers.push(WriterSlot {
            tracer,
            depth: None,
            closed: false,
        });
        let id = WriterId(state.writers.len() as u64);
        state.push(id, Entry::Open);
        Ok(id)
    }

    fn close_writer(&self, writer: WriterId) -> Result<()> {
        let mut state = self.state.write();
        let slot = state.writer_mut(writer)?;
        if slot.closed {
            return Err(TraceError::WriterClosed { id: writer.0 });
        }
        slot.closed = true;
        state.push(writer, Entry::Close);
        Ok(())
    }

    fn append(&self, writer: WriterId, payload: &Payload) -> Result<TraceId> {
        let body = payload.encode()?;
        let mut state = self.state.write();
        if state.writer(writer)?.closed {
            return Err(TraceError::WriterClosed { id: writer.0 });
        }
        Ok(state.push(
            writer,
            Entry::Message {
                kind: payload.message_type(),
                body,
            },
        ))
    }

    fn set_depth(&self, writer: WriterId, depth: u32) -> Result<()> {
        self.state.write().writer_mut(writer)?.depth = Some(depth);
        Ok(())
    }

    fn set_depths(&self, depths: &[(WriterId, u32)]) -> Result<()> {
        let mut state = self.state.write();
        // Validate first so a bad id leaves every depth untouched
        for &(writer, _) in depths {
            state.writer(writer)?;
        }
        for &(writer, depth) in depths {
            state.writer_mut(writer)?.depth = Some(depth);
        }
        Ok(())
    }

    fn fetch_tracers(&self, after: Option<TracerId>, limit: usize) -> Result<Vec<TracerRecord>> {
        let state = self.state.read();
        let start = after.map(|id| id.0).unwrap_or(0);
        Ok((start + 1..=state.tracers as u64)
            .take(limit)
            .map(|id| TracerRecord { id: TracerId(id) })
            .collect())
    }

    fn fetch_writers(
        &self,
        tracer: TracerId,
        after: Option<WriterId>,
        limit: usize,
    ) -> Result<Vec<WriterRecord>> {
        let state = self.state.read();
        let start = after.map(|id| id.0 as usize).unwrap_or(0);
        Ok(state
            .writers
            .iter()
            .enumerate()
            .skip(start)
            .filter(|(_, slot)| slot.tracer == tracer)
            .take(limit)
            .map(|(i, slot)| WriterRecord {
                id: WriterId(i as u64 + 1),
                tracer,
                depth: slot.depth,
            })
            .collect())
    }

    fn fetch_traces(
        &self,
        tracer: TracerId,
        after: Option<TraceId>,
        limit: usize,
    ) -> Result<Vec<TraceRecord>> {
        let state = self.state.read();
        let start = after.map(|id| id.0).unwrap_or(0);
        let first = state.traces.partition_point(|t| t.id.0 <= start);

        let mut out = Vec::new();
        for trace in &state.traces[first..] {
            if out.len() == limit {
                break;
            }
            let slot = state.writer(trace.writer)?;
            if slot.tracer != tracer {
                continue;
            }
            out.push(TraceRecord {
                id: trace.id,
                tracer,
                writer: trace.writer,
                timestamp: trace.timestamp.clone(),
                entry: trace.entry.clone(),
                depth: slot.depth,
            });
        }
        Ok(out)
    }
}

impl std::fmt::Debug for MemoryContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("MemoryContainer")
            .field("tracers", &state.tracers)
            .field("writers", &state.writers.len())
            .field("traces", &state.traces.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MessageType;

    #[test]
    fn open_writer_appends_open_marker() {
        let log = MemoryContainer::new();
        let tracer = log.open_tracer().unwrap();
        let writer = log.open_writer(tracer).unwrap();

        let traces: Vec<_> = log.traces(tracer).map(|t| t.unwrap()).collect();
        assert_eq!(traces.len(), 1);
        assert_eq!(traces[0].writer, writer);
        assert!(traces[0].is_open());
        assert_eq!(traces[0].depth, None);
    }

    #[test]
    fn unknown_tracer_is_not_found() {
        let log = MemoryContainer::new();
        let err = log.open_writer(TracerId(4)).unwrap_err();
        assert!(matches!(err, TraceError::TracerNotFound { id: 4 }));
    }

    #[test]
    fn append_after_close_is_rejected() {
        let log = MemoryContainer::new();
        let tracer = log.open_tracer().unwrap();
        let writer = log.open_writer(tracer).unwrap();
        log.close_writer(writer).unwrap();

        let err = log.append(writer, &Payload::text("late")).unwrap_err();
        assert!(matches!(err, TraceError::WriterClosed { .. }));
        assert!(err.is_not_found());

        let err = log.close_writer(writer).unwrap_err();
        assert!(matches!(err, TraceError::WriterClosed { .. }));
    }

    #[test]
    fn append_to_unknown_writer_is_not_found() {
        let log = MemoryContainer::new();
        let err = log.append(WriterId(1), &Payload::text("x")).unwrap_err();
        assert!(matches!(err, TraceError::WriterNotFound { id: 1 }));
        assert!(log.set_depth(WriterId(0), 1).is_err());
    }

    #[test]
    fn ids_are_monotonic_across_writers() {
        let log = MemoryContainer::new();
        let tracer = log.open_tracer().unwrap();
        let a = log.open_writer(tracer).unwrap();
        let b = log.open_writer(tracer).unwrap();
        let t1 = log.append(b, &Payload::text("b")).unwrap();
        let t2 = log.append(a, &Payload::text("a")).unwrap();
        assert!(t2 > t1);

        let ids: Vec<_> = log.traces(tracer).map(|t| t.unwrap().id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn traces_are_partitioned_by_tracer() {
        let log = MemoryContainer::new();
        let first = log.open_tracer().unwrap();
        let second = log.open_tracer().unwrap();
        let w1 = log.open_writer(first).unwrap();
        let w2 = log.open_writer(second).unwrap();
        log.append(w1, &Payload::text("one")).unwrap();
        log.append(w2, &Payload::text("two")).unwrap();

        let traces: Vec<_> = log.traces(second).map(|t| t.unwrap()).collect();
        assert_eq!(traces.len(), 2);
        assert!(traces.iter().all(|t| t.writer == w2 && t.tracer == second));

        let writers: Vec<_> = log.writers(first).map(|w| w.unwrap().id).collect();
        assert_eq!(writers, vec![w1]);
    }

    #[test]
    fn list_payload_is_stored_encoded() {
        let log = MemoryContainer::new();
        let tracer = log.open_tracer().unwrap();
        let writer = log.open_writer(tracer).unwrap();
        log.append(writer, &Payload::list([("a", "1")])).unwrap();

        let last = log.traces(tracer).last().unwrap().unwrap();
        assert_eq!(
            last.entry,
            Entry::Message {
                kind: MessageType::List,
                body: r#"{"a":"1"}"#.to_string(),
            }
        );
    }

    #[test]
    fn set_depths_is_all_or_nothing() {
        let log = MemoryContainer::new();
        let tracer = log.open_tracer().unwrap();
        let writer = log.open_writer(tracer).unwrap();

        assert!(log.set_depths(&[(writer, 0), (WriterId(99), 1)]).is_err());
        let record = log.writers(tracer).next().unwrap().unwrap();
        assert_eq!(record.depth, None);

        log.set_depths(&[(writer, 2)]).unwrap();
        let record = log.writers(tracer).next().unwrap().unwrap();
        assert_eq!(record.depth, Some(2));
    }

    #[test]
    fn container_is_clone() {
        let log = MemoryContainer::new();
        let cloned = log.clone();
        let tracer = log.open_tracer().unwrap();
        log.open_writer(tracer).unwrap();

        // Cloned shares the same underlying data (Arc)
        assert_eq!(cloned.len(), 1);
        assert!(!cloned.is_empty());
    }

    #[test]
    fn tracers_cursor_restarts() {
        let log = MemoryContainer::new();
        log.open_tracer().unwrap();
        log.open_tracer().unwrap();

        assert_eq!(log.tracers().count(), 2);
        assert_eq!(log.tracers().count(), 2);
    }
}
