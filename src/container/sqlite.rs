//! SQLite log container
//!
//! Layout:
//! - `tracer(id)`
//! - `writer(id, fk_tracer_id, indent)`: indent is NULL until resolved
//! - `trace(id, timestamp, fk_writer_id, message, type, is_first, is_last)`:
//!   type is NULL for open/close markers, otherwise TEXT, DATA or LIST

use std::path::{Path, PathBuf};

use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::debug;

use super::LogContainer;
use crate::error::{Result, TraceError};
use crate::model::{
    now_timestamp, Entry, MessageType, Payload, TraceId, TraceRecord, TracerId, TracerRecord,
    WriterId, WriterRecord,
};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS tracer (
  id INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS writer (
  id           INTEGER PRIMARY KEY,
  fk_tracer_id INT NOT NULL,
  indent       INT,
  FOREIGN KEY(fk_tracer_id) REFERENCES tracer(id)
);

CREATE INDEX IF NOT EXISTS fk_tracer_id_index ON writer (fk_tracer_id);

CREATE TABLE IF NOT EXISTS trace (
  id           INTEGER PRIMARY KEY,
  timestamp    TEXT NOT NULL,
  fk_writer_id INT NOT NULL,
  message      TEXT NOT NULL,
  type         TEXT,
  is_first     INT NOT NULL DEFAULT 0,
  is_last      INT NOT NULL DEFAULT 0,
  FOREIGN KEY(fk_writer_id) REFERENCES writer(id)
);

CREATE INDEX IF NOT EXISTS fk_writer_id_index ON trace (fk_writer_id);
";

/// Log container backed by a SQLite database
pub struct SqliteContainer {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteContainer {
    /// Create a fresh log at `path`, replacing any existing file
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let conn = Connection::open(path)?;
        let container = Self::configure(conn, Some(path.to_path_buf()))?;
        container.conn.execute_batch(SCHEMA)?;
        debug!(path = %path.display(), "Created log container");
        Ok(container)
    }

    /// Open an existing log (never creates the file)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(TraceError::LogNotFound {
                path: path.display().to_string(),
            });
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::configure(conn, Some(path.to_path_buf()))
    }

    /// Private database living as long as the container
    pub fn in_memory() -> Result<Self> {
        let container = Self::configure(Connection::open_in_memory()?, None)?;
        container.conn.execute_batch(SCHEMA)?;
        Ok(container)
    }

    fn configure(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn insert_trace(
        &self,
        writer: WriterId,
        message: &str,
        kind: Option<MessageType>,
        is_first: bool,
        is_last: bool,
    ) -> Result<TraceId> {
        self.conn.execute(
            "INSERT INTO trace(timestamp, fk_writer_id, message, type, is_first, is_last)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                now_timestamp(),
                to_sql_id(writer.0),
                message,
                kind.map(MessageType::as_str),
                is_first,
                is_last,
            ],
        )?;
        Ok(TraceId(self.conn.last_insert_rowid() as u64))
    }

    /// Fails unless `writer` exists and has no close marker yet
    fn ensure_open(&self, writer: WriterId) -> Result<()> {
        let closed: Option<bool> = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM trace WHERE fk_writer_id = writer.id AND is_last = 1)
                 FROM writer WHERE writer.id = ?1",
                params![to_sql_id(writer.0)],
                |row| row.get(0),
            )
            .optional()?;

        match closed {
            None => Err(TraceError::WriterNotFound { id: writer.0 }),
            Some(true) => Err(TraceError::WriterClosed { id: writer.0 }),
            Some(false) => Ok(()),
        }
    }

    fn update_indent(&self, writer: WriterId, depth: u32) -> Result<()> {
        let updated = self.conn.execute(
            "UPDATE writer SET indent = ?1 WHERE id = ?2",
            params![depth, to_sql_id(writer.0)],
        )?;
        if updated == 0 {
            return Err(TraceError::WriterNotFound { id: writer.0 });
        }
        Ok(())
    }
}

impl LogContainer for SqliteContainer {
    fn open_tracer(&self) -> Result<TracerId> {
        self.conn.execute("INSERT INTO tracer DEFAULT VALUES", [])?;
        Ok(TracerId(self.conn.last_insert_rowid() as u64))
    }

    fn open_writer(&self, tracer: TracerId) -> Result<WriterId> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM tracer WHERE id = ?1",
                params![to_sql_id(tracer.0)],
                |_| Ok(()),
            )
            .optional()?;
        if exists.is_none() {
            return Err(TraceError::TracerNotFound { id: tracer.0 });
        }

        let tx = self.conn.unchecked_transaction()?;
        self.conn.execute(
            "INSERT INTO writer(fk_tracer_id) VALUES (?1)",
            params![to_sql_id(tracer.0)],
        )?;
        let writer = WriterId(self.conn.last_insert_rowid() as u64);
        self.insert_trace(writer, "", None, true, false)?;
        tx.commit()?;
        Ok(writer)
    }

    fn close_writer(&self, writer: WriterId) -> Result<()> {
        self.ensure_open(writer)?;
        self.insert_trace(writer, "", None, false, true)?;
        Ok(())
    }

    fn append(&self, writer: WriterId, payload: &Payload) -> Result<TraceId> {
        self.ensure_open(writer)?;
        let body = payload.encode()?;
        self.insert_trace(writer, &body, Some(payload.message_type()), false, false)
    }

    fn set_depth(&self, writer: WriterId, depth: u32) -> Result<()> {
        self.update_indent(writer, depth)
    }

    fn set_depths(&self, depths: &[(WriterId, u32)]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for &(writer, depth) in depths {
            // Dropping `tx` on error rolls back
            self.update_indent(writer, depth)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn fetch_tracers(&self, after: Option<TracerId>, limit: usize) -> Result<Vec<TracerRecord>> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT id FROM tracer WHERE id > ?1 ORDER BY id ASC LIMIT ?2")?;
        let mut rows = stmt.query(params![
            to_sql_id(after.map(|id| id.0).unwrap_or(0)),
            to_sql_limit(limit)
        ])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(TracerRecord {
                id: TracerId(row.get::<_, i64>(0)? as u64),
            });
        }
        Ok(out)
    }

    fn fetch_writers(
        &self,
        tracer: TracerId,
        after: Option<WriterId>,
        limit: usize,
    ) -> Result<Vec<WriterRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, indent FROM writer
             WHERE fk_tracer_id = ?1 AND id > ?2
             ORDER BY id ASC LIMIT ?3",
        )?;
        let mut rows = stmt.query(params![
            to_sql_id(tracer.0),
            to_sql_id(after.map(|id| id.0).unwrap_or(0)),
            to_sql_limit(limit)
        ])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(WriterRecord {
                id: WriterId(row.get::<_, i64>(0)? as u64),
                tracer,
                depth: row.get(1)?,
            });
        }
        Ok(out)
    }

    fn fetch_traces(
        &self,
        tracer: TracerId,
        after: Option<TraceId>,
        limit: usize,
    ) -> Result<Vec<TraceRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT   trace.id, writer.id, writer.indent, trace.timestamp,
                      trace.message, trace.type, trace.is_first, trace.is_last
             FROM     writer, trace
             WHERE    writer.fk_tracer_id = ?1
               AND    trace.fk_writer_id = writer.id
               AND    trace.id > ?2
             ORDER BY trace.id ASC
             LIMIT    ?3",
        )?;
        let mut rows = stmt.query(params![
            to_sql_id(tracer.0),
            to_sql_id(after.map(|id| id.0).unwrap_or(0)),
            to_sql_limit(limit)
        ])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(TraceRecord {
                id: TraceId(row.get::<_, i64>(0)? as u64),
                tracer,
                writer: WriterId(row.get::<_, i64>(1)? as u64),
                depth: row.get(2)?,
                timestamp: row.get(3)?,
                entry: read_entry(row)?,
            });
        }
        Ok(out)
    }
}

/// Decode the marker flags and message columns of a `fetch_traces` row
fn read_entry(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let is_first: bool = row.get(6)?;
    let is_last: bool = row.get(7)?;
    if is_first {
        return Ok(Entry::Open);
    }
    if is_last {
        return Ok(Entry::Close);
    }

    let kind: Option<String> = row.get(5)?;
    let kind = kind
        .ok_or_else(|| "message without type".to_string())
        .and_then(|k| k.parse::<MessageType>())
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;

    Ok(Entry::Message {
        kind,
        body: row.get(4)?,
    })
}

fn to_sql_id(id: u64) -> i64 {
    i64::try_from(id).unwrap_or(i64::MAX)
}

fn to_sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl std::fmt::Debug for SqliteContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteContainer")
            .field("path", &self.path)
            .finish()
    }
}
