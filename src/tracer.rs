//! Producer side: tracer sessions and scoped writers
//!
//! A `Writer` is a guard. Its close marker is appended exactly once, either
//! through `Writer::close` or when the guard is dropped (normal return, `?`
//! early return or panic unwind). Handles are passed explicitly; there is no
//! ambient tracer.

use std::fmt::Debug;

use tracing::warn;

use crate::container::LogContainer;
use crate::error::Result;
use crate::model::{Payload, TraceId, TracerId, WriterId};

/// Prefix of the first message of a writer opened for a function call
pub const CALL_PREFIX: &str = "Call ";

/// One execution session writing into a container
pub struct Tracer<'c> {
    container: &'c dyn LogContainer,
    id: TracerId,
}

impl<'c> Tracer<'c> {
    /// Open a new session
    pub fn new(container: &'c dyn LogContainer) -> Result<Self> {
        let id = container.open_tracer()?;
        Ok(Self { container, id })
    }

    pub fn id(&self) -> TracerId {
        self.id
    }

    /// Open a writer for a function call
    ///
    /// The optional first message is written as `Call <message>`.
    pub fn writer(&self, call: Option<&str>) -> Result<Writer<'c>> {
        let writer = self.open()?;
        if let Some(function) = call {
            writer.call(function)?;
        }
        Ok(writer)
    }

    /// Open a writer whose first message is written verbatim
    pub fn scope(&self, message: &str) -> Result<Writer<'c>> {
        let writer = self.open()?;
        writer.write(message)?;
        Ok(writer)
    }

    fn open(&self) -> Result<Writer<'c>> {
        let id = self.container.open_writer(self.id)?;
        Ok(Writer {
            container: self.container,
            id,
            open: true,
        })
    }
}

impl Debug for Tracer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer").field("id", &self.id).finish()
    }
}

/// Scoped logging handle; closes itself when dropped
pub struct Writer<'c> {
    container: &'c dyn LogContainer,
    id: WriterId,
    open: bool,
}

impl Writer<'_> {
    pub fn id(&self) -> WriterId {
        self.id
    }

    /// Write a TEXT message
    pub fn write(&self, message: impl Into<String>) -> Result<TraceId> {
        self.write_payload(&Payload::Text(message.into()))
    }

    /// Write `Call <function>`
    pub fn call(&self, function: &str) -> Result<TraceId> {
        self.write(format!("{}{}", CALL_PREFIX, function))
    }

    /// Write the pretty debug representation of a value as DATA
    ///
    /// With a name, the message reads `<name> = <value>`.
    pub fn dump<T: Debug + ?Sized>(&self, name: Option<&str>, value: &T) -> Result<TraceId> {
        let rendered = format!("{:#?}", value);
        let rendered = rendered.trim_end_matches(['\r', '\n']);
        let message = match name {
            Some(name) => format!("{} = {}", name, rendered),
            None => rendered.to_string(),
        };
        self.write_payload(&Payload::Data(message))
    }

    /// Write key/value couples as a LIST
    pub fn write_list<K, V>(&self, entries: impl IntoIterator<Item = (K, V)>) -> Result<TraceId>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.write_payload(&Payload::list(entries))
    }

    pub fn write_payload(&self, payload: &Payload) -> Result<TraceId> {
        self.container.append(self.id, payload)
    }

    /// Close now and report failures, instead of waiting for drop
    pub fn close(mut self) -> Result<()> {
        self.open = false;
        self.container.close_writer(self.id)
    }
}

impl Drop for Writer<'_> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        if let Err(e) = self.container.close_writer(self.id) {
            warn!(writer = self.id.0, error = %e, "Failed to close writer");
        }
    }
}

impl Debug for Writer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("id", &self.id)
            .field("open", &self.open)
            .finish()
    }
}
