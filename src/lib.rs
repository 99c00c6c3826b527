//! Calltrace - nested call tracing with hierarchy reconstruction

pub mod config;
pub mod container;
pub mod error;
pub mod model;
pub mod reader;
pub mod render;
pub mod resolver;
pub mod tracer;

pub use config::RenderConfig;
pub use container::{Cursor, LogContainer, MemoryContainer, SqliteContainer};
pub use error::{FixSuggestion, Result, TraceError};
pub use model::{Entry, MessageType, Payload, TraceId, TraceRecord, TracerId, WriterId};
pub use reader::{Reader, TraceView};
pub use render::{DumpStats, TextRenderer};
pub use resolver::{Resolution, ResolveSummary, Resolver};
pub use tracer::{Tracer, Writer};
