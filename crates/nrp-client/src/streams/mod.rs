//! Pluggable byte sources and sinks for the transfer engine.
//!
//! The multipart upload/download engine never opens files or sockets
//! directly; it reads from a [`DataSource`] and writes to a [`DataSink`] so
//! the same engine drives uploads from a file, an in-memory buffer, or any
//! other byte-addressable store. Grounded in the file-backed
//! `Source`/`Sink` abstractions used throughout `modkit-sdk`'s streaming
//! helpers, generalized with explicit offset/length framing for ranged
//! multipart parts.

mod sink;
mod source;

pub use sink::{BytesSink, DataSink, FileSink, SinkState};
pub use source::{BytesSource, DataSource, FileSource};
