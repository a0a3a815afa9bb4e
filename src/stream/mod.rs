//! Streaming input - read the nested card dataset without loading it whole
//!
//! [`parse_dataset`] is the push-based core that walks the document with
//! `serde` seeds; [`RecordStream`] wraps it as a pull-based iterator.

pub mod reader;
pub mod seed;

pub use reader::{CountingReader, RecordStream, StreamItem};
pub use seed::{parse_dataset, EventSink};
