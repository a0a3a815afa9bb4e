//! Output - re-serialize surviving cards inside the input's envelope

pub mod writer;

pub use writer::{ResultSink, SinkStats};
