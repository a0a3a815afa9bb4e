//! # cardsieve - streaming filter for MTGJSON-style card datasets
//!
//! Reads a dataset shaped `{"meta": {...}, "data": {setCode: {"block": ..., "cards": [...]}}}`,
//! keeps the cards that satisfy a filter, reduces them to a projection schema
//! and writes the result back out in the same envelope. Cards are streamed
//! one at a time, so memory does not grow with the size of the input.
//!
//! ## Modules
//!
//! - **stream**: pull-based card events from a reader
//! - **filter**: compile filter specs into predicate trees
//! - **project**: reduce cards to a field schema
//! - **sink**: re-serialize results incrementally
//! - **pipeline**: configuration and the run state machine
//! - **resolve**: match deck-list entries to dataset cards
//!
//! ## Quick Start
//!
//! ```rust
//! use cardsieve::{filter_json, compile_filter, ProjectionSchema};
//! use serde_json::json;
//!
//! # fn main() -> Result<(), cardsieve::PipelineError> {
//! let input = br#"{"meta": {}, "data": {"BIG": {"block": "X", "cards": [
//!     {"name": "Alpha", "type": "Creature", "colors": ["W"], "colorIdentity": ["W"],
//!      "rarity": "common", "setCode": "BIG", "number": "1"}
//! ]}}}"#.to_vec();
//!
//! let filter = compile_filter(&json!({"colors": {"contains": "W"}}))?;
//! let schema = ProjectionSchema::new(["name", "rarity"]);
//! let mut out = Vec::new();
//! let summary = filter_json(std::io::Cursor::new(input), &mut out, filter, schema)?;
//! assert_eq!(summary.cards_written, 1);
//! # Ok(())
//! # }
//! ```

use std::io::{Read, Write};

pub mod error;
pub mod filter;
pub mod logging;
pub mod pipeline;
pub mod progress;
pub mod project;
pub mod resolve;
pub mod sink;
pub mod stream;
pub mod types;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, FilterSpecError, PipelineError, StructuralError};
pub use filter::{compile_filter, Filter, FilterCompiler, PredicateNode};
pub use pipeline::{CancelFlag, Pipeline, PipelineConfig, PipelineState, RecordErrorPolicy, RunSummary};
pub use progress::{ProgressSnapshot, ProgressState};
pub use project::{ProjectionSchema, Projector};
pub use resolve::{DeckEntry, DeckResolver};
pub use sink::ResultSink;
pub use stream::RecordStream;
pub use types::{Card, CardRecord, StreamEvent};

/// Main entry point: filter and project a dataset with default run options
pub fn filter_json<R, W>(
    reader: R,
    writer: W,
    filter: Filter,
    schema: ProjectionSchema,
) -> Result<RunSummary, PipelineError>
where
    R: Read + Send + 'static,
    W: Write,
{
    Pipeline::new(filter, Projector::new(schema)).run(reader, writer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::io::Cursor;

    #[test]
    fn test_basic_filtering() {
        let input = json!({
            "meta": {"version": "5.2"},
            "data": {
                "BIG": {"block": "X", "cards": [
                    {"name": "Alpha", "type": "Creature", "colors": ["W"], "colorIdentity": ["W"],
                     "rarity": "common", "setCode": "BIG", "number": "1"},
                    {"name": "Beta", "type": "Instant", "colors": ["U"], "colorIdentity": ["U"],
                     "rarity": "rare", "setCode": "BIG", "number": "2"}
                ]}
            }
        });

        let filter = compile_filter(&json!({"rarity": "rare"})).unwrap();
        let mut out = Vec::new();
        let summary = filter_json(
            Cursor::new(serde_json::to_vec(&input).unwrap()),
            &mut out,
            filter,
            ProjectionSchema::new(["name"]),
        )
        .unwrap();

        assert_eq!(summary.progress.records_seen, 2);
        let value: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["data"]["BIG"]["cards"], json!([{"name": "Beta"}]));
        assert_eq!(value["meta"], json!({"version": "5.2"}));
    }
}
