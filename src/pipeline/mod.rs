//! Run orchestration: configuration, the per-record state machine, optional
//! parallel evaluation and cooperative cancellation

pub mod cancel;
pub mod config;
pub mod orchestrator;
pub mod parallel;

pub use cancel::CancelFlag;
pub use config::{FilterSource, PipelineConfig, ProjectionSource, RecordErrorPolicy};
pub use orchestrator::{Pipeline, PipelineState, RunOptions, RunSummary};
pub use parallel::evaluate_batch;
