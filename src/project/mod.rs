//! Field projection for surviving cards

pub mod projector;

pub use projector::{project, ProjectionSchema, Projector, DEFAULT_FIELDS};
