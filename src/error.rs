//! Error types for the filter pipeline
//!
//! Every failure a run can end with maps onto one [`ErrorKind`]. A predicate
//! that evaluates to false is never an error.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Where in the dataset a structural problem was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// The outer `{meta, data}` wrapper
    Envelope,
    /// A set entry under `data`
    Set(String),
    /// One card inside a set's `cards` array
    Card { set_code: String, index: usize },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Envelope => write!(f, "envelope"),
            Location::Set(code) => write!(f, "set {}", code),
            Location::Card { set_code, index } => write!(f, "set {} card #{}", set_code, index),
        }
    }
}

/// Input that does not have the `meta/data/{setCode}/cards[]` shape
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("structural input error at {location}: {message}")]
pub struct StructuralError {
    pub location: Location,
    pub message: String,
}

impl StructuralError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        StructuralError {
            location,
            message: message.into(),
        }
    }

    pub fn envelope(message: impl Into<String>) -> Self {
        Self::new(Location::Envelope, message)
    }

    pub fn set(set_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Location::Set(set_code.into()), message)
    }

    pub fn card(set_code: impl Into<String>, index: usize, message: impl Into<String>) -> Self {
        Self::new(
            Location::Card {
                set_code: set_code.into(),
                index,
            },
            message,
        )
    }

    /// The set the error is attributed to, if any
    pub fn set_code(&self) -> Option<&str> {
        match &self.location {
            Location::Envelope => None,
            Location::Set(code) => Some(code),
            Location::Card { set_code, .. } => Some(set_code),
        }
    }

    /// Position of the offending card within its set, if the error is about one card
    pub fn index(&self) -> Option<usize> {
        match self.location {
            Location::Card { index, .. } => Some(index),
            _ => None,
        }
    }
}

/// A filter specification that cannot be compiled or applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterSpecError {
    #[error("filter spec is not valid JSON: {0}")]
    Parse(String),

    #[error("unknown operator `{operator}` on field `{field}`")]
    UnknownOperator { field: String, operator: String },

    #[error("malformed filter at `{path}`: {reason}")]
    Malformed { path: String, reason: String },

    #[error("operator `{operator}` on field `{field}` needs a numeric operand, got {operand}")]
    NonNumericOperand {
        field: String,
        operator: String,
        operand: String,
    },

    #[error("operator `{operator}` cannot compare non-numeric field `{field}`{}", value_suffix(.value))]
    NonNumericField {
        field: String,
        operator: String,
        value: Option<String>,
    },

    #[error("invalid regex on field `{field}`: {reason}")]
    InvalidRegex { field: String, reason: String },
}

fn value_suffix(value: &Option<String>) -> String {
    match value {
        Some(v) => format!(" (found {})", v),
        None => String::new(),
    }
}

impl FilterSpecError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        FilterSpecError::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Problems loading run settings, filter files or projection files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: String, reason: String },
}

/// Failures raised while pulling events out of the input
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("failed to read input: {0}")]
    Read(#[source] io::Error),

    /// The consumer dropped the stream before the input was exhausted
    #[error("record consumer closed the stream")]
    Closed,
}

/// Discriminant of [`PipelineError`], handy for matching on outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StructuralInput,
    InvalidFilterSpec,
    InputRead,
    SinkWrite,
    Config,
    Cancelled,
}

/// Terminal failure of a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("invalid filter spec: {0}")]
    InvalidFilterSpec(#[from] FilterSpecError),

    #[error("failed to read input: {0}")]
    InputRead(#[source] io::Error),

    #[error("failed to write output: {0}")]
    SinkWrite(#[source] io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("run cancelled after {records_seen} records")]
    Cancelled { records_seen: u64 },
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Structural(_) => ErrorKind::StructuralInput,
            PipelineError::InvalidFilterSpec(_) => ErrorKind::InvalidFilterSpec,
            PipelineError::InputRead(_) => ErrorKind::InputRead,
            PipelineError::SinkWrite(_) => ErrorKind::SinkWrite,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

impl From<StreamError> for PipelineError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Structural(e) => PipelineError::Structural(e),
            StreamError::Read(e) => PipelineError::InputRead(e),
            StreamError::Closed => PipelineError::InputRead(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "record stream closed early",
            )),
        }
    }
}
