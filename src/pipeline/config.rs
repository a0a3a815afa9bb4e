use crate::error::{ConfigError, FilterSpecError, PipelineError};
use crate::logging::{LogSettings, LEVELS};
use crate::project::ProjectionSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// What to do with a card that fails per-record validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecordErrorPolicy {
    /// Log it, count it as skipped and keep going
    Skip,
    /// Fail the run
    #[default]
    Abort,
}

impl std::str::FromStr for RecordErrorPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(RecordErrorPolicy::Skip),
            "abort" => Ok(RecordErrorPolicy::Abort),
            other => Err(ConfigError::Invalid {
                key: "on_record_error".to_string(),
                reason: format!("expected `skip` or `abort`, got `{}`", other),
            }),
        }
    }
}

/// `{"file": path}`; any other key makes the object something else
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRef {
    pub file: PathBuf,
}

/// Where a filter spec comes from: `{"file": path}`, inline JSON text, or an
/// inline JSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSource {
    File(FileRef),
    Spec(Value),
}

impl FilterSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        FilterSource::File(FileRef { file: path.into() })
    }

    /// The filter spec as a JSON value, reading the file if there is one
    pub fn load(&self) -> Result<Value, PipelineError> {
        match self {
            FilterSource::File(FileRef { file }) => {
                let text = read_to_string(file)?;
                serde_json::from_str(&text)
                    .map_err(|e| FilterSpecError::Parse(format!("{}: {}", file.display(), e)).into())
            }
            FilterSource::Spec(Value::String(text)) => serde_json::from_str(text)
                .map_err(|e| FilterSpecError::Parse(e.to_string()).into()),
            FilterSource::Spec(spec) => Ok(spec.clone()),
        }
    }
}

/// Where a projection schema comes from: `{"file": path}` or an inline list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProjectionSource {
    File(FileRef),
    Fields(Vec<String>),
}

impl ProjectionSource {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        ProjectionSource::File(FileRef { file: path.into() })
    }

    /// The file holds a JSON list of names, or one name per line
    pub fn load(&self) -> Result<ProjectionSchema, ConfigError> {
        match self {
            ProjectionSource::Fields(fields) => Ok(ProjectionSchema::new(fields.iter().cloned())),
            ProjectionSource::File(FileRef { file }) => {
                let text = read_to_string(file)?;
                if text.trim_start().starts_with('[') {
                    serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
                        path: file.clone(),
                        reason: e.to_string(),
                    })
                } else {
                    Ok(ProjectionSchema::new(
                        text.lines().map(str::trim).filter(|line| !line.is_empty()),
                    ))
                }
            }
        }
    }
}

/// Settings for one run, merged from a config file, `CARDSIEVE_*` variables
/// and command-line flags in that order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Dataset to read; stdin when absent
    pub input: Option<PathBuf>,

    /// Where to write the result; stdout when absent
    pub output: Option<PathBuf>,

    pub filter: Option<FilterSource>,

    pub projection: Option<ProjectionSource>,

    pub drop_empty_sets: bool,

    pub on_record_error: RecordErrorPolicy,

    /// Output buffer in bytes
    pub buffer_size: usize,

    /// Threads evaluating filter and projection; 1 keeps everything on the caller's thread
    pub workers: usize,

    /// Cards handed to the workers at a time
    pub batch_size: usize,

    /// Narrow `foreignData` to these languages
    pub foreign_languages: Option<Vec<String>>,

    pub progress_interval_ms: u64,

    /// One of trace, debug, info, warn, error
    pub log_level: Option<String>,

    /// Also append logs to this file
    pub log_file: Option<PathBuf>,

    /// Log as JSON lines
    pub log_json: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: None,
            output: None,
            filter: None,
            projection: None,
            drop_empty_sets: false,
            on_record_error: RecordErrorPolicy::Abort,
            buffer_size: 8192,
            workers: 1,
            batch_size: 256,
            foreign_languages: None,
            progress_interval_ms: 1000,
            log_level: None,
            log_file: None,
            log_json: false,
        }
    }
}

impl PipelineConfig {
    pub const ENV_PREFIX: &'static str = "CARDSIEVE_";

    /// Load a `.json`, `.yaml` or `.yml` config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = read_to_string(path)?;
        let parse_error = |reason: String| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        };

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&text).map_err(|e| parse_error(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))?,
            other => {
                return Err(parse_error(format!(
                    "unsupported config format {:?}, expected .json, .yaml or .yml",
                    other.unwrap_or("")
                )))
            }
        };
        debug!(path = %path.display(), "loaded config file");
        config.validate()?;
        Ok(config)
    }

    /// Override settings from the process environment
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(std::env::vars())
    }

    /// Override settings from `CARDSIEVE_*` pairs; other keys are ignored
    pub fn apply_env_from<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(Self::ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match name {
                "DROP_EMPTY_SETS" => self.drop_empty_sets = parse_bool(key.as_ref(), value)?,
                "ON_RECORD_ERROR" => self.on_record_error = value.parse()?,
                "WORKERS" => self.workers = parse_number(key.as_ref(), value)?,
                "BUFFER_SIZE" => self.buffer_size = parse_number(key.as_ref(), value)?,
                "BATCH_SIZE" => self.batch_size = parse_number(key.as_ref(), value)?,
                "LOG_LEVEL" => self.log_level = Some(value.trim().to_string()),
                "LOG_FILE" => self.log_file = Some(PathBuf::from(value)),
                _ => continue,
            }
            debug!(key = key.as_ref(), "setting overridden from environment");
        }
        self.validate()
    }

    /// Logging as configured, before command-line verbosity flags are applied
    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            level: self.log_level.clone(),
            json: self.log_json,
            file: self.log_file.clone(),
            ..LogSettings::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, reason: &str| ConfigError::Invalid {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        if self.workers == 0 {
            return Err(invalid("workers", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(invalid("batch_size", "must be at least 1"));
        }
        if self.buffer_size == 0 {
            return Err(invalid("buffer_size", "must be at least 1"));
        }
        if let Some(level) = &self.log_level {
            if !LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
                return Err(invalid("log_level", "expected trace, debug, info, warn or error"));
            }
        }
        Ok(())
    }
}

fn read_to_string(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Invalid {
            key: key.to_string(),
            reason: format!("expected a boolean, got `{}`", other),
        }),
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("expected a positive integer, got `{}`", value),
    })
}
