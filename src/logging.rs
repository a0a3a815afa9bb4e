//! Log setup shared by the binaries

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

pub const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Where and how much to log
#[derive(Debug, Clone, Default)]
pub struct LogSettings {
    /// `-v` count from the command line
    pub verbose: u8,
    pub quiet: bool,
    /// Level from the config file, used when no flag asks for one
    pub level: Option<String>,
    /// Emit JSON lines instead of plain text
    pub json: bool,
    /// Also append logs to this file
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// Flags win over the configured level; `info` when neither is given
    pub fn effective_level(&self) -> String {
        if self.quiet {
            return "error".to_string();
        }
        match self.verbose {
            0 => self
                .level
                .as_deref()
                .map(str::to_ascii_lowercase)
                .unwrap_or_else(|| "info".to_string()),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    }
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(format!("cardsieve={}", level)))
}

/// Install a stderr subscriber, plus a file layer when `settings.file` is set.
/// `RUST_LOG` wins over the settings when present.
///
/// Keep the returned guard alive for the life of the program; dropping it
/// flushes the file writer.
pub fn init_logging(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let level = settings.effective_level();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);
    layers.push(if settings.json {
        stderr.json().with_filter(env_filter(&level)).boxed()
    } else {
        stderr.with_filter(env_filter(&level)).boxed()
    });

    let mut guard = None;
    if let Some(path) = &settings.file {
        let (dir, name) = split_log_path(path)?;
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
        let appender = tracing_appender::rolling::never(&dir, name);
        let (writer, file_guard) = tracing_appender::non_blocking(appender);
        let file = fmt::layer().with_writer(writer).with_ansi(false);
        layers.push(if settings.json {
            file.json().with_filter(env_filter(&level)).boxed()
        } else {
            file.with_filter(env_filter(&level)).boxed()
        });
        guard = Some(file_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))?;
    Ok(guard)
}

fn split_log_path(path: &Path) -> Result<(PathBuf, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("log file path {} has no file name", path.display()))?
        .to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, name))
}
