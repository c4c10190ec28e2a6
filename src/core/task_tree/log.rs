//! Logging capability handed to every task at construction.
//!
//! Tasks never reach for a global logger: each one holds a [`TaskLogger`]
//! that pairs a [`LogSink`] with the label path of the node, so a run can be
//! reconstructed from its log lines alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Severity accepted by a [`LogSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        };
        f.write_str(text)
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warning" | "warn" => Ok(Level::Warning),
            "error" => Ok(Level::Error),
            "critical" => Ok(Level::Critical),
            _ => Err(format!(
                "invalid severity '{}'; supported values are Debug, Info, Warning, Error, Critical",
                value
            )),
        }
    }
}

/// Destination for task log lines. Must not fail or panic.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

impl<F> LogSink for F
where
    F: Fn(Level, &str) + Send + Sync,
{
    fn log(&self, level: Level, message: &str) {
        self(level, message)
    }
}

/// Sink that forwards every line to `tracing`, tagged with the run id.
pub struct TracingSink {
    run_id: String,
}

impl TracingSink {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }
}

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str) {
        let run_id = self.run_id.as_str();
        match level {
            Level::Debug => tracing::debug!(run_id, "{}", message),
            Level::Info => tracing::info!(run_id, "{}", message),
            Level::Warning => tracing::warn!(run_id, "{}", message),
            Level::Error => tracing::error!(run_id, "{}", message),
            Level::Critical => tracing::error!(run_id, critical = true, "{}", message),
        }
    }
}

/// One line captured by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
}

/// Sink that keeps every line in memory; used by the runner summary and tests.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Messages at or above `level`.
    pub fn messages_at_least(&self, level: Level) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.level >= level)
            .map(|entry| entry.message)
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|entry| entry.message.contains(needle))
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str) {
        let entry = LogEntry {
            level,
            message: message.to_string(),
        };
        match self.entries.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

/// A sink bound to the label path of one node.
#[derive(Clone)]
pub struct TaskLogger {
    sink: Arc<dyn LogSink>,
    path: String,
}

impl TaskLogger {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            path: String::new(),
        }
    }

    /// Logger for a child node, nested under this node's path.
    pub fn child(&self, label: &str) -> TaskLogger {
        let path = if self.path.is_empty() {
            label.to_string()
        } else {
            format!("{}/{}", self.path, label)
        };
        TaskLogger {
            sink: Arc::clone(&self.sink),
            path,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn log(&self, level: Level, message: impl AsRef<str>) {
        if self.path.is_empty() {
            self.sink.log(level, message.as_ref());
        } else {
            self.sink
                .log(level, &format!("[{}] {}", self.path, message.as_ref()));
        }
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(Level::Debug, message);
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.log(Level::Info, message);
    }

    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(Level::Warning, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.log(Level::Error, message);
    }
}
