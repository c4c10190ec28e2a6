//! JSON-lines run log written next to the workspace.
//!
//! Every event becomes one JSON object, so the `run_id` attached by the task
//! sink can be filtered with ordinary line tools.

use crate::logging::config::LoggingConfig;
use crate::Result;
use anyhow::{anyhow, Context};
use dirs_next::home_dir;
use std::fs::{create_dir_all, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self as tracing_fmt, format, writer::BoxMakeWriter};
use tracing_subscriber::registry::LookupSpan;

pub const LOG_FILE_NAME: &str = "tasktree.log";

pub type FileFmtLayer<S> =
    tracing_fmt::Layer<S, format::JsonFields, format::Format<format::Json>, BoxMakeWriter>;

pub type FileLayerStack<S> = tracing_subscriber::layer::Layered<FileFmtLayer<S>, S>;

/// `<log_dir>/tasktree.log`, where `log_dir` defaults to
/// `<workspace>/.tasktree/logs` (or `~/.tasktree/logs` without a workspace).
pub fn log_file_path(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    let anchor = match workspace_root {
        Some(workspace) => workspace.to_path_buf(),
        None => home_dir().ok_or_else(|| anyhow!("$HOME directory unavailable"))?,
    };

    let base = normalize(&anchor);
    let directory = match &config.log_dir {
        Some(custom) if custom.is_absolute() => custom.clone(),
        Some(custom) => {
            let joined = normalize(&base.join(custom));
            if !joined.starts_with(&base) {
                return Err(anyhow!(
                    "logging.log_dir '{}' resolves outside {}",
                    custom.display(),
                    anchor.display()
                ));
            }
            joined
        }
        None => base.join(".tasktree").join("logs"),
    };
    Ok(directory.join(LOG_FILE_NAME))
}

/// JSON layer appending to `log_file` through a non-blocking writer, or a
/// layer discarding everything when the file sink is disabled.
pub fn file_layer<S>(
    log_file: &Path,
    enabled: bool,
) -> Result<(FileFmtLayer<S>, Option<WorkerGuard>)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if !enabled {
        return Ok((json_layer(BoxMakeWriter::new(io::sink)), None));
    }

    if let Some(directory) = log_file.parent() {
        create_dir_all(directory)
            .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let layer = json_layer(BoxMakeWriter::new(move || non_blocking.clone()));
    Ok((layer, Some(guard)))
}

fn json_layer<S>(writer: BoxMakeWriter) -> FileFmtLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(false)
        .with_current_span(false)
        .with_span_list(false)
}

/// Canonical form when the path exists, otherwise the path with `.` and `..`
/// components folded lexically.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let mut folded = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other.as_os_str()),
        }
    }
    folded
}
