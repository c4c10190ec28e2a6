use crate::core::error::AppError;
use crate::core::task_tree::log::TaskLogger;
use crate::core::task_tree::params::{get_str, ParamRules, Params};
use crate::core::task_tree::task::{Task, TaskHandler};
use crate::core::task_tree::verdict::Verdict;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// `Run.CliExecute`: runs a program and logs its output line by line.
///
/// `Parameters` is a list of strings (or one string); every entry is split on
/// whitespace. Relative `CWD` values are resolved against
/// `EngineConfig::default_cwd` when one is configured. Exit code 0 gives
/// `Pass`, anything else `Fail`.
pub struct CliExecuteTask;

fn command_line(params: &Params) -> Result<Vec<String>, String> {
    let parts: Vec<String> = match params.get("Parameters") {
        Some(Value::String(line)) => line.split_whitespace().map(str::to_string).collect(),
        Some(Value::Array(items)) => {
            let mut parts = Vec::new();
            for item in items {
                let item = item.as_str().ok_or_else(|| {
                    format!("'Parameters' entries must be strings, got {}", item)
                })?;
                parts.extend(item.split_whitespace().map(str::to_string));
            }
            parts
        }
        Some(other) => {
            return Err(format!(
                "'Parameters' must be a list of strings, got {}",
                other
            ))
        }
        None => return Err("'Parameters' is missing".to_string()),
    };
    if parts.is_empty() {
        return Err("'Parameters' must name a program".to_string());
    }
    Ok(parts)
}

async fn forward_lines<R>(reader: R, logger: TaskLogger)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => logger.info(format!("[CLI]{}", line.trim_end())),
            Ok(None) => break,
            Err(err) => {
                logger.info(format!("[CLI]DECODING EXCEPTION: {}", err));
                break;
            }
        }
    }
}

#[async_trait]
impl TaskHandler for CliExecuteTask {
    fn name(&self) -> &'static str {
        "Run.CliExecute"
    }

    fn param_rules(&self) -> ParamRules {
        ParamRules::new().required("Parameters").required("CWD")
    }

    fn sanitize(&self, _task: &Task, params: &Params) -> Result<(), String> {
        command_line(params)?;
        get_str(params, "CWD")
            .map(|_| ())
            .ok_or_else(|| "'CWD' must be a string".to_string())
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let params = task.params_snapshot().await;
        let parts = command_line(&params)
            .map_err(|reason| AppError::new(ErrorCategory::ValidationError, reason))?;
        let mut cwd = PathBuf::from(get_str(&params, "CWD").unwrap_or("."));
        if cwd.is_relative() {
            if let Some(base) = &task.ctx().config.default_cwd {
                cwd = base.join(cwd);
            }
        }

        task.logger().info(format!(
            "Executing '{}' in {}",
            parts.join(" "),
            cwd.display()
        ));

        let mut child = Command::new(&parts[0])
            .args(&parts[1..])
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                let mut error = AppError::new(
                    ErrorCategory::ExecutionError,
                    format!("failed to execute '{}': {}", parts[0], err),
                )
                .with_code("TT-CLI-001");
                error.add_context("cwd", &cwd.display().to_string());
                error
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let logger = task.logger().clone();
        tokio::join!(
            async {
                if let Some(stdout) = stdout {
                    forward_lines(stdout, logger.clone()).await;
                }
            },
            async {
                if let Some(stderr) = stderr {
                    forward_lines(stderr, logger.clone()).await;
                }
            }
        );

        let status = child.wait().await.map_err(|err| {
            AppError::new(
                ErrorCategory::ExecutionError,
                format!("failed to wait for '{}': {}", parts[0], err),
            )
            .with_code("TT-CLI-002")
        })?;

        let code = status.code().unwrap_or(-1);
        if status.success() {
            task.set_verdict(Verdict::Pass);
        } else {
            task.logger()
                .warning(format!("'{}' exited with code {}", parts[0], code));
            task.set_verdict(Verdict::Fail);
        }
        Ok(())
    }
}
