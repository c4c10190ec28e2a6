use crate::core::error::AppError;
use crate::core::task_tree::params::{ParamRules, Params};
use crate::core::task_tree::task::{Task, TaskHandler};
use crate::core::task_tree::verdict::Verdict;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// `Run.Delay`: waits `Time`, given in seconds or as a humantime string.
pub struct DelayTask;

fn parse_time(params: &Params) -> Result<Duration, String> {
    match params.get("Time") {
        Some(Value::Number(seconds)) => match seconds.as_f64() {
            Some(seconds) if seconds >= 0.0 && seconds.is_finite() => {
                Ok(Duration::from_secs_f64(seconds))
            }
            _ => Err(format!("'Time' must be a non-negative number, got {}", seconds)),
        },
        Some(Value::String(text)) => humantime::parse_duration(text.trim())
            .map_err(|err| format!("invalid 'Time' '{}': {}", text, err)),
        Some(other) => Err(format!(
            "'Time' must be seconds or a duration string, got {}",
            other
        )),
        None => Err("'Time' is missing".to_string()),
    }
}

#[async_trait]
impl TaskHandler for DelayTask {
    fn name(&self) -> &'static str {
        "Run.Delay"
    }

    fn param_rules(&self) -> ParamRules {
        ParamRules::new().required("Time")
    }

    fn sanitize(&self, _task: &Task, params: &Params) -> Result<(), String> {
        parse_time(params).map(|_| ())
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let duration = parse_time(&task.params_snapshot().await)
            .map_err(|reason| AppError::new(ErrorCategory::ValidationError, reason))?;
        task.logger().info(format!(
            "Waiting for {}",
            humantime::format_duration(duration)
        ));
        tokio::time::sleep(duration).await;
        task.set_verdict(Verdict::Pass);
        Ok(())
    }
}
