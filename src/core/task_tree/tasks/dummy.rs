use super::requested_verdict;
use crate::core::error::AppError;
use crate::core::task_tree::params::{ParamRules, Params};
use crate::core::task_tree::task::{Task, TaskHandler};
use async_trait::async_trait;
use serde_json::Value;

/// `Run.Dummy`: logs its parameters and finishes with `Verdict` (default
/// `Pass`).
pub struct DummyTask;

#[async_trait]
impl TaskHandler for DummyTask {
    fn name(&self) -> &'static str {
        "Run.Dummy"
    }

    fn param_rules(&self) -> ParamRules {
        ParamRules::new().optional("Verdict", Value::Null)
    }

    fn sanitize(&self, _task: &Task, params: &Params) -> Result<(), String> {
        requested_verdict(params).map(|_| ())
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let params = task.params_snapshot().await;
        task.logger().info(format!(
            "Dummy task running with parameters: {}",
            Value::Object(params.clone())
        ));
        let verdict = requested_verdict(&params).unwrap_or_default();
        task.set_verdict(verdict);
        Ok(())
    }
}
