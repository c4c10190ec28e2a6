use super::requested_verdict;
use crate::core::error::AppError;
use crate::core::task_tree::log::Level;
use crate::core::task_tree::params::{get_str, stringify, ParamRules, Params};
use crate::core::task_tree::task::{Task, TaskHandler};
use async_trait::async_trait;
use serde_json::Value;

/// `Run.Message`: writes `Message` to the run log at `Severity`.
pub struct MessageTask;

fn severity(params: &Params) -> Result<Level, String> {
    get_str(params, "Severity").unwrap_or("Info").parse()
}

#[async_trait]
impl TaskHandler for MessageTask {
    fn name(&self) -> &'static str {
        "Run.Message"
    }

    fn param_rules(&self) -> ParamRules {
        ParamRules::new()
            .optional("Severity", Value::String("Info".to_string()))
            .required("Message")
            .optional("Verdict", Value::Null)
    }

    fn sanitize(&self, _task: &Task, params: &Params) -> Result<(), String> {
        severity(params)?;
        requested_verdict(params)?;
        Ok(())
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let params = task.params_snapshot().await;
        let level = severity(&params).unwrap_or(Level::Info);
        let message = params.get("Message").map(stringify).unwrap_or_default();
        task.logger().log(level, message);
        task.set_verdict(requested_verdict(&params).unwrap_or_default());
        Ok(())
    }
}
