use super::{child_label, finish, run_child};
use crate::core::error::AppError;
use crate::core::task_tree::params::{get_count, FlowState, ParamRules, Params};
use crate::core::task_tree::task::{Task, TaskHandler};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;

/// `Flow.Repeat`: the full child list `Times` times.
pub struct RepeatTask;

#[async_trait]
impl TaskHandler for RepeatTask {
    fn name(&self) -> &'static str {
        "Flow.Repeat"
    }

    fn param_rules(&self) -> ParamRules {
        ParamRules::new().required("Times")
    }

    fn sanitize(&self, _task: &Task, params: &Params) -> Result<(), String> {
        match get_count(params, "Times")? {
            Some(_) => Ok(()),
            None => Err("'Times' must be a non-negative integer, got null".to_string()),
        }
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let children = task.children();
        if children.is_empty() {
            task.logger()
                .warning("Skipping execution: no children defined.");
            return Ok(());
        }

        let params = task.params_snapshot().await;
        let times = get_count(&params, "Times")
            .map_err(|reason| AppError::new(ErrorCategory::ValidationError, reason))?
            .unwrap_or(0);

        let mut failures = Vec::new();
        for iteration in 0..times {
            task.logger()
                .debug(format!("Starting iteration {} of {}", iteration + 1, times));
            let flow = FlowState::iteration(iteration);
            for (index, child) in children.iter().enumerate() {
                let label = child_label(&format!("It{}Seq{}", iteration, index + 1), child);
                run_child(task, child, label, flow.clone(), &mut failures).await;
            }
        }
        finish(task, failures)
    }
}
