use super::{child_label, finish, run_child};
use crate::core::error::AppError;
use crate::core::task_tree::condition::Condition;
use crate::core::task_tree::params::{get_bool, get_count, FlowState, ParamRules, Params};
use crate::core::task_tree::task::{Task, TaskHandler};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde_json::Value;

/// `Flow.While`: the child list repeated while a condition over the
/// enclosing scope holds.
///
/// The condition is re-read before every iteration, so children can end the
/// loop by publishing. `Negate` inverts both condition styles. Without `MaxIterations` the loop is bounded by
/// `EngineConfig::while_iteration_cap`.
pub struct WhileTask;

#[async_trait]
impl TaskHandler for WhileTask {
    fn name(&self) -> &'static str {
        "Flow.While"
    }

    fn param_rules(&self) -> ParamRules {
        ParamRules::new()
            .optional("Pattern", Value::Null)
            .optional("Negate", Value::Bool(false))
            .optional("MaxIterations", Value::Null)
    }

    fn sanitize(&self, _task: &Task, params: &Params) -> Result<(), String> {
        Condition::from_params(params)
            .map_err(|err| format!("Invalid condition: {}", err))?;
        get_count(params, "MaxIterations")?;
        Ok(())
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let children = task.children();
        if children.is_empty() {
            task.logger()
                .warning("Skipping execution: no children defined.");
            return Ok(());
        }

        let params = task.params_snapshot().await;
        let condition = Condition::from_params(&params)
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!("Invalid condition: {}", err),
                )
            })?
            .negate_expression(get_bool(&params, "Negate", false));
        let max_iterations = get_count(&params, "MaxIterations")
            .map_err(|reason| AppError::new(ErrorCategory::ValidationError, reason))?;
        let cap = task.ctx().config.while_iteration_cap;
        let engine = task.ctx().engine.clone();
        let text = condition.describe();

        let mut failures = Vec::new();
        let mut iteration: u64 = 0;
        loop {
            match max_iterations {
                Some(max) if iteration >= max => {
                    task.logger().info(format!(
                        "Maximum number of iterations ({}) reached. While loop finalized.",
                        max
                    ));
                    break;
                }
                None if iteration >= cap => {
                    task.logger().warning(format!(
                        "Safety cap of {} iterations reached without 'MaxIterations'. While loop finalized.",
                        cap
                    ));
                    break;
                }
                _ => {}
            }

            let flow = FlowState::iteration(iteration);
            let scope = task.scope().read().await.clone();
            if !condition.evaluate(&engine, &scope, &flow, task.logger()) {
                task.logger().info(format!(
                    "Condition ({}) not verified. While loop finalized.",
                    text
                ));
                break;
            }

            task.logger().info(format!(
                "Condition ({}) verified. Starting iteration {}",
                text, iteration
            ));
            for (index, child) in children.iter().enumerate() {
                let label = child_label(&format!("It{}Seq{}", iteration, index + 1), child);
                run_child(task, child, label, flow.clone(), &mut failures).await;
            }
            iteration += 1;
        }
        finish(task, failures)
    }
}
