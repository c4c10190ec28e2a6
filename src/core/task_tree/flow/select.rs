use super::{child_label, finish, run_child};
use crate::core::error::AppError;
use crate::core::task_tree::condition::Condition;
use crate::core::task_tree::params::{FlowState, ParamRules, Params};
use crate::core::task_tree::task::{Task, TaskHandler};
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde_json::Value;

const DEFAULT_BRANCH_TEXT: &str = "None of the previous conditions are verified (default)";

/// `Flow.Select`: runs the child of the first verified condition, or the
/// trailing default child when there is one more child than conditions.
pub struct SelectTask;

fn parse_conditions(params: &Params) -> Result<Vec<Condition>, String> {
    let conditions = match params.get("Conditions") {
        Some(Value::Array(conditions)) => conditions,
        Some(other) => {
            return Err(format!(
                "Invalid 'Conditions' type: expected list, got {}",
                other
            ))
        }
        None => return Err("'Conditions' is missing".to_string()),
    };
    conditions
        .iter()
        .enumerate()
        .map(|(index, condition)| {
            Condition::from_value(condition)
                .map_err(|err| format!("Invalid condition in position {}: {}", index, err))
        })
        .collect()
}

#[async_trait]
impl TaskHandler for SelectTask {
    fn name(&self) -> &'static str {
        "Flow.Select"
    }

    fn param_rules(&self) -> ParamRules {
        ParamRules::new().required("Conditions")
    }

    fn sanitize(&self, task: &Task, params: &Params) -> Result<(), String> {
        let conditions = parse_conditions(params)?;
        let children = task.children().len();
        if conditions.len() != children && conditions.len() + 1 != children {
            return Err(format!(
                "Invalid number of conditions ({}): Must be the same or one less than child tasks ({})",
                conditions.len(),
                children
            ));
        }
        Ok(())
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let children = task.children();
        let params = task.params_snapshot().await;
        let conditions = parse_conditions(&params)
            .map_err(|reason| AppError::new(ErrorCategory::ValidationError, reason))?;
        let engine = task.ctx().engine.clone();
        let scope = task.scope().read().await.clone();

        let mut selected = conditions.iter().enumerate().find_map(|(index, condition)| {
            condition
                .evaluate(&engine, &scope, &FlowState::empty(), task.logger())
                .then(|| (index, condition.describe()))
        });
        if selected.is_none() && conditions.len() < children.len() {
            selected = Some((children.len() - 1, DEFAULT_BRANCH_TEXT.to_string()));
        }

        let Some((branch, text)) = selected else {
            task.logger()
                .info("Conditions not verified for any branch. Nothing executed.");
            return Ok(());
        };

        task.logger().info(format!(
            "Condition \"{}\" verified for branch {}. Executing.",
            text, branch
        ));
        let child = &children[branch];
        let mut failures = Vec::new();
        run_child(
            task,
            child,
            child_label(&format!("Case{}", branch), child),
            FlowState::branch(branch),
            &mut failures,
        )
        .await;
        finish(task, failures)
    }
}
