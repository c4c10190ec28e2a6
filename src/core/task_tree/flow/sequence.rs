use super::{child_label, finish, run_child};
use crate::core::error::AppError;
use crate::core::task_tree::params::FlowState;
use crate::core::task_tree::task::{Task, TaskHandler};
use async_trait::async_trait;

/// `Flow.Sequence`: every child once, in order.
pub struct SequenceTask;

#[async_trait]
impl TaskHandler for SequenceTask {
    fn name(&self) -> &'static str {
        "Flow.Sequence"
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let children = task.children();
        if children.is_empty() {
            task.logger()
                .warning("Skipping execution: no children defined.");
            return Ok(());
        }

        let mut failures = Vec::new();
        for (index, child) in children.iter().enumerate() {
            let label = child_label(&format!("Seq{}", index + 1), child);
            run_child(task, child, label, FlowState::empty(), &mut failures).await;
        }
        finish(task, failures)
    }
}
