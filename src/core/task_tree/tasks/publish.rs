use crate::core::error::AppError;
use crate::core::task_tree::task::{Task, TaskHandler};
use crate::core::task_tree::verdict::Verdict;
use async_trait::async_trait;

/// `Run.Publish`: publishes every configured key to the enclosing scope.
pub struct PublishTask;

#[async_trait]
impl TaskHandler for PublishTask {
    fn name(&self) -> &'static str {
        "Run.Publish"
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let params = task.params_snapshot().await;
        for (key, value) in params {
            task.logger().debug(format!("Publishing {} = {}", key, value));
            task.publish(key, value).await;
        }
        task.set_verdict(Verdict::Pass);
        Ok(())
    }
}
