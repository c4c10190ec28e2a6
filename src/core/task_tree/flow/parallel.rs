use super::panic_error;
use crate::core::error::AppError;
use crate::core::task_tree::params::{get_bool, shared, FlowState, ParamRules, Params};
use crate::core::task_tree::task::{Task, TaskHandler};
use crate::core::task_tree::verdict::Verdict;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;

/// `Flow.Parallel`: every child on its own tokio task, joined before
/// returning.
///
/// Branches are expanded from one snapshot of the enclosing scope taken at
/// fork time and run against private copies of it. Their vaults reach the
/// scope only with `PublishVault: true`, after the join, in declaration
/// order.
pub struct ParallelTask;

type BranchHandle = tokio::task::JoinHandle<(Task, Result<Verdict, String>)>;

#[async_trait]
impl TaskHandler for ParallelTask {
    fn name(&self) -> &'static str {
        "Flow.Parallel"
    }

    fn param_rules(&self) -> ParamRules {
        ParamRules::new().optional("PublishVault", Value::Bool(false))
    }

    async fn run(&self, task: &mut Task) -> Result<(), AppError> {
        let children = task.children();
        if children.is_empty() {
            task.logger()
                .warning("Skipping parallel execution: no children defined.");
            return Ok(());
        }

        let publish_vault = get_bool(&task.params_snapshot().await, "PublishVault", false);
        let scope = task.scope();
        let snapshot = scope.read().await.clone();
        let ctx = task.ctx().clone();

        task.logger().info(format!(
            "Starting parallel execution ({} children)",
            children.len()
        ));

        let mut labels = Vec::with_capacity(children.len());
        let mut handles: Vec<Option<BranchHandle>> = Vec::with_capacity(children.len());
        for (position, child) in children.iter().enumerate() {
            let index = position + 1;
            let label = child
                .label
                .clone()
                .unwrap_or_else(|| format!("Br{}", index));

            let created = ctx
                .expander
                .expand(&child.config, &snapshot, &FlowState::empty())
                .and_then(|params| {
                    Task::new(
                        child,
                        label.clone(),
                        params,
                        Some(shared(snapshot.clone())),
                        ctx.clone(),
                        task.logger(),
                    )
                });
            let handle = match created {
                Ok(mut branch) => {
                    let handle = tokio::spawn(async move {
                        let outcome = AssertUnwindSafe(branch.start()).catch_unwind().await;
                        let result = match outcome {
                            Ok(Ok(verdict)) => Ok(verdict),
                            Ok(Err(err)) => Err(err.to_string()),
                            Err(payload) => Err(panic_error(branch.label(), payload).message),
                        };
                        (branch, result)
                    });
                    task.logger()
                        .debug(format!("Started branch {}: {}", index, label));
                    Some(handle)
                }
                Err(err) => {
                    task.logger().error(format!(
                        "Unable to start branch {} ({}): {}",
                        index, label, err
                    ));
                    None
                }
            };
            labels.push((index, label));
            handles.push(handle);
        }

        let joined = join_all(handles.into_iter().map(|handle| async move {
            match handle {
                Some(handle) => Some(handle.await),
                None => None,
            }
        }))
        .await;

        let mut published = Vec::new();
        for ((index, label), result) in labels.into_iter().zip(joined) {
            let (verdict, vault) = match result {
                None => (Verdict::Error, Params::new()),
                Some(Ok((branch, Ok(verdict)))) => (verdict, branch.vault().clone()),
                Some(Ok((branch, Err(reason)))) => {
                    task.logger().error(format!(
                        "Exception in branch {} ({}): {}",
                        index, label, reason
                    ));
                    (Verdict::Error, branch.vault().clone())
                }
                Some(Err(join_error)) => {
                    task.logger().error(format!(
                        "Branch {} ({}) could not be joined: {}",
                        index, label, join_error
                    ));
                    (Verdict::Error, Params::new())
                }
            };
            task.logger().debug(format!(
                "Branch {} ({}) joined with verdict {}",
                index, label, verdict
            ));
            task.merge_verdict(verdict);
            published.push(vault);
        }

        if publish_vault {
            let mut scope = scope.write().await;
            for vault in &published {
                for (key, value) in vault {
                    scope.insert(key.clone(), value.clone());
                }
            }
            drop(scope);
            for vault in &published {
                task.merge_vault(vault);
            }
        }

        task.logger()
            .info("Finished execution of all child tasks");
        Ok(())
    }
}
