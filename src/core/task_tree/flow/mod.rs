//! Flow-control tasks: Sequence, Repeat, While, Select and Parallel.
//!
//! Combinators are transparent: their children are expanded against, and
//! publish into, the combinator's own enclosing scope.

#![allow(clippy::result_large_err)]

mod parallel;
mod repeat;
mod select;
mod sequence;
mod while_loop;

pub use parallel::ParallelTask;
pub use repeat::RepeatTask;
pub use select::SelectTask;
pub use sequence::SequenceTask;
pub use while_loop::WhileTask;

use crate::core::error::AppError;
use crate::core::task_tree::definition::TaskDefinition;
use crate::core::task_tree::log::TaskLogger;
use crate::core::task_tree::params::{FlowState, Params, SharedParams};
use crate::core::task_tree::task::{RunContext, Task};
use crate::core::task_tree::verdict::Verdict;
use crate::core::types::ErrorCategory;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Result of running one child to completion.
pub struct ChildOutcome {
    pub verdict: Verdict,
    pub vault: Params,
    pub failure: Option<AppError>,
}

impl ChildOutcome {
    fn failed(error: AppError) -> Self {
        Self {
            verdict: Verdict::Error,
            vault: Params::new(),
            failure: Some(error),
        }
    }
}

/// `prefix`, or `prefix.Label` when the definition carries a label.
pub(crate) fn child_label(prefix: &str, definition: &TaskDefinition) -> String {
    match &definition.label {
        Some(label) => format!("{}.{}", prefix, label),
        None => prefix.to_string(),
    }
}

/// Expand, construct and run one child inside `scope`, then merge its vault
/// into that scope.
///
/// Expansion reads a snapshot of the scope; no lock is held while the child
/// runs. Errors and panics are logged through `logger` and reported in the
/// outcome.
pub async fn invoke_child(
    scope: &SharedParams,
    ctx: &Arc<RunContext>,
    logger: &TaskLogger,
    definition: &TaskDefinition,
    label: String,
    flow: FlowState,
) -> ChildOutcome {
    let snapshot = scope.read().await.clone();

    let params = match ctx.expander.expand(&definition.config, &snapshot, &flow) {
        Ok(params) => params,
        Err(err) => {
            logger.error(format!(
                "Unable to expand parameters of {} ({}): {}",
                label, definition.task_name, err
            ));
            return ChildOutcome::failed(err);
        }
    };

    let mut child = match Task::new(
        definition,
        label.clone(),
        params,
        Some(Arc::clone(scope)),
        Arc::clone(ctx),
        logger,
    ) {
        Ok(child) => child,
        Err(err) => {
            logger.error(format!("Unable to create {}: {}", label, err));
            return ChildOutcome::failed(err);
        }
    };

    let outcome = AssertUnwindSafe(child.start()).catch_unwind().await;
    let (verdict, failure) = match outcome {
        Ok(Ok(verdict)) => (verdict, None),
        Ok(Err(err)) => {
            logger.error(format!("Exception while running {}: {}", label, err));
            (Verdict::Error, Some(err))
        }
        Err(payload) => {
            let err = panic_error(&label, payload);
            logger.error(err.message.clone());
            (Verdict::Error, Some(err))
        }
    };

    let vault = child.vault().clone();
    if !vault.is_empty() {
        let mut scope = scope.write().await;
        for (key, value) in &vault {
            scope.insert(key.clone(), value.clone());
        }
    }

    ChildOutcome {
        verdict,
        vault,
        failure,
    }
}

/// Run one child and fold its outcome into `flow_task`: vault merged,
/// verdict maxed, failure label recorded.
pub(crate) async fn run_child(
    flow_task: &mut Task,
    definition: &TaskDefinition,
    label: String,
    flow: FlowState,
    failures: &mut Vec<String>,
) {
    let scope = flow_task.scope();
    let ctx = Arc::clone(flow_task.ctx());
    let logger = flow_task.logger().clone();
    let outcome = invoke_child(&scope, &ctx, &logger, definition, label.clone(), flow).await;
    flow_task.merge_vault(&outcome.vault);
    flow_task.merge_verdict(outcome.verdict);
    if outcome.failure.is_some() {
        failures.push(label);
    }
}

/// Raise a single error naming every failed child, if any.
pub(crate) fn finish(flow_task: &Task, failures: Vec<String>) -> Result<(), AppError> {
    if failures.is_empty() {
        return Ok(());
    }
    let mut err = AppError::new(
        ErrorCategory::ExecutionError,
        format!(
            "{} child task(s) of {} failed: {}",
            failures.len(),
            flow_task.label(),
            failures.join(", ")
        ),
    )
    .with_code("TT-FLOW-001");
    err.add_context("task", flow_task.name());
    Err(err)
}

pub(crate) fn panic_error(label: &str, payload: Box<dyn Any + Send>) -> AppError {
    let reason = if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic payload".to_string()
    };
    AppError::new(
        ErrorCategory::InternalError,
        format!("{} panicked: {}", label, reason),
    )
    .with_code("TT-FLOW-002")
}
