//! Built-in leaf tasks.

mod cli_execute;
mod delay;
mod dummy;
mod message;
mod publish;

pub use cli_execute::CliExecuteTask;
pub use delay::DelayTask;
pub use dummy::DummyTask;
pub use message::MessageTask;
pub use publish::PublishTask;

use crate::core::task_tree::params::Params;
use crate::core::task_tree::verdict::Verdict;
use serde_json::Value;

/// Verdict requested through an optional `Verdict` parameter.
pub(crate) fn requested_verdict(params: &Params) -> Result<Verdict, String> {
    match params.get("Verdict") {
        None | Some(Value::Null) => Ok(Verdict::Pass),
        Some(Value::String(text)) => text.parse(),
        Some(other) => Err(format!("'Verdict' must be a string, got {}", other)),
    }
}
