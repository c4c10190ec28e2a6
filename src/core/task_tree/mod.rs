//! Task-tree execution engine.
//!
//! A tree of [`TaskDefinition`]s is interpreted at run time: each node is
//! turned into a [`Task`] just before it runs, with parameters expanded
//! against the enclosing scope, and its [`Verdict`] and vault are folded into
//! its parent when it finishes.

pub mod condition;
pub mod definition;
pub mod expansion;
pub mod expression;
pub mod flow;
pub mod log;
pub mod params;
pub mod registry;
pub mod runner;
pub mod task;
pub mod tasks;
pub mod verdict;

pub use condition::{Condition, ConditionError};
pub use definition::{ExperimentDocument, TaskDefinition};
pub use expansion::{ParamExpander, TemplateExpander};
pub use expression::{EvaluationContext, ExpressionEngine};
pub use log::{Level, LogSink, MemorySink, TaskLogger, TracingSink};
pub use params::{FlowState, ParamRules, Params, SharedParams};
pub use registry::{register_builtins, TaskRegistry, TaskRegistryBuilder};
pub use runner::{parse_override, ExperimentRunner, RunSummary};
pub use task::{RunContext, Task, TaskHandler};
pub use verdict::Verdict;
