#![allow(clippy::result_large_err)] // Registry validation returns AppError directly for structured diagnostics without boxing.

use crate::core::error::AppError;
use crate::core::task_tree::definition::TaskDefinition;
use crate::core::task_tree::expression::ExpressionEngine;
use crate::core::task_tree::flow::{ParallelTask, RepeatTask, SelectTask, SequenceTask, WhileTask};
use crate::core::task_tree::task::TaskHandler;
use crate::core::task_tree::tasks::{
    CliExecuteTask, DelayTask, DummyTask, MessageTask, PublishTask,
};
use crate::core::types::ErrorCategory;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Builder used to register task handlers before a run.
pub struct TaskRegistryBuilder {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl Default for TaskRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistryBuilder {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register<T: TaskHandler>(&mut self, handler: T) -> &mut Self {
        let name = handler.name();
        if self.handlers.contains_key(name) {
            panic!("duplicate task registered: {}", name);
        }
        self.handlers.insert(name.to_string(), Arc::new(handler));
        self
    }

    pub fn build(self) -> TaskRegistry {
        TaskRegistry {
            inner: Arc::new(self.handlers),
        }
    }
}

/// Immutable map from task name to handler, shared by a whole run.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        TaskRegistryBuilder::new().build()
    }

    pub fn builder() -> TaskRegistryBuilder {
        TaskRegistryBuilder::new()
    }

    /// Registry holding every flow combinator and built-in leaf.
    pub fn with_builtins() -> Self {
        let mut builder = TaskRegistryBuilder::new();
        register_builtins(&mut builder);
        builder.build()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.inner.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Check that every node names a registered task.
    pub fn validate_definition(&self, definition: &TaskDefinition) -> Result<(), AppError> {
        let mut nodes = Vec::new();
        definition.walk(&mut |node| nodes.push(node));
        for node in nodes {
            if !self.contains(&node.task_name) {
                let mut err = AppError::new(
                    ErrorCategory::DefinitionError,
                    format!("unknown task '{}'", node.task_name),
                )
                .with_code("TT-REG-001");
                err.add_context("label", node.display_label());
                return Err(err);
            }
        }
        Ok(())
    }

    /// Compile problems in literal `Evaluate` expressions, one line per
    /// expression.
    ///
    /// These are advisory: at run time a broken condition is simply not
    /// verified. Expressions containing `@[` references are only known after
    /// expansion and are skipped.
    pub fn expression_warnings(
        &self,
        definition: &TaskDefinition,
        engine: &ExpressionEngine,
    ) -> Vec<String> {
        let mut warnings = Vec::new();
        definition.walk(&mut |node| {
            let mut expressions = Vec::new();
            collect_evaluate_strings(&Value::Object(node.config.clone()), &mut expressions);
            for expr in expressions.iter().filter(|expr| !expr.contains("@[")) {
                if let Err(err) = engine.compile(expr) {
                    warnings.push(format!("{}: {}", node.display_label(), err.message));
                }
            }
        });
        warnings
    }
}

pub fn register_builtins(builder: &mut TaskRegistryBuilder) {
    builder
        .register(SequenceTask)
        .register(RepeatTask)
        .register(WhileTask)
        .register(SelectTask)
        .register(ParallelTask)
        .register(DummyTask)
        .register(MessageTask)
        .register(PublishTask)
        .register(DelayTask)
        .register(CliExecuteTask);
}

fn collect_evaluate_strings(value: &Value, expressions: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                match (key.as_str(), child) {
                    ("Evaluate", Value::String(expr)) | ("$expr", Value::String(expr)) => {
                        expressions.push(expr.clone())
                    }
                    _ => collect_evaluate_strings(child, expressions),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_evaluate_strings(item, expressions);
            }
        }
        _ => {}
    }
}
