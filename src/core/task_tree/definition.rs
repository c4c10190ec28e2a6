#![allow(clippy::result_large_err)] // Definition parsing returns AppError so the failing node's position travels with the reason.

use crate::core::error::AppError;
use crate::core::task_tree::params::Params;
use crate::core::types::ErrorCategory;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Immutable description of one node of a task tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskDefinition {
    pub task_name: String,
    pub order: Option<i64>,
    pub label: Option<String>,
    pub config: Params,
    pub requirements: Vec<String>,
    pub children: Vec<TaskDefinition>,
}

impl TaskDefinition {
    /// Parse a node and its descendants.
    ///
    /// First-level nodes must carry `Order` and may carry `Requirements`.
    /// Nested nodes must carry neither; their `Order` is set to their 1-based
    /// position in the parent's `Children` list.
    pub fn from_mapping(value: &Value, is_first_level: bool) -> Result<Self, AppError> {
        let map = value.as_object().ok_or_else(|| {
            definition_error(format!("task node must be a mapping, got {}", kind(value)))
        })?;

        let task_name = match map.get("Task") {
            None | Some(Value::Null) => {
                return Err(definition_error("Missing \"Task\" field").with_code("TT-DEF-002"))
            }
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
            Some(other) => {
                return Err(definition_error(format!(
                    "\"Task\" must be a non-empty string, got {}",
                    kind(other)
                )))
            }
        };

        let order = match map.get("Order") {
            None | Some(Value::Null) => None,
            Some(Value::Number(number)) if number.is_i64() => number.as_i64(),
            Some(other) => {
                return Err(definition_error(format!(
                    "\"Order\" must be an integer, got {}",
                    other
                )))
            }
        };
        if is_first_level && order.is_none() {
            return Err(
                definition_error("Missing \"Order\" on a first level task").with_code("TT-DEF-003")
            );
        }
        if !is_first_level && order.is_some() {
            return Err(definition_error(
                "\"Order\" cannot be defined on a child task (uses list order)",
            )
            .with_code("TT-DEF-004"));
        }

        let label = match map.get("Label") {
            None | Some(Value::Null) => None,
            Some(Value::String(label)) => Some(label.clone()),
            Some(other) => {
                return Err(definition_error(format!(
                    "\"Label\" must be a string, got {}",
                    kind(other)
                )))
            }
        };

        let config = match map.get("Config") {
            None | Some(Value::Null) => Params::new(),
            Some(Value::Object(config)) => config.clone(),
            Some(other) => {
                return Err(definition_error(format!(
                    "\"Config\" must be a mapping, got {}",
                    kind(other)
                )))
            }
        };

        let requirements = match map.get("Requirements") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        definition_error(format!(
                            "\"Requirements\" entries must be strings, got {}",
                            kind(item)
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(other) => {
                return Err(definition_error(format!(
                    "\"Requirements\" must be a list, got {}",
                    kind(other)
                )))
            }
        };
        if !is_first_level && !requirements.is_empty() {
            return Err(
                definition_error("\"Requirements\" cannot be defined on a child task")
                    .with_code("TT-DEF-005"),
            );
        }

        let children = match map.get("Children") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => {
                let mut children = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    let mut child = TaskDefinition::from_mapping(item, false).map_err(|err| {
                        let mut wrapped = definition_error(format!(
                            "Incorrect definition of child task {}: {}",
                            index + 1,
                            err.message
                        ))
                        .with_code("TT-DEF-006");
                        wrapped.add_context("cause", &err.code);
                        wrapped
                    })?;
                    child.order = Some(index as i64 + 1);
                    children.push(child);
                }
                children
            }
            Some(other) => {
                return Err(definition_error(format!(
                    "\"Children\" must be a list, got {}",
                    kind(other)
                )))
            }
        };

        Ok(TaskDefinition {
            task_name,
            order,
            label,
            config,
            requirements,
            children,
        })
    }

    /// Label used in logs: the explicit `Label`, or else the task name.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.task_name)
    }

    /// Visit this node and every descendant, depth first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a TaskDefinition)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

/// A declarative experiment: global parameters plus first-level tasks.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentDocument {
    pub name: Option<String>,
    pub parameters: Params,
    pub tasks: Vec<TaskDefinition>,
    /// SHA-256 of the source text, hex encoded; empty when built in memory.
    pub source_hash: String,
}

impl ExperimentDocument {
    /// Accepts either `{Name?, Parameters?, Tasks: [...]}` or a bare list of
    /// first-level nodes.
    pub fn from_value(value: &Value) -> Result<Self, AppError> {
        let (name, parameters, nodes) = match value {
            Value::Array(nodes) => (None, Params::new(), nodes.as_slice()),
            Value::Object(map) => {
                let name = match map.get("Name") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(name)) => Some(name.clone()),
                    Some(other) => {
                        return Err(definition_error(format!(
                            "\"Name\" must be a string, got {}",
                            kind(other)
                        )))
                    }
                };
                let parameters = match map.get("Parameters") {
                    None | Some(Value::Null) => Params::new(),
                    Some(Value::Object(parameters)) => parameters.clone(),
                    Some(other) => {
                        return Err(definition_error(format!(
                            "\"Parameters\" must be a mapping, got {}",
                            kind(other)
                        )))
                    }
                };
                let nodes = match map.get("Tasks") {
                    Some(Value::Array(nodes)) => nodes.as_slice(),
                    None | Some(Value::Null) => {
                        return Err(definition_error("Missing \"Tasks\" list"))
                    }
                    Some(other) => {
                        return Err(definition_error(format!(
                            "\"Tasks\" must be a list, got {}",
                            kind(other)
                        )))
                    }
                };
                (name, parameters, nodes)
            }
            other => {
                return Err(definition_error(format!(
                    "experiment document must be a mapping or a list, got {}",
                    kind(other)
                )))
            }
        };

        let mut tasks = Vec::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            let task = TaskDefinition::from_mapping(node, true).map_err(|err| {
                let mut wrapped = definition_error(format!(
                    "Incorrect definition of task {}: {}",
                    index + 1,
                    err.message
                ))
                .with_code(err.code.clone());
                wrapped.add_context("position", &(index + 1).to_string());
                wrapped
            })?;
            tasks.push(task);
        }

        Ok(ExperimentDocument {
            name,
            parameters,
            tasks,
            source_hash: String::new(),
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, AppError> {
        let value: Value = serde_yaml::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("failed to parse experiment document: {}", err),
            )
            .with_code("TT-DEF-007")
        })?;
        let mut document = ExperimentDocument::from_value(&value)?;
        document.source_hash = hex::encode(Sha256::digest(text.as_bytes()));
        Ok(document)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            let mut err = AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
            .with_code("TT-DEF-007");
            err.add_context("path", &path.display().to_string());
            err
        })?;
        ExperimentDocument::from_yaml_str(&text).map_err(|mut err| {
            err.add_context("path", &path.display().to_string());
            err
        })
    }

    /// First-level tasks sorted by `Order`; ties keep document order.
    pub fn ordered_tasks(&self) -> Vec<&TaskDefinition> {
        let mut tasks: Vec<&TaskDefinition> = self.tasks.iter().collect();
        tasks.sort_by_key(|task| task.order.unwrap_or_default());
        tasks
    }

    /// Requirements of every first-level task, deduplicated in order.
    pub fn requirements(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for task in self.ordered_tasks() {
            for requirement in &task.requirements {
                if !seen.contains(requirement) {
                    seen.push(requirement.clone());
                }
            }
        }
        seen
    }
}

fn definition_error(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::DefinitionError, message).with_code("TT-DEF-001")
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
