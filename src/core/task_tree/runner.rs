#![allow(clippy::result_large_err)] // Runner APIs return AppError so the CLI can map definition errors to exit codes.

use crate::core::config::EngineConfig;
use crate::core::error::AppError;
use crate::core::task_tree::definition::{ExperimentDocument, TaskDefinition};
use crate::core::task_tree::expansion::ParamExpander;
use crate::core::task_tree::flow::invoke_child;
use crate::core::task_tree::log::{LogSink, TaskLogger, TracingSink};
use crate::core::task_tree::params::{shared, FlowState, Params};
use crate::core::task_tree::registry::TaskRegistry;
use crate::core::task_tree::task::RunContext;
use crate::core::task_tree::verdict::Verdict;
use crate::core::types::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of one experiment run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub name: Option<String>,
    pub verdict: Verdict,
    pub published: Params,
    pub requirements: Vec<String>,
    pub document_hash: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub failures: Vec<String>,
}

impl RunSummary {
    pub fn duration_ms(&self) -> i64 {
        self.completed_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }
}

/// Runs the first-level tasks of an [`ExperimentDocument`] in `Order`.
pub struct ExperimentRunner {
    registry: TaskRegistry,
    config: EngineConfig,
    sink: Option<Arc<dyn LogSink>>,
    expander: Option<Arc<dyn ParamExpander>>,
}

impl ExperimentRunner {
    pub fn new(registry: TaskRegistry, config: EngineConfig) -> Self {
        Self {
            registry,
            config,
            sink: None,
            expander: None,
        }
    }

    /// Send task log lines to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_expander(mut self, expander: Arc<dyn ParamExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Check every task name without running anything.
    ///
    /// Returns advisory warnings for literal expressions that do not compile;
    /// at run time such conditions are simply not verified.
    pub fn validate(&self, document: &ExperimentDocument) -> Result<Vec<String>, AppError> {
        let ctx = RunContext::new(self.registry.clone(), self.config.clone());
        let mut warnings = Vec::new();
        for task in &document.tasks {
            self.registry.validate_definition(task)?;
            warnings.extend(self.registry.expression_warnings(task, &ctx.engine));
        }
        Ok(warnings)
    }

    pub async fn run_file(&self, path: &Path, overrides: Params) -> Result<RunSummary, AppError> {
        let document = ExperimentDocument::load_from_file(path)?;
        self.run(&document, overrides).await
    }

    /// Run `document` with `overrides` layered over its `Parameters`.
    ///
    /// Definition problems are returned as errors before anything runs.
    /// Task failures are recorded in the summary and never abort the run.
    pub async fn run(
        &self,
        document: &ExperimentDocument,
        overrides: Params,
    ) -> Result<RunSummary, AppError> {
        let mut ctx = RunContext::new(self.registry.clone(), self.config.clone());
        if let Some(expander) = &self.expander {
            ctx = ctx.with_expander(Arc::clone(expander));
        }
        for task in &document.tasks {
            self.registry.validate_definition(task)?;
        }
        let ctx = Arc::new(ctx);

        let sink: Arc<dyn LogSink> = match &self.sink {
            Some(sink) => Arc::clone(sink),
            None => Arc::new(TracingSink::new(ctx.run_id.to_string())),
        };
        let logger = TaskLogger::new(sink);

        let mut root = document.parameters.clone();
        for (key, value) in overrides {
            root.insert(key, value);
        }
        let scope = shared(root);

        let started_at = Utc::now();
        let tasks = document.ordered_tasks();
        logger.info(format!(
            "Starting experiment {} ({} tasks, run {})",
            document.name.as_deref().unwrap_or("<unnamed>"),
            tasks.len(),
            ctx.run_id
        ));

        let mut verdict = Verdict::NotSet;
        let mut published = Params::new();
        let mut failures = Vec::new();
        for task in tasks {
            let label = first_level_label(task);
            let outcome = invoke_child(
                &scope,
                &ctx,
                &logger,
                task,
                label.clone(),
                FlowState::empty(),
            )
            .await;
            verdict = verdict.merge(outcome.verdict);
            for (key, value) in outcome.vault {
                published.insert(key, value);
            }
            if let Some(err) = outcome.failure {
                failures.push(format!("{}: {}", label, err.message));
            }
        }

        let completed_at = Utc::now();
        logger.info(format!("Experiment finished with verdict {}", verdict));
        Ok(RunSummary {
            run_id: ctx.run_id,
            name: document.name.clone(),
            verdict,
            published,
            requirements: document.requirements(),
            document_hash: document.source_hash.clone(),
            started_at,
            completed_at,
            failures,
        })
    }
}

fn first_level_label(task: &TaskDefinition) -> String {
    let order = task.order.unwrap_or_default();
    match &task.label {
        Some(label) => format!("{}.{}", order, label),
        None => order.to_string(),
    }
}

/// Parse a `KEY=VALUE` override. The value is read as a YAML scalar, so
/// `3`, `true` and `[a, b]` keep their type; anything else stays a string.
pub fn parse_override(text: &str) -> Result<(String, Value), AppError> {
    let (key, raw) = text.split_once('=').ok_or_else(|| {
        AppError::new(
            ErrorCategory::ValidationError,
            format!("invalid parameter override '{}': expected KEY=VALUE", text),
        )
        .with_code("TT-CFG-002")
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(AppError::new(
            ErrorCategory::ValidationError,
            format!("invalid parameter override '{}': empty key", text),
        )
        .with_code("TT-CFG-002"));
    }
    let value = serde_yaml::from_str::<Value>(raw)
        .ok()
        .filter(|value| !value.is_null() || raw.trim() == "null")
        .unwrap_or_else(|| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
