#![allow(clippy::result_large_err)] // Task lifecycle APIs return AppError directly so combinators can log code and message together.

use crate::core::config::EngineConfig;
use crate::core::error::AppError;
use crate::core::task_tree::definition::TaskDefinition;
use crate::core::task_tree::expansion::{ParamExpander, TemplateExpander};
use crate::core::task_tree::expression::ExpressionEngine;
use crate::core::task_tree::log::TaskLogger;
use crate::core::task_tree::params::{shared, ParamRules, Params, SharedParams};
use crate::core::task_tree::registry::TaskRegistry;
use crate::core::task_tree::verdict::Verdict;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a run shares: identifiers, the registry and the collaborators
/// used to build child tasks. Passed explicitly down the tree.
pub struct RunContext {
    pub run_id: Uuid,
    pub registry: TaskRegistry,
    pub expander: Arc<dyn ParamExpander>,
    pub engine: Arc<ExpressionEngine>,
    pub config: EngineConfig,
}

impl RunContext {
    /// Context with a fresh run id and the default template expander.
    pub fn new(registry: TaskRegistry, config: EngineConfig) -> Self {
        let engine = Arc::new(ExpressionEngine::default());
        Self {
            run_id: Uuid::new_v4(),
            registry,
            expander: Arc::new(TemplateExpander::new(Arc::clone(&engine))),
            engine,
            config,
        }
    }

    pub fn with_expander(mut self, expander: Arc<dyn ParamExpander>) -> Self {
        self.expander = expander;
        self
    }
}

/// Behaviour of one task kind, looked up by `TaskName`.
#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    /// Name used in task definitions.
    fn name(&self) -> &'static str;

    /// Declared parameters; applied before `sanitize`.
    fn param_rules(&self) -> ParamRules {
        ParamRules::new()
    }

    /// Structural validation of the parameters after defaults are applied.
    fn sanitize(&self, _task: &Task, _params: &Params) -> Result<(), String> {
        Ok(())
    }

    /// Do the work. Sets the verdict and publishes through `task`.
    async fn run(&self, task: &mut Task) -> Result<(), AppError>;
}

/// Runtime instance of one node, bound to a single invocation.
pub struct Task {
    name: String,
    label: String,
    handler: Arc<dyn TaskHandler>,
    children: Arc<Vec<TaskDefinition>>,
    params: SharedParams,
    vault: Params,
    verdict: Verdict,
    parent: Option<SharedParams>,
    logger: TaskLogger,
    ctx: Arc<RunContext>,
}

impl Task {
    /// Build a child instance from its definition and already-expanded
    /// parameters. `logger` is the parent's logger; the child nests under it.
    pub fn new(
        definition: &TaskDefinition,
        label: String,
        params: Params,
        parent: Option<SharedParams>,
        ctx: Arc<RunContext>,
        logger: &TaskLogger,
    ) -> Result<Self, AppError> {
        let handler = ctx.registry.get(&definition.task_name).ok_or_else(|| {
            AppError::new(
                ErrorCategory::DefinitionError,
                format!("unknown task '{}'", definition.task_name),
            )
            .with_code("TT-REG-001")
        })?;
        let logger = logger.child(&label);
        Ok(Self {
            name: definition.task_name.clone(),
            label,
            handler,
            children: Arc::new(definition.children.clone()),
            params: shared(params),
            vault: Params::new(),
            verdict: Verdict::NotSet,
            parent,
            logger,
            ctx,
        })
    }

    /// Root of a tree: no enclosing scope, logs with `logger` unchanged.
    pub fn root(
        definition: &TaskDefinition,
        params: Params,
        ctx: Arc<RunContext>,
        logger: TaskLogger,
    ) -> Result<Self, AppError> {
        let handler = ctx.registry.get(&definition.task_name).ok_or_else(|| {
            AppError::new(
                ErrorCategory::DefinitionError,
                format!("unknown task '{}'", definition.task_name),
            )
            .with_code("TT-REG-001")
        })?;
        Ok(Self {
            name: definition.task_name.clone(),
            label: definition.display_label().to_string(),
            handler,
            children: Arc::new(definition.children.clone()),
            params: shared(params),
            vault: Params::new(),
            verdict: Verdict::NotSet,
            parent: None,
            logger,
            ctx,
        })
    }

    /// Validate, run and record the verdict.
    ///
    /// Validation failures are logged and yield `Ok(Verdict::Error)` without
    /// running. Runtime failures set the verdict to `Error` and are returned.
    pub async fn start(&mut self) -> Result<Verdict, AppError> {
        let handler = Arc::clone(&self.handler);

        let validation = {
            let mut params = self.params.write().await;
            match handler.param_rules().apply(&mut params) {
                Err(missing) => Err(format!(
                    "Missing required parameter(s): {}",
                    missing.join(", ")
                )),
                Ok(()) => handler.sanitize(self, &params),
            }
        };
        if let Err(reason) = validation {
            self.logger.error(format!(
                "Parameter validation for {} failed: {}. Task will not run.",
                self.name, reason
            ));
            self.verdict = Verdict::Error;
            self.record_verdict().await;
            return Ok(self.verdict);
        }

        if self.ctx.config.log_params {
            let params = self.params.read().await;
            self.logger.debug(format!(
                "Starting {} with parameters {}",
                self.name,
                Value::Object(params.clone())
            ));
        } else {
            self.logger.debug(format!("Starting {}", self.name));
        }

        let outcome = handler.run(self).await;
        if outcome.is_err() {
            self.verdict = Verdict::Error;
        }
        self.record_verdict().await;
        self.logger
            .debug(format!("{} finished with verdict {}", self.name, self.verdict));
        outcome.map(|_| self.verdict)
    }

    async fn record_verdict(&self) {
        self.params.write().await.insert(
            "Verdict".to_string(),
            Value::String(self.verdict.as_str().to_string()),
        );
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn logger(&self) -> &TaskLogger {
        &self.logger
    }

    pub fn ctx(&self) -> &Arc<RunContext> {
        &self.ctx
    }

    pub fn children(&self) -> Arc<Vec<TaskDefinition>> {
        Arc::clone(&self.children)
    }

    pub fn params(&self) -> SharedParams {
        Arc::clone(&self.params)
    }

    pub async fn params_snapshot(&self) -> Params {
        self.params.read().await.clone()
    }

    /// Scope seen by children: the enclosing scope, or this task's own
    /// parameters when it is the root.
    pub fn scope(&self) -> SharedParams {
        match &self.parent {
            Some(parent) => Arc::clone(parent),
            None => Arc::clone(&self.params),
        }
    }

    /// Write `key` to this task's parameters and publish it to the vault.
    pub async fn publish(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.params.write().await.insert(key.clone(), value.clone());
        self.vault.insert(key, value);
    }

    pub fn merge_vault(&mut self, published: &Params) {
        for (key, value) in published {
            self.vault.insert(key.clone(), value.clone());
        }
    }

    pub fn vault(&self) -> &Params {
        &self.vault
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn set_verdict(&mut self, verdict: Verdict) {
        self.verdict = verdict;
    }

    /// Keep the worse of the current verdict and `verdict`.
    pub fn merge_verdict(&mut self, verdict: Verdict) {
        self.verdict = self.verdict.merge(verdict);
    }
}
