#![allow(clippy::result_large_err)]

use crate::core::error::AppError;
use crate::core::task_tree::expression::{EvaluationContext, ExpressionEngine};
use crate::core::task_tree::params::{stringify, FlowState, Params};
use crate::core::types::ErrorCategory;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::{Arc, OnceLock};

/// Produces the concrete parameters of one child invocation.
///
/// Implementations must not mutate their inputs and must be deterministic for
/// identical inputs.
pub trait ParamExpander: Send + Sync {
    fn expand(&self, raw: &Params, parent: &Params, flow: &FlowState)
        -> Result<Params, AppError>;
}

/// Default expander.
///
/// * `@[Name]` or `@[Outer.Inner]` is replaced by the flow-state value of that
///   name, or else by the parent value. A string made of a single reference
///   takes the referenced value with its type; references embedded in longer
///   text are replaced by the value's string form. Unresolved references are
///   left as written.
/// * `{"$expr": "..."}` is replaced by the result of the expression.
pub struct TemplateExpander {
    engine: Arc<ExpressionEngine>,
}

impl TemplateExpander {
    pub fn new(engine: Arc<ExpressionEngine>) -> Self {
        Self { engine }
    }
}

impl ParamExpander for TemplateExpander {
    fn expand(
        &self,
        raw: &Params,
        parent: &Params,
        flow: &FlowState,
    ) -> Result<Params, AppError> {
        let resolver = Resolver {
            engine: &self.engine,
            parent,
            flow,
        };
        let mut expanded = Map::new();
        for (key, value) in raw {
            expanded.insert(key.clone(), resolver.resolve(value, key)?);
        }
        Ok(expanded)
    }
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"@\[([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\]")
            .expect("reference pattern is a valid regex")
    })
}

struct Resolver<'a> {
    engine: &'a ExpressionEngine,
    parent: &'a Params,
    flow: &'a FlowState,
}

impl Resolver<'_> {
    fn resolve(&self, value: &Value, field: &str) -> Result<Value, AppError> {
        match value {
            Value::String(text) => Ok(self.substitute(text)),
            Value::Array(items) => {
                let mut resolved = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    resolved.push(self.resolve(item, &format!("{}[{}]", field, index))?);
                }
                Ok(Value::Array(resolved))
            }
            Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(Value::String(expr)) = map.get("$expr") {
                        let ctx = EvaluationContext::new(self.parent, self.flow);
                        return self.engine.evaluate(expr, &ctx).map_err(|err| {
                            AppError::new(
                                ErrorCategory::ExpansionError,
                                format!("failed to expand '{}': {}", field, err.message),
                            )
                            .with_code("TT-EXP-001")
                        });
                    }
                }
                let mut resolved = Map::new();
                for (key, child) in map {
                    resolved.insert(
                        key.clone(),
                        self.resolve(child, &format!("{}.{}", field, key))?,
                    );
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    fn substitute(&self, text: &str) -> Value {
        let pattern = reference_pattern();
        if let Some(captures) = pattern.captures(text) {
            if let Some(whole) = captures.get(0) {
                if whole.start() == 0 && whole.end() == text.len() {
                    return match self.lookup(&captures[1]) {
                        Some(value) => value.clone(),
                        None => Value::String(text.to_string()),
                    };
                }
            }
        } else {
            return Value::String(text.to_string());
        }

        let replaced = pattern.replace_all(text, |captures: &Captures<'_>| {
            match self.lookup(&captures[1]) {
                Some(value) => stringify(value),
                None => captures[0].to_string(),
            }
        });
        Value::String(replaced.into_owned())
    }

    fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let head = segments.next()?;
        let mut current = self.flow.get(head).or_else(|| self.parent.get(head))?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}
