//! Conditions shared by `Flow.While` and `Flow.Select`.
//!
//! A condition mapping defines exactly one of two styles:
//!
//! * `Key` (with optional `Pattern` and `Negate`): the key must exist in the
//!   enclosing scope and, if a pattern is given, the regex must match a prefix
//!   of the value's string form.
//! * `Evaluate`: a boolean expression evaluated by the [`ExpressionEngine`].
//!   `Negate` is ignored here; `Flow.While` opts in with
//!   [`Condition::negate_expression`].

use crate::core::task_tree::expression::{EvaluationContext, ExpressionEngine};
use crate::core::task_tree::log::TaskLogger;
use crate::core::task_tree::params::{get_bool, stringify, FlowState, Params};
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("expected a mapping, got {0}")]
    NotAMapping(&'static str),
    #[error("only one of 'Evaluate' and 'Key' can be defined at the same time")]
    BothStyles,
    #[error("either 'Evaluate' or 'Key' must be defined")]
    NoStyle,
    #[error("'{0}' must be a string")]
    NotAString(&'static str),
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

#[derive(Debug, Clone)]
pub enum Condition {
    Expression {
        evaluate: String,
        negate: bool,
    },
    KeyMatch {
        key: String,
        pattern: Option<String>,
        regex: Option<Regex>,
        negate: bool,
    },
}

impl Condition {
    /// Build a condition from its mapping, checking style exclusivity and
    /// compiling the pattern.
    pub fn from_value(value: &Value) -> Result<Self, ConditionError> {
        match value {
            Value::Object(map) => Self::from_params(map),
            other => Err(ConditionError::NotAMapping(type_name(other))),
        }
    }

    pub fn from_params(map: &Params) -> Result<Self, ConditionError> {
        let evaluate = map.get("Evaluate").filter(|value| !value.is_null());
        let key = map.get("Key").filter(|value| !value.is_null());
        match (evaluate, key) {
            (Some(_), Some(_)) => Err(ConditionError::BothStyles),
            (None, None) => Err(ConditionError::NoStyle),
            (Some(evaluate), None) => {
                let evaluate = evaluate
                    .as_str()
                    .ok_or(ConditionError::NotAString("Evaluate"))?;
                Ok(Condition::Expression {
                    evaluate: evaluate.to_string(),
                    negate: false,
                })
            }
            (None, Some(key)) => {
                let key = key.as_str().ok_or(ConditionError::NotAString("Key"))?;
                let pattern = match map.get("Pattern") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(pattern)) => Some(pattern.clone()),
                    Some(_) => return Err(ConditionError::NotAString("Pattern")),
                };
                let regex = pattern.as_deref().map(compile_prefix).transpose()?;
                Ok(Condition::KeyMatch {
                    key: key.to_string(),
                    pattern,
                    regex,
                    negate: get_bool(map, "Negate", false),
                })
            }
        }
    }

    /// Invert an expression condition. Key conditions already carry their
    /// own `Negate` and are returned unchanged.
    pub fn negate_expression(self, negate: bool) -> Self {
        match self {
            Condition::Expression { evaluate, .. } => Condition::Expression { evaluate, negate },
            key => key,
        }
    }

    /// Human-readable text used in decision logs.
    pub fn describe(&self) -> String {
        match self {
            Condition::Expression { evaluate, negate } => format!(
                "Expression '{}' (expanded) is {}",
                evaluate,
                if *negate { "False" } else { "True" }
            ),
            Condition::KeyMatch {
                key,
                pattern,
                negate,
                ..
            } => {
                match (pattern, negate) {
                    (Some(pattern), false) => format!("'{}' matches regex '{}'", key, pattern),
                    (Some(pattern), true) => {
                        format!("'{}' does not match regex '{}'", key, pattern)
                    }
                    (None, false) => format!("'{}' exists", key),
                    (None, true) => format!("'{}' does not exist", key),
                }
            }
        }
    }

    /// Evaluate against the live scope parameters.
    ///
    /// Expression errors are logged at debug level and count as not verified,
    /// whether or not the expression is negated.
    pub fn evaluate(
        &self,
        engine: &ExpressionEngine,
        scope: &Params,
        flow: &FlowState,
        logger: &TaskLogger,
    ) -> bool {
        match self {
            Condition::Expression { evaluate, negate } => {
                let ctx = EvaluationContext::new(scope, flow);
                match engine.is_true(evaluate, &ctx) {
                    Ok(verified) => verified != *negate,
                    Err(err) => {
                        logger.debug(format!(
                            "Exception while evaluating expression '{}' ({}): Condition will be considered as not verified. Moving on.",
                            evaluate, err.message
                        ));
                        false
                    }
                }
            }
            Condition::KeyMatch {
                key, regex, negate, ..
            } => {
                let verified = key_matches(key, scope, regex.as_ref());
                verified != *negate
            }
        }
    }
}

/// True when `key` exists in `collection` and `regex` (if any) matches a
/// prefix of its string form.
pub fn key_matches(key: &str, collection: &Params, regex: Option<&Regex>) -> bool {
    match collection.get(key) {
        None => false,
        Some(value) => match regex {
            None => true,
            Some(regex) => regex.is_match(&stringify(value)),
        },
    }
}

fn compile_prefix(pattern: &str) -> Result<Regex, ConditionError> {
    Regex::new(&format!("^(?:{})", pattern)).map_err(|err| ConditionError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
