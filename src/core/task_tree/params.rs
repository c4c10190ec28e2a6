use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Parameter mapping of a task.
pub type Params = Map<String, Value>;

/// Parameter mapping shared between a scope and the tasks running inside it.
pub type SharedParams = Arc<RwLock<Params>>;

pub fn shared(params: Params) -> SharedParams {
    Arc::new(RwLock::new(params))
}

/// Default value and presence requirement of a single parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamRule {
    pub default: Value,
    pub required: bool,
}

/// Declared parameters of a task kind, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ParamRules {
    rules: IndexMap<String, ParamRule>,
}

impl ParamRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str) -> Self {
        self.rules.insert(
            name.to_string(),
            ParamRule {
                default: Value::Null,
                required: true,
            },
        );
        self
    }

    pub fn optional(mut self, name: &str, default: Value) -> Self {
        self.rules.insert(
            name.to_string(),
            ParamRule {
                default,
                required: false,
            },
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fill defaults for missing optional parameters.
    ///
    /// Returns the names of missing required parameters; `params` is left
    /// untouched in that case.
    pub fn apply(&self, params: &mut Params) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .rules
            .iter()
            .filter(|(name, rule)| rule.required && !params.contains_key(name.as_str()))
            .map(|(name, _)| name.clone())
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }
        for (name, rule) in &self.rules {
            if !params.contains_key(name) {
                params.insert(name.clone(), rule.default.clone());
            }
        }
        Ok(())
    }
}

/// Transient per-invocation variables fed to parameter expansion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowState {
    values: Params,
}

impl FlowState {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `Iter0`/`Iter1` counters for loop bodies.
    pub fn iteration(iteration: u64) -> Self {
        let mut values = Params::new();
        values.insert("Iter0".into(), Value::Number(Number::from(iteration)));
        values.insert("Iter1".into(), Value::Number(Number::from(iteration + 1)));
        Self { values }
    }

    /// `Branch` index for the selected child of a Select.
    pub fn branch(index: usize) -> Self {
        let mut values = Params::new();
        values.insert("Branch".into(), Value::Number(Number::from(index as u64)));
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn as_params(&self) -> &Params {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// String form of a parameter value as used by pattern matching and templates.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Read a non-negative integer parameter.
///
/// `Ok(None)` when absent or null, `Err` with a reason when present but not a
/// non-negative integer.
pub fn get_count(params: &Params, name: &str) -> Result<Option<u64>, String> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| format!("'{}' must be a non-negative integer, got {}", name, number)),
        Some(Value::String(text)) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| format!("'{}' must be a non-negative integer, got '{}'", name, text)),
        Some(other) => Err(format!(
            "'{}' must be a non-negative integer, got {}",
            name, other
        )),
    }
}

pub fn get_bool(params: &Params, name: &str, default: bool) -> bool {
    match params.get(name) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
        _ => default,
    }
}

pub fn get_str<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params.get(name).and_then(Value::as_str)
}
