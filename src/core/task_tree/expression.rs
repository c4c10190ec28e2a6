#![allow(clippy::result_large_err)] // Expression APIs return AppError so callers can log code and message together.

use crate::core::error::AppError;
use crate::core::task_tree::params::{FlowState, Params};
use crate::core::types::ErrorCategory;
use rhai::packages::{
    ArithmeticPackage, BasicArrayPackage, BasicMapPackage, BasicStringPackage, LogicPackage,
    MoreStringPackage, Package,
};
use rhai::{Array, Dynamic, Engine, Map, Scope, AST};
use serde_json::{Map as JsonMap, Number, Value};

/// Variables exposed to an expression.
///
/// `params` holds the live parameters of the enclosing scope and `flow` the
/// flow state of the current invocation. Keys that are valid identifiers are
/// also pushed as top-level variables, flow keys shadowing parameters.
#[derive(Clone, Debug, Default)]
pub struct EvaluationContext {
    pub params: Params,
    pub flow: Params,
}

impl EvaluationContext {
    pub fn new(params: &Params, flow: &FlowState) -> Self {
        Self {
            params: params.clone(),
            flow: flow.as_params().clone(),
        }
    }
}

/// Expression evaluation engine using a locked-down Rhai configuration.
pub struct ExpressionEngine {
    engine: Engine,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        let mut engine = Engine::new_raw();
        engine.set_max_operations(50_000);
        engine.set_max_call_levels(64);
        engine.set_max_expr_depths(64, 64);
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});
        engine.register_global_module(LogicPackage::new().as_shared_module());
        engine.register_global_module(ArithmeticPackage::new().as_shared_module());
        engine.register_global_module(BasicStringPackage::new().as_shared_module());
        engine.register_global_module(MoreStringPackage::new().as_shared_module());
        engine.register_global_module(BasicArrayPackage::new().as_shared_module());
        engine.register_global_module(BasicMapPackage::new().as_shared_module());
        ExpressionEngine { engine }
    }
}

impl ExpressionEngine {
    /// Compile the given expression string into an AST.
    pub fn compile(&self, expr: &str) -> Result<AST, AppError> {
        self.engine.compile_expression(expr).map_err(|err| {
            AppError::new(
                ErrorCategory::ExpressionError,
                format!("expression compile error in '{}': {}", expr, err),
            )
            .with_code("TT-EXPR-001")
        })
    }

    /// Evaluate the given expression string against the provided context.
    pub fn evaluate(&self, expr: &str, ctx: &EvaluationContext) -> Result<Value, AppError> {
        let mut scope = build_scope(ctx);
        let result = self
            .engine
            .eval_expression_with_scope::<Dynamic>(&mut scope, expr)
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::ExpressionError,
                    format!("expression execution error in '{}': {}", expr, err),
                )
                .with_code("TT-EXPR-002")
            })?;
        Ok(from_dynamic(result))
    }

    /// Evaluate a condition; only a boolean `true` counts as verified.
    pub fn is_true(&self, expr: &str, ctx: &EvaluationContext) -> Result<bool, AppError> {
        Ok(matches!(self.evaluate(expr, ctx)?, Value::Bool(true)))
    }
}

fn build_scope(ctx: &EvaluationContext) -> Scope<'static> {
    let mut scope = Scope::new();
    for (key, value) in ctx.params.iter().chain(ctx.flow.iter()) {
        if is_identifier(key) && key != "params" && key != "flow" {
            scope.push_constant_dynamic(key.clone(), to_dynamic(value));
        }
    }
    scope.push_constant_dynamic("params", to_dynamic(&Value::Object(ctx.params.clone())));
    scope.push_constant_dynamic("flow", to_dynamic(&Value::Object(ctx.flow.clone())));
    scope
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::from(0_i64)
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => {
            let arr: Array = items.iter().map(to_dynamic).collect();
            Dynamic::from_array(arr)
        }
        Value::Object(map) => {
            let mut rhai_map = Map::new();
            for (key, value) in map {
                rhai_map.insert(key.into(), to_dynamic(value));
            }
            Dynamic::from_map(rhai_map)
        }
    }
}

fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Some(b) = value.clone().try_cast::<bool>() {
        return Value::Bool(b);
    }
    if let Some(i) = value.clone().try_cast::<i64>() {
        return Value::Number(Number::from(i));
    }
    if let Some(f) = value.clone().try_cast::<f64>() {
        if let Some(num) = Number::from_f64(f) {
            return Value::Number(num);
        }
    }
    if let Some(s) = value.clone().try_cast::<String>() {
        return Value::String(s);
    }
    if let Some(arr) = value.clone().try_cast::<Array>() {
        return Value::Array(arr.into_iter().map(from_dynamic).collect());
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        let mut json_map = JsonMap::new();
        for (key, value) in map {
            json_map.insert(key.into(), from_dynamic(value));
        }
        return Value::Object(json_map);
    }
    Value::Null
}
