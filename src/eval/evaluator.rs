use core::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::analyzer::{ExpressionParser, ExpressionResult};
use crate::ast::{Expression, TemplatePart};
use crate::config::ExpressionConfig;
use crate::eval::{EvalResult, Memory, Value};
use crate::functions::FunctionTable;

/// Replacement for a path that resolves to nothing.
pub type NullSubstitution = Arc<dyn Fn(&str) -> Value + Send + Sync>;

#[derive(Clone, Default)]
pub struct EvaluationOptions {
    pub null_substitution: Option<NullSubstitution>,
}

impl EvaluationOptions {
    pub fn with_null_substitution<F>(f: F) -> Self
    where
        F: Fn(&str) -> Value + Send + Sync + 'static,
    {
        Self {
            null_substitution: Some(Arc::new(f)),
        }
    }

    fn substitute(&self, path: &str) -> Value {
        match &self.null_substitution {
            Some(f) => f(path),
            None => Value::Null,
        }
    }
}

impl fmt::Debug for EvaluationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationOptions")
            .field("null_substitution", &self.null_substitution.is_some())
            .finish()
    }
}

/// Evaluates a bound expression. A missing path is `null`, never an error.
pub fn evaluate(
    expr: &Expression,
    memory: &dyn Memory,
    options: &EvaluationOptions,
) -> EvalResult<Value> {
    match expr {
        Expression::Constant(value) => Ok(value.clone()),
        Expression::Accessor { path } => match memory.get_value(path)? {
            Some(value) if !value.is_null() => Ok(value),
            _ => {
                trace!("'{}' resolved to null", path);
                Ok(options.substitute(path))
            }
        },
        Expression::FunctionCall { function, .. } => function.evaluate(expr, memory, options),
        Expression::Interpolation(parts) => {
            let mut text = String::new();
            for part in parts {
                match part {
                    TemplatePart::Text(literal) => text.push_str(literal),
                    TemplatePart::Expression(inner) => {
                        text.push_str(&evaluate(inner, memory, options)?.to_display_string())
                    }
                }
            }
            Ok(Value::String(text))
        }
    }
}

/// Parses expression text once and evaluates it many times.
///
/// Parsed trees are cached by source text. The cache is shared across
/// threads and simply cleared when it reaches capacity.
pub struct ExpressionEvaluator {
    parser: ExpressionParser,
    cache: DashMap<String, Arc<Expression>>,
    config: ExpressionConfig,
}

impl ExpressionEvaluator {
    pub fn new(functions: Arc<FunctionTable>, config: &ExpressionConfig) -> Self {
        Self {
            parser: ExpressionParser::new(functions),
            cache: DashMap::new(),
            config: config.clone(),
        }
    }

    pub fn functions(&self) -> &Arc<FunctionTable> {
        self.parser.functions()
    }

    pub fn parse(&self, text: &str) -> ExpressionResult<Arc<Expression>> {
        if !self.config.cache_enabled {
            return self.parser.parse(text).map(Arc::new);
        }
        if let Some(cached) = self.cache.get(text) {
            return Ok(cached.clone());
        }
        let expr = Arc::new(self.parser.parse(text)?);
        if self.cache.len() >= self.config.cache_capacity {
            debug!("expression cache full ({} entries), clearing", self.cache.len());
            self.cache.clear();
        }
        self.cache.insert(text.to_string(), expr.clone());
        Ok(expr)
    }

    pub fn evaluate(&self, expr: &Expression, memory: &dyn Memory) -> EvalResult<Value> {
        evaluate(expr, memory, &EvaluationOptions::default())
    }

    pub fn evaluate_with(
        &self,
        expr: &Expression,
        memory: &dyn Memory,
        options: &EvaluationOptions,
    ) -> EvalResult<Value> {
        evaluate(expr, memory, options)
    }

    /// Parses (through the cache) and evaluates in one step.
    pub fn evaluate_text(&self, text: &str, memory: &dyn Memory) -> crate::InternalResult<Value> {
        let expr = self.parse(text)?;
        Ok(self.evaluate(&expr, memory)?)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

impl fmt::Debug for ExpressionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEvaluator")
            .field("cached", &self.cache.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::eval::{ErrorKind, SimpleMemory};

    fn evaluator() -> ExpressionEvaluator {
        ExpressionEvaluator::new(
            Arc::new(FunctionTable::builtin()),
            &ExpressionConfig::default(),
        )
    }

    fn memory() -> SimpleMemory {
        SimpleMemory::from(json!({
            "user": {"name": "Ann", "age": 31, "tags": ["a", "b"]},
            "n": 4
        }))
    }

    fn eval(text: &str) -> Value {
        evaluator().evaluate_text(text, &memory()).unwrap()
    }

    #[test]
    fn test_literals_and_paths() {
        assert_eq!(eval("42"), Value::Integer(42));
        assert_eq!(eval("user.name"), Value::from("Ann"));
        assert_eq!(eval("user.tags[1]"), Value::from("b"));
        assert_eq!(eval("user.missing"), Value::Null);
    }

    #[test]
    fn test_operators() {
        assert_eq!(eval("n * 2 + 1"), Value::Integer(9));
        assert_eq!(eval("user.age >= 18 && user.name == 'Ann'"), Value::Boolean(true));
        assert_eq!(eval("'x' + n"), Value::from("x4"));
        assert_eq!(eval("-n"), Value::Integer(-4));
    }

    #[test]
    fn test_interpolation_renders_null_as_empty() {
        assert_eq!(eval("`${user.name} (${user.nick})`"), Value::from("Ann ()"));
    }

    #[test]
    fn test_null_substitution() {
        let expr = evaluator().parse("`Hi ${user.nick}`").unwrap();
        let options = EvaluationOptions::with_null_substitution(|path| Value::from(format!("<{}>", path)));
        let value = evaluate(&expr, &memory(), &options).unwrap();
        assert_eq!(value, Value::from("Hi <user.nick>"));
    }

    #[test]
    fn test_errors_are_values() {
        let evaluator = evaluator();
        let expr = evaluator.parse("substring('hello', 10, 1)").unwrap();
        let err = evaluator.evaluate(&expr, &memory()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfRange);

        let expr = evaluator.parse("user.name * 2").unwrap();
        let err = evaluator.evaluate(&expr, &memory()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArityOrType);
    }

    #[test]
    fn test_parse_cache() {
        let evaluator = evaluator();
        let a = evaluator.parse("1 + 1").unwrap();
        let b = evaluator.parse("1 + 1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(evaluator.cached_len(), 1);
    }

    #[test]
    fn test_cache_is_cleared_at_capacity() {
        let config = ExpressionConfig {
            cache_enabled: true,
            cache_capacity: 2,
        };
        let evaluator = ExpressionEvaluator::new(Arc::new(FunctionTable::builtin()), &config);
        evaluator.parse("1").unwrap();
        evaluator.parse("2").unwrap();
        evaluator.parse("3").unwrap();
        assert_eq!(evaluator.cached_len(), 1);
    }

    #[test]
    fn test_same_tree_many_memories() {
        let evaluator = evaluator();
        let expr = evaluator.parse("x + 1").unwrap();
        for i in 0..3 {
            let memory = SimpleMemory::from(json!({ "x": i }));
            assert_eq!(evaluator.evaluate(&expr, &memory).unwrap(), Value::Integer(i + 1));
        }
    }
}
