//! Built-in function registry.
//!
//! Every operator and function is a [`FunctionDescriptor`]: a name, a static
//! return-type hint, a bind-time validator and an evaluator. Operators are
//! registered under their symbol (`+`, `==`, `&&`, ...) and share the same
//! machinery as named functions.
//!
//! Most evaluators are built with [`apply`] or [`apply_sequence`], which
//! evaluate children left to right, stop at the first failing child, verify
//! each argument and then run the function body. Evaluators that must control
//! evaluation order themselves (`&&`, `if`, `where`, ...) receive the
//! unevaluated call node instead.

pub mod collection;
pub mod datetime;
pub mod logical;
pub mod math;
pub mod object;
pub mod operators;
pub mod string;
pub mod validators;

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::ast::{Expression, ReturnType};
use crate::eval::{evaluate, EvalError, EvalResult, EvaluationOptions, Memory, Value};

pub type ValidatorFn = Arc<dyn Fn(&Expression) -> EvalResult<()> + Send + Sync>;
pub type EvaluatorFn =
    Arc<dyn Fn(&Expression, &dyn Memory, &EvaluationOptions) -> EvalResult<Value> + Send + Sync>;

/// Runtime check applied to each evaluated argument. Returns an error
/// message naming the child expression when the value is rejected.
pub type Verifier = fn(&Value, &Expression, usize) -> Option<String>;

pub struct FunctionDescriptor {
    pub name: String,
    pub return_type: ReturnType,
    validator: ValidatorFn,
    evaluator: EvaluatorFn,
}

impl FunctionDescriptor {
    pub fn new<E, V>(name: impl Into<String>, return_type: ReturnType, evaluator: E, validator: V) -> Self
    where
        E: Fn(&Expression, &dyn Memory, &EvaluationOptions) -> EvalResult<Value>
            + Send
            + Sync
            + 'static,
        V: Fn(&Expression) -> EvalResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            return_type,
            validator: Arc::new(validator),
            evaluator: Arc::new(evaluator),
        }
    }

    pub fn validate(&self, call: &Expression) -> EvalResult<()> {
        (self.validator)(call)
    }

    pub fn evaluate(
        &self,
        call: &Expression,
        memory: &dyn Memory,
        options: &EvaluationOptions,
    ) -> EvalResult<Value> {
        (self.evaluator)(call, memory, options)
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("return_type", &self.return_type)
            .finish()
    }
}

/// Name to descriptor lookup. Built once and shared read-only.
#[derive(Debug, Clone, Default)]
pub struct FunctionTable {
    functions: HashMap<String, Arc<FunctionDescriptor>>,
}

impl FunctionTable {
    /// A table with no functions, not even operators.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All operators and built-in functions.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        operators::register(&mut table);
        math::register(&mut table);
        string::register(&mut table);
        collection::register(&mut table);
        logical::register(&mut table);
        object::register(&mut table);
        datetime::register(&mut table);
        debug!("registered {} built-in functions", table.functions.len());
        table
    }

    /// Adds or replaces a function. Returns the descriptor it replaced.
    pub fn register(&mut self, descriptor: FunctionDescriptor) -> Option<Arc<FunctionDescriptor>> {
        self.functions
            .insert(descriptor.name.clone(), Arc::new(descriptor))
    }

    pub(crate) fn add<E, V>(&mut self, name: &str, return_type: ReturnType, validator: V, evaluator: E)
    where
        E: Fn(&Expression, &dyn Memory, &EvaluationOptions) -> EvalResult<Value>
            + Send
            + Sync
            + 'static,
        V: Fn(&Expression) -> EvalResult<()> + Send + Sync + 'static,
    {
        self.register(FunctionDescriptor::new(name, return_type, evaluator, validator));
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<FunctionDescriptor>> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Builds a call node and runs the function's static validator on it.
    pub fn make_call(&self, name: &str, args: Vec<Expression>) -> EvalResult<Expression> {
        let function = self
            .lookup(name)
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))?;
        let call = Expression::FunctionCall {
            function: function.clone(),
            args,
        };
        function.validate(&call)?;
        Ok(call)
    }
}

/// Evaluates every child of `call` in order, verifying each value.
pub fn evaluate_children(
    call: &Expression,
    memory: &dyn Memory,
    options: &EvaluationOptions,
    verify: Option<Verifier>,
) -> EvalResult<Vec<Value>> {
    let children = call.children();
    let mut values = Vec::with_capacity(children.len());
    for (i, child) in children.iter().enumerate() {
        let value = evaluate(child, memory, options)?;
        if let Some(verify) = verify {
            if let Some(message) = verify(&value, child, i) {
                return Err(EvalError::ArityOrType(message));
            }
        }
        values.push(value);
    }
    Ok(values)
}

/// Evaluator over fully evaluated arguments.
pub fn apply<F>(
    f: F,
    verify: Option<Verifier>,
) -> impl Fn(&Expression, &dyn Memory, &EvaluationOptions) -> EvalResult<Value> + Send + Sync + 'static
where
    F: Fn(&[Value]) -> EvalResult<Value> + Send + Sync + 'static,
{
    move |call, memory, options| {
        let args = evaluate_children(call, memory, options, verify)?;
        f(&args)
    }
}

/// Like [`apply`], but the body also sees the call node for error messages.
pub fn apply_with_call<F>(
    f: F,
    verify: Option<Verifier>,
) -> impl Fn(&Expression, &dyn Memory, &EvaluationOptions) -> EvalResult<Value> + Send + Sync + 'static
where
    F: Fn(&Expression, &[Value]) -> EvalResult<Value> + Send + Sync + 'static,
{
    move |call, memory, options| {
        let args = evaluate_children(call, memory, options, verify)?;
        f(call, &args)
    }
}

/// Left fold of a binary body over all arguments.
pub fn apply_sequence<F>(
    f: F,
    verify: Option<Verifier>,
) -> impl Fn(&Expression, &dyn Memory, &EvaluationOptions) -> EvalResult<Value> + Send + Sync + 'static
where
    F: Fn(&Value, &Value) -> EvalResult<Value> + Send + Sync + 'static,
{
    move |call, memory, options| {
        let args = evaluate_children(call, memory, options, verify)?;
        let mut iter = args.into_iter();
        let first = iter.next().unwrap_or(Value::Null);
        iter.try_fold(first, |acc, next| f(&acc, &next))
    }
}
