//! Bind-time validators and evaluation-time argument verifiers.

use crate::ast::{Expression, ReturnType};
use crate::eval::{EvalError, EvalResult, Value};

fn arity_message(call: &Expression, min: usize, max: usize) -> String {
    if min == max {
        format!("{} should have {} children.", call, min)
    } else if max == usize::MAX {
        format!("{} should have at least {} children.", call, min)
    } else {
        format!("{} should have between {} and {} children.", call, min, max)
    }
}

fn check_type(call: &Expression, child: &Expression, expected: ReturnType) -> EvalResult<()> {
    if expected.accepts(child.return_type()) {
        Ok(())
    } else {
        Err(EvalError::ArityOrType(format!(
            "{} is not a {} expression in {}.",
            child, expected, call
        )))
    }
}

/// Child count within `[min, max]`, every child compatible with `types`.
pub fn validate_arity_and_any_type(
    call: &Expression,
    min: usize,
    max: usize,
    types: ReturnType,
) -> EvalResult<()> {
    let children = call.children();
    if children.len() < min || children.len() > max {
        return Err(EvalError::ArityOrType(arity_message(call, min, max)));
    }
    children
        .iter()
        .try_for_each(|child| check_type(call, child, types))
}

/// Positional typing: `expected` children are required, `optional` may follow.
pub fn validate_order(
    call: &Expression,
    optional: &[ReturnType],
    expected: &[ReturnType],
) -> EvalResult<()> {
    let children = call.children();
    let (min, max) = (expected.len(), expected.len() + optional.len());
    if children.len() < min || children.len() > max {
        return Err(EvalError::ArityOrType(arity_message(call, min, max)));
    }
    expected
        .iter()
        .chain(optional.iter())
        .zip(children.iter())
        .try_for_each(|(ty, child)| check_type(call, child, *ty))
}

pub fn validate_unary(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 1, 1, ReturnType::all())
}

pub fn validate_binary(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 2, 2, ReturnType::all())
}

pub fn validate_at_least_one(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 1, usize::MAX, ReturnType::all())
}

pub fn validate_no_args(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 0, 0, ReturnType::all())
}

pub fn validate_unary_number(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 1, 1, ReturnType::NUMBER)
}

pub fn validate_binary_number(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 2, 2, ReturnType::NUMBER)
}

pub fn validate_two_or_more_numbers(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 2, usize::MAX, ReturnType::NUMBER)
}

pub fn validate_unary_string(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 1, 1, ReturnType::STRING)
}

pub fn validate_binary_string(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 2, 2, ReturnType::STRING)
}

pub fn validate_unary_boolean(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 1, 1, ReturnType::BOOLEAN)
}

// Runtime verifiers. Each returns the error message for a rejected value.

pub fn verify_number(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    (!value.is_number()).then(|| format!("{} is not a number.", expr))
}

pub fn verify_integer(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    (!value.is_integer()).then(|| format!("{} is not an integer.", expr))
}

pub fn verify_string(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    (!matches!(value, Value::String(_))).then(|| format!("{} is not a string.", expr))
}

pub fn verify_string_or_null(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    (!matches!(value, Value::String(_) | Value::Null))
        .then(|| format!("{} is neither a string nor a null object.", expr))
}

pub fn verify_number_or_string(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    (!(value.is_number() || matches!(value, Value::String(_))))
        .then(|| format!("{} is not string or number.", expr))
}

pub fn verify_number_or_string_or_null(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    (!(value.is_number() || matches!(value, Value::String(_) | Value::Null)))
        .then(|| format!("{} is neither a number nor a string.", expr))
}

pub fn verify_list(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    (!matches!(value, Value::List(_))).then(|| format!("{} is not a list.", expr))
}

pub fn verify_numeric_list(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    match value {
        Value::List(items) if items.iter().all(Value::is_number) => None,
        _ => Some(format!("{} is not a list of numbers.", expr)),
    }
}

pub fn verify_not_null(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    value.is_null().then(|| format!("{} is null.", expr))
}

pub fn verify_container(value: &Value, expr: &Expression, _: usize) -> Option<String> {
    (!matches!(value, Value::String(_) | Value::List(_) | Value::Map(_)))
        .then(|| format!("{} must be a string, list or object.", expr))
}
