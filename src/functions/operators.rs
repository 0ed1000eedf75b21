use std::cmp::Ordering;

use crate::ast::{Expression, ReturnType};
use crate::eval::{evaluate, EvalError, EvalResult, EvaluationOptions, Memory, Value};
use crate::functions::validators::*;
use crate::functions::{apply, apply_sequence, apply_with_call, FunctionTable};

pub(crate) fn register(table: &mut FunctionTable) {
    table.add(
        "+",
        ReturnType::NUMBER | ReturnType::STRING,
        |call| validate_arity_and_any_type(call, 2, usize::MAX, ReturnType::NUMBER | ReturnType::STRING),
        apply_sequence(add, Some(verify_number_or_string_or_null)),
    );
    table.add(
        "-",
        ReturnType::NUMBER,
        validate_two_or_more_numbers,
        apply_sequence(|a, b| arithmetic(a, b, i64::checked_sub, |x, y| x - y), Some(verify_number)),
    );
    table.add(
        "*",
        ReturnType::NUMBER,
        validate_two_or_more_numbers,
        apply_sequence(|a, b| arithmetic(a, b, i64::checked_mul, |x, y| x * y), Some(verify_number)),
    );
    table.add(
        "/",
        ReturnType::NUMBER,
        validate_two_or_more_numbers,
        apply_sequence(divide, Some(verify_number)),
    );
    table.add(
        "%",
        ReturnType::NUMBER,
        validate_binary_number,
        apply_sequence(modulo, Some(verify_number)),
    );
    table.add(
        "^",
        ReturnType::NUMBER,
        validate_binary_number,
        apply_sequence(power, Some(verify_number)),
    );
    table.add(
        "exp",
        ReturnType::NUMBER,
        validate_binary_number,
        apply_sequence(power, Some(verify_number)),
    );
    table.add(
        "&",
        ReturnType::STRING,
        |call| validate_arity_and_any_type(call, 2, usize::MAX, ReturnType::all()),
        apply_sequence(
            |a, b| Ok(Value::String(a.to_display_string() + &b.to_display_string())),
            None,
        ),
    );

    table.add(
        "==",
        ReturnType::BOOLEAN,
        validate_binary,
        apply(|args| Ok(Value::Boolean(args[0] == args[1])), None),
    );
    table.add(
        "!=",
        ReturnType::BOOLEAN,
        validate_binary,
        apply(|args| Ok(Value::Boolean(args[0] != args[1])), None),
    );
    let comparisons: [(&str, fn(Ordering) -> bool); 4] = [
        ("<", Ordering::is_lt),
        ("<=", Ordering::is_le),
        (">", Ordering::is_gt),
        (">=", Ordering::is_ge),
    ];
    for (name, accept) in comparisons {
        table.add(
            name,
            ReturnType::BOOLEAN,
            |call| validate_arity_and_any_type(call, 2, 2, ReturnType::NUMBER | ReturnType::STRING),
            apply_with_call(
                move |call, args| compare(call, &args[0], &args[1]).map(|o| Value::Boolean(accept(o))),
                Some(verify_number_or_string),
            ),
        );
    }

    table.add("&&", ReturnType::BOOLEAN, validate_at_least_one, and);
    table.add("||", ReturnType::BOOLEAN, validate_at_least_one, or);
    table.add(
        "!",
        ReturnType::BOOLEAN,
        validate_unary,
        apply(|args| Ok(Value::Boolean(!args[0].is_truthy())), None),
    );
}

pub(crate) fn add(a: &Value, b: &Value) -> EvalResult<Value> {
    match (a, b) {
        (Value::String(_), _) | (_, Value::String(_)) => Ok(Value::String(
            a.to_display_string() + &b.to_display_string(),
        )),
        _ if a.is_number() && b.is_number() => arithmetic(a, b, i64::checked_add, |x, y| x + y),
        _ => Err(EvalError::evaluation(format!(
            "Operator '+' cannot be applied to {} and {}.",
            a.type_name(),
            b.type_name()
        ))),
    }
}

/// Integer op integer stays integral; anything involving a float is a float.
pub(crate) fn arithmetic(
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> EvalResult<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => int_op(*x, *y)
            .map(Value::Integer)
            .ok_or_else(|| EvalError::out_of_range(format!("{} and {} overflow an integer.", x, y))),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Float(float_op(x, y))),
            _ => Err(EvalError::evaluation(format!(
                "{} and {} are not both numbers.",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn is_zero(value: &Value) -> bool {
    value.as_f64() == Some(0.0)
}

pub(crate) fn divide(a: &Value, b: &Value) -> EvalResult<Value> {
    if is_zero(b) {
        return Err(EvalError::evaluation("Cannot divide by 0."));
    }
    arithmetic(a, b, i64::checked_div, |x, y| x / y)
}

pub(crate) fn modulo(a: &Value, b: &Value) -> EvalResult<Value> {
    if is_zero(b) {
        return Err(EvalError::evaluation("Cannot mod by 0."));
    }
    arithmetic(a, b, i64::checked_rem, |x, y| x % y)
}

fn power(a: &Value, b: &Value) -> EvalResult<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) if *y >= 0 => {
            let exp = u32::try_from(*y)
                .map_err(|_| EvalError::out_of_range(format!("exponent {} is too large.", y)))?;
            x.checked_pow(exp)
                .map(Value::Integer)
                .ok_or_else(|| EvalError::out_of_range(format!("{} ^ {} overflows an integer.", x, y)))
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Value::Float(x.powf(y))),
            _ => Err(EvalError::evaluation(format!(
                "{} and {} are not both numbers.",
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

pub(crate) fn compare(call: &Expression, a: &Value, b: &Value) -> EvalResult<Ordering> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| {
                EvalError::evaluation(format!("{} compares NaN values.", call))
            }),
            _ => Err(EvalError::arity_or_type(format!(
                "{} cannot compare a {} with a {}.",
                call,
                a.type_name(),
                b.type_name()
            ))),
        },
    }
}

fn and(call: &Expression, memory: &dyn Memory, options: &EvaluationOptions) -> EvalResult<Value> {
    for child in call.children() {
        if !evaluate(child, memory, options)?.is_truthy() {
            return Ok(Value::Boolean(false));
        }
    }
    Ok(Value::Boolean(true))
}

fn or(call: &Expression, memory: &dyn Memory, options: &EvaluationOptions) -> EvalResult<Value> {
    for child in call.children() {
        if evaluate(child, memory, options)?.is_truthy() {
            return Ok(Value::Boolean(true));
        }
    }
    Ok(Value::Boolean(false))
}
