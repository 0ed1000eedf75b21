use std::cmp::Ordering;

use crate::ast::{Expression, ReturnType};
use crate::eval::{EvalError, EvalResult, Value};
use crate::functions::operators::{add, arithmetic, compare, divide, modulo};
use crate::functions::validators::*;
use crate::functions::{apply, apply_sequence, apply_with_call, FunctionTable};

pub(crate) fn register(table: &mut FunctionTable) {
    // Named forms of the arithmetic operators.
    table.add(
        "add",
        ReturnType::NUMBER | ReturnType::STRING,
        |call| validate_arity_and_any_type(call, 2, usize::MAX, ReturnType::NUMBER | ReturnType::STRING),
        apply_sequence(add, Some(verify_number_or_string_or_null)),
    );
    table.add(
        "sub",
        ReturnType::NUMBER,
        validate_two_or_more_numbers,
        apply_sequence(|a, b| arithmetic(a, b, i64::checked_sub, |x, y| x - y), Some(verify_number)),
    );
    table.add(
        "mul",
        ReturnType::NUMBER,
        validate_two_or_more_numbers,
        apply_sequence(|a, b| arithmetic(a, b, i64::checked_mul, |x, y| x * y), Some(verify_number)),
    );
    table.add(
        "div",
        ReturnType::NUMBER,
        validate_two_or_more_numbers,
        apply_sequence(divide, Some(verify_number)),
    );
    table.add(
        "mod",
        ReturnType::NUMBER,
        validate_binary_number,
        apply_sequence(modulo, Some(verify_number)),
    );

    table.add(
        "max",
        ReturnType::NUMBER,
        |call| validate_arity_and_any_type(call, 1, usize::MAX, ReturnType::NUMBER | ReturnType::ARRAY),
        apply_with_call(|call, args| extreme(call, args, Ordering::Greater), None),
    );
    table.add(
        "min",
        ReturnType::NUMBER,
        |call| validate_arity_and_any_type(call, 1, usize::MAX, ReturnType::NUMBER | ReturnType::ARRAY),
        apply_with_call(|call, args| extreme(call, args, Ordering::Less), None),
    );
    table.add(
        "sum",
        ReturnType::NUMBER,
        |call| validate_order(call, &[], &[ReturnType::ARRAY]),
        apply(|args| sum(numbers(&args[0])), Some(verify_numeric_list)),
    );
    table.add(
        "average",
        ReturnType::NUMBER,
        |call| validate_order(call, &[], &[ReturnType::ARRAY]),
        apply(average, Some(verify_numeric_list)),
    );
    table.add(
        "floor",
        ReturnType::NUMBER,
        validate_unary_number,
        apply(|args| to_integer(args[0].as_f64().unwrap_or_default().floor()), Some(verify_number)),
    );
    table.add(
        "ceiling",
        ReturnType::NUMBER,
        validate_unary_number,
        apply(|args| to_integer(args[0].as_f64().unwrap_or_default().ceil()), Some(verify_number)),
    );
    table.add(
        "round",
        ReturnType::NUMBER,
        |call| validate_order(call, &[ReturnType::NUMBER], &[ReturnType::NUMBER]),
        apply(round, Some(verify_number)),
    );
    table.add(
        "abs",
        ReturnType::NUMBER,
        validate_unary_number,
        apply(
            |args| match &args[0] {
                Value::Integer(i) => i
                    .checked_abs()
                    .map(Value::Integer)
                    .ok_or_else(|| EvalError::out_of_range("abs overflows an integer.")),
                other => Ok(Value::Float(other.as_f64().unwrap_or_default().abs())),
            },
            Some(verify_number),
        ),
    );
    table.add(
        "range",
        ReturnType::ARRAY,
        validate_binary_number,
        apply_with_call(range, Some(verify_integer)),
    );
}

fn numbers(value: &Value) -> &[Value] {
    value.as_list().map(Vec::as_slice).unwrap_or_default()
}

fn extreme(call: &Expression, args: &[Value], wanted: Ordering) -> EvalResult<Value> {
    let candidates = match args {
        [Value::List(items)] => items.as_slice(),
        _ => args,
    };
    let mut best: Option<&Value> = None;
    for candidate in candidates {
        if !candidate.is_number() {
            return Err(EvalError::arity_or_type(format!(
                "{} is not a number in {}.",
                candidate.to_display_string(),
                call
            )));
        }
        let better = match best {
            Some(current) => compare(call, candidate, current)? == wanted,
            None => true,
        };
        if better {
            best = Some(candidate);
        }
    }
    best.cloned()
        .ok_or_else(|| EvalError::evaluation(format!("{} has no values to compare.", call)))
}

fn sum(items: &[Value]) -> EvalResult<Value> {
    items
        .iter()
        .try_fold(Value::Integer(0), |acc, item| {
            arithmetic(&acc, item, i64::checked_add, |x, y| x + y)
        })
}

fn average(args: &[Value]) -> EvalResult<Value> {
    let items = numbers(&args[0]);
    if items.is_empty() {
        return Err(EvalError::evaluation("average of an empty list is undefined."));
    }
    let total: f64 = items.iter().filter_map(Value::as_f64).sum();
    Ok(Value::Float(total / items.len() as f64))
}

fn to_integer(f: f64) -> EvalResult<Value> {
    if f.is_finite() && f.abs() < i64::MAX as f64 {
        Ok(Value::Integer(f as i64))
    } else {
        Err(EvalError::out_of_range(format!("{} cannot be represented as an integer.", f)))
    }
}

fn round(args: &[Value]) -> EvalResult<Value> {
    let x = args[0].as_f64().unwrap_or_default();
    match args.get(1) {
        None => to_integer(x.round()),
        Some(digits) => {
            let digits = digits
                .as_i64()
                .filter(|d| (0..=15).contains(d))
                .ok_or_else(|| {
                    EvalError::out_of_range("round's second parameter must be an integer between 0 and 15.")
                })?;
            let factor = 10f64.powi(digits as i32);
            Ok(Value::Float((x * factor).round() / factor))
        }
    }
}

fn range(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let start = args[0].as_i64().unwrap_or_default();
    let count = args[1].as_i64().unwrap_or_default();
    if count <= 0 {
        return Err(EvalError::out_of_range(format!(
            "{}: the second parameter should be more than zero.",
            call
        )));
    }
    (0..count)
        .map(|i| {
            start.checked_add(i).map(Value::Integer).ok_or_else(|| {
                EvalError::out_of_range(format!("{}: {} + {} overflows an integer.", call, start, i))
            })
        })
        .collect::<EvalResult<Vec<_>>>()
        .map(Value::List)
}
