use crate::ast::{Expression, ReturnType};
use crate::eval::{evaluate, EvalError, EvalResult, EvaluationOptions, Memory, Value};
use crate::functions::validators::*;
use crate::functions::{apply, apply_with_call, FunctionTable};

pub(crate) fn register(table: &mut FunctionTable) {
    table.add(
        "if",
        ReturnType::OBJECT,
        |call| validate_arity_and_any_type(call, 3, 3, ReturnType::all()),
        if_then_else,
    );
    table.add("coalesce", ReturnType::OBJECT, validate_at_least_one, coalesce);
    table.add("exists", ReturnType::BOOLEAN, validate_unary, |call, memory, options| {
        Ok(Value::Boolean(!evaluate(&call.children()[0], memory, options)?.is_null()))
    });

    table.add("bool", ReturnType::BOOLEAN, validate_unary, apply(|args| Ok(Value::Boolean(to_bool(&args[0]))), None));
    table.add("int", ReturnType::NUMBER, validate_unary, apply_with_call(to_int, None));
    table.add("float", ReturnType::NUMBER, validate_unary, apply_with_call(to_float, None));

    let checks: [(&str, fn(&Value) -> bool); 6] = [
        ("isString", |v| matches!(v, Value::String(_))),
        ("isInteger", |v| matches!(v, Value::Integer(_))),
        ("isFloat", |v| matches!(v, Value::Float(_))),
        ("isBoolean", |v| matches!(v, Value::Boolean(_))),
        ("isArray", |v| matches!(v, Value::List(_))),
        ("isObject", |v| matches!(v, Value::Map(_))),
    ];
    for (name, check) in checks {
        table.add(
            name,
            ReturnType::BOOLEAN,
            validate_unary,
            apply(move |args| Ok(Value::Boolean(check(&args[0]))), None),
        );
    }
}

fn if_then_else(call: &Expression, memory: &dyn Memory, options: &EvaluationOptions) -> EvalResult<Value> {
    let children = call.children();
    let branch = if evaluate(&children[0], memory, options)?.is_truthy() {
        &children[1]
    } else {
        &children[2]
    };
    evaluate(branch, memory, options)
}

fn coalesce(call: &Expression, memory: &dyn Memory, options: &EvaluationOptions) -> EvalResult<Value> {
    for child in call.children() {
        let value = evaluate(child, memory, options)?;
        if !value.is_null() {
            return Ok(value);
        }
    }
    Ok(Value::Null)
}

fn to_bool(value: &Value) -> bool {
    match value {
        Value::String(s) if s.eq_ignore_ascii_case("false") => false,
        Value::String(s) if s.eq_ignore_ascii_case("true") => true,
        Value::Integer(i) => *i != 0,
        other => other.is_truthy(),
    }
}

fn to_int(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let converted = match &args[0] {
        Value::Integer(i) => Some(*i),
        Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        Value::Boolean(b) => Some(*b as i64),
        _ => None,
    };
    converted.map(Value::Integer).ok_or_else(|| {
        EvalError::arity_or_type(format!(
            "parameter {} must be convertible to an integer.",
            call.children()[0]
        ))
    })
}

fn to_float(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let converted = match &args[0] {
        Value::Integer(_) | Value::Float(_) => args[0].as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    converted.map(Value::Float).ok_or_else(|| {
        EvalError::arity_or_type(format!(
            "parameter {} must be convertible to a float.",
            call.children()[0]
        ))
    })
}
