use crate::ast::{Expression, ReturnType};
use crate::eval::{evaluate, EvalError, EvalResult, EvaluationOptions, Memory, Value};
use crate::functions::validators::*;
use crate::functions::{apply_with_call, FunctionTable};

pub(crate) fn register(table: &mut FunctionTable) {
    table.add(
        "getProperty",
        ReturnType::OBJECT,
        |call| validate_order(call, &[ReturnType::STRING], &[ReturnType::OBJECT]),
        get_property,
    );
    table.add(
        "element",
        ReturnType::OBJECT,
        validate_binary,
        apply_with_call(element, None),
    );
    table.add(
        "setProperty",
        ReturnType::OBJECT,
        |call| validate_order(call, &[], &[ReturnType::OBJECT, ReturnType::STRING, ReturnType::OBJECT]),
        apply_with_call(set_property, None),
    );
    table.add(
        "removeProperty",
        ReturnType::OBJECT,
        |call| validate_order(call, &[], &[ReturnType::OBJECT, ReturnType::STRING]),
        apply_with_call(remove_property, None),
    );
    table.add(
        "json",
        ReturnType::OBJECT,
        validate_unary_string,
        apply_with_call(parse_json, Some(verify_string)),
    );
}

// One argument reads a memory path; two arguments read a property of an object.
fn get_property(call: &Expression, memory: &dyn Memory, options: &EvaluationOptions) -> EvalResult<Value> {
    let children = call.children();
    let first = evaluate(&children[0], memory, options)?;
    match children.get(1) {
        None => {
            let path = first.as_str().ok_or_else(|| {
                EvalError::arity_or_type(format!("{} is not a string.", children[0]))
            })?;
            Ok(memory.get_value(path)?.unwrap_or(Value::Null))
        }
        Some(name_expr) => {
            let name = evaluate(name_expr, memory, options)?;
            let name = name.as_str().ok_or_else(|| {
                EvalError::arity_or_type(format!("{} is not a string.", name_expr))
            })?;
            Ok(first.property(name).cloned().unwrap_or(Value::Null))
        }
    }
}

fn element(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    match (&args[0], &args[1]) {
        (Value::List(items), index) if index.is_integer() => {
            let i = index.as_i64().unwrap_or(-1);
            usize::try_from(i)
                .ok()
                .and_then(|i| items.get(i))
                .cloned()
                .ok_or_else(|| {
                    EvalError::out_of_range(format!(
                        "{}={} which is out of range for {}.",
                        call.children()[1],
                        i,
                        call.children()[0]
                    ))
                })
        }
        (Value::Map(_), Value::String(key)) => {
            Ok(args[0].property(key).cloned().unwrap_or(Value::Null))
        }
        (Value::Null, _) => Ok(Value::Null),
        _ => Err(EvalError::arity_or_type(format!(
            "{} cannot index a {} with a {}.",
            call,
            args[0].type_name(),
            args[1].type_name()
        ))),
    }
}

fn set_property(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let mut object = args[0].clone();
    let name = args[1].as_str().ok_or_else(|| {
        EvalError::arity_or_type(format!("{} is not a string.", call.children()[1]))
    })?;
    if object.is_null() {
        object = Value::empty_map();
    }
    let map = object.as_map_mut().ok_or_else(|| {
        EvalError::arity_or_type(format!("{} is not an object.", call.children()[0]))
    })?;
    map.insert(name.to_string(), args[2].clone());
    Ok(object)
}

fn remove_property(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let mut object = args[0].clone();
    let name = args[1].as_str().ok_or_else(|| {
        EvalError::arity_or_type(format!("{} is not a string.", call.children()[1]))
    })?;
    if let Some(map) = object.as_map_mut() {
        map.remove(name);
    }
    Ok(object)
}

fn parse_json(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let text = args[0].as_str().unwrap_or_default();
    serde_json::from_str::<serde_json::Value>(text)
        .map(Value::from)
        .map_err(|e| EvalError::evaluation(format!("{} is not valid JSON: {}", call.children()[0], e)))
}
