use std::cmp::Ordering;
use std::collections::HashMap;

use crate::ast::{Expression, ReturnType};
use crate::eval::{evaluate, EvalError, EvalResult, EvaluationOptions, Memory, StackedMemory, Value};
use crate::functions::operators::compare;
use crate::functions::validators::*;
use crate::functions::{apply, apply_with_call, FunctionTable};

const DEFAULT_FLATTEN_DEPTH: i64 = 100;

pub(crate) fn register(table: &mut FunctionTable) {
    table.add(
        "createArray",
        ReturnType::ARRAY,
        |call| validate_arity_and_any_type(call, 0, usize::MAX, ReturnType::all()),
        apply(|args| Ok(Value::List(args.to_vec())), None),
    );
    table.add(
        "count",
        ReturnType::NUMBER,
        |call| validate_order(call, &[], &[ReturnType::STRING | ReturnType::ARRAY]),
        apply(
            |args| {
                Ok(Value::from(match &args[0] {
                    Value::String(s) => s.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Map(map) => map.len(),
                    _ => 0,
                }))
            },
            Some(verify_container),
        ),
    );
    table.add(
        "contains",
        ReturnType::BOOLEAN,
        validate_binary,
        apply(|args| Ok(Value::Boolean(contains(&args[0], &args[1]))), None),
    );
    table.add(
        "first",
        ReturnType::OBJECT,
        validate_unary,
        apply(|args| Ok(nth(&args[0], false)), None),
    );
    table.add(
        "last",
        ReturnType::OBJECT,
        validate_unary,
        apply(|args| Ok(nth(&args[0], true)), None),
    );
    table.add(
        "join",
        ReturnType::STRING,
        |call| {
            validate_order(
                call,
                &[ReturnType::STRING],
                &[ReturnType::ARRAY, ReturnType::STRING],
            )
        },
        apply_with_call(join, None),
    );
    table.add(
        "flatten",
        ReturnType::ARRAY,
        |call| validate_order(call, &[ReturnType::NUMBER], &[ReturnType::ARRAY]),
        apply_with_call(flatten, None),
    );
    table.add(
        "union",
        ReturnType::ARRAY,
        |call| validate_arity_and_any_type(call, 1, usize::MAX, ReturnType::ARRAY),
        apply(
            |args| Ok(Value::List(distinct(args.iter().filter_map(Value::as_list).flatten()))),
            Some(verify_list),
        ),
    );
    table.add(
        "intersection",
        ReturnType::ARRAY,
        |call| validate_arity_and_any_type(call, 1, usize::MAX, ReturnType::ARRAY),
        apply(intersection, Some(verify_list)),
    );
    table.add(
        "unique",
        ReturnType::ARRAY,
        |call| validate_order(call, &[], &[ReturnType::ARRAY]),
        apply(
            |args| Ok(Value::List(distinct(args[0].as_list().into_iter().flatten()))),
            Some(verify_list),
        ),
    );
    table.add(
        "take",
        ReturnType::ARRAY | ReturnType::STRING,
        |call| validate_order(call, &[], &[ReturnType::ARRAY | ReturnType::STRING, ReturnType::NUMBER]),
        apply_with_call(|call, args| slice(call, args, true), None),
    );
    table.add(
        "skip",
        ReturnType::ARRAY | ReturnType::STRING,
        |call| validate_order(call, &[], &[ReturnType::ARRAY | ReturnType::STRING, ReturnType::NUMBER]),
        apply_with_call(|call, args| slice(call, args, false), None),
    );
    table.add(
        "sortBy",
        ReturnType::ARRAY,
        |call| validate_order(call, &[ReturnType::STRING], &[ReturnType::ARRAY]),
        apply_with_call(|call, args| sort_by(call, args, false), None),
    );
    table.add(
        "sortByDescending",
        ReturnType::ARRAY,
        |call| validate_order(call, &[ReturnType::STRING], &[ReturnType::ARRAY]),
        apply_with_call(|call, args| sort_by(call, args, true), None),
    );
    table.add(
        "empty",
        ReturnType::BOOLEAN,
        validate_unary,
        apply(|args| Ok(Value::Boolean(is_empty(&args[0]))), None),
    );

    table.add("where", ReturnType::ARRAY, validate_iterator, |call, memory, options| {
        iterate(call, memory, options, Iteration::Where)
    });
    table.add("select", ReturnType::ARRAY, validate_iterator, |call, memory, options| {
        iterate(call, memory, options, Iteration::Select)
    });
    table.add("foreach", ReturnType::ARRAY, validate_iterator, |call, memory, options| {
        iterate(call, memory, options, Iteration::Select)
    });
}

pub(crate) fn contains(collection: &Value, item: &Value) -> bool {
    match (collection, item) {
        (Value::String(text), Value::String(needle)) => text.contains(needle.as_str()),
        (Value::List(items), _) => items.contains(item),
        (Value::Map(_), Value::String(key)) => collection.property(key).is_some(),
        _ => false,
    }
}

fn nth(value: &Value, last: bool) -> Value {
    match value {
        Value::String(s) => {
            let c = if last { s.chars().last() } else { s.chars().next() };
            c.map(|c| Value::String(c.to_string())).unwrap_or(Value::Null)
        }
        Value::List(items) => {
            let item = if last { items.last() } else { items.first() };
            item.cloned().unwrap_or(Value::Null)
        }
        _ => Value::Null,
    }
}

fn join(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let items = args[0]
        .as_list()
        .ok_or_else(|| EvalError::arity_or_type(format!("{} is not a list.", call.children()[0])))?;
    let separator = args[1].to_display_string();
    let strings: Vec<String> = items.iter().map(Value::to_display_string).collect();
    let joined = match (args.get(2), strings.split_last()) {
        (Some(last_separator), Some((last, init))) if !init.is_empty() => {
            format!("{}{}{}", init.join(&separator), last_separator.to_display_string(), last)
        }
        _ => strings.join(&separator),
    };
    Ok(Value::String(joined))
}

fn flatten(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let items = args[0]
        .as_list()
        .ok_or_else(|| EvalError::arity_or_type(format!("{} is not a list.", call.children()[0])))?;
    let depth = match args.get(1) {
        Some(value) => value.as_i64().ok_or_else(|| {
            EvalError::arity_or_type(format!("{} is not an integer.", call.children()[1]))
        })?,
        None => DEFAULT_FLATTEN_DEPTH,
    }
    .max(1);
    Ok(Value::List(flatten_list(items.clone(), depth)))
}

pub fn flatten_list(mut items: Vec<Value>, depth: i64) -> Vec<Value> {
    for _ in 0..depth {
        if !items.iter().any(|item| matches!(item, Value::List(_))) {
            break;
        }
        items = items
            .into_iter()
            .flat_map(|item| match item {
                Value::List(inner) => inner,
                other => vec![other],
            })
            .collect();
    }
    items
}

fn distinct<'a>(items: impl Iterator<Item = &'a Value>) -> Vec<Value> {
    let mut result: Vec<Value> = Vec::new();
    for item in items {
        if !result.contains(item) {
            result.push(item.clone());
        }
    }
    result
}

fn intersection(args: &[Value]) -> EvalResult<Value> {
    let lists: Vec<&Vec<Value>> = args.iter().filter_map(Value::as_list).collect();
    let Some((first, rest)) = lists.split_first() else {
        return Ok(Value::List(Vec::new()));
    };
    let shared = first
        .iter()
        .filter(|item| rest.iter().all(|list| list.contains(*item)));
    Ok(Value::List(distinct(shared)))
}

fn slice(call: &Expression, args: &[Value], take: bool) -> EvalResult<Value> {
    let count = args[1]
        .as_i64()
        .ok_or_else(|| EvalError::arity_or_type(format!("{} is not an integer.", call.children()[1])))?;
    if count < 0 {
        return Err(EvalError::out_of_range(format!(
            "{}: the second parameter should not be less than zero.",
            call
        )));
    }
    let count = count as usize;
    match &args[0] {
        Value::List(items) => {
            let count = count.min(items.len());
            let part = if take { &items[..count] } else { &items[count..] };
            Ok(Value::List(part.to_vec()))
        }
        Value::String(s) => {
            let part: String = if take {
                s.chars().take(count).collect()
            } else {
                s.chars().skip(count).collect()
            };
            Ok(Value::String(part))
        }
        _ => Err(EvalError::arity_or_type(format!(
            "{} is not a list or a string.",
            call.children()[0]
        ))),
    }
}

fn sort_by(call: &Expression, args: &[Value], descending: bool) -> EvalResult<Value> {
    let items = args[0]
        .as_list()
        .ok_or_else(|| EvalError::arity_or_type(format!("{} is not a list.", call.children()[0])))?;
    let property = args.get(1).and_then(Value::as_str);
    let key = |item: &Value| -> Value {
        match property {
            Some(name) => item.property(name).cloned().unwrap_or(Value::Null),
            None => item.clone(),
        }
    };

    let mut keyed: Vec<(Value, Value)> = items.iter().map(|item| (key(item), item.clone())).collect();
    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| match compare(call, a, b) {
        Ok(ordering) => ordering,
        Err(e) => {
            failure.get_or_insert(e);
            Ordering::Equal
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    if descending {
        keyed.reverse();
    }
    Ok(Value::List(keyed.into_iter().map(|(_, item)| item).collect()))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(map) => map.is_empty(),
        _ => false,
    }
}

#[derive(Clone, Copy)]
enum Iteration {
    Where,
    Select,
}

fn validate_iterator(call: &Expression) -> EvalResult<()> {
    validate_arity_and_any_type(call, 3, 3, ReturnType::all())?;
    match &call.children()[1] {
        Expression::Accessor { path } if !path.contains(['.', '[']) => Ok(()),
        other => Err(EvalError::arity_or_type(format!(
            "Second parameter of {} is not an identifier: {}.",
            call, other
        ))),
    }
}

fn iterate(
    call: &Expression,
    memory: &dyn Memory,
    options: &EvaluationOptions,
    mode: Iteration,
) -> EvalResult<Value> {
    let children = call.children();
    let iterator = match &children[1] {
        Expression::Accessor { path } => path.as_str(),
        other => return Err(EvalError::arity_or_type(format!("{} is not an identifier.", other))),
    };
    let collection = evaluate(&children[0], memory, options)?;

    let items: Vec<Value> = match &collection {
        Value::List(items) => items.clone(),
        Value::Map(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|key| {
                    Value::Map(HashMap::from([
                        ("key".to_string(), Value::String(key.clone())),
                        ("value".to_string(), map[key].clone()),
                    ]))
                })
                .collect()
        }
        Value::Null => Vec::new(),
        _ => {
            return Err(EvalError::arity_or_type(format!(
                "{} is not a collection or structure object.",
                children[0]
            )))
        }
    };

    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let scoped = StackedMemory::new(memory).with_local(iterator, item.clone());
        let outcome = evaluate(&children[2], &scoped, options)?;
        match mode {
            Iteration::Where if outcome.is_truthy() => results.push(item),
            Iteration::Where => {}
            Iteration::Select => results.push(outcome),
        }
    }
    Ok(Value::List(results))
}
