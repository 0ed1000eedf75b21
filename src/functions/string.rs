use uuid::Uuid;

use crate::ast::{Expression, ReturnType};
use crate::eval::{EvalError, EvalResult, Value};
use crate::functions::validators::*;
use crate::functions::{apply, apply_sequence, apply_with_call, FunctionTable};

pub(crate) fn register(table: &mut FunctionTable) {
    table.add(
        "concat",
        ReturnType::STRING | ReturnType::ARRAY,
        validate_at_least_one,
        apply_sequence(concat, None),
    );
    table.add(
        "length",
        ReturnType::NUMBER,
        validate_unary_string,
        apply(
            |args| Ok(Value::from(string_or_empty(&args[0]).chars().count())),
            Some(verify_string_or_null),
        ),
    );
    table.add(
        "substring",
        ReturnType::STRING,
        |call| validate_order(call, &[ReturnType::NUMBER], &[ReturnType::STRING, ReturnType::NUMBER]),
        apply_with_call(substring, None),
    );
    table.add(
        "toLower",
        ReturnType::STRING,
        validate_unary_string,
        apply(
            |args| Ok(Value::String(string_or_empty(&args[0]).to_lowercase())),
            Some(verify_string_or_null),
        ),
    );
    table.add(
        "toUpper",
        ReturnType::STRING,
        validate_unary_string,
        apply(
            |args| Ok(Value::String(string_or_empty(&args[0]).to_uppercase())),
            Some(verify_string_or_null),
        ),
    );
    table.add(
        "trim",
        ReturnType::STRING,
        validate_unary_string,
        apply(
            |args| Ok(Value::String(string_or_empty(&args[0]).trim().to_string())),
            Some(verify_string_or_null),
        ),
    );
    table.add(
        "startsWith",
        ReturnType::BOOLEAN,
        validate_binary_string,
        apply(
            |args| {
                Ok(Value::Boolean(
                    string_or_empty(&args[0]).starts_with(string_or_empty(&args[1])),
                ))
            },
            Some(verify_string_or_null),
        ),
    );
    table.add(
        "endsWith",
        ReturnType::BOOLEAN,
        validate_binary_string,
        apply(
            |args| {
                Ok(Value::Boolean(
                    string_or_empty(&args[0]).ends_with(string_or_empty(&args[1])),
                ))
            },
            Some(verify_string_or_null),
        ),
    );
    table.add(
        "replace",
        ReturnType::STRING,
        |call| validate_arity_and_any_type(call, 3, 3, ReturnType::STRING),
        apply_with_call(replace, Some(verify_string_or_null)),
    );
    table.add(
        "split",
        ReturnType::ARRAY,
        |call| validate_arity_and_any_type(call, 1, 2, ReturnType::STRING),
        apply(split, Some(verify_string_or_null)),
    );
    table.add(
        "indexOf",
        ReturnType::NUMBER,
        |call| validate_order(call, &[], &[ReturnType::ARRAY | ReturnType::STRING, ReturnType::OBJECT]),
        apply_with_call(|call, args| index_of(call, args, false), None),
    );
    table.add(
        "lastIndexOf",
        ReturnType::NUMBER,
        |call| validate_order(call, &[], &[ReturnType::ARRAY | ReturnType::STRING, ReturnType::OBJECT]),
        apply_with_call(|call, args| index_of(call, args, true), None),
    );
    table.add(
        "addOrdinal",
        ReturnType::STRING,
        validate_unary_number,
        apply(
            |args| Ok(Value::String(add_ordinal(args[0].as_i64().unwrap_or_default()))),
            Some(verify_integer),
        ),
    );
    table.add(
        "string",
        ReturnType::STRING,
        validate_unary,
        apply(|args| Ok(Value::String(args[0].to_display_string())), None),
    );
    table.add(
        "newGuid",
        ReturnType::STRING,
        validate_no_args,
        apply(|_| Ok(Value::String(Uuid::new_v4().to_string())), None),
    );
}

fn string_or_empty(value: &Value) -> &str {
    value.as_str().unwrap_or_default()
}

fn concat(a: &Value, b: &Value) -> EvalResult<Value> {
    Ok(match (a, b) {
        (Value::Null, Value::Null) => Value::Null,
        (Value::Null, Value::List(_)) => b.clone(),
        (Value::List(_), Value::Null) => a.clone(),
        (Value::List(x), Value::List(y)) => Value::List(x.iter().chain(y.iter()).cloned().collect()),
        _ => Value::String(a.to_display_string() + &b.to_display_string()),
    })
}

fn substring(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let children = call.children();
    let text = match &args[0] {
        Value::Null => return Ok(Value::String(String::new())),
        Value::String(s) => s,
        _ => {
            return Err(EvalError::arity_or_type(format!(
                "{} is not a string.",
                children[0]
            )))
        }
    };
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len() as i64;

    let start = args[1]
        .as_i64()
        .ok_or_else(|| EvalError::arity_or_type(format!("{} is not an integer.", children[1])))?;
    if start < 0 || start >= len {
        return Err(EvalError::out_of_range(format!(
            "{}={} which is out of range for {}.",
            children[1], start, text
        )));
    }

    let length = match args.get(2) {
        None => len - start,
        Some(value) => {
            let length = value.as_i64().ok_or_else(|| {
                EvalError::arity_or_type(format!("{} is not an integer.", children[2]))
            })?;
            if length < 0 || length > len - start {
                return Err(EvalError::out_of_range(format!(
                    "{}={} which is out of range for {}.",
                    children[2], length, text
                )));
            }
            length
        }
    };

    let (start, length) = (start as usize, length as usize);
    Ok(Value::String(chars[start..start + length].iter().collect()))
}

fn replace(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let old = string_or_empty(&args[1]);
    if old.is_empty() {
        return Err(EvalError::evaluation(format!(
            "{} should have a non-empty string to replace.",
            call
        )));
    }
    Ok(Value::String(
        string_or_empty(&args[0]).replace(old, string_or_empty(&args[2])),
    ))
}

fn split(args: &[Value]) -> EvalResult<Value> {
    let text = string_or_empty(&args[0]);
    let separator = args.get(1).map(string_or_empty).unwrap_or_default();
    let parts: Vec<Value> = if separator.is_empty() {
        text.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        text.split(separator).map(Value::from).collect()
    };
    Ok(Value::List(parts))
}

fn char_index(text: &str, byte_index: usize) -> i64 {
    text[..byte_index].chars().count() as i64
}

fn index_of(call: &Expression, args: &[Value], last: bool) -> EvalResult<Value> {
    let position = match (&args[0], &args[1]) {
        (Value::String(_) | Value::Null, Value::String(_) | Value::Null) => {
            let text = string_or_empty(&args[0]);
            let needle = string_or_empty(&args[1]);
            let found = if last { text.rfind(needle) } else { text.find(needle) };
            found.map(|i| char_index(text, i)).unwrap_or(-1)
        }
        (Value::String(_) | Value::Null, _) => {
            return Err(EvalError::arity_or_type(format!(
                "Can only look for indexof string in {}",
                call
            )))
        }
        (Value::List(items), needle) => {
            let found = if last {
                items.iter().rposition(|item| item == needle)
            } else {
                items.iter().position(|item| item == needle)
            };
            found.map(|i| i as i64).unwrap_or(-1)
        }
        _ => {
            return Err(EvalError::arity_or_type(format!(
                "{} works only on string or list.",
                call
            )))
        }
    };
    Ok(Value::Integer(position))
}

/// `1` -> `1st`, `12` -> `12th`, `23` -> `23rd`. Non-positive numbers
/// are returned without a suffix.
pub fn add_ordinal(num: i64) -> String {
    if num <= 0 {
        return num.to_string();
    }
    let suffix = match num % 100 {
        11..=13 => "th",
        _ => match num % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        },
    };
    format!("{}{}", num, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_ordinal() {
        let cases = [
            (1, "1st"),
            (2, "2nd"),
            (3, "3rd"),
            (4, "4th"),
            (11, "11th"),
            (12, "12th"),
            (13, "13th"),
            (21, "21st"),
            (22, "22nd"),
            (111, "111th"),
            (112, "112th"),
            (123, "123rd"),
            (0, "0"),
            (-1, "-1"),
        ];
        for (num, expected) in cases {
            assert_eq!(add_ordinal(num), expected, "addOrdinal({})", num);
        }
    }

    #[test]
    fn test_concat_rules() {
        let list = Value::from(vec![Value::from(1)]);
        assert_eq!(concat(&Value::Null, &Value::Null).unwrap(), Value::Null);
        assert_eq!(concat(&Value::Null, &list).unwrap(), list);
        assert_eq!(
            concat(&list, &list).unwrap(),
            Value::from(vec![Value::from(1), Value::from(1)])
        );
        assert_eq!(
            concat(&Value::from("a"), &Value::Null).unwrap(),
            Value::from("a")
        );
    }

    #[test]
    fn test_split() {
        assert_eq!(
            split(&[Value::from("a,b"), Value::from(",")]).unwrap(),
            Value::from(vec![Value::from("a"), Value::from("b")])
        );
        assert_eq!(
            split(&[Value::from("ab")]).unwrap(),
            Value::from(vec![Value::from("a"), Value::from("b")])
        );
    }
}
