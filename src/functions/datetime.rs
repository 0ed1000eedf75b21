//! Date/time helpers. Timestamps are RFC 3339 strings (or plain `YYYY-MM-DD`
//! dates); format arguments use chrono's strftime syntax.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::ast::{Expression, ReturnType};
use crate::eval::{EvalError, EvalResult, Value};
use crate::functions::validators::*;
use crate::functions::{apply, apply_with_call, FunctionTable};

pub const DEFAULT_DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const SHORT_DATE_FORMAT: &str = "%-m/%d/%Y";

pub(crate) fn register(table: &mut FunctionTable) {
    table.add(
        "utcNow",
        ReturnType::STRING,
        |call| validate_order(call, &[ReturnType::STRING], &[]),
        apply(
            |args| Ok(Value::String(format_timestamp(Utc::now(), args.first())?)),
            Some(verify_string),
        ),
    );
    table.add(
        "date",
        ReturnType::STRING,
        validate_unary_string,
        apply_with_call(
            |call, args| {
                let timestamp = parse_timestamp(call, &args[0])?;
                Ok(Value::String(timestamp.format(SHORT_DATE_FORMAT).to_string()))
            },
            Some(verify_string),
        ),
    );
    table.add(
        "formatDateTime",
        ReturnType::STRING,
        |call| validate_order(call, &[ReturnType::STRING], &[ReturnType::STRING]),
        apply_with_call(
            |call, args| {
                let timestamp = parse_timestamp(call, &args[0])?;
                Ok(Value::String(format_timestamp(timestamp, args.get(1))?))
            },
            Some(verify_string),
        ),
    );
    table.add(
        "addDays",
        ReturnType::STRING,
        |call| {
            validate_order(
                call,
                &[ReturnType::STRING],
                &[ReturnType::STRING, ReturnType::NUMBER],
            )
        },
        apply_with_call(add_days, None),
    );
}

pub fn parse_timestamp(call: &Expression, value: &Value) -> EvalResult<DateTime<Utc>> {
    let text = value.as_str().unwrap_or_default();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            EvalError::evaluation(format!(
                "{} is not a valid ISO 8601 timestamp in {}.",
                text, call
            ))
        })
}

fn format_timestamp(timestamp: DateTime<Utc>, format: Option<&Value>) -> EvalResult<String> {
    use std::fmt::Write;

    let format = format
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_DATE_TIME_FORMAT);
    let mut out = String::new();
    write!(out, "{}", timestamp.format(format))
        .map_err(|_| EvalError::evaluation(format!("'{}' is not a valid date format.", format)))?;
    Ok(out)
}

fn add_days(call: &Expression, args: &[Value]) -> EvalResult<Value> {
    let timestamp = parse_timestamp(call, &args[0])?;
    let days = args[1].as_i64().ok_or_else(|| {
        EvalError::arity_or_type(format!("{} is not an integer.", call.children()[1]))
    })?;
    let shifted = Duration::try_days(days)
        .and_then(|delta| timestamp.checked_add_signed(delta))
        .ok_or_else(|| EvalError::out_of_range(format!("{} moves the date out of range.", call)))?;
    Ok(Value::String(format_timestamp(shifted, args.get(2))?))
}
