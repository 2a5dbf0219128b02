//! The `input(prompt?, expected_type?, raise?)` builtin.
//!
//! Values come from the `MF_INPUTS` environment variable (pipe-separated)
//! when present, otherwise from stdin. With an expected type the raw string
//! is cast; on cast failure the default is to report and re-prompt, while
//! `raise = true` propagates a `TypeError` instead.

use std::{borrow::Cow, collections::VecDeque, io::BufRead};

use crate::{
    exceptions::{ExcType, RaisedException, RunResult},
    interp::{ExecContext, Interpreter},
    value::{CallValues, Value},
};

fn cast_input(raw: &str, expected: &str) -> RunResult<Value> {
    match expected.trim().to_ascii_lowercase().as_str() {
        "" | "any" | "str" | "string" => Ok(Value::str(raw.to_string())),
        "int" | "integer" => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ExcType::type_error(format!("Cannot cast '{raw}' to int"))),
        "float" | "double" => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ExcType::type_error(format!("Cannot cast '{raw}' to float"))),
        "number" => {
            if let Ok(v) = raw.trim().parse::<i64>() {
                return Ok(Value::Int(v));
            }
            raw.trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| ExcType::type_error(format!("Cannot cast '{raw}' to number")))
        }
        "bool" | "boolean" => match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "y" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "n" => Ok(Value::Bool(false)),
            _ => Err(ExcType::type_error(format!("Cannot cast '{raw}' to bool"))),
        },
        // Class names cannot be conjured from a string; hand the raw value
        // back and let downstream checks produce the diagnostic.
        _ => Ok(Value::str(raw.to_string())),
    }
}

fn cast_with_unions(raw: &str, expected: &str) -> RunResult<Value> {
    if !expected.contains('|') {
        return cast_input(raw, expected);
    }
    let mut last_err = None;
    for part in expected.split('|') {
        match cast_input(raw, part) {
            Ok(value) => return Ok(value),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err
        .unwrap_or_else(|| ExcType::type_error(format!("Cannot cast input '{raw}' to any of {expected}"))))
}

fn next_raw_input(interp: &Interpreter, prompt: Option<&str>) -> RunResult<String> {
    // Lazily split MF_INPUTS the first time input() runs.
    {
        let mut buffer = interp.input_buffer.borrow_mut();
        if buffer.is_none() {
            let queued: VecDeque<String> = std::env::var("MF_INPUTS")
                .map(|raw| raw.split('|').filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or_default();
            *buffer = Some(queued);
        }
        if let Some(queued) = buffer.as_mut() {
            if let Some(value) = queued.pop_front() {
                return Ok(value);
            }
        }
    }

    // Interactive fallback: show the prompt once, then block on stdin.
    if let Some(prompt) = prompt {
        let _ = interp.printer.borrow_mut().stdout_write(Cow::Borrowed(prompt));
        let _ = interp.printer.borrow_mut().stdout_push('\n');
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line).map_err(|err| {
        RaisedException::new(ExcType::RuntimeError, "input() failed: stdin is closed").with_cause(err.to_string())
    })?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
}

pub(crate) fn builtin_input(interp: &Interpreter, _ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    let prompt = match args.positional.first() {
        Some(Value::Str(s)) => Some(s.to_string()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };
    let expected = args
        .positional
        .get(1)
        .cloned()
        .or_else(|| {
            args.named
                .iter()
                .find(|(name, _)| &**name == "expected_type")
                .map(|(_, value)| value.clone())
        })
        .and_then(|value| match value {
            Value::Str(s) => Some(s.to_string()),
            Value::Null => None,
            Value::Type(t) => Some(t.to_string()),
            other => Some(other.to_string()),
        });
    let raise_on_error = args
        .named
        .iter()
        .find(|(name, _)| &**name == "raise" || &**name == "raise_traceback")
        .is_some_and(|(_, value)| value.is_truthy());

    loop {
        let raw = next_raw_input(interp, prompt.as_deref())?;

        let Some(expected) = &expected else {
            return Ok(Value::str(raw));
        };

        match cast_with_unions(&raw, expected) {
            Ok(value) => return Ok(value),
            Err(err) => {
                if raise_on_error {
                    return Err(err);
                }
                // Report briefly and ask again (next buffered value, or
                // stdin once the buffer drains).
                let message = format!("Invalid input: {err}");
                let _ = interp.printer.borrow_mut().stdout_write(Cow::Owned(message));
                let _ = interp.printer.borrow_mut().stdout_push('\n');
            }
        }
    }
}
