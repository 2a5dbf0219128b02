//! The `__native__(path, …)` host escape hatch.
//!
//! Host callables register by dotted path on the interpreter; sandboxed
//! embeddings keep the registry disabled, which turns every call into a
//! `SecurityError`. A small default set of pure helpers is available for
//! embedders that opt in.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    exceptions::{ExcType, RunResult},
    interp::{ExecContext, Interpreter},
    value::{CallValues, Value},
};

pub(crate) fn builtin_native(interp: &Interpreter, _ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    if !interp.native_enabled.get() {
        return Err(ExcType::security_error(
            "__native__ is disabled in this embedding",
        ));
    }

    let Some(Value::Str(path)) = args.positional.first() else {
        return Err(ExcType::type_error("__native__ expects a dotted path string"));
    };

    let Some(func) = interp.native_registry.borrow().get(&**path).copied() else {
        return Err(ExcType::reference_error(format!(
            "__native__: Function '{path}' not found in the host registry"
        )));
    };

    func(&args.positional[1..])
}

fn numeric(value: &Value, name: &str) -> RunResult<f64> {
    match value {
        Value::Int(v) => Ok(*v as f64),
        Value::Float(v) => Ok(*v),
        other => Err(ExcType::type_error(format!(
            "{name} expects a number, got {}",
            other.type_name()
        ))),
    }
}

fn native_sqrt(args: &[Value]) -> RunResult<Value> {
    let v = numeric(args.first().unwrap_or(&Value::Null), "math.sqrt")?;
    Ok(Value::Float(v.sqrt()))
}

fn native_floor(args: &[Value]) -> RunResult<Value> {
    let v = numeric(args.first().unwrap_or(&Value::Null), "math.floor")?;
    Ok(Value::Int(v.floor() as i64))
}

fn native_ceil(args: &[Value]) -> RunResult<Value> {
    let v = numeric(args.first().unwrap_or(&Value::Null), "math.ceil")?;
    Ok(Value::Int(v.ceil() as i64))
}

fn native_abs(args: &[Value]) -> RunResult<Value> {
    match args.first() {
        Some(Value::Int(v)) => Ok(Value::Int(v.abs())),
        Some(Value::Float(v)) => Ok(Value::Float(v.abs())),
        other => Err(ExcType::type_error(format!(
            "math.abs expects a number, got {}",
            other.map_or("null", Value::type_name)
        ))),
    }
}

fn native_time(_args: &[Value]) -> RunResult<Value> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| ExcType::runtime_error("host clock is before the epoch"))?;
    Ok(Value::Float(now.as_secs_f64()))
}

/// Installs the default pure helpers and enables `__native__`.
pub(crate) fn register_native_defaults(interp: &Interpreter) {
    interp.register_native("math.sqrt", native_sqrt);
    interp.register_native("math.floor", native_floor);
    interp.register_native("math.ceil", native_ceil);
    interp.register_native("math.abs", native_abs);
    interp.register_native("time.time", native_time);
}
