//! Builtin functions visible to user programs.
//!
//! `print` and `input` carry enough behaviour to live in their own files; the
//! rest are small enough to define here. All builtins share the uniform
//! `(&Interpreter, &ExecContext, CallValues)` signature so the call protocol
//! treats them like any other callable.

mod input;
mod native;
mod print;

use std::rc::Rc;

use crate::{
    exceptions::{ExcType, RunResult},
    interp::{ExecContext, Interpreter},
    types,
    value::{BuiltinFn, BuiltinFunction, CallValues, ClassObject, MapKey, OrderedMap, Value},
};

pub(crate) use native::register_native_defaults;

fn builtin(name: &'static str, func: BuiltinFn) -> Value {
    Value::Builtin(Rc::new(BuiltinFunction { name, func }))
}

/// Populates the global environment with the builtin names.
pub(crate) fn setup_builtins(interp: &Interpreter) {
    let globals = &interp.globals;
    let define = |name: &'static str, func: BuiltinFn| {
        globals.define(Rc::from(name), builtin(name, func), None);
    };
    define("print", print::builtin_print);
    define("sout", print::builtin_print);
    define("type", builtin_type);
    define("typeOf", builtin_type_of);
    define("len", builtin_len);
    define("range", builtin_range);
    define("waitSeconds", builtin_wait_seconds);
    define("str", builtin_str);
    define("input", input::builtin_input);
    define("__native__", native::builtin_native);
    define("genericOf", builtin_generic_of);
}

/// Constructor value backing the `Dict`/`Map` generic identifiers.
pub(crate) fn map_constructor() -> Value {
    builtin("Dict", |_interp, _ctx, _args| Ok(Value::map(OrderedMap::default())))
}

/// Constructor value backing the `List` generic identifier.
pub(crate) fn list_constructor() -> Value {
    builtin("List", |_interp, _ctx, _args| Ok(Value::list(Vec::new())))
}

fn first_arg(args: &CallValues) -> Value {
    args.positional.first().cloned().unwrap_or(Value::Null)
}

fn builtin_type(_interp: &Interpreter, _ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    Ok(Value::str(first_arg(&args).type_name().to_string()))
}

fn builtin_type_of(_interp: &Interpreter, _ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    Ok(Value::Type(Rc::new(types::type_of_value(&first_arg(&args)))))
}

fn builtin_len(interp: &Interpreter, ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    let target = first_arg(&args);
    let length = match &target {
        Value::Str(s) => Some(s.chars().count() as i64),
        Value::List(items) => Some(items.borrow().len() as i64),
        Value::Map(entries) => Some(entries.borrow().len() as i64),
        Value::Module(module) => Some(module.vars.borrow().len() as i64),
        Value::Instance(instance) => {
            // Container-like instances report length through a size() method.
            if let Some((method, class)) = ClassObject::find_method(&instance.class, "size") {
                let bound = crate::value::BoundMethod {
                    instance: Some(instance.clone()),
                    method,
                    class,
                };
                match interp.call_method(&bound, CallValues::default(), ctx)? {
                    Value::Int(n) => Some(n),
                    _ => None,
                }
            } else {
                None
            }
        }
        _ => None,
    };
    match length {
        Some(n) => Ok(Value::Int(n)),
        None => Err(ExcType::type_error(format!(
            "Object of type {} has no len()",
            target.type_name()
        ))),
    }
}

fn builtin_range(_interp: &Interpreter, _ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    let int_arg = |index: usize| -> RunResult<i64> {
        match args.positional.get(index) {
            Some(Value::Int(v)) => Ok(*v),
            Some(other) => Err(ExcType::type_error(format!(
                "range() expects integer arguments, got {}",
                other.type_name()
            ))),
            None => Err(ExcType::type_error("range() expects at least one argument")),
        }
    };

    let (start, stop, step) = match args.positional.len() {
        1 => (0, int_arg(0)?, 1),
        2 => (int_arg(0)?, int_arg(1)?, 1),
        3 => (int_arg(0)?, int_arg(1)?, int_arg(2)?),
        n => {
            return Err(ExcType::type_error(format!(
                "range() takes 1 to 3 arguments, got {n}"
            )));
        }
    };
    if step == 0 {
        return Err(ExcType::type_error("range() step must not be zero"));
    }

    let mut values = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        values.push(Value::Int(current));
        current += step;
    }
    Ok(Value::list(values))
}

fn builtin_wait_seconds(_interp: &Interpreter, _ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    let seconds = match first_arg(&args) {
        Value::Int(v) => v.max(0) as f64,
        Value::Float(v) => v.max(0.0),
        other => {
            return Err(ExcType::type_error(format!(
                "waitSeconds() expects a number, got {}",
                other.type_name()
            )));
        }
    };
    std::thread::sleep(std::time::Duration::from_secs_f64(seconds));
    Ok(Value::Null)
}

fn builtin_str(interp: &Interpreter, ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    match first_arg(&args) {
        Value::Null => Ok(Value::str("")),
        other => Ok(Value::str(interp.display_value(&other, ctx)?)),
    }
}

/// Returns the generic type arguments of an instance as a map of parameter
/// name to reified type.
fn builtin_generic_of(_interp: &Interpreter, ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    let Value::Instance(instance) = first_arg(&args) else {
        return Ok(Value::map(OrderedMap::default()));
    };
    let mut result = OrderedMap::default();
    let params = &instance.class.def.generic_params;
    for (param, type_arg) in params.iter().zip(instance.generics.borrow().iter()) {
        let reified = types::type_from_expr(type_arg, &ctx.env);
        result.insert(MapKey::Str(param.clone()), Value::Type(Rc::new(reified)));
    }
    Ok(Value::map(result))
}
