//! Executors for function declarations, calls, lambdas and `await`.

use std::rc::Rc;

use crate::{
    ast::{CallArg, Node, NodeTag, NodeVariant},
    exceptions::{ExcType, ExecResult, Flow, RunError, RunResult},
    exec::oop,
    interp::{ExecContext, Interpreter},
    value::{AwaitableCallee, AwaitableObject, CallValues, FunctionObject, Value},
};

pub(crate) fn register(interp: &Interpreter) {
    interp.register_default(NodeTag::Function, exec_function_declaration);
    interp.register_default(NodeTag::Lambda, exec_lambda);
    interp.register_default(NodeTag::FunctionCall, exec_function_call);
    interp.register_default(NodeTag::Await, exec_await);
}

fn exec_function_declaration(_interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Function(def) = &node.variant else {
        return Err(RunError::internal("Function executor on wrong node"));
    };
    let Some(name) = def.name.clone() else {
        return Err(ExcType::syntax_error("Function declaration missing name"));
    };
    let func = Value::Function(Rc::new(FunctionObject {
        def: def.clone(),
        closure: ctx.env.clone(),
    }));
    ctx.env.define(name, func, None);
    Ok(Flow::Normal(Value::Null))
}

fn exec_lambda(_interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Lambda(def) = &node.variant else {
        return Err(RunError::internal("Lambda executor on wrong node"));
    };
    Ok(Flow::Normal(Value::Function(Rc::new(FunctionObject {
        def: def.clone(),
        closure: ctx.env.clone(),
    }))))
}

/// Evaluates call-site arguments left to right into positional/named buckets.
pub(crate) fn eval_call_arguments(
    interp: &Interpreter,
    args: &[CallArg],
    ctx: &ExecContext,
) -> RunResult<CallValues> {
    let mut values = CallValues::default();
    for arg in args {
        let value = interp.eval(&arg.value, ctx)?;
        match &arg.name {
            Some(name) => {
                if values.named.iter().any(|(existing, _)| existing == name) {
                    return Err(ExcType::type_error(format!(
                        "Argument '{name}' specified multiple times"
                    )));
                }
                values.named.push((name.clone(), value));
            }
            None => values.positional.push(value),
        }
    }
    Ok(values)
}

/// Validates the async call rule and defers async callees into awaitables.
///
/// Returns the awaitable value when the callee is async (and legally
/// called); synchronous callees get their arguments handed back.
fn defer_if_async(callee: &Value, args: CallValues, ctx: &ExecContext) -> RunResult<Result<Value, CallValues>> {
    let (is_async, name, callee_kind) = match callee {
        Value::Function(func) => (func.is_async(), func.def.display_name().to_string(), "function"),
        Value::BoundMethod(bound) => (bound.method.def.is_async, bound.method.def.display_name().to_string(), "method"),
        _ => return Ok(Err(args)),
    };
    if !is_async {
        return Ok(Err(args));
    }
    if !ctx.is_async && !ctx.awaiting.get() {
        return Err(ExcType::type_error(format!(
            "Cannot call async {callee_kind} '{name}' from non-async context; use 'await' or mark caller async"
        )));
    }
    let awaitable_callee = match callee {
        Value::Function(func) => AwaitableCallee::Function(func.clone()),
        Value::BoundMethod(bound) => AwaitableCallee::Method(bound.clone()),
        _ => unreachable!("filtered above"),
    };
    Ok(Ok(Value::Awaitable(Rc::new(AwaitableObject::new(
        awaitable_callee,
        args,
    )))))
}

fn exec_function_call(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::FunctionCall { callee, args } = &node.variant else {
        return Err(RunError::internal("FunctionCall executor on wrong node"));
    };

    // `obj.name()` prefers the method even when a field shares the name.
    let callee_value = match &callee.variant {
        NodeVariant::PropertyAccess { object, property } => {
            let target = interp.eval(object, ctx)?;
            oop::resolve_property(interp, &target, property, ctx, true)?
        }
        _ => interp.eval(callee, ctx)?,
    };

    let arg_values = eval_call_arguments(interp, args, ctx)?;
    let arg_values = match defer_if_async(&callee_value, arg_values, ctx)? {
        Ok(awaitable) => return Ok(Flow::Normal(awaitable)),
        Err(args) => args,
    };

    let result = interp.call_value(&callee_value, arg_values, ctx, node.loc)?;
    Ok(Flow::Normal(result))
}

fn exec_await(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Await { expr } = &node.variant else {
        return Err(RunError::internal("Await executor on wrong node"));
    };

    // Inner calls are told they are being awaited so async callees are legal
    // even when the current context is synchronous.
    let prev = ctx.awaiting.replace(true);
    let result = interp.eval(expr, ctx);
    ctx.awaiting.set(prev);
    let value = result?;

    // Awaiting a non-awaitable returns the value unchanged.
    match value {
        Value::Awaitable(awaitable) => Ok(Flow::Normal(interp.drive_awaitable(&awaitable, ctx)?)),
        other => Ok(Flow::Normal(other)),
    }
}
