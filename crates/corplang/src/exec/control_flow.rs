//! Executors for conditionals, loops, `throw`/`try`/`catch`/`finally`,
//! `with`, and the `break`/`continue` signals.
//!
//! Loops are the only constructs that intercept `Flow::Break`/`Flow::Continue`;
//! `try` intercepts nothing but re-orders outcomes around its finally block,
//! whose own `return` overrides any pending result.

use std::rc::Rc;

use crate::{
    ast::{CatchClause, Node, NodeTag, NodeVariant},
    diagnostics::StackFrame,
    exceptions::{ExcType, ExecResult, Flow, RaisedException, RunError, RunResult},
    interp::{ExecContext, Interpreter},
    types,
    value::{BoundMethod, CallValues, ClassObject, InstanceObject, MapKey, OrderedMap, Value},
};

pub(crate) fn register(interp: &Interpreter) {
    interp.register_default(NodeTag::If, exec_if);
    interp.register_default(NodeTag::While, exec_while);
    interp.register_default(NodeTag::For, exec_for);
    interp.register_default(NodeTag::ForIn, exec_for_in);
    interp.register_default(NodeTag::ForOf, exec_for_of);
    interp.register_default(NodeTag::Loop, exec_loop);
    interp.register_default(NodeTag::Throw, exec_throw);
    interp.register_default(NodeTag::Try, exec_try);
    interp.register_default(NodeTag::With, exec_with);
    interp.register_default(NodeTag::Break, exec_break);
    interp.register_default(NodeTag::Continue, exec_continue);
}

fn exec_if(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::If {
        condition,
        then_branch,
        else_branch,
    } = &node.variant
    else {
        return Err(RunError::internal("If executor on wrong node"));
    };
    if interp.eval(condition, ctx)?.is_truthy() {
        interp.execute_block(then_branch, ctx)
    } else if let Some(else_branch) = else_branch {
        interp.execute_block(else_branch, ctx)
    } else {
        Ok(Flow::Normal(Value::Null))
    }
}

fn exec_while(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::While { condition, body } = &node.variant else {
        return Err(RunError::internal("While executor on wrong node"));
    };
    let mut result = Value::Null;
    while interp.eval(condition, ctx)?.is_truthy() {
        match interp.execute_block(body, ctx)? {
            Flow::Normal(value) => result = value,
            Flow::Break => break,
            Flow::Continue => {}
            flow @ Flow::Return(_) => return Ok(flow),
        }
    }
    Ok(Flow::Normal(result))
}

fn exec_for(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::For {
        init,
        condition,
        update,
        body,
    } = &node.variant
    else {
        return Err(RunError::internal("For executor on wrong node"));
    };

    if let Some(init) = init {
        interp.execute(init, ctx)?;
    }
    let mut result = Value::Null;
    loop {
        if let Some(condition) = condition {
            if !interp.eval(condition, ctx)?.is_truthy() {
                break;
            }
        }
        match interp.execute_block(body, ctx)? {
            Flow::Normal(value) => result = value,
            Flow::Break => break,
            // `continue` still runs the update expression.
            Flow::Continue => {}
            flow @ Flow::Return(_) => return Ok(flow),
        }
        if let Some(update) = update {
            interp.execute(update, ctx)?;
        }
    }
    Ok(Flow::Normal(result))
}

/// What a `for-in`/`for-of` loop walks over.
enum IterationSource {
    Values(Vec<Value>),
    Protocol(Rc<InstanceObject>),
}

fn iteration_source(
    interp: &Interpreter,
    iterable: Value,
    ctx: &ExecContext,
    want_values: bool,
) -> RunResult<IterationSource> {
    match iterable {
        Value::List(items) => Ok(IterationSource::Values(items.borrow().clone())),
        Value::Map(entries) => {
            let collected = if want_values {
                entries.borrow().values().cloned().collect()
            } else {
                entries
                    .borrow()
                    .keys()
                    .map(|key| match key {
                        MapKey::Str(s) => Value::Str(s.clone()),
                        MapKey::Int(i) => Value::Int(*i),
                    })
                    .collect()
            };
            Ok(IterationSource::Values(collected))
        }
        Value::Str(s) => Ok(IterationSource::Values(
            s.chars().map(|ch| Value::str(ch.to_string())).collect(),
        )),
        Value::Instance(instance) => {
            // Instances opt into iteration by providing __iter__; the
            // returned iterator answers hasNext()/next().
            if let Some((method, class)) = ClassObject::find_method(&instance.class, "__iter__") {
                let bound = BoundMethod {
                    instance: Some(instance.clone()),
                    method,
                    class,
                };
                match interp.call_method(&bound, CallValues::default(), ctx)? {
                    Value::Instance(iterator) => return Ok(IterationSource::Protocol(iterator)),
                    other => {
                        return Err(ExcType::type_error(format!(
                            "__iter__ must return an iterator instance, got {}",
                            other.type_name()
                        )));
                    }
                }
            }
            // Escape hatch for wrapper classes around native containers.
            if let Some((method, class)) = ClassObject::find_method(&instance.class, "__raw__") {
                let bound = BoundMethod {
                    instance: Some(instance.clone()),
                    method,
                    class,
                };
                let raw = interp.call_method(&bound, CallValues::default(), ctx)?;
                return iteration_source(interp, raw, ctx, want_values);
            }
            Err(ExcType::type_error(format!(
                "Object of type {} is not iterable (missing __iter__ or __raw__)",
                instance.class_name()
            )))
        }
        other => Err(ExcType::type_error(format!(
            "Object of type {} is not iterable",
            other.type_name()
        ))),
    }
}

fn call_iterator_method(
    interp: &Interpreter,
    iterator: &Rc<InstanceObject>,
    name: &str,
    ctx: &ExecContext,
) -> RunResult<Value> {
    let Some((method, class)) = ClassObject::find_method(&iterator.class, name) else {
        return Err(ExcType::type_error(format!("Iterator missing {name}() method")));
    };
    let bound = BoundMethod {
        instance: Some(iterator.clone()),
        method,
        class,
    };
    interp.call_method(&bound, CallValues::default(), ctx)
}

fn run_iteration(
    interp: &Interpreter,
    variable: &Rc<str>,
    source: IterationSource,
    body: &[Node],
    ctx: &ExecContext,
) -> ExecResult {
    let mut result = Value::Null;
    match source {
        IterationSource::Values(values) => {
            for item in values {
                let child = ctx.child();
                child.env.define(variable.clone(), item, None);
                match interp.execute_block(body, &child)? {
                    Flow::Normal(value) => result = value,
                    Flow::Break => break,
                    Flow::Continue => {}
                    flow @ Flow::Return(_) => return Ok(flow),
                }
            }
        }
        IterationSource::Protocol(iterator) => {
            while call_iterator_method(interp, &iterator, "hasNext", ctx)?.is_truthy() {
                let item = call_iterator_method(interp, &iterator, "next", ctx)?;
                let child = ctx.child();
                child.env.define(variable.clone(), item, None);
                match interp.execute_block(body, &child)? {
                    Flow::Normal(value) => result = value,
                    Flow::Break => break,
                    Flow::Continue => {}
                    flow @ Flow::Return(_) => return Ok(flow),
                }
            }
        }
    }
    Ok(Flow::Normal(result))
}

fn exec_for_in(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::ForIn {
        variable,
        iterable,
        body,
    } = &node.variant
    else {
        return Err(RunError::internal("ForIn executor on wrong node"));
    };
    let iterable = interp.eval(iterable, ctx)?;
    let source = iteration_source(interp, iterable, ctx, false)?;
    run_iteration(interp, variable, source, body, ctx)
}

fn exec_for_of(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::ForOf {
        variable,
        iterable,
        body,
    } = &node.variant
    else {
        return Err(RunError::internal("ForOf executor on wrong node"));
    };
    let iterable = interp.eval(iterable, ctx)?;
    let source = iteration_source(interp, iterable, ctx, true)?;
    run_iteration(interp, variable, source, body, ctx)
}

fn exec_loop(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Loop { body, uses_adapter } = &node.variant else {
        return Err(RunError::internal("Loop executor on wrong node"));
    };
    if *uses_adapter {
        // The `loop stdin using Agent` form needs the interaction runtime.
        return Err(ExcType::runtime_error(
            "The interaction loop requires the agent runtime, which is not part of the core interpreter",
        ));
    }
    let mut result = Value::Null;
    loop {
        match interp.execute_block(body, ctx)? {
            Flow::Normal(value) => result = value,
            Flow::Break => break,
            Flow::Continue => {}
            flow @ Flow::Return(_) => return Ok(flow),
        }
    }
    Ok(Flow::Normal(result))
}

fn exec_break(_interp: &Interpreter, _node: &Node, _ctx: &ExecContext) -> ExecResult {
    Ok(Flow::Break)
}

fn exec_continue(_interp: &Interpreter, _node: &Node, _ctx: &ExecContext) -> ExecResult {
    Ok(Flow::Continue)
}

/// Converts the interpreter's frame snapshot to a language-level list value
/// for the `stacktrace` field on thrown exception instances.
fn stack_to_value(frames: &[StackFrame]) -> Value {
    let rendered: Vec<Value> = frames
        .iter()
        .map(|frame| {
            let mut map = OrderedMap::default();
            map.insert(MapKey::Str(Rc::from("file")), Value::str(frame.file.clone()));
            map.insert(MapKey::Str(Rc::from("line")), Value::Int(i64::from(frame.line)));
            map.insert(MapKey::Str(Rc::from("column")), Value::Int(i64::from(frame.column)));
            map.insert(
                MapKey::Str(Rc::from("function")),
                Value::str(frame.function.clone()),
            );
            Value::map(map)
        })
        .collect();
    Value::list(rendered)
}

fn exec_throw(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Throw { expr } = &node.variant else {
        return Err(RunError::internal("Throw executor on wrong node"));
    };
    let thrown = interp.eval(expr, ctx)?;
    let stack = interp.snapshot_stack();

    let mut raised = match &thrown {
        Value::Instance(instance) => {
            // The catch clause sees the same value the program threw,
            // augmented with a language-level stack snapshot.
            if !instance.fields.borrow().contains_key("stacktrace") {
                instance
                    .fields
                    .borrow_mut()
                    .insert(Rc::from("stacktrace"), stack_to_value(&stack));
            }
            let message_field = instance.fields.borrow().get("message").cloned();
            let message = match message_field {
                Some(Value::Str(s)) => s.to_string(),
                _ => interp.display_value(&thrown, ctx)?,
            };
            // A class chain named after a builtin kind adopts that kind.
            let mut exc_type = ExcType::Exception;
            let mut current = Some(instance.class.clone());
            while let Some(cls) = current {
                if let Some(kind) = ExcType::from_class_name(&cls.name) {
                    exc_type = kind;
                    break;
                }
                current = cls.parent.borrow().clone();
            }
            let mut raised = RaisedException::new(exc_type, message).with_value(thrown.clone());
            raised.custom_class_name = Some(instance.class_name().to_string());
            raised
        }
        Value::Str(message) => {
            RaisedException::new(ExcType::Exception, message.to_string()).with_value(thrown.clone())
        }
        other => {
            let message = interp.display_value(other, ctx)?;
            RaisedException::new(ExcType::Exception, message).with_value(thrown.clone())
        }
    };
    raised.stack = stack;
    Err(raised.into())
}

/// Builds the value bound by `catch (e: T)` for errors the runtime raised
/// itself (no thrown language value to hand back).
fn builtin_exception_value(raised: &RaisedException) -> Value {
    let mut map = OrderedMap::default();
    map.insert(MapKey::Str(Rc::from("type")), Value::str(raised.exc_type.to_string()));
    map.insert(MapKey::Str(Rc::from("message")), Value::str(raised.message.clone()));
    map.insert(MapKey::Str(Rc::from("stacktrace")), stack_to_value(&raised.stack));
    Value::map(map)
}

fn run_catches(
    interp: &Interpreter,
    catches: &[CatchClause],
    raised: Box<RaisedException>,
    ctx: &ExecContext,
) -> ExecResult {
    for clause in catches {
        if !types::exception_matches(&raised, &clause.exception_type, &ctx.env) {
            continue;
        }
        let child = ctx.child();
        if let Some(variable) = &clause.variable {
            let bound = raised
                .value
                .clone()
                .unwrap_or_else(|| builtin_exception_value(&raised));
            child.env.define(variable.clone(), bound, None);
        }
        return interp.execute_block(&clause.body, &child);
    }
    Err(RunError::Exc(raised))
}

fn exec_try(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Try { body, catches, finally } = &node.variant else {
        return Err(RunError::internal("Try executor on wrong node"));
    };

    let outcome = match interp.execute_block(body, ctx) {
        Err(RunError::Exc(raised)) => run_catches(interp, catches, raised, ctx),
        other => other,
    };

    // `finally` always runs. Its `return` overrides any pending return or
    // exception; an exception it raises replaces the pending outcome.
    if let Some(finally_block) = finally {
        match interp.execute_block(finally_block, ctx)? {
            Flow::Normal(_) => {}
            overriding => return Ok(overriding),
        }
    }

    outcome
}

/// Calls `__enter__` (or `enter`) on a context manager; non-instances and
/// instances without an enter hook yield the manager itself.
fn enter_manager(interp: &Interpreter, manager: &Value, ctx: &ExecContext) -> RunResult<Value> {
    if let Value::Instance(instance) = manager {
        for name in ["__enter__", "enter"] {
            if let Some((method, class)) = ClassObject::find_method(&instance.class, name) {
                let bound = BoundMethod {
                    instance: Some(instance.clone()),
                    method,
                    class,
                };
                let entered = interp.call_method(&bound, CallValues::default(), ctx)?;
                // An async enter hook resolves synchronously inside the
                // statement when the surrounding context is async.
                if let Value::Awaitable(awaitable) = &entered {
                    if ctx.is_async {
                        return interp.drive_awaitable(&awaitable.clone(), ctx);
                    }
                }
                return Ok(entered);
            }
        }
    }
    Ok(manager.clone())
}

/// Calls `__exit__` (or `exit`) with `(type, value, null)`. Returns the exit
/// hook's truthiness; errors inside the hook are swallowed best-effort.
fn exit_manager(interp: &Interpreter, manager: &Value, exc: Option<&RaisedException>, ctx: &ExecContext) -> bool {
    let Value::Instance(instance) = manager else {
        return false;
    };
    for name in ["__exit__", "exit"] {
        if let Some((method, class)) = ClassObject::find_method(&instance.class, name) {
            let bound = BoundMethod {
                instance: Some(instance.clone()),
                method,
                class,
            };
            let (exc_type, exc_value) = match exc {
                Some(raised) => {
                    let type_name = raised
                        .custom_class_name
                        .clone()
                        .unwrap_or_else(|| raised.exc_type.to_string());
                    let value = raised
                        .value
                        .clone()
                        .unwrap_or_else(|| Value::str(raised.message.clone()));
                    (Value::str(type_name), value)
                }
                None => (Value::Null, Value::Null),
            };
            let args = CallValues::positional_only([exc_type, exc_value, Value::Null]);
            return match interp.call_method(&bound, args, ctx) {
                Ok(result) => {
                    let result = if let Value::Awaitable(awaitable) = &result {
                        if ctx.is_async {
                            interp.drive_awaitable(&awaitable.clone(), ctx).unwrap_or(Value::Null)
                        } else {
                            Value::Null
                        }
                    } else {
                        result
                    };
                    result.is_truthy()
                }
                Err(_) => false,
            };
        }
    }
    false
}

fn exec_with(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::With { items, body } = &node.variant else {
        return Err(RunError::internal("With executor on wrong node"));
    };

    // Managers evaluate left to right before any is entered.
    let mut managers = Vec::with_capacity(items.len());
    for item in items {
        managers.push(interp.eval(&item.expr, ctx)?);
    }

    let child = ctx.child();
    let mut entered: Vec<&Value> = Vec::with_capacity(managers.len());
    for (item, manager) in items.iter().zip(&managers) {
        match enter_manager(interp, manager, &child) {
            Ok(entered_value) => {
                entered.push(manager);
                if let Some(target) = &item.target {
                    child.env.define(target.clone(), entered_value, None);
                }
            }
            Err(err) => {
                // Managers already entered are exited in reverse before the
                // enter failure propagates.
                let raised = match &err {
                    RunError::Exc(raised) => Some((**raised).clone()),
                    RunError::Internal(_) => None,
                };
                for manager in entered.iter().rev() {
                    exit_manager(interp, manager, raised.as_ref(), &child);
                }
                return Err(err);
            }
        }
    }

    let outcome = interp.execute_block(body, &child);

    match outcome {
        Err(RunError::Exc(raised)) => {
            // Reverse-order exits; a truthy __exit__ suppresses the exception.
            let mut suppressed = false;
            for manager in entered.iter().rev() {
                if exit_manager(interp, manager, Some(&raised), &child) {
                    suppressed = true;
                }
            }
            if suppressed {
                Ok(Flow::Normal(Value::Null))
            } else {
                Err(RunError::Exc(raised))
            }
        }
        other => {
            for manager in entered.iter().rev() {
                exit_manager(interp, manager, None, &child);
            }
            other
        }
    }
}
