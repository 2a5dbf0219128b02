//! Executors for program structure, declarations-as-statements, imports,
//! assignment targets and `delete`.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{
    ast::{Node, NodeTag, NodeVariant},
    exceptions::{ExcType, ExecResult, Flow, RunError, RunResult},
    exec::functions,
    interp::{ExecContext, Interpreter},
    value::{ClassObject, EnumObject, EnumValueObject, MapKey, ModuleNamespace, Value},
};

pub(crate) fn register(interp: &Interpreter) {
    interp.register_default(NodeTag::Program, exec_program);
    interp.register_default(NodeTag::Var, exec_var_declaration);
    interp.register_default(NodeTag::Assignment, exec_assignment);
    interp.register_default(NodeTag::Return, exec_return);
    interp.register_default(NodeTag::Import, exec_import);
    interp.register_default(NodeTag::FromImport, exec_from_import);
    interp.register_default(NodeTag::Enum, exec_enum_declaration);
    interp.register_default(NodeTag::Delete, exec_delete);
    interp.register_default(NodeTag::ModelDecl, exec_compile_time_decl);
    interp.register_default(NodeTag::MigrationDecl, exec_compile_time_decl);
    interp.register_default(NodeTag::AgentDecl, exec_agent_decl);
    interp.register_default(NodeTag::Serve, exec_serve);
    interp.register_default(NodeTag::StopServer, exec_stop_server);
    interp.register_default(NodeTag::ServerAwait, exec_server_await);
}

fn exec_program(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Program { statements, .. } = &node.variant else {
        return Err(RunError::internal("Program executor on wrong node"));
    };
    interp.execute_block(statements, ctx)
}

fn exec_var_declaration(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Var {
        name,
        annotation,
        value,
    } = &node.variant
    else {
        return Err(RunError::internal("Var executor on wrong node"));
    };

    // `var x: T = input(...)` with no explicit expected type inherits the
    // variable's annotation so the builtin can cast appropriately.
    let evaluated = match (&value.variant, annotation) {
        (NodeVariant::FunctionCall { callee, args }, Some(annotation))
            if matches!(&callee.variant, NodeVariant::Identifier { name } if &**name == "input") =>
        {
            let mut call_values = functions::eval_call_arguments(interp, args, ctx)?;
            let has_expected = call_values.positional.len() >= 2
                || call_values.named.iter().any(|(name, _)| &**name == "expected_type");
            if !has_expected {
                call_values.positional.push(Value::str(annotation.to_string()));
            }
            let Some(input_fn) = ctx.env.get("input") else {
                return Err(ExcType::undefined_variable("input"));
            };
            interp.call_value(&input_fn, call_values, ctx, node.loc)?
        }
        _ => interp.eval(value, ctx)?,
    };

    if let Some(annotation) = annotation {
        interp.strict_type_check(name, &evaluated, annotation, ctx)?;
    }
    ctx.env.define(name.clone(), evaluated.clone(), annotation.clone());
    Ok(Flow::Normal(evaluated))
}

fn exec_assignment(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Assignment { target, value } = &node.variant else {
        return Err(RunError::internal("Assignment executor on wrong node"));
    };
    let evaluated = interp.eval(value, ctx)?;
    assign_to_target(interp, target, evaluated.clone(), ctx)?;
    Ok(Flow::Normal(evaluated))
}

pub(crate) fn assign_to_target(
    interp: &Interpreter,
    target: &Node,
    value: Value,
    ctx: &ExecContext,
) -> RunResult<()> {
    match &target.variant {
        NodeVariant::Identifier { name } => {
            if let Some(annotation) = ctx.env.declared_type(name) {
                interp.strict_type_check(name, &value, &annotation, ctx)?;
            }
            if ctx.env.set(name, value) {
                Ok(())
            } else {
                Err(ExcType::undefined_variable(name))
            }
        }
        NodeVariant::IndexAccess { object, index } => {
            let container = interp.eval(object, ctx)?;
            let idx = interp.eval(index, ctx)?;
            match container {
                Value::List(items) => {
                    let Value::Int(i) = idx else {
                        return Err(ExcType::type_error(format!(
                            "List index must be integer, got {}",
                            idx.type_name()
                        )));
                    };
                    let mut items = items.borrow_mut();
                    if i < 0 || i as usize >= items.len() {
                        return Err(ExcType::type_error(format!("Index {i} out of range")));
                    }
                    items[i as usize] = value;
                    Ok(())
                }
                Value::Map(entries) => {
                    let Some(key) = MapKey::from_value(&idx) else {
                        return Err(ExcType::type_error("Map keys must be strings or integers"));
                    };
                    entries.borrow_mut().insert(key, value);
                    Ok(())
                }
                Value::Instance(instance) => {
                    // Container-like instances route through a `set` method.
                    if let Some((method, class)) = ClassObject::find_method(&instance.class, "set") {
                        let bound = crate::value::BoundMethod {
                            instance: Some(instance.clone()),
                            method,
                            class,
                        };
                        let args = crate::value::CallValues::positional_only([idx, value]);
                        interp.call_method(&bound, args, ctx)?;
                        return Ok(());
                    }
                    Err(ExcType::type_error(format!(
                        "Cannot assign by index into instance of {}",
                        instance.class_name()
                    )))
                }
                other => Err(ExcType::type_error(format!(
                    "Cannot assign by index into {}",
                    other.type_name()
                ))),
            }
        }
        NodeVariant::PropertyAccess { object, property } => {
            let container = interp.eval(object, ctx)?;
            match container {
                Value::Instance(instance) => {
                    // Writes to declared private fields honour the same
                    // access rule as reads.
                    if let Some((decl, declaring)) = ClassObject::find_field_decl(&instance.class, property) {
                        if decl.is_private && !ctx.can_access_private_member(&declaring.name, Some(&instance)) {
                            return Err(ExcType::security_error(format!(
                                "Access to private member '{property}' of class '{}' is not allowed",
                                declaring.name
                            )));
                        }
                    }
                    instance.fields.borrow_mut().insert(property.clone(), value);
                    Ok(())
                }
                Value::Class(class) => {
                    class.static_values.borrow_mut().insert(property.clone(), value);
                    Ok(())
                }
                Value::Map(entries) => {
                    entries.borrow_mut().insert(MapKey::Str(property.clone()), value);
                    Ok(())
                }
                other => Err(ExcType::type_error(format!(
                    "Cannot assign property '{property}' on {}",
                    other.type_name()
                ))),
            }
        }
        _ => Err(ExcType::syntax_error("Invalid assignment target")),
    }
}

fn exec_return(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Return { value } = &node.variant else {
        return Err(RunError::internal("Return executor on wrong node"));
    };
    let result = match value {
        Some(expr) => interp.eval(expr, ctx)?,
        None => Value::Null,
    };
    Ok(Flow::Return(result))
}

/// `import a.b.c` binds the root name to a nested namespace chain.
fn exec_import(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Import { module } = &node.variant else {
        return Err(RunError::internal("Import executor on wrong node"));
    };
    let exports = interp.import_module(module, Some(&ctx.current_file))?;

    let parts: Vec<&str> = module.split('.').collect();
    let root_name: Rc<str> = Rc::from(parts[0]);

    if parts.len() == 1 {
        ctx.env
            .define(root_name, Value::Module(exports.clone()), None);
        return Ok(Flow::Normal(Value::Module(exports)));
    }

    // Reuse an existing root namespace so `import a.b` and `import a.c`
    // accumulate under one `a`.
    let root = match ctx.env.get(&root_name) {
        Some(Value::Module(existing)) => existing,
        _ => Rc::new(ModuleNamespace::empty(parts[0])),
    };
    let mut current = root.clone();
    for part in &parts[1..parts.len() - 1] {
        let next = match current.get(part) {
            Some(Value::Module(ns)) => ns,
            _ => {
                let ns = Rc::new(ModuleNamespace::empty(*part));
                current
                    .vars
                    .borrow_mut()
                    .insert(Rc::from(*part), Value::Module(ns.clone()));
                ns
            }
        };
        current = next;
    }
    let leaf = *parts.last().expect("dotted path has a last part");
    current
        .vars
        .borrow_mut()
        .insert(Rc::from(leaf), Value::Module(exports.clone()));

    ctx.env.define(root_name, Value::Module(root), None);
    Ok(Flow::Normal(Value::Module(exports)))
}

/// `from m import a, b as c`: unknown names bind null so the diagnostic
/// surfaces at use time, not import time.
fn exec_from_import(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::FromImport { module, items } = &node.variant else {
        return Err(RunError::internal("FromImport executor on wrong node"));
    };
    let exports = interp.import_module(module, Some(&ctx.current_file))?;
    for (name, alias) in items {
        let binding = alias.clone().unwrap_or_else(|| name.clone());
        let value = exports.get(name).unwrap_or(Value::Null);
        ctx.env.define(binding, value, None);
    }
    Ok(Flow::Normal(Value::Null))
}

fn exec_enum_declaration(_interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Enum(def) = &node.variant else {
        return Err(RunError::internal("Enum executor on wrong node"));
    };
    let mut members = IndexMap::new();
    for (member_name, member_value) in &def.members {
        members.insert(
            member_name.clone(),
            Rc::new(EnumValueObject {
                enum_name: def.name.clone(),
                name: member_name.clone(),
                value: member_value.clone(),
            }),
        );
    }
    let enum_type = Value::EnumType(Rc::new(EnumObject {
        name: def.name.clone(),
        members,
    }));
    ctx.env.define(def.name.clone(), enum_type, None);
    Ok(Flow::Normal(Value::Null))
}

fn exec_delete(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Delete { target } = &node.variant else {
        return Err(RunError::internal("Delete executor on wrong node"));
    };
    match &target.variant {
        NodeVariant::Identifier { name } => {
            if ctx.env.remove(name) {
                Ok(Flow::Normal(Value::Null))
            } else {
                Err(ExcType::undefined_variable(name))
            }
        }
        NodeVariant::IndexAccess { object, index } => {
            let container = interp.eval(object, ctx)?;
            let idx = interp.eval(index, ctx)?;
            match container {
                Value::Map(entries) => {
                    if let Some(key) = MapKey::from_value(&idx) {
                        entries.borrow_mut().shift_remove(&key);
                    }
                    Ok(Flow::Normal(Value::Null))
                }
                Value::List(items) => {
                    let Value::Int(i) = idx else {
                        return Err(ExcType::type_error(format!(
                            "List index must be integer, got {}",
                            idx.type_name()
                        )));
                    };
                    let mut items = items.borrow_mut();
                    if i < 0 || i as usize >= items.len() {
                        return Err(ExcType::type_error(format!("Index {i} out of range")));
                    }
                    items.remove(i as usize);
                    Ok(Flow::Normal(Value::Null))
                }
                other => Err(ExcType::type_error(format!(
                    "Cannot delete from {}",
                    other.type_name()
                ))),
            }
        }
        NodeVariant::PropertyAccess { object, property } => {
            let container = interp.eval(object, ctx)?;
            match container {
                Value::Instance(instance) => {
                    if let Some((decl, declaring)) = ClassObject::find_field_decl(&instance.class, property) {
                        if decl.is_private && !ctx.can_access_private_member(&declaring.name, Some(&instance)) {
                            return Err(ExcType::security_error(format!(
                                "Access to private member '{property}' of class '{}' is not allowed",
                                declaring.name
                            )));
                        }
                    }
                    instance.fields.borrow_mut().shift_remove(&**property);
                    Ok(Flow::Normal(Value::Null))
                }
                Value::Map(entries) => {
                    entries.borrow_mut().shift_remove(&MapKey::Str(property.clone()));
                    Ok(Flow::Normal(Value::Null))
                }
                other => Err(ExcType::type_error(format!(
                    "Cannot delete property '{property}' from {}",
                    other.type_name()
                ))),
            }
        }
        _ => Err(ExcType::syntax_error("Invalid delete target")),
    }
}

/// Model/migration declarations are compile-time artefacts for the ORM
/// tooling; the core runtime records nothing.
fn exec_compile_time_decl(_interp: &Interpreter, _node: &Node, _ctx: &ExecContext) -> ExecResult {
    Ok(Flow::Normal(Value::Null))
}

fn exec_agent_decl(_interp: &Interpreter, node: &Node, _ctx: &ExecContext) -> ExecResult {
    let NodeVariant::AgentDecl { name } = &node.variant else {
        return Err(RunError::internal("AgentDecl executor on wrong node"));
    };
    Err(ExcType::runtime_error(format!(
        "Agent '{name}' requires the agent runtime, which is not part of the core interpreter"
    )))
}

fn exec_serve(_interp: &Interpreter, node: &Node, _ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Serve { adapter, name } = &node.variant else {
        return Err(RunError::internal("Serve executor on wrong node"));
    };
    Err(ExcType::runtime_error(format!(
        "Server '{name}' ({adapter}) requires the server runtime, which is not part of the core interpreter"
    )))
}

fn exec_stop_server(_interp: &Interpreter, node: &Node, _ctx: &ExecContext) -> ExecResult {
    let NodeVariant::StopServer { target } = &node.variant else {
        return Err(RunError::internal("StopServer executor on wrong node"));
    };
    Err(ExcType::runtime_error(format!(
        "Cannot stop server '{target}': the server runtime is not part of the core interpreter"
    )))
}

/// `await handle;` on a server handle: nothing to wait for without the
/// server runtime, so this is a no-op.
fn exec_server_await(_interp: &Interpreter, _node: &Node, _ctx: &ExecContext) -> ExecResult {
    Ok(Flow::Normal(Value::Null))
}
