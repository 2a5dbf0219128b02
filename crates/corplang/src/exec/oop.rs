//! Executors for the class model: declarations, `new`, property access,
//! `this` and `super`.

use std::{cell::Cell, rc::Rc};

use crate::{
    ast::{Node, NodeTag, NodeVariant},
    exceptions::{ExcType, ExecResult, Flow, RunError, RunResult},
    exec::{functions, natives},
    interp::{ExecContext, Interpreter},
    value::{BoundMethod, ClassObject, InstanceObject, SuperBinding, Value},
};

pub(crate) fn register(interp: &Interpreter) {
    interp.register_default(NodeTag::Class, exec_class_declaration);
    interp.register_default(NodeTag::Interface, exec_interface_declaration);
    interp.register_default(NodeTag::Contract, exec_interface_declaration);
    interp.register_default(NodeTag::New, exec_new_expression);
    interp.register_default(NodeTag::PropertyAccess, exec_property_access);
    interp.register_default(NodeTag::This, exec_this);
    interp.register_default(NodeTag::Super, exec_super);
}

/// Method set every `driver` class must provide.
const DRIVER_REQUIRED_METHODS: &[&str] = &["connect", "disconnect", "execute", "query", "transaction"];

/// Searches module namespaces reachable from the environment chain for a
/// class, used when `extends` names a symbol imported under a module alias.
fn find_class_in_modules(env: &Rc<crate::env::Environment>, name: &str) -> Option<Rc<ClassObject>> {
    fn search(value: &Value, name: &str) -> Option<Rc<ClassObject>> {
        if let Value::Module(module) = value {
            for entry in module.vars.borrow().values() {
                match entry {
                    Value::Class(class) if &*class.name == name => return Some(class.clone()),
                    Value::Module(_) => {
                        if let Some(found) = search(entry, name) {
                            return Some(found);
                        }
                    }
                    _ => {}
                }
            }
        }
        None
    }

    let mut current = Some(env.clone());
    while let Some(scope) = current {
        for value in scope.variables.borrow().values() {
            if let Some(found) = search(value, name) {
                return Some(found);
            }
        }
        current = scope.parent.clone();
    }
    None
}

fn exec_class_declaration(_interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Class(def) = &node.variant else {
        return Err(RunError::internal("Class executor on wrong node"));
    };

    // Pre-bind the name so method bodies can reference their own class while
    // the object is still being constructed.
    ctx.env.define(def.name.clone(), Value::Null, None);

    let class = Rc::new(ClassObject::from_def(def.clone(), ctx.env.clone()));

    if let Some(extends) = &def.extends {
        let parent = match ctx.env.get(&extends.base) {
            Some(Value::Class(parent)) => Some(parent),
            _ => find_class_in_modules(&ctx.env, &extends.base),
        };
        match parent {
            Some(parent) => *class.parent.borrow_mut() = Some(parent),
            None => {
                return Err(ExcType::reference_error(format!(
                    "Unknown parent class '{}' for class '{}'",
                    extends.base, def.name
                )));
            }
        }
    }

    if def.is_driver {
        let mut missing: Vec<&str> = DRIVER_REQUIRED_METHODS
            .iter()
            .copied()
            .filter(|required| {
                !class.instance_methods.contains_key(*required) && !class.static_methods.contains_key(*required)
            })
            .collect();
        if !missing.is_empty() {
            missing.sort_unstable();
            return Err(ExcType::type_error(format!(
                "Driver '{}' missing required methods: {}",
                def.name,
                missing.join(", ")
            )));
        }
    }

    ctx.env.define(def.name.clone(), Value::Class(class), None);
    Ok(Flow::Normal(Value::Null))
}

fn exec_interface_declaration(_interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let def = match &node.variant {
        NodeVariant::Interface(def) | NodeVariant::Contract(def) => def,
        _ => return Err(RunError::internal("Interface executor on wrong node")),
    };
    ctx.env.define(def.name.clone(), Value::Interface(def.clone()), None);
    Ok(Flow::Normal(Value::Null))
}

fn exec_new_expression(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::New {
        class_name,
        type_args,
        args,
    } = &node.variant
    else {
        return Err(RunError::internal("New executor on wrong node"));
    };

    let Some(target) = ctx.env.get(class_name) else {
        return Err(ExcType::undefined_variable(class_name));
    };
    let arg_values = functions::eval_call_arguments(interp, args, ctx)?;

    match target {
        Value::Class(class) => Ok(Flow::Normal(interp.construct(
            &class,
            arg_values,
            type_args.clone(),
            ctx,
        )?)),
        // Builtin constructors (List, Dict) are plain callables.
        callable if callable.is_callable() => Ok(Flow::Normal(interp.call_value(
            &callable,
            arg_values,
            ctx,
            node.loc,
        )?)),
        _ => Err(ExcType::type_error(format!("Not a class: {class_name}"))),
    }
}

/// Looks a property up on any value, enforcing private-member access.
///
/// `prefer_method` flips the field-vs-method preference: plain access prefers
/// the field, call sites prefer the method.
pub(crate) fn resolve_property(
    interp: &Interpreter,
    target: &Value,
    property: &str,
    ctx: &ExecContext,
    prefer_method: bool,
) -> RunResult<Value> {
    match target {
        Value::Instance(instance) => instance_property(instance, property, ctx, prefer_method),
        Value::Class(class) => class_static_property(interp, class, property, ctx),
        Value::Map(entries) => {
            // Entries win over the convenience helpers; missing keys read as
            // null, a convenience for kwargs-style dictionaries.
            if let Some(value) = entries.borrow().get(&crate::value::MapKey::Str(Rc::from(property))) {
                return Ok(value.clone());
            }
            Ok(natives::property_on_native(target, property).unwrap_or(Value::Null))
        }
        Value::Module(module) => Ok(module.get(property).unwrap_or(Value::Null)),
        Value::EnumType(enum_type) => match enum_type.members.get(property) {
            Some(member) => Ok(Value::EnumValue(member.clone())),
            None => Err(ExcType::reference_error(format!(
                "Enum '{}' has no member '{property}'",
                enum_type.name
            ))),
        },
        Value::EnumValue(member) => match property {
            "name" => Ok(Value::Str(member.name.clone())),
            "value" => Ok(Value::Str(member.value.clone())),
            _ => Err(ExcType::reference_error(format!(
                "Property '{property}' not found on enum value"
            ))),
        },
        Value::Type(type_object) => match property {
            "name" => Ok(Value::str(type_object.to_string())),
            _ => Err(ExcType::reference_error(format!(
                "Property '{property}' not found on type"
            ))),
        },
        Value::Interface(def) => match property {
            "name" => Ok(Value::Str(def.name.clone())),
            _ => Err(ExcType::reference_error(format!(
                "Property '{property}' not found on interface {}",
                def.name
            ))),
        },
        Value::Null => Err(ExcType::reference_error(format!(
            "Property '{property}' not found on null"
        ))),
        other => match natives::property_on_native(other, property) {
            Some(value) => Ok(value),
            None => Err(ExcType::reference_error(format!(
                "Property '{property}' not found on {}",
                other.repr()
            ))),
        },
    }
}

fn instance_property(
    instance: &Rc<InstanceObject>,
    property: &str,
    ctx: &ExecContext,
    prefer_method: bool,
) -> RunResult<Value> {
    let method = ClassObject::find_method(&instance.class, property);
    let field = instance.fields.borrow().get(property).cloned();

    let check_field_access = |value: Value| -> RunResult<Value> {
        if let Some((decl, declaring)) = ClassObject::find_field_decl(&instance.class, property) {
            if decl.is_private && !ctx.can_access_private_member(&declaring.name, Some(instance)) {
                return Err(ExcType::security_error(format!(
                    "Access to private member '{property}' of class '{}' is not allowed",
                    declaring.name
                )));
            }
        }
        Ok(value)
    };

    let bind_method = |method: Rc<crate::ast::MethodDef>, declaring: Rc<ClassObject>| -> RunResult<Value> {
        if method.is_private && !ctx.can_access_private_member(&declaring.name, Some(instance)) {
            return Err(ExcType::security_error(format!(
                "Access to private member '{property}' of class '{}' is not allowed",
                declaring.name
            )));
        }
        Ok(Value::BoundMethod(Rc::new(BoundMethod {
            instance: Some(instance.clone()),
            method,
            class: declaring,
        })))
    };

    if prefer_method {
        if let Some((method, declaring)) = method {
            return bind_method(method, declaring);
        }
        if let Some(value) = field {
            return check_field_access(value);
        }
    } else {
        if let Some(value) = field {
            return check_field_access(value);
        }
        if let Some((method, declaring)) = method {
            return bind_method(method, declaring);
        }
    }

    // A declared-but-unset field still honours the privacy check before the
    // missing-property diagnostic.
    if let Some((decl, declaring)) = ClassObject::find_field_decl(&instance.class, property) {
        if decl.is_private && !ctx.can_access_private_member(&declaring.name, Some(instance)) {
            return Err(ExcType::security_error(format!(
                "Access to private member '{property}' of class '{}' is not allowed",
                declaring.name
            )));
        }
        return Ok(Value::Null);
    }

    Err(ExcType::reference_error(format!(
        "Property '{property}' not found on instance of {}",
        instance.class_name()
    )))
}

fn class_static_property(
    interp: &Interpreter,
    class: &Rc<ClassObject>,
    property: &str,
    ctx: &ExecContext,
) -> RunResult<Value> {
    if let Some(value) = class.static_values.borrow().get(property) {
        return Ok(value.clone());
    }

    // Static fields evaluate lazily on first access and cache the result.
    if let Some(field) = class.static_fields.get(property).cloned() {
        if field.is_private && !ctx.can_access_private_member(&class.name, None) {
            return Err(ExcType::security_error(format!(
                "Access to private member '{property}' of class '{}' is not allowed",
                class.name
            )));
        }
        let value = match &field.value {
            Some(init) => {
                let field_ctx = ExecContext {
                    env: class.env.clone(),
                    current_file: class.def.file.clone(),
                    is_async: false,
                    awaiting: Cell::new(false),
                    scope_owner: Some(class.name.clone()),
                    current_instance: None,
                };
                interp.eval(init, &field_ctx)?
            }
            None => Value::Null,
        };
        class
            .static_values
            .borrow_mut()
            .insert(field.name.clone(), value.clone());
        return Ok(value);
    }

    if let Some(method) = class.static_methods.get(property).cloned() {
        if method.is_private && !ctx.can_access_private_member(&class.name, None) {
            return Err(ExcType::security_error(format!(
                "Access to private member '{property}' of class '{}' is not allowed",
                class.name
            )));
        }
        return Ok(Value::BoundMethod(Rc::new(BoundMethod {
            instance: None,
            method,
            class: class.clone(),
        })));
    }

    // Parent statics are reachable through the chain.
    if let Some(parent) = class.parent.borrow().clone() {
        return class_static_property(interp, &parent, property, ctx);
    }

    Err(ExcType::reference_error(format!(
        "Static property '{property}' not found on class {}",
        class.name
    )))
}

fn exec_property_access(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::PropertyAccess { object, property } = &node.variant else {
        return Err(RunError::internal("PropertyAccess executor on wrong node"));
    };
    let target = interp.eval(object, ctx)?;
    Ok(Flow::Normal(resolve_property(interp, &target, property, ctx, false)?))
}

fn exec_this(_interp: &Interpreter, _node: &Node, ctx: &ExecContext) -> ExecResult {
    Ok(Flow::Normal(ctx.env.get("this").unwrap_or(Value::Null)))
}

fn exec_super(_interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let Some(Value::Instance(instance)) = ctx.env.get("this") else {
        return Err(ExcType::type_error("'super' used outside of class context"));
    };
    let _ = node;

    // Resolve the class whose method body is executing (the scope owner),
    // falling back to the instance's own class.
    let class = ctx
        .scope_owner
        .as_ref()
        .and_then(|owner| match ctx.env.get(owner) {
            Some(Value::Class(class)) => Some(class),
            _ => None,
        })
        .unwrap_or_else(|| instance.class.clone());

    let parent = class.parent.borrow().clone();
    Ok(Flow::Normal(Value::Super(Rc::new(SuperBinding { instance, parent }))))
}
