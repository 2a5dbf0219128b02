//! Executors for literals, identifiers, operators, and the literal-container
//! expressions (`JsonObject`/`JsonArray`/f-strings).

use crate::{
    ast::{BinOp, Literal, Node, NodeTag, NodeVariant, UnOp},
    exceptions::{ExcType, ExecResult, Flow, RunError},
    interp::{ExecContext, Interpreter},
    value::{values_equal, MapKey, OrderedMap, Value},
};

pub(crate) fn register(interp: &Interpreter) {
    interp.register_default(NodeTag::Literal, exec_literal);
    interp.register_default(NodeTag::NullLiteral, exec_null_literal);
    interp.register_default(NodeTag::Identifier, exec_identifier);
    interp.register_default(NodeTag::GenericIdentifier, exec_generic_identifier);
    interp.register_default(NodeTag::BinaryOp, exec_binary);
    interp.register_default(NodeTag::UnaryOp, exec_unary);
    interp.register_default(NodeTag::Ternary, exec_ternary);
    interp.register_default(NodeTag::IndexAccess, exec_index_access);
    interp.register_default(NodeTag::JsonObject, exec_json_object);
    interp.register_default(NodeTag::JsonArray, exec_json_array);
    interp.register_default(NodeTag::InterpolatedString, exec_interpolated_string);
}

fn exec_literal(_interp: &Interpreter, node: &Node, _ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Literal(literal) = &node.variant else {
        return Err(RunError::internal("Literal executor on wrong node"));
    };
    let value = match literal {
        Literal::Int(v) => Value::Int(*v),
        Literal::Float(v) => Value::Float(*v),
        Literal::Str(s) => Value::Str(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
    };
    Ok(Flow::Normal(value))
}

fn exec_null_literal(_interp: &Interpreter, _node: &Node, _ctx: &ExecContext) -> ExecResult {
    Ok(Flow::Normal(Value::Null))
}

fn exec_identifier(_interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Identifier { name } = &node.variant else {
        return Err(RunError::internal("Identifier executor on wrong node"));
    };
    match ctx.env.get(name) {
        Some(value) => Ok(Flow::Normal(value)),
        None => Err(ExcType::undefined_variable(name)),
    }
}

fn exec_generic_identifier(_interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::GenericIdentifier { name, .. } = &node.variant else {
        return Err(RunError::internal("GenericIdentifier executor on wrong node"));
    };
    // Type arguments are erased at runtime; the name resolves like any other.
    // The built-in container names work even without a binding in scope.
    if let Some(value) = ctx.env.get(name) {
        return Ok(Flow::Normal(value));
    }
    match &**name {
        "Dict" | "Map" => Ok(Flow::Normal(crate::builtins::map_constructor())),
        "List" => Ok(Flow::Normal(crate::builtins::list_constructor())),
        _ => Err(ExcType::undefined_variable(name)),
    }
}

fn numeric_pair(left: &Value, right: &Value) -> Option<(f64, f64, bool)> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some((*a as f64, *b as f64, true)),
        (Value::Int(a), Value::Float(b)) => Some((*a as f64, *b, false)),
        (Value::Float(a), Value::Int(b)) => Some((*a, *b as f64, false)),
        (Value::Float(a), Value::Float(b)) => Some((*a, *b, false)),
        _ => None,
    }
}

fn operator_type_error(op: BinOp, left: &Value, right: &Value, node: &Node) -> RunError {
    ExcType::type_error(format!(
        "Cannot apply operator '{op}' to {} and {} (line {}, col {})",
        left.type_name(),
        right.type_name(),
        node.loc.line,
        node.loc.column
    ))
}

/// Ordered comparisons coerce null to 0, a preserved source quirk.
fn ordered_operand(value: Value) -> Value {
    match value {
        Value::Null => Value::Int(0),
        other => other,
    }
}

fn compare_ordered(op: BinOp, left: &Value, right: &Value, node: &Node) -> ExecResult {
    if let Some((a, b, _)) = numeric_pair(left, right) {
        let result = match op {
            BinOp::Lt => a < b,
            BinOp::Gt => a > b,
            BinOp::LtEq => a <= b,
            _ => a >= b,
        };
        return Ok(Flow::Normal(Value::Bool(result)));
    }
    if let (Value::Str(a), Value::Str(b)) = (left, right) {
        let result = match op {
            BinOp::Lt => a < b,
            BinOp::Gt => a > b,
            BinOp::LtEq => a <= b,
            _ => a >= b,
        };
        return Ok(Flow::Normal(Value::Bool(result)));
    }
    Err(operator_type_error(op, left, right, node))
}

fn membership(left: &Value, right: &Value, interp: &Interpreter, ctx: &ExecContext) -> ExecResult {
    let contains = match right {
        Value::Map(entries) => MapKey::from_value(left).is_some_and(|key| entries.borrow().contains_key(&key)),
        Value::List(items) => items.borrow().iter().any(|item| values_equal(item, left)),
        Value::Str(haystack) => match left {
            Value::Str(needle) => haystack.contains(&**needle),
            _ => false,
        },
        Value::Instance(instance) => {
            // Instances answer membership through a `has` method when present.
            if let Some((method, class)) = crate::value::ClassObject::find_method(&instance.class, "has") {
                let bound = crate::value::BoundMethod {
                    instance: Some(instance.clone()),
                    method,
                    class,
                };
                let args = crate::value::CallValues::positional_only([left.clone()]);
                interp.call_method(&bound, args, ctx)?.is_truthy()
            } else {
                false
            }
        }
        _ => false,
    };
    Ok(Flow::Normal(Value::Bool(contains)))
}

fn exec_binary(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::BinaryOp { op, left, right } = &node.variant else {
        return Err(RunError::internal("BinaryOp executor on wrong node"));
    };
    let op = *op;
    let left_val = interp.eval(left, ctx)?;

    // Short-circuit logic before the right operand is touched.
    match op {
        BinOp::And => {
            if !left_val.is_truthy() {
                return Ok(Flow::Normal(Value::Bool(false)));
            }
            let right_val = interp.eval(right, ctx)?;
            return Ok(Flow::Normal(Value::Bool(right_val.is_truthy())));
        }
        BinOp::Or => {
            if left_val.is_truthy() {
                return Ok(Flow::Normal(Value::Bool(true)));
            }
            let right_val = interp.eval(right, ctx)?;
            return Ok(Flow::Normal(Value::Bool(right_val.is_truthy())));
        }
        _ => {}
    }

    let right_val = interp.eval(right, ctx)?;

    match op {
        BinOp::Eq => Ok(Flow::Normal(Value::Bool(values_equal(&left_val, &right_val)))),
        BinOp::NotEq => Ok(Flow::Normal(Value::Bool(!values_equal(&left_val, &right_val)))),
        BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
            let left_val = ordered_operand(left_val);
            let right_val = ordered_operand(right_val);
            compare_ordered(op, &left_val, &right_val, node)
        }
        BinOp::In => membership(&left_val, &right_val, interp, ctx),
        BinOp::Add => {
            if let (Value::Str(a), Value::Str(b)) = (&left_val, &right_val) {
                return Ok(Flow::Normal(Value::str(format!("{a}{b}"))));
            }
            if let (Value::List(a), Value::List(b)) = (&left_val, &right_val) {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                return Ok(Flow::Normal(Value::list(items)));
            }
            arithmetic(op, &left_val, &right_val, node)
        }
        BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => arithmetic(op, &left_val, &right_val, node),
        BinOp::And | BinOp::Or => unreachable!("handled above"),
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value, node: &Node) -> ExecResult {
    let Some((a, b, both_int)) = numeric_pair(left, right) else {
        return Err(operator_type_error(op, left, right, node));
    };

    if both_int {
        let (x, y) = match (left, right) {
            (Value::Int(x), Value::Int(y)) => (*x, *y),
            _ => unreachable!("both_int implies int operands"),
        };
        let result = match op {
            BinOp::Add => x.checked_add(y),
            BinOp::Sub => x.checked_sub(y),
            BinOp::Mul => x.checked_mul(y),
            BinOp::Div => {
                if y == 0 {
                    return Err(ExcType::type_error("Division by zero"));
                }
                // `/` is true division: int operands still yield a float.
                return Ok(Flow::Normal(Value::Float(x as f64 / y as f64)));
            }
            BinOp::Mod => {
                if y == 0 {
                    return Err(ExcType::type_error("Division by zero"));
                }
                // Floored modulo: the result takes the divisor's sign.
                let r = x % y;
                Some(if r != 0 && (r < 0) != (y < 0) { r + y } else { r })
            }
            _ => unreachable!("arithmetic op"),
        };
        return match result {
            Some(v) => Ok(Flow::Normal(Value::Int(v))),
            // Overflowing int math widens to float rather than wrapping.
            None => Ok(Flow::Normal(Value::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                _ => a * b,
            }))),
        };
    }

    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(ExcType::type_error("Division by zero"));
            }
            a / b
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(ExcType::type_error("Division by zero"));
            }
            // Floored modulo on floats as well.
            let r = a % b;
            if r != 0.0 && (r < 0.0) != (b < 0.0) {
                r + b
            } else {
                r
            }
        }
        _ => unreachable!("arithmetic op"),
    };
    Ok(Flow::Normal(Value::Float(result)))
}

fn exec_unary(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::UnaryOp { op, operand } = &node.variant else {
        return Err(RunError::internal("UnaryOp executor on wrong node"));
    };
    let value = interp.eval(operand, ctx)?;
    match op {
        UnOp::Not => Ok(Flow::Normal(Value::Bool(!value.is_truthy()))),
        UnOp::Neg => match value {
            Value::Int(v) => Ok(Flow::Normal(Value::Int(-v))),
            Value::Float(v) => Ok(Flow::Normal(Value::Float(-v))),
            other => Err(ExcType::type_error(format!(
                "Unary minus requires number, got {}",
                other.type_name()
            ))),
        },
    }
}

fn exec_ternary(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::Ternary {
        condition,
        then_expr,
        else_expr,
    } = &node.variant
    else {
        return Err(RunError::internal("Ternary executor on wrong node"));
    };
    let branch = if interp.eval(condition, ctx)?.is_truthy() {
        then_expr
    } else {
        else_expr
    };
    Ok(Flow::Normal(interp.eval(branch, ctx)?))
}

fn exec_index_access(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::IndexAccess { object, index } = &node.variant else {
        return Err(RunError::internal("IndexAccess executor on wrong node"));
    };
    let target = interp.eval(object, ctx)?;
    let idx = interp.eval(index, ctx)?;

    match &target {
        Value::List(items) => {
            let Value::Int(i) = idx else {
                return Err(ExcType::type_error(format!(
                    "List index must be integer, got {}",
                    idx.type_name()
                )));
            };
            let items = items.borrow();
            if i < 0 || i as usize >= items.len() {
                return Err(ExcType::type_error(format!("Index {i} out of range")));
            }
            Ok(Flow::Normal(items[i as usize].clone()))
        }
        Value::Map(entries) => {
            let Some(key) = MapKey::from_value(&idx) else {
                return Err(ExcType::type_error("Map keys must be strings or integers"));
            };
            match entries.borrow().get(&key) {
                Some(value) => Ok(Flow::Normal(value.clone())),
                None => Err(ExcType::reference_error(format!("Key '{key}' not found in dictionary"))),
            }
        }
        Value::Str(s) => {
            let Value::Int(i) = idx else {
                return Err(ExcType::type_error(format!(
                    "String index must be integer, got {}",
                    idx.type_name()
                )));
            };
            match s.chars().nth(i.max(0) as usize) {
                Some(ch) if i >= 0 => Ok(Flow::Normal(Value::str(ch.to_string()))),
                _ => Err(ExcType::type_error(format!("String index {i} out of range"))),
            }
        }
        Value::Module(module) => {
            let Value::Str(name) = &idx else {
                return Err(ExcType::type_error("Module index must be a string"));
            };
            Ok(Flow::Normal(module.get(name).unwrap_or(Value::Null)))
        }
        Value::Instance(instance) => {
            // Map/List-like instances expose indexing through a `get` method.
            if let Some((method, class)) = crate::value::ClassObject::find_method(&instance.class, "get") {
                let bound = crate::value::BoundMethod {
                    instance: Some(instance.clone()),
                    method,
                    class,
                };
                let args = crate::value::CallValues::positional_only([idx]);
                return Ok(Flow::Normal(interp.call_method(&bound, args, ctx)?));
            }
            Err(ExcType::type_error(format!(
                "Cannot index into {}",
                target.type_name()
            )))
        }
        other => Err(ExcType::type_error(format!("Cannot index into {}", other.type_name()))),
    }
}

fn exec_json_object(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::JsonObject { entries } = &node.variant else {
        return Err(RunError::internal("JsonObject executor on wrong node"));
    };
    let mut map = OrderedMap::default();
    for (key, value_node) in entries {
        let value = interp.eval(value_node, ctx)?;
        map.insert(MapKey::Str(key.clone()), value);
    }
    Ok(Flow::Normal(Value::map(map)))
}

fn exec_json_array(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::JsonArray { items } = &node.variant else {
        return Err(RunError::internal("JsonArray executor on wrong node"));
    };
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        values.push(interp.eval(item, ctx)?);
    }
    Ok(Flow::Normal(Value::list(values)))
}

fn exec_interpolated_string(interp: &Interpreter, node: &Node, ctx: &ExecContext) -> ExecResult {
    let NodeVariant::InterpolatedString { parts } = &node.variant else {
        return Err(RunError::internal("InterpolatedString executor on wrong node"));
    };
    let mut out = String::new();
    for part in parts {
        match part {
            crate::ast::FStringPart::Text(text) => out.push_str(text),
            crate::ast::FStringPart::Expr(expr) => {
                // Placeholders evaluate under the surrounding context: async
                // calls are only legal here when the context already permits
                // them (the `await` executor owns the awaiting flag).
                // Awaitables that do appear resolve in place so the rendered
                // string holds the final value.
                let value = match interp.eval(expr, ctx)? {
                    Value::Awaitable(awaitable) => interp.drive_awaitable(&awaitable, ctx)?,
                    other => other,
                };
                out.push_str(&interp.display_value(&value, ctx)?);
            }
        }
    }
    Ok(Flow::Normal(Value::str(out)))
}
