//! Convenience members on native containers: the string/list/map helpers the
//! language exposes without a class model (`"a,b".split(",")`, `list.push`,
//! `map.keys()`, the `length` property).

use std::rc::Rc;

use crate::{
    exceptions::{ExcType, RunResult},
    interp::{ExecContext, Interpreter},
    value::{values_equal, CallValues, MapKey, NativeMethod, OrderedMap, Value},
};

const STR_METHODS: &[&str] = &[
    "split",
    "replace",
    "indexOf",
    "substring",
    "startsWith",
    "contains",
    "toUpperCase",
    "toLowerCase",
    "trim",
];
const LIST_METHODS: &[&str] = &["push", "append", "pop", "contains", "indexOf", "join"];
const MAP_METHODS: &[&str] = &["get", "keys", "values", "has", "set", "remove", "items"];

/// Resolves a property on a native value, when one exists.
///
/// Returns `None` for names that are neither the `length` property nor a
/// known convenience method, letting the caller decide the error.
pub(crate) fn property_on_native(target: &Value, property: &str) -> Option<Value> {
    match target {
        Value::Str(s) => match property {
            "length" => Some(Value::Int(s.chars().count() as i64)),
            name if STR_METHODS.contains(&name) => Some(bind(target, name)),
            _ => None,
        },
        Value::List(items) => match property {
            "length" => Some(Value::Int(items.borrow().len() as i64)),
            name if LIST_METHODS.contains(&name) => Some(bind(target, name)),
            _ => None,
        },
        Value::Map(entries) => match property {
            "length" => Some(Value::Int(entries.borrow().len() as i64)),
            name if MAP_METHODS.contains(&name) => Some(bind(target, name)),
            _ => None,
        },
        _ => None,
    }
}

fn bind(target: &Value, name: &str) -> Value {
    Value::NativeMethod(Rc::new(NativeMethod {
        target: target.clone(),
        name: Rc::from(name),
    }))
}

fn arg(args: &CallValues, index: usize) -> Value {
    args.positional.get(index).cloned().unwrap_or(Value::Null)
}

fn require_str(value: &Value, method: &str) -> RunResult<Rc<str>> {
    match value {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ExcType::type_error(format!(
            "{method}() expects a string argument, got {}",
            other.type_name()
        ))),
    }
}

fn require_int(value: &Value, method: &str) -> RunResult<i64> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(ExcType::type_error(format!(
            "{method}() expects an integer argument, got {}",
            other.type_name()
        ))),
    }
}

/// Invokes a native container method by name.
pub(crate) fn call_native_method(
    interp: &Interpreter,
    method: &NativeMethod,
    args: CallValues,
    ctx: &ExecContext,
) -> RunResult<Value> {
    match (&method.target, &*method.name) {
        (Value::Str(s), name) => call_string_method(s, name, &args),
        (Value::List(items), name) => call_list_method(interp, items, name, &args, ctx),
        (Value::Map(entries), name) => call_map_method(entries, name, &args),
        (other, name) => Err(ExcType::type_error(format!(
            "'{name}' is not callable on {}",
            other.type_name()
        ))),
    }
}

fn call_string_method(s: &Rc<str>, name: &str, args: &CallValues) -> RunResult<Value> {
    match name {
        "split" => {
            let parts: Vec<Value> = match arg(args, 0) {
                Value::Null => s.split_whitespace().map(Value::str).collect(),
                sep => {
                    let sep = require_str(&sep, "split")?;
                    s.split(&*sep).map(Value::str).collect()
                }
            };
            Ok(Value::list(parts))
        }
        "replace" => {
            let old = require_str(&arg(args, 0), "replace")?;
            let new = require_str(&arg(args, 1), "replace")?;
            Ok(Value::str(s.replace(&*old, &new)))
        }
        "indexOf" => {
            let needle = require_str(&arg(args, 0), "indexOf")?;
            Ok(match s.find(&*needle) {
                Some(byte_idx) => Value::Int(s[..byte_idx].chars().count() as i64),
                None => Value::Int(-1),
            })
        }
        "substring" => {
            let chars: Vec<char> = s.chars().collect();
            let start = require_int(&arg(args, 0), "substring")?.max(0) as usize;
            let end = match arg(args, 1) {
                Value::Null => chars.len(),
                v => require_int(&v, "substring")?.max(0) as usize,
            };
            let start = start.min(chars.len());
            let end = end.clamp(start, chars.len());
            let out: String = chars[start..end].iter().collect();
            Ok(Value::str(out))
        }
        "startsWith" => {
            let prefix = require_str(&arg(args, 0), "startsWith")?;
            Ok(Value::Bool(s.starts_with(&*prefix)))
        }
        "contains" => {
            let needle = require_str(&arg(args, 0), "contains")?;
            Ok(Value::Bool(s.contains(&*needle)))
        }
        "toUpperCase" => Ok(Value::str(s.to_uppercase())),
        "toLowerCase" => Ok(Value::str(s.to_lowercase())),
        "trim" => Ok(Value::str(s.trim())),
        other => Err(ExcType::reference_error(format!(
            "Property '{other}' not found on string"
        ))),
    }
}

fn call_list_method(
    interp: &Interpreter,
    items: &Rc<std::cell::RefCell<Vec<Value>>>,
    name: &str,
    args: &CallValues,
    ctx: &ExecContext,
) -> RunResult<Value> {
    match name {
        "push" | "append" => {
            items.borrow_mut().push(arg(args, 0));
            Ok(Value::Null)
        }
        "pop" => Ok(items.borrow_mut().pop().unwrap_or(Value::Null)),
        "contains" => {
            let needle = arg(args, 0);
            let found = items.borrow().iter().any(|item| values_equal(item, &needle));
            Ok(Value::Bool(found))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            let index = items.borrow().iter().position(|item| values_equal(item, &needle));
            Ok(Value::Int(index.map_or(-1, |i| i as i64)))
        }
        "join" => {
            let sep = match arg(args, 0) {
                Value::Null => Rc::from(""),
                v => require_str(&v, "join")?,
            };
            let mut rendered = Vec::new();
            for item in items.borrow().iter() {
                rendered.push(interp.display_value(item, ctx)?);
            }
            Ok(Value::str(rendered.join(&*sep)))
        }
        other => Err(ExcType::reference_error(format!(
            "Property '{other}' not found on list"
        ))),
    }
}

fn call_map_method(
    entries: &Rc<std::cell::RefCell<OrderedMap<MapKey, Value>>>,
    name: &str,
    args: &CallValues,
) -> RunResult<Value> {
    match name {
        "get" => {
            let Some(key) = MapKey::from_value(&arg(args, 0)) else {
                return Ok(arg(args, 1));
            };
            Ok(entries.borrow().get(&key).cloned().unwrap_or_else(|| arg(args, 1)))
        }
        "keys" => {
            let keys: Vec<Value> = entries
                .borrow()
                .keys()
                .map(|k| match k {
                    MapKey::Str(s) => Value::Str(s.clone()),
                    MapKey::Int(i) => Value::Int(*i),
                })
                .collect();
            Ok(Value::list(keys))
        }
        "values" => Ok(Value::list(entries.borrow().values().cloned().collect())),
        "items" => {
            let items: Vec<Value> = entries
                .borrow()
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        MapKey::Str(s) => Value::Str(s.clone()),
                        MapKey::Int(i) => Value::Int(*i),
                    };
                    Value::list(vec![key, v.clone()])
                })
                .collect();
            Ok(Value::list(items))
        }
        "has" => {
            let Some(key) = MapKey::from_value(&arg(args, 0)) else {
                return Ok(Value::Bool(false));
            };
            Ok(Value::Bool(entries.borrow().contains_key(&key)))
        }
        "set" => {
            let Some(key) = MapKey::from_value(&arg(args, 0)) else {
                return Err(ExcType::type_error("Map keys must be strings or integers"));
            };
            entries.borrow_mut().insert(key, arg(args, 1));
            Ok(Value::Null)
        }
        "remove" => {
            let Some(key) = MapKey::from_value(&arg(args, 0)) else {
                return Ok(Value::Null);
            };
            Ok(entries.borrow_mut().shift_remove(&key).unwrap_or(Value::Null))
        }
        other => Err(ExcType::reference_error(format!(
            "Property '{other}' not found on object"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_length_counts_chars() {
        let v = Value::str("héllo");
        match property_on_native(&v, "length") {
            Some(Value::Int(5)) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unknown_property_returns_none() {
        assert!(property_on_native(&Value::str("x"), "frobnicate").is_none());
        assert!(property_on_native(&Value::Int(1), "length").is_none());
    }
}
