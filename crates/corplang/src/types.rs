//! Lightweight runtime type representation.
//!
//! Used by three consumers: typed `catch` clause matching, strict-mode
//! annotation checks, and the `typeOf` builtin. Primitives carry documented
//! aliases (`str`/`string`, `int`/`integer`/`number`, …), unions match when
//! any variant matches, and class types walk the parent chain.

use std::{fmt, rc::Rc};

use crate::{
    ast::TypeExpr,
    env::Environment,
    exceptions::{ExcType, RaisedException},
    value::{ClassObject, Value},
};

/// Canonical family for a primitive alias, or the name itself for classes.
#[must_use]
pub fn canonical(name: &str) -> &str {
    match name.to_ascii_lowercase().as_str() {
        "str" | "string" => "string",
        "int" | "integer" | "float" | "double" | "number" => "number",
        "bool" | "boolean" => "boolean",
        "list" | "array" => "list",
        "dict" | "map" | "object" => "object",
        "function" | "callable" => "function",
        "null" | "nil" | "none" => "null",
        "any" => "any",
        "module" => "module",
        _ => return name,
    }
}

fn is_primitive_name(name: &str) -> bool {
    matches!(
        canonical(name),
        "string" | "number" | "boolean" | "list" | "object" | "function" | "null" | "any" | "module"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Primitive,
    Class,
    Union,
    Native,
}

/// A reified type, as produced by annotations or `typeOf`.
#[derive(Debug)]
pub struct TypeObject {
    pub name: Rc<str>,
    pub kind: TypeKind,
    pub class: Option<Rc<ClassObject>>,
    pub args: Vec<Rc<TypeObject>>,
    pub union: Vec<Rc<TypeObject>>,
}

impl TypeObject {
    #[must_use]
    pub fn primitive(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Primitive,
            class: None,
            args: Vec::new(),
            union: Vec::new(),
        }
    }

    #[must_use]
    pub fn of_class(class: Rc<ClassObject>) -> Self {
        Self {
            name: class.name.clone(),
            kind: TypeKind::Class,
            class: Some(class),
            args: Vec::new(),
            union: Vec::new(),
        }
    }

    pub fn is_any(&self) -> bool {
        canonical(&self.name) == "any"
    }

    /// Nominal assignability: `self` may be used where `other` is expected.
    #[must_use]
    pub fn is_assignable_to(&self, other: &Self) -> bool {
        if self.is_any() || other.is_any() {
            return true;
        }
        if other.kind == TypeKind::Union {
            return other.union.iter().any(|t| self.is_assignable_to(t));
        }
        if self.kind == TypeKind::Union {
            return self.union.iter().any(|t| t.is_assignable_to(other));
        }
        if self.kind == TypeKind::Class {
            if let Some(class) = &self.class {
                return ClassObject::is_subclass_of_name(class, &other.name);
            }
            return self.name == other.name;
        }
        canonical(&self.name) == canonical(&other.name)
    }
}

impl fmt::Display for TypeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == TypeKind::Union {
            let mut first = true;
            for t in &self.union {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{t}")?;
                first = false;
            }
            return Ok(());
        }
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            write!(f, "<")?;
            for (i, arg) in self.args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{arg}")?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

/// The runtime type of a value.
#[must_use]
pub fn type_of_value(value: &Value) -> TypeObject {
    match value {
        Value::Null => TypeObject::primitive("null"),
        Value::Bool(_) => TypeObject::primitive("boolean"),
        Value::Int(_) => TypeObject::primitive("int"),
        Value::Float(_) => TypeObject::primitive("float"),
        Value::Str(_) => TypeObject::primitive("string"),
        Value::List(_) => TypeObject::primitive("list"),
        Value::Map(_) => TypeObject::primitive("object"),
        Value::Function(_) | Value::Builtin(_) | Value::BoundMethod(_) | Value::Super(_) | Value::NativeMethod(_) => {
            TypeObject::primitive("function")
        }
        Value::Module(_) => TypeObject::primitive("module"),
        Value::Instance(inst) => TypeObject::of_class(inst.class.clone()),
        Value::Class(cls) => TypeObject::of_class(cls.clone()),
        Value::Interface(def) => TypeObject {
            name: def.name.clone(),
            kind: TypeKind::Native,
            class: None,
            args: Vec::new(),
            union: Vec::new(),
        },
        Value::EnumType(e) => TypeObject {
            name: e.name.clone(),
            kind: TypeKind::Native,
            class: None,
            args: Vec::new(),
            union: Vec::new(),
        },
        Value::EnumValue(v) => TypeObject {
            name: v.enum_name.clone(),
            kind: TypeKind::Native,
            class: None,
            args: Vec::new(),
            union: Vec::new(),
        },
        Value::Awaitable(_) => TypeObject::primitive("awaitable"),
        Value::Type(_) => TypeObject::primitive("type"),
    }
}

/// Reifies an annotation, resolving class names against the environment.
#[must_use]
pub fn type_from_expr(expr: &TypeExpr, env: &Rc<Environment>) -> TypeObject {
    if expr.is_union() {
        let union = expr
            .args
            .iter()
            .map(|arg| Rc::new(type_from_expr(arg, env)))
            .collect();
        return TypeObject {
            name: Rc::from("Union"),
            kind: TypeKind::Union,
            class: None,
            args: Vec::new(),
            union,
        };
    }

    if is_primitive_name(&expr.base) {
        let mut t = TypeObject::primitive(expr.base.clone());
        t.args = expr.args.iter().map(|a| Rc::new(type_from_expr(a, env))).collect();
        return t;
    }

    if let Some(Value::Class(class)) = env.get(&expr.base) {
        let mut t = TypeObject::of_class(class);
        t.args = expr.args.iter().map(|a| Rc::new(type_from_expr(a, env))).collect();
        return t;
    }

    TypeObject {
        name: expr.base.clone(),
        kind: TypeKind::Native,
        class: None,
        args: expr.args.iter().map(|a| Rc::new(type_from_expr(a, env))).collect(),
        union: Vec::new(),
    }
}

/// Strict-mode check: does `value` satisfy the annotation?
#[must_use]
pub fn matches_type(value: &Value, expected: &TypeExpr, env: &Rc<Environment>) -> bool {
    if expected.is_union() {
        return expected.args.iter().any(|part| matches_type(value, part, env));
    }
    let base = canonical(&expected.base);
    match base {
        "any" => true,
        "string" => matches!(value, Value::Str(_)),
        "boolean" => matches!(value, Value::Bool(_)),
        "number" => match expected.base.to_ascii_lowercase().as_str() {
            "int" | "integer" => matches!(value, Value::Int(_)),
            "float" | "double" => matches!(value, Value::Float(_)),
            _ => matches!(value, Value::Int(_) | Value::Float(_)),
        },
        "list" => matches!(value, Value::List(_)),
        "object" => matches!(value, Value::Map(_)),
        "function" => value.is_callable(),
        "null" => matches!(value, Value::Null),
        "module" => matches!(value, Value::Module(_) | Value::Map(_)),
        _ => match value {
            Value::Instance(inst) => ClassObject::is_subclass_of_name(&inst.class, &expected.base),
            Value::Class(cls) => &*cls.name == &*expected.base,
            Value::EnumValue(v) => &*v.enum_name == &*expected.base,
            _ => false,
        },
    }
}

/// Typed-catch matching: does a raised exception match the declared type?
///
/// Builtin kinds match by the nominal `ExcType` hierarchy (with `Exception`
/// as the base); thrown instances match through the class parent chain; other
/// thrown values (strings, maps) match by primitive type.
#[must_use]
pub fn exception_matches(raised: &RaisedException, expected: &TypeExpr, env: &Rc<Environment>) -> bool {
    if expected.is_union() {
        return expected.args.iter().any(|part| exception_matches(raised, part, env));
    }

    if let Some(value) = &raised.value {
        match value {
            Value::Instance(inst) => {
                if ClassObject::is_subclass_of_name(&inst.class, &expected.base) {
                    return true;
                }
                // A user class named after (or extending a class named after)
                // a builtin kind also satisfies that kind's handler.
                if let Some(expected_kind) = ExcType::from_class_name(&expected.base) {
                    return raised.exc_type.is_subclass_of(expected_kind);
                }
                false
            }
            other => matches_type(other, expected, env),
        }
    } else {
        ExcType::from_class_name(&expected.base)
            .is_some_and(|expected_kind| raised.exc_type.is_subclass_of(expected_kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_aliases_share_a_family() {
        assert_eq!(canonical("str"), "string");
        assert_eq!(canonical("integer"), "number");
        assert_eq!(canonical("MyClass"), "MyClass");
    }

    #[test]
    fn strict_int_and_float_are_distinct() {
        let env = Environment::new();
        assert!(matches_type(&Value::Int(1), &TypeExpr::simple("int"), &env));
        assert!(!matches_type(&Value::Float(1.0), &TypeExpr::simple("int"), &env));
        assert!(matches_type(&Value::Float(1.0), &TypeExpr::simple("number"), &env));
    }

    #[test]
    fn union_matches_any_variant() {
        let env = Environment::new();
        let union = TypeExpr {
            base: Rc::from("Union"),
            args: vec![TypeExpr::simple("int"), TypeExpr::simple("string")],
        };
        assert!(matches_type(&Value::str("x"), &union, &env));
        assert!(!matches_type(&Value::Bool(true), &union, &env));
    }

    #[test]
    fn builtin_kinds_match_their_handlers() {
        let env = Environment::new();
        let raised = RaisedException::new(ExcType::TypeError, "boom");
        assert!(exception_matches(&raised, &TypeExpr::simple("TypeError"), &env));
        assert!(exception_matches(&raised, &TypeExpr::simple("Exception"), &env));
        assert!(!exception_matches(&raised, &TypeExpr::simple("ReferenceError"), &env));
    }
}
