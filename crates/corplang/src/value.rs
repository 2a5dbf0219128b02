//! Runtime value taxonomy.
//!
//! Values are cheap to clone: compound data sits behind `Rc`, with `RefCell`
//! interiors for the mutable pieces (list elements, map entries, instance
//! fields, lazy static-field caches). Identity semantics (instances, classes,
//! functions, modules) fall out of `Rc::ptr_eq`.

use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::Rc,
};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::{
    ast::{ClassDef, ClassMember, FieldDef, FunctionDef, InterfaceDef, MethodDef, TypeExpr},
    env::Environment,
    exceptions::RunResult,
    interp::{ExecContext, Interpreter},
    types::TypeObject,
};

/// Insertion-ordered map seeded with the crate-wide hasher.
pub type OrderedMap<K, V> = IndexMap<K, V, ahash::RandomState>;

/// Map keys are strings or ints; anything else is a `TypeError` at the
/// assignment site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Str(Rc<str>),
    Int(i64),
}

impl MapKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(Self::Str(s.clone())),
            Value::Int(i) => Some(Self::Int(*i)),
            Value::Bool(b) => Some(Self::Int(i64::from(*b))),
            _ => None,
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Evaluated call-site arguments: positionals in order plus named pairs.
#[derive(Debug, Default, Clone)]
pub struct CallValues {
    pub positional: SmallVec<[Value; 4]>,
    pub named: Vec<(Rc<str>, Value)>,
}

impl CallValues {
    #[must_use]
    pub fn positional_only(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            positional: values.into_iter().collect(),
            named: Vec::new(),
        }
    }
}

/// A user function or lambda bound to its definition-site environment.
pub struct FunctionObject {
    pub def: Rc<FunctionDef>,
    pub closure: Rc<Environment>,
}

// Environments reference the values defined in them, so Debug stops at the
// function name instead of walking the capture chain.
impl fmt::Debug for FunctionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.def.display_name())
    }
}

impl FunctionObject {
    pub fn is_async(&self) -> bool {
        self.def.is_async
    }
}

/// Signature of builtin functions registered in the global environment.
pub type BuiltinFn = fn(&Interpreter, &ExecContext, CallValues) -> RunResult<Value>;

/// A builtin callable such as `print` or `len`.
pub struct BuiltinFunction {
    pub name: &'static str,
    pub func: BuiltinFn,
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<builtin {}>", self.name)
    }
}

/// A runtime class: member tables split by kind, the environment in effect at
/// the definition site, and a lazily filled static-field cache.
pub struct ClassObject {
    pub name: Rc<str>,
    pub def: Rc<ClassDef>,
    /// Resolved when the declaration executes; classes may extend names that
    /// are themselves still being defined in module cycles.
    pub parent: RefCell<Option<Rc<ClassObject>>>,
    pub env: Rc<Environment>,
    pub instance_methods: IndexMap<Rc<str>, Rc<MethodDef>>,
    pub static_methods: IndexMap<Rc<str>, Rc<MethodDef>>,
    pub instance_fields: IndexMap<Rc<str>, Rc<FieldDef>>,
    pub static_fields: IndexMap<Rc<str>, Rc<FieldDef>>,
    /// Static field values, evaluated on first access.
    pub static_values: RefCell<OrderedMap<Rc<str>, Value>>,
    pub interfaces: Vec<Rc<str>>,
}

impl ClassObject {
    /// Builds member tables from a class definition.
    #[must_use]
    pub fn from_def(def: Rc<ClassDef>, env: Rc<Environment>) -> Self {
        let mut instance_methods = IndexMap::new();
        let mut static_methods = IndexMap::new();
        let mut instance_fields = IndexMap::new();
        let mut static_fields = IndexMap::new();
        for member in &def.members {
            match member {
                ClassMember::Method(method) => {
                    let name = method.def.name.clone().unwrap_or_else(|| Rc::from("<method>"));
                    if method.is_static {
                        static_methods.insert(name, method.clone());
                    } else {
                        instance_methods.insert(name, method.clone());
                    }
                }
                ClassMember::Field(field) => {
                    if field.is_static {
                        static_fields.insert(field.name.clone(), field.clone());
                    } else {
                        instance_fields.insert(field.name.clone(), field.clone());
                    }
                }
            }
        }
        let interfaces = def.implements.iter().map(|t| t.base.clone()).collect();
        Self {
            name: def.name.clone(),
            def,
            parent: RefCell::new(None),
            env,
            instance_methods,
            static_methods,
            instance_fields,
            static_fields,
            static_values: RefCell::new(OrderedMap::default()),
            interfaces,
        }
    }

    /// Walks the class chain for an instance method, returning the method and
    /// its declaring class (needed for `super` and privacy checks).
    pub fn find_method(class: &Rc<Self>, name: &str) -> Option<(Rc<MethodDef>, Rc<Self>)> {
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            if let Some(method) = cls.instance_methods.get(name) {
                return Some((method.clone(), cls));
            }
            current = cls.parent.borrow().clone();
        }
        None
    }

    /// Walks the class chain for an instance field declaration.
    pub fn find_field_decl(class: &Rc<Self>, name: &str) -> Option<(Rc<FieldDef>, Rc<Self>)> {
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            if let Some(field) = cls.instance_fields.get(name) {
                return Some((field.clone(), cls));
            }
            current = cls.parent.borrow().clone();
        }
        None
    }

    /// True when `class` is `ancestor_name` or one of its descendants.
    pub fn is_subclass_of_name(class: &Rc<Self>, ancestor_name: &str) -> bool {
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            if &*cls.name == ancestor_name {
                return true;
            }
            current = cls.parent.borrow().clone();
        }
        false
    }
}

impl fmt::Debug for ClassObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<class {}>", self.name)
    }
}

/// An object: its class plus the mutable field table.
pub struct InstanceObject {
    pub class: Rc<ClassObject>,
    pub fields: RefCell<OrderedMap<Rc<str>, Value>>,
    /// Type arguments supplied at `new Name<…>(…)`, positional.
    pub generics: RefCell<Vec<TypeExpr>>,
}

impl InstanceObject {
    #[must_use]
    pub fn new(class: Rc<ClassObject>) -> Self {
        Self {
            class,
            fields: RefCell::new(OrderedMap::default()),
            generics: RefCell::new(Vec::new()),
        }
    }

    pub fn class_name(&self) -> &str {
        &self.class.name
    }
}

impl fmt::Debug for InstanceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} instance>", self.class_name())
    }
}

/// A method plucked off an instance (or class, for statics), remembering the
/// declaring class so `super` resolves correctly.
#[derive(Debug)]
pub struct BoundMethod {
    /// None for static methods.
    pub instance: Option<Rc<InstanceObject>>,
    pub method: Rc<MethodDef>,
    pub class: Rc<ClassObject>,
}

/// A module's exported names. Seeded empty before the module body runs and
/// filled in place afterwards, so cyclic importers share the final namespace.
pub struct ModuleNamespace {
    pub name: Rc<str>,
    pub vars: RefCell<IndexMap<Rc<str>, Value>>,
}

impl fmt::Debug for ModuleNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<module {}>", self.name)
    }
}

impl ModuleNamespace {
    #[must_use]
    pub fn empty(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            vars: RefCell::new(IndexMap::new()),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }
}

/// A declared enum type.
#[derive(Debug)]
pub struct EnumObject {
    pub name: Rc<str>,
    pub members: IndexMap<Rc<str>, Rc<EnumValueObject>>,
}

/// One enum member. Equality is by (enum name, member name).
#[derive(Debug)]
pub struct EnumValueObject {
    pub enum_name: Rc<str>,
    pub name: Rc<str>,
    pub value: Rc<str>,
}

/// What an awaitable will invoke when driven.
#[derive(Debug)]
pub enum AwaitableCallee {
    Function(Rc<FunctionObject>),
    Method(Rc<BoundMethod>),
}

/// A deferred async call: captured callee and arguments, single-shot.
///
/// The body never executes until `await` drives it; driving twice is a
/// runtime error.
#[derive(Debug)]
pub struct AwaitableObject {
    pub callee: AwaitableCallee,
    pub args: RefCell<Option<CallValues>>,
    pub driven: Cell<bool>,
}

impl AwaitableObject {
    #[must_use]
    pub fn new(callee: AwaitableCallee, args: CallValues) -> Self {
        Self {
            callee,
            args: RefCell::new(Some(args)),
            driven: Cell::new(false),
        }
    }
}

/// The callable produced by evaluating `super` inside a method: invoking it
/// runs the immediate parent's constructor bound to the current instance.
#[derive(Debug)]
pub struct SuperBinding {
    pub instance: Rc<InstanceObject>,
    pub parent: Option<Rc<ClassObject>>,
}

/// A container convenience method plucked off a native value, e.g.
/// `list.push` or `"a,b".split`. Dispatch happens by name at call time.
#[derive(Debug)]
pub struct NativeMethod {
    pub target: Value,
    pub name: Rc<str>,
}

/// All values the interpreter manipulates.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<OrderedMap<MapKey, Value>>>),
    Function(Rc<FunctionObject>),
    Builtin(Rc<BuiltinFunction>),
    BoundMethod(Rc<BoundMethod>),
    Class(Rc<ClassObject>),
    Instance(Rc<InstanceObject>),
    Module(Rc<ModuleNamespace>),
    Interface(Rc<InterfaceDef>),
    EnumType(Rc<EnumObject>),
    EnumValue(Rc<EnumValueObject>),
    Awaitable(Rc<AwaitableObject>),
    Super(Rc<SuperBinding>),
    NativeMethod(Rc<NativeMethod>),
    Type(Rc<TypeObject>),
}

impl Value {
    pub fn list(items: Vec<Self>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: OrderedMap<MapKey, Self>) -> Self {
        Self::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn str(s: impl Into<Rc<str>>) -> Self {
        Self::Str(s.into())
    }

    /// Truthiness: only null and `false` are false. Zero, the empty string,
    /// and empty collections are true.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Self::Null | Self::Bool(false))
    }

    /// The literal type name reported by the `type` builtin.
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Int(_) | Self::Float(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "object",
            Self::Function(_) | Self::Builtin(_) | Self::BoundMethod(_) | Self::Super(_) | Self::NativeMethod(_) => {
                "function"
            }
            Self::Class(cls) => &cls.name,
            Self::Instance(inst) => inst.class_name(),
            Self::Module(_) => "module",
            Self::Interface(_) => "interface",
            Self::EnumType(_) | Self::EnumValue(_) => "enum",
            Self::Awaitable(_) => "awaitable",
            Self::Type(_) => "type",
        }
    }

    #[must_use]
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            Self::Function(_)
                | Self::Builtin(_)
                | Self::BoundMethod(_)
                | Self::Class(_)
                | Self::Super(_)
                | Self::NativeMethod(_)
        )
    }

    /// Quoted form used inside container displays.
    #[must_use]
    pub fn repr(&self) -> String {
        match self {
            Self::Str(s) => format!("{s:?}"),
            other => other.to_string(),
        }
    }
}

/// Structural equality for primitives and containers, identity for objects,
/// (enum, member) pairs for enum values. Never errors on null operands.
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => (*x as f64) == *y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::List(x), Value::List(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(l, r)| values_equal(l, r))
        }
        (Value::Map(x), Value::Map(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let (x, y) = (x.borrow(), y.borrow());
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        (Value::Instance(x), Value::Instance(y)) => Rc::ptr_eq(x, y),
        (Value::Class(x), Value::Class(y)) => Rc::ptr_eq(x, y),
        (Value::Function(x), Value::Function(y)) => Rc::ptr_eq(x, y),
        (Value::Builtin(x), Value::Builtin(y)) => Rc::ptr_eq(x, y),
        (Value::Module(x), Value::Module(y)) => Rc::ptr_eq(x, y),
        (Value::EnumValue(x), Value::EnumValue(y)) => x.enum_name == y.enum_name && x.name == y.name,
        (Value::EnumType(x), Value::EnumType(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => {
                let mut buf = ryu::Buffer::new();
                write!(f, "{}", buf.format(*v))
            }
            Self::Str(s) => write!(f, "{s}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item.repr())?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match key {
                        MapKey::Str(s) => write!(f, "{s:?}: {}", value.repr())?,
                        MapKey::Int(n) => write!(f, "{n}: {}", value.repr())?,
                    }
                }
                write!(f, "}}")
            }
            Self::Function(func) => write!(f, "<fn {}>", func.def.display_name()),
            Self::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            Self::BoundMethod(bound) => {
                write!(f, "<method {}.{}>", bound.class.name, bound.method.def.display_name())
            }
            Self::Class(cls) => write!(f, "<class {}>", cls.name),
            Self::Instance(inst) => write!(f, "<{} instance>", inst.class_name()),
            Self::Module(module) => write!(f, "<module {}>", module.name),
            Self::Interface(def) => write!(f, "<interface {}>", def.name),
            Self::EnumType(e) => {
                let members: Vec<&str> = e.members.keys().map(|k| &**k).collect();
                write!(f, "<enum {} {{{}}}>", e.name, members.join(", "))
            }
            Self::EnumValue(v) => write!(f, "{}.{}", v.enum_name, v.name),
            Self::Awaitable(_) => write!(f, "<awaitable>"),
            Self::NativeMethod(method) => write!(f, "<method {}>", method.name),
            Self::Super(binding) => {
                let parent = binding.parent.as_ref().map_or("<none>", |p| &*p.name);
                write!(f, "<super {parent}>")
            }
            Self::Type(t) => write!(f, "Type({t})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_has_no_falsy_coercion() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::str("").is_truthy());
        assert!(Value::list(vec![]).is_truthy());
    }

    #[test]
    fn numeric_equality_crosses_int_and_float() {
        assert!(values_equal(&Value::Int(1), &Value::Float(1.0)));
        assert!(!values_equal(&Value::Int(1), &Value::Float(1.5)));
    }

    #[test]
    fn list_display_quotes_strings() {
        let list = Value::list(vec![Value::Int(1), Value::str("a")]);
        assert_eq!(list.to_string(), "[1, \"a\"]");
    }

    #[test]
    fn enum_values_compare_by_name_pair() {
        let a = Value::EnumValue(Rc::new(EnumValueObject {
            enum_name: Rc::from("Role"),
            name: Rc::from("ADMIN"),
            value: Rc::from("admin"),
        }));
        let b = Value::EnumValue(Rc::new(EnumValueObject {
            enum_name: Rc::from("Role"),
            name: Rc::from("ADMIN"),
            value: Rc::from("other"),
        }));
        assert!(values_equal(&a, &b));
    }
}
