//! The abstract syntax tree executed by the interpreter.
//!
//! Nodes form a tagged sum (`NodeVariant`) wrapped with source position data.
//! The `NodeTag` discriminant enum (strum-derived) is the key the executor
//! registry dispatches on. Diagnostics locate nodes through the interpreter's
//! frame stack rather than parent back-pointers, keeping the tree acyclic.

use std::{fmt, rc::Rc};

use strum::{Display, EnumDiscriminants};

/// Line/column position of a node within its source file (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct CodeLoc {
    pub line: u32,
    pub column: u32,
}

impl CodeLoc {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A parsed type annotation, e.g. `int`, `List<string>`, `int|float`.
///
/// Unions are represented with base `Union` and the variants as `args`;
/// `Display` prints them back with `|` for readability.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub base: Rc<str>,
    pub args: Vec<TypeExpr>,
}

impl TypeExpr {
    pub fn simple(base: impl Into<Rc<str>>) -> Self {
        Self {
            base: base.into(),
            args: Vec::new(),
        }
    }

    pub fn is_union(&self) -> bool {
        &*self.base == "Union" && !self.args.is_empty()
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            return write!(f, "{}", self.base);
        }
        if self.is_union() {
            let mut first = true;
            for arg in &self.args {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{arg}")?;
                first = false;
            }
            return Ok(());
        }
        write!(f, "{}<", self.base)?;
        let mut first = true;
        for arg in &self.args {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
            first = false;
        }
        write!(f, ">")
    }
}

/// Binary operators in precedence-ladder order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    NotEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">=")]
    GtEq,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "not")]
    Not,
}

/// Literal payloads; the parser classifies `Number` tokens into int vs float.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Bool(bool),
}

/// One function/method/lambda parameter.
#[derive(Debug)]
pub struct Param {
    pub name: Rc<str>,
    pub annotation: Option<TypeExpr>,
    pub default: Option<Node>,
}

/// A function, method, or lambda definition shared between the AST and the
/// runtime function value (the closure holds an `Rc` to this).
#[derive(Debug)]
pub struct FunctionDef {
    /// None for lambdas.
    pub name: Option<Rc<str>>,
    pub params: Vec<Param>,
    pub return_type: Option<TypeExpr>,
    pub generic_params: Vec<Rc<str>>,
    pub is_async: bool,
    pub docstring: Option<Rc<str>>,
    pub body: Vec<Node>,
    pub loc: CodeLoc,
    pub file: Rc<str>,
}

impl FunctionDef {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<lambda>")
    }
}

/// A method inside a class body: a function plus member modifiers.
///
/// The inner definition is `Rc`-shared with bound-method values.
#[derive(Debug)]
pub struct MethodDef {
    pub def: Rc<FunctionDef>,
    pub is_private: bool,
    pub is_static: bool,
    pub is_abstract: bool,
}

/// A field inside a class body.
#[derive(Debug)]
pub struct FieldDef {
    pub name: Rc<str>,
    pub annotation: Option<TypeExpr>,
    pub value: Option<Node>,
    pub is_private: bool,
    pub is_static: bool,
    pub loc: CodeLoc,
    pub file: Rc<str>,
}

#[derive(Debug)]
pub enum ClassMember {
    Method(Rc<MethodDef>),
    Field(Rc<FieldDef>),
}

/// A `class` or `driver` declaration.
#[derive(Debug)]
pub struct ClassDef {
    pub name: Rc<str>,
    pub extends: Option<TypeExpr>,
    pub implements: Vec<TypeExpr>,
    pub generic_params: Vec<Rc<str>>,
    pub is_driver: bool,
    pub docstring: Option<Rc<str>>,
    pub members: Vec<ClassMember>,
    pub loc: CodeLoc,
    pub file: Rc<str>,
}

/// An `interface` or `contract` declaration: named method signatures only.
#[derive(Debug)]
pub struct InterfaceDef {
    pub name: Rc<str>,
    pub extends: Vec<Rc<str>>,
    pub generic_params: Vec<Rc<str>>,
    pub methods: Vec<Rc<MethodDef>>,
    pub loc: CodeLoc,
    pub file: Rc<str>,
}

/// An `enum` declaration. Member values default to the lowercased name.
#[derive(Debug)]
pub struct EnumDef {
    pub name: Rc<str>,
    pub members: Vec<(Rc<str>, Rc<str>)>,
    pub loc: CodeLoc,
    pub file: Rc<str>,
}

/// A call-site argument, positional or named (`name = value` / `name: value`).
#[derive(Debug)]
pub struct CallArg {
    pub name: Option<Rc<str>>,
    pub value: Node,
}

/// One `catch (e: Type)` clause. Untyped catches are rejected at parse time.
#[derive(Debug)]
pub struct CatchClause {
    pub exception_type: TypeExpr,
    pub variable: Option<Rc<str>>,
    pub body: Vec<Node>,
    pub loc: CodeLoc,
}

/// One manager in a `with (expr as name, …)` header.
#[derive(Debug)]
pub struct WithItem {
    pub expr: Node,
    pub target: Option<Rc<str>>,
}

/// A piece of an f-string: literal text or an embedded expression.
#[derive(Debug)]
pub enum FStringPart {
    Text(Rc<str>),
    Expr(Box<Node>),
}

/// The tagged node sum. `NodeTag` is derived for registry dispatch.
#[derive(Debug, EnumDiscriminants)]
#[strum_discriminants(name(NodeTag), derive(Hash, Display))]
pub enum NodeVariant {
    Program {
        docstring: Option<Rc<str>>,
        statements: Vec<Node>,
    },

    // Declarations
    Var {
        name: Rc<str>,
        annotation: Option<TypeExpr>,
        value: Box<Node>,
    },
    Function(Rc<FunctionDef>),
    Class(Rc<ClassDef>),
    Interface(Rc<InterfaceDef>),
    Contract(Rc<InterfaceDef>),
    Enum(Rc<EnumDef>),
    Import {
        module: Rc<str>,
    },
    FromImport {
        module: Rc<str>,
        items: Vec<(Rc<str>, Option<Rc<str>>)>,
    },
    ModelDecl {
        name: Rc<str>,
    },
    MigrationDecl {
        name: Rc<str>,
    },
    AgentDecl {
        name: Rc<str>,
    },

    // Expressions
    Literal(Literal),
    NullLiteral,
    Identifier {
        name: Rc<str>,
    },
    GenericIdentifier {
        name: Rc<str>,
        args: Vec<TypeExpr>,
    },
    BinaryOp {
        op: BinOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    UnaryOp {
        op: UnOp,
        operand: Box<Node>,
    },
    Ternary {
        condition: Box<Node>,
        then_expr: Box<Node>,
        else_expr: Box<Node>,
    },
    Assignment {
        target: Box<Node>,
        value: Box<Node>,
    },
    FunctionCall {
        callee: Box<Node>,
        args: Vec<CallArg>,
    },
    PropertyAccess {
        object: Box<Node>,
        property: Rc<str>,
    },
    IndexAccess {
        object: Box<Node>,
        index: Box<Node>,
    },
    New {
        class_name: Rc<str>,
        type_args: Vec<TypeExpr>,
        args: Vec<CallArg>,
    },
    This,
    Super,
    Lambda(Rc<FunctionDef>),
    Await {
        expr: Box<Node>,
    },
    InterpolatedString {
        parts: Vec<FStringPart>,
    },
    JsonObject {
        entries: Vec<(Rc<str>, Node)>,
    },
    JsonArray {
        items: Vec<Node>,
    },

    // Statements
    If {
        condition: Box<Node>,
        then_branch: Vec<Node>,
        else_branch: Option<Vec<Node>>,
    },
    While {
        condition: Box<Node>,
        body: Vec<Node>,
    },
    For {
        init: Option<Box<Node>>,
        condition: Option<Box<Node>>,
        update: Option<Box<Node>>,
        body: Vec<Node>,
    },
    ForIn {
        variable: Rc<str>,
        iterable: Box<Node>,
        body: Vec<Node>,
    },
    ForOf {
        variable: Rc<str>,
        iterable: Box<Node>,
        body: Vec<Node>,
    },
    Return {
        value: Option<Box<Node>>,
    },
    Break,
    Continue,
    Try {
        body: Vec<Node>,
        catches: Vec<CatchClause>,
        finally: Option<Vec<Node>>,
    },
    Throw {
        expr: Box<Node>,
    },
    With {
        items: Vec<WithItem>,
        body: Vec<Node>,
    },
    Delete {
        target: Box<Node>,
    },
    Loop {
        body: Vec<Node>,
        /// True for the `loop stdin using Agent` interaction form.
        uses_adapter: bool,
    },
    Serve {
        adapter: Rc<str>,
        name: Rc<str>,
    },
    StopServer {
        target: Rc<str>,
    },
    /// Statement-level `await handle;` for a server handle; a no-op without
    /// the external server runtime.
    ServerAwait {
        target: Rc<str>,
    },
}

/// An AST node: a variant plus the position of the source that produced it.
#[derive(Debug)]
pub struct Node {
    pub variant: NodeVariant,
    pub loc: CodeLoc,
    pub file: Rc<str>,
}

impl Node {
    pub fn new(variant: NodeVariant, loc: CodeLoc, file: Rc<str>) -> Self {
        Self { variant, loc, file }
    }

    pub fn tag(&self) -> NodeTag {
        NodeTag::from(&self.variant)
    }

    /// Short human-readable name used for frame labels in diagnostics.
    pub fn frame_name(&self) -> Rc<str> {
        match &self.variant {
            NodeVariant::Program { .. } => Rc::from("<module>"),
            NodeVariant::Function(def) | NodeVariant::Lambda(def) => Rc::from(def.display_name()),
            NodeVariant::Class(def) => def.name.clone(),
            NodeVariant::FunctionCall { callee, .. } => match &callee.variant {
                NodeVariant::Identifier { name } => name.clone(),
                NodeVariant::PropertyAccess { property, .. } => property.clone(),
                _ => Rc::from("FunctionCall"),
            },
            other => Rc::from(NodeTag::from(other).to_string().as_str()),
        }
    }

    /// Pretty-prints expression nodes back to surface syntax.
    ///
    /// Covers the expression grammar (the round-trip guarantee holds for
    /// expressions); statements print a placeholder form that is not intended
    /// to re-parse.
    pub fn pretty(&self) -> String {
        match &self.variant {
            NodeVariant::Literal(Literal::Int(v)) => v.to_string(),
            NodeVariant::Literal(Literal::Float(v)) => {
                let mut buf = ryu::Buffer::new();
                buf.format(*v).to_string()
            }
            NodeVariant::Literal(Literal::Str(s)) => format!("{s:?}"),
            NodeVariant::Literal(Literal::Bool(b)) => b.to_string(),
            NodeVariant::NullLiteral => "null".to_string(),
            NodeVariant::Identifier { name } => name.to_string(),
            NodeVariant::GenericIdentifier { name, args } => {
                let inner: Vec<String> = args.iter().map(ToString::to_string).collect();
                format!("{name}<{}>", inner.join(", "))
            }
            NodeVariant::BinaryOp { op, left, right } => {
                format!("({} {op} {})", left.pretty(), right.pretty())
            }
            NodeVariant::UnaryOp { op, operand } => match op {
                UnOp::Neg => format!("(-{})", operand.pretty()),
                UnOp::Not => format!("(not {})", operand.pretty()),
            },
            NodeVariant::Ternary {
                condition,
                then_expr,
                else_expr,
            } => format!(
                "({} ? {} : {})",
                condition.pretty(),
                then_expr.pretty(),
                else_expr.pretty()
            ),
            NodeVariant::Assignment { target, value } => {
                format!("{} = {}", target.pretty(), value.pretty())
            }
            NodeVariant::FunctionCall { callee, args } => {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|a| match &a.name {
                        Some(name) => format!("{name} = {}", a.value.pretty()),
                        None => a.value.pretty(),
                    })
                    .collect();
                format!("{}({})", callee.pretty(), rendered.join(", "))
            }
            NodeVariant::PropertyAccess { object, property } => {
                format!("{}.{property}", object.pretty())
            }
            NodeVariant::IndexAccess { object, index } => {
                format!("{}[{}]", object.pretty(), index.pretty())
            }
            NodeVariant::New {
                class_name,
                type_args,
                args,
            } => {
                let generics = if type_args.is_empty() {
                    String::new()
                } else {
                    let inner: Vec<String> = type_args.iter().map(ToString::to_string).collect();
                    format!("<{}>", inner.join(", "))
                };
                let rendered: Vec<String> = args
                    .iter()
                    .map(|a| match &a.name {
                        Some(name) => format!("{name} = {}", a.value.pretty()),
                        None => a.value.pretty(),
                    })
                    .collect();
                format!("new {class_name}{generics}({})", rendered.join(", "))
            }
            NodeVariant::This => "this".to_string(),
            NodeVariant::Super => "super".to_string(),
            NodeVariant::Await { expr } => format!("await {}", expr.pretty()),
            NodeVariant::JsonArray { items } => {
                let rendered: Vec<String> = items.iter().map(Node::pretty).collect();
                format!("[{}]", rendered.join(", "))
            }
            NodeVariant::JsonObject { entries } => {
                let rendered: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", v.pretty()))
                    .collect();
                format!("{{{}}}", rendered.join(", "))
            }
            NodeVariant::InterpolatedString { parts } => {
                let mut out = String::from("f\"");
                for part in parts {
                    match part {
                        FStringPart::Text(text) => {
                            out.push_str(&text.replace('{', "{{").replace('}', "}}"));
                        }
                        FStringPart::Expr(expr) => {
                            out.push('{');
                            out.push_str(&expr.pretty());
                            out.push('}');
                        }
                    }
                }
                out.push('"');
                out
            }
            NodeVariant::Lambda(def) => {
                let params: Vec<String> = def.params.iter().map(|p| p.name.to_string()).collect();
                format!("fn ({}) {{ … }}", params.join(", "))
            }
            other => format!("<{}>", NodeTag::from(other)),
        }
    }
}
