//! Interpreter core: the executor registry, execution contexts, the
//! language-level call stack, and the function-call protocol.
//!
//! Executors are stateless functions keyed by `NodeTag`; the interpreter
//! resolves one per node at execution time, pushes a diagnostics frame, and
//! delegates. `return`/`break`/`continue` travel as `Flow` values and are
//! intercepted by the construct that owns them; whatever escapes to the top
//! level is converted to a `SyntaxError`.

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    path::PathBuf,
    rc::Rc,
};

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};

use crate::{
    ast::{CodeLoc, FunctionDef, Node, NodeTag, Param},
    diagnostics::{Exception, StackFrame},
    env::Environment,
    exceptions::{ExcType, ExecResult, Flow, RunError, RunResult},
    io::{PrintWriter, StdPrint},
    modules,
    resource::ResourceLimits,
    tracer::{ExecTracer, NoopTracer, StderrTracer},
    types,
    value::{
        AwaitableCallee, AwaitableObject, BoundMethod, CallValues, ClassObject, InstanceObject, ModuleNamespace,
        SuperBinding, Value,
    },
};

/// An executor evaluates nodes of one AST variant.
pub type Executor = fn(&Interpreter, &Node, &ExecContext) -> ExecResult;

/// Host callables reachable through the `__native__` builtin.
pub type NativeFn = fn(&[Value]) -> RunResult<Value>;

/// Per-invocation execution state: the lexical environment plus the flags the
/// class/async machinery consults.
///
/// A context is spawned per function call and per lexical block that
/// introduces bindings (`with`, `for`, `catch`).
#[derive(Debug)]
pub struct ExecContext {
    pub env: Rc<Environment>,
    pub current_file: Rc<str>,
    /// Whether we are inside an async function body.
    pub is_async: bool,
    /// Set transiently while the operand of an `await` is being evaluated,
    /// so async calls under `await` are legal from sync contexts.
    pub awaiting: Cell<bool>,
    /// The class whose code is currently executing, for private-member checks.
    pub scope_owner: Option<Rc<str>>,
    /// The instance whose method is currently executing.
    pub current_instance: Option<Rc<InstanceObject>>,
}

impl ExecContext {
    #[must_use]
    pub fn root(env: Rc<Environment>, current_file: Rc<str>) -> Self {
        Self {
            env,
            current_file,
            is_async: false,
            awaiting: Cell::new(false),
            scope_owner: None,
            current_instance: None,
        }
    }

    /// A child context with a fresh environment parented to this one.
    #[must_use]
    pub fn child(&self) -> Self {
        self.with_env(Environment::child(&self.env))
    }

    /// A context over `env` inheriting this context's flags.
    #[must_use]
    pub fn with_env(&self, env: Rc<Environment>) -> Self {
        Self {
            env,
            current_file: self.current_file.clone(),
            is_async: self.is_async,
            awaiting: Cell::new(false),
            scope_owner: self.scope_owner.clone(),
            current_instance: self.current_instance.clone(),
        }
    }

    /// Private members are accessible when the executing scope belongs to the
    /// declaring class, or the access targets the currently bound instance.
    #[must_use]
    pub fn can_access_private_member(&self, owner_class: &str, instance: Option<&Rc<InstanceObject>>) -> bool {
        if self.scope_owner.as_deref() == Some(owner_class) {
            return true;
        }
        match (instance, &self.current_instance) {
            (Some(target), Some(current)) => Rc::ptr_eq(target, current),
            _ => false,
        }
    }
}

/// One record on the language-level call stack.
///
/// The environment reference is kept so a raise can summarise locals without
/// cloning scopes on every push.
#[derive(Debug)]
struct FrameRecord {
    file: Rc<str>,
    line: u32,
    column: u32,
    function: Rc<str>,
    env: Option<Rc<Environment>>,
}

impl FrameRecord {
    fn to_public(&self) -> StackFrame {
        let mut frame = StackFrame::new(self.file.to_string(), self.line, self.column, self.function.to_string());
        if let Some(env) = &self.env {
            for (name, value) in env.variables.borrow().iter() {
                if frame.locals.len() >= 3 {
                    break;
                }
                if value.is_callable() || matches!(value, Value::Module(_) | Value::Class(_)) {
                    continue;
                }
                let mut repr = value.repr();
                if repr.len() > 40 {
                    repr.truncate(37);
                    repr.push_str("...");
                }
                frame.locals.push((name.to_string(), repr));
            }
        }
        frame
    }
}

/// Pops the interpreter's top frame on scope exit, whatever the exit path.
struct FrameGuard<'a> {
    interp: &'a Interpreter,
    is_call: bool,
}

impl Drop for FrameGuard<'_> {
    fn drop(&mut self) {
        self.interp.call_stack.borrow_mut().pop();
        if self.is_call {
            self.interp.fn_depth.set(self.interp.fn_depth.get().saturating_sub(1));
        }
    }
}

/// The tree-walking interpreter.
pub struct Interpreter {
    pub globals: Rc<Environment>,
    registry: RefCell<HashMap<NodeTag, Executor>>,
    call_stack: RefCell<Vec<FrameRecord>>,
    fn_depth: Cell<usize>,
    pub limits: ResourceLimits,
    pub strict_types: bool,
    pub show_internal_diagnostics: bool,
    pub printer: RefCell<Box<dyn PrintWriter>>,
    pub tracer: RefCell<Box<dyn ExecTracer>>,
    trace_enabled: bool,
    pub(crate) native_registry: RefCell<HashMap<String, NativeFn>>,
    pub(crate) native_enabled: Cell<bool>,
    pub(crate) module_cache: RefCell<HashMap<String, Rc<ModuleNamespace>>>,
    pub(crate) module_loading: RefCell<HashSet<String>>,
    pub(crate) stdlib_override: Option<PathBuf>,
    pub(crate) input_buffer: RefCell<Option<VecDeque<String>>>,
}

impl Interpreter {
    #[must_use]
    pub fn new() -> Self {
        let strict_types = std::env::var("CORPLANG_STRICT").is_ok_and(|v| v != "0" && !v.is_empty());
        let trace_enabled = std::env::var("CORPLANG_DEBUG").is_ok_and(|v| v != "0" && !v.is_empty());
        let tracer: Box<dyn ExecTracer> = if trace_enabled {
            Box::new(StderrTracer)
        } else {
            Box::new(NoopTracer)
        };
        let stdlib_override = std::env::var("CORPLANG_STDLIB_PATH").ok().map(PathBuf::from);

        let interp = Self {
            globals: Environment::new(),
            registry: RefCell::new(HashMap::new()),
            call_stack: RefCell::new(Vec::new()),
            fn_depth: Cell::new(0),
            limits: ResourceLimits::default(),
            strict_types,
            show_internal_diagnostics: false,
            printer: RefCell::new(Box::new(StdPrint::default())),
            tracer: RefCell::new(tracer),
            trace_enabled,
            native_registry: RefCell::new(HashMap::new()),
            native_enabled: Cell::new(false),
            module_cache: RefCell::new(HashMap::new()),
            module_loading: RefCell::new(HashSet::new()),
            stdlib_override,
            input_buffer: RefCell::new(None),
        };
        crate::exec::register_defaults(&interp);
        crate::builtins::setup_builtins(&interp);
        interp
    }

    /// Wires an executor for one AST variant. Registering the same variant
    /// twice is an error (no silent overwrite).
    pub fn register_executor(&self, tag: NodeTag, executor: Executor) -> RunResult<()> {
        let mut registry = self.registry.borrow_mut();
        if registry.contains_key(&tag) {
            return Err(RunError::internal(format!("Executor already registered for {tag}")));
        }
        registry.insert(tag, executor);
        Ok(())
    }

    pub(crate) fn register_default(&self, tag: NodeTag, executor: Executor) {
        self.registry.borrow_mut().insert(tag, executor);
    }

    /// Swaps the print writer, returning the previous one.
    pub fn set_printer(&self, printer: Box<dyn PrintWriter>) -> Box<dyn PrintWriter> {
        std::mem::replace(&mut *self.printer.borrow_mut(), printer)
    }

    /// Registers a host callable for `__native__` and enables the builtin.
    pub fn register_native(&self, path: impl Into<String>, func: NativeFn) {
        self.native_registry.borrow_mut().insert(path.into(), func);
        self.native_enabled.set(true);
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Executes one node through the registry.
    pub fn execute(&self, node: &Node, ctx: &ExecContext) -> ExecResult {
        let Some(executor) = self.registry.borrow().get(&node.tag()).copied() else {
            return Err(RunError::internal(format!(
                "No executor registered for node type {}",
                node.tag()
            )));
        };

        if self.trace_enabled {
            self.tracer.borrow_mut().on_enter(node.tag(), node.loc);
        }

        let _guard = self.push_node_frame(node, ctx);
        let mut result = executor(self, node, ctx);
        if let Err(RunError::Exc(exc)) = &mut result {
            if exc.stack.is_empty() {
                exc.stack = self.snapshot_stack();
            }
            if self.trace_enabled {
                self.tracer.borrow_mut().on_raise(&exc.message, node.loc);
            }
        }
        result
    }

    /// Evaluates an expression node, expecting a plain value.
    pub fn eval(&self, node: &Node, ctx: &ExecContext) -> RunResult<Value> {
        match self.execute(node, ctx)? {
            Flow::Normal(value) => Ok(value),
            Flow::Return(_) => Err(ExcType::syntax_error("Return statement outside of function")),
            Flow::Break => Err(ExcType::syntax_error("'break' outside loop")),
            Flow::Continue => Err(ExcType::syntax_error("'continue' outside loop")),
        }
    }

    /// Runs statements in order; the first non-normal flow short-circuits.
    /// The normal result is the value of the last statement.
    pub fn execute_block(&self, statements: &[Node], ctx: &ExecContext) -> ExecResult {
        let mut last = Value::Null;
        for stmt in statements {
            match self.execute(stmt, ctx)? {
                Flow::Normal(value) => last = value,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(last))
    }

    /// Entry point for whole programs: stray control flow becomes a
    /// `SyntaxError` here.
    pub fn run_program(&self, program: &Node) -> RunResult<Value> {
        let module_env = Environment::child(&self.globals);
        let ctx = ExecContext::root(module_env, program.file.clone());
        match self.execute(program, &ctx)? {
            Flow::Normal(value) => Ok(value),
            Flow::Return(_) => Err(ExcType::syntax_error("Return statement outside of function")),
            Flow::Break => Err(ExcType::syntax_error("'break' outside loop")),
            Flow::Continue => Err(ExcType::syntax_error("'continue' outside loop")),
        }
    }

    /// Runs a program and converts failures to the public exception type.
    pub fn run_program_public(&self, program: &Node) -> Result<Value, Exception> {
        self.run_program(program).map_err(RunError::into_public)
    }

    // ------------------------------------------------------------------
    // Frames
    // ------------------------------------------------------------------

    /// Pushes a transient frame for the exact node being executed, so raise
    /// snapshots carry the most precise source position available.
    fn push_node_frame(&self, node: &Node, ctx: &ExecContext) -> FrameGuard<'_> {
        self.call_stack.borrow_mut().push(FrameRecord {
            file: node.file.clone(),
            line: node.loc.line,
            column: node.loc.column,
            function: node.frame_name(),
            env: Some(ctx.env.clone()),
        });
        FrameGuard {
            interp: self,
            is_call: false,
        }
    }

    fn push_call_frame(&self, def: &FunctionDef, env: &Rc<Environment>) -> RunResult<FrameGuard<'_>> {
        self.limits.check_recursion_depth(self.fn_depth.get())?;
        self.fn_depth.set(self.fn_depth.get() + 1);
        self.call_stack.borrow_mut().push(FrameRecord {
            file: def.file.clone(),
            line: def.loc.line,
            column: def.loc.column,
            function: Rc::from(def.display_name()),
            env: Some(env.clone()),
        });
        Ok(FrameGuard {
            interp: self,
            is_call: true,
        })
    }

    /// A sanitized snapshot of the current call stack, most recent last.
    #[must_use]
    pub fn snapshot_stack(&self) -> Vec<StackFrame> {
        self.call_stack.borrow().iter().map(FrameRecord::to_public).collect()
    }

    // ------------------------------------------------------------------
    // Call protocol
    // ------------------------------------------------------------------

    /// Calls any callable value with already-evaluated arguments.
    pub fn call_value(&self, callee: &Value, args: CallValues, ctx: &ExecContext, loc: CodeLoc) -> RunResult<Value> {
        match callee {
            Value::Function(func) => self.call_function(&func.def, &func.closure, args, ctx, None, None),
            Value::Builtin(builtin) => (builtin.func)(self, ctx, args),
            Value::BoundMethod(bound) => self.call_method(bound, args, ctx),
            Value::Class(class) => self.construct(class, args, Vec::new(), ctx),
            Value::Super(binding) => self.call_super(binding, args, ctx),
            Value::NativeMethod(method) => crate::exec::natives::call_native_method(self, method.as_ref(), args, ctx),
            other => Err(ExcType::type_error(format!(
                "Not a function: {} (line {}, col {})",
                other.repr(),
                loc.line,
                loc.column
            ))),
        }
    }

    /// The user-function call protocol: bind, spawn, frame, execute.
    pub fn call_function(
        &self,
        def: &Rc<FunctionDef>,
        closure: &Rc<Environment>,
        args: CallValues,
        ctx: &ExecContext,
        this: Option<Rc<InstanceObject>>,
        class_ref: Option<Rc<ClassObject>>,
    ) -> RunResult<Value> {
        let bound = self.bind_params(def, args)?;

        let env = Environment::child(closure);
        for (name, value) in bound {
            env.define(name, value, None);
        }
        if let Some(inst) = &this {
            env.define(Rc::from("this"), Value::Instance(inst.clone()), None);
        }
        if let Some(class) = &class_ref {
            env.define(class.name.clone(), Value::Class(class.clone()), None);
        }

        let child = ExecContext {
            env: env.clone(),
            current_file: def.file.clone(),
            is_async: def.is_async,
            awaiting: Cell::new(false),
            scope_owner: class_ref.as_ref().map(|c| c.name.clone()),
            current_instance: this,
        };
        // ctx carries no bindings into the callee; the closure chain does.
        let _ = ctx;

        let _guard = self.push_call_frame(def, &env)?;
        match self.execute_block(&def.body, &child)? {
            Flow::Normal(value) | Flow::Return(value) => Ok(value),
            Flow::Break => Err(ExcType::syntax_error("'break' outside loop")),
            Flow::Continue => Err(ExcType::syntax_error("'continue' outside loop")),
        }
    }

    /// Calls a bound (or static) method with `this`/class scope set up.
    pub fn call_method(&self, bound: &BoundMethod, args: CallValues, ctx: &ExecContext) -> RunResult<Value> {
        let closure = bound.class.env.clone();
        self.call_function(
            &bound.method.def,
            &closure,
            args,
            ctx,
            bound.instance.clone(),
            Some(bound.class.clone()),
        )
    }

    /// Instantiates a class: field initializers down the chain, then the
    /// constructor. Errors from either propagate unmasked.
    pub fn construct(
        &self,
        class: &Rc<ClassObject>,
        args: CallValues,
        type_args: Vec<crate::ast::TypeExpr>,
        ctx: &ExecContext,
    ) -> RunResult<Value> {
        let instance = Rc::new(InstanceObject::new(class.clone()));
        *instance.generics.borrow_mut() = type_args;

        // Initializers run against the declaring class's definition scope;
        // the most-derived declaration wins for shadowed names.
        let mut current = Some(class.clone());
        while let Some(cls) = current {
            let field_ctx = ExecContext {
                env: cls.env.clone(),
                current_file: cls.def.file.clone(),
                is_async: false,
                awaiting: Cell::new(false),
                scope_owner: Some(cls.name.clone()),
                current_instance: Some(instance.clone()),
            };
            for (name, field) in &cls.instance_fields {
                if instance.fields.borrow().contains_key(name) {
                    continue;
                }
                if let Some(init) = &field.value {
                    let value = self.eval(init, &field_ctx)?;
                    instance.fields.borrow_mut().insert(name.clone(), value);
                }
            }
            current = cls.parent.borrow().clone();
        }

        if let Some((method, declaring)) = ClassObject::find_method(class, "constructor") {
            let bound = BoundMethod {
                instance: Some(instance.clone()),
                method,
                class: declaring,
            };
            self.call_method(&bound, args, ctx)?;
        } else if !args.positional.is_empty() || !args.named.is_empty() {
            return Err(ExcType::type_error(format!(
                "Class '{}' has no constructor but was given arguments",
                class.name
            )));
        }

        Ok(Value::Instance(instance))
    }

    /// `super(…)`: invokes the immediate parent's constructor bound to the
    /// current instance; a no-op when there is no parent or no constructor.
    pub fn call_super(&self, binding: &SuperBinding, args: CallValues, ctx: &ExecContext) -> RunResult<Value> {
        let Some(parent) = &binding.parent else {
            return Ok(Value::Null);
        };
        let Some(method) = parent.instance_methods.get("constructor").cloned() else {
            return Ok(Value::Null);
        };
        let bound = BoundMethod {
            instance: Some(binding.instance.clone()),
            method,
            class: parent.clone(),
        };
        self.call_method(&bound, args, ctx)
    }

    /// Reduces an awaitable to a value by executing its captured call.
    /// Single-shot: a second drive is a runtime error.
    pub fn drive_awaitable(&self, awaitable: &Rc<AwaitableObject>, ctx: &ExecContext) -> RunResult<Value> {
        if awaitable.driven.replace(true) {
            return Err(ExcType::runtime_error("awaitable already driven"));
        }
        let args = awaitable.args.borrow_mut().take().unwrap_or_default();
        match &awaitable.callee {
            AwaitableCallee::Function(func) => self.call_function(&func.def, &func.closure, args, ctx, None, None),
            AwaitableCallee::Method(bound) => self.call_method(bound, args, ctx),
        }
    }

    /// Binds call arguments to parameters: positional, then named, then
    /// defaults (evaluated in the interpreter's root context). A trailing
    /// parameter literally named `kwargs` captures leftover named arguments.
    fn bind_params(&self, def: &Rc<FunctionDef>, args: CallValues) -> RunResult<Vec<(Rc<str>, Value)>> {
        let mut params: &[Param] = &def.params;
        let kw_catcher = match params.last() {
            Some(last) if &*last.name == "kwargs" => {
                params = &params[..params.len() - 1];
                true
            }
            _ => false,
        };

        if args.positional.len() > params.len() {
            return Err(ExcType::type_error(format!(
                "Too many positional arguments: expected {}, got {}",
                params.len(),
                args.positional.len()
            )));
        }

        let mut named: Vec<(Rc<str>, Value)> = Vec::new();
        for (name, value) in args.named {
            if named.iter().any(|(existing, _)| existing == &name) {
                return Err(ExcType::type_error(format!(
                    "Argument '{name}' specified multiple times"
                )));
            }
            named.push((name, value));
        }

        let mut bound: Vec<(Rc<str>, Value)> = Vec::with_capacity(def.params.len());
        let mut positional = args.positional.into_iter();
        for param in params {
            if let Some(value) = positional.next() {
                if named.iter().any(|(name, _)| name == &param.name) {
                    return Err(ExcType::type_error(format!(
                        "Argument '{}' specified by position and by name",
                        param.name
                    )));
                }
                bound.push((param.name.clone(), value));
                continue;
            }
            if let Some(pos) = named.iter().position(|(name, _)| name == &param.name) {
                let (_, value) = named.remove(pos);
                bound.push((param.name.clone(), value));
                continue;
            }
            if let Some(default) = &param.default {
                let root_ctx = ExecContext::root(self.globals.clone(), def.file.clone());
                let value = self.eval(default, &root_ctx)?;
                bound.push((param.name.clone(), value));
                continue;
            }
            return Err(ExcType::type_error(format!(
                "Missing required argument '{}'",
                param.name
            )));
        }

        if kw_catcher {
            let mut map = crate::value::OrderedMap::default();
            for (name, value) in named.drain(..) {
                map.insert(crate::value::MapKey::Str(name), value);
            }
            bound.push((Rc::from("kwargs"), Value::map(map)));
        } else if !named.is_empty() {
            let mut unexpected: Vec<String> = named.iter().map(|(name, _)| name.to_string()).collect();
            unexpected.sort();
            return Err(ExcType::type_error(format!(
                "Unexpected argument(s): {}",
                unexpected.join(", ")
            )));
        }

        Ok(bound)
    }

    // ------------------------------------------------------------------
    // Helpers shared by executors and builtins
    // ------------------------------------------------------------------

    /// Renders a value for user-facing output, honouring `toString()` on
    /// instances.
    pub fn display_value(&self, value: &Value, ctx: &ExecContext) -> RunResult<String> {
        if let Value::Instance(instance) = value {
            if let Some((method, class)) = ClassObject::find_method(&instance.class, "toString") {
                let bound = BoundMethod {
                    instance: Some(instance.clone()),
                    method,
                    class,
                };
                if let Value::Str(rendered) = self.call_method(&bound, CallValues::default(), ctx)? {
                    return Ok(rendered.to_string());
                }
            }
        }
        Ok(value.to_string())
    }

    /// Enforces a declared annotation in strict mode.
    pub fn strict_type_check(
        &self,
        name: &str,
        value: &Value,
        annotation: &crate::ast::TypeExpr,
        ctx: &ExecContext,
    ) -> RunResult<()> {
        if !self.strict_types {
            return Ok(());
        }
        if types::matches_type(value, annotation, &ctx.env) {
            return Ok(());
        }
        Err(ExcType::type_error(format!(
            "Type mismatch for variable '{name}': expected {annotation}, got {}",
            value.type_name()
        )))
    }

    /// Module import front door; see `modules` for resolution and caching.
    pub fn import_module(&self, name: &str, current_file: Option<&str>) -> RunResult<Rc<ModuleNamespace>> {
        modules::import_module(self, name, current_file)
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}
