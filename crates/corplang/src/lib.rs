#![doc = include_str!("../../../README.md")]

mod ast;
mod builtins;
mod diagnostics;
mod env;
mod exceptions;
mod exec;
mod interp;
mod io;
mod lexer;
mod modules;
mod parse;
mod resource;
mod token;
mod tracer;
mod types;
mod value;

mod run;

pub use crate::{
    ast::{CodeLoc, Node, NodeTag, NodeVariant, TypeExpr},
    diagnostics::{format_exception, Exception, StackFrame},
    exceptions::{ExcType, ExecResult, Flow, RunError, RunResult},
    interp::{ExecContext, Executor, Interpreter, NativeFn},
    io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint},
    lexer::{tokenize, Lexer},
    parse::{parse, Parser, SyntaxError, TokenStream},
    resource::{ResourceError, ResourceLimits, DEFAULT_MAX_RECURSION_DEPTH},
    run::Runner,
    token::{Token, TokenKind},
    tracer::{ExecTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    types::{type_of_value, TypeObject},
    value::{values_equal, CallValues, ModuleNamespace, Value},
};
