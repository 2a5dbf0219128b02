//! Runtime error model: the closed exception taxonomy, the raise payload
//! carrying a language-level stack snapshot, and the `Flow` sum used by
//! executors for `return`/`break`/`continue`.

use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::{
    diagnostics::{Exception, StackFrame},
    value::Value,
};

/// Result type alias for operations that can produce a runtime error.
pub type RunResult<T> = Result<T, RunError>;

/// Exception kinds supported by the runtime.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string form matches the variant name exactly except
/// where a serialize override applies (e.g. `IoError` -> "IOError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// Base exception class - matches any raised value in typed catches.
    Exception,

    /// Operand or argument type mismatch, calling a non-function, calling
    /// async from sync without await.
    TypeError,
    /// Undefined variable, property, or key.
    ReferenceError,
    /// Malformed construct, `return` outside a function, bare `break` or
    /// `continue` at top level.
    SyntaxError,
    /// Restricted module import or private member access violation.
    SecurityError,

    // --- Kinds mapped from host failures or raised by user code ---
    ResourceError,
    MemoryError,
    #[strum(serialize = "IOError")]
    IoError,
    TimeoutError,
    ConcurrencyError,
    AssertionError,

    /// Catch-all for non-classified failures.
    RuntimeError,
    /// Host-origin failure wrapped with the cause preserved.
    InternalRuntimeError,
}

impl ExcType {
    /// Checks whether this kind is caught by a handler for `handler_type`.
    ///
    /// Matching is nominal: `Exception` is the base of every kind, and every
    /// other kind only matches itself. User-defined exception classes extend
    /// the hierarchy through the class parent chain (see `types`).
    #[must_use]
    pub fn is_subclass_of(self, handler_type: Self) -> bool {
        self == handler_type || handler_type == Self::Exception
    }

    /// Looks a kind up by the exception class names the stdlib uses.
    pub fn from_class_name(name: &str) -> Option<Self> {
        match name {
            "Exception" | "Error" | "RuntimeException" => Some(Self::Exception),
            "TypeError" => Some(Self::TypeError),
            "ReferenceError" => Some(Self::ReferenceError),
            "SyntaxError" => Some(Self::SyntaxError),
            "SecurityError" => Some(Self::SecurityError),
            "ResourceError" => Some(Self::ResourceError),
            "MemoryError" => Some(Self::MemoryError),
            "IOError" => Some(Self::IoError),
            "TimeoutError" => Some(Self::TimeoutError),
            "ConcurrencyError" => Some(Self::ConcurrencyError),
            "AssertionError" => Some(Self::AssertionError),
            "RuntimeError" => Some(Self::RuntimeError),
            "InternalRuntimeError" => Some(Self::InternalRuntimeError),
            _ => None,
        }
    }

    pub fn type_error(msg: impl fmt::Display) -> RunError {
        RaisedException::new(Self::TypeError, msg.to_string()).into()
    }

    pub fn reference_error(msg: impl fmt::Display) -> RunError {
        RaisedException::new(Self::ReferenceError, msg.to_string()).into()
    }

    pub fn syntax_error(msg: impl fmt::Display) -> RunError {
        RaisedException::new(Self::SyntaxError, msg.to_string()).into()
    }

    pub fn security_error(msg: impl fmt::Display) -> RunError {
        RaisedException::new(Self::SecurityError, msg.to_string()).into()
    }

    pub fn runtime_error(msg: impl fmt::Display) -> RunError {
        RaisedException::new(Self::RuntimeError, msg.to_string()).into()
    }

    pub fn undefined_variable(name: &str) -> RunError {
        RaisedException::new(Self::ReferenceError, format!("Undefined variable: {name}")).into()
    }
}

/// A raised exception in flight: kind, message, the original thrown value
/// (for `throw someInstance`), and the language-level stack snapshot captured
/// at the raise site.
#[derive(Debug, Clone)]
pub struct RaisedException {
    pub exc_type: ExcType,
    pub message: String,
    /// Class name for user-defined exception instances (`throw new MyError()`),
    /// used by typed catch matching alongside the class parent chain.
    pub custom_class_name: Option<String>,
    /// The thrown language value, preserved so `catch (e: T)` binds the same
    /// value the program threw.
    pub value: Option<Value>,
    /// Most-recent-last frames captured when the exception was raised.
    pub stack: Vec<StackFrame>,
    /// Host-origin error text for `InternalRuntimeError` wrapping.
    pub cause: Option<String>,
}

impl RaisedException {
    #[must_use]
    pub fn new(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self {
            exc_type,
            message: message.into(),
            custom_class_name: None,
            value: None,
            stack: Vec::new(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Converts to the public `Exception` for embedders and the formatter.
    #[must_use]
    pub fn into_public(self) -> Exception {
        Exception {
            kind: self.exc_type,
            message: self.message,
            stacktrace: self.stack,
            cause: self.cause,
        }
    }
}

impl fmt::Display for RaisedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.custom_class_name {
            Some(name) => write!(f, "{name}: {}", self.message),
            None => write!(f, "{}: {}", self.exc_type, self.message),
        }
    }
}

/// Runtime error types that can occur during execution.
///
/// Two variants:
/// - `Internal`: a bug in the interpreter itself (static message)
/// - `Exc`: a language exception that try/catch can match by type
#[derive(Debug)]
pub enum RunError {
    /// Internal interpreter error - indicates a bug in corplang, not user code.
    Internal(Cow<'static, str>),
    /// Catchable language exception (e.g. TypeError, ReferenceError).
    Exc(Box<RaisedException>),
}

impl RunError {
    pub fn internal(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Internal(msg.into())
    }

    /// Converts this runtime error to a public `Exception`.
    ///
    /// Internal errors come out as `InternalRuntimeError` with no traceback.
    #[must_use]
    pub fn into_public(self) -> Exception {
        match self {
            Self::Exc(exc) => exc.into_public(),
            Self::Internal(msg) => Exception {
                kind: ExcType::InternalRuntimeError,
                message: format!("Internal error in corplang: {msg}"),
                stacktrace: Vec::new(),
                cause: None,
            },
        }
    }

    /// Returns true if this error is a catchable exception of `exc_type`.
    pub fn is_exception_type(&self, exc_type: ExcType) -> bool {
        match self {
            Self::Exc(exc) => exc.exc_type == exc_type,
            Self::Internal(_) => false,
        }
    }
}

impl From<RaisedException> for RunError {
    fn from(exc: RaisedException) -> Self {
        Self::Exc(Box::new(exc))
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
            Self::Exc(exc) => write!(f, "{exc}"),
        }
    }
}

/// The outcome of executing one node.
///
/// `Return`/`Break`/`Continue` are ordinary values here, not errors: loops
/// intercept `Break`/`Continue`, the call protocol intercepts `Return`, and
/// anything that escapes to the top level is converted to a `SyntaxError`.
/// Only `throw` travels through `RunError`.
#[derive(Debug)]
pub enum Flow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

impl Flow {
    /// The carried value for `Normal`/`Return`, `Null` otherwise.
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Normal(v) | Self::Return(v) => v,
            Self::Break | Self::Continue => Value::Null,
        }
    }
}

/// Result of one executor invocation.
pub type ExecResult = Result<Flow, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_is_the_base_of_all_kinds() {
        assert!(ExcType::TypeError.is_subclass_of(ExcType::Exception));
        assert!(ExcType::SecurityError.is_subclass_of(ExcType::Exception));
        assert!(ExcType::Exception.is_subclass_of(ExcType::Exception));
        assert!(!ExcType::TypeError.is_subclass_of(ExcType::ReferenceError));
    }

    #[test]
    fn io_error_spells_like_the_language() {
        assert_eq!(ExcType::IoError.to_string(), "IOError");
        assert_eq!(ExcType::from_class_name("IOError"), Some(ExcType::IoError));
    }
}
