//! Embedder-facing entry point: configure an interpreter, run sources, and
//! get public exceptions back.

use std::{
    borrow::Cow,
    cell::RefCell,
    fs,
    path::Path,
    rc::Rc,
};

use crate::{
    diagnostics::Exception,
    exceptions::ExcType,
    interp::Interpreter,
    io::PrintWriter,
    parse,
    resource::ResourceLimits,
    value::Value,
};

/// A `PrintWriter` over a shared buffer so the runner can hand output back
/// after execution.
#[derive(Debug, Default)]
struct BufferPrint(Rc<RefCell<String>>);

impl PrintWriter for BufferPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception> {
        self.0.borrow_mut().push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> Result<(), Exception> {
        self.0.borrow_mut().push(end);
        Ok(())
    }
}

/// Drives parse + execute over a configured interpreter.
///
/// The default runner prints to stdout; `capturing()` collects output into a
/// buffer readable with [`Runner::take_output`]. One runner keeps one
/// interpreter alive, so module caches and globals persist across runs.
pub struct Runner {
    interp: Interpreter,
    captured: Option<Rc<RefCell<String>>>,
}

impl Runner {
    #[must_use]
    pub fn new() -> Self {
        Self {
            interp: Interpreter::new(),
            captured: None,
        }
    }

    /// A runner that collects print output instead of writing to stdout.
    #[must_use]
    pub fn capturing() -> Self {
        let runner = Self::new();
        let buffer = Rc::new(RefCell::new(String::new()));
        runner.interp.set_printer(Box::new(BufferPrint(buffer.clone())));
        Self {
            captured: Some(buffer),
            ..runner
        }
    }

    /// Enables the default `__native__` host helpers (math/time).
    #[must_use]
    pub fn with_native_defaults(self) -> Self {
        crate::builtins::register_native_defaults(&self.interp);
        self
    }

    #[must_use]
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.interp.limits = limits;
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.interp.strict_types = strict;
        self
    }

    /// Queues non-interactive answers for `input()`, replacing any
    /// `MF_INPUTS`-derived buffer.
    pub fn feed_inputs<I, S>(&self, inputs: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let queued = inputs.into_iter().map(Into::into).collect();
        *self.interp.input_buffer.borrow_mut() = Some(queued);
    }

    #[must_use]
    pub fn interpreter(&self) -> &Interpreter {
        &self.interp
    }

    /// Takes the captured output, leaving the buffer empty.
    ///
    /// Returns an empty string for non-capturing runners.
    #[must_use]
    pub fn take_output(&self) -> String {
        match &self.captured {
            Some(buffer) => std::mem::take(&mut *buffer.borrow_mut()),
            None => String::new(),
        }
    }

    /// Parses and executes a source string. The result is the value of the
    /// last top-level statement.
    pub fn run_source(&self, source: &str, file: &str) -> Result<Value, Exception> {
        let program = parse::parse(source, file)?;
        self.interp.run_program_public(&program)
    }

    /// Reads, parses and executes a `.mp` file.
    pub fn run_path(&self, path: impl AsRef<Path>) -> Result<Value, Exception> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|err| {
            let mut exc = Exception::new(
                ExcType::IoError,
                format!("Failed to read '{}'", path.display()),
            );
            exc.cause = Some(err.to_string());
            exc
        })?;
        self.run_source(&source, &path.to_string_lossy())
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}
