//! Output plumbing for the `print`/`sout` builtins.

use std::{
    borrow::Cow,
    io::{self, Write as _},
};

use crate::diagnostics::Exception;

/// Trait for handling output from the `print()` builtin function.
///
/// Implement this trait to capture or redirect print output from embedded
/// Corplang code. The default implementation `StdPrint` writes to stdout.
pub trait PrintWriter {
    /// Called once for each formatted argument passed to `print()`.
    ///
    /// This method is responsible for writing only the given argument's text;
    /// separators (spaces) and the final newline are emitted via
    /// [`Self::stdout_push`].
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception>;

    /// Add a single character to stdout.
    ///
    /// Generally called to add spaces and newlines within print output.
    fn stdout_push(&mut self, end: char) -> Result<(), Exception>;
}

/// Default `PrintWriter` that writes to stdout, line-buffered.
#[derive(Debug, Default)]
pub struct StdPrint {
    buffer: String,
}

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception> {
        self.buffer.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> Result<(), Exception> {
        self.buffer.push(end);
        if end == '\n' {
            let _ = io::stdout().write_all(self.buffer.as_bytes());
            let _ = io::stdout().flush();
            self.buffer.clear();
        }
        Ok(())
    }
}

impl Drop for StdPrint {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            let _ = io::stdout().write_all(self.buffer.as_bytes());
            let _ = io::stdout().flush();
        }
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// Useful for testing or capturing print output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> Result<(), Exception> {
        self.0.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> Result<(), Exception> {
        self.0.push(end);
        Ok(())
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) -> Result<(), Exception> {
        Ok(())
    }

    fn stdout_push(&mut self, _end: char) -> Result<(), Exception> {
        Ok(())
    }
}
