//! Public exception surface and the diagnostics report formatter.
//!
//! The formatter emits, in order: the `Error<Kind>` header with a single-line
//! message, a most-recent-first list of `.mp` frames (source snippet and a
//! compact variables summary per frame), a root-cause block naming the deepest
//! precise frame, suggestions derived from the error kind, and - only when
//! internal diagnostics are enabled - the host cause.

use std::{fmt, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::exceptions::ExcType;

/// A record of a single call or node on the language-level stack.
///
/// `locals` is a compact pre-rendered summary (name, short repr) of the first
/// few non-function variables in scope when the frame was captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub function: String,
    #[serde(default)]
    pub locals: Vec<(String, String)>,
}

impl StackFrame {
    pub fn new(file: impl Into<String>, line: u32, column: u32, function: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            function: function.into(),
            locals: Vec::new(),
        }
    }
}

/// A language-level exception as seen by embedders.
///
/// `stacktrace` is the sanitized snapshot taken when the exception was raised,
/// most recent frame last. The host `cause` is retained for
/// `InternalRuntimeError` but never shown unless internal diagnostics are
/// explicitly enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exception {
    pub kind: ExcType,
    pub message: String,
    pub stacktrace: Vec<StackFrame>,
    #[serde(default)]
    pub cause: Option<String>,
}

impl Exception {
    #[must_use]
    pub fn new(kind: ExcType, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            stacktrace: Vec::new(),
            cause: None,
        }
    }

    #[must_use]
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ExcType::SyntaxError, message)
    }

    /// Renders the full diagnostics report.
    #[must_use]
    pub fn report(&self) -> String {
        format_exception(self, false)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for Exception {}

fn read_source_snippet(file: &str, line: u32) -> Option<String> {
    if line == 0 || !Path::new(file).exists() {
        return None;
    }
    let content = fs::read_to_string(file).ok()?;
    let snippet = content.lines().nth(line as usize - 1)?.trim().to_string();
    if snippet.is_empty() { None } else { Some(snippet) }
}

fn push_frame_block(out: &mut Vec<String>, frame: &StackFrame, mark_origin: bool) {
    let mut line = format!("  at {}:{}  in {}", frame.file, frame.line, frame.function);
    if mark_origin {
        line.push_str("  <-- error origin");
    }
    out.push(line);
    if let Some(code) = read_source_snippet(&frame.file, frame.line) {
        out.push(format!("    codeblock: {code}"));
    }
    if !frame.locals.is_empty() {
        let rendered: Vec<String> = frame
            .locals
            .iter()
            .map(|(name, repr)| format!("{name}: {repr}"))
            .collect();
        out.push(format!("    variables: {{{}}}", rendered.join(", ")));
    }
}

/// Formats an exception into the multi-section diagnostics report.
///
/// `show_internal` controls whether the host cause block is appended; the
/// default embedding keeps host details hidden.
#[must_use]
pub fn format_exception(exc: &Exception, show_internal: bool) -> String {
    let mut out: Vec<String> = Vec::new();

    out.push(format!("Error<{}>", exc.kind));
    out.push(format!("Message: {}", exc.message));
    if let Some(top) = exc.stacktrace.last() {
        out.push(format!("Location: {}:{} in {}", top.file, top.line, top.function));
    }

    out.push(String::new());
    out.push("StackTrace (.mp):".to_string());
    if exc.stacktrace.is_empty() {
        out.push("  <no .mp frames available>".to_string());
    } else {
        let mut first = true;
        for frame in exc.stacktrace.iter().rev() {
            push_frame_block(&mut out, frame, first);
            first = false;
        }
    }

    out.push(String::new());
    out.push("Root Cause:".to_string());
    let chosen = exc
        .stacktrace
        .iter()
        .rev()
        .find(|f| f.line > 0 && (f.column > 0 || f.function != "<module>"))
        .or_else(|| exc.stacktrace.last());
    if let Some(frame) = chosen {
        out.push(format!("  Possible error at {}:{}", frame.file, frame.line));
        out.push(format!("  Message: {}", exc.message));
    } else {
        out.push(format!("  {}", exc.message));
    }
    let lower = exc.message.to_lowercase();
    if lower.contains("undefined variable") || lower.contains("not found") {
        out.push("  Note: undefined reference / missing symbol".to_string());
    } else if lower.contains("division by zero") {
        out.push("  Note: attempted division by zero (check denominators)".to_string());
    } else if lower.contains("type mismatch") || lower.contains("type") {
        out.push("  Note: type mismatch; check variable types or generics".to_string());
    }

    out.push(String::new());
    out.push("Suggestions:".to_string());
    let mut suggested = false;
    if lower.contains("undefined variable") {
        out.push("  - Ensure the variable is defined before use; check spelling and scope.".to_string());
        out.push("  - If referencing a module symbol, ensure the module is imported and the name exported.".to_string());
        suggested = true;
    }
    if lower.contains("division by zero") {
        out.push("  - Guard division operations and check denominators are non-zero.".to_string());
        suggested = true;
    }
    if lower.contains("type mismatch") || lower.contains("does not accept null") {
        out.push("  - Check parameter types and annotations; ensure correct types are passed.".to_string());
        suggested = true;
    }
    if lower.contains("private") {
        out.push("  - Access private members through a public method of the declaring class.".to_string());
        suggested = true;
    }
    if lower.contains("async") {
        out.push("  - Await the call, or mark the calling function async.".to_string());
        suggested = true;
    }
    if !suggested {
        out.push("  - Inspect the stack trace above to locate the cause and adjust the code.".to_string());
    }

    if show_internal {
        if let Some(cause) = &exc.cause {
            out.push(String::new());
            out.push("Internal Interpreter Diagnostics:".to_string());
            out.push(format!("  Caused by: {cause}"));
        }
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Exception {
        let mut exc = Exception::new(ExcType::ReferenceError, "Undefined variable: zzz");
        exc.stacktrace.push(StackFrame::new("main.mp", 1, 1, "<module>"));
        exc.stacktrace.push(StackFrame::new("main.mp", 4, 9, "helper"));
        exc
    }

    #[test]
    fn report_sections_are_ordered() {
        let report = sample().report();
        let error_idx = report.find("Error<ReferenceError>").unwrap();
        let stack_idx = report.find("StackTrace (.mp):").unwrap();
        let root_idx = report.find("Root Cause:").unwrap();
        let sugg_idx = report.find("Suggestions:").unwrap();
        assert!(error_idx < stack_idx && stack_idx < root_idx && root_idx < sugg_idx);
    }

    #[test]
    fn most_recent_frame_prints_first() {
        let report = sample().report();
        let helper_idx = report.find("in helper").unwrap();
        let module_idx = report.find("in <module>").unwrap();
        assert!(helper_idx < module_idx);
        assert!(report.contains("<-- error origin"));
    }

    #[test]
    fn host_cause_is_hidden_by_default() {
        let mut exc = sample();
        exc.cause = Some("io error: permission denied".to_string());
        assert!(!exc.report().contains("permission denied"));
        assert!(format_exception(&exc, true).contains("permission denied"));
    }
}
