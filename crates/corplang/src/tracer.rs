//! Execution tracing hooks.
//!
//! The interpreter reports node entry and exceptional exits through an
//! `ExecTracer`. `CORPLANG_DEBUG` switches the default from `NoopTracer` to
//! `StderrTracer`; tests use `RecordingTracer` to assert on executed nodes.

use crate::ast::{CodeLoc, NodeTag};

/// One recorded trace event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    Enter { tag: String, line: u32 },
    Raise { message: String, line: u32 },
}

/// Observer for interpreter execution.
pub trait ExecTracer {
    fn on_enter(&mut self, tag: NodeTag, loc: CodeLoc);
    fn on_raise(&mut self, message: &str, loc: CodeLoc);
}

/// Tracer that does nothing; the default.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl ExecTracer for NoopTracer {
    fn on_enter(&mut self, _tag: NodeTag, _loc: CodeLoc) {}
    fn on_raise(&mut self, _message: &str, _loc: CodeLoc) {}
}

/// Tracer that prints each event to stderr.
#[derive(Debug, Default)]
pub struct StderrTracer;

impl ExecTracer for StderrTracer {
    fn on_enter(&mut self, tag: NodeTag, loc: CodeLoc) {
        eprintln!("[trace] {tag} @ {}:{}", loc.line, loc.column);
    }

    fn on_raise(&mut self, message: &str, loc: CodeLoc) {
        eprintln!("[trace] raise {message} @ {}:{}", loc.line, loc.column);
    }
}

/// Tracer that records events for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    pub events: Vec<TraceEvent>,
}

impl ExecTracer for RecordingTracer {
    fn on_enter(&mut self, tag: NodeTag, loc: CodeLoc) {
        self.events.push(TraceEvent::Enter {
            tag: tag.to_string(),
            line: loc.line,
        });
    }

    fn on_raise(&mut self, message: &str, loc: CodeLoc) {
        self.events.push(TraceEvent::Raise {
            message: message.to_string(),
            line: loc.line,
        });
    }
}
