//! Default executors, grouped by language family.

pub(crate) mod control_flow;
pub(crate) mod expressions;
pub(crate) mod functions;
pub(crate) mod natives;
pub(crate) mod oop;
pub(crate) mod statements;

use crate::interp::Interpreter;

/// Wires every default executor into a fresh interpreter's registry.
pub(crate) fn register_defaults(interp: &Interpreter) {
    statements::register(interp);
    expressions::register(interp);
    functions::register(interp);
    control_flow::register(interp);
    oop::register(interp);
}
