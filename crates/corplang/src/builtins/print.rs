//! The `print`/`sout` builtin, routed through the interpreter's
//! `PrintWriter` so embedders can capture or redirect output.

use std::borrow::Cow;

use crate::{
    exceptions::{RaisedException, RunError, RunResult},
    interp::{ExecContext, Interpreter},
    value::{CallValues, Value},
};

fn writer_err(exc: crate::diagnostics::Exception) -> RunError {
    RaisedException::new(exc.kind, exc.message).into()
}

/// Writes each argument separated by spaces, followed by a newline.
///
/// Instances render through their `toString()` method when they have one.
pub(crate) fn builtin_print(interp: &Interpreter, ctx: &ExecContext, args: CallValues) -> RunResult<Value> {
    for (index, value) in args.positional.iter().enumerate() {
        if index > 0 {
            interp.printer.borrow_mut().stdout_push(' ').map_err(writer_err)?;
        }
        let rendered = interp.display_value(value, ctx)?;
        interp
            .printer
            .borrow_mut()
            .stdout_write(Cow::Owned(rendered))
            .map_err(writer_err)?;
    }
    interp.printer.borrow_mut().stdout_push('\n').map_err(writer_err)?;
    Ok(Value::Null)
}
