//! Shape of the language-level stack traces and the diagnostics report.

use corplang::{ExcType, Runner};

fn fail(source: &str) -> corplang::Exception {
    Runner::capturing()
        .run_source(source, "<test>")
        .expect_err("program should fail")
}

#[test]
fn stacktrace_records_the_call_chain() {
    let source = "fn inner() { missing_variable }\nfn outer() { inner() }\nouter()";
    let err = fail(source);
    assert_eq!(err.kind, ExcType::ReferenceError);

    let functions: Vec<&str> = err.stacktrace.iter().map(|f| f.function.as_str()).collect();
    assert!(functions.contains(&"<module>"), "module frame missing: {functions:?}");
    assert!(functions.contains(&"outer"), "outer frame missing: {functions:?}");
    assert!(functions.contains(&"inner"), "inner frame missing: {functions:?}");

    // Most recent last: inner appears after outer.
    let outer_idx = functions.iter().position(|f| *f == "outer").unwrap();
    let inner_idx = functions.iter().rposition(|f| *f == "inner").unwrap();
    assert!(inner_idx > outer_idx);
}

#[test]
fn frames_carry_positions_from_the_source() {
    let err = fail("fn f() {\n    missing_variable\n}\nf()");
    let lines: Vec<u32> = err.stacktrace.iter().map(|f| f.line).collect();
    assert!(lines.contains(&2), "the failing line should appear in the trace: {lines:?}");
}

#[test]
fn report_is_ordered_and_marks_the_origin() {
    let err = fail("fn helper(a) { throw \"exploded\" }\nhelper(7)");
    let report = err.report();

    let error_idx = report.find("Error<Exception>").expect("error header");
    let message_idx = report.find("Message: exploded").expect("message line");
    let stack_idx = report.find("StackTrace (.mp):").expect("stack section");
    let root_idx = report.find("Root Cause:").expect("root cause section");
    let suggestion_idx = report.find("Suggestions:").expect("suggestions section");
    assert!(error_idx < message_idx);
    assert!(message_idx < stack_idx);
    assert!(stack_idx < root_idx);
    assert!(root_idx < suggestion_idx);
    assert!(report.contains("<-- error origin"));
}

#[test]
fn frames_summarise_locals() {
    let err = fail("fn helper(count) { throw \"stop\" }\nhelper(7)");
    let report = err.report();
    assert!(
        report.contains("count: 7"),
        "locals summary should include the parameter: {report}"
    );
}

#[test]
fn suggestions_follow_the_error_kind() {
    let report = fail("missing_variable").report();
    assert!(report.contains("Ensure the variable is defined"));

    let report = fail("1 / 0").report();
    assert!(report.contains("denominators"));

    let report = fail("async fn g() { return 1 }\ng()").report();
    assert!(report.contains("Await the call"));
}

#[test]
fn syntax_errors_carry_positions() {
    let err = Runner::capturing()
        .run_source("var = 1", "<test>")
        .expect_err("bad declaration");
    assert_eq!(err.kind, ExcType::SyntaxError);
    assert!(err.message.contains("line 1"));
}

#[test]
fn internal_wrapping_keeps_the_host_cause_private() {
    // A module file that is not valid UTF-8 fails in the host read layer.
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::write(dir.path().join("sub.mp"), [0xFFu8, 0xFE, 0x00]).unwrap();
    let main = dir.path().join("main.mp");
    std::fs::write(&main, "import sub").unwrap();

    let err = Runner::capturing().run_path(&main).expect_err("unreadable module");
    assert_eq!(err.kind, ExcType::InternalRuntimeError);
    assert!(err.cause.is_some());
    // The default report never shows the host error text.
    assert!(!err.report().contains(err.cause.as_deref().unwrap()));
    assert!(corplang::format_exception(&err, true).contains("Internal Interpreter Diagnostics"));
}
