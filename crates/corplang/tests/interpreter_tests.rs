//! End-to-end interpreter behaviour over the public `Runner` surface.

use corplang::{ExcType, ResourceLimits, Runner, Value};
use pretty_assertions::assert_eq;

fn run_value(source: &str) -> Value {
    Runner::capturing()
        .run_source(source, "<test>")
        .expect("program should succeed")
}

fn run_str(source: &str) -> String {
    run_value(source).to_string()
}

fn run_output(source: &str) -> String {
    let runner = Runner::capturing();
    runner.run_source(source, "<test>").expect("program should succeed");
    runner.take_output()
}

fn run_err(source: &str) -> corplang::Exception {
    Runner::capturing()
        .run_source(source, "<test>")
        .expect_err("program should fail")
}

// ----------------------------------------------------------------------
// Core scenarios
// ----------------------------------------------------------------------

#[test]
fn finally_overrides_return() {
    let value = run_value("fn f() { try { return 1 } finally { return 2 } }\nf()");
    assert_eq!(value.to_string(), "2");
}

#[test]
fn finally_overrides_pending_exception() {
    let value = run_value("fn f() { try { throw \"boom\" } finally { return 7 } }\nf()");
    assert_eq!(value.to_string(), "7");
}

#[test]
fn finally_runs_on_the_normal_path() {
    let output = run_output("fn f() { try { print(\"try\") } finally { print(\"finally\") } }\nf()");
    assert_eq!(output, "try\nfinally\n");
}

#[test]
fn return_outside_function_is_a_syntax_error() {
    let err = run_err("return 1");
    assert_eq!(err.kind, ExcType::SyntaxError);
    assert!(err.message.contains("Return statement outside of function"));
}

#[test]
fn break_and_continue_outside_loops_are_syntax_errors() {
    assert_eq!(run_err("break").kind, ExcType::SyntaxError);
    assert_eq!(run_err("continue").kind, ExcType::SyntaxError);
}

#[test]
fn closure_captures_definition_time_scope() {
    let source = r#"
        var x = 1
        fn make() { var x = 2; fn inner() { return x } return inner }
        var g = make()
        var x = 99
        g()
    "#;
    assert_eq!(run_str(source), "2");
}

#[test]
fn closures_share_their_captured_environment() {
    let source = r#"
        fn counter() {
            var count = 0
            fn bump() { count = count + 1; return count }
            return bump
        }
        var c = counter()
        c()
        c()
        c()
    "#;
    assert_eq!(run_str(source), "3");
}

#[test]
fn private_member_is_readable_through_methods_only() {
    let source = r#"
        class A {
            private var secret = 1
            fn peek() { return this.secret }
        }
        new A().peek()
    "#;
    assert_eq!(run_str(source), "1");

    let err = run_err(
        r#"
        class A {
            private var secret = 1
            fn peek() { return this.secret }
        }
        new A().secret
    "#,
    );
    assert_eq!(err.kind, ExcType::SecurityError);
    assert!(err.message.contains("private"));
}

#[test]
fn private_method_is_blocked_from_outside() {
    let err = run_err(
        r#"
        class Vault {
            private fn combo() { return 42 }
        }
        new Vault().combo()
    "#,
    );
    assert_eq!(err.kind, ExcType::SecurityError);
}

#[test]
fn async_call_without_await_fails_before_the_body_runs() {
    let runner = Runner::capturing();
    let err = runner
        .run_source("async fn g() { print(\"ran\") return 1 }\ng()", "<test>")
        .expect_err("async call from sync context must fail");
    assert_eq!(err.kind, ExcType::TypeError);
    assert!(err.message.contains("async"));
    // The body never executed.
    assert_eq!(runner.take_output(), "");
}

#[test]
fn await_drives_the_awaitable_to_completion() {
    assert_eq!(run_str("async fn g() { return 40 + 2 }\nawait g()"), "42");
}

#[test]
fn async_body_is_lazy_until_awaited() {
    let source = r#"
        async fn work() { print("ran") return 5 }
        async fn outer() {
            var pending = work()
            print("before")
            return await pending
        }
        await outer()
    "#;
    let runner = Runner::capturing();
    let value = runner.run_source(source, "<test>").expect("program should succeed");
    assert_eq!(value.to_string(), "5");
    assert_eq!(runner.take_output(), "before\nran\n");
}

#[test]
fn awaiting_a_plain_value_returns_it_unchanged() {
    assert_eq!(run_str("async fn f() { return await 9 }\nawait f()"), "9");
}

#[test]
fn an_awaitable_is_single_shot() {
    let err = run_err(
        r#"
        async fn g() { return 1 }
        async fn outer() {
            var a = g()
            await a
            return await a
        }
        await outer()
    "#,
    );
    assert_eq!(err.kind, ExcType::RuntimeError);
    assert!(err.message.contains("already driven"));
}

// ----------------------------------------------------------------------
// Control flow
// ----------------------------------------------------------------------

#[test]
fn while_loop_with_break_and_continue() {
    let source = r#"
        var total = 0
        var i = 0
        while (i < 10) {
            i = i + 1
            if (i % 2 == 0) { continue }
            if (i > 7) { break }
            total = total + i
        }
        total
    "#;
    // 1 + 3 + 5 + 7, then 9 > 7 breaks before adding.
    assert_eq!(run_str(source), "16");
}

#[test]
fn c_style_for_loop() {
    let source = r#"
        var total = 0
        for (var i = 0; i < 5; i = i + 1) { total = total + i }
        total
    "#;
    assert_eq!(run_str(source), "10");
}

#[test]
fn for_in_iterates_map_keys_and_for_of_values() {
    let source = r#"
        var m = {"a": 1, "b": 2}
        var keys = ""
        for (var k in m) { keys = keys + k }
        keys
    "#;
    assert_eq!(run_str(source), "ab");

    let source = r#"
        var m = {"a": 1, "b": 2}
        var total = 0
        for (var v of m) { total = total + v }
        total
    "#;
    assert_eq!(run_str(source), "3");
}

#[test]
fn for_in_iterates_list_elements() {
    let source = r#"
        var total = 0
        for (var n in [1, 2, 3]) { total = total + n }
        total
    "#;
    assert_eq!(run_str(source), "6");
}

#[test]
fn instances_iterate_through_the_iterator_protocol() {
    let source = r#"
        class UpTo {
            fn constructor(limit) { this.limit = limit }
            fn __iter__() { return new UpToIter(this.limit) }
        }
        class UpToIter {
            fn constructor(limit) { this.limit = limit this.i = 0 }
            fn hasNext() { return this.i < this.limit }
            fn next() { this.i = this.i + 1 return this.i }
        }
        var total = 0
        for (var n in new UpTo(4)) { total = total + n }
        total
    "#;
    assert_eq!(run_str(source), "10");
}

#[test]
fn bare_loop_runs_until_break() {
    let source = r#"
        var i = 0
        loop { i = i + 1 if (i == 5) { break } }
        i
    "#;
    assert_eq!(run_str(source), "5");
}

#[test]
fn return_propagates_through_loops() {
    let source = r#"
        fn first_even(items) {
            for (var n in items) { if (n % 2 == 0) { return n } }
            return null
        }
        first_even([3, 5, 8, 9])
    "#;
    assert_eq!(run_str(source), "8");
}

// ----------------------------------------------------------------------
// Exceptions
// ----------------------------------------------------------------------

#[test]
fn typed_catch_matches_builtin_kinds_nominally() {
    let source = r#"
        var seen = ""
        try { missing_variable } catch (e: ReferenceError) { seen = "ref" }
        seen
    "#;
    assert_eq!(run_str(source), "ref");

    // Exception is the base of every kind.
    let source = r#"
        var seen = ""
        try { missing_variable } catch (e: Exception) { seen = e.message }
        seen
    "#;
    assert_eq!(run_str(source), "Undefined variable: missing_variable");
}

#[test]
fn mismatched_catch_does_not_intercept() {
    let err = run_err("try { missing_variable } catch (e: TypeError) { 1 }");
    assert_eq!(err.kind, ExcType::ReferenceError);
}

#[test]
fn thrown_instances_match_through_the_class_chain() {
    let source = r#"
        class AppError {
            fn constructor(message) { this.message = message }
        }
        class DbError extends AppError {
            fn constructor(message) { super(message) }
        }
        var caught = ""
        try { throw new DbError("no connection") } catch (e: AppError) { caught = e.message }
        caught
    "#;
    assert_eq!(run_str(source), "no connection");
}

#[test]
fn catch_binds_the_same_value_the_program_threw() {
    let source = r#"
        class AppError {
            fn constructor(message) { this.message = message this.code = 7 }
        }
        var code = 0
        try { throw new AppError("bad") } catch (e: AppError) { code = e.code }
        code
    "#;
    assert_eq!(run_str(source), "7");
}

#[test]
fn caught_exception_carries_a_language_stacktrace() {
    let source = r#"
        class AppError {
            fn constructor(message) { this.message = message }
        }
        fn boom() { throw new AppError("bad") }
        var frames = null
        try { boom() } catch (e: AppError) { frames = e.stacktrace }
        len(frames)
    "#;
    let value = run_value(source);
    let Value::Int(depth) = value else {
        panic!("expected a frame count, got {value}");
    };
    assert!(depth > 0, "stacktrace must be non-empty");
}

#[test]
fn uncaught_exception_reaches_the_top_with_frames() {
    let err = run_err("fn inner() { throw \"kaput\" }\nfn outer() { inner() }\nouter()");
    assert_eq!(err.message, "kaput");
    assert!(!err.stacktrace.is_empty());
    // Most recent frame corresponds to the throw site.
    let top = err.stacktrace.last().unwrap();
    assert_eq!(top.line, 1);
}

#[test]
fn catches_are_tried_in_order() {
    let source = r#"
        class A { fn constructor() { this.message = "a" } }
        class B { fn constructor() { this.message = "b" } }
        var seen = ""
        try { throw new B() } catch (e: A) { seen = "A" } catch (e: B) { seen = "B" }
        seen
    "#;
    assert_eq!(run_str(source), "B");
}

// ----------------------------------------------------------------------
// with statement
// ----------------------------------------------------------------------

#[test]
fn with_exits_in_reverse_order_on_every_path() {
    let source = r#"
        class Res {
            fn constructor(tag) { this.tag = tag }
            fn __enter__() { print("enter " + this.tag) return this }
            fn __exit__(t, v, tb) { print("exit " + this.tag) return false }
        }
        with (new Res("a") as a, new Res("b") as b) { print("body") }
    "#;
    assert_eq!(run_output(source), "enter a\nenter b\nbody\nexit b\nexit a\n");
}

#[test]
fn with_exit_runs_when_the_body_throws_and_can_suppress() {
    let source = r#"
        class Guard {
            fn __enter__() { return this }
            fn __exit__(t, v, tb) { print("cleanup") return true }
        }
        with (new Guard() as g) { throw "inside" }
        print("after")
    "#;
    assert_eq!(run_output(source), "cleanup\nafter\n");
}

#[test]
fn with_exit_does_not_suppress_by_default() {
    let source = r#"
        class Guard {
            fn __enter__() { return this }
            fn __exit__(t, v, tb) { print("cleanup") return false }
        }
        with (new Guard() as g) { throw "inside" }
    "#;
    let runner = Runner::capturing();
    let err = runner.run_source(source, "<test>").expect_err("must propagate");
    assert_eq!(err.message, "inside");
    assert_eq!(runner.take_output(), "cleanup\n");
}

#[test]
fn with_exit_runs_when_the_body_returns() {
    let source = r#"
        class Guard {
            fn __enter__() { return this }
            fn __exit__(t, v, tb) { print("cleanup") return false }
        }
        fn f() { with (new Guard() as g) { return 5 } }
        f()
    "#;
    let runner = Runner::capturing();
    let value = runner.run_source(source, "<test>").expect("program should succeed");
    assert_eq!(value.to_string(), "5");
    assert_eq!(runner.take_output(), "cleanup\n");
}

// ----------------------------------------------------------------------
// Classes and objects
// ----------------------------------------------------------------------

#[test]
fn inheritance_and_super_constructor() {
    let source = r#"
        class Animal {
            fn constructor(name) { this.name = name }
            fn describe() { return this.name + " the animal" }
        }
        class Dog extends Animal {
            fn constructor(name) { super(name) }
            fn describe() { return this.name + " the dog" }
        }
        new Dog("Rex").describe()
    "#;
    assert_eq!(run_str(source), "Rex the dog");
}

#[test]
fn methods_resolve_up_the_parent_chain() {
    let source = r#"
        class Base { fn hello() { return "hello" } }
        class Child extends Base { }
        new Child().hello()
    "#;
    assert_eq!(run_str(source), "hello");
}

#[test]
fn field_initializers_run_per_construction() {
    let source = r#"
        class Point {
            var x = 0
            var y = 0
        }
        var p = new Point()
        p.x = 5
        var q = new Point()
        q.x
    "#;
    assert_eq!(run_str(source), "0");
}

#[test]
fn static_fields_evaluate_lazily_and_cache() {
    let source = r#"
        var calls = 0
        fn bump() { calls = calls + 1 return calls }
        class Config { static var version = bump() }
        var before = calls
        var first = Config.version
        var second = Config.version
        str(before) + ":" + str(calls)
    "#;
    assert_eq!(run_str(source), "0:1");
}

#[test]
fn static_methods_bind_without_an_instance() {
    let source = r#"
        class MathUtil {
            static fn double(n) { return n * 2 }
        }
        MathUtil.double(21)
    "#;
    assert_eq!(run_str(source), "42");
}

#[test]
fn property_access_prefers_field_but_calls_prefer_method() {
    let source = r#"
        class Box {
            fn constructor() { this.value = fn () { return "field" } }
            fn value() { return "method" }
        }
        var b = new Box()
        var via_call = b.value()
        var f = b.value
        via_call + "|" + f()
    "#;
    assert_eq!(run_str(source), "method|field");
}

#[test]
fn constructor_errors_propagate_out_of_new() {
    let err = run_err(
        r#"
        class Fragile { fn constructor() { throw "broken" } }
        new Fragile()
    "#,
    );
    assert_eq!(err.message, "broken");
}

#[test]
fn instances_render_through_tostring() {
    let source = r#"
        class Point {
            fn constructor(x, y) { this.x = x this.y = y }
            fn toString() { return "(" + str(this.x) + ", " + str(this.y) + ")" }
        }
        print(new Point(1, 2))
    "#;
    assert_eq!(run_output(source), "(1, 2)\n");
}

#[test]
fn driver_classes_require_the_full_method_set() {
    let err = run_err("driver Broken { fn connect() { } }");
    assert_eq!(err.kind, ExcType::TypeError);
    assert!(err.message.contains("missing required methods"));

    let source = r#"
        driver Sqlite {
            fn connect() { return true }
            fn disconnect() { return true }
            fn execute(q) { return null }
            fn query(q) { return [] }
            fn transaction(f) { return null }
        }
        new Sqlite().connect()
    "#;
    assert_eq!(run_str(source), "true");
}

#[test]
fn generic_instances_report_their_type_arguments() {
    let source = r#"
        class Repo<T> {
            fn constructor() { this.items = [] }
        }
        var r = new Repo<string>()
        genericOf(r)["T"].name
    "#;
    assert_eq!(run_str(source), "string");
}

// ----------------------------------------------------------------------
// Enums
// ----------------------------------------------------------------------

#[test]
fn enum_members_expose_name_and_value() {
    let source = r#"
        enum Role { ADMIN, STAFF = "people" }
        [Role.ADMIN.name, Role.ADMIN.value, Role.STAFF.value]
    "#;
    assert_eq!(run_str(source), "[\"ADMIN\", \"admin\", \"people\"]");
}

#[test]
fn enum_equality_is_by_member_identity() {
    let source = r#"
        enum Role { ADMIN, STAFF }
        [Role.ADMIN == Role.ADMIN, Role.ADMIN == Role.STAFF]
    "#;
    assert_eq!(run_str(source), "[true, false]");
}

// ----------------------------------------------------------------------
// Values, operators, literals
// ----------------------------------------------------------------------

#[test]
fn arithmetic_precedence_and_division() {
    assert_eq!(run_str("1 + 2 * 3"), "7");
    assert_eq!(run_str("7 / 2"), "3.5");
    // True division: int operands still yield a float.
    assert_eq!(run_str("8 / 2"), "4.0");
    assert_eq!(run_str("7 % 3"), "1");
}

#[test]
fn modulo_is_floored_like_the_divisor() {
    assert_eq!(run_str("-7 % 3"), "2");
    assert_eq!(run_str("7 % -3"), "-2");
    assert_eq!(run_str("-7 % -3"), "-1");
    assert_eq!(run_str("-7.5 % 3"), "1.5");
}

#[test]
fn division_by_zero_raises() {
    let err = run_err("1 / 0");
    assert_eq!(err.kind, ExcType::TypeError);
    assert!(err.message.contains("Division by zero"));
}

#[test]
fn null_coerces_to_zero_in_ordered_comparisons_only() {
    assert_eq!(run_str("null < 1"), "true");
    assert_eq!(run_str("null >= 0"), "true");
    assert_eq!(run_str("null == null"), "true");
    assert_eq!(run_str("null == 0"), "false");

    let err = run_err("null + 1");
    assert_eq!(err.kind, ExcType::TypeError);
    assert!(err.message.contains("Cannot apply operator '+'"));
}

#[test]
fn logic_operators_short_circuit() {
    // The right operand would raise if evaluated.
    assert_eq!(run_str("false and missing_variable"), "false");
    assert_eq!(run_str("true or missing_variable"), "true");
}

#[test]
fn truthiness_has_no_python_style_falsy_values() {
    assert_eq!(run_str("0 ? \"yes\" : \"no\""), "yes");
    assert_eq!(run_str("\"\" ? \"yes\" : \"no\""), "yes");
    assert_eq!(run_str("null ? \"yes\" : \"no\""), "no");
    assert_eq!(run_str("false ? \"yes\" : \"no\""), "no");
}

#[test]
fn membership_operator_covers_containers() {
    assert_eq!(run_str("\"a\" in {\"a\": 1}"), "true");
    assert_eq!(run_str("2 in [1, 2, 3]"), "true");
    assert_eq!(run_str("\"ell\" in \"hello\""), "true");
    assert_eq!(run_str("\"x\" in [1, 2]"), "false");
}

#[test]
fn json_blobs_become_plain_data() {
    let source = r#"
        var cfg = {"port": 8080, "tags": ["a", "b"], "debug": true}
        var summary = str(cfg["port"]) + ":" + cfg["tags"][1] + ":" + str(cfg["debug"])
        summary
    "#;
    assert_eq!(run_str(source), "8080:b:true");
}

#[test]
fn object_literals_evaluate_embedded_expressions() {
    let source = r#"
        var port = 9000
        var cfg = {host: "local", port: port + 1}
        cfg.port
    "#;
    assert_eq!(run_str(source), "9001");
}

#[test]
fn index_assignment_bounds_checks_lists() {
    assert_eq!(run_str("var l = [1, 2]\nl[1] = 5\nl[1]"), "5");
    let err = run_err("var l = [1, 2]\nl[9] = 5");
    assert!(err.message.contains("out of range"));
}

#[test]
fn map_assignment_inserts() {
    assert_eq!(run_str("var m = {\"a\": 1}\nm[\"b\"] = 2\nm[\"b\"]"), "2");
}

#[test]
fn delete_removes_bindings_keys_and_elements() {
    let source = r#"
        var m = {"a": 1, "b": 2}
        delete m["a"]
        len(m)
    "#;
    assert_eq!(run_str(source), "1");

    let source = r#"
        var l = [1, 2, 3]
        delete l[0]
        l[0]
    "#;
    assert_eq!(run_str(source), "2");

    let err = run_err("var x = 1\ndelete x\nx");
    assert_eq!(err.kind, ExcType::ReferenceError);
}

#[test]
fn fstrings_interpolate_expressions() {
    let source = r#"
        var name = "core"
        var n = 3
        f"module {name} has {n + 1} parts {{braced}}"
    "#;
    assert_eq!(run_str(source), "module core has 4 parts {braced}");
}

#[test]
fn fstrings_render_instances_via_tostring() {
    let source = r##"
        class Tag { fn toString() { return "#tag" } }
        f"value: {new Tag()}"
    "##;
    assert_eq!(run_str(source), "value: #tag");
}

#[test]
fn fstring_placeholders_do_not_license_async_calls() {
    let runner = Runner::capturing();
    let err = runner
        .run_source("async fn g() { print(\"ran\") return 1 }\nf\"{g()}\"", "<test>")
        .expect_err("async call inside an f-string still needs await");
    assert_eq!(err.kind, ExcType::TypeError);
    assert!(err.message.contains("async"));
    assert_eq!(runner.take_output(), "");
}

#[test]
fn fstring_placeholders_resolve_awaitables_in_async_contexts() {
    let source = r#"
        async fn g() { return 7 }
        async fn outer() { return f"got {g()}" }
        await outer()
    "#;
    assert_eq!(run_str(source), "got 7");
}

#[test]
fn string_methods() {
    assert_eq!(run_str("\"a,b,c\".split(\",\")"), "[\"a\", \"b\", \"c\"]");
    assert_eq!(run_str("\"hello\".replace(\"l\", \"L\")"), "heLLo");
    assert_eq!(run_str("\"hello\".indexOf(\"llo\")"), "2");
    assert_eq!(run_str("\"hello\".substring(1, 3)"), "el");
    assert_eq!(run_str("\"hello\".startsWith(\"he\")"), "true");
    assert_eq!(run_str("\"hello\".contains(\"ell\")"), "true");
    assert_eq!(run_str("\"hello\".length"), "5");
}

#[test]
fn list_and_map_helpers() {
    assert_eq!(run_str("var l = []\nl.push(1)\nl.push(2)\nl.length"), "2");
    assert_eq!(run_str("[1, 2, 3].indexOf(3)"), "2");
    assert_eq!(run_str("[\"a\", \"b\"].join(\"-\")"), "a-b");
    assert_eq!(run_str("var m = {\"a\": 1}\nm.get(\"missing\", 9)"), "9");
    assert_eq!(run_str("var m = {\"a\": 1}\nm.keys()"), "[\"a\"]");
    assert_eq!(run_str("var m = {\"a\": 1}\nm.has(\"a\")"), "true");
}

// ----------------------------------------------------------------------
// Functions and arguments
// ----------------------------------------------------------------------

#[test]
fn named_arguments_defaults_and_kwargs_catcher() {
    let source = r#"
        fn greet(greeting, name = "world", kwargs) {
            return greeting + " " + name + " +" + str(len(kwargs))
        }
        greet("hi", extra = 1, more = 2)
    "#;
    assert_eq!(run_str(source), "hi world +2");
}

#[test]
fn argument_binding_errors() {
    let base = "fn f(a, b) { return a + b }\n";
    assert!(run_err(&format!("{base}f(1)")).message.contains("Missing required argument 'b'"));
    assert!(run_err(&format!("{base}f(1, 2, 3)"))
        .message
        .contains("Too many positional arguments"));
    assert!(run_err(&format!("{base}f(1, a = 2)"))
        .message
        .contains("specified by position and by name"));
    assert!(run_err(&format!("{base}f(1, 2, c = 3)"))
        .message
        .contains("Unexpected argument(s): c"));
    assert!(run_err(&format!("{base}f(a = 1, a = 2)"))
        .message
        .contains("specified multiple times"));
}

#[test]
fn lambdas_are_first_class() {
    let source = r#"
        fn apply(f, x) { return f(x) }
        apply(fn (n) n * 2, 21)
    "#;
    assert_eq!(run_str(source), "42");
}

#[test]
fn function_bodies_yield_their_last_value_without_return() {
    assert_eq!(run_str("fn f() { 1 + 1 }\nf()"), "2");
}

#[test]
fn calling_a_non_function_is_a_type_error() {
    let err = run_err("var x = 3\nx()");
    assert_eq!(err.kind, ExcType::TypeError);
    assert!(err.message.contains("Not a function"));
}

#[test]
fn recursion_depth_is_limited() {
    let runner = Runner::capturing().with_limits(ResourceLimits {
        max_recursion_depth: 40,
    });
    let err = runner
        .run_source("fn f() { return f() }\nf()", "<test>")
        .expect_err("unbounded recursion must trip the limit");
    assert_eq!(err.kind, ExcType::ResourceError);
    assert!(err.message.contains("recursion"));
}

#[test]
fn recursion_error_is_catchable() {
    let runner = Runner::capturing().with_limits(ResourceLimits {
        max_recursion_depth: 40,
    });
    let value = runner
        .run_source(
            "fn f() { return f() }\nvar seen = \"\"\ntry { f() } catch (e: ResourceError) { seen = \"caught\" }\nseen",
            "<test>",
        )
        .expect("catch should recover");
    assert_eq!(value.to_string(), "caught");
}

// ----------------------------------------------------------------------
// Builtins
// ----------------------------------------------------------------------

#[test]
fn print_separates_arguments_with_spaces() {
    assert_eq!(run_output("print(1, \"two\", [3])"), "1 two [3]\n");
    assert_eq!(run_output("sout(\"x\")"), "x\n");
}

#[test]
fn type_and_typeof_builtins() {
    assert_eq!(run_str("type(1)"), "number");
    assert_eq!(run_str("type(\"s\")"), "string");
    assert_eq!(run_str("type(null)"), "null");
    assert_eq!(run_str("type([1])"), "list");
    assert_eq!(run_str("typeOf(1).name"), "int");
    assert_eq!(run_str("typeOf(\"s\").name"), "string");
}

#[test]
fn len_and_range_builtins() {
    assert_eq!(run_str("len(\"abc\")"), "3");
    assert_eq!(run_str("len([1, 2])"), "2");
    assert_eq!(run_str("len({\"a\": 1})"), "1");
    assert_eq!(run_str("range(3)"), "[0, 1, 2]");
    assert_eq!(run_str("range(1, 4)"), "[1, 2, 3]");
    assert_eq!(run_str("range(6, 0, -2)"), "[6, 4, 2]");
    assert_eq!(run_err("len(1)").kind, ExcType::TypeError);
}

#[test]
fn str_builtin_renders_null_as_empty() {
    assert_eq!(run_str("str(null)"), "");
    assert_eq!(run_str("str(12)"), "12");
}

#[test]
fn input_reads_queued_values_and_casts() {
    let runner = Runner::capturing();
    runner.feed_inputs(["41", "yes"]);
    let value = runner
        .run_source(
            "var n = input(\"n?\", \"int\")\nvar ok = input(\"ok?\", \"bool\")\nstr(n + 1) + \":\" + str(ok)",
            "<test>",
        )
        .expect("inputs should cast");
    assert_eq!(value.to_string(), "42:true");
}

#[test]
fn input_reprompts_on_bad_cast_and_raises_when_asked() {
    let runner = Runner::capturing();
    runner.feed_inputs(["oops", "7"]);
    let value = runner
        .run_source("input(\"n?\", \"int\")", "<test>")
        .expect("second value should cast");
    assert_eq!(value.to_string(), "7");
    assert!(runner.take_output().contains("Invalid input"));

    let runner = Runner::capturing();
    runner.feed_inputs(["oops"]);
    let err = runner
        .run_source("input(\"n?\", \"int\", raise = true)", "<test>")
        .expect_err("raise flag must propagate");
    assert_eq!(err.kind, ExcType::TypeError);
}

#[test]
fn var_annotation_feeds_input_expected_type() {
    let runner = Runner::capturing();
    runner.feed_inputs(["5"]);
    let value = runner
        .run_source("var n: int = input(\"n?\")\nn + 1", "<test>")
        .expect("annotation should drive the cast");
    assert_eq!(value.to_string(), "6");
}

#[test]
fn native_is_gated_by_policy() {
    let err = run_err("__native__(\"math.sqrt\", 9)");
    assert_eq!(err.kind, ExcType::SecurityError);

    let runner = Runner::capturing().with_native_defaults();
    let value = runner
        .run_source("__native__(\"math.sqrt\", 9)", "<test>")
        .expect("enabled registry should dispatch");
    assert_eq!(value.to_string(), "3.0");

    let err = Runner::capturing()
        .with_native_defaults()
        .run_source("__native__(\"no.such.fn\")", "<test>")
        .expect_err("unknown path must fail");
    assert_eq!(err.kind, ExcType::ReferenceError);
}

// ----------------------------------------------------------------------
// Strict mode
// ----------------------------------------------------------------------

#[test]
fn strict_mode_enforces_annotations() {
    let runner = Runner::capturing().strict(true);
    let err = runner
        .run_source("var n: int = \"nope\"", "<test>")
        .expect_err("strict mode must reject the mismatch");
    assert_eq!(err.kind, ExcType::TypeError);
    assert!(err.message.contains("Type mismatch for variable 'n'"));

    let runner = Runner::capturing().strict(true);
    let err = runner
        .run_source("var n: int = 1\nn = \"nope\"", "<test>")
        .expect_err("reassignment is checked too");
    assert_eq!(err.kind, ExcType::TypeError);
}

#[test]
fn strict_mode_accepts_unions_and_untyped_vars() {
    let runner = Runner::capturing().strict(true);
    let value = runner
        .run_source("var a: int|string = \"ok\"\nvar b = [1]\na", "<test>")
        .expect("union annotation should accept a string");
    assert_eq!(value.to_string(), "ok");
}

// ----------------------------------------------------------------------
// External-collaborator statements
// ----------------------------------------------------------------------

#[test]
fn serve_requires_the_external_server_runtime() {
    let err = run_err("serve http port 8361 name demo");
    assert_eq!(err.kind, ExcType::RuntimeError);
    assert!(err.message.contains("server runtime"));
}

#[test]
fn model_and_migration_declarations_are_inert() {
    let source = "model User { name: string }\nmigration init { }\n\"done\"";
    assert_eq!(run_str(source), "done");
}
