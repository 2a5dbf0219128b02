//! Module loader behaviour: resolution, caching, cycles, the stdlib
//! manifest, and `from … import …` binding.

use std::{fs, rc::Rc};

use corplang::{ExcType, Runner};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_module(dir: &TempDir, name: &str, source: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, source).unwrap();
    path
}

#[test]
fn import_resolves_relative_to_the_importing_file() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "util.mp", "fn double(n) { return n * 2 }\nvar tag = \"util\"");
    let main = write_module(&dir, "main.mp", "import util\nutil.double(21)");

    let value = Runner::capturing().run_path(&main).expect("import should resolve");
    assert_eq!(value.to_string(), "42");
}

#[test]
fn importing_twice_yields_the_same_namespace_object() {
    let dir = TempDir::new().unwrap();
    let module = write_module(&dir, "util.mp", "var tag = \"util\"");
    let current = module.to_string_lossy().to_string();

    let runner = Runner::capturing();
    let first = runner
        .interpreter()
        .import_module("util", Some(&current))
        .expect("first import");
    let second = runner
        .interpreter()
        .import_module("util", Some(&current))
        .expect("second import");
    assert!(Rc::ptr_eq(&first, &second), "module namespaces must keep identity");
}

#[test]
fn from_import_binds_names_and_aliases() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "shapes.mp", "fn area(w, h) { return w * h }\nvar unit = \"cm\"");
    let main = write_module(
        &dir,
        "main.mp",
        "from shapes import area as compute, unit\ncompute(3, 4) + len(unit)",
    );

    let value = Runner::capturing().run_path(&main).expect("aliased import");
    assert_eq!(value.to_string(), "14");
}

#[test]
fn from_import_of_an_unknown_name_binds_null() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "shapes.mp", "var unit = \"cm\"");
    let main = write_module(&dir, "main.mp", "from shapes import nothing\nnothing == null");

    let value = Runner::capturing().run_path(&main).expect("unknown names bind null");
    assert_eq!(value.to_string(), "true");
}

#[test]
fn dotted_imports_build_nested_namespaces() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "tools/strings.mp", "fn shout(s) { return s.toUpperCase() }");
    let main = write_module(&dir, "main.mp", "import tools.strings\ntools.strings.shout(\"hi\")");

    let value = Runner::capturing().run_path(&main).expect("dotted import");
    assert_eq!(value.to_string(), "HI");
}

#[test]
fn module_cycles_terminate_and_settle() {
    let dir = TempDir::new().unwrap();
    write_module(
        &dir,
        "a.mp",
        "import b\nfn a_value() { return 10 }\nfn use_b() { return b.b_value() + 1 }",
    );
    write_module(
        &dir,
        "b.mp",
        "import a\nfn b_value() { return 5 }\nfn use_a() { return a.a_value() + 2 }",
    );
    let main = write_module(&dir, "main.mp", "import a\nimport b\na.use_b() + b.use_a()");

    // Call-time references across the cycle resolve once both modules have
    // finished executing.
    let value = Runner::capturing().run_path(&main).expect("cycle must terminate");
    assert_eq!(value.to_string(), "18");
}

#[test]
fn unresolvable_imports_yield_an_empty_namespace() {
    let dir = TempDir::new().unwrap();
    let main = write_module(&dir, "main.mp", "import ghost\nghost.anything == null");

    let value = Runner::capturing().run_path(&main).expect("missing modules stay empty");
    assert_eq!(value.to_string(), "true");
}

#[test]
fn module_level_errors_propagate_to_the_importer() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "broken.mp", "missing_variable");
    let main = write_module(&dir, "main.mp", "import broken");

    let err = Runner::capturing().run_path(&main).expect_err("module errors surface");
    assert_eq!(err.kind, ExcType::ReferenceError);
}

#[test]
fn stdlib_manifest_controls_resolution_and_policy() {
    let dir = TempDir::new().unwrap();
    let stdlib = dir.path().join("stdlib");
    fs::create_dir_all(stdlib.join("core")).unwrap();
    fs::write(
        stdlib.join("core").join("manifest.json"),
        r#"{"modules": [
            {"name": "core.text", "path": "text.mp"},
            {"name": "core.secrets", "path": "secrets.mp", "security": "restricted"}
        ]}"#,
    )
    .unwrap();
    fs::write(
        stdlib.join("core").join("text.mp"),
        "fn shout(s) { return s.toUpperCase() }",
    )
    .unwrap();
    fs::write(stdlib.join("core").join("secrets.mp"), "var key = \"sk-123\"").unwrap();

    std::env::set_var("CORPLANG_STDLIB_PATH", &stdlib);
    let runner = Runner::capturing();
    std::env::remove_var("CORPLANG_STDLIB_PATH");

    let value = runner
        .run_source("from core.text import shout\nshout(\"ok\")", "<test>")
        .expect("manifest-resolved module should load");
    assert_eq!(value.to_string(), "OK");

    let err = runner
        .run_source("import core.secrets", "<test>")
        .expect_err("restricted modules must not load");
    assert_eq!(err.kind, ExcType::SecurityError);
    assert!(err.message.contains("restricted"));
}

#[test]
fn legacy_mf_prefix_is_normalized() {
    let dir = TempDir::new().unwrap();
    write_module(&dir, "util.mp", "var tag = \"util\"");
    let main = write_module(&dir, "main.mp", "import mf.util\nmf.util.tag");

    // Resolution strips the `mf.` prefix; the binding keeps the written path.
    let value = Runner::capturing().run_path(&main).expect("prefix is stripped");
    assert_eq!(value.to_string(), "util");
}
