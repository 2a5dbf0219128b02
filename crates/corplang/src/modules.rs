//! Module resolution, loading, and caching.
//!
//! `import name` resolves `name` through the stdlib manifest and the
//! filesystem, executes the module's top level once in a fresh environment
//! parented to the globals, and caches the exports. The cache is seeded with
//! the (empty) namespace object before the body runs and the same object is
//! filled in place on completion, so cyclic imports terminate and settle on
//! the final namespace.

use std::{
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use serde_json::Value as JsonValue;

use crate::{
    exceptions::{ExcType, Flow, RaisedException, RunResult},
    interp::{ExecContext, Interpreter},
    parse,
    value::ModuleNamespace,
};

/// One stdlib manifest entry: `{name, path, security}`.
#[derive(Debug, Clone)]
struct ManifestSpec {
    path: PathBuf,
    restricted: bool,
}

/// Strips legacy prefixes and renames so old import paths keep resolving.
fn normalize_module_name(name: &str) -> String {
    let mut normalized = name.trim();
    if let Some(rest) = normalized.strip_prefix("mf.") {
        normalized = rest;
    }
    if normalized == "core.collection" {
        return "core.collections".to_string();
    }
    if let Some(rest) = normalized.strip_prefix("core.collection.") {
        return format!("core.collections.{rest}");
    }
    normalized.to_string()
}

/// Stdlib root directories in priority order.
fn stdlib_roots(interp: &Interpreter) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(custom) = &interp.stdlib_override {
        roots.push(custom.clone());
    }
    if let Ok(active) = std::env::var("CORPLANG_ACTIVE_VERSION") {
        if !active.is_empty() && active != "local" {
            if let Some(home) = std::env::var_os("HOME") {
                roots.push(
                    Path::new(&home)
                        .join(".corplang")
                        .join("versions")
                        .join(active)
                        .join("stdlib"),
                );
            }
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.join("stdlib"));
    }
    roots.retain(|root| root.is_dir());
    roots
}

/// Reads `core/manifest.json` from the first stdlib root that has one.
fn load_manifest(roots: &[PathBuf]) -> (Option<PathBuf>, Vec<(String, ManifestSpec)>) {
    for root in roots {
        let core_dir = root.join("core");
        let manifest_path = core_dir.join("manifest.json");
        let Ok(raw) = fs::read_to_string(&manifest_path) else {
            continue;
        };
        let Ok(parsed) = serde_json::from_str::<JsonValue>(&raw) else {
            continue;
        };
        let modules = match &parsed {
            JsonValue::Object(obj) => obj.get("modules").cloned().unwrap_or(JsonValue::Null),
            other => other.clone(),
        };
        let JsonValue::Array(entries) = modules else {
            continue;
        };

        let mut specs = Vec::new();
        for entry in entries {
            match entry {
                JsonValue::String(name) => {
                    let name = name.trim().to_string();
                    if name.is_empty() {
                        continue;
                    }
                    let rel = name.strip_prefix("core.").unwrap_or(&name).replace('.', "/");
                    specs.push((
                        name,
                        ManifestSpec {
                            path: core_dir.join(format!("{rel}.mp")),
                            restricted: false,
                        },
                    ));
                }
                JsonValue::Object(fields) => {
                    let Some(name) = fields
                        .get("name")
                        .or_else(|| fields.get("module"))
                        .and_then(JsonValue::as_str)
                    else {
                        continue;
                    };
                    let path = match fields.get("path").or_else(|| fields.get("file")).and_then(JsonValue::as_str) {
                        Some(rel) => core_dir.join(rel),
                        None => {
                            let rel = name.strip_prefix("core.").unwrap_or(name).replace('.', "/");
                            core_dir.join(format!("{rel}.mp"))
                        }
                    };
                    let restricted = fields
                        .get("security")
                        .or_else(|| fields.get("policy"))
                        .and_then(JsonValue::as_str)
                        .is_some_and(|security| security.eq_ignore_ascii_case("restricted"));
                    specs.push((name.to_string(), ManifestSpec { path, restricted }));
                }
                _ => {}
            }
        }
        return (Some(core_dir), specs);
    }
    (None, Vec::new())
}

/// Filesystem candidates for a module, in resolution order.
fn candidate_paths(
    module_name: &str,
    current_file: Option<&str>,
    manifest_root: Option<&Path>,
    spec: Option<&ManifestSpec>,
) -> Vec<PathBuf> {
    let rel = module_name.replace('.', "/");
    let mut candidates = Vec::new();

    if let Some(spec) = spec {
        candidates.push(spec.path.clone());
    } else if let Some(root) = manifest_root {
        if module_name.starts_with("core.") {
            candidates.push(root.join(format!("{rel}.mp")));
        }
    }

    if let Some(current) = current_file {
        if let Some(dir) = Path::new(current).parent() {
            candidates.push(dir.join(format!("{rel}.mp")));
            candidates.push(dir.join(format!("{rel}.mf")));
        }
    }

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(format!("{rel}.mp")));
        for sub in ["src", "lib", "modules"] {
            candidates.push(cwd.join(sub).join(format!("{rel}.mp")));
        }
    }

    candidates
}

/// Resolves, executes, and caches a module. Importing the same module twice
/// yields the identical namespace object.
pub(crate) fn import_module(
    interp: &Interpreter,
    name: &str,
    current_file: Option<&str>,
) -> RunResult<Rc<ModuleNamespace>> {
    let normalized = normalize_module_name(name);

    if let Some(cached) = interp.module_cache.borrow().get(&normalized) {
        return Ok(cached.clone());
    }

    // Re-entrant import during a cycle: hand back the partial namespace that
    // was seeded before this module's body started executing.
    if interp.module_loading.borrow().contains(&normalized) {
        if let Some(partial) = interp.module_cache.borrow().get(&normalized) {
            return Ok(partial.clone());
        }
        return Ok(Rc::new(ModuleNamespace::empty(normalized)));
    }

    let roots = stdlib_roots(interp);
    let (manifest_root, specs) = load_manifest(&roots);
    let spec = specs.iter().find(|(spec_name, _)| spec_name == &normalized).map(|(_, s)| s);

    if spec.is_some_and(|s| s.restricted) {
        return Err(ExcType::security_error(format!(
            "Module '{normalized}' is restricted by stdlib policy"
        )));
    }

    let found = candidate_paths(&normalized, current_file, manifest_root.as_deref(), spec)
        .into_iter()
        .find(|candidate| candidate.is_file());

    // Seed the cache before executing so a cycle terminates on this object.
    let namespace = Rc::new(ModuleNamespace::empty(normalized.clone()));
    interp
        .module_cache
        .borrow_mut()
        .insert(normalized.clone(), namespace.clone());

    let Some(path) = found else {
        // Unresolvable modules stay empty; downstream lookups carry the
        // diagnostics.
        return Ok(namespace);
    };

    interp.module_loading.borrow_mut().insert(normalized.clone());
    let result = execute_module_body(interp, &path, &namespace);
    interp.module_loading.borrow_mut().remove(&normalized);

    match result {
        Ok(()) => Ok(namespace),
        Err(err) => {
            // A failed module must not stay cached as an empty success.
            interp.module_cache.borrow_mut().remove(&normalized);
            Err(err)
        }
    }
}

fn execute_module_body(interp: &Interpreter, path: &Path, namespace: &Rc<ModuleNamespace>) -> RunResult<()> {
    let path_str = path.to_string_lossy().to_string();
    let source = fs::read_to_string(path).map_err(|err| {
        RaisedException::new(
            ExcType::InternalRuntimeError,
            format!("Failed to read module file '{path_str}'"),
        )
        .with_cause(err.to_string())
    })?;

    let program =
        parse::parse(&source, &path_str).map_err(|exc| RaisedException::new(ExcType::SyntaxError, exc.message))?;

    let module_env = crate::env::Environment::child(&interp.globals);
    let ctx = ExecContext::root(module_env.clone(), Rc::from(path_str.as_str()));
    match interp.execute(&program, &ctx)? {
        Flow::Normal(_) => {}
        Flow::Return(_) => return Err(ExcType::syntax_error("Return statement outside of function")),
        Flow::Break => return Err(ExcType::syntax_error("'break' outside loop")),
        Flow::Continue => return Err(ExcType::syntax_error("'continue' outside loop")),
    }

    // Exports are a snapshot of the module environment taken after the top
    // level completes; filling the seeded namespace in place lets cycle
    // partners see the final bindings.
    let mut vars = namespace.vars.borrow_mut();
    for (name, value) in module_env.variables.borrow().iter() {
        vars.insert(name.clone(), value.clone());
    }
    Ok(())
}
