//! The concrete builtin library (spec.md 1: "out of scope beyond those a
//! test suite exercises"). A small, representative set covering the usual
//! core-library categories, adapted from prefix Lisp calls to ordinary
//! Zephyr function values bound into the global scope.
//!
//! - [console]: `print`, `println`
//! - [types]: `str`, `int`, `float`, `bool`, `type_of`, and `is_*` predicates
//! - [lists]: `len`, `push`, `pop`, `contains`, `reverse`, `sort`, `map`, `filter`, `reduce`, `join`
//! - [maps]: `keys`, `values`, `has`, `get`, `set`, `remove`
//! - [strings]: `split`, `upper`, `lower`, `trim`, `replace`, `starts_with`, `ends_with`, `repeat`
//! - [errors]: `assert`
//! - [io]: `read_file`, `write_file`, `file_exists` -- the `open`/read/write
//!   primitives spec.md 1 keeps in scope, backed by [crate::sandbox::Sandbox].

use crate::env::Environment;
use crate::error::{SourceSpan, ZephyrError};
use crate::sandbox::Sandbox;
use crate::value::{BuiltinFunction, CallValueFn, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub mod console;
pub mod errors;
pub mod io;
pub mod lists;
pub mod maps;
pub mod strings;
pub mod types;

thread_local! {
    static SANDBOX: RefCell<Option<Sandbox>> = const { RefCell::new(None) };
}

/// Installs the sandbox the `io` builtins read/write through. Call once
/// before evaluating any script that might use `read_file`/`write_file`.
pub fn set_sandbox_storage(sandbox: Sandbox) {
    SANDBOX.with(|s| *s.borrow_mut() = Some(sandbox));
}

fn with_sandbox<T>(span: SourceSpan, f: impl FnOnce(&Sandbox) -> Result<T, crate::sandbox::SandboxError>) -> Result<T, ZephyrError> {
    SANDBOX.with(|s| match s.borrow().as_ref() {
        Some(sandbox) => f(sandbox).map_err(|e| ZephyrError::io(e.to_string(), span)),
        None => Err(ZephyrError::io("no filesystem sandbox configured", span)),
    })
}

/// Wraps a plain Rust closure as a `Value::Builtin` entry, matching the
/// `(args, span, call_value)` contract every builtin implements.
pub fn builtin(
    name: &str,
    func: impl Fn(&[Value], SourceSpan, &CallValueFn<'_>) -> Result<Value, ZephyrError> + 'static,
) -> Value {
    Value::Builtin(Rc::new(BuiltinFunction { name: name.to_string(), func: Box::new(func) }))
}

pub fn register_builtins(env: &Rc<Environment>) {
    console::register(env);
    types::register(env);
    lists::register(env);
    maps::register(env);
    strings::register(env);
    errors::register(env);
    io::register(env);
}
