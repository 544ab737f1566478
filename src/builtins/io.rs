//! The filesystem primitives spec.md 1 and 6 keep in scope -- `read_file`,
//! `write_file`, `file_exists` -- routed through the capability sandbox
//! installed via [`super::set_sandbox_storage`].

use super::{builtin, with_sandbox};
use crate::env::Environment;
use crate::error::ZephyrError;
use crate::value::Value;
use std::rc::Rc;

fn as_path<'a>(name: &str, v: &'a Value, span: crate::error::SourceSpan) -> Result<&'a str, ZephyrError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(ZephyrError::type_error(format!("'{}' requires a string path, found '{}'", name, other.type_name()), span)),
    }
}

pub fn register(env: &Rc<Environment>) {
    env.declare(
        "read_file",
        builtin("read_file", |args, span, _call| {
            let [path] = args else { return Err(ZephyrError::type_error("'read_file' takes exactly 1 argument", span)) };
            let path = as_path("read_file", path, span)?;
            with_sandbox(span, |sandbox| sandbox.read_file(path)).map(Value::str)
        }),
        true,
        None,
    );

    env.declare(
        "write_file",
        builtin("write_file", |args, span, _call| {
            let [path, contents] = args else {
                return Err(ZephyrError::type_error("'write_file' takes a path and string contents", span));
            };
            let path = as_path("write_file", path, span)?;
            let contents = as_path("write_file", contents, span)?;
            with_sandbox(span, |sandbox| sandbox.write_file(path, contents))?;
            Ok(Value::None)
        }),
        true,
        None,
    );

    env.declare(
        "file_exists",
        builtin("file_exists", |args, span, _call| {
            let [path] = args else { return Err(ZephyrError::type_error("'file_exists' takes exactly 1 argument", span)) };
            let path = as_path("file_exists", path, span)?;
            with_sandbox(span, |sandbox| sandbox.file_exists(path)).map(Value::Bool)
        }),
        true,
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FsConfig;
    use crate::error::SourceSpan;
    use crate::sandbox::Sandbox;
    use serial_test::serial;
    use std::path::PathBuf;

    fn call_builtin(env: &Rc<Environment>, name: &str, args: &[Value]) -> Result<Value, ZephyrError> {
        let Value::Builtin(f) = env.get(name).unwrap() else { panic!("expected builtin") };
        let call = |_: &Value, _: &[Value], _: SourceSpan| unreachable!();
        (f.func)(args, SourceSpan::default(), &call)
    }

    fn install_sandbox() -> PathBuf {
        let dir = PathBuf::from(format!("./test_io_builtin_temp_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        let fs_config = FsConfig { allowed_paths: vec![dir.clone()], ..Default::default() };
        super::super::set_sandbox_storage(Sandbox::new(fs_config).unwrap());
        dir
    }

    #[test]
    #[serial]
    fn write_then_read_through_builtins() {
        let dir = install_sandbox();
        let env = Environment::new();
        register(&env);
        call_builtin(&env, "write_file", &[Value::str("a.txt"), Value::str("hi")]).unwrap();
        let result = call_builtin(&env, "read_file", &[Value::str("a.txt")]).unwrap();
        assert_eq!(result.to_string(), "hi");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    #[serial]
    fn file_exists_reflects_writes() {
        let dir = install_sandbox();
        let env = Environment::new();
        register(&env);
        assert!(matches!(call_builtin(&env, "file_exists", &[Value::str("missing.txt")]).unwrap(), Value::Bool(false)));
        call_builtin(&env, "write_file", &[Value::str("present.txt"), Value::str("x")]).unwrap();
        assert!(matches!(call_builtin(&env, "file_exists", &[Value::str("present.txt")]).unwrap(), Value::Bool(true)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
