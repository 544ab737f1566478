//! `assert(condition, message)` -- raises a catchable `ValueError` when the
//! condition is falsy, so user code can guard invariants with `try`/`catch`
//! the same way it handles any other runtime error (spec.md 8).

use super::builtin;
use crate::env::Environment;
use crate::error::ZephyrError;
use crate::value::Value;
use std::rc::Rc;

pub fn register(env: &Rc<Environment>) {
    env.declare(
        "assert",
        builtin("assert", |args, span, _call| match args {
            [condition] => check(condition, "assertion failed", span),
            [condition, Value::Str(message)] => check(condition, message, span),
            [condition, message] => check(condition, &message.to_string(), span),
            _ => Err(ZephyrError::type_error("'assert' takes a condition and an optional message", span)),
        }),
        true,
        None,
    );
}

fn check(condition: &Value, message: &str, span: crate::error::SourceSpan) -> Result<Value, ZephyrError> {
    if condition.is_truthy() {
        Ok(Value::None)
    } else {
        Err(ZephyrError::value(message.to_string(), span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, SourceSpan};

    fn call_builtin(env: &Rc<Environment>, name: &str, args: &[Value]) -> Result<Value, ZephyrError> {
        let Value::Builtin(f) = env.get(name).unwrap() else { panic!("expected builtin") };
        let call = |_: &Value, _: &[Value], _: SourceSpan| unreachable!();
        (f.func)(args, SourceSpan::default(), &call)
    }

    #[test]
    fn passes_silently_when_truthy() {
        let env = Environment::new();
        register(&env);
        assert!(matches!(call_builtin(&env, "assert", &[Value::Bool(true)]), Ok(Value::None)));
    }

    #[test]
    fn raises_value_error_with_custom_message() {
        let env = Environment::new();
        register(&env);
        let err = call_builtin(&env, "assert", &[Value::Bool(false), Value::str("must be positive")]).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ValueError);
        assert_eq!(err.message, "must be positive");
    }
}
