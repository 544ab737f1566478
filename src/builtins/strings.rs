//! String manipulation: `split`, `upper`, `lower`, `trim`, `replace`,
//! `starts_with`, `ends_with`, `repeat`.

use super::builtin;
use crate::env::Environment;
use crate::error::ZephyrError;
use crate::value::Value;
use std::rc::Rc;

fn as_str<'a>(name: &str, v: &'a Value, span: crate::error::SourceSpan) -> Result<&'a Rc<str>, ZephyrError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(ZephyrError::type_error(format!("'{}' requires a string, found '{}'", name, other.type_name()), span)),
    }
}

pub fn register(env: &Rc<Environment>) {
    env.declare(
        "split",
        builtin("split", |args, span, _call| {
            let [s, sep] = args else { return Err(ZephyrError::type_error("'split' takes a string and a separator", span)) };
            let s = as_str("split", s, span)?;
            let sep = as_str("split", sep, span)?;
            let parts = if sep.is_empty() {
                s.chars().map(|c| Value::str(c.to_string())).collect()
            } else {
                s.split(sep.as_ref()).map(Value::str).collect()
            };
            Ok(Value::list(parts))
        }),
        true,
        None,
    );

    env.declare(
        "upper",
        builtin("upper", |args, span, _call| {
            let [s] = args else { return Err(ZephyrError::type_error("'upper' takes exactly 1 argument", span)) };
            Ok(Value::str(as_str("upper", s, span)?.to_uppercase()))
        }),
        true,
        None,
    );

    env.declare(
        "lower",
        builtin("lower", |args, span, _call| {
            let [s] = args else { return Err(ZephyrError::type_error("'lower' takes exactly 1 argument", span)) };
            Ok(Value::str(as_str("lower", s, span)?.to_lowercase()))
        }),
        true,
        None,
    );

    env.declare(
        "trim",
        builtin("trim", |args, span, _call| {
            let [s] = args else { return Err(ZephyrError::type_error("'trim' takes exactly 1 argument", span)) };
            Ok(Value::str(as_str("trim", s, span)?.trim().to_string()))
        }),
        true,
        None,
    );

    env.declare(
        "replace",
        builtin("replace", |args, span, _call| {
            let [s, from, to] = args else {
                return Err(ZephyrError::type_error("'replace' takes a string, a pattern, and a replacement", span));
            };
            let s = as_str("replace", s, span)?;
            let from = as_str("replace", from, span)?;
            let to = as_str("replace", to, span)?;
            Ok(Value::str(s.replace(from.as_ref(), to)))
        }),
        true,
        None,
    );

    env.declare(
        "starts_with",
        builtin("starts_with", |args, span, _call| {
            let [s, prefix] = args else { return Err(ZephyrError::type_error("'starts_with' takes a string and a prefix", span)) };
            let s = as_str("starts_with", s, span)?;
            let prefix = as_str("starts_with", prefix, span)?;
            Ok(Value::Bool(s.starts_with(prefix.as_ref())))
        }),
        true,
        None,
    );

    env.declare(
        "ends_with",
        builtin("ends_with", |args, span, _call| {
            let [s, suffix] = args else { return Err(ZephyrError::type_error("'ends_with' takes a string and a suffix", span)) };
            let s = as_str("ends_with", s, span)?;
            let suffix = as_str("ends_with", suffix, span)?;
            Ok(Value::Bool(s.ends_with(suffix.as_ref())))
        }),
        true,
        None,
    );

    env.declare(
        "repeat",
        builtin("repeat", |args, span, _call| {
            let [s, count] = args else { return Err(ZephyrError::type_error("'repeat' takes a string and a count", span)) };
            let s = as_str("repeat", s, span)?;
            let count = match count {
                Value::Int(i) if i.value() >= 0 => i.value() as usize,
                Value::Int(_) => return Err(ZephyrError::value("'repeat' count must not be negative", span)),
                other => return Err(ZephyrError::type_error(format!("'repeat' count must be an int, found '{}'", other.type_name()), span)),
            };
            Ok(Value::str(s.repeat(count)))
        }),
        true,
        None,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceSpan;

    fn call_builtin(env: &Rc<Environment>, name: &str, args: &[Value]) -> Value {
        let Value::Builtin(f) = env.get(name).unwrap() else { panic!("expected builtin") };
        let call = |_: &Value, _: &[Value], _: SourceSpan| unreachable!();
        (f.func)(args, SourceSpan::default(), &call).unwrap()
    }

    #[test]
    fn split_on_delimiter() {
        let env = Environment::new();
        register(&env);
        let result = call_builtin(&env, "split", &[Value::str("a,b,c"), Value::str(",")]);
        let Value::List(l) = result else { panic!("expected list") };
        let parts: Vec<String> = l.borrow().iter().map(|v| v.to_string()).collect();
        assert_eq!(parts, vec!["a", "b", "c"]);
    }

    #[test]
    fn upper_and_lower_round_trip() {
        let env = Environment::new();
        register(&env);
        assert_eq!(call_builtin(&env, "upper", &[Value::str("Hi")]).to_string(), "HI");
        assert_eq!(call_builtin(&env, "lower", &[Value::str("Hi")]).to_string(), "hi");
    }

    #[test]
    fn replace_substitutes_every_occurrence() {
        let env = Environment::new();
        register(&env);
        let result = call_builtin(&env, "replace", &[Value::str("a-b-c"), Value::str("-"), Value::str("_")]);
        assert_eq!(result.to_string(), "a_b_c");
    }
}
