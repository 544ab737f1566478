//! Dict operations over Zephyr's mutable, insertion-ordered `dict` value
//! (spec.md 3.2: iteration order is spec-observable but unspecified, backed
//! by a `Vec` of pairs rather than a hash map): `keys`, `values`, `has`,
//! `get`, `set`, `remove`.

use super::builtin;
use crate::env::Environment;
use crate::error::ZephyrError;
use crate::value::Value;
use std::rc::Rc;

fn as_dict<'a>(
    name: &str,
    v: &'a Value,
    span: crate::error::SourceSpan,
) -> Result<&'a Rc<std::cell::RefCell<Vec<(Rc<str>, Value)>>>, ZephyrError> {
    match v {
        Value::Dict(d) => Ok(d),
        other => Err(ZephyrError::type_error(format!("'{}' requires a dict, found '{}'", name, other.type_name()), span)),
    }
}

fn as_key(v: &Value, span: crate::error::SourceSpan) -> Result<Rc<str>, ZephyrError> {
    match v {
        Value::Str(s) => Ok(s.clone()),
        other => Err(ZephyrError::type_error(format!("dict keys must be strings, found '{}'", other.type_name()), span)),
    }
}

pub fn register(env: &Rc<Environment>) {
    env.declare(
        "keys",
        builtin("keys", |args, span, _call| {
            let [dict] = args else { return Err(ZephyrError::type_error("'keys' takes exactly 1 argument", span)) };
            let d = as_dict("keys", dict, span)?;
            let keys = d.borrow().iter().map(|(k, _)| Value::str(k.as_ref())).collect();
            Ok(Value::list(keys))
        }),
        true,
        None,
    );

    env.declare(
        "values",
        builtin("values", |args, span, _call| {
            let [dict] = args else { return Err(ZephyrError::type_error("'values' takes exactly 1 argument", span)) };
            let d = as_dict("values", dict, span)?;
            let values = d.borrow().iter().map(|(_, v)| v.clone()).collect();
            Ok(Value::list(values))
        }),
        true,
        None,
    );

    env.declare(
        "has",
        builtin("has", |args, span, _call| {
            let [dict, key] = args else { return Err(ZephyrError::type_error("'has' takes a dict and a key", span)) };
            let d = as_dict("has", dict, span)?;
            let key = as_key(key, span)?;
            Ok(Value::Bool(d.borrow().iter().any(|(k, _)| *k == key)))
        }),
        true,
        None,
    );

    env.declare(
        "get",
        builtin("get", |args, span, _call| match args {
            [dict, key] => {
                let d = as_dict("get", dict, span)?;
                let key = as_key(key, span)?;
                let found = d.borrow().iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
                Ok(found.unwrap_or(Value::None))
            }
            [dict, key, default] => {
                let d = as_dict("get", dict, span)?;
                let key = as_key(key, span)?;
                let found = d.borrow().iter().find(|(k, _)| *k == key).map(|(_, v)| v.clone());
                Ok(found.unwrap_or_else(|| default.clone()))
            }
            _ => Err(ZephyrError::type_error("'get' takes a dict, a key, and an optional default", span)),
        }),
        true,
        None,
    );

    env.declare(
        "set",
        builtin("set", |args, span, _call| {
            let [dict, key, value] = args else {
                return Err(ZephyrError::type_error("'set' takes a dict, a key, and a value", span));
            };
            let d = as_dict("set", dict, span)?;
            let key = as_key(key, span)?;
            let mut entries = d.borrow_mut();
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some((_, existing)) => *existing = value.clone(),
                None => entries.push((key, value.clone())),
            }
            drop(entries);
            Ok(dict.clone())
        }),
        true,
        None,
    );

    env.declare(
        "remove",
        builtin("remove", |args, span, _call| {
            let [dict, key] = args else { return Err(ZephyrError::type_error("'remove' takes a dict and a key", span)) };
            let d = as_dict("remove", dict, span)?;
            let key = as_key(key, span)?;
            d.borrow_mut().retain(|(k, _)| *k != key);
            Ok(dict.clone())
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

    fn dict_of(pairs: Vec<(&str, Value)>) -> Value {
        Value::Dict(Rc::new(std::cell::RefCell::new(
            pairs.into_iter().map(|(k, v)| (Rc::from(k), v)).collect(),
        )))
    }

    #[test]
    fn set_inserts_new_key_and_overwrites_existing() {
        let env = Environment::new();
        register(&env);
        let dict = dict_of(vec![("a", Value::Bool(true))]);
        call_builtin(&env, "set", &[dict.clone(), Value::str("a"), Value::Bool(false)]);
        call_builtin(&env, "set", &[dict.clone(), Value::str("b"), Value::Bool(true)]);
        let Value::Dict(d) = &dict else { unreachable!() };
        assert_eq!(d.borrow().len(), 2);
        assert!(matches!(&d.borrow()[0].1, Value::Bool(false)));
    }

    #[test]
    fn get_falls_back_to_default_when_missing() {
        let env = Environment::new();
        register(&env);
        let dict = dict_of(vec![]);
        let result = call_builtin(&env, "get", &[dict, Value::str("missing"), Value::str("fallback")]);
        assert_eq!(result.to_string(), "fallback");
    }

    #[test]
    fn remove_drops_the_key() {
        let env = Environment::new();
        register(&env);
        let dict = dict_of(vec![("a", Value::Bool(true)), ("b", Value::Bool(false))]);
        call_builtin(&env, "remove", &[dict.clone(), Value::str("a")]);
        let Value::Dict(d) = &dict else { unreachable!() };
        assert_eq!(d.borrow().len(), 1);
        assert!(matches!(call_builtin(&env, "has", &[dict, Value::str("a")]), Value::Bool(false)));
    }
}
