//! List operations over Zephyr's mutable, ordered `list` value (spec.md
//! 3.2): `len`, `push`, `pop`, `contains`, `reverse`, `sort`, `join`, and
//! the higher-order `map`/`filter`/`reduce` trio that calls back into user
//! code via the `CallValueFn` hook every builtin receives.

use super::builtin;
use crate::env::Environment;
use crate::error::ZephyrError;
use crate::integer::Integer;
use crate::value::Value;
use std::rc::Rc;

fn as_list<'a>(name: &str, v: &'a Value, span: crate::error::SourceSpan) -> Result<&'a Rc<std::cell::RefCell<Vec<Value>>>, ZephyrError> {
    match v {
        Value::List(l) => Ok(l),
        other => Err(ZephyrError::type_error(format!("'{}' requires a list, found '{}'", name, other.type_name()), span)),
    }
}

pub fn register(env: &Rc<Environment>) {
    env.declare(
        "len",
        builtin("len", |args, span, _call| match args {
            [Value::List(l)] => Ok(Value::Int(Integer::default_int(l.borrow().len() as i64))),
            [Value::Dict(d)] => Ok(Value::Int(Integer::default_int(d.borrow().len() as i64))),
            [Value::Str(s)] => Ok(Value::Int(Integer::default_int(s.chars().count() as i64))),
            [other] => Err(ZephyrError::type_error(format!("'len' has no meaning for '{}'", other.type_name()), span)),
            _ => Err(ZephyrError::type_error("'len' takes exactly 1 argument", span)),
        }),
        true,
        None,
    );

    env.declare(
        "push",
        builtin("push", |args, span, _call| match args {
            [list, value] => {
                as_list("push", list, span)?.borrow_mut().push(value.clone());
                Ok(list.clone())
            }
            _ => Err(ZephyrError::type_error("'push' takes exactly 2 arguments (list, value)", span)),
        }),
        true,
        None,
    );

    env.declare(
        "pop",
        builtin("pop", |args, span, _call| match args {
            [list] => as_list("pop", list, span)?
                .borrow_mut()
                .pop()
                .ok_or_else(|| ZephyrError::index("pop from an empty list", span)),
            _ => Err(ZephyrError::type_error("'pop' takes exactly 1 argument", span)),
        }),
        true,
        None,
    );

    env.declare(
        "contains",
        builtin("contains", |args, span, _call| match args {
            [Value::List(l), needle] => Ok(Value::Bool(l.borrow().iter().any(|v| value_equals(v, needle)))),
            [Value::Str(s), Value::Str(needle)] => Ok(Value::Bool(s.contains(needle.as_ref()))),
            [other, _] => Err(ZephyrError::type_error(format!("'contains' has no meaning for '{}'", other.type_name()), span)),
            _ => Err(ZephyrError::type_error("'contains' takes exactly 2 arguments", span)),
        }),
        true,
        None,
    );

    env.declare(
        "reverse",
        builtin("reverse", |args, span, _call| match args {
            [Value::List(l)] => {
                let mut items = l.borrow().clone();
                items.reverse();
                Ok(Value::list(items))
            }
            [Value::Str(s)] => Ok(Value::str(s.chars().rev().collect::<String>())),
            [other] => Err(ZephyrError::type_error(format!("'reverse' has no meaning for '{}'", other.type_name()), span)),
            _ => Err(ZephyrError::type_error("'reverse' takes exactly 1 argument", span)),
        }),
        true,
        None,
    );

    env.declare(
        "sort",
        builtin("sort", |args, span, _call| {
            let [Value::List(l)] = args else {
                return Err(ZephyrError::type_error("'sort' takes exactly 1 list argument", span));
            };
            let mut items = l.borrow().clone();
            items.sort_by(|a, b| compare_values(a, b));
            Ok(Value::list(items))
        }),
        true,
        None,
    );

    env.declare(
        "join",
        builtin("join", |args, span, _call| match args {
            [Value::List(l), Value::Str(sep)] => {
                let joined = l.borrow().iter().map(|v| v.to_string()).collect::<Vec<_>>().join(sep);
                Ok(Value::str(joined))
            }
            _ => Err(ZephyrError::type_error("'join' takes a list and a string separator", span)),
        }),
        true,
        None,
    );

    env.declare(
        "map",
        builtin("map", |args, span, call| {
            let [list, f] = args else { return Err(ZephyrError::type_error("'map' takes a list and a callable", span)) };
            let items = as_list("map", list, span)?.borrow().clone();
            let mapped = items.iter().map(|item| call(f, &[item.clone()], span)).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(mapped))
        }),
        true,
        None,
    );

    env.declare(
        "filter",
        builtin("filter", |args, span, call| {
            let [list, f] = args else { return Err(ZephyrError::type_error("'filter' takes a list and a callable", span)) };
            let items = as_list("filter", list, span)?.borrow().clone();
            let mut kept = Vec::new();
            for item in items {
                if call(f, &[item.clone()], span)?.is_truthy() {
                    kept.push(item);
                }
            }
            Ok(Value::list(kept))
        }),
        true,
        None,
    );

    env.declare(
        "reduce",
        builtin("reduce", |args, span, call| {
            let [list, f, init] = args else {
                return Err(ZephyrError::type_error("'reduce' takes a list, a callable, and an initial value", span));
            };
            let items = as_list("reduce", list, span)?.borrow().clone();
            let mut acc = init.clone();
            for item in items {
                acc = call(f, &[acc, item], span)?;
            }
            Ok(acc)
        }),
        true,
        None,
    );
}

fn value_equals(a: &Value, b: &Value) -> bool {
    crate::eval::value_equals(a, b)
}

/// Orders ints and floats numerically and strings lexically; any other pair
/// (including mismatched types) is treated as equal, leaving `sort` stable
/// for values with no natural ordering rather than erroring mid-sort.
fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.value().cmp(&y.value()),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
        (Value::Int(x), Value::Float(y)) => x.as_f64().partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&y.as_f64()).unwrap_or(std::cmp::Ordering::Equal),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => std::cmp::Ordering::Equal,
    }
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
    fn push_mutates_in_place_and_returns_the_same_list() {
        let env = Environment::new();
        register(&env);
        let list = Value::list(vec![Value::Int(Integer::default_int(1))]);
        let returned = call_builtin(&env, "push", &[list.clone(), Value::Int(Integer::default_int(2))]);
        assert!(returned.is_identical(&list));
        let Value::List(l) = &list else { unreachable!() };
        assert_eq!(l.borrow().len(), 2);
    }

    #[test]
    fn len_counts_list_dict_and_string() {
        let env = Environment::new();
        register(&env);
        let list = Value::list(vec![Value::None, Value::None, Value::None]);
        assert!(matches!(call_builtin(&env, "len", &[list]), Value::Int(i) if i.value() == 3));
        assert!(matches!(call_builtin(&env, "len", &[Value::str("héllo")]), Value::Int(i) if i.value() == 5));
    }
}
