//! Type conversions (`str`, `int`, `float`, `bool`) and predicates
//! (`type_of` plus the `is_*` family), widened from a `number?`/`string?`/
//! `list?`/`nil?`/`bool?`-style predicate set to cover every Zephyr value
//! variant and the unified integer kinds (spec.md 3.2).

use super::builtin;
use crate::env::Environment;
use crate::error::ZephyrError;
use crate::integer::Integer;
use crate::value::Value;
use std::rc::Rc;

fn arity1<'a>(name: &str, args: &'a [Value], span: crate::error::SourceSpan) -> Result<&'a Value, ZephyrError> {
    match args {
        [v] => Ok(v),
        _ => Err(ZephyrError::type_error(format!("'{}' takes exactly 1 argument, got {}", name, args.len()), span)),
    }
}

pub fn register(env: &Rc<Environment>) {
    env.declare(
        "str",
        builtin("str", |args, span, _call| Ok(Value::str(arity1("str", args, span)?.to_string()))),
        true,
        None,
    );

    env.declare(
        "int",
        builtin("int", |args, span, _call| {
            let v = arity1("int", args, span)?;
            match v {
                Value::Int(i) => Ok(Value::Int(*i)),
                Value::Float(f) => Ok(Value::Int(Integer::default_int(*f as i64))),
                Value::Bool(b) => Ok(Value::Int(Integer::default_int(*b as i64))),
                Value::Str(s) => Integer::from_str_with_suffix(s.trim())
                    .map(Value::Int)
                    .map_err(|e| ZephyrError::value(format!("cannot parse '{}' as int: {}", s, e.message), span)),
                other => Err(ZephyrError::type_error(format!("cannot convert '{}' to int", other.type_name()), span)),
            }
        }),
        true,
        None,
    );

    env.declare(
        "float",
        builtin("float", |args, span, _call| {
            let v = arity1("float", args, span)?;
            match v {
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Int(i) => Ok(Value::Float(i.as_f64())),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|e| ZephyrError::value(format!("cannot parse '{}' as float: {}", s, e), span)),
                other => Err(ZephyrError::type_error(format!("cannot convert '{}' to float", other.type_name()), span)),
            }
        }),
        true,
        None,
    );

    env.declare(
        "bool",
        builtin("bool", |args, span, _call| Ok(Value::Bool(arity1("bool", args, span)?.is_truthy()))),
        true,
        None,
    );

    env.declare(
        "type_of",
        builtin("type_of", |args, span, _call| Ok(Value::str(arity1("type_of", args, span)?.type_name()))),
        true,
        None,
    );

    for (name, kind) in [
        ("is_int", "int_family"),
        ("is_float", "float"),
        ("is_string", "string"),
        ("is_bool", "bool"),
        ("is_none", "none"),
        ("is_list", "list"),
        ("is_dict", "dict"),
    ] {
        let kind = kind.to_string();
        env.declare(
            name,
            builtin(name, move |args, span, _call| {
                let v = arity1(name, args, span)?;
                let matched = match kind.as_str() {
                    "int_family" => matches!(v, Value::Int(_)),
                    "float" => matches!(v, Value::Float(_)),
                    "string" => matches!(v, Value::Str(_)),
                    "bool" => matches!(v, Value::Bool(_)),
                    "none" => matches!(v, Value::None),
                    "list" => matches!(v, Value::List(_)),
                    "dict" => matches!(v, Value::Dict(_)),
                    _ => unreachable!(),
                };
                Ok(Value::Bool(matched))
            }),
            true,
            None,
        );
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
    fn str_formats_int_and_float() {
        let env = Environment::new();
        register(&env);
        assert_eq!(call_builtin(&env, "str", &[Value::Int(Integer::default_int(7))]).to_string(), "7");
        assert_eq!(call_builtin(&env, "str", &[Value::Float(1.5)]).to_string(), "1.5");
    }

    #[test]
    fn type_of_reports_int_kind_suffix() {
        let env = Environment::new();
        register(&env);
        let u8_val = Value::Int(Integer::new(5, crate::integer::IntegerKind::U8).unwrap());
        assert_eq!(call_builtin(&env, "type_of", &[u8_val]).to_string(), "u8");
    }

    #[test]
    fn int_parses_string() {
        let env = Environment::new();
        register(&env);
        let result = call_builtin(&env, "int", &[Value::str("42")]);
        assert!(matches!(result, Value::Int(i) if i.value() == 42));
    }
}
