// ABOUTME: Overload scoring and resolution per spec.md 4.4 -- arity
// ABOUTME: filtering, per-parameter scoring, ambiguity detection, and the
// ABOUTME: implicit integer/string/float conversions the winning call applies.

use crate::ast::Param;
use crate::error::{SourceSpan, ZephyrError};
use crate::integer::{Integer, IntegerKind};
use crate::value::{Overload, Value};

const SCORE_EXACT: i64 = 1000;
const SCORE_INTERFACE: i64 = 950;
const SCORE_UNTYPED: i64 = 800;
const SCORE_CONVERSION_BASE: i64 = 500;

/// What must happen to an argument to satisfy a parameter, beyond moving it
/// into place: an implicit integer widen/narrow, or a to-string conversion.
#[derive(Clone)]
enum Conversion {
    None,
    IntTo(IntegerKind),
    ToStringFromInt,
    ToStringFromBool,
    ToStringFromFloat,
    IntToFloat,
}

fn type_names_equivalent(param_type: &str, arg_type: &str) -> bool {
    param_type == arg_type || (matches!(param_type, "int" | "i32") && matches!(arg_type, "int" | "i32"))
}

fn score_param(param: &Param, arg: &Value) -> Option<(i64, Conversion)> {
    let Some(declared) = &param.type_name else {
        return Some((SCORE_UNTYPED, Conversion::None));
    };
    let arg_type = arg.type_name();
    if type_names_equivalent(declared, &arg_type) {
        return Some((SCORE_EXACT, Conversion::None));
    }
    if let Value::Instance(inst) = arg {
        if inst.class.implements(declared) || inst.class.is_subclass_of(declared) {
            return Some((SCORE_INTERFACE, Conversion::None));
        }
    }
    // Implicit integer widening between kinds.
    if let (Value::Int(i), Some(target)) = (
        arg,
        IntegerKind::from_suffix(declared).or(if declared == "int" { Some(IntegerKind::DefaultInt) } else { None }),
    ) {
        if let Some(distance) = i.kind().widening_distance_to(target) {
            return Some((SCORE_CONVERSION_BASE - distance as i64, Conversion::IntTo(target)));
        }
    }
    match (declared.as_str(), arg) {
        ("string", Value::Int(_)) => Some((SCORE_CONVERSION_BASE - 2, Conversion::ToStringFromInt)),
        ("string", Value::Bool(_)) => Some((SCORE_CONVERSION_BASE - 2, Conversion::ToStringFromBool)),
        ("string", Value::Float(_)) => Some((SCORE_CONVERSION_BASE - 2, Conversion::ToStringFromFloat)),
        ("float", Value::Int(_)) => Some((SCORE_CONVERSION_BASE - 1, Conversion::IntToFloat)),
        _ => None,
    }
}

fn apply_conversion(conv: &Conversion, arg: Value, span: SourceSpan) -> Result<Value, ZephyrError> {
    match conv {
        Conversion::None => Ok(arg),
        Conversion::IntTo(kind) => match arg {
            Value::Int(i) => Ok(Value::Int(i.convert_to(*kind).map_err(|e| {
                ZephyrError::type_error(e.message, span)
            })?)),
            other => Ok(other),
        },
        Conversion::ToStringFromInt | Conversion::ToStringFromBool | Conversion::ToStringFromFloat => {
            Ok(Value::str(arg.to_string()))
        }
        Conversion::IntToFloat => match arg {
            Value::Int(i) => Ok(Value::Float(i.as_f64())),
            other => Ok(other),
        },
    }
}

struct Scored {
    overload: Overload,
    score: i64,
    conversions: Vec<Conversion>,
}

/// Resolves `name(args)` against `candidates`, returning the winning
/// overload's function value plus the argument list after any implicit
/// conversions the winning signature requires. `TypeError`s list the
/// signature(s) involved, per spec.md 7.
pub fn resolve(
    name: &str,
    candidates: &[Overload],
    args: &[Value],
    span: SourceSpan,
) -> Result<(Overload, Vec<Value>), ZephyrError> {
    let mut scored: Vec<Scored> = Vec::new();
    for overload in candidates {
        let params = &overload.function.decl.params;
        if params.len() != args.len() {
            continue;
        }
        let mut total = 0i64;
        let mut conversions = Vec::with_capacity(params.len());
        let mut matched = true;
        for (param, arg) in params.iter().zip(args.iter()) {
            match score_param(param, arg) {
                Some((score, conv)) => {
                    total += score;
                    conversions.push(conv);
                }
                None => {
                    matched = false;
                    break;
                }
            }
        }
        if matched {
            scored.push(Scored { overload: overload.clone(), score: total, conversions });
        }
    }

    if scored.is_empty() {
        return Err(ZephyrError::type_error(
            format!(
                "no matching overload for '{}({})' among {} candidate(s): {}",
                name,
                args.iter().map(|a| a.type_name()).collect::<Vec<_>>().join(", "),
                candidates.len(),
                candidates
                    .iter()
                    .map(|o| format_signature(name, &o.function.decl.params))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            span,
        ));
    }

    let max_score = scored.iter().map(|s| s.score).max().unwrap();
    let winners: Vec<&Scored> = scored.iter().filter(|s| s.score == max_score).collect();
    if winners.len() > 1 {
        return Err(ZephyrError::type_error(
            format!(
                "ambiguous call to '{}': {} candidates tie at score {}: {}",
                name,
                winners.len(),
                max_score,
                winners
                    .iter()
                    .map(|s| format_signature(name, &s.overload.function.decl.params))
                    .collect::<Vec<_>>()
                    .join("; "),
            ),
            span,
        ));
    }

    let winner = &scored[scored.iter().position(|s| s.score == max_score).unwrap()];
    let mut converted = Vec::with_capacity(args.len());
    for (arg, conv) in args.iter().zip(winner.conversions.iter()) {
        converted.push(apply_conversion(conv, arg.clone(), span)?);
    }
    Ok((winner.overload.clone(), converted))
}

pub fn format_signature(name: &str, params: &[Param]) -> String {
    let parts: Vec<String> = params
        .iter()
        .map(|p| match &p.type_name {
            Some(t) => format!("{}: {}", p.name, t),
            None => p.name.clone(),
        })
        .collect();
    format!("{}({})", name, parts.join(", "))
}

/// Rejects registering a second overload whose parameter-type sequence
/// exactly matches an existing one, per spec.md 4.4's duplicate-signature
/// rule.
pub fn check_duplicate(name: &str, existing: &[Overload], new_params: &[Param], span: SourceSpan) -> Result<(), ZephyrError> {
    for overload in existing {
        let other = &overload.function.decl.params;
        if other.len() == new_params.len()
            && other.iter().zip(new_params.iter()).all(|(a, b)| a.type_name == b.type_name)
        {
            return Err(ZephyrError::type_error(
                format!("duplicate overload for '{}': {}", name, format_signature(name, new_params)),
                span,
            ));
        }
    }
    Ok(())
}

/// Constructs a single best-fit integer from an argument when coercing a
/// return value to a declared return type (spec.md 4.5 "Returns").
pub fn coerce_to_declared_type(value: Value, declared: &str, span: SourceSpan) -> Result<Value, ZephyrError> {
    let arg_type = value.type_name();
    if type_names_equivalent(declared, &arg_type) {
        return Ok(value);
    }
    if let (Value::Int(i), Some(target)) = (
        &value,
        IntegerKind::from_suffix(declared).or(if declared == "int" { Some(IntegerKind::DefaultInt) } else { None }),
    ) {
        if i.kind().widening_distance_to(target).is_some() {
            let converted: Integer = i.convert_to(target).map_err(|e| ZephyrError::type_error(e.message, span))?;
            return Ok(Value::Int(converted));
        }
    }
    match (declared, &value) {
        ("float", Value::Int(i)) => return Ok(Value::Float(i.as_f64())),
        ("string", Value::Int(_) | Value::Bool(_) | Value::Float(_)) => return Ok(Value::str(value.to_string())),
        _ => {}
    }
    if let Value::Instance(inst) = &value {
        if inst.class.implements(declared) || inst.class.is_subclass_of(declared) {
            return Ok(value);
        }
    }
    Err(ZephyrError::type_error(
        format!("cannot coerce value of type '{}' to declared type '{}'", arg_type, declared),
        span,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FunctionDecl;
    use crate::env::Environment;
    use crate::value::FunctionValue;
    use std::rc::Rc;

    fn make_overload(name: &str, params: Vec<Param>) -> Overload {
        let decl = FunctionDecl {
            name: name.to_string(),
            params,
            return_type: None,
            body: vec![],
            is_async: false,
            is_abstract: false,
            is_internal: false,
        };
        Overload { function: Rc::new(FunctionValue { decl: Rc::new(decl), closure: Environment::new() }) }
    }

    fn param(name: &str, type_name: Option<&str>) -> Param {
        Param { name: name.to_string(), type_name: type_name.map(String::from), is_const: false, default: None }
    }

    #[test]
    fn exact_int_vs_float_overload() {
        let int_fn = make_overload("f", vec![param("x", Some("int"))]);
        let float_fn = make_overload("f", vec![param("x", Some("float"))]);
        let candidates = vec![int_fn, float_fn];

        let (picked, _) = resolve("f", &candidates, &[Value::Int(Integer::default_int(3))], SourceSpan::default()).unwrap();
        assert_eq!(picked.function.decl.params[0].type_name.as_deref(), Some("int"));

        let (picked, _) = resolve("f", &candidates, &[Value::Float(3.0)], SourceSpan::default()).unwrap();
        assert_eq!(picked.function.decl.params[0].type_name.as_deref(), Some("float"));
    }

    #[test]
    fn no_match_is_type_error_listing_candidates() {
        let int_fn = make_overload("f", vec![param("x", Some("int"))]);
        let float_fn = make_overload("f", vec![param("x", Some("float"))]);
        let err = resolve("f", &[int_fn, float_fn], &[Value::str("s")], SourceSpan::default()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeError);
        assert!(err.message.contains("int"));
        assert!(err.message.contains("float"));
    }

    #[test]
    fn ambiguous_tie_is_type_error() {
        let a = make_overload("f", vec![param("x", None)]);
        let b = make_overload("f", vec![param("y", None)]);
        let err = resolve("f", &[a, b], &[Value::Bool(true)], SourceSpan::default()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeError);
        assert!(err.message.contains("ambiguous"));
    }

    #[test]
    fn duplicate_signature_rejected() {
        let existing = vec![make_overload("f", vec![param("x", Some("int"))])];
        let err = check_duplicate("f", &existing, &[param("y", Some("int"))], SourceSpan::default()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::TypeError);
    }
}
