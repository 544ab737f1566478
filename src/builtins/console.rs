//! Console I/O: `print` (no trailing newline) and `println` (with one).
//! Both are variadic and join arguments with a single space, mirroring the
//! teacher's console builtins; both return `none`.

use super::builtin;
use crate::env::Environment;
use crate::value::Value;
use std::rc::Rc;

pub fn register(env: &Rc<Environment>) {
    env.declare(
        "print",
        builtin("print", |args, _span, _call| {
            print_joined(args);
            Ok(Value::None)
        }),
        true,
        None,
    );

    env.declare(
        "println",
        builtin("println", |args, _span, _call| {
            print_joined(args);
            println!();
            Ok(Value::None)
        }),
        true,
        None,
    );
}

fn print_joined(args: &[Value]) {
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            print!(" ");
        }
        print!("{}", arg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceSpan;

    #[test]
    fn print_returns_none() {
        let env = Environment::new();
        register(&env);
        let Value::Builtin(print_fn) = env.get("print").unwrap() else { panic!("expected builtin") };
        let call = |_: &Value, _: &[Value], _: SourceSpan| unreachable!();
        let result = (print_fn.func)(&[Value::str("hi")], SourceSpan::default(), &call).unwrap();
        assert!(matches!(result, Value::None));
    }
}
