// ABOUTME: End-to-end tests running complete Zephyr programs through the
// ABOUTME: public lexer -> parser -> evaluator pipeline, not individual units.

use std::rc::Rc;
use zephyr::env::Environment;
use zephyr::error::ZephyrError;
use zephyr::eval::Evaluator;
use zephyr::module_loader::ModuleLoader;
use zephyr::value::Value;

fn setup() -> (Evaluator, Rc<Environment>) {
    let env = Environment::new();
    zephyr::builtins::register_builtins(&env);
    (Evaluator::new(ModuleLoader::new(vec![])), env)
}

fn run(evaluator: &Evaluator, env: &Rc<Environment>, code: &str) -> Result<Value, ZephyrError> {
    let program = zephyr::parser::parse(code)?;
    evaluator.eval_program(&program, env)
}

#[test]
fn factorial_program() {
    let (evaluator, env) = setup();
    run(
        &evaluator,
        &env,
        "func factorial(n : int) { if (n <= 1) { return 1; } return n * factorial(n - 1); }",
    )
    .unwrap();
    assert_eq!(run(&evaluator, &env, "factorial(5);").unwrap().to_string(), "120");
    assert_eq!(run(&evaluator, &env, "factorial(0);").unwrap().to_string(), "1");
}

#[test]
fn fibonacci_program() {
    let (evaluator, env) = setup();
    run(
        &evaluator,
        &env,
        "func fib(n : int) { if (n < 2) { return n; } return fib(n - 1) + fib(n - 2); }",
    )
    .unwrap();
    assert_eq!(run(&evaluator, &env, "fib(10);").unwrap().to_string(), "55");
}

#[test]
fn higher_order_list_pipeline() {
    let (evaluator, env) = setup();
    let v = run(
        &evaluator,
        &env,
        "var xs = [1, 2, 3, 4, 5]; var doubled = map(xs, (x) -> x * 2); var evens = filter(doubled, (x) -> x % 4 == 0); reduce(evens, (acc, x) -> acc + x, 0);",
    )
    .unwrap();
    assert_eq!(v.to_string(), "12");
}

#[test]
fn closures_capture_independently() {
    let (evaluator, env) = setup();
    let v = run(
        &evaluator,
        &env,
        "func make_counter() { var n = 0; return () -> { n = n + 1; return n; }; } var c1 = make_counter(); var c2 = make_counter(); c1(); c1(); c2(); c1() + c2();",
    )
    .unwrap();
    assert_eq!(v.to_string(), "4");
}

#[test]
fn class_hierarchy_with_interface_and_super() {
    let (evaluator, env) = setup();
    let v = run(
        &evaluator,
        &env,
        r#"
        interface Shape {
            func area() -> float;
        }
        abstract class Base : Shape {
            func describe() { return "area=" + str(this.area()); }
        }
        class Square : Base {
            var side : float = 0.0;
            func init(side : float) { this.side = side; }
            func area() -> float { return this.side * this.side; }
        }
        var s = Square(3.0);
        s.describe();
        "#,
    )
    .unwrap();
    assert_eq!(v.to_string(), "area=9.0");
}

#[test]
fn quicksort_algorithm() {
    let (evaluator, env) = setup();
    run(
        &evaluator,
        &env,
        r#"
        func quicksort(xs) {
            if (len(xs) <= 1) { return xs; }
            var pivot = xs[0];
            var rest = xs[1:];
            var sorted = quicksort(filter(rest, (x) -> x < pivot));
            push(sorted, pivot);
            for (x in quicksort(filter(rest, (x) -> x >= pivot))) { push(sorted, x); }
            return sorted;
        }
        "#,
    )
    .unwrap();
    let v = run(&evaluator, &env, "quicksort([5, 3, 8, 1, 9, 2]);").unwrap();
    assert_eq!(v.to_string(), "[1, 2, 3, 5, 8, 9]");
}

#[test]
fn try_catch_and_throw_unwind_across_calls() {
    let (evaluator, env) = setup();
    let v = run(
        &evaluator,
        &env,
        r#"
        func risky(x : int) {
            if (x < 0) { throw "negative input"; }
            return x * 2;
        }
        var msg = "";
        try { risky(-1); } catch (e) { msg = e; }
        msg;
        "#,
    )
    .unwrap();
    assert_eq!(v.to_string(), "negative input");
}

#[test]
fn cooperative_async_program() {
    let (evaluator, env) = setup();
    let v = run(
        &evaluator,
        &env,
        r#"
        func fetch(id : int) { return id * 10; }
        var p1 = spawn fetch(1);
        var p2 = spawn fetch(2);
        await p1 + await p2;
        "#,
    )
    .unwrap();
    assert_eq!(v.to_string(), "30");
}

#[test]
fn enum_variants_round_trip_through_a_function_call() {
    let (evaluator, env) = setup();
    run(
        &evaluator,
        &env,
        r#"
        enum Shape { Circle(radius), Square(side) }
        func describe(shape) { return str(shape); }
        "#,
    )
    .unwrap();
    let v = run(&evaluator, &env, "describe(Shape.Circle(2));").unwrap();
    assert_eq!(v.to_string(), "Shape.Circle(2)");
}

#[test]
fn runtime_errors_carry_a_source_span() {
    let (evaluator, env) = setup();
    let err = run(&evaluator, &env, "var x = 1 / 0;").unwrap_err();
    assert_eq!(err.kind, zephyr::error::ErrorKind::ZeroDivisionError);
    assert!(err.span.line >= 1);
}
