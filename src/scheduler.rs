// ABOUTME: Cooperative single-threaded task scheduler -- spawn/await and the
// ABOUTME: yield-checkpoint hook the evaluator calls at loop heads and calls.

use crate::ast::Expr;
use crate::env::Environment;
use crate::error::{SourceSpan, ZephyrError};
use crate::value::{PromiseState, PromiseValue, Value};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// Number of evaluator "operations" (loop iterations / calls) between
/// automatic checkpoints, per spec.md 4.7's suggested period.
const YIELD_PERIOD: u32 = 50;

/// A callback the scheduler uses to actually run a spawned expression; kept
/// as a trait object supplied by the caller at each call site rather than
/// stored on `Task`, since the evaluator (not the scheduler) owns scope and
/// module-loading state needed to evaluate an expression.
pub type RunFn<'a> = dyn FnMut(&Expr, Rc<Environment>) -> Result<Value, ZephyrError> + 'a;

struct Task {
    #[allow(dead_code)]
    id: usize,
    expr: Expr,
    env: Rc<Environment>,
    promise: Rc<RefCell<PromiseValue>>,
}

pub struct Scheduler {
    ready: RefCell<VecDeque<Rc<Task>>>,
    next_id: Cell<usize>,
    ops_since_checkpoint: Cell<u32>,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler { ready: RefCell::new(VecDeque::new()), next_id: Cell::new(0), ops_since_checkpoint: Cell::new(0) }
    }

    /// `spawn expr`: enqueues a task FIFO and returns its (initially
    /// pending) promise. The expression is not evaluated here.
    pub fn spawn(&self, expr: Expr, env: Rc<Environment>) -> Rc<RefCell<PromiseValue>> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let promise = Rc::new(RefCell::new(PromiseValue::pending()));
        self.ready.borrow_mut().push_back(Rc::new(Task { id, expr, env, promise: promise.clone() }));
        promise
    }

    pub fn has_ready_task(&self) -> bool {
        !self.ready.borrow().is_empty()
    }

    /// Runs the next ready task (FIFO) to completion, settling its promise.
    /// Returns `false` if the ready queue was empty.
    fn drain_one(&self, run: &mut RunFn) -> bool {
        let task = self.ready.borrow_mut().pop_front();
        let Some(task) = task else { return false };
        match run(&task.expr, task.env.clone()) {
            Ok(value) => task.promise.borrow_mut().state = PromiseState::Fulfilled(value),
            Err(err) => task.promise.borrow_mut().state = PromiseState::Rejected(err.message),
        }
        true
    }

    /// Called by the evaluator at every loop-iteration entry and every
    /// function call (spec.md 4.7). Rather than unwind the current Rust call
    /// stack (true stackful suspension isn't available without a fiber
    /// crate, which isn't in this project's dependency stack), a checkpoint
    /// lets one other ready task run to completion every `YIELD_PERIOD`
    /// operations -- enough to guarantee forward progress for all spawned
    /// tasks without starving any of them, while keeping the property that
    /// at most one task's code is ever executing at a time.
    pub fn checkpoint(&self, run: &mut RunFn) {
        let n = self.ops_since_checkpoint.get() + 1;
        if n >= YIELD_PERIOD {
            self.ops_since_checkpoint.set(0);
            self.drain_one(run);
        } else {
            self.ops_since_checkpoint.set(n);
        }
    }

    /// `await promise`: resolves immediately if already settled; otherwise
    /// runs ready tasks (in FIFO order) until this promise settles or the
    /// ready queue is exhausted, which surfaces as an `InternalError` (the
    /// promise can never resolve without a task still able to run).
    pub fn await_promise(
        &self,
        promise: &Rc<RefCell<PromiseValue>>,
        run: &mut RunFn,
        span: SourceSpan,
    ) -> Result<Value, ZephyrError> {
        loop {
            let state = promise.borrow().state.clone();
            match state {
                PromiseState::Fulfilled(value) => return Ok(value),
                PromiseState::Rejected(message) => return Err(ZephyrError::value(message, span)),
                PromiseState::Pending => {
                    if !self.drain_one(run) {
                        return Err(ZephyrError::internal(
                            "await on a promise that will never resolve (no ready tasks remain)",
                            span,
                        ));
                    }
                }
            }
        }
    }

    /// Runs every remaining ready task to completion, in FIFO order. Used at
    /// the top of a script/module/REPL entry so no spawned work is dropped.
    pub fn run_to_completion(&self, run: &mut RunFn) {
        while self.drain_one(run) {}
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ExprKind;
    use crate::error::SourceSpan;
    use crate::integer::Integer;

    fn dummy_expr() -> Expr {
        Expr::new(ExprKind::NoneLiteral, SourceSpan::default())
    }

    #[test]
    fn spawn_then_run_to_completion_resolves_promise() {
        let scheduler = Scheduler::new();
        let env = Environment::new();
        let promise = scheduler.spawn(dummy_expr(), env);
        let mut run = |_: &Expr, _: Rc<Environment>| Ok(Value::Int(Integer::default_int(7)));
        scheduler.run_to_completion(&mut run);
        match &promise.borrow().state {
            PromiseState::Fulfilled(Value::Int(i)) => assert_eq!(i.value(), 7),
            _ => panic!("expected fulfilled promise"),
        }
    }

    #[test]
    fn await_on_pending_drains_ready_queue_fifo() {
        let scheduler = Scheduler::new();
        let env = Environment::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        let p1 = scheduler.spawn(dummy_expr(), env.clone());
        let p2 = scheduler.spawn(dummy_expr(), env.clone());
        let order_clone = order.clone();
        let mut run = move |_: &Expr, _: Rc<Environment>| {
            order_clone.borrow_mut().push(order_clone.borrow().len());
            Ok(Value::None)
        };
        let result = scheduler.await_promise(&p2, &mut run, SourceSpan::default());
        assert!(result.is_ok());
        assert!(matches!(p1.borrow().state, PromiseState::Fulfilled(_)));
        assert!(matches!(p2.borrow().state, PromiseState::Fulfilled(_)));
    }

    #[test]
    fn await_with_no_ready_tasks_is_internal_error() {
        let scheduler = Scheduler::new();
        let pending = Rc::new(RefCell::new(PromiseValue::pending()));
        let mut run = |_: &Expr, _: Rc<Environment>| Ok(Value::None);
        let err = scheduler.await_promise(&pending, &mut run, SourceSpan::default()).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::InternalError);
    }
}
