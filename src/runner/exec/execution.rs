//! Execution handles and the cooperative driver.
//!
//! An execution owns one frame stack and, while suspended at an `await`,
//! the promise it is parked on. `step` advances one frame transition;
//! `start` marks the execution runnable; `wait` pumps the runtime's event
//! loop (runnable executions, then microtasks, then due timers) until this
//! execution's stack empties. The driver never busy-spins across an await:
//! when nothing is runnable it sleeps until the next timer deadline.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Instant;

use uuid::Uuid;

use crate::parser::ast::{FunctionData, ProgramData};
use crate::runner::ds::error::EngineError;
use crate::runner::ds::frame::{AstNode, Frame, OnRet, Role};
use crate::runner::ds::promise::{ObservablePromise, PromiseState};
use crate::runner::ds::scope::Scope;
use crate::runner::ds::stack::FrameStack;
use crate::runner::ds::value::Value;
use crate::runner::eval::step::{step_once, StepEvent};
use crate::runner::exec::runtime::{ExecuteOptions, Runtime, RuntimeShared};

/// The mutable evaluation state: the frame stack plus the promise an
/// `await` is currently parked on. The stack is empty exactly when the
/// execution has terminated; `awaiting_promise` is set only while
/// suspended.
pub struct ExecutionState {
    pub stack: FrameStack,
    pub awaiting_promise: Option<ObservablePromise>,
}

pub(crate) struct ExecutionInner {
    id: String,
    desc: String,
    runtime: Weak<RuntimeShared>,
    pub(crate) state: RefCell<ExecutionState>,
    /// Return-value cell captured by the root call frame's `on_ret`.
    result: Rc<RefCell<Option<Value>>>,
    outcome: RefCell<Option<Result<Value, EngineError>>>,
    /// Settled when this execution terminates; the promise an async
    /// function call hands back.
    completion: RefCell<Option<ObservablePromise>>,
    started: Cell<bool>,
    steps: Cell<u64>,
}

#[derive(Clone)]
pub struct Execution {
    pub(crate) inner: Rc<ExecutionInner>,
}

/// Read-only view of one frame, for hosts observing the stack.
#[derive(Debug, Clone)]
pub struct FrameSnapshot {
    pub node_kind: &'static str,
    pub index: usize,
    pub sub_index: usize,
    pub role: Option<Role>,
    pub has_state: bool,
}

/// Read-only view of an execution's state.
#[derive(Debug, Clone)]
pub struct ExecutionSnapshot {
    pub frames: Vec<FrameSnapshot>,
    pub awaiting: Option<PromiseState>,
    pub finished: bool,
}

impl Execution {
    fn new(runtime: &Runtime, desc: String, root: impl FnOnce(Rc<RefCell<Option<Value>>>) -> Frame) -> Self {
        let result = Rc::new(RefCell::new(None));
        let mut stack = FrameStack::new();
        stack.push(root(result.clone()));
        Execution {
            inner: Rc::new(ExecutionInner {
                id: format!("exec_{}", Uuid::new_v4()),
                desc,
                runtime: runtime.downgrade(),
                state: RefCell::new(ExecutionState {
                    stack,
                    awaiting_promise: None,
                }),
                result,
                outcome: RefCell::new(None),
                completion: RefCell::new(None),
                started: Cell::new(false),
                steps: Cell::new(0),
            }),
        }
    }

    pub(crate) fn for_program(
        runtime: &Runtime,
        program: Rc<ProgramData>,
        options: ExecuteOptions,
    ) -> Self {
        let desc = options.desc.unwrap_or_else(|| "main".to_string());
        Execution::new(runtime, desc, |result| {
            Frame::new(
                AstNode::Program(program),
                options.root_scope,
                OnRet::Capture(result),
            )
            .with_role(Role::Call)
        })
    }

    /// Root an execution at a called function's body. `scope` is the
    /// freshly built function scope with parameters already bound.
    pub(crate) fn for_function(
        runtime: &Runtime,
        function: Rc<FunctionData>,
        scope: Scope,
        desc: String,
    ) -> Self {
        Execution::new(runtime, desc, |result| {
            Frame::new(AstNode::FunctionBody(function), scope, OnRet::Capture(result))
                .with_role(Role::Call)
        })
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn desc(&self) -> &str {
        &self.inner.desc
    }

    pub(crate) fn runtime(&self) -> Result<Runtime, EngineError> {
        Runtime::from_weak(&self.inner.runtime)
    }

    pub(crate) fn bump_steps(&self) -> u64 {
        let n = self.inner.steps.get() + 1;
        self.inner.steps.set(n);
        n
    }

    pub fn steps_taken(&self) -> u64 {
        self.inner.steps.get()
    }

    /// Observation surface: frame list bottom-to-top plus await status.
    pub fn state(&self) -> ExecutionSnapshot {
        let state = self.inner.state.borrow();
        ExecutionSnapshot {
            frames: state
                .stack
                .iter()
                .map(|f| FrameSnapshot {
                    node_kind: f.node.kind(),
                    index: f.index,
                    sub_index: f.sub_index,
                    role: f.role,
                    has_state: !f.state.is_empty(),
                })
                .collect(),
            awaiting: state.awaiting_promise.as_ref().map(|p| p.state()),
            finished: self.is_finished(),
        }
    }

    /// The promise this execution is currently parked on, if suspended.
    /// A host cancels the execution by aborting it.
    pub fn awaiting_promise(&self) -> Option<ObservablePromise> {
        self.inner.state.borrow().awaiting_promise.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.outcome.borrow().is_some()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.get()
    }

    /// Terminal outcome; an error while still running.
    pub fn outcome(&self) -> Result<Value, EngineError> {
        match &*self.inner.outcome.borrow() {
            Some(result) => result.clone(),
            None => Err(EngineError::StateInvariant(
                "execution has not terminated".to_string(),
            )),
        }
    }

    pub(crate) fn set_completion(&self, promise: ObservablePromise) {
        *self.inner.completion.borrow_mut() = Some(promise);
    }

    pub(crate) fn result_value(&self) -> Value {
        self.inner
            .result
            .borrow_mut()
            .take()
            .unwrap_or(Value::Undefined)
    }

    /// Normal termination: record the captured return value and settle the
    /// completion promise.
    pub(crate) fn finish_ok(&self) {
        let value = self.result_value();
        *self.inner.outcome.borrow_mut() = Some(Ok(value.clone()));
        if let Some(promise) = self.inner.completion.borrow_mut().take() {
            promise.resolve(value);
        }
    }

    /// Errors unwind the whole execution: no guest-side catch exists.
    pub(crate) fn fail(&self, error: EngineError) {
        {
            let mut state = self.inner.state.borrow_mut();
            state.stack.clear();
            state.awaiting_promise = None;
        }
        *self.inner.outcome.borrow_mut() = Some(Err(error.clone()));
        if let Some(promise) = self.inner.completion.borrow_mut().take() {
            let reason = if error.is_abort() {
                Value::Abort
            } else {
                Value::String(error.to_string())
            };
            promise.reject(reason);
        }
    }

    /// Advance this execution by exactly one frame transition. While the
    /// awaited promise is still pending this is a no-op.
    pub fn step(&self) -> Result<(), EngineError> {
        self.inner.started.set(true);
        match step_once(self) {
            Ok(_) => Ok(()),
            Err(error) => {
                self.fail(error.clone());
                Err(error)
            }
        }
    }

    /// Mark runnable and return. The execution advances whenever any
    /// `wait()` on this runtime pumps the event loop.
    pub fn start(&self) {
        self.inner.started.set(true);
    }

    /// Pump cooperatively until this execution terminates, then return its
    /// outcome. Other started executions of the same runtime advance in the
    /// same loop, interleaving at their await points.
    pub fn wait(&self) -> Result<Value, EngineError> {
        self.inner.started.set(true);
        let runtime = self.runtime()?;
        loop {
            let mut progressed = false;

            // Run every started execution up to its next suspension.
            let mut i = 0;
            loop {
                let execution = {
                    let list = runtime.shared.executions.borrow();
                    match list.get(i) {
                        Some(e) => e.clone(),
                        None => break,
                    }
                };
                i += 1;
                progressed |= execution.pump();
            }

            if self.is_finished() {
                return self.outcome();
            }

            // Microtask checkpoint: drain, including tasks queued while
            // draining.
            let mut ran_microtask = false;
            while let Some(task) = runtime.event_loop().pop_microtask() {
                task()?;
                ran_microtask = true;
            }
            if progressed || ran_microtask {
                continue;
            }

            // Everything is parked; fire the next timer, sleeping up to its
            // deadline.
            if let Some(due) = runtime.event_loop().next_timer_due() {
                let now = Instant::now();
                if due > now {
                    std::thread::sleep(due - now);
                }
                while let Some(task) = runtime.event_loop().pop_due_timer(Instant::now()) {
                    task()?;
                }
                continue;
            }

            return Err(EngineError::StateInvariant(format!(
                "execution \"{}\" is suspended with no pending timers or runnable work",
                self.inner.desc
            )));
        }
    }

    /// Advance until parked, finished or failed. Errors are recorded on
    /// this execution (and its completion promise), not propagated: only
    /// the `wait` target surfaces its own outcome.
    pub(crate) fn pump(&self) -> bool {
        if !self.inner.started.get() || self.is_finished() {
            return false;
        }
        if let Some(promise) = self.awaiting_promise() {
            if promise.is_pending() {
                return false;
            }
        }
        let mut progressed = false;
        loop {
            match step_once(self) {
                Ok(StepEvent::Continue) => progressed = true,
                Ok(StepEvent::Parked) => break,
                Ok(StepEvent::Finished) => {
                    progressed = true;
                    break;
                }
                Err(error) => {
                    self.fail(error);
                    progressed = true;
                    break;
                }
            }
        }
        progressed
    }
}
