//! Runtime registry.
//!
//! A runtime owns the append-only list of live executions, the shared
//! event loop, and the debug toggle. `execute` is the host entry point:
//! parse, root an execution at the program node, register it.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::parser::api::JsParser;
use crate::runner::ds::error::EngineError;
use crate::runner::ds::scope::Scope;
use crate::runner::exec::event_loop::EventLoop;
use crate::runner::exec::execution::Execution;

pub struct RuntimeOptions {
    pub is_debug: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions { is_debug: false }
    }
}

pub struct ExecuteOptions {
    /// Short label used in debug traces and error reporting.
    pub desc: Option<String>,
    /// Outermost scope of the program; typically pre-populated via
    /// `with_global`.
    pub root_scope: Scope,
}

pub struct RuntimeShared {
    pub(crate) executions: RefCell<Vec<Execution>>,
    pub(crate) is_debug: Cell<bool>,
    pub(crate) event_loop: EventLoop,
}

#[derive(Clone)]
pub struct Runtime {
    pub(crate) shared: Rc<RuntimeShared>,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> Self {
        Runtime {
            shared: Rc::new(RuntimeShared {
                executions: RefCell::new(Vec::new()),
                is_debug: Cell::new(options.is_debug),
                event_loop: EventLoop::new(),
            }),
        }
    }

    /// Parse `source` and root a new execution at its program node. The
    /// execution does not run until `step`, `start` or `wait` is called.
    pub fn execute(&self, source: &str, options: ExecuteOptions) -> Result<Execution, EngineError> {
        let program = JsParser::parse_to_ast(Rc::new(source.to_string()))?;
        let execution = Execution::for_program(self, Rc::new(program), options);
        self.register(execution.clone());
        Ok(execution)
    }

    /// Snapshot of the live executions list, in creation order.
    pub fn executions(&self) -> Vec<Execution> {
        self.shared.executions.borrow().clone()
    }

    pub fn is_debug(&self) -> bool {
        self.shared.is_debug.get()
    }

    pub fn set_debug(&self, debug: bool) {
        self.shared.is_debug.set(debug);
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.shared.event_loop
    }

    pub(crate) fn register(&self, execution: Execution) {
        self.shared.executions.borrow_mut().push(execution);
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeShared> {
        Rc::downgrade(&self.shared)
    }

    pub(crate) fn from_weak(weak: &Weak<RuntimeShared>) -> Result<Runtime, EngineError> {
        weak.upgrade()
            .map(|shared| Runtime { shared })
            .ok_or_else(|| {
                EngineError::StateInvariant("runtime dropped while executions were live".to_string())
            })
    }
}

/// Convenience constructor matching the host-facing factory shape.
pub fn create_runtime(options: RuntimeOptions) -> Runtime {
    Runtime::new(options)
}
