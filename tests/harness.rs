//! Shared helpers for the integration tests: a runtime with a capturing
//! console so scripts can assert on their output.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use lockstep_engine::runner::std_lib::console;
use lockstep_engine::{
    create_runtime, with_global, EngineError, ExecuteOptions, Runtime, RuntimeOptions, Scope, Value,
};

pub struct Harness {
    pub runtime: Runtime,
    pub lines: Rc<RefCell<Vec<String>>>,
    pub scope: Scope,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_base(Scope::new())
    }

    /// Build a harness over a caller-prepared base scope (for injecting
    /// extra host bindings before the defaults are filled in).
    pub fn with_base(base: Scope) -> Self {
        let runtime = create_runtime(RuntimeOptions::default());
        let lines = Rc::new(RefCell::new(Vec::new()));
        let sink: console::ConsoleSink = {
            let lines = lines.clone();
            Rc::new(move |line: &str| lines.borrow_mut().push(line.to_string()))
        };
        base.declare("console", console::console_object(sink));
        let scope = with_global(base, &runtime);
        Harness {
            runtime,
            lines,
            scope,
        }
    }

    pub fn execute(&self, source: &str) -> lockstep_engine::Execution {
        self.runtime
            .execute(
                source,
                ExecuteOptions {
                    desc: Some("test".to_string()),
                    root_scope: self.scope.clone(),
                },
            )
            .expect("source should parse")
    }

    pub fn run(&self, source: &str) -> Result<Value, EngineError> {
        self.execute(source).wait()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

/// Run a script on a fresh harness and return its console lines,
/// panicking on any engine error.
pub fn run_lines(source: &str) -> Vec<String> {
    let harness = Harness::new();
    harness.run(source).expect("script should run");
    harness.lines()
}

/// Run a script on a fresh harness and return its error.
pub fn run_err(source: &str) -> EngineError {
    let harness = Harness::new();
    harness
        .run(source)
        .expect_err("script should fail")
}
