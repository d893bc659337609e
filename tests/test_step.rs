//! Frame-machine observability: single-stepping, stack snapshots,
//! suspension state and host-driven cancellation.

mod harness;

use harness::Harness;
use lockstep_engine::{EngineError, PromiseState, Scope, Value};
use lockstep_engine::runner::ds::promise::ObservablePromise;

/// Condensed snapshot for progress comparison.
fn fingerprint(execution: &lockstep_engine::Execution) -> Vec<(&'static str, usize, usize, bool)> {
    execution
        .state()
        .frames
        .iter()
        .map(|f| (f.node_kind, f.index, f.sub_index, f.has_state))
        .collect()
}

#[test]
fn test_every_step_makes_observable_progress() {
    let harness = Harness::new();
    let execution = harness.execute(
        "let a = 1 + 2 * 3;\n\
         let b = a > 5 ? 'big' : 'small';\n\
         console.log(b);",
    );
    let mut guard = 0;
    while !execution.state().finished {
        let before = fingerprint(&execution);
        execution.step().unwrap();
        let after = fingerprint(&execution);
        if before == after {
            assert!(
                execution.awaiting_promise().is_some(),
                "a step changed nothing and was not an await suspension"
            );
        }
        guard += 1;
        assert!(guard < 10_000, "runaway stepping");
    }
    assert_eq!(harness.lines(), vec!["big"]);
}

#[test]
fn test_stack_depth_grows_with_nesting() {
    let harness = Harness::new();
    let execution = harness.execute("let x = 1 + (2 + (3 + 4));");
    let mut max_depth = 0;
    while !execution.state().finished {
        execution.step().unwrap();
        max_depth = max_depth.max(execution.state().frames.len());
    }
    assert!(max_depth >= 5, "max depth was {}", max_depth);
}

#[test]
fn test_frame_snapshot_shape() {
    let harness = Harness::new();
    let execution = harness.execute("let x = 0;");
    let snapshot = execution.state();
    assert_eq!(snapshot.frames.len(), 1);
    assert_eq!(snapshot.frames[0].node_kind, "Program");
    assert_eq!(snapshot.frames[0].index, 0);
    assert_eq!(snapshot.frames[0].sub_index, 0);
    assert!(!snapshot.finished);
    assert!(snapshot.awaiting.is_none());
}

#[test]
fn test_await_parks_and_resumes_via_host_promise() {
    let base = Scope::new();
    let gate = ObservablePromise::pending();
    base.declare("gate", Value::Promise(gate.clone()));
    let harness = Harness::with_base(base);
    let execution = harness.execute("console.log('before');\nconst v = await gate;\nconsole.log(v);");

    // Step until the execution suspends on the gate.
    let mut guard = 0;
    while execution.awaiting_promise().is_none() {
        execution.step().unwrap();
        guard += 1;
        assert!(guard < 1_000, "never suspended");
    }
    assert_eq!(harness.lines(), vec!["before"]);
    assert_eq!(execution.state().awaiting, Some(PromiseState::Pending));

    // While pending, stepping is a no-op.
    execution.step().unwrap();
    assert!(execution.awaiting_promise().is_some());

    gate.resolve(Value::String("opened".to_string()));
    while !execution.state().finished {
        execution.step().unwrap();
    }
    assert_eq!(harness.lines(), vec!["before", "opened"]);
}

#[test]
fn test_abort_unwinds_the_awaiting_execution() {
    let base = Scope::new();
    let gate = ObservablePromise::pending();
    base.declare("gate", Value::Promise(gate.clone()));
    let harness = Harness::with_base(base);
    let execution = harness.execute("await gate; console.log('unreachable');");

    while execution.awaiting_promise().is_none() {
        execution.step().unwrap();
    }
    // The host cancels by aborting the promise the execution is parked on.
    let parked = execution.awaiting_promise().unwrap();
    parked.abort();
    assert_eq!(parked.state(), PromiseState::Aborted);

    let error = execution.step().unwrap_err();
    assert_eq!(error, EngineError::Aborted);
    assert!(execution.state().finished);
    assert_eq!(execution.state().frames.len(), 0);
    assert_eq!(execution.outcome(), Err(EngineError::Aborted));
    assert!(harness.lines().is_empty());
}

#[test]
fn test_step_after_termination_is_an_invariant_violation() {
    let harness = Harness::new();
    let execution = harness.execute("1 + 1");
    execution.wait().unwrap();
    assert!(matches!(
        execution.step().unwrap_err(),
        EngineError::StateInvariant(_)
    ));
}

#[test]
fn test_async_calls_register_executions() {
    let harness = Harness::new();
    let execution = harness.execute("const f = async () => 1;\nawait f();");
    assert_eq!(harness.runtime.executions().len(), 1);
    execution.wait().unwrap();
    // The async body ran as its own registered execution.
    assert_eq!(harness.runtime.executions().len(), 2);
    assert!(harness.runtime.executions().iter().all(|e| e.state().finished));
}

#[test]
fn test_debug_toggle_is_mutable_at_runtime() {
    let harness = Harness::new();
    assert!(!harness.runtime.is_debug());
    harness.runtime.set_debug(true);
    assert!(harness.runtime.is_debug());
    // Stepping with tracing enabled must not disturb evaluation.
    let execution = harness.execute("console.log('traced')");
    execution.wait().unwrap();
    assert_eq!(harness.lines(), vec!["traced"]);
}
