//! Await semantics, cooperative interleaving and promise plumbing.

mod harness;

use std::time::{Duration, Instant};

use harness::{run_err, run_lines, Harness};
use lockstep_engine::{EngineError, ExecuteOptions};

#[test]
fn test_await_plain_value_completes_immediately() {
    let lines = run_lines("const x = await 41;\nconsole.log(x + 1);");
    assert_eq!(lines, vec!["42"]);
}

#[test]
fn test_nested_async_functions_run_sequentially() {
    let started = Instant::now();
    let lines = run_lines(
        "const sleep = ms => new Promise(r => setTimeout(r, ms));\n\
         const f = async () => { await sleep(10); console.log('hi') };\n\
         const g = async () => { await f(); await f() };\n\
         await g()",
    );
    assert_eq!(lines, vec!["hi", "hi"]);
    assert!(
        started.elapsed() >= Duration::from_millis(18),
        "two 10ms sleeps should not overlap"
    );
}

#[test]
fn test_promise_all_fans_out_in_deadline_order() {
    let lines = run_lines(
        "const arr = [1, 2, 3];\n\
         const sleep = ms => new Promise(r => setTimeout(r, ms));\n\
         const ps = [];\n\
         for (let i = 0; i < arr.length; i++) {\n\
           const v = arr[i];\n\
           ps.push(sleep(v * 10).then(() => console.log(v)));\n\
         }\n\
         await Promise.all(ps)",
    );
    assert_eq!(lines, vec!["1", "2", "3"]);
}

#[test]
fn test_two_executions_interleave_at_await_points() {
    let harness = Harness::new();
    let e1 = harness.execute(
        "const sleep = ms => new Promise(r => setTimeout(r, ms));\n\
         await sleep(10);\n\
         console.log('slow');",
    );
    let e2 = harness
        .runtime
        .execute(
            "const sleep = ms => new Promise(r => setTimeout(r, ms));\n\
             await sleep(3);\n\
             console.log('fast');",
            ExecuteOptions {
                desc: Some("second".to_string()),
                root_scope: harness.scope.clone(),
            },
        )
        .unwrap();
    e1.start();
    e2.start();
    e1.wait().unwrap();
    e2.wait().unwrap();
    assert_eq!(harness.lines(), vec!["fast", "slow"]);
}

#[test]
fn test_async_function_return_value() {
    let lines = run_lines("const f = async () => 5;\nconsole.log(await f());");
    assert_eq!(lines, vec!["5"]);
}

#[test]
fn test_then_chaining() {
    let lines = run_lines("const v = await Promise.resolve(1).then(x => x + 1);\nconsole.log(v);");
    assert_eq!(lines, vec!["2"]);
}

#[test]
fn test_catch_recovers_rejection() {
    let lines = run_lines(
        "const v = await Promise.reject('boom').catch(e => 'caught ' + e);\n\
         console.log(v);",
    );
    assert_eq!(lines, vec!["caught boom"]);
}

#[test]
fn test_awaiting_rejected_promise_unwinds() {
    let error = run_err("await new Promise((res, rej) => rej('boom'))");
    assert_eq!(error, EngineError::Rejected("boom".to_string()));
}

#[test]
fn test_thenable_is_adopted() {
    let lines = run_lines("const t = { then(res) { res(7) } };\nconsole.log(await t);");
    assert_eq!(lines, vec!["7"]);
}

#[test]
fn test_promise_all_empty_input() {
    let lines = run_lines("console.log((await Promise.all([])).length);");
    assert_eq!(lines, vec!["0"]);
}

#[test]
fn test_promise_is_observable_from_guest_via_instanceof() {
    let lines = run_lines(
        "const p = Promise.resolve(1);\n\
         console.log(p instanceof Promise, 1 instanceof Promise);",
    );
    assert_eq!(lines, vec!["true false"]);
}

#[test]
fn test_set_timeout_passes_extra_arguments() {
    let lines = run_lines(
        "await new Promise(r => setTimeout((a, b) => { console.log(a + b); r() }, 1, 2, 3));",
    );
    assert_eq!(lines, vec!["5"]);
}

#[test]
fn test_await_in_synchronous_function_is_rejected() {
    let error = run_err(
        "const sleep = ms => new Promise(r => setTimeout(r, ms));\n\
         const f = () => await sleep(5);\n\
         f()",
    );
    assert!(matches!(error, EngineError::StateInvariant(_)));
}

#[test]
fn test_async_failure_propagates_through_await() {
    let error = run_err("const f = async () => { missing() };\nawait f()");
    assert!(matches!(error, EngineError::Rejected(_)));
}
