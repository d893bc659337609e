//! Host globals: console formatting, JSON, Math, scope layering.

mod harness;

use harness::{run_lines, Harness};
use lockstep_engine::{Scope, Value};

#[test]
fn test_console_number_substitution() {
    let lines = run_lines("console.log('%d', 3.5);\nconsole.log('%i items', 3.9);");
    assert_eq!(lines, vec!["3.5", "3 items"]);
}

#[test]
fn test_console_string_substitution_and_rest() {
    let lines = run_lines("console.log('%s-%s', 'a', 'b');\nconsole.log('%s:', 'x', 1);");
    assert_eq!(lines, vec!["a-b", "x: 1"]);
}

#[test]
fn test_console_renders_containers() {
    let lines = run_lines("console.log([1, 'a'], { k: 2 });");
    assert_eq!(lines, vec!["[ 1, 'a' ] { k: 2 }"]);
}

#[test]
fn test_json_round_trip() {
    let lines = run_lines(
        "const x = { a: [1, 'x', true, null], b: { c: 2.5 } };\n\
         console.log(JSON.stringify(JSON.parse(JSON.stringify(x))));",
    );
    assert_eq!(lines, vec![r#"{"a":[1,"x",true,null],"b":{"c":2.5}}"#]);
}

#[test]
fn test_json_parse_values() {
    let lines = run_lines(
        "const parsed = JSON.parse('[1, 2.5, -3, \"s\", {\"k\": null}]');\n\
         console.log(parsed.length, parsed[2], parsed[3], parsed[4].k);",
    );
    assert_eq!(lines, vec!["5 -3 s null"]);
}

#[test]
fn test_json_stringify_skips_functions() {
    let lines = run_lines("console.log(JSON.stringify({ a: 1, f: () => 1 }));");
    assert_eq!(lines, vec![r#"{"a":1}"#]);
}

#[test]
fn test_math() {
    let lines = run_lines(
        "console.log(Math.abs(-4), Math.max(1, 9, 3), Math.min(2, -1), Math.floor(2.7), Math.round(2.5), Math.sqrt(16));",
    );
    assert_eq!(lines, vec!["4 9 -1 2 3 4"]);
}

#[test]
fn test_math_pi() {
    let lines = run_lines("console.log(Math.PI > 3.14 && Math.PI < 3.15);");
    assert_eq!(lines, vec!["true"]);
}

#[test]
fn test_ambient_number_globals() {
    let lines = run_lines("console.log(typeof NaN, Infinity > 1e308, undefined === void 0);");
    assert_eq!(lines, vec!["number true true"]);
}

#[test]
fn test_with_global_keeps_host_bindings() {
    // The harness installs a capturing console before with_global runs;
    // the default console must not replace it.
    let harness = Harness::new();
    harness.run("console.log('kept')").unwrap();
    assert_eq!(harness.lines(), vec!["kept"]);
}

#[test]
fn test_host_can_expose_extra_globals() {
    let base = Scope::new();
    base.declare("answer", Value::Number(42.0));
    let harness = Harness::with_base(base);
    harness.run("console.log(answer)").unwrap();
    assert_eq!(harness.lines(), vec!["42"]);
}
