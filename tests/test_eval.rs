//! Synchronous end-to-end semantics through the public API.

mod harness;

use harness::{run_err, run_lines, Harness};
use lockstep_engine::{EngineError, Value};

#[test]
fn test_arithmetic_and_precedence() {
    let lines = run_lines("console.log(2 + 3 * 4, (2 + 3) * 4, 2 ** 3 ** 2, 7 % 4)");
    assert_eq!(lines, vec!["14 20 512 3"]);
}

#[test]
fn test_string_concatenation() {
    let lines = run_lines("console.log('a' + 1 + 2, 1 + 2 + 'a')");
    assert_eq!(lines, vec!["a12 3a"]);
}

#[test]
fn test_block_scoping_and_shadowing() {
    let lines = run_lines(
        "let x = 1;\n\
         {\n\
           let x = 2;\n\
           console.log(x);\n\
         }\n\
         console.log(x);",
    );
    assert_eq!(lines, vec!["2", "1"]);
}

#[test]
fn test_closure_shares_captured_scope() {
    let lines = run_lines(
        "const make = () => {\n\
           let n = 0;\n\
           return {\n\
             inc() { n = n + 1; return n },\n\
             get() { return n }\n\
           };\n\
         };\n\
         const c = make();\n\
         c.inc();\n\
         c.inc();\n\
         console.log(c.get());",
    );
    assert_eq!(lines, vec!["2"]);
}

#[test]
fn test_method_this_binding() {
    let lines = run_lines("const o = { x: 7, get() { return this.x } };\nconsole.log(o.get())");
    assert_eq!(lines, vec!["7"]);
}

#[test]
fn test_leibniz_pi() {
    let lines = run_lines(
        "const calc = N => { let s = 0, d = 1, g = 1; for (let i = 0; i < N; i++) { s += g / d; d += 2; g *= -1 } return s * 4 };\n\
         console.log('%d', calc(20000))",
    );
    let value: f64 = lines[0].parse().expect("numeric output");
    assert!((value - std::f64::consts::PI).abs() < 1e-4, "got {}", value);
}

#[test]
fn test_tdz_read_fails() {
    let error = run_err("console.log(a); let a = 1");
    assert_eq!(error, EngineError::UninitializedRead("a".to_string()));
}

#[test]
fn test_undeclared_identifier_fails() {
    let error = run_err("nope + 1");
    assert_eq!(error, EngineError::UndefinedIdentifier("nope".to_string()));
}

#[test]
fn test_short_circuit_skips_right_side() {
    let lines = run_lines(
        "let hits = 0;\n\
         const t = () => { hits++; return true };\n\
         false && t();\n\
         true || t();\n\
         1 ?? t();\n\
         console.log(hits);",
    );
    assert_eq!(lines, vec!["0"]);
}

#[test]
fn test_argument_evaluation_order() {
    let lines = run_lines(
        "const t = n => { console.log(n); return n };\n\
         const f = (...xs) => xs.length;\n\
         console.log(f(t(1), t(2), t(3)));",
    );
    assert_eq!(lines, vec!["1", "2", "3", "3"]);
}

#[test]
fn test_update_expressions() {
    let lines = run_lines("let i = 0;\nconsole.log(i++, i, ++i, i--, i);");
    assert_eq!(lines, vec!["0 1 2 2 1"]);
}

#[test]
fn test_compound_assignments() {
    let lines = run_lines(
        "let n = 10;\n\
         n += 5; n -= 3; n *= 2; n /= 4; n **= 2;\n\
         console.log(n);",
    );
    // ((10 + 5 - 3) * 2 / 4) ** 2
    assert_eq!(lines, vec!["36"]);
}

#[test]
fn test_logical_assignment_operators_short_circuit_separately() {
    let lines = run_lines(
        "let a = null, b = 0, c = 1;\n\
         a ??= 'filled';\n\
         b ||= 7;\n\
         c &&= 9;\n\
         let kept = 'orig';\n\
         kept ??= 'clobbered';\n\
         console.log(a, b, c, kept);",
    );
    assert_eq!(lines, vec!["filled 7 9 orig"]);
}

#[test]
fn test_for_loop_break_continue() {
    let lines = run_lines(
        "let s = 0;\n\
         for (let i = 0; i < 10; i++) {\n\
           if (i % 2) continue;\n\
           if (i > 6) break;\n\
           s += i;\n\
         }\n\
         console.log(s);",
    );
    assert_eq!(lines, vec!["12"]);
}

#[test]
fn test_while_continue() {
    let lines = run_lines(
        "let i = 0, c = 0;\n\
         while (i < 5) { i++; if (i % 2) continue; c++ }\n\
         console.log(i, c);",
    );
    assert_eq!(lines, vec!["5 2"]);
}

#[test]
fn test_do_while_runs_body_first() {
    let lines = run_lines("let n = 10;\ndo { n++ } while (n < 3);\nconsole.log(n);");
    assert_eq!(lines, vec!["11"]);
}

#[test]
fn test_loop_closures_capture_per_iteration_binding() {
    let lines = run_lines(
        "const fs = [];\n\
         for (let i = 0; i < 3; i++) { fs.push(() => i) }\n\
         console.log(fs[0](), fs[1](), fs[2]());",
    );
    assert_eq!(lines, vec!["0 1 2"]);
}

#[test]
fn test_arrays() {
    let lines = run_lines(
        "const a = [1, , 3];\n\
         console.log(a.length, a[1]);\n\
         a.push(4);\n\
         console.log(a.length, a.indexOf(3), a.includes(9), a.join('-'));\n\
         const b = [0, ...a];\n\
         console.log(b.length, b[3]);",
    );
    assert_eq!(lines, vec!["3 undefined", "4 2 false 1--3-4", "5 3"]);
}

#[test]
fn test_objects_and_spread() {
    let lines = run_lines(
        "const base = { a: 1, b: 2 };\n\
         const o = { ...base, b: 3, 'c': 4 };\n\
         console.log(o.a, o.b, o['c'], 'b' in o, 'z' in o);",
    );
    assert_eq!(lines, vec!["1 3 4 true false"]);
}

#[test]
fn test_pipeline_operator() {
    let lines = run_lines("console.log(5 |> (x => x * 2));");
    assert_eq!(lines, vec!["10"]);
}

#[test]
fn test_conditional_and_unary() {
    let lines = run_lines(
        "console.log(1 < 2 ? 'yes' : 'no', !0, typeof 'x', typeof undefined, void 1, ~2, -'3');",
    );
    assert_eq!(lines, vec!["yes true string undefined undefined -3 -3"]);
}

#[test]
fn test_equality() {
    let lines = run_lines("console.log(1 == '1', 1 === '1', null == undefined, NaN === NaN);");
    assert_eq!(lines, vec!["true false true false"]);
}

#[test]
fn test_optional_chaining() {
    let lines = run_lines(
        "const o = { a: { b: 1 } };\n\
         const f = null;\n\
         console.log(o.a?.b, o.c?.b, f?.());",
    );
    assert_eq!(lines, vec!["1 undefined undefined"]);
}

#[test]
fn test_rest_and_spread_call() {
    let lines = run_lines(
        "const f = (a, ...rest) => a + rest.length;\n\
         const g = (a, b, c) => a + b + c;\n\
         const xs = [1, 2, 3];\n\
         console.log(f(1, 2, 3, 4), g(...xs));",
    );
    assert_eq!(lines, vec!["4 6"]);
}

#[test]
fn test_function_name_follows_binding() {
    let lines = run_lines(
        "const foo = () => 1;\n\
         function bar() {}\n\
         const o = { baz() {} };\n\
         console.log(foo.name, bar.name, o.baz.name);",
    );
    assert_eq!(lines, vec!["foo bar baz"]);
}

#[test]
fn test_function_declarations_and_recursion() {
    let lines = run_lines(
        "function fact(n) { if (n <= 1) return 1; return n * fact(n - 1) }\n\
         console.log(fact(6));",
    );
    assert_eq!(lines, vec!["720"]);
}

#[test]
fn test_string_members() {
    let lines = run_lines(
        "console.log('hello'.toUpperCase(), 'hello'.length, 'hello'.slice(1, 3), 'hello'.includes('ell'));",
    );
    assert_eq!(lines, vec!["HELLO 5 el true"]);
}

#[test]
fn test_regex_literal_test() {
    let lines = run_lines("console.log(/ab+c/.test('xabbc'), /ab+c/.test('ac'), /A/i.test('a'));");
    assert_eq!(lines, vec!["true false true"]);
}

#[test]
fn test_top_level_return_value() {
    let harness = Harness::new();
    let result = harness.run("let x = 40; return x + 2").unwrap();
    assert_eq!(result, Value::Number(42.0));
}

#[test]
fn test_delete_is_unsupported() {
    let error = run_err("let o = { a: 1 }; delete o.a");
    assert_eq!(error, EngineError::UnsupportedOperator("delete".to_string()));
}

#[test]
fn test_destructuring_params_are_unsupported() {
    let error = run_err("const f = ({ a }) => a; f({ a: 1 })");
    assert_eq!(error, EngineError::UnsupportedParam("ObjectPattern".to_string()));
}

#[test]
fn test_calling_a_non_function_fails() {
    let error = run_err("let x = 5; x()");
    assert!(matches!(error, EngineError::Type(_)));
}
