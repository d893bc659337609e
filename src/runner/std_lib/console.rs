//! console global.
//!
//! Supports the printf-style substitutions scripts actually use (`%d`,
//! `%i`, `%f`, `%s`, `%o`, `%j`). The sink is pluggable so hosts and tests
//! can capture output instead of printing.

use std::rc::Rc;

use crate::runner::ds::function::NativeFunction;
use crate::runner::ds::operations::type_conversion::{to_js_string, to_number};
use crate::runner::ds::value::{format_number, Value};
use crate::runner::std_lib::object_from;

pub type ConsoleSink = Rc<dyn Fn(&str)>;

/// Console writing through one sink for all four methods.
pub fn console_object(sink: ConsoleSink) -> Value {
    let method = |name: &'static str, sink: ConsoleSink| {
        NativeFunction::new(name, move |_this, args| {
            sink(&format_args(&args));
            Ok(Value::Undefined)
        })
    };
    object_from(vec![
        ("log", method("log", sink.clone())),
        ("info", method("info", sink.clone())),
        ("warn", method("warn", sink.clone())),
        ("error", method("error", sink)),
    ])
}

/// Default console: log/info to stdout, warn/error to stderr.
pub(crate) fn console_default() -> Value {
    let out = |name: &'static str| {
        NativeFunction::new(name, |_this, args| {
            println!("{}", format_args(&args));
            Ok(Value::Undefined)
        })
    };
    let err = |name: &'static str| {
        NativeFunction::new(name, |_this, args| {
            eprintln!("{}", format_args(&args));
            Ok(Value::Undefined)
        })
    };
    object_from(vec![
        ("log", out("log")),
        ("info", out("info")),
        ("warn", err("warn")),
        ("error", err("error")),
    ])
}

/// Render one console line: a leading format string consumes arguments for
/// its `%` specifiers, anything left over is appended space-separated.
pub fn format_args(args: &[Value]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut rest_start = 0;
    if let Some(Value::String(fmt)) = args.first() {
        if fmt.contains('%') {
            let mut out = String::new();
            let mut next = 1;
            let mut chars = fmt.chars();
            while let Some(c) = chars.next() {
                if c != '%' {
                    out.push(c);
                    continue;
                }
                match chars.next() {
                    Some('%') => out.push('%'),
                    Some(spec @ ('d' | 'i' | 'f' | 's' | 'o' | 'O' | 'j')) => {
                        if next < args.len() {
                            let arg = &args[next];
                            next += 1;
                            let rendered = match spec {
                                'd' | 'f' => format_number(to_number(arg)),
                                'i' => format_number(to_number(arg).trunc()),
                                's' => to_js_string(arg),
                                _ => inspect(arg),
                            };
                            out.push_str(&rendered);
                        } else {
                            out.push('%');
                            out.push(spec);
                        }
                    }
                    Some(other) => {
                        out.push('%');
                        out.push(other);
                    }
                    None => out.push('%'),
                }
            }
            parts.push(out);
            rest_start = next;
        }
    }
    for arg in &args[rest_start..] {
        parts.push(inspect_top(arg));
    }
    parts.join(" ")
}

/// Top-level rendering: strings unquoted, containers expanded one level.
fn inspect_top(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => inspect(other),
    }
}

fn inspect(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", s),
        Value::Array(items) => {
            let rendered: Vec<String> = items.borrow().iter().map(inspect).collect();
            if rendered.is_empty() {
                "[]".to_string()
            } else {
                format!("[ {} ]", rendered.join(", "))
            }
        }
        Value::Object(data) => {
            let rendered: Vec<String> = data
                .borrow()
                .entries()
                .iter()
                .map(|(k, v)| format!("{}: {}", k, inspect(v)))
                .collect();
            if rendered.is_empty() {
                "{}".to_string()
            } else {
                format!("{{ {} }}", rendered.join(", "))
            }
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_args_join() {
        let line = format_args(&[
            Value::String("total".to_string()),
            Value::Number(3.0),
            Value::Boolean(true),
        ]);
        assert_eq!(line, "total 3 true");
    }

    #[test]
    fn test_number_substitution() {
        let line = format_args(&[
            Value::String("%d items".to_string()),
            Value::Number(3.141592653589793),
        ]);
        assert_eq!(line, "3.141592653589793 items");
        let line = format_args(&[
            Value::String("%i items".to_string()),
            Value::Number(3.9),
        ]);
        assert_eq!(line, "3 items");
    }

    #[test]
    fn test_leftover_args_appended() {
        let line = format_args(&[
            Value::String("%s:".to_string()),
            Value::String("x".to_string()),
            Value::Number(1.0),
        ]);
        assert_eq!(line, "x: 1");
    }

    #[test]
    fn test_array_inspection() {
        let line = format_args(&[Value::new_array(vec![
            Value::Number(1.0),
            Value::String("a".to_string()),
        ])]);
        assert_eq!(line, "[ 1, 'a' ]");
    }
}
