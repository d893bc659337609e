//! Math global.

use crate::runner::ds::function::NativeFunction;
use crate::runner::ds::operations::type_conversion::to_number;
use crate::runner::ds::value::Value;
use crate::runner::std_lib::object_from;

fn unary(name: &'static str, f: fn(f64) -> f64) -> Value {
    NativeFunction::new(name, move |_this, args| {
        Ok(Value::Number(f(to_number(
            args.first().unwrap_or(&Value::Undefined),
        ))))
    })
}

pub(crate) fn math_object() -> Value {
    object_from(vec![
        ("PI", Value::Number(std::f64::consts::PI)),
        ("E", Value::Number(std::f64::consts::E)),
        ("abs", unary("abs", f64::abs)),
        ("floor", unary("floor", f64::floor)),
        ("ceil", unary("ceil", f64::ceil)),
        ("round", unary("round", f64::round)),
        ("trunc", unary("trunc", f64::trunc)),
        ("sqrt", unary("sqrt", f64::sqrt)),
        ("sign", unary("sign", |n| {
            if n == 0.0 || n.is_nan() {
                n
            } else {
                n.signum()
            }
        })),
        (
            "pow",
            NativeFunction::new("pow", |_this, args| {
                let base = to_number(args.first().unwrap_or(&Value::Undefined));
                let exp = to_number(args.get(1).unwrap_or(&Value::Undefined));
                Ok(Value::Number(base.powf(exp)))
            }),
        ),
        (
            "min",
            NativeFunction::new("min", |_this, args| {
                let mut best = f64::INFINITY;
                for arg in &args {
                    let n = to_number(arg);
                    if n.is_nan() {
                        return Ok(Value::Number(f64::NAN));
                    }
                    best = best.min(n);
                }
                Ok(Value::Number(best))
            }),
        ),
        (
            "max",
            NativeFunction::new("max", |_this, args| {
                let mut best = f64::NEG_INFINITY;
                for arg in &args {
                    let n = to_number(arg);
                    if n.is_nan() {
                        return Ok(Value::Number(f64::NAN));
                    }
                    best = best.max(n);
                }
                Ok(Value::Number(best))
            }),
        ),
    ])
}
