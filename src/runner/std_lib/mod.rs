//! Host globals.
//!
//! `with_global` fills a base scope with the default bindings for any name
//! the host has not already supplied, so embedders can shadow `console` or
//! add their own globals before executing.

pub mod console;
pub mod json;
pub mod math;
pub mod promise;
pub mod timers;

use lazy_static::lazy_static;

use crate::runner::ds::scope::Scope;
use crate::runner::ds::value::Value;
use crate::runner::exec::runtime::Runtime;

type GlobalBuilder = fn(&Runtime) -> Value;

lazy_static! {
    static ref DEFAULT_GLOBALS: Vec<(&'static str, GlobalBuilder)> = vec![
        ("undefined", (|_| Value::Undefined) as GlobalBuilder),
        ("NaN", |_| Value::Number(f64::NAN)),
        ("Infinity", |_| Value::Number(f64::INFINITY)),
        ("globalThis", |_| Value::new_object()),
        ("console", |_| console::console_default()),
        ("JSON", |_| json::json_object()),
        ("Math", |_| math::math_object()),
        ("setTimeout", timers::set_timeout),
        ("Promise", promise::promise_constructor),
    ];
}

/// Populate `base` with the default host globals for names it does not
/// already bind, and return it. The runtime supplies the event loop the
/// timer and promise globals schedule onto.
pub fn with_global(base: Scope, runtime: &Runtime) -> Scope {
    for (name, build) in DEFAULT_GLOBALS.iter() {
        if base.lookup(name).is_none() {
            base.declare(name, build(runtime));
        }
    }
    base
}

/// Build an object value from a fixed set of entries.
pub(crate) fn object_from(entries: Vec<(&str, Value)>) -> Value {
    let object = Value::new_object();
    if let Value::Object(data) = &object {
        let mut data = data.borrow_mut();
        for (key, value) in entries {
            data.set(key, value);
        }
    }
    object
}
