//! Guest-facing Promise surface over the observable promise record:
//! the `Promise` constructor with `resolve` / `reject` / `all`, and the
//! `then` / `catch` methods reached through member access on promise
//! values. Reaction callbacks run as microtasks on the runtime's event
//! loop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::runner::ds::error::EngineError;
use crate::runner::ds::function::{FunctionValue, NativeFunction};
use crate::runner::ds::promise::{ObservablePromise, Settled};
use crate::runner::ds::value::Value;
use crate::runner::exec::runtime::Runtime;

pub(crate) fn error_value(error: &EngineError) -> Value {
    if error.is_abort() {
        Value::Abort
    } else {
        Value::String(error.to_string())
    }
}

/// The pair of natives handed to an executor (and used internally when
/// wrapping thenables).
pub(crate) fn resolving_natives(promise: &ObservablePromise) -> (Value, Value) {
    let resolve_target = promise.clone();
    let resolve = NativeFunction::new("resolve", move |_this, args| {
        resolve_target.resolve(args.into_iter().next().unwrap_or(Value::Undefined));
        Ok(Value::Undefined)
    });
    let reject_target = promise.clone();
    let reject = NativeFunction::new("reject", move |_this, args| {
        reject_target.reject(args.into_iter().next().unwrap_or(Value::Undefined));
        Ok(Value::Undefined)
    });
    (resolve, reject)
}

pub(crate) fn promise_constructor(_runtime: &Runtime) -> Value {
    let statics = vec![
        (
            "resolve".to_string(),
            NativeFunction::new("resolve", |_this, args| {
                let promise = ObservablePromise::pending();
                promise.resolve(args.into_iter().next().unwrap_or(Value::Undefined));
                Ok(Value::Promise(promise))
            }),
        ),
        (
            "reject".to_string(),
            NativeFunction::new("reject", |_this, args| {
                Ok(Value::Promise(ObservablePromise::rejected(
                    args.into_iter().next().unwrap_or(Value::Undefined),
                )))
            }),
        ),
        ("all".to_string(), promise_all_native()),
    ];
    NativeFunction::constructor("Promise", statics, |_this, args| {
        let executor = match args.first() {
            Some(Value::Function(f)) => f.clone(),
            _ => {
                return Err(EngineError::Type(
                    "Promise constructor expects an executor function".to_string(),
                ))
            }
        };
        let promise = ObservablePromise::pending();
        let (resolve, reject) = resolving_natives(&promise);
        // An executor failure rejects the promise instead of unwinding the
        // construction site.
        if let Err(error) = executor.call(Value::Undefined, vec![resolve, reject]) {
            promise.reject(error_value(&error));
        }
        Ok(Value::Promise(promise))
    })
}

/// Settle in input order; the first rejection wins.
fn promise_all_native() -> Value {
    NativeFunction::new("all", |_this, args| {
        let items: Vec<Value> = match args.first() {
            Some(Value::Array(items)) => items.borrow().clone(),
            _ => {
                return Err(EngineError::Type(
                    "Promise.all expects an array".to_string(),
                ))
            }
        };
        let result = ObservablePromise::pending();
        let count = items.len();
        if count == 0 {
            result.resolve(Value::new_array(Vec::new()));
            return Ok(Value::Promise(result));
        }
        let results = Rc::new(RefCell::new(vec![Value::Undefined; count]));
        let remaining = Rc::new(Cell::new(count));
        for (i, item) in items.into_iter().enumerate() {
            match item {
                Value::Promise(p) => {
                    let results = results.clone();
                    let remaining = remaining.clone();
                    let result = result.clone();
                    p.subscribe_settled(Box::new(move |settled| match settled {
                        Settled::Fulfilled(value) => {
                            results.borrow_mut()[i] = value.clone();
                            remaining.set(remaining.get() - 1);
                            if remaining.get() == 0 {
                                result.resolve(Value::new_array(results.borrow().clone()));
                            }
                        }
                        Settled::Rejected(reason) => {
                            result.reject(reason.clone());
                        }
                    }));
                }
                value => {
                    results.borrow_mut()[i] = value;
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        result.resolve(Value::new_array(results.borrow().clone()));
                    }
                }
            }
        }
        Ok(Value::Promise(result))
    })
}

/// Member access on a promise value.
pub(crate) fn promise_member(
    promise: &ObservablePromise,
    key: &str,
    runtime: &Runtime,
) -> Value {
    match key {
        "then" => {
            let source = promise.clone();
            let runtime = runtime.clone();
            NativeFunction::new("then", move |_this, args| {
                let on_fulfilled = callback_arg(args.first());
                let on_rejected = callback_arg(args.get(1));
                Ok(Value::Promise(then_impl(
                    &source,
                    on_fulfilled,
                    on_rejected,
                    &runtime,
                )))
            })
        }
        "catch" => {
            let source = promise.clone();
            let runtime = runtime.clone();
            NativeFunction::new("catch", move |_this, args| {
                let on_rejected = callback_arg(args.first());
                Ok(Value::Promise(then_impl(&source, None, on_rejected, &runtime)))
            })
        }
        _ => Value::Undefined,
    }
}

fn callback_arg(value: Option<&Value>) -> Option<FunctionValue> {
    match value {
        Some(Value::Function(f)) => Some(f.clone()),
        _ => None,
    }
}

/// Core of `then`/`catch`: derive a promise settled by running the
/// matching handler as a microtask once the source settles.
fn then_impl(
    source: &ObservablePromise,
    on_fulfilled: Option<FunctionValue>,
    on_rejected: Option<FunctionValue>,
    runtime: &Runtime,
) -> ObservablePromise {
    let derived = ObservablePromise::pending();
    let event_loop = runtime.event_loop().clone();
    let target = derived.clone();
    source.subscribe_settled(Box::new(move |settled| {
        let settled = settled.clone();
        event_loop.enqueue_microtask(Box::new(move || {
            match settled {
                Settled::Fulfilled(value) => match on_fulfilled {
                    Some(callback) => match callback.call(Value::Undefined, vec![value]) {
                        Ok(out) => target.resolve(out),
                        Err(error) => target.reject(error_value(&error)),
                    },
                    None => target.resolve(value),
                },
                Settled::Rejected(reason) => match on_rejected {
                    Some(callback) => match callback.call(Value::Undefined, vec![reason]) {
                        Ok(out) => target.resolve(out),
                        Err(error) => target.reject(error_value(&error)),
                    },
                    None => target.reject(reason),
                },
            }
            Ok(())
        }));
    }));
    derived
}
