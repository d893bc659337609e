//! Building and invoking guest-defined functions.
//!
//! A function value captures its defining scope and AST node. Each call
//! builds a fresh function scope (binding `this` for non-arrows and the
//! parameters), then roots a sub-execution at the body. Synchronous bodies
//! are pumped to completion inside the call; async bodies register the
//! sub-execution with the runtime and immediately return an observable
//! promise that settles when it terminates.

use std::rc::Rc;

use crate::parser::ast::{FunctionData, PatternType};
use crate::runner::ds::error::EngineError;
use crate::runner::ds::function::{FunctionValue, UserFunction};
use crate::runner::ds::promise::ObservablePromise;
use crate::runner::ds::scope::Scope;
use crate::runner::ds::value::Value;
use crate::runner::eval::step::{step_once, StepEvent};
use crate::runner::exec::execution::Execution;
use crate::runner::exec::runtime::Runtime;

/// Package an AST function node into a callable value. `name_hint` names
/// otherwise-anonymous functions after the binding or property they are
/// assigned to.
pub(crate) fn build_function(
    data: &Rc<FunctionData>,
    defining_scope: &Scope,
    name_hint: Option<String>,
    runtime: &Runtime,
) -> Value {
    let name = data.name.clone().or(name_hint);
    Value::Function(FunctionValue::User(Rc::new(UserFunction {
        data: data.clone(),
        scope: defining_scope.clone(),
        name,
        runtime: runtime.downgrade(),
    })))
}

pub(crate) fn call_user(
    function: &Rc<UserFunction>,
    this: Value,
    args: Vec<Value>,
) -> Result<Value, EngineError> {
    let runtime = Runtime::from_weak(&function.runtime)?;
    let scope = Scope::child(&function.scope);
    // Arrows leave `this` unbound so resolution walks to the enclosing
    // scope.
    if !function.data.is_arrow {
        scope.declare("this", this);
    }
    bind_parameters(&function.data.params, args, &scope)?;
    let desc = function
        .name
        .clone()
        .unwrap_or_else(|| "anonymous".to_string());
    let execution = Execution::for_function(&runtime, function.data.clone(), scope, desc);

    if function.data.is_async {
        let promise = ObservablePromise::pending();
        execution.set_completion(promise.clone());
        execution.start();
        runtime.register(execution);
        return Ok(Value::Promise(promise));
    }

    // Synchronous body: pump the sub-execution to completion in place.
    loop {
        match step_once(&execution)? {
            StepEvent::Continue => {}
            StepEvent::Finished => return execution.outcome(),
            StepEvent::Parked => {
                return Err(EngineError::StateInvariant(
                    "await suspended a synchronous function call".to_string(),
                ))
            }
        }
    }
}

/// Construct via `new`: guest functions get a fresh object as `this` and
/// return it unless the body returned an object.
pub(crate) fn construct(callee: &FunctionValue, args: Vec<Value>) -> Result<Value, EngineError> {
    match callee {
        FunctionValue::Native(native) => {
            if native.constructs {
                (native.func)(Value::Undefined, args)
            } else {
                Err(EngineError::Type(format!(
                    "{} is not a constructor",
                    native.name
                )))
            }
        }
        FunctionValue::User(function) => {
            let this = Value::new_object();
            let result = call_user(function, this.clone(), args)?;
            Ok(match result {
                Value::Object(_) | Value::Array(_) | Value::Function(_) => result,
                _ => this,
            })
        }
    }
}

/// Plain identifiers bind positionally; a trailing rest identifier takes
/// the remaining arguments as an array.
fn bind_parameters(
    params: &[PatternType],
    args: Vec<Value>,
    scope: &Scope,
) -> Result<(), EngineError> {
    let mut args = args.into_iter();
    for param in params {
        match param {
            PatternType::Identifier(id) => {
                scope.declare(&id.name, args.next().unwrap_or(Value::Undefined));
            }
            PatternType::RestElement(id) => {
                scope.declare(&id.name, Value::new_array(args.by_ref().collect()));
            }
            PatternType::Unsupported { kind, .. } => {
                return Err(EngineError::UnsupportedParam(kind.to_string()))
            }
        }
    }
    Ok(())
}
