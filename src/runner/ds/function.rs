//! Callable values: engine-native functions and guest-defined functions.
//!
//! Guest functions carry the tag (`FunctionValue::User`) that lets the
//! runtime tell host-provided callables apart from ones built out of guest
//! source, plus everything a later call needs: the AST node, the defining
//! scope and the async flag.

use std::rc::{Rc, Weak};

use crate::parser::ast::FunctionData;
use crate::runner::ds::error::EngineError;
use crate::runner::ds::scope::Scope;
use crate::runner::ds::value::Value;
use crate::runner::exec::runtime::RuntimeShared;

pub type NativeImpl = Box<dyn Fn(Value, Vec<Value>) -> Result<Value, EngineError>>;

/// A host-provided function. `statics` are the properties reachable through
/// member access on the function itself (`Promise.all` style).
pub struct NativeFunction {
    pub name: String,
    pub constructs: bool,
    pub statics: Vec<(String, Value)>,
    pub func: NativeImpl,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(Value, Vec<Value>) -> Result<Value, EngineError> + 'static,
    ) -> Value {
        Value::Function(FunctionValue::Native(Rc::new(NativeFunction {
            name: name.into(),
            constructs: false,
            statics: Vec::new(),
            func: Box::new(func),
        })))
    }

    pub fn constructor(
        name: impl Into<String>,
        statics: Vec<(String, Value)>,
        func: impl Fn(Value, Vec<Value>) -> Result<Value, EngineError> + 'static,
    ) -> Value {
        Value::Function(FunctionValue::Native(Rc::new(NativeFunction {
            name: name.into(),
            constructs: true,
            statics,
            func: Box::new(func),
        })))
    }
}

/// A function built from guest source: the AST body plus the captured
/// defining scope.
pub struct UserFunction {
    pub data: Rc<FunctionData>,
    pub scope: Scope,
    pub name: Option<String>,
    pub(crate) runtime: Weak<RuntimeShared>,
}

#[derive(Clone)]
pub enum FunctionValue {
    Native(Rc<NativeFunction>),
    User(Rc<UserFunction>),
}

impl FunctionValue {
    pub fn name(&self) -> Option<&str> {
        match self {
            FunctionValue::Native(f) => Some(&f.name),
            FunctionValue::User(f) => f.name.as_deref(),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, FunctionValue::User(_))
    }

    pub fn ptr_eq(&self, other: &FunctionValue) -> bool {
        match (self, other) {
            (FunctionValue::Native(a), FunctionValue::Native(b)) => Rc::ptr_eq(a, b),
            (FunctionValue::User(a), FunctionValue::User(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Invoke with an explicit receiver. Native functions run directly;
    /// guest functions run a sub-execution (see `eval::function`).
    pub fn call(&self, this: Value, args: Vec<Value>) -> Result<Value, EngineError> {
        match self {
            FunctionValue::Native(f) => (f.func)(this, args),
            FunctionValue::User(f) => crate::runner::eval::function::call_user(f, this, args),
        }
    }
}
