//! Guest value model.
//!
//! One tagged union covers every value a guest program can touch, plus two
//! engine-private sentinels: `Uninitialized` marks a declared-but-unassigned
//! binding (the temporal dead zone), and `Abort` is the reason carried by a
//! cancelled await. Neither sentinel can be produced by guest syntax.

use std::cell::RefCell;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

use regex::Regex;

use crate::runner::ds::error::EngineError;
use crate::runner::ds::function::FunctionValue;
use crate::runner::ds::promise::ObservablePromise;

pub type ObjectRef = Rc<RefCell<ObjectData>>;
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

pub enum Value {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(ObjectRef),
    Array(ArrayRef),
    Function(FunctionValue),
    Promise(ObservablePromise),
    RegExp(Rc<RegExpValue>),
    /// Declared but not yet initialized; reading it is an error.
    Uninitialized,
    /// Cancellation sentinel delivered through aborted promises.
    Abort,
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Value::Undefined => Value::Undefined,
            Value::Null => Value::Null,
            Value::Boolean(b) => Value::Boolean(*b),
            Value::Number(n) => Value::Number(*n),
            Value::String(s) => Value::String(s.clone()),
            Value::Object(o) => Value::Object(o.clone()),
            Value::Array(a) => Value::Array(a.clone()),
            Value::Function(f) => Value::Function(f.clone()),
            Value::Promise(p) => Value::Promise(p.clone()),
            Value::RegExp(r) => Value::RegExp(r.clone()),
            Value::Uninitialized => Value::Uninitialized,
            Value::Abort => Value::Abort,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Promise(a), Value::Promise(b)) => a.ptr_eq(b),
            (Value::RegExp(a), Value::RegExp(b)) => Rc::ptr_eq(a, b),
            (Value::Uninitialized, Value::Uninitialized) => true,
            (Value::Abort, Value::Abort) => true,
            _ => false,
        }
    }
}

impl Value {
    pub fn new_object() -> Value {
        Value::Object(Rc::new(RefCell::new(ObjectData::new())))
    }

    pub fn new_array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Type guard for values carrying an externally observable settle state.
    pub fn is_observable(&self) -> bool {
        matches!(self, Value::Promise(_))
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Value::Undefined"),
            Value::Null => write!(f, "Value::Null"),
            Value::Boolean(b) => write!(f, "Value::Boolean({})", b),
            Value::Number(n) => write!(f, "Value::Number({})", n),
            Value::String(s) => write!(f, "Value::String({:?})", s),
            Value::Object(_) => write!(f, "Value::Object(..)"),
            Value::Array(a) => write!(f, "Value::Array(len={})", a.borrow().len()),
            Value::Function(fun) => write!(f, "Value::Function({})", fun.name().unwrap_or("")),
            Value::Promise(p) => write!(f, "Value::Promise({})", p.state_name()),
            Value::RegExp(r) => write!(f, "Value::RegExp(/{}/{})", r.source, r.flags),
            Value::Uninitialized => write!(f, "Value::Uninitialized"),
            Value::Abort => write!(f, "Value::Abort"),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Object(_) => write!(f, "[object Object]"),
            Value::Array(a) => write!(f, "Array({})", a.borrow().len()),
            Value::Function(fun) => match fun.name() {
                Some(name) if !name.is_empty() => write!(f, "[Function: {}]", name),
                _ => write!(f, "[Function (anonymous)]"),
            },
            Value::Promise(p) => write!(f, "[Promise {}]", p.state_name()),
            Value::RegExp(r) => write!(f, "/{}/{}", r.source, r.flags),
            Value::Uninitialized => write!(f, "<uninitialized>"),
            Value::Abort => write!(f, "<aborted>"),
        }
    }
}

/// Numbers print the way script authors expect: integral values without a
/// trailing fraction, specials by their script names.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

/// Ordered property map backing object values. Insertion order is the
/// enumeration order, which spreads and JSON serialization rely on.
pub struct ObjectData {
    props: Vec<(String, Value)>,
}

impl ObjectData {
    pub fn new() -> Self {
        ObjectData { props: Vec::new() }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        match self.props.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.props.push((key.to_string(), value)),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.props.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.props.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn entries(&self) -> &[(String, Value)] {
        &self.props
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }
}

impl Default for ObjectData {
    fn default() -> Self {
        Self::new()
    }
}

/// A compiled regex literal. Flags are folded into the pattern at compile
/// time (`i` → case-insensitive, `m` → multi-line, `s` → dot-all); `g` has
/// no effect on the stateless matching the engine offers.
pub struct RegExpValue {
    pub source: String,
    pub flags: String,
    pub regex: Regex,
}

impl RegExpValue {
    pub fn compile(pattern: &str, flags: &str) -> Result<Self, EngineError> {
        let mut inline = String::new();
        for flag in flags.chars() {
            match flag {
                'i' => inline.push('i'),
                'm' => inline.push('m'),
                's' => inline.push('s'),
                'g' | 'u' | 'y' => {}
                other => {
                    return Err(EngineError::Syntax(format!(
                        "unsupported regex flag \"{}\"",
                        other
                    )))
                }
            }
        }
        let full = if inline.is_empty() {
            pattern.to_string()
        } else {
            format!("(?{}){}", inline, pattern)
        };
        let regex = Regex::new(&full)
            .map_err(|e| EngineError::Syntax(format!("invalid regex /{}/{}: {}", pattern, flags, e)))?;
        Ok(RegExpValue {
            source: pattern.to_string(),
            flags: flags.to_string(),
            regex,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formatting() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(-0.0), "0");
    }

    #[test]
    fn test_object_insertion_order() {
        let mut obj = ObjectData::new();
        obj.set("b", Value::Number(1.0));
        obj.set("a", Value::Number(2.0));
        obj.set("b", Value::Number(3.0));
        assert_eq!(obj.keys(), vec!["b".to_string(), "a".to_string()]);
        assert_eq!(obj.get("b"), Some(&Value::Number(3.0)));
    }

    #[test]
    fn test_sentinels_are_distinct() {
        assert_ne!(Value::Uninitialized, Value::Undefined);
        assert_ne!(Value::Abort, Value::Null);
        assert_eq!(Value::Abort, Value::Abort);
    }
}
