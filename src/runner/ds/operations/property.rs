//! Member access over values: property reads, writes and the bound method
//! surfaces of arrays, strings, promises and regexes.

use crate::runner::ds::error::EngineError;
use crate::runner::ds::function::NativeFunction;
use crate::runner::ds::operations::type_conversion::{to_js_string, to_number};
use crate::runner::ds::value::{ArrayRef, Value};
use crate::runner::exec::runtime::Runtime;
use crate::runner::std_lib;

/// Property keys are strings; numeric keys address array slots.
pub fn to_property_key(value: &Value) -> String {
    to_js_string(value)
}

fn array_index(key: &str) -> Option<usize> {
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        key.parse().ok()
    } else {
        None
    }
}

pub fn get_member(target: &Value, key: &str, runtime: &Runtime) -> Result<Value, EngineError> {
    match target {
        Value::Undefined | Value::Null => Err(EngineError::Type(format!(
            "cannot read properties of {} (reading \"{}\")",
            target, key
        ))),
        Value::Object(obj) => Ok(obj.borrow().get(key).cloned().unwrap_or(Value::Undefined)),
        Value::Array(items) => get_array_member(items, key),
        Value::String(s) => Ok(get_string_member(s, key)),
        Value::Promise(p) => Ok(std_lib::promise::promise_member(p, key, runtime)),
        Value::Function(f) => {
            if key == "name" {
                return Ok(Value::String(f.name().unwrap_or("").to_string()));
            }
            if let crate::runner::ds::function::FunctionValue::Native(native) = f {
                if let Some((_, v)) = native.statics.iter().find(|(k, _)| k == key) {
                    return Ok(v.clone());
                }
            }
            Ok(Value::Undefined)
        }
        Value::RegExp(r) => Ok(match key {
            "source" => Value::String(r.source.clone()),
            "flags" => Value::String(r.flags.clone()),
            "test" => {
                let regex = r.clone();
                NativeFunction::new("test", move |_this, args| {
                    let input = to_js_string(args.first().unwrap_or(&Value::Undefined));
                    Ok(Value::Boolean(regex.regex.is_match(&input)))
                })
            }
            _ => Value::Undefined,
        }),
        Value::Boolean(_) | Value::Number(_) => Ok(Value::Undefined),
        Value::Uninitialized | Value::Abort => Err(EngineError::StateInvariant(
            "member access on an engine sentinel".to_string(),
        )),
    }
}

pub fn set_member(target: &Value, key: &str, value: Value) -> Result<(), EngineError> {
    match target {
        Value::Object(obj) => {
            obj.borrow_mut().set(key, value);
            Ok(())
        }
        Value::Array(items) => {
            if key == "length" {
                let len = to_number(&value);
                if len < 0.0 || len.fract() != 0.0 {
                    return Err(EngineError::Type(format!("invalid array length {}", value)));
                }
                items.borrow_mut().resize(len as usize, Value::Undefined);
                return Ok(());
            }
            match array_index(key) {
                Some(i) => {
                    let mut items = items.borrow_mut();
                    if i >= items.len() {
                        items.resize(i + 1, Value::Undefined);
                    }
                    items[i] = value;
                    Ok(())
                }
                None => Err(EngineError::Type(format!(
                    "cannot set non-index property \"{}\" on an array",
                    key
                ))),
            }
        }
        other => Err(EngineError::Type(format!(
            "cannot set property \"{}\" on {}",
            key, other
        ))),
    }
}

/// `key in target` membership test.
pub fn has_property(target: &Value, key: &str) -> Result<bool, EngineError> {
    match target {
        Value::Object(obj) => Ok(obj.borrow().has(key)),
        Value::Array(items) => {
            if key == "length" {
                return Ok(true);
            }
            Ok(array_index(key).map(|i| i < items.borrow().len()).unwrap_or(false))
        }
        other => Err(EngineError::Type(format!(
            "cannot use \"in\" on {}",
            other
        ))),
    }
}

fn get_array_member(items: &ArrayRef, key: &str) -> Result<Value, EngineError> {
    if key == "length" {
        return Ok(Value::Number(items.borrow().len() as f64));
    }
    if let Some(i) = array_index(key) {
        return Ok(items.borrow().get(i).cloned().unwrap_or(Value::Undefined));
    }
    let arr = items.clone();
    Ok(match key {
        "push" => NativeFunction::new("push", move |_this, args| {
            let mut items = arr.borrow_mut();
            for v in args {
                items.push(v);
            }
            Ok(Value::Number(items.len() as f64))
        }),
        "pop" => NativeFunction::new("pop", move |_this, _args| {
            Ok(arr.borrow_mut().pop().unwrap_or(Value::Undefined))
        }),
        "join" => NativeFunction::new("join", move |_this, args| {
            let sep = match args.first() {
                None | Some(Value::Undefined) => ",".to_string(),
                Some(v) => to_js_string(v),
            };
            let joined = arr
                .borrow()
                .iter()
                .map(|v| if v.is_nullish() { String::new() } else { to_js_string(v) })
                .collect::<Vec<_>>()
                .join(&sep);
            Ok(Value::String(joined))
        }),
        "indexOf" => NativeFunction::new("indexOf", move |_this, args| {
            let needle = args.first().cloned().unwrap_or(Value::Undefined);
            let found = arr
                .borrow()
                .iter()
                .position(|v| crate::runner::ds::operations::test_and_comparison::strict_equals(v, &needle));
            Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
        }),
        "includes" => NativeFunction::new("includes", move |_this, args| {
            let needle = args.first().cloned().unwrap_or(Value::Undefined);
            let found = arr
                .borrow()
                .iter()
                .any(|v| crate::runner::ds::operations::test_and_comparison::strict_equals(v, &needle));
            Ok(Value::Boolean(found))
        }),
        "slice" => NativeFunction::new("slice", move |_this, args| {
            let items = arr.borrow();
            let len = items.len() as i64;
            let resolve = |v: Option<&Value>, default: i64| -> i64 {
                match v {
                    None | Some(Value::Undefined) => default,
                    Some(v) => {
                        let n = to_number(v) as i64;
                        if n < 0 {
                            (len + n).max(0)
                        } else {
                            n.min(len)
                        }
                    }
                }
            };
            let start = resolve(args.first(), 0) as usize;
            let end = resolve(args.get(1), len) as usize;
            let out = if start < end {
                items[start..end].to_vec()
            } else {
                Vec::new()
            };
            Ok(Value::new_array(out))
        }),
        "map" => NativeFunction::new("map", move |_this, args| {
            let callback = match args.first() {
                Some(Value::Function(f)) => f.clone(),
                _ => return Err(EngineError::Type("map expects a function".to_string())),
            };
            let snapshot: Vec<Value> = arr.borrow().clone();
            let mut out = Vec::with_capacity(snapshot.len());
            for (i, item) in snapshot.into_iter().enumerate() {
                out.push(callback.call(
                    Value::Undefined,
                    vec![item, Value::Number(i as f64)],
                )?);
            }
            Ok(Value::new_array(out))
        }),
        "forEach" => NativeFunction::new("forEach", move |_this, args| {
            let callback = match args.first() {
                Some(Value::Function(f)) => f.clone(),
                _ => return Err(EngineError::Type("forEach expects a function".to_string())),
            };
            let snapshot: Vec<Value> = arr.borrow().clone();
            for (i, item) in snapshot.into_iter().enumerate() {
                callback.call(Value::Undefined, vec![item, Value::Number(i as f64)])?;
            }
            Ok(Value::Undefined)
        }),
        _ => Value::Undefined,
    })
}

fn get_string_member(s: &str, key: &str) -> Value {
    if key == "length" {
        return Value::Number(s.chars().count() as f64);
    }
    if let Some(i) = array_index(key) {
        return s
            .chars()
            .nth(i)
            .map(|c| Value::String(c.to_string()))
            .unwrap_or(Value::Undefined);
    }
    let owned = s.to_string();
    match key {
        "includes" => NativeFunction::new("includes", move |_this, args| {
            let needle = to_js_string(args.first().unwrap_or(&Value::Undefined));
            Ok(Value::Boolean(owned.contains(&needle)))
        }),
        "indexOf" => NativeFunction::new("indexOf", move |_this, args| {
            let needle = to_js_string(args.first().unwrap_or(&Value::Undefined));
            Ok(Value::Number(
                owned
                    .find(&needle)
                    .map(|i| owned[..i].chars().count() as f64)
                    .unwrap_or(-1.0),
            ))
        }),
        "slice" => NativeFunction::new("slice", move |_this, args| {
            let chars: Vec<char> = owned.chars().collect();
            let len = chars.len() as i64;
            let resolve = |v: Option<&Value>, default: i64| -> i64 {
                match v {
                    None | Some(Value::Undefined) => default,
                    Some(v) => {
                        let n = to_number(v) as i64;
                        if n < 0 {
                            (len + n).max(0)
                        } else {
                            n.min(len)
                        }
                    }
                }
            };
            let start = resolve(args.first(), 0) as usize;
            let end = resolve(args.get(1), len) as usize;
            let out: String = if start < end {
                chars[start..end].iter().collect()
            } else {
                String::new()
            };
            Ok(Value::String(out))
        }),
        "toUpperCase" => NativeFunction::new("toUpperCase", move |_this, _args| {
            Ok(Value::String(owned.to_uppercase()))
        }),
        "toLowerCase" => NativeFunction::new("toLowerCase", move |_this, _args| {
            Ok(Value::String(owned.to_lowercase()))
        }),
        "charAt" => NativeFunction::new("charAt", move |_this, args| {
            let i = to_number(args.first().unwrap_or(&Value::Number(0.0))) as usize;
            Ok(Value::String(
                owned.chars().nth(i).map(|c| c.to_string()).unwrap_or_default(),
            ))
        }),
        _ => Value::Undefined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_index_keys() {
        assert_eq!(array_index("0"), Some(0));
        assert_eq!(array_index("12"), Some(12));
        assert_eq!(array_index("x"), None);
        assert_eq!(array_index(""), None);
        assert_eq!(array_index("1a"), None);
    }

    #[test]
    fn test_set_member_extends_array() {
        let arr = Value::new_array(vec![Value::Number(1.0)]);
        set_member(&arr, "3", Value::Number(4.0)).unwrap();
        if let Value::Array(items) = &arr {
            assert_eq!(items.borrow().len(), 4);
            assert_eq!(items.borrow()[1], Value::Undefined);
            assert_eq!(items.borrow()[3], Value::Number(4.0));
        } else {
            unreachable!();
        }
    }
}
