//! JSON global: hand-rolled stringify/parse over the engine's value model.

use crate::runner::ds::error::EngineError;
use crate::runner::ds::function::NativeFunction;
use crate::runner::ds::value::{format_number, Value};
use crate::runner::std_lib::object_from;

const MAX_DEPTH: usize = 64;

pub(crate) fn json_object() -> Value {
    object_from(vec![
        (
            "stringify",
            NativeFunction::new("stringify", |_this, args| {
                let value = args.first().cloned().unwrap_or(Value::Undefined);
                Ok(match stringify_value(&value, 0)? {
                    Some(text) => Value::String(text),
                    None => Value::Undefined,
                })
            }),
        ),
        (
            "parse",
            NativeFunction::new("parse", |_this, args| {
                let text = match args.first() {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => crate::runner::ds::operations::type_conversion::to_js_string(other),
                    None => {
                        return Err(EngineError::Syntax(
                            "JSON.parse expects a string".to_string(),
                        ))
                    }
                };
                JsonParser::new(&text).parse()
            }),
        ),
    ])
}

/// `None` means the value has no JSON representation (functions,
/// promises, undefined) and is skipped in objects, `null` in arrays.
fn stringify_value(value: &Value, depth: usize) -> Result<Option<String>, EngineError> {
    if depth > MAX_DEPTH {
        return Err(EngineError::Type(
            "converting circular or overly deep structure to JSON".to_string(),
        ));
    }
    Ok(match value {
        Value::Null => Some("null".to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        Value::Number(n) => Some(if n.is_finite() {
            format_number(*n)
        } else {
            "null".to_string()
        }),
        Value::String(s) => Some(quote_string(s)),
        Value::Array(items) => {
            let mut parts = Vec::new();
            for item in items.borrow().iter() {
                parts.push(stringify_value(item, depth + 1)?.unwrap_or_else(|| "null".to_string()));
            }
            Some(format!("[{}]", parts.join(",")))
        }
        Value::Object(data) => {
            let mut parts = Vec::new();
            for (key, item) in data.borrow().entries() {
                if let Some(rendered) = stringify_value(item, depth + 1)? {
                    parts.push(format!("{}:{}", quote_string(key), rendered));
                }
            }
            Some(format!("{{{}}}", parts.join(",")))
        }
        Value::RegExp(_) => Some("{}".to_string()),
        Value::Undefined
        | Value::Function(_)
        | Value::Promise(_)
        | Value::Uninitialized
        | Value::Abort => None,
    })
}

fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

struct JsonParser {
    chars: Vec<char>,
    pos: usize,
}

impl JsonParser {
    fn new(text: &str) -> Self {
        JsonParser {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Value, EngineError> {
        let value = self.parse_value()?;
        self.skip_whitespace();
        if self.pos != self.chars.len() {
            return Err(self.error("trailing characters"));
        }
        Ok(value)
    }

    fn error(&self, message: &str) -> EngineError {
        EngineError::Syntax(format!("JSON.parse: {} at position {}", message, self.pos))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek();
        if c.is_some() {
            self.pos += 1;
        }
        c
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t' | '\n' | '\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), EngineError> {
        if self.bump() == Some(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", c)))
        }
    }

    fn parse_value(&mut self) -> Result<Value, EngineError> {
        self.skip_whitespace();
        match self.peek() {
            Some('n') => self.parse_keyword("null", Value::Null),
            Some('t') => self.parse_keyword("true", Value::Boolean(true)),
            Some('f') => self.parse_keyword("false", Value::Boolean(false)),
            Some('"') => Ok(Value::String(self.parse_string()?)),
            Some('[') => self.parse_array(),
            Some('{') => self.parse_object(),
            Some(c) if c == '-' || c.is_ascii_digit() => self.parse_number(),
            _ => Err(self.error("unexpected character")),
        }
    }

    fn parse_keyword(&mut self, word: &str, value: Value) -> Result<Value, EngineError> {
        for expected in word.chars() {
            if self.bump() != Some(expected) {
                return Err(self.error("invalid keyword"));
            }
        }
        Ok(value)
    }

    fn parse_number(&mut self) -> Result<Value, EngineError> {
        let start = self.pos;
        if self.peek() == Some('-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(Value::Number)
            .map_err(|_| self.error("invalid number"))
    }

    fn parse_string(&mut self) -> Result<String, EngineError> {
        self.expect('"')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('/') => out.push('/'),
                    Some('n') => out.push('\n'),
                    Some('r') => out.push('\r'),
                    Some('t') => out.push('\t'),
                    Some('b') => out.push('\u{0008}'),
                    Some('f') => out.push('\u{000C}'),
                    Some('u') => {
                        let mut hex = String::new();
                        for _ in 0..4 {
                            hex.push(self.bump().ok_or_else(|| self.error("bad escape"))?);
                        }
                        let code = u32::from_str_radix(&hex, 16)
                            .map_err(|_| self.error("bad unicode escape"))?;
                        out.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
                    }
                    _ => return Err(self.error("bad escape")),
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn parse_array(&mut self) -> Result<Value, EngineError> {
        self.expect('[')?;
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(']') {
            self.pos += 1;
            return Ok(Value::new_array(items));
        }
        loop {
            items.push(self.parse_value()?);
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some(']') => return Ok(Value::new_array(items)),
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn parse_object(&mut self) -> Result<Value, EngineError> {
        self.expect('{')?;
        let object = Value::new_object();
        self.skip_whitespace();
        if self.peek() == Some('}') {
            self.pos += 1;
            return Ok(object);
        }
        loop {
            self.skip_whitespace();
            let key = self.parse_string()?;
            self.skip_whitespace();
            self.expect(':')?;
            let value = self.parse_value()?;
            if let Value::Object(data) = &object {
                data.borrow_mut().set(&key, value);
            }
            self.skip_whitespace();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(object),
                _ => return Err(self.error("expected ',' or '}'")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stringify_basics() {
        assert_eq!(
            stringify_value(&Value::Number(3.5), 0).unwrap(),
            Some("3.5".to_string())
        );
        assert_eq!(
            stringify_value(&Value::String("a\"b".to_string()), 0).unwrap(),
            Some("\"a\\\"b\"".to_string())
        );
        assert_eq!(stringify_value(&Value::Undefined, 0).unwrap(), None);
    }

    #[test]
    fn test_parse_nested() {
        let parsed = JsonParser::new("{\"a\": [1, true, null], \"b\": \"x\"}")
            .parse()
            .unwrap();
        let Value::Object(data) = &parsed else {
            panic!("expected object");
        };
        let data = data.borrow();
        assert!(matches!(data.get("b"), Some(Value::String(s)) if s == "x"));
        let Some(Value::Array(items)) = data.get("a") else {
            panic!("expected array");
        };
        assert_eq!(items.borrow().len(), 3);
    }

    #[test]
    fn test_round_trip() {
        let source = Value::new_array(vec![
            Value::Number(1.0),
            Value::String("two".to_string()),
            Value::Boolean(false),
            Value::Null,
        ]);
        let text = stringify_value(&source, 0).unwrap().unwrap();
        let back = JsonParser::new(&text).parse().unwrap();
        let Value::Array(items) = &back else {
            panic!("expected array");
        };
        assert_eq!(items.borrow().len(), 4);
        assert_eq!(items.borrow()[1], Value::String("two".to_string()));
    }
}
