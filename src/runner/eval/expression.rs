//! Expression-node state machines and operator application.

use crate::parser::ast::{
    BinaryOperator, ExpressionOrSpread, ExprRef, ExpressionType, LiteralType,
    ObjectPropertyType, UnaryOperator, UpdateOperator,
};
use crate::runner::ds::error::EngineError;
use crate::runner::ds::frame::{AstNode, Frame, OnRet, Place, Ret, Role};
use crate::runner::ds::function::FunctionValue;
use crate::runner::ds::operations::property::{
    get_member, has_property, set_member, to_property_key,
};
use crate::runner::ds::operations::test_and_comparison::{
    abstract_equals, compare, concat_strings, is_string_concat, strict_equals,
};
use crate::runner::ds::operations::type_conversion::{
    to_boolean, to_int32, to_js_string, to_number, to_uint32, type_of,
};
use crate::runner::ds::promise::{ObservablePromise, PromiseState};
use crate::runner::ds::value::{RegExpValue, Value};
use crate::runner::eval::function::{build_function, construct};
use crate::runner::eval::step::{
    read_place, take_ret_value, take_slot_ret, take_slot_value, write_place, Action, StepContext,
};
use crate::runner::std_lib;

pub(crate) fn step_expression(
    expr: &ExprRef,
    frame: &mut Frame,
    cx: &mut StepContext,
) -> Result<Action, EngineError> {
    match expr.as_ref() {
        ExpressionType::Literal(lit) => step_literal(&lit.value),

        ExpressionType::Identifier(id) => step_identifier(&id.name, frame),

        ExpressionType::ThisExpression { .. } => {
            let value = frame.scope.this_value();
            match frame.role {
                Some(Role::Callee) => Ok(Action::Ret(Ret::Callee {
                    function: value,
                    this: Value::Undefined,
                })),
                _ => Ok(Action::Ret(Ret::Val(value))),
            }
        }

        ExpressionType::ArrayExpression { elements, .. } => step_array(frame, elements),

        ExpressionType::ObjectExpression { properties, .. } => step_object(frame, properties, cx),

        ExpressionType::FunctionExpression(data)
        | ExpressionType::ArrowFunctionExpression(data) => {
            let value = build_function(data, &frame.scope, frame.name.clone(), cx.runtime);
            Ok(Action::Ret(Ret::Val(value)))
        }

        ExpressionType::UnaryExpression {
            operator, argument, ..
        } => step_unary(frame, *operator, argument),

        ExpressionType::BinaryExpression {
            operator,
            left,
            right,
            ..
        } => step_binary(frame, *operator, left, right, cx),

        ExpressionType::ConditionalExpression {
            test,
            consequent,
            alternate,
            ..
        } => match frame.sub_index {
            0 => Ok(Action::Push(Frame::new(
                AstNode::Expression(test.clone()),
                frame.scope.clone(),
                OnRet::AsState,
            ))),
            1 => {
                let test_value = take_ret_value(frame)?;
                let branch = if to_boolean(&test_value) {
                    consequent
                } else {
                    alternate
                };
                Ok(Action::Push(Frame::new(
                    AstNode::Expression(branch.clone()),
                    frame.scope.clone(),
                    OnRet::AsState,
                )))
            }
            _ => {
                let value = take_ret_value(frame)?;
                Ok(Action::Ret(Ret::Val(value)))
            }
        },

        ExpressionType::AssignmentExpression {
            operator,
            left,
            right,
            ..
        } => step_assignment(frame, *operator, left, right, cx),

        ExpressionType::UpdateExpression {
            operator,
            prefix,
            argument,
            ..
        } => step_update(frame, *operator, *prefix, argument, cx),

        ExpressionType::MemberExpression {
            object,
            property,
            computed,
            optional,
            ..
        } => step_member(frame, object, property, *computed, *optional, cx),

        ExpressionType::CallExpression {
            callee,
            arguments,
            optional,
            ..
        } => step_call(frame, callee, arguments, CallKind::Normal { optional: *optional }, cx),

        ExpressionType::NewExpression {
            callee, arguments, ..
        } => step_call(frame, callee, arguments, CallKind::New, cx),

        ExpressionType::AwaitExpression { argument, .. } => step_await(frame, argument, cx),
    }
}

fn step_literal(value: &LiteralType) -> Result<Action, EngineError> {
    let value = match value {
        LiteralType::NullLiteral => Value::Null,
        LiteralType::BooleanLiteral(b) => Value::Boolean(*b),
        LiteralType::NumberLiteral(n) => Value::Number(*n),
        LiteralType::StringLiteral(s) => Value::String(s.clone()),
        LiteralType::RegExpLiteral { pattern, flags } => {
            Value::RegExp(std::rc::Rc::new(RegExpValue::compile(pattern, flags)?))
        }
    };
    Ok(Action::Ret(Ret::Val(value)))
}

fn step_identifier(name: &str, frame: &mut Frame) -> Result<Action, EngineError> {
    match frame.role {
        // Non-computed property position: the name itself is the value.
        Some(Role::Key) => Ok(Action::Ret(Ret::Val(Value::String(name.to_string())))),
        Some(Role::Left) => Ok(Action::Ret(Ret::Place(Place::Binding(
            frame.scope.clone(),
            name.to_string(),
        )))),
        role => {
            let value = frame.scope.get(name)?;
            match role {
                Some(Role::Callee) => Ok(Action::Ret(Ret::Callee {
                    function: value,
                    this: Value::Undefined,
                })),
                _ => Ok(Action::Ret(Ret::Val(value))),
            }
        }
    }
}

fn step_array(
    frame: &mut Frame,
    elements: &[Option<ExpressionOrSpread>],
) -> Result<Action, EngineError> {
    if frame.index >= elements.len() {
        let items = frame.take_slot_values("items");
        return Ok(Action::Ret(Ret::Val(Value::new_array(items))));
    }
    match &elements[frame.index] {
        // Elision hole.
        None => {
            frame.push_slot_value("items", Value::Undefined);
            frame.index += 1;
            frame.sub_index = 0;
            Ok(Action::Stay)
        }
        Some(element) => {
            let inner = match element {
                ExpressionOrSpread::Expression(e) | ExpressionOrSpread::Spread(e) => e,
            };
            match frame.sub_index {
                0 => Ok(Action::Push(Frame::new(
                    AstNode::Expression(inner.clone()),
                    frame.scope.clone(),
                    OnRet::AsStateProp("cur"),
                ))),
                _ => {
                    let value = take_slot_value(frame, "cur")?;
                    match element {
                        ExpressionOrSpread::Expression(_) => {
                            frame.push_slot_value("items", value);
                        }
                        ExpressionOrSpread::Spread(_) => match value {
                            Value::Array(items) => {
                                let cloned = items.borrow().clone();
                                frame.extend_slot_values("items", cloned);
                            }
                            Value::String(s) => {
                                let chars =
                                    s.chars().map(|c| Value::String(c.to_string())).collect();
                                frame.extend_slot_values("items", chars);
                            }
                            other => {
                                return Err(EngineError::Type(format!(
                                    "{} is not iterable",
                                    other
                                )))
                            }
                        },
                    }
                    frame.index += 1;
                    frame.sub_index = 0;
                    Ok(Action::Stay)
                }
            }
        }
    }
}

fn step_object(
    frame: &mut Frame,
    properties: &[ObjectPropertyType],
    cx: &mut StepContext,
) -> Result<Action, EngineError> {
    let object = match frame.peek_slot_val("object") {
        Some(object) => object,
        None => {
            frame.put_slot_ret("object", Ret::Val(Value::new_object()));
            return Ok(Action::Stay);
        }
    };
    if frame.index >= properties.len() {
        let object = take_slot_value(frame, "object")?;
        return Ok(Action::Ret(Ret::Val(object)));
    }
    match &properties[frame.index] {
        ObjectPropertyType::Property { key, value, .. } => match frame.sub_index {
            0 => Ok(Action::Push(
                Frame::new(
                    AstNode::Expression(key.clone()),
                    frame.scope.clone(),
                    OnRet::AsStateProp("key"),
                )
                .with_role(Role::Key),
            )),
            1 => {
                let name_hint = frame.peek_slot_val("key").map(|k| to_property_key(&k));
                Ok(Action::Push(
                    Frame::new(
                        AstNode::Expression(value.clone()),
                        frame.scope.clone(),
                        OnRet::AsStateProp("value"),
                    )
                    .with_name(name_hint),
                ))
            }
            _ => {
                let key = to_property_key(&take_slot_value(frame, "key")?);
                let value = take_slot_value(frame, "value")?;
                set_member(&object, &key, value)?;
                frame.index += 1;
                frame.sub_index = 0;
                Ok(Action::Stay)
            }
        },
        ObjectPropertyType::Method { key, function, .. } => match frame.sub_index {
            0 => Ok(Action::Push(
                Frame::new(
                    AstNode::Expression(key.clone()),
                    frame.scope.clone(),
                    OnRet::AsStateProp("key"),
                )
                .with_role(Role::Key),
            )),
            _ => {
                let key = to_property_key(&take_slot_value(frame, "key")?);
                let method = build_function(function, &frame.scope, Some(key.clone()), cx.runtime);
                set_member(&object, &key, method)?;
                frame.index += 1;
                frame.sub_index = 0;
                Ok(Action::Stay)
            }
        },
        ObjectPropertyType::Spread { argument, .. } => match frame.sub_index {
            0 => Ok(Action::Push(Frame::new(
                AstNode::Expression(argument.clone()),
                frame.scope.clone(),
                OnRet::AsStateProp("value"),
            ))),
            _ => {
                let source = take_slot_value(frame, "value")?;
                spread_into_object(&object, &source)?;
                frame.index += 1;
                frame.sub_index = 0;
                Ok(Action::Stay)
            }
        },
    }
}

/// Merge the source's own enumerable entries into the target object.
/// Primitives contribute nothing.
fn spread_into_object(target: &Value, source: &Value) -> Result<(), EngineError> {
    match source {
        Value::Object(src) => {
            let entries: Vec<(String, Value)> = src.borrow().entries().to_vec();
            for (key, value) in entries {
                set_member(target, &key, value)?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (i, value) in items.borrow().iter().enumerate() {
                set_member(target, &i.to_string(), value.clone())?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn step_unary(
    frame: &mut Frame,
    operator: UnaryOperator,
    argument: &ExprRef,
) -> Result<Action, EngineError> {
    match operator {
        UnaryOperator::Delete => {
            return Err(EngineError::UnsupportedOperator("delete".to_string()))
        }
        UnaryOperator::Throw => return Err(EngineError::UnsupportedOperator("throw".to_string())),
        _ => {}
    }
    match frame.sub_index {
        0 => Ok(Action::Push(Frame::new(
            AstNode::Expression(argument.clone()),
            frame.scope.clone(),
            OnRet::AsState,
        ))),
        _ => {
            let value = take_ret_value(frame)?;
            let result = match operator {
                UnaryOperator::Not => Value::Boolean(!to_boolean(&value)),
                UnaryOperator::BitNot => Value::Number(!to_int32(&value) as f64),
                UnaryOperator::Plus => Value::Number(to_number(&value)),
                UnaryOperator::Minus => Value::Number(-to_number(&value)),
                UnaryOperator::Void => Value::Undefined,
                UnaryOperator::TypeOf => Value::String(type_of(&value).to_string()),
                UnaryOperator::Delete | UnaryOperator::Throw => unreachable!(),
            };
            Ok(Action::Ret(Ret::Val(result)))
        }
    }
}

fn step_binary(
    frame: &mut Frame,
    operator: BinaryOperator,
    left: &ExprRef,
    right: &ExprRef,
    cx: &mut StepContext,
) -> Result<Action, EngineError> {
    match frame.sub_index {
        0 => Ok(Action::Push(Frame::new(
            AstNode::Expression(left.clone()),
            frame.scope.clone(),
            OnRet::AsStateProp("left"),
        ))),
        1 => {
            let left_value = take_slot_value(frame, "left")?;
            if operator.is_logical() {
                let short_circuits = match operator {
                    BinaryOperator::LogicalAnd => !to_boolean(&left_value),
                    BinaryOperator::LogicalOr => to_boolean(&left_value),
                    BinaryOperator::NullishCoalescing => !left_value.is_nullish(),
                    _ => unreachable!(),
                };
                if short_circuits {
                    return Ok(Action::Ret(Ret::Val(left_value)));
                }
                return Ok(Action::Push(Frame::new(
                    AstNode::Expression(right.clone()),
                    frame.scope.clone(),
                    OnRet::AsStateProp("right"),
                )));
            }
            frame.put_slot_ret("left", Ret::Val(left_value));
            Ok(Action::Push(Frame::new(
                AstNode::Expression(right.clone()),
                frame.scope.clone(),
                OnRet::AsStateProp("right"),
            )))
        }
        _ => {
            let right_value = take_slot_value(frame, "right")?;
            if operator.is_logical() {
                return Ok(Action::Ret(Ret::Val(right_value)));
            }
            let left_value = take_slot_value(frame, "left")?;
            let result = apply_binary(operator, left_value, right_value)?;
            Ok(Action::Ret(Ret::Val(result)))
        }
    }
}

pub(crate) fn apply_binary(
    operator: BinaryOperator,
    left: Value,
    right: Value,
) -> Result<Value, EngineError> {
    Ok(match operator {
        BinaryOperator::Add => {
            if is_string_concat(&left, &right) {
                Value::String(concat_strings(&left, &right))
            } else {
                Value::Number(to_number(&left) + to_number(&right))
            }
        }
        BinaryOperator::Subtract => Value::Number(to_number(&left) - to_number(&right)),
        BinaryOperator::Multiply => Value::Number(to_number(&left) * to_number(&right)),
        BinaryOperator::Divide => Value::Number(to_number(&left) / to_number(&right)),
        BinaryOperator::Modulo => Value::Number(to_number(&left) % to_number(&right)),
        BinaryOperator::Exponent => Value::Number(to_number(&left).powf(to_number(&right))),

        BinaryOperator::BitAnd => Value::Number((to_int32(&left) & to_int32(&right)) as f64),
        BinaryOperator::BitOr => Value::Number((to_int32(&left) | to_int32(&right)) as f64),
        BinaryOperator::BitXor => Value::Number((to_int32(&left) ^ to_int32(&right)) as f64),
        BinaryOperator::ShiftLeft => {
            Value::Number((to_int32(&left) << (to_uint32(&right) & 0x1f)) as f64)
        }
        BinaryOperator::ShiftRight => {
            Value::Number((to_int32(&left) >> (to_uint32(&right) & 0x1f)) as f64)
        }
        BinaryOperator::ShiftRightUnsigned => {
            Value::Number((to_uint32(&left) >> (to_uint32(&right) & 0x1f)) as f64)
        }

        BinaryOperator::LessThan => {
            Value::Boolean(matches!(compare(&left, &right), Some(std::cmp::Ordering::Less)))
        }
        BinaryOperator::LessThanEquals => Value::Boolean(matches!(
            compare(&left, &right),
            Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
        )),
        BinaryOperator::GreaterThan => Value::Boolean(matches!(
            compare(&left, &right),
            Some(std::cmp::Ordering::Greater)
        )),
        BinaryOperator::GreaterThanEquals => Value::Boolean(matches!(
            compare(&left, &right),
            Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
        )),

        BinaryOperator::LooseEquals => Value::Boolean(abstract_equals(&left, &right)),
        BinaryOperator::LooseNotEquals => Value::Boolean(!abstract_equals(&left, &right)),
        BinaryOperator::StrictEquals => Value::Boolean(strict_equals(&left, &right)),
        BinaryOperator::StrictNotEquals => Value::Boolean(!strict_equals(&left, &right)),

        BinaryOperator::In => {
            let key = to_property_key(&left);
            Value::Boolean(has_property(&right, &key)?)
        }
        BinaryOperator::InstanceOf => instanceof_check(&left, &right)?,

        // Apply the right side as a function to the left.
        BinaryOperator::Pipeline => match right {
            Value::Function(f) => f.call(Value::Undefined, vec![left])?,
            other => {
                return Err(EngineError::Type(format!(
                    "pipeline target {} is not a function",
                    other
                )))
            }
        },

        BinaryOperator::LogicalAnd
        | BinaryOperator::LogicalOr
        | BinaryOperator::NullishCoalescing => {
            return Err(EngineError::StateInvariant(
                "logical operators are handled by short-circuit phases".to_string(),
            ))
        }
    })
}

/// Without a prototype model, `instanceof` only recognizes the engine's
/// built-in constructors.
fn instanceof_check(left: &Value, right: &Value) -> Result<Value, EngineError> {
    match right {
        Value::Function(FunctionValue::Native(native)) => Ok(Value::Boolean(match native.name.as_str() {
            "Promise" => matches!(left, Value::Promise(_)),
            _ => false,
        })),
        Value::Function(FunctionValue::User(_)) => Ok(Value::Boolean(false)),
        other => Err(EngineError::Type(format!(
            "right-hand side of instanceof ({}) is not callable",
            other
        ))),
    }
}

fn step_assignment(
    frame: &mut Frame,
    operator: crate::parser::ast::AssignmentOperator,
    left: &ExprRef,
    right: &ExprRef,
    cx: &mut StepContext,
) -> Result<Action, EngineError> {
    let name_hint = match left.as_ref() {
        ExpressionType::Identifier(id) => Some(id.name.clone()),
        _ => None,
    };
    if operator.is_logical() {
        // Logical assignment reads the target first and may skip the right
        // side entirely.
        return match frame.sub_index {
            0 => Ok(Action::Push(
                Frame::new(
                    AstNode::Expression(left.clone()),
                    frame.scope.clone(),
                    OnRet::AsStateProp("target"),
                )
                .with_role(Role::Left),
            )),
            1 => {
                let place = expect_place(take_slot_ret(frame, "target")?)?;
                let current = read_place(&place, cx.runtime)?;
                let short_circuits = match operator {
                    crate::parser::ast::AssignmentOperator::LogicalAndEquals => {
                        !to_boolean(&current)
                    }
                    crate::parser::ast::AssignmentOperator::LogicalOrEquals => to_boolean(&current),
                    crate::parser::ast::AssignmentOperator::NullishEquals => !current.is_nullish(),
                    _ => unreachable!(),
                };
                if short_circuits {
                    return Ok(Action::Ret(Ret::Val(current)));
                }
                frame.put_slot_ret("target", Ret::Place(place));
                Ok(Action::Push(
                    Frame::new(
                        AstNode::Expression(right.clone()),
                        frame.scope.clone(),
                        OnRet::AsStateProp("value"),
                    )
                    .with_name(name_hint),
                ))
            }
            _ => {
                let place = expect_place(take_slot_ret(frame, "target")?)?;
                let value = take_slot_value(frame, "value")?;
                write_place(&place, value.clone())?;
                Ok(Action::Ret(Ret::Val(value)))
            }
        };
    }
    match frame.sub_index {
        0 => Ok(Action::Push(
            Frame::new(
                AstNode::Expression(right.clone()),
                frame.scope.clone(),
                OnRet::AsStateProp("value"),
            )
            .with_name(name_hint),
        )),
        1 => Ok(Action::Push(
            Frame::new(
                AstNode::Expression(left.clone()),
                frame.scope.clone(),
                OnRet::AsStateProp("target"),
            )
            .with_role(Role::Left),
        )),
        _ => {
            let place = expect_place(take_slot_ret(frame, "target")?)?;
            let mut value = take_slot_value(frame, "value")?;
            if let Some(binop) = operator.binary_operator() {
                let current = read_place(&place, cx.runtime)?;
                value = apply_binary(binop, current, value)?;
            }
            write_place(&place, value.clone())?;
            Ok(Action::Ret(Ret::Val(value)))
        }
    }
}

fn expect_place(ret: Ret) -> Result<Place, EngineError> {
    match ret {
        Ret::Place(place) => Ok(place),
        _ => Err(EngineError::Type("invalid assignment target".to_string())),
    }
}

fn step_update(
    frame: &mut Frame,
    operator: UpdateOperator,
    prefix: bool,
    argument: &ExprRef,
    cx: &mut StepContext,
) -> Result<Action, EngineError> {
    match frame.sub_index {
        0 => Ok(Action::Push(
            Frame::new(
                AstNode::Expression(argument.clone()),
                frame.scope.clone(),
                OnRet::AsStateProp("target"),
            )
            .with_role(Role::Left),
        )),
        _ => {
            let place = expect_place(take_slot_ret(frame, "target")?)?;
            let old = to_number(&read_place(&place, cx.runtime)?);
            let new = match operator {
                UpdateOperator::Increment => old + 1.0,
                UpdateOperator::Decrement => old - 1.0,
            };
            write_place(&place, Value::Number(new))?;
            Ok(Action::Ret(Ret::Val(Value::Number(if prefix {
                new
            } else {
                old
            }))))
        }
    }
}

fn step_member(
    frame: &mut Frame,
    object: &ExprRef,
    property: &ExprRef,
    computed: bool,
    optional: bool,
    cx: &mut StepContext,
) -> Result<Action, EngineError> {
    match frame.sub_index {
        0 => Ok(Action::Push(Frame::new(
            AstNode::Expression(object.clone()),
            frame.scope.clone(),
            OnRet::AsStateProp("object"),
        ))),
        1 => {
            let object_value = take_slot_value(frame, "object")?;
            if optional && object_value.is_nullish() {
                return Ok(Action::Ret(Ret::Val(Value::Undefined)));
            }
            frame.put_slot_ret("object", Ret::Val(object_value));
            let mut property_frame = Frame::new(
                AstNode::Expression(property.clone()),
                frame.scope.clone(),
                OnRet::AsStateProp("key"),
            );
            if !computed {
                property_frame = property_frame.with_role(Role::Key);
            }
            Ok(Action::Push(property_frame))
        }
        _ => {
            let object_value = take_slot_value(frame, "object")?;
            let key = to_property_key(&take_slot_value(frame, "key")?);
            match frame.role {
                Some(Role::Left) => Ok(Action::Ret(Ret::Place(Place::Member(object_value, key)))),
                Some(Role::Callee) => {
                    let function = get_member(&object_value, &key, cx.runtime)?;
                    Ok(Action::Ret(Ret::Callee {
                        function,
                        this: object_value,
                    }))
                }
                _ => Ok(Action::Ret(Ret::Val(get_member(
                    &object_value,
                    &key,
                    cx.runtime,
                )?))),
            }
        }
    }
}

enum CallKind {
    Normal { optional: bool },
    New,
}

/// Arguments evaluate in source order; only then is the callee resolved
/// (with the `callee` role so method calls receive their `this`).
fn step_call(
    frame: &mut Frame,
    callee: &ExprRef,
    arguments: &[ExpressionOrSpread],
    kind: CallKind,
    cx: &mut StepContext,
) -> Result<Action, EngineError> {
    if frame.index < arguments.len() {
        let argument = &arguments[frame.index];
        return match frame.sub_index {
            0 => {
                let inner = match argument {
                    ExpressionOrSpread::Expression(e) | ExpressionOrSpread::Spread(e) => e,
                };
                Ok(Action::Push(Frame::new(
                    AstNode::Expression(inner.clone()),
                    frame.scope.clone(),
                    OnRet::AsStateProp("cur"),
                )))
            }
            _ => {
                let value = take_slot_value(frame, "cur")?;
                match argument {
                    ExpressionOrSpread::Expression(_) => frame.push_slot_value("args", value),
                    ExpressionOrSpread::Spread(_) => match value {
                        Value::Array(items) => {
                            let cloned = items.borrow().clone();
                            frame.extend_slot_values("args", cloned);
                        }
                        Value::String(s) => {
                            let chars = s.chars().map(|c| Value::String(c.to_string())).collect();
                            frame.extend_slot_values("args", chars);
                        }
                        other => {
                            return Err(EngineError::Type(format!("{} is not iterable", other)))
                        }
                    },
                }
                frame.index += 1;
                frame.sub_index = 0;
                Ok(Action::Stay)
            }
        };
    }
    match frame.sub_index {
        0 => Ok(Action::Push(
            Frame::new(
                AstNode::Expression(callee.clone()),
                frame.scope.clone(),
                OnRet::AsStateProp("callee"),
            )
            .with_role(Role::Callee),
        )),
        _ => {
            let callee_ret = take_slot_ret(frame, "callee")?;
            let args = frame.take_slot_values("args");
            let (function, this) = match callee_ret {
                Ret::Callee { function, this } => (function, this),
                Ret::Val(v) => (v, Value::Undefined),
                Ret::Place(_) => {
                    return Err(EngineError::StateInvariant(
                        "callee resolved to an assignable place".to_string(),
                    ))
                }
            };
            match kind {
                CallKind::New => match function {
                    Value::Function(f) => Ok(Action::Ret(Ret::Val(construct(&f, args)?))),
                    other => Err(EngineError::Type(format!("{} is not a constructor", other))),
                },
                CallKind::Normal { optional } => {
                    if optional && function.is_nullish() {
                        return Ok(Action::Ret(Ret::Val(Value::Undefined)));
                    }
                    match function {
                        Value::Function(f) => Ok(Action::Ret(Ret::Val(f.call(this, args)?))),
                        other => Err(EngineError::Type(format!("{} is not a function", other))),
                    }
                }
            }
        }
    }
}

fn step_await(
    frame: &mut Frame,
    argument: &ExprRef,
    cx: &mut StepContext,
) -> Result<Action, EngineError> {
    match frame.sub_index {
        0 => Ok(Action::Push(Frame::new(
            AstNode::Expression(argument.clone()),
            frame.scope.clone(),
            OnRet::AsState,
        ))),
        1 => {
            if cx.awaiting.is_some() {
                return Err(EngineError::StateInvariant(
                    "awaitingPromise already set".to_string(),
                ));
            }
            let value = take_ret_value(frame)?;
            match wrap_awaitable(&value)? {
                Some(promise) => {
                    *cx.awaiting = Some(promise);
                    frame.sub_index = 2;
                    Ok(Action::Stay)
                }
                // Awaiting a plain value completes immediately.
                None => Ok(Action::Ret(Ret::Val(value))),
            }
        }
        _ => {
            let promise = cx.awaiting.clone().ok_or_else(|| {
                EngineError::StateInvariant("awaited promise disappeared".to_string())
            })?;
            match promise.state() {
                PromiseState::Pending => Ok(Action::Park),
                PromiseState::Fulfilled(value) => {
                    *cx.awaiting = None;
                    Ok(Action::Ret(Ret::Val(value)))
                }
                PromiseState::Aborted => {
                    *cx.awaiting = None;
                    Err(EngineError::Aborted)
                }
                PromiseState::Rejected(reason) => {
                    *cx.awaiting = None;
                    Err(EngineError::Rejected(to_js_string(&reason)))
                }
            }
        }
    }
}

/// A promise awaits as itself; an object with a callable `then` is wrapped
/// into an observable promise; anything else is not awaitable.
fn wrap_awaitable(value: &Value) -> Result<Option<ObservablePromise>, EngineError> {
    match value {
        Value::Promise(p) => Ok(Some(p.clone())),
        Value::Object(obj) => {
            let then = obj.borrow().get("then").cloned();
            match then {
                Some(Value::Function(then_fn)) => {
                    let promise = ObservablePromise::pending();
                    let (resolve, reject) = std_lib::promise::resolving_natives(&promise);
                    then_fn.call(value.clone(), vec![resolve, reject])?;
                    Ok(Some(promise))
                }
                _ => Ok(None),
            }
        }
        _ => Ok(None),
    }
}
