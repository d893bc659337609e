//! Statement-node state machines.
//!
//! Each function advances one statement frame by a single transition. The
//! loop phase layouts matter to the unwinder in `step`: a `for` frame uses
//! `index` 0..=3 for init/test/body/update, `while` and `do-while` use 0
//! for the test phase and 1 for the body phase.

use std::rc::Rc;

use crate::parser::ast::{
    ForInit, StatementType, StmtRef, VariableDeclarationData,
};
use crate::runner::ds::error::EngineError;
use crate::runner::ds::frame::{AstNode, Frame, OnRet, Ret};
use crate::runner::ds::operations::type_conversion::to_boolean;
use crate::runner::ds::scope::Scope;
use crate::runner::ds::value::Value;
use crate::runner::eval::function::build_function;
use crate::runner::eval::step::{step_block_like, take_ret_value, take_slot_value, Action, StepContext};

pub(crate) fn step_statement(
    stmt: &StmtRef,
    frame: &mut Frame,
    cx: &mut StepContext,
) -> Result<Action, EngineError> {
    match stmt.as_ref() {
        StatementType::EmptyStatement { .. } => Ok(Action::Ret(Ret::Val(Value::Undefined))),

        StatementType::BlockStatement { body, .. } => step_block_like(frame, body),

        StatementType::ExpressionStatement { expression, .. } => match frame.sub_index {
            0 => Ok(Action::Push(Frame::new(
                AstNode::Expression(expression.clone()),
                frame.scope.clone(),
                OnRet::Discard,
            ))),
            _ => Ok(Action::Ret(Ret::Val(Value::Undefined))),
        },

        StatementType::VariableDeclaration(decl) => step_variable_declaration(decl, frame),

        StatementType::IfStatement {
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
                if to_boolean(&test_value) {
                    Ok(Action::Push(Frame::new(
                        AstNode::Statement(consequent.clone()),
                        frame.scope.clone(),
                        OnRet::Discard,
                    )))
                } else if let Some(alternate) = alternate {
                    Ok(Action::Push(Frame::new(
                        AstNode::Statement(alternate.clone()),
                        frame.scope.clone(),
                        OnRet::Discard,
                    )))
                } else {
                    Ok(Action::Ret(Ret::Val(Value::Undefined)))
                }
            }
            _ => Ok(Action::Ret(Ret::Val(Value::Undefined))),
        },

        StatementType::ForStatement {
            init,
            test,
            update,
            body,
            ..
        } => step_for(frame, init, test, update, body),

        StatementType::WhileStatement { test, body, .. } => {
            step_while_like(frame, test, body)
        }

        StatementType::DoWhileStatement { test, body, .. } => {
            // Same phases as `while`, entered at the body phase first. The
            // marker slot distinguishes first entry from a later return to
            // the test phase.
            if frame.state.is_empty() {
                frame.put_slot_ret("entered", Ret::Val(Value::Boolean(true)));
                frame.index = 1;
                return Ok(Action::Stay);
            }
            step_while_like(frame, test, body)
        }

        StatementType::BreakStatement { .. } => Ok(Action::BreakLoop),

        StatementType::ContinueStatement { .. } => Ok(Action::ContinueLoop),

        StatementType::ReturnStatement { argument, .. } => match frame.sub_index {
            0 => match argument {
                Some(argument) => Ok(Action::Push(Frame::new(
                    AstNode::Expression(argument.clone()),
                    frame.scope.clone(),
                    OnRet::AsState,
                ))),
                None => Ok(Action::ReturnValue(Value::Undefined)),
            },
            _ => {
                let value = take_ret_value(frame)?;
                Ok(Action::ReturnValue(value))
            }
        },

        StatementType::FunctionDeclaration { function, .. } => {
            let name = match &function.name {
                Some(name) => name.clone(),
                None => {
                    return Err(EngineError::StateInvariant(
                        "function declaration without a name".to_string(),
                    ))
                }
            };
            let value = build_function(function, &frame.scope, None, cx.runtime);
            frame.scope.declare(&name, value);
            Ok(Action::Ret(Ret::Val(Value::Undefined)))
        }
    }
}

/// Declarators evaluate left to right. Each binding is pre-declared as
/// `Uninitialized` before its initializer runs.
fn step_variable_declaration(
    decl: &Rc<VariableDeclarationData>,
    frame: &mut Frame,
) -> Result<Action, EngineError> {
    if frame.index >= decl.declarations.len() {
        return Ok(Action::Ret(Ret::Val(Value::Undefined)));
    }
    let declarator = &decl.declarations[frame.index];
    let name = declarator.id.name.as_str();
    match frame.sub_index {
        0 => {
            frame.scope.declare(name, Value::Uninitialized);
            match &declarator.init {
                Some(init) => Ok(Action::Push(
                    Frame::new(
                        AstNode::Expression(init.clone()),
                        frame.scope.clone(),
                        OnRet::AsState,
                    )
                    .with_name(Some(name.to_string())),
                )),
                None => {
                    frame.scope.declare(name, Value::Undefined);
                    frame.index += 1;
                    Ok(Action::Stay)
                }
            }
        }
        _ => {
            let value = take_ret_value(frame)?;
            frame.scope.declare(name, value);
            frame.index += 1;
            frame.sub_index = 0;
            Ok(Action::Stay)
        }
    }
}

/// Four phases keyed on `index`: 0 init, 1 test, 2 body, 3 update. Init,
/// test and update share one init scope; each body iteration runs against
/// a fresh fork of it.
fn step_for(
    frame: &mut Frame,
    init: &Option<ForInit>,
    test: &Option<crate::parser::ast::ExprRef>,
    update: &Option<crate::parser::ast::ExprRef>,
    body: &StmtRef,
) -> Result<Action, EngineError> {
    let init_scope = match frame.slot_scope("scope") {
        Some(scope) => scope,
        None => {
            let scope = Scope::child(&frame.scope);
            frame.put_slot_scope("scope", scope);
            return Ok(Action::Stay);
        }
    };
    match frame.index {
        // init
        0 => match frame.sub_index {
            0 => match init {
                Some(ForInit::Declaration(decl)) => Ok(Action::Push(Frame::new(
                    AstNode::Statement(Rc::new(StatementType::VariableDeclaration(decl.clone()))),
                    init_scope,
                    OnRet::Discard,
                ))),
                Some(ForInit::Expression(expr)) => Ok(Action::Push(Frame::new(
                    AstNode::Expression(expr.clone()),
                    init_scope,
                    OnRet::Discard,
                ))),
                None => {
                    frame.index = 1;
                    Ok(Action::Stay)
                }
            },
            _ => {
                frame.index = 1;
                frame.sub_index = 0;
                Ok(Action::Stay)
            }
        },
        // test; missing test counts as true
        1 => match frame.sub_index {
            0 => match test {
                Some(test) => Ok(Action::Push(Frame::new(
                    AstNode::Expression(test.clone()),
                    init_scope,
                    OnRet::AsStateProp("test"),
                ))),
                None => {
                    frame.put_slot_ret("test", Ret::Val(Value::Boolean(true)));
                    frame.sub_index = 1;
                    Ok(Action::Stay)
                }
            },
            _ => {
                let test_value = take_slot_value(frame, "test")?;
                if to_boolean(&test_value) {
                    frame.index = 2;
                    frame.sub_index = 0;
                    Ok(Action::Stay)
                } else {
                    Ok(Action::Ret(Ret::Val(Value::Undefined)))
                }
            }
        },
        // body, in a per-iteration fork of the init scope
        2 => match frame.sub_index {
            0 => Ok(Action::Push(Frame::new(
                AstNode::Statement(body.clone()),
                init_scope.fork(),
                OnRet::Discard,
            ))),
            _ => {
                frame.index = 3;
                frame.sub_index = 0;
                Ok(Action::Stay)
            }
        },
        // update, then back to the test
        _ => match frame.sub_index {
            0 => match update {
                Some(update) => Ok(Action::Push(Frame::new(
                    AstNode::Expression(update.clone()),
                    init_scope,
                    OnRet::Discard,
                ))),
                None => {
                    frame.sub_index = 1;
                    Ok(Action::Stay)
                }
            },
            _ => {
                frame.index = 1;
                frame.sub_index = 0;
                Ok(Action::Stay)
            }
        },
    }
}

/// `while` and `do-while` share the two-phase machine: index 0 evaluates
/// the test, index 1 runs the body.
fn step_while_like(
    frame: &mut Frame,
    test: &crate::parser::ast::ExprRef,
    body: &StmtRef,
) -> Result<Action, EngineError> {
    match frame.index {
        0 => match frame.sub_index {
            0 => Ok(Action::Push(Frame::new(
                AstNode::Expression(test.clone()),
                frame.scope.clone(),
                OnRet::AsStateProp("test"),
            ))),
            _ => {
                let test_value = take_slot_value(frame, "test")?;
                if to_boolean(&test_value) {
                    frame.index = 1;
                    frame.sub_index = 0;
                    Ok(Action::Stay)
                } else {
                    Ok(Action::Ret(Ret::Val(Value::Undefined)))
                }
            }
        },
        _ => match frame.sub_index {
            0 => Ok(Action::Push(Frame::new(
                AstNode::Statement(body.clone()),
                frame.scope.clone(),
                OnRet::Discard,
            ))),
            _ => {
                frame.index = 0;
                frame.sub_index = 0;
                Ok(Action::Stay)
            }
        },
    }
}
