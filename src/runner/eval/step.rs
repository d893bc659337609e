//! The step evaluator.
//!
//! `step_once` performs exactly one unit of progress on an execution's top
//! frame: push a child frame, pop with a value, or mutate the frame's own
//! `(index, sub_index, state)`. Delivered returns travel through the child
//! frame's `on_ret` and bump the parent's `sub_index` by one; that is the
//! only inter-frame channel.
//!
//! `break`, `continue` and `return` are stack unwinds handled here: frames
//! are truncated down to the nearest loop (or call) frame and the machine
//! resumes from the appropriate phase.

use tracing::trace;

use crate::parser::ast::{FunctionBodyType, StatementType, StmtRef};
use crate::runner::ds::error::EngineError;
use crate::runner::ds::frame::{AstNode, Frame, OnRet, Place, Ret, Role, Scratch};
use crate::runner::ds::operations::property::{get_member, set_member};
use crate::runner::ds::promise::ObservablePromise;
use crate::runner::ds::scope::Scope;
use crate::runner::ds::value::Value;
use crate::runner::eval::{expression, statement};
use crate::runner::exec::execution::Execution;
use crate::runner::exec::runtime::Runtime;

/// Outcome of one `step_once`.
pub(crate) enum StepEvent {
    /// Progress was made and more frames remain.
    Continue,
    /// Suspended on a pending promise; nothing changed.
    Parked,
    /// The stack emptied; the execution has terminated.
    Finished,
}

/// What the dispatched frame logic asks the driver to do.
pub(crate) enum Action {
    Push(Frame),
    Ret(Ret),
    /// Indices or scratch were mutated in place.
    Stay,
    /// Awaited promise still pending.
    Park,
    BreakLoop,
    ContinueLoop,
    ReturnValue(Value),
}

/// Shared context handed to the per-node step functions.
pub(crate) struct StepContext<'a> {
    pub runtime: &'a Runtime,
    pub awaiting: &'a mut Option<ObservablePromise>,
}

pub(crate) fn step_once(exec: &Execution) -> Result<StepEvent, EngineError> {
    let runtime = exec.runtime()?;
    let step_no = exec.bump_steps();
    let action = {
        let state = &mut *exec.inner.state.borrow_mut();
        let depth = state.stack.len();
        if depth == 0 {
            return Err(EngineError::StateInvariant(
                "step on an empty stack".to_string(),
            ));
        }
        let awaiting = &mut state.awaiting_promise;
        let top = state.stack.top_mut().expect("non-empty stack");
        if runtime.is_debug() {
            trace!(
                target: "lockstep::step",
                "[{}:{}] {}{} {}:{} {}",
                exec.desc(),
                step_no,
                "  ".repeat(depth - 1),
                top.node.kind(),
                top.index,
                top.sub_index,
                top.node.meta().line_slice()
            );
        }
        let mut cx = StepContext {
            runtime: &runtime,
            awaiting,
        };
        dispatch(top, &mut cx)?
    };
    apply(exec, &runtime, action, step_no)
}

fn dispatch(frame: &mut Frame, cx: &mut StepContext) -> Result<Action, EngineError> {
    let node = frame.node.clone();
    match &node {
        AstNode::Program(program) => step_block_like(frame, &program.body),
        AstNode::FunctionBody(function) => step_function_body(frame, function),
        AstNode::Statement(stmt) => statement::step_statement(stmt, frame, cx),
        AstNode::Expression(expr) => expression::step_expression(expr, frame, cx),
    }
}

/// Hoisting: every declaration of a statement list is pre-bound to the
/// `Uninitialized` sentinel when its scope is entered, so a read before
/// the declaration executes fails as an uninitialized read rather than an
/// unknown name.
pub(crate) fn hoist_declarations(body: &[StmtRef], scope: &Scope) {
    for stmt in body {
        match stmt.as_ref() {
            StatementType::VariableDeclaration(decl) => {
                for declarator in &decl.declarations {
                    scope.declare(&declarator.id.name, Value::Uninitialized);
                }
            }
            StatementType::FunctionDeclaration { function, .. } => {
                if let Some(name) = &function.name {
                    scope.declare(name, Value::Uninitialized);
                }
            }
            _ => {}
        }
    }
}

/// Program and block statements: allocate a child scope, then run the
/// statements in order, discarding each statement's return.
pub(crate) fn step_block_like(frame: &mut Frame, body: &[StmtRef]) -> Result<Action, EngineError> {
    let scope = match frame.slot_scope("scope") {
        Some(scope) => scope,
        None => {
            let scope = Scope::child(&frame.scope);
            hoist_declarations(body, &scope);
            frame.put_slot_scope("scope", scope);
            return Ok(Action::Stay);
        }
    };
    if frame.index >= body.len() {
        return Ok(Action::Ret(Ret::Val(Value::Undefined)));
    }
    if frame.sub_index == 0 {
        Ok(Action::Push(Frame::new(
            AstNode::Statement(body[frame.index].clone()),
            scope,
            OnRet::Discard,
        )))
    } else {
        frame.index += 1;
        frame.sub_index = 0;
        Ok(Action::Stay)
    }
}

/// A called function's body. The function scope (with `this` and the
/// parameters) is already on the frame, so block bodies run statements
/// directly against it; expression bodies return their value.
fn step_function_body(
    frame: &mut Frame,
    function: &std::rc::Rc<crate::parser::ast::FunctionData>,
) -> Result<Action, EngineError> {
    match &function.body {
        FunctionBodyType::Block(body) => {
            if frame.index >= body.len() {
                return Ok(Action::Ret(Ret::Val(Value::Undefined)));
            }
            if frame.sub_index == 0 {
                // First entry into the body; later (index, 0) states only
                // reach here with a higher index.
                if frame.index == 0 {
                    hoist_declarations(body, &frame.scope);
                }
                Ok(Action::Push(Frame::new(
                    AstNode::Statement(body[frame.index].clone()),
                    frame.scope.clone(),
                    OnRet::Discard,
                )))
            } else {
                frame.index += 1;
                frame.sub_index = 0;
                Ok(Action::Stay)
            }
        }
        FunctionBodyType::Expression(expr) => match frame.sub_index {
            0 => Ok(Action::Push(Frame::new(
                AstNode::Expression(expr.clone()),
                frame.scope.clone(),
                OnRet::AsState,
            ))),
            _ => {
                let value = take_ret_value(frame)?;
                Ok(Action::Ret(Ret::Val(value)))
            }
        },
    }
}

fn apply(
    exec: &Execution,
    runtime: &Runtime,
    action: Action,
    step_no: u64,
) -> Result<StepEvent, EngineError> {
    match action {
        Action::Stay => Ok(StepEvent::Continue),
        Action::Park => Ok(StepEvent::Parked),
        Action::Push(frame) => {
            exec.inner.state.borrow_mut().stack.push(frame);
            Ok(StepEvent::Continue)
        }
        Action::Ret(ret) => deliver(exec, runtime, ret, step_no),
        Action::BreakLoop => {
            {
                let state = &mut *exec.inner.state.borrow_mut();
                let idx = state
                    .stack
                    .rfind(|f| f.node.is_loop())
                    .ok_or_else(|| EngineError::Syntax("illegal break statement".to_string()))?;
                state.stack.truncate_above(idx);
            }
            deliver(exec, runtime, Ret::Val(Value::Undefined), step_no)
        }
        Action::ContinueLoop => {
            let state = &mut *exec.inner.state.borrow_mut();
            let idx = state
                .stack
                .rfind(|f| f.node.is_loop())
                .ok_or_else(|| EngineError::Syntax("illegal continue statement".to_string()))?;
            state.stack.truncate_above(idx);
            let frame = state.stack.top_mut().expect("loop frame present");
            frame.index = match &frame.node {
                AstNode::Statement(s) => match s.as_ref() {
                    // Next-iteration phases: for re-enters its update,
                    // while its test, do-while its body.
                    StatementType::ForStatement { .. } => 3,
                    StatementType::WhileStatement { .. } => 0,
                    StatementType::DoWhileStatement { .. } => 1,
                    _ => {
                        return Err(EngineError::StateInvariant(
                            "continue resolved to a non-loop frame".to_string(),
                        ))
                    }
                },
                _ => {
                    return Err(EngineError::StateInvariant(
                        "continue resolved to a non-loop frame".to_string(),
                    ))
                }
            };
            frame.sub_index = 0;
            Ok(StepEvent::Continue)
        }
        Action::ReturnValue(value) => {
            {
                let state = &mut *exec.inner.state.borrow_mut();
                let idx = state
                    .stack
                    .rfind(|f| f.role == Some(Role::Call))
                    .ok_or_else(|| {
                        EngineError::StateInvariant(
                            "return without an enclosing call frame".to_string(),
                        )
                    })?;
                state.stack.truncate_above(idx);
            }
            deliver(exec, runtime, Ret::Val(value), step_no)
        }
    }
}

/// Pop the top frame and hand its return to the parent through `on_ret`.
/// Every delivery bumps the parent's `sub_index` by exactly one.
fn deliver(
    exec: &Execution,
    runtime: &Runtime,
    ret: Ret,
    step_no: u64,
) -> Result<StepEvent, EngineError> {
    let finished = {
        let state = &mut *exec.inner.state.borrow_mut();
        let child = state.stack.pop().ok_or_else(|| {
            EngineError::StateInvariant("return delivery on an empty stack".to_string())
        })?;
        if runtime.is_debug() {
            trace!(
                target: "lockstep::step",
                "[{}:{}] {}→ {}",
                exec.desc(),
                step_no,
                "  ".repeat(state.stack.len()),
                ret
            );
        }
        match child.on_ret {
            OnRet::Discard => {}
            OnRet::AsState => {
                if let Some(parent) = state.stack.top_mut() {
                    parent.state = Scratch::Ret(ret);
                }
            }
            OnRet::AsStateProp(key) => {
                if let Some(parent) = state.stack.top_mut() {
                    parent.put_slot_ret(key, ret);
                }
            }
            OnRet::Capture(cell) => {
                *cell.borrow_mut() = Some(ret.into_value()?);
            }
        }
        if let Some(parent) = state.stack.top_mut() {
            parent.sub_index += 1;
        }
        state.stack.is_empty()
    };
    if finished {
        exec.finish_ok();
        Ok(StepEvent::Finished)
    } else {
        Ok(StepEvent::Continue)
    }
}

// -- scratch access helpers used by the per-node step functions -------------

pub(crate) fn take_ret_value(frame: &mut Frame) -> Result<Value, EngineError> {
    frame
        .take_ret()
        .ok_or_else(|| EngineError::StateInvariant("expected a delivered return".to_string()))?
        .into_value()
}

pub(crate) fn take_slot_value(frame: &mut Frame, key: &'static str) -> Result<Value, EngineError> {
    frame
        .take_slot_ret(key)
        .ok_or_else(|| {
            EngineError::StateInvariant(format!("expected a delivered return in slot \"{}\"", key))
        })?
        .into_value()
}

pub(crate) fn take_slot_ret(frame: &mut Frame, key: &'static str) -> Result<Ret, EngineError> {
    frame.take_slot_ret(key).ok_or_else(|| {
        EngineError::StateInvariant(format!("expected a delivered return in slot \"{}\"", key))
    })
}

/// Read through an assignable place.
pub(crate) fn read_place(place: &Place, runtime: &Runtime) -> Result<Value, EngineError> {
    match place {
        Place::Binding(scope, name) => scope.get(name),
        Place::Member(object, key) => get_member(object, key, runtime),
    }
}

/// Write through an assignable place. Scope writes walk the chain to the
/// owning scope.
pub(crate) fn write_place(place: &Place, value: Value) -> Result<(), EngineError> {
    match place {
        Place::Binding(scope, name) => scope.assign(name, value),
        Place::Member(object, key) => set_member(object, key, value),
    }
}
