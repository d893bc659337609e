//! Evaluation frames.
//!
//! One frame records the in-progress evaluation of one AST node. The pair
//! `(index, sub_index)` encodes the resumption point inside the node:
//! `index` walks an ordered child list, `sub_index` the phases of handling
//! one child (0 = push it, 1 = consume its return, ...). `state` is the
//! frame's scratch area, written by its own step logic and by child returns.
//!
//! A child delivers its value exclusively through its `on_ret`: the parent
//! never reaches down, and every delivery bumps the parent's `sub_index` by
//! exactly one.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::parser::ast::{
    ExprRef, FunctionData, Meta, ProgramData, StatementType, StmtRef,
};
use crate::runner::ds::error::EngineError;
use crate::runner::ds::scope::Scope;
use crate::runner::ds::value::Value;

/// The AST node a frame is evaluating.
#[derive(Clone)]
pub enum AstNode {
    Program(Rc<ProgramData>),
    Statement(StmtRef),
    Expression(ExprRef),
    /// A called function's body, the unwind target for `return`.
    FunctionBody(Rc<FunctionData>),
}

impl AstNode {
    pub fn kind(&self) -> &'static str {
        match self {
            AstNode::Program(_) => "Program",
            AstNode::Statement(s) => s.kind(),
            AstNode::Expression(e) => e.kind(),
            AstNode::FunctionBody(_) => "FunctionBody",
        }
    }

    pub fn meta(&self) -> &Meta {
        match self {
            AstNode::Program(p) => &p.meta,
            AstNode::Statement(s) => crate::parser::ast::HasMeta::meta(s.as_ref()),
            AstNode::Expression(e) => crate::parser::ast::HasMeta::meta(e.as_ref()),
            AstNode::FunctionBody(f) => &f.meta,
        }
    }

    /// Loop nodes are the unwind targets for `break` and `continue`.
    pub fn is_loop(&self) -> bool {
        matches!(
            self,
            AstNode::Statement(s) if matches!(
                s.as_ref(),
                StatementType::ForStatement { .. }
                    | StatementType::WhileStatement { .. }
                    | StatementType::DoWhileStatement { .. }
            )
        )
    }
}

/// Hint telling a child frame how its node is being used by the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Target of `return` unwinding; its return is the call's value.
    Call,
    /// Produce a `{function, this}` pairing instead of a plain value.
    Callee,
    /// Produce the literal property name instead of resolving it.
    Key,
    /// Produce an assignable place instead of the current value.
    Left,
}

/// An assignable location.
#[derive(Clone)]
pub enum Place {
    Binding(Scope, String),
    Member(Value, String),
}

/// What a popped frame hands to its parent. Besides plain values, member
/// and identifier frames can return places (for assignment) or callee
/// pairings (so method calls keep their receiver).
#[derive(Clone)]
pub enum Ret {
    Val(Value),
    Place(Place),
    Callee { function: Value, this: Value },
}

impl Ret {
    pub fn into_value(self) -> Result<Value, EngineError> {
        match self {
            Ret::Val(v) => Ok(v),
            Ret::Place(_) => Err(EngineError::StateInvariant(
                "assignable place returned where a value was expected".to_string(),
            )),
            Ret::Callee { .. } => Err(EngineError::StateInvariant(
                "callee pairing returned where a value was expected".to_string(),
            )),
        }
    }
}

impl fmt::Display for Ret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ret::Val(v) => write!(f, "{}", v),
            Ret::Place(Place::Binding(_, name)) => write!(f, "<place {}>", name),
            Ret::Place(Place::Member(_, key)) => write!(f, "<place .{}>", key),
            Ret::Callee { function, .. } => write!(f, "<callee {}>", function),
        }
    }
}

/// Scratch slot: a delivered return, an accumulator list, or a scope the
/// frame allocated for its children.
pub enum Slot {
    Ret(Ret),
    Values(Vec<Value>),
    Scope(Scope),
}

/// Frame scratch. Single-child nodes use the plain `Ret` shape; multi-slot
/// nodes use the named map.
pub enum Scratch {
    Empty,
    Ret(Ret),
    Map(HashMap<&'static str, Slot>),
}

impl Scratch {
    pub fn is_empty(&self) -> bool {
        matches!(self, Scratch::Empty)
    }
}

/// How a frame's return value reaches its parent.
#[derive(Clone)]
pub enum OnRet {
    /// Ignore the value.
    Discard,
    /// `parent.state = value`.
    AsState,
    /// `parent.state[prop] = value`.
    AsStateProp(&'static str),
    /// Deliver outside the stack: the captured cell of a function call.
    Capture(Rc<RefCell<Option<Value>>>),
}

pub struct Frame {
    pub node: AstNode,
    pub scope: Scope,
    pub role: Option<Role>,
    /// Binding name hint, used to name otherwise-anonymous functions.
    pub name: Option<String>,
    pub index: usize,
    pub sub_index: usize,
    pub state: Scratch,
    pub on_ret: OnRet,
}

impl Frame {
    pub fn new(node: AstNode, scope: Scope, on_ret: OnRet) -> Self {
        Frame {
            node,
            scope,
            role: None,
            name: None,
            index: 0,
            sub_index: 0,
            state: Scratch::Empty,
            on_ret,
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    // -- scratch helpers ----------------------------------------------------

    /// Take the single delivered return (AsState shape).
    pub fn take_ret(&mut self) -> Option<Ret> {
        match std::mem::replace(&mut self.state, Scratch::Empty) {
            Scratch::Ret(r) => Some(r),
            other => {
                self.state = other;
                None
            }
        }
    }

    fn map_mut(&mut self) -> &mut HashMap<&'static str, Slot> {
        if !matches!(self.state, Scratch::Map(_)) {
            self.state = Scratch::Map(HashMap::new());
        }
        match &mut self.state {
            Scratch::Map(m) => m,
            _ => unreachable!(),
        }
    }

    pub fn put_slot_ret(&mut self, key: &'static str, ret: Ret) {
        self.map_mut().insert(key, Slot::Ret(ret));
    }

    /// Take a named delivered return (AsStateProp shape).
    pub fn take_slot_ret(&mut self, key: &'static str) -> Option<Ret> {
        match &mut self.state {
            Scratch::Map(m) => match m.remove(key) {
                Some(Slot::Ret(r)) => Some(r),
                Some(other) => {
                    m.insert(key, other);
                    None
                }
                None => None,
            },
            _ => None,
        }
    }

    pub fn push_slot_value(&mut self, key: &'static str, value: Value) {
        let map = self.map_mut();
        match map.get_mut(key) {
            Some(Slot::Values(items)) => items.push(value),
            _ => {
                map.insert(key, Slot::Values(vec![value]));
            }
        }
    }

    pub fn extend_slot_values(&mut self, key: &'static str, values: Vec<Value>) {
        let map = self.map_mut();
        match map.get_mut(key) {
            Some(Slot::Values(items)) => items.extend(values),
            _ => {
                map.insert(key, Slot::Values(values));
            }
        }
    }

    pub fn take_slot_values(&mut self, key: &'static str) -> Vec<Value> {
        match &mut self.state {
            Scratch::Map(m) => match m.remove(key) {
                Some(Slot::Values(items)) => items,
                Some(other) => {
                    m.insert(key, other);
                    Vec::new()
                }
                None => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    /// Clone a delivered plain value out of a named slot without removing it.
    pub fn peek_slot_val(&self, key: &'static str) -> Option<Value> {
        match &self.state {
            Scratch::Map(m) => match m.get(key) {
                Some(Slot::Ret(Ret::Val(v))) => Some(v.clone()),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn put_slot_scope(&mut self, key: &'static str, scope: Scope) {
        self.map_mut().insert(key, Slot::Scope(scope));
    }

    pub fn slot_scope(&self, key: &'static str) -> Option<Scope> {
        match &self.state {
            Scratch::Map(m) => match m.get(key) {
                Some(Slot::Scope(s)) => Some(s.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}
