//! Observable, abortable promise record.
//!
//! Unlike an opaque future, the settle state is a readable field so the
//! evaluator can poll an await without re-subscribing callbacks on every
//! step, and `abort()` lets a host cancel whatever is parked on it.
//! Settling is monotone: `Pending → Fulfilled | Rejected | Aborted`, and
//! the first settle wins.

use std::cell::RefCell;
use std::rc::Rc;

use crate::runner::ds::value::Value;

/// Externally visible settle state. `Aborted` is the rejected case whose
/// reason is the abort sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
    Aborted,
}

#[derive(Clone)]
pub(crate) enum Settled {
    Fulfilled(Value),
    Rejected(Value),
}

type Reaction = Box<dyn FnOnce(&Settled)>;

struct PromiseInner {
    state: Option<Settled>,
    reactions: Vec<Reaction>,
}

#[derive(Clone)]
pub struct ObservablePromise {
    inner: Rc<RefCell<PromiseInner>>,
}

impl ObservablePromise {
    pub fn pending() -> Self {
        ObservablePromise {
            inner: Rc::new(RefCell::new(PromiseInner {
                state: None,
                reactions: Vec::new(),
            })),
        }
    }

    pub fn fulfilled(value: Value) -> Self {
        let p = Self::pending();
        p.settle(Settled::Fulfilled(value));
        p
    }

    pub fn rejected(reason: Value) -> Self {
        let p = Self::pending();
        p.settle(Settled::Rejected(reason));
        p
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> PromiseState {
        match &self.inner.borrow().state {
            None => PromiseState::Pending,
            Some(Settled::Fulfilled(v)) => PromiseState::Fulfilled(v.clone()),
            Some(Settled::Rejected(Value::Abort)) => PromiseState::Aborted,
            Some(Settled::Rejected(reason)) => PromiseState::Rejected(reason.clone()),
        }
    }

    pub fn state_name(&self) -> &'static str {
        match &self.inner.borrow().state {
            None => "pending",
            Some(Settled::Fulfilled(_)) => "fulfilled",
            Some(Settled::Rejected(Value::Abort)) => "aborted",
            Some(Settled::Rejected(_)) => "rejected",
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().state.is_none()
    }

    /// Resolve with a value. A promise value is adopted: this promise
    /// settles the way the inner one does.
    pub fn resolve(&self, value: Value) {
        if let Value::Promise(other) = &value {
            if other.ptr_eq(self) {
                // Self-resolution can never settle; treat as programmer error.
                self.settle(Settled::Rejected(Value::String(
                    "promise resolved with itself".to_string(),
                )));
                return;
            }
            let target = self.clone();
            other.subscribe_settled(Box::new(move |settled| target.settle(settled.clone())));
            return;
        }
        self.settle(Settled::Fulfilled(value));
    }

    pub fn reject(&self, reason: Value) {
        self.settle(Settled::Rejected(reason));
    }

    /// Cancel. Rejects with the abort sentinel; a no-op on a settled
    /// promise.
    pub fn abort(&self) {
        self.settle(Settled::Rejected(Value::Abort));
    }

    /// Run `reaction` once this promise settles (immediately when already
    /// settled).
    pub(crate) fn subscribe_settled(&self, reaction: Reaction) {
        let settled = {
            let mut inner = self.inner.borrow_mut();
            match &inner.state {
                None => {
                    inner.reactions.push(reaction);
                    return;
                }
                Some(s) => s.clone(),
            }
        };
        reaction(&settled);
    }

    fn settle(&self, outcome: Settled) {
        let reactions = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_some() {
                return;
            }
            inner.state = Some(outcome.clone());
            std::mem::take(&mut inner.reactions)
        };
        for reaction in reactions {
            reaction(&outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_state_transitions_are_monotone() {
        let p = ObservablePromise::pending();
        assert_eq!(p.state(), PromiseState::Pending);
        p.resolve(Value::Number(1.0));
        assert_eq!(p.state(), PromiseState::Fulfilled(Value::Number(1.0)));
        p.reject(Value::String("late".to_string()));
        assert_eq!(p.state(), PromiseState::Fulfilled(Value::Number(1.0)));
    }

    #[test]
    fn test_abort_is_terminal_and_idempotent() {
        let p = ObservablePromise::pending();
        p.abort();
        assert_eq!(p.state(), PromiseState::Aborted);
        p.abort();
        p.resolve(Value::Number(2.0));
        assert_eq!(p.state(), PromiseState::Aborted);
    }

    #[test]
    fn test_abort_after_settle_is_noop() {
        let p = ObservablePromise::fulfilled(Value::Boolean(true));
        p.abort();
        assert_eq!(p.state(), PromiseState::Fulfilled(Value::Boolean(true)));
    }

    #[test]
    fn test_subscribe_after_settle_fires_immediately() {
        let p = ObservablePromise::fulfilled(Value::Number(7.0));
        let hits = Rc::new(Cell::new(0));
        let hits2 = hits.clone();
        p.subscribe_settled(Box::new(move |settled| {
            if let Settled::Fulfilled(Value::Number(n)) = settled {
                assert_eq!(*n, 7.0);
            } else {
                panic!("expected fulfilled");
            }
            hits2.set(hits2.get() + 1);
        }));
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_adopts_inner_promise() {
        let outer = ObservablePromise::pending();
        let inner = ObservablePromise::pending();
        outer.resolve(Value::Promise(inner.clone()));
        assert!(outer.is_pending());
        inner.resolve(Value::String("done".to_string()));
        assert_eq!(
            outer.state(),
            PromiseState::Fulfilled(Value::String("done".to_string()))
        );
    }
}
