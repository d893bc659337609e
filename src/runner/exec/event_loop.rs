//! Timer and microtask queues shared by every execution of a runtime.
//!
//! All scheduling is single-threaded: tasks are boxed closures run by
//! whichever `wait()` call is currently pumping. Tasks must never be run
//! while the queue is borrowed, so the accessors hand out one task at a
//! time.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::runner::ds::error::EngineError;

pub type LoopTask = Box<dyn FnOnce() -> Result<(), EngineError>>;

struct TimerEntry {
    due: Instant,
    seq: u64,
    task: LoopTask,
}

// Earliest deadline first; `seq` breaks ties in scheduling order.
impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}
impl Eq for TimerEntry {}
impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct LoopState {
    microtasks: VecDeque<LoopTask>,
    timers: BinaryHeap<TimerEntry>,
    seq: u64,
}

#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    pub fn new() -> Self {
        EventLoop {
            inner: Rc::new(RefCell::new(LoopState {
                microtasks: VecDeque::new(),
                timers: BinaryHeap::new(),
                seq: 0,
            })),
        }
    }

    pub fn enqueue_microtask(&self, task: LoopTask) {
        self.inner.borrow_mut().microtasks.push_back(task);
    }

    /// Next queued microtask; caller runs it with the queue released.
    pub fn pop_microtask(&self) -> Option<LoopTask> {
        self.inner.borrow_mut().microtasks.pop_front()
    }

    pub fn schedule_timer(&self, delay: Duration, task: LoopTask) -> u64 {
        let mut state = self.inner.borrow_mut();
        state.seq += 1;
        let id = state.seq;
        state.timers.push(TimerEntry {
            due: Instant::now() + delay,
            seq: id,
            task,
        });
        id
    }

    pub fn next_timer_due(&self) -> Option<Instant> {
        self.inner.borrow().timers.peek().map(|t| t.due)
    }

    /// Earliest timer at or before `now`, if any; caller runs it with the
    /// queue released.
    pub fn pop_due_timer(&self, now: Instant) -> Option<LoopTask> {
        let mut state = self.inner.borrow_mut();
        if state.timers.peek().map(|t| t.due <= now).unwrap_or(false) {
            state.timers.pop().map(|t| t.task)
        } else {
            None
        }
    }

    pub fn has_pending_work(&self) -> bool {
        let state = self.inner.borrow();
        !state.microtasks.is_empty() || !state.timers.is_empty()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_microtasks_are_fifo() {
        let ev = EventLoop::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            ev.enqueue_microtask(Box::new(move || {
                order.borrow_mut().push(i);
                Ok(())
            }));
        }
        while let Some(task) = ev.pop_microtask() {
            task().unwrap();
        }
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_timers_fire_in_deadline_order() {
        let ev = EventLoop::new();
        let fired = Rc::new(RefCell::new(Vec::new()));
        for (label, ms) in [("slow", 30u64), ("fast", 1u64)] {
            let fired = fired.clone();
            ev.schedule_timer(
                Duration::from_millis(ms),
                Box::new(move || {
                    fired.borrow_mut().push(label);
                    Ok(())
                }),
            );
        }
        let deadline = Instant::now() + Duration::from_millis(200);
        while fired.borrow().len() < 2 && Instant::now() < deadline {
            if let Some(task) = ev.pop_due_timer(Instant::now()) {
                task().unwrap();
            }
        }
        assert_eq!(*fired.borrow(), vec!["fast", "slow"]);
    }

    #[test]
    fn test_task_can_reschedule() {
        let ev = EventLoop::new();
        let hit = Rc::new(Cell::new(false));
        {
            let ev2 = ev.clone();
            let hit = hit.clone();
            ev.enqueue_microtask(Box::new(move || {
                ev2.enqueue_microtask(Box::new(move || {
                    hit.set(true);
                    Ok(())
                }));
                Ok(())
            }));
        }
        while let Some(task) = ev.pop_microtask() {
            task().unwrap();
        }
        assert!(hit.get());
    }
}
