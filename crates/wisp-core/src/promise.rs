#![forbid(unsafe_code)]

//! Single-threaded one-shot promises.
//!
//! [`Promise<T>`] is the cooperative "awaitable" of the runtime: a unit's
//! update may hand one back to signal deferred completion, and the guard's
//! `next_props`/`wait_for` capabilities are delivered through them. The
//! design is deliberately tiny:
//!
//! - One settlement, ever. [`Settle<T>`] is consumed by `resolve`/`reject`,
//!   so double settlement is unrepresentable.
//! - Callbacks registered after settlement fire immediately.
//! - Callbacks run synchronously on the settling turn, after all internal
//!   borrows are dropped, so a callback may freely re-enter the promise or
//!   the runtime that owns it.
//!
//! # Invariants
//!
//! 1. Every registered callback runs exactly once.
//! 2. Callbacks observe the settled value in registration order.
//! 3. No `RefCell` borrow is held while a callback runs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::WispError;

type Callback<T> = Box<dyn FnOnce(Result<T, WispError>)>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    Settled(Result<T, WispError>),
}

/// A one-shot, single-threaded promise.
///
/// Cloning a `Promise` creates a new handle to the same settlement.
pub struct Promise<T> {
    state: Rc<RefCell<State<T>>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            state: Rc::clone(&self.state),
        }
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// Create an unsettled promise and the handle that settles it.
    #[must_use]
    pub fn pending() -> (Self, Settle<T>) {
        let state = Rc::new(RefCell::new(State::Pending(Vec::new())));
        (
            Self {
                state: Rc::clone(&state),
            },
            Settle { state },
        )
    }

    /// A promise already resolved with `value`.
    #[must_use]
    pub fn resolved(value: T) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Settled(Ok(value)))),
        }
    }

    /// A promise already rejected with `error`.
    #[must_use]
    pub fn rejected(error: WispError) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Settled(Err(error)))),
        }
    }

    /// Whether the promise has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(*self.state.borrow(), State::Settled(_))
    }

    /// Run `callback` with the settlement.
    ///
    /// Fires immediately when already settled, otherwise on the settling
    /// turn. Each caller gets its own clone of the value.
    pub fn then(&self, callback: impl FnOnce(Result<T, WispError>) + 'static) {
        let settled = match &*self.state.borrow() {
            State::Settled(result) => Some(result.clone()),
            State::Pending(_) => None,
        };
        match settled {
            Some(result) => callback(result),
            None => {
                if let State::Pending(callbacks) = &mut *self.state.borrow_mut() {
                    callbacks.push(Box::new(callback));
                }
            }
        }
    }
}

/// The write half of a [`Promise`]. Consumed on settlement.
pub struct Settle<T> {
    state: Rc<RefCell<State<T>>>,
}

impl<T: Clone + 'static> Settle<T> {
    /// Resolve the promise with `value`, running all pending callbacks.
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    /// Reject the promise with `error`, running all pending callbacks.
    pub fn reject(self, error: WispError) {
        self.settle(Err(error));
    }

    fn settle(self, result: Result<T, WispError>) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            match std::mem::replace(&mut *state, State::Settled(result.clone())) {
                State::Pending(callbacks) => callbacks,
                // A Settle only exists for a pending promise; the consuming
                // signatures make a second settlement unreachable.
                State::Settled(prior) => {
                    *state = State::Settled(prior);
                    Vec::new()
                }
            }
        };
        for callback in callbacks {
            callback(result.clone());
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
