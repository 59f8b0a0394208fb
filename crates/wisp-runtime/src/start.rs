#![forbid(unsafe_code)]

//! The root driver: starting a composed unit and pumping it from a store.
//!
//! [`start`] assembles the standard top-of-tree composition — error
//! containment over output reflection over the guard — and hands back the
//! running instance. [`attach`] goes one step further and drives that
//! instance from an external state container: every change notification
//! re-delivers a fresh [`StoreProps`] snapshot, and the returned teardown
//! closure unsubscribes and destroys.
//!
//! Errors that reach the root with no sink wired are dropped on purpose:
//! resilience over crash-on-error. Wire `Sinks::new` with a reporter to
//! surface them.

use std::rc::Rc;

use tracing::debug;

use wisp_core::output::Output;
use wisp_core::shallow::ShallowEq;

use crate::catch::catch_errors;
use crate::reflect::{Reflective, reflect_output};
use crate::wisp::{RunningWisp, Sinks, TameWisp};

/// Start a unit under the standard root composition
/// (containment ∘ reflection ∘ guard).
pub fn start<P>(wisp: impl Into<TameWisp<P>>, sinks: Sinks) -> RunningWisp<P>
where
    P: Clone + Reflective + 'static,
{
    catch_errors(reflect_output(wisp)).start(sinks)
}

// ─── Store collaborator ──────────────────────────────────────────────────────

/// The external state container contract. Consumed, never implemented by
/// the runtime; any redux-shaped store fits.
pub trait Store {
    /// The state snapshot type.
    type State;
    /// The action type accepted by `dispatch`.
    type Action;

    /// Current state snapshot.
    fn get_state(&self) -> Self::State;

    /// Dispatch an action.
    fn dispatch(&self, action: Self::Action);

    /// Subscribe to change notifications; returns the unsubscribe closure.
    fn subscribe(&self, callback: Box<dyn Fn()>) -> Box<dyn FnOnce()>;
}

/// A shareable dispatch handle, compared by identity in props.
pub type DispatchFn<A> = Rc<dyn Fn(A)>;

/// The props snapshot a store-driven tree receives: current state, a
/// dispatch handle, and the reflected-output slot.
pub struct StoreProps<S, A> {
    /// State snapshot at notification time.
    pub state: S,
    /// Dispatch handle into the store.
    pub dispatch: DispatchFn<A>,
    /// The tree's own last output (filled in by reflection).
    pub output: Option<Output>,
}

impl<S: Clone, A> Clone for StoreProps<S, A> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            dispatch: Rc::clone(&self.dispatch),
            output: self.output.clone(),
        }
    }
}

impl<S: ShallowEq, A> ShallowEq for StoreProps<S, A> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.state.shallow_eq(&other.state)
            && Rc::ptr_eq(&self.dispatch, &other.dispatch)
            && Output::same_slot(&self.output, &other.output)
    }
}

impl<S: Clone, A> Reflective for StoreProps<S, A> {
    fn with_output(&self, output: Option<Output>) -> Self {
        Self {
            state: self.state.clone(),
            dispatch: Rc::clone(&self.dispatch),
            output,
        }
    }
}

/// Start a unit and drive it from `store` until the returned teardown
/// closure runs.
pub fn attach<St>(
    store: Rc<St>,
    wisp: impl Into<TameWisp<StoreProps<St::State, St::Action>>>,
    sinks: Sinks,
) -> impl FnOnce()
where
    St: Store + 'static,
    St::State: Clone + 'static,
    St::Action: 'static,
{
    let instance = start(wisp, sinks);
    let dispatch: DispatchFn<St::Action> = Rc::new({
        let store = Rc::clone(&store);
        move |action| store.dispatch(action)
    });

    let push: Rc<dyn Fn()> = Rc::new({
        let instance = instance.clone();
        let store = Rc::clone(&store);
        move || {
            instance.update(StoreProps {
                state: store.get_state(),
                dispatch: Rc::clone(&dispatch),
                output: None,
            });
        }
    });

    debug!(target: "wisp::start", "attaching to store");
    push();
    let unsubscribe = store.subscribe(Box::new({
        let push = Rc::clone(&push);
        move || push()
    }));

    move || {
        debug!(target: "wisp::start", "detaching from store");
        unsubscribe();
        instance.destroy();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
