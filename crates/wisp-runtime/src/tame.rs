#![forbid(unsafe_code)]

//! The runtime guard: hardening raw definitions.
//!
//! [`tame`] converts a [`Wisp`] into a [`TameWisp`] whose instances uphold
//! the safety contract every composition operator relies on:
//!
//! 1. Failed construction, update, or destruction routes to `on_error`;
//!    nothing escapes to the caller.
//! 2. A bare update closure is normalized into a full instance.
//! 3. Updates are serialized: while a [`UpdateFlow::Pending`] promise is
//!    unsettled, arriving snapshots only overwrite the cached props and mark
//!    the guard dirty. Exactly one further update runs after settlement —
//!    a collapsing dirty flag, not a queue.
//! 4. After destruction completes, error/output callbacks from the defunct
//!    instance are suppressed.
//! 5. `destroy()` runs to completion even when the inner destroy fails; the
//!    failure is still reported.
//! 6. Pending `next_props`/`wait_for` promises reject with the shutdown
//!    error on destroy.
//!
//! # Re-entrancy
//!
//! The guard state sits in an `Rc<RefCell<..>>` and no borrow is held while
//! user code runs. A destroy arriving while the instance's own `update` is
//! on the stack (exclusive borrows forbid nested teardown) engages
//! suppression immediately, rejects the waiters, and performs the inner
//! teardown as soon as the call returns; the observable event order matches
//! the synchronous path.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{trace, warn};

use wisp_core::error::WispError;
use wisp_core::output::Output;

use crate::wisp::{
    RunningWisp, Sinks, Startup, TameWisp, UpdateFlow, WaiterSet, Wisp, WispInput, WispInstance,
};

/// Harden a raw definition. `TameWisp` is a distinct type, so hardening is
/// idempotent and cannot nest.
pub fn tame<P: Clone + 'static>(wisp: Wisp<P>) -> TameWisp<P> {
    let Wisp {
        starter,
        default_output,
    } = wisp;
    TameWisp::from_parts(
        move |sinks| start_guarded(Rc::clone(&starter), sinks),
        default_output,
    )
}

type Starter<P> = Rc<dyn Fn(WispInput<P>) -> Result<Startup<P>, WispError>>;

struct Guard<P> {
    instance: Option<Box<dyn WispInstance<P>>>,
    props: Rc<RefCell<Option<P>>>,
    waiters: Rc<RefCell<WaiterSet<P>>>,
    sinks: Sinks,
    /// A snapshot arrived that the instance has not seen yet.
    dirty: bool,
    /// An update pass is in progress (possibly suspended on a promise).
    updating: bool,
    /// An instance method call is literally on the stack.
    in_call: bool,
    /// Destroy was requested mid-call; finish when the call returns.
    destroy_deferred: bool,
    /// Destruction has been initiated; suppress further callbacks.
    destroyed: bool,
}

fn start_guarded<P: Clone + 'static>(starter: Starter<P>, sinks: Sinks) -> RunningWisp<P> {
    let props = Rc::new(RefCell::new(None));
    let waiters = Rc::new(RefCell::new(WaiterSet::new()));
    let guard = Rc::new(RefCell::new(Guard {
        instance: None,
        props: Rc::clone(&props),
        waiters: Rc::clone(&waiters),
        sinks,
        dirty: true,
        updating: false,
        in_call: false,
        destroy_deferred: false,
        destroyed: false,
    }));

    let input = WispInput::new(
        Sinks::new(
            {
                let guard = Rc::clone(&guard);
                move |error| on_error(&guard, error)
            },
            {
                let guard = Rc::clone(&guard);
                move |data| on_output(&guard, data)
            },
        ),
        props,
        waiters,
    );

    trace!(target: "wisp::tame", "constructing instance");
    match starter(input) {
        Ok(startup) => guard.borrow_mut().instance = Some(startup.into_instance()),
        Err(error) => on_error(&guard, error),
    }

    RunningWisp::new(
        {
            let guard = Rc::clone(&guard);
            move |new_props| update(&guard, new_props)
        },
        move || destroy(&guard),
    )
}

/// Route an error outward (unless suppressed), then tear the unit down.
fn on_error<P: Clone + 'static>(guard: &Rc<RefCell<Guard<P>>>, error: WispError) {
    let sink = {
        let g = guard.borrow();
        (!g.destroyed).then(|| Rc::clone(&g.sinks.on_error))
    };
    if let Some(sink) = sink {
        warn!(target: "wisp::tame", error = %error, "routing error");
        sink(error);
    }
    destroy(guard);
}

/// Forward an output outward unless suppressed.
fn on_output<P: Clone + 'static>(guard: &Rc<RefCell<Guard<P>>>, data: Output) {
    let sink = {
        let g = guard.borrow();
        (!g.destroyed).then(|| Rc::clone(&g.sinks.on_output))
    };
    if let Some(sink) = sink {
        sink(data);
    }
}

fn update<P: Clone + 'static>(guard: &Rc<RefCell<Guard<P>>>, new_props: P) {
    let (props_cell, waiters) = {
        let mut g = guard.borrow_mut();
        g.dirty = true;
        (Rc::clone(&g.props), Rc::clone(&g.waiters))
    };
    *props_cell.borrow_mut() = Some(new_props.clone());
    WaiterSet::deliver(&waiters, &new_props);
    try_update(guard);
}

fn try_update<P: Clone + 'static>(guard: &Rc<RefCell<Guard<P>>>) {
    loop {
        // Claim one pass. Nothing runs between the checks and the claim.
        let (mut instance, props) = {
            let mut g = guard.borrow_mut();
            if g.updating || !g.dirty || g.destroyed {
                return;
            }
            let Some(instance) = g.instance.take() else {
                return;
            };
            let Some(props) = g.props.borrow().clone() else {
                g.instance = Some(instance);
                return;
            };
            g.dirty = false;
            g.updating = true;
            g.in_call = true;
            (instance, props)
        };

        let result = instance.update(props);

        let deferred = {
            let mut g = guard.borrow_mut();
            g.in_call = false;
            std::mem::take(&mut g.destroy_deferred)
        };
        if deferred {
            finish_destroy(guard, instance);
        } else {
            guard.borrow_mut().instance = Some(instance);
        }

        match result {
            Ok(UpdateFlow::Done) => {
                guard.borrow_mut().updating = false;
                // Loop: a snapshot may have arrived during the call.
            }
            Ok(UpdateFlow::Pending(promise)) => {
                let guard = Rc::clone(guard);
                promise.then(move |settled| match settled {
                    Ok(()) => {
                        guard.borrow_mut().updating = false;
                        try_update(&guard);
                    }
                    Err(error) => on_error(&guard, error),
                });
                return;
            }
            Err(error) => {
                on_error(guard, error);
                // The instance is gone; the next claim bails out.
            }
        }
    }
}

fn destroy<P: Clone + 'static>(guard: &Rc<RefCell<Guard<P>>>) {
    let claimed = {
        let mut g = guard.borrow_mut();
        if g.destroyed {
            return;
        }
        if g.in_call {
            // The instance's own update is on the stack. Engage
            // suppression now, finish the teardown when it returns.
            g.destroyed = true;
            g.destroy_deferred = true;
            let waiters = Rc::clone(&g.waiters);
            drop(g);
            WaiterSet::close(&waiters);
            return;
        }
        let Some(instance) = g.instance.take() else {
            // Never started (or construction failed): nothing to do.
            return;
        };
        let waiters = Rc::clone(&g.waiters);
        drop(g);
        WaiterSet::close(&waiters);
        instance
    };
    finish_destroy(guard, claimed);
}

fn finish_destroy<P: Clone + 'static>(
    guard: &Rc<RefCell<Guard<P>>>,
    mut instance: Box<dyn WispInstance<P>>,
) {
    trace!(target: "wisp::tame", "destroying instance");
    // Suppression starts only once the teardown has completed: callbacks
    // raised by the teardown itself still forward.
    guard.borrow_mut().destroyed = false;
    if let Err(error) = instance.destroy() {
        // Destruction failures are reported, but the unit still counts as
        // destroyed; destruction is never retried.
        warn!(target: "wisp::tame", error = %error, "destroy failed");
        on_error(guard, error);
    }
    guard.borrow_mut().destroyed = true;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
