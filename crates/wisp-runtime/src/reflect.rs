#![forbid(unsafe_code)]

//! Output reflection: a unit that sees its own last output.
//!
//! [`reflect_output`] wraps a child so every reported output is merged back
//! into the child's *own* next props through the [`Reflective`] trait,
//! enabling self-referential feedback (react to what you just reported).
//!
//! The operator runs a dirty/in-progress loop: an output change arriving
//! while an update is already running for this unit is deferred and
//! retried until the unit is no longer dirty. Outputs reported during
//! construction are folded into the first update; outputs reported during
//! destruction are forwarded outward but trigger no further update.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use wisp_core::output::Output;

use crate::wisp::{RunningWisp, Sinks, TameWisp};

/// Props that carry a slot for the owning unit's own last output.
pub trait Reflective {
    /// A copy of `self` with the output slot replaced.
    #[must_use]
    fn with_output(&self, output: Option<Output>) -> Self;
}

struct ReflectState<P> {
    instance: Option<RunningWisp<P>>,
    output: Option<Output>,
    props_cache: Option<P>,
    dirty: bool,
    updating: bool,
}

/// Wrap `child` so its own reported output feeds back into its props.
pub fn reflect_output<P>(child: impl Into<TameWisp<P>>) -> TameWisp<P>
where
    P: Clone + Reflective + 'static,
{
    let child: TameWisp<P> = child.into();

    TameWisp::from_parts(
        move |sinks: Sinks| {
            let state = Rc::new(RefCell::new(ReflectState::<P> {
                instance: None,
                output: None,
                props_cache: None,
                dirty: true,
                updating: false,
            }));

            let child_sinks = Sinks {
                on_error: Rc::clone(&sinks.on_error),
                on_output: {
                    let state = Rc::clone(&state);
                    let on_output = Rc::clone(&sinks.on_output);
                    Rc::new(move |data: Output| {
                        let changed = {
                            let mut s = state.borrow_mut();
                            let changed = !s
                                .output
                                .as_ref()
                                .is_some_and(|prev| Output::same(prev, &data));
                            if changed {
                                s.output = Some(data.clone());
                                s.dirty = true;
                            }
                            changed
                        };
                        if changed {
                            on_output(data);
                            try_update(&state);
                        }
                    })
                },
            };

            let update = {
                let child = child.clone();
                let state = Rc::clone(&state);
                move |props: P| {
                    {
                        let mut s = state.borrow_mut();
                        s.props_cache = Some(props);
                        s.dirty = true;
                    }
                    let missing = state.borrow().instance.is_none();
                    if missing {
                        trace!(target: "wisp::reflect", "starting child");
                        // Construction may already report output; the
                        // in-progress flags fold it into the first update.
                        let running = child.start(child_sinks.clone());
                        state.borrow_mut().instance = Some(running);
                    }
                    try_update(&state);
                }
            };

            let destroy = move || {
                let taken = state.borrow_mut().instance.take();
                if let Some(running) = taken {
                    running.destroy();
                }
            };

            RunningWisp::new(update, destroy)
        },
        None,
    )
}

/// Run the child while dirty and not already updating. Re-entrant output
/// changes set the dirty flag and are picked up by the loop.
fn try_update<P: Clone + Reflective + 'static>(state: &Rc<RefCell<ReflectState<P>>>) {
    loop {
        let (running, merged) = {
            let mut s = state.borrow_mut();
            if s.updating || !s.dirty {
                return;
            }
            let Some(running) = s.instance.clone() else {
                return;
            };
            let Some(props) = s.props_cache.clone() else {
                return;
            };
            s.dirty = false;
            s.updating = true;
            (running, props.with_output(s.output.clone()))
        };
        running.update(merged);
        state.borrow_mut().updating = false;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
