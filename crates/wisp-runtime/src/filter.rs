#![forbid(unsafe_code)]

//! Prop-mapping wrapper: one child behind a pure mapping.
//!
//! [`filter_props`] maps the outer props to either inner props or an
//! absent marker. The child exists exactly while the mapped props are
//! present: instantiated on the first `Some`, updated only when the mapped
//! value changes shallowly, destroyed the moment the mapping yields `None`,
//! and re-instantiated fresh if it later yields `Some` again.
//!
//! A failed mapping is *not* an absence: the error is routed and the
//! existing child (if any) is left alone, because the mapped value is
//! unknown rather than deliberately absent.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use wisp_core::error::WispError;
use wisp_core::shallow::ShallowEq;

use crate::wisp::{RunningWisp, Sinks, TameWisp};

/// Wrap `child` behind a props mapping. The child's default output is
/// preserved on the wrapper.
pub fn filter_props<P, Q>(
    child: impl Into<TameWisp<Q>>,
    filter: impl Fn(&P) -> Result<Option<Q>, WispError> + 'static,
) -> TameWisp<P>
where
    P: Clone + 'static,
    Q: Clone + ShallowEq + 'static,
{
    let child: TameWisp<Q> = child.into();
    let default_output = child.default_output().cloned();
    let filter = Rc::new(filter);

    TameWisp::from_parts(
        move |sinks: Sinks| {
            let destroyed = Rc::new(Cell::new(false));
            let instance: Rc<RefCell<Option<RunningWisp<Q>>>> = Rc::new(RefCell::new(None));
            let props_cache: Rc<RefCell<Option<Q>>> = Rc::new(RefCell::new(None));

            let update = {
                let child = child.clone();
                let filter = Rc::clone(&filter);
                let destroyed = Rc::clone(&destroyed);
                let instance = Rc::clone(&instance);
                let props_cache = Rc::clone(&props_cache);
                let sinks = sinks.clone();
                move |props: P| {
                    let mapped = match filter(&props) {
                        Ok(mapped) => mapped,
                        Err(error) => {
                            sinks.emit_error(error);
                            return;
                        }
                    };
                    if destroyed.get() {
                        return;
                    }
                    let dirty = !slot_shallow_eq(&mapped, &props_cache.borrow());
                    *props_cache.borrow_mut() = mapped.clone();

                    match mapped {
                        Some(inner) => {
                            let running = {
                                let existing = instance.borrow().clone();
                                match existing {
                                    Some(running) => running,
                                    None => {
                                        trace!(target: "wisp::filter", "starting child");
                                        let running = child.start(sinks.clone());
                                        *instance.borrow_mut() = Some(running.clone());
                                        running
                                    }
                                }
                            };
                            if destroyed.get() {
                                return;
                            }
                            if dirty {
                                running.update(inner);
                            }
                        }
                        None => {
                            if let Some(running) = instance.borrow_mut().take() {
                                trace!(target: "wisp::filter", "stopping child");
                                running.destroy();
                            }
                        }
                    }
                }
            };

            let destroy = move || {
                destroyed.set(true);
                if let Some(running) = instance.borrow_mut().take() {
                    running.destroy();
                }
            };

            RunningWisp::new(update, destroy)
        },
        default_output,
    )
}

fn slot_shallow_eq<Q: ShallowEq>(a: &Option<Q>, b: &Option<Q>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.shallow_eq(b),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wisp_core::error::MessageError;
    use wisp_core::output::Output;
    use wisp_core::testing::EventLog;

    use crate::wisp::{Startup, UpdateFlow, Wisp, WispInput, WispInstance};

    #[derive(Clone, Debug)]
    struct Inner {
        y: u32,
    }
    wisp_core::impl_shallow_eq!(Inner { y });

    fn tracked_child(log: &EventLog) -> Wisp<Inner> {
        let log = log.clone();
        Wisp::new(move |_input: WispInput<Inner>| {
            log.record("create");
            let log = log.clone();
            struct Tracked {
                log: EventLog,
            }
            impl WispInstance<Inner> for Tracked {
                fn update(&mut self, props: Inner) -> Result<UpdateFlow, WispError> {
                    self.log.record(format!("update {}", props.y));
                    Ok(UpdateFlow::Done)
                }
                fn destroy(&mut self) -> Result<(), WispError> {
                    self.log.record("destroy");
                    Ok(())
                }
            }
            Ok(Startup::instance(Tracked { log }))
        })
    }

    #[test]
    fn child_lives_while_mapped_props_exist() {
        let log = EventLog::new();
        let filtered = filter_props(tracked_child(&log).tame(), |props: &u32| {
            Ok((*props > 2).then(|| Inner { y: *props }))
        });
        let instance = filtered.start(Sinks::silent());

        instance.update(0);
        instance.update(4);
        instance.update(5);
        instance.update(1);
        instance.update(6);
        instance.destroy();
        log.assert(&[
            "create",
            "update 4",
            "update 5",
            "destroy",
            "create",
            "update 6",
            "destroy",
        ]);
    }

    #[test]
    fn unchanged_mapped_props_skip_the_child() {
        let log = EventLog::new();
        let filtered = filter_props(tracked_child(&log).tame(), |props: &u32| {
            Ok(Some(Inner { y: *props / 10 }))
        });
        let instance = filtered.start(Sinks::silent());

        instance.update(10);
        log.assert(&["create", "update 1"]);
        // Maps to the same inner value: not delivered.
        instance.update(11);
        log.assert(&[]);
        instance.update(20);
        log.assert(&["update 2"]);
        instance.destroy();
        log.assert(&["destroy"]);
    }

    #[test]
    fn failed_mapping_leaves_the_child_alone() {
        let log = EventLog::new();
        let errors = EventLog::new();
        let filtered = filter_props(tracked_child(&log).tame(), |props: &u32| {
            if *props == 13 {
                Err(MessageError::err("unlucky"))
            } else {
                Ok(Some(Inner { y: *props }))
            }
        });
        let instance = filtered.start(Sinks::new(
            {
                let errors = errors.clone();
                move |e| errors.record(format!("error {e}"))
            },
            |_| {},
        ));

        instance.update(1);
        log.assert(&["create", "update 1"]);

        instance.update(13);
        errors.assert(&["error unlucky"]);
        // The child survives an unknown mapping.
        log.assert(&[]);

        instance.update(2);
        log.assert(&["update 2"]);
        instance.destroy();
        log.assert(&["destroy"]);
    }

    #[test]
    fn preserves_child_default_output() {
        let marker = Output::new(9u32);
        let child = Wisp::new(|_input: WispInput<Inner>| {
            Ok(Startup::from_fn(|_props| Ok(UpdateFlow::Done)))
        })
        .with_default_output(marker.clone())
        .tame();

        let filtered = filter_props(child, |props: &u32| Ok(Some(Inner { y: *props })));
        assert!(Output::same(filtered.default_output().unwrap(), &marker));
    }

    #[test]
    fn destroy_is_idempotent() {
        let log = EventLog::new();
        let filtered = filter_props(tracked_child(&log).tame(), |props: &u32| {
            Ok(Some(Inner { y: *props }))
        });
        let instance = filtered.start(Sinks::silent());
        instance.update(1);
        instance.destroy();
        instance.destroy();
        log.assert(&["create", "update 1", "destroy"]);
        // Updates after destroy are inert.
        instance.update(2);
        log.assert(&[]);
    }
}
