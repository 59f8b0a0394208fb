#![forbid(unsafe_code)]

//! Error containment: turn "a unit crashed" into a recoverable event.
//!
//! [`catch_errors_with`] wraps a child so that any error reaching its sink
//! first destroys the child, then hands the error to a recovery handler
//! along with the last delivered props and the outer error sink. A failing
//! handler forwards its own error outward unchanged. [`catch_errors`] is
//! the handler-less form: destroy first, then pass the error through.
//!
//! The child is constructed lazily on the next update, so a contained
//! failure followed by further updates restarts the child from scratch.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{trace, warn};

use wisp_core::error::WispError;

use crate::wisp::{ErrorSink, RunningWisp, Sinks, TameWisp};

/// A recovery handler: receives the error, the last delivered props, and
/// the outer error sink. Returning `Err` forwards that error outward.
pub type ErrorHandler<P> = dyn Fn(WispError, Option<&P>, &ErrorSink) -> Result<(), WispError>;

/// Contain child errors: destroy the child, then pass the error through.
pub fn catch_errors<P: Clone + 'static>(child: impl Into<TameWisp<P>>) -> TameWisp<P> {
    catch_errors_with(child, |error, _props, on_error| {
        on_error(error);
        Ok(())
    })
}

/// Contain child errors with a recovery handler.
pub fn catch_errors_with<P: Clone + 'static>(
    child: impl Into<TameWisp<P>>,
    handler: impl Fn(WispError, Option<&P>, &ErrorSink) -> Result<(), WispError> + 'static,
) -> TameWisp<P> {
    let child: TameWisp<P> = child.into();
    let handler: Rc<ErrorHandler<P>> = Rc::new(handler);

    TameWisp::from_parts(
        move |sinks: Sinks| {
            let destroyed = Rc::new(Cell::new(false));
            let instance: Rc<RefCell<Option<RunningWisp<P>>>> = Rc::new(RefCell::new(None));
            let props_cache: Rc<RefCell<Option<P>>> = Rc::new(RefCell::new(None));

            let contain: ErrorSink = {
                let handler = Rc::clone(&handler);
                let instance = Rc::clone(&instance);
                let props_cache = Rc::clone(&props_cache);
                let outer = Rc::clone(&sinks.on_error);
                Rc::new(move |error: WispError| {
                    // Destroy-first: the failing child never sees another
                    // update before the handler runs.
                    if let Some(running) = instance.borrow_mut().take() {
                        running.destroy();
                    }
                    trace!(target: "wisp::catch", error = %error, "containing error");
                    let last = props_cache.borrow().clone();
                    if let Err(secondary) = handler(error, last.as_ref(), &outer) {
                        warn!(target: "wisp::catch", error = %secondary, "handler failed");
                        outer(secondary);
                    }
                })
            };

            let update = {
                let child = child.clone();
                let destroyed = Rc::clone(&destroyed);
                let instance = Rc::clone(&instance);
                let props_cache = Rc::clone(&props_cache);
                let on_output = Rc::clone(&sinks.on_output);
                move |props: P| {
                    if destroyed.get() {
                        return;
                    }
                    *props_cache.borrow_mut() = Some(props.clone());
                    let running = {
                        let existing = instance.borrow().clone();
                        match existing {
                            Some(running) => running,
                            None => {
                                let running = child.start(Sinks {
                                    on_error: Rc::clone(&contain),
                                    on_output: Rc::clone(&on_output),
                                });
                                *instance.borrow_mut() = Some(running.clone());
                                running
                            }
                        }
                    };
                    running.update(props);
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
        None,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wisp_core::error::MessageError;
    use wisp_core::testing::EventLog;

    use crate::wisp::{Startup, UpdateFlow, Wisp, WispInput, WispInstance};

    fn failing_child(log: &EventLog) -> Wisp<u32> {
        let log = log.clone();
        Wisp::new(move |input: WispInput<u32>| {
            let log = log.clone();
            struct Failing {
                input: WispInput<u32>,
                log: EventLog,
            }
            impl WispInstance<u32> for Failing {
                fn update(&mut self, props: u32) -> Result<UpdateFlow, WispError> {
                    self.log.record(format!("update {props}"));
                    self.input.on_error(MessageError::err("update error"));
                    Ok(UpdateFlow::Done)
                }
                fn destroy(&mut self) -> Result<(), WispError> {
                    self.log.record("destroy");
                    self.input.on_error(MessageError::err("destroy error"));
                    Ok(())
                }
            }
            Ok(Startup::instance(Failing { input, log }))
        })
    }

    #[test]
    fn destroys_then_reports() {
        let log = EventLog::new();
        let contained = catch_errors(failing_child(&log).tame());
        let instance = contained.start(Sinks::new(
            {
                let log = log.clone();
                move |e| log.record(format!("caught {e}"))
            },
            |_| {},
        ));

        instance.update(1);
        // Nesting depth varies between the sync and deferred teardown
        // paths; the event *set* is fixed.
        log.assert_unordered(&[
            "update 1",
            "destroy",
            "caught update error",
            "caught destroy error",
        ]);
    }

    #[test]
    fn handler_sees_error_and_last_props() {
        let log = EventLog::new();
        let child = Wisp::new(|_input: WispInput<u32>| {
            Ok(Startup::from_fn(|props: u32| {
                if props > 1 {
                    Err(MessageError::err("too big"))
                } else {
                    Ok(UpdateFlow::Done)
                }
            }))
        });

        let contained = catch_errors_with(child.tame(), {
            let log = log.clone();
            move |error, props, _on_error| {
                log.record(format!("handled {error} at {props:?}"));
                Ok(())
            }
        });
        let instance = contained.start(Sinks::new(
            {
                let log = log.clone();
                move |e| log.record(format!("outer {e}"))
            },
            |_| {},
        ));

        instance.update(1);
        instance.update(2);
        // Handled, not forwarded.
        log.assert(&["handled too big at Some(2)"]);
        instance.destroy();
    }

    #[test]
    fn failing_handler_forwards_its_own_error() {
        let log = EventLog::new();
        let child = Wisp::<u32>::new(|_input| Err(MessageError::err("original")));

        let contained = catch_errors_with(child.tame(), |_error, _props, _on_error| {
            Err(MessageError::err("secondary"))
        });
        let instance = contained.start(Sinks::new(
            {
                let log = log.clone();
                move |e| log.record(format!("outer {e}"))
            },
            |_| {},
        ));

        instance.update(1);
        // Exactly one outward error: the handler's, not the child's.
        log.assert(&["outer secondary"]);
        instance.destroy();
    }

    #[test]
    fn child_restarts_after_containment() {
        let log = EventLog::new();
        let child = Wisp::new({
            let log = log.clone();
            move |_input: WispInput<u32>| {
                log.record("create");
                Ok(Startup::from_fn(|props: u32| {
                    if props == 0 {
                        Err(MessageError::err("zero"))
                    } else {
                        Ok(UpdateFlow::Done)
                    }
                }))
            }
        });

        let contained = catch_errors_with(child.tame(), |_e, _p, _sink| Ok(()));
        let instance = contained.start(Sinks::silent());

        instance.update(1);
        log.assert(&["create"]);
        instance.update(0);
        log.assert(&[]);
        // A fresh child is constructed on the next update.
        instance.update(2);
        log.assert(&["create"]);
        instance.destroy();
    }

    #[test]
    fn no_updates_after_destroy() {
        let log = EventLog::new();
        let child = Wisp::new({
            let log = log.clone();
            move |_input: WispInput<u32>| {
                log.record("create");
                Ok(Startup::from_fn(|_props| Ok(UpdateFlow::Done)))
            }
        });

        let contained = catch_errors(child.tame());
        let instance = contained.start(Sinks::silent());
        instance.update(1);
        instance.destroy();
        instance.update(2);
        log.assert(&["create"]);
    }
}
