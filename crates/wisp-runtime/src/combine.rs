#![forbid(unsafe_code)]

//! Fan-out composition: a fixed set of children behind one unit.
//!
//! [`combine`] takes an ordered mapping from id to definition. Every child
//! receives the same props, shares the parent's error sink, and contributes
//! one slot to an aggregate output map. The aggregate is copy-on-write: a
//! fresh snapshot is emitted whenever one child's output identity changes,
//! and an emitted snapshot is never touched again.
//!
//! Seeding policy: the aggregate starts out holding every child's default
//! output, but seeding alone never emits — the first aggregate emission
//! happens on the first actual child report, which then carries the seeded
//! values alongside it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::trace;

use wisp_core::ordered_map::OrderedMap;
use wisp_core::output::{Output, OutputMap};

use crate::wisp::{OutputSink, RunningWisp, Sinks, TameWisp};

/// Combine children into one unit. Children are updated in definition
/// order and the aggregate output map lists ids in the same order.
pub fn combine<P: Clone + 'static>(children: Vec<(&str, TameWisp<P>)>) -> TameWisp<P> {
    let defs: Rc<OrderedMap<String, TameWisp<P>>> = Rc::new(
        children
            .into_iter()
            .map(|(id, def)| (id.to_string(), def))
            .collect(),
    );

    TameWisp::from_parts(
        move |sinks: Sinks| {
            let destroyed = Rc::new(Cell::new(false));
            let outputs: Rc<RefCell<OutputMap>> = Rc::new(RefCell::new(
                defs.iter()
                    .map(|(id, def)| (id.clone(), def.default_output().cloned()))
                    .collect(),
            ));
            let instances: Rc<RefCell<OrderedMap<String, RunningWisp<P>>>> =
                Rc::new(RefCell::new(OrderedMap::new()));

            for (id, def) in defs.iter() {
                let child = def.start(Sinks {
                    on_error: Rc::clone(&sinks.on_error),
                    on_output: child_output_sink(id.clone(), &outputs, &sinks.on_output),
                });
                instances.borrow_mut().insert(id.clone(), child);
                if destroyed.get() {
                    break;
                }
            }
            trace!(target: "wisp::combine", children = defs.len(), "started");

            let update = {
                let instances = Rc::clone(&instances);
                let destroyed = Rc::clone(&destroyed);
                move |props: P| {
                    let ids: Vec<String> = instances.borrow().keys().cloned().collect();
                    for id in ids {
                        let child = instances.borrow().get(&id).cloned();
                        if let Some(child) = child {
                            child.update(props.clone());
                        }
                        // A callback chain may have torn the whole
                        // composite down; stop without touching the rest.
                        if destroyed.get() {
                            return;
                        }
                    }
                }
            };

            let destroy = move || {
                destroyed.set(true);
                let drained: Vec<RunningWisp<P>> = {
                    let mut map = instances.borrow_mut();
                    std::mem::take(&mut *map).into_entries().map(|(_, v)| v).collect()
                };
                for child in drained {
                    child.destroy();
                }
            };

            RunningWisp::new(update, destroy)
        },
        None,
    )
}

/// The per-child output sink: update the aggregate slot and emit a fresh
/// snapshot when the identity changed.
fn child_output_sink(
    id: String,
    outputs: &Rc<RefCell<OutputMap>>,
    on_output: &OutputSink,
) -> OutputSink {
    let outputs = Rc::clone(outputs);
    let on_output = Rc::clone(on_output);
    Rc::new(move |data: Output| {
        let snapshot = {
            let mut map = outputs.borrow_mut();
            let slot = Some(data);
            let changed = map
                .get(&id)
                .is_none_or(|prev| !Output::same_slot(prev, &slot));
            if !changed {
                return;
            }
            map.insert(id.clone(), slot);
            map.clone()
        };
        on_output(Output::new(snapshot));
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wisp_core::error::{MessageError, WispError};
    use wisp_core::testing::EventLog;

    use crate::wisp::{Startup, UpdateFlow, Wisp, WispInput};

    /// Render an aggregate snapshot as "a:1 b:-" style text.
    fn render(aggregate: &Output) -> String {
        let map = aggregate.downcast_ref::<OutputMap>().expect("aggregate map");
        map.iter()
            .map(|(id, slot)| match slot {
                Some(out) => format!("{id}:{}", out.downcast_ref::<u32>().unwrap()),
                None => format!("{id}:-"),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn aggregate_sinks(log: &EventLog) -> Sinks {
        let errors = log.clone();
        let outputs = log.clone();
        Sinks::new(
            move |e| errors.record(format!("error {e}")),
            move |o| outputs.record(render(&o)),
        )
    }

    /// A wisp that reports `value` on every update.
    fn reporter(value: u32) -> TameWisp<u32> {
        Wisp::new(move |input: WispInput<u32>| {
            let out = Output::new(value);
            Ok(Startup::from_fn(move |_props| {
                input.on_output(out.clone());
                Ok(UpdateFlow::Done)
            }))
        })
        .tame()
    }

    #[test]
    fn aggregates_in_definition_order() {
        let log = EventLog::new();
        let composite = combine(vec![("a", reporter(1)), ("b", reporter(2))]);
        let instance = composite.start(aggregate_sinks(&log));

        instance.update(0);
        // One snapshot per child report, in definition order.
        log.assert(&["a:1 b:-", "a:1 b:2"]);

        // Identical output identities: no further emissions.
        instance.update(0);
        log.assert(&[]);
        instance.destroy();
    }

    #[test]
    fn seeds_defaults_without_emitting() {
        let log = EventLog::new();
        let quiet = Wisp::new(|_input: WispInput<u32>| {
            Ok(Startup::from_fn(|_props| Ok(UpdateFlow::Done)))
        })
        .with_default_output(Output::new(7u32))
        .tame();

        let composite = combine(vec![("quiet", quiet), ("loud", reporter(1))]);
        let instance = composite.start(aggregate_sinks(&log));
        // Nothing emitted at construction time.
        log.assert(&[]);

        instance.update(0);
        // The first real report carries the seeded default alongside it.
        log.assert(&["quiet:7 loud:1"]);
        instance.destroy();
    }

    #[test]
    fn same_props_reach_every_child_in_order() {
        let log = EventLog::new();
        let child = |name: &'static str, log: EventLog| {
            Wisp::new(move |_input: WispInput<u32>| {
                let log = log.clone();
                Ok(Startup::from_fn(move |props| {
                    log.record(format!("{name} {props}"));
                    Ok(UpdateFlow::Done)
                }))
            })
            .tame()
        };

        let composite = combine(vec![
            ("first", child("first", log.clone())),
            ("second", child("second", log.clone())),
        ]);
        let instance = composite.start(Sinks::silent());
        instance.update(5);
        log.assert(&["first 5", "second 5"]);
        instance.destroy();
    }

    #[test]
    fn error_mid_update_stops_iteration() {
        let log = EventLog::new();

        // The composite is wrapped so that a child error destroys it, the
        // way the containment operator would.
        let failing = Wisp::new(|_input: WispInput<u32>| {
            Ok(Startup::from_fn(|_props| -> Result<UpdateFlow, WispError> {
                Err(MessageError::err("boom"))
            }))
        })
        .tame();
        let witness = Wisp::new({
            let log = log.clone();
            move |_input: WispInput<u32>| {
                let log = log.clone();
                Ok(Startup::from_fn(move |props| {
                    log.record(format!("witness {props}"));
                    Ok(UpdateFlow::Done)
                }))
            }
        })
        .tame();

        let composite = combine(vec![("failing", failing), ("witness", witness)]);

        let slot: Rc<RefCell<Option<RunningWisp<u32>>>> = Rc::new(RefCell::new(None));
        let instance = composite.start(Sinks::new(
            {
                let log = log.clone();
                let slot = Rc::clone(&slot);
                move |e| {
                    log.record(format!("error {e}"));
                    if let Some(instance) = slot.borrow().clone() {
                        instance.destroy();
                    }
                }
            },
            |_| {},
        ));
        *slot.borrow_mut() = Some(instance.clone());

        instance.update(1);
        // The error sink destroyed the composite before the second child
        // was touched.
        log.assert(&["error boom"]);

        instance.destroy();
        log.assert(&[]);
    }

    #[test]
    fn destroy_tears_down_every_child_once() {
        let log = EventLog::new();
        let child = |name: &'static str, log: EventLog| {
            Wisp::new(move |_input: WispInput<u32>| {
                struct Tracked {
                    name: &'static str,
                    log: EventLog,
                }
                impl crate::wisp::WispInstance<u32> for Tracked {
                    fn update(&mut self, _props: u32) -> Result<UpdateFlow, WispError> {
                        Ok(UpdateFlow::Done)
                    }
                    fn destroy(&mut self) -> Result<(), WispError> {
                        self.log.record(format!("destroy {}", self.name));
                        Ok(())
                    }
                }
                Ok(Startup::instance(Tracked {
                    name,
                    log: log.clone(),
                }))
            })
            .tame()
        };

        let composite = combine(vec![
            ("a", child("a", log.clone())),
            ("b", child("b", log.clone())),
        ]);
        let instance = composite.start(Sinks::silent());
        instance.update(1);

        instance.destroy();
        log.assert(&["destroy a", "destroy b"]);
        instance.destroy();
        log.assert(&[]);
    }
}
