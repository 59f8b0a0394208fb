#![forbid(unsafe_code)]

//! Keyed dynamic collection: one child per derived identifier.
//!
//! [`map_keyed`] drives a variable set of children of one definition. Each
//! update derives the wanted id list from the outer props, filters per-id
//! child props, creates children for newly wanted ids, updates children
//! whose filtered props changed shallowly, and destroys children whose ids
//! dropped off the list. The shallow-equality gate is a correctness
//! requirement, not an optimization: without it, outputs feeding back into
//! props loop forever.
//!
//! Aggregate output emissions are coalesced behind a dirty flag and flushed
//! only between passes, never from inside one; the emitted snapshot covers
//! exactly the currently live ids, in wanted order.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ahash::AHashMap;
use tracing::trace;

use wisp_core::error::WispError;
use wisp_core::ordered_map::OrderedMap;
use wisp_core::output::{Output, OutputMap};
use wisp_core::shallow::ShallowEq;

use crate::wisp::{OutputSink, RunningWisp, Sinks, TameWisp};

struct MapState<Q> {
    instances: OrderedMap<String, RunningWisp<Q>>,
    outputs: AHashMap<String, Output>,
    props_cache: AHashMap<String, Option<Q>>,
    outputs_dirty: bool,
    updating: bool,
}

/// Drive one child per identifier derived from the outer props.
///
/// `list_ids` derives the wanted identifiers; `filter` produces a child's
/// props (or `None` for "not wanted this round"). Either failing routes the
/// error to `on_error`; a failed `list_ids` skips the whole pass.
pub fn map_keyed<P, Q>(
    child: impl Into<TameWisp<Q>>,
    list_ids: impl Fn(&P) -> Result<Vec<String>, WispError> + 'static,
    filter: impl Fn(&P, &str) -> Result<Option<Q>, WispError> + 'static,
) -> TameWisp<P>
where
    P: Clone + 'static,
    Q: Clone + ShallowEq + 'static,
{
    let child: TameWisp<Q> = child.into();
    let list_ids = Rc::new(list_ids);
    let filter = Rc::new(filter);

    TameWisp::from_parts(
        move |sinks: Sinks| {
            let destroyed = Rc::new(Cell::new(false));
            let state = Rc::new(RefCell::new(MapState::<Q> {
                instances: OrderedMap::new(),
                outputs: AHashMap::new(),
                props_cache: AHashMap::new(),
                outputs_dirty: false,
                updating: false,
            }));

            let update = {
                let child = child.clone();
                let list_ids = Rc::clone(&list_ids);
                let filter = Rc::clone(&filter);
                let state = Rc::clone(&state);
                let destroyed = Rc::clone(&destroyed);
                let sinks = sinks.clone();
                move |outer: P| {
                    let ids = match list_ids(&outer) {
                        Ok(ids) => ids,
                        Err(error) => {
                            sinks.emit_error(error);
                            return;
                        }
                    };
                    if destroyed.get() {
                        return;
                    }
                    state.borrow_mut().updating = true;

                    let mut wanted: Vec<String> = Vec::new();
                    for id in ids {
                        let inner = match filter(&outer, &id) {
                            Ok(inner) => inner,
                            Err(error) => {
                                // The id is unwanted this round; the sweep
                                // below still has to converge on the list.
                                sinks.emit_error(error);
                                None
                            }
                        };
                        if destroyed.get() {
                            return;
                        }

                        let dirty = {
                            let mut s = state.borrow_mut();
                            let previous = s.props_cache.get(&id).cloned().unwrap_or(None);
                            let dirty = !slot_shallow_eq(&inner, &previous);
                            s.props_cache.insert(id.clone(), inner.clone());
                            dirty
                        };

                        let Some(inner) = inner else { continue };

                        let existing = state.borrow().instances.get(&id).cloned();
                        let instance = match existing {
                            Some(instance) => instance,
                            None => {
                                trace!(target: "wisp::map", id = %id, "creating child");
                                let instance = child.start(Sinks {
                                    on_error: Rc::clone(&sinks.on_error),
                                    on_output: child_output_sink(
                                        id.clone(),
                                        &state,
                                        &sinks.on_output,
                                    ),
                                });
                                state
                                    .borrow_mut()
                                    .instances
                                    .insert(id.clone(), instance.clone());
                                if destroyed.get() {
                                    return;
                                }
                                instance
                            }
                        };

                        if dirty {
                            instance.update(inner);
                        }
                        if destroyed.get() {
                            return;
                        }
                        wanted.push(id);
                    }

                    // Sweep: drop every child whose id fell off the list.
                    // This must run to completion even when a destruction
                    // cascades into destroying the whole collection.
                    let stale: Vec<(String, RunningWisp<Q>)> = {
                        let mut s = state.borrow_mut();
                        let old = std::mem::take(&mut s.instances);
                        let mut kept = OrderedMap::new();
                        let mut stale = Vec::new();
                        for (id, instance) in old.into_entries() {
                            if wanted.contains(&id) {
                                kept.insert(id, instance);
                            } else {
                                stale.push((id, instance));
                            }
                        }
                        s.instances = kept;
                        for (id, _) in &stale {
                            // Dropping a child that had reported reshapes
                            // the aggregate.
                            if s.outputs.remove(id).is_some() {
                                s.outputs_dirty = true;
                            }
                            // Forget the cached props too, so a later
                            // re-creation always gets its first update.
                            s.props_cache.remove(id);
                        }
                        stale
                    };
                    for (id, instance) in stale {
                        trace!(target: "wisp::map", id = %id, "destroying child");
                        instance.destroy();
                    }
                    if destroyed.get() {
                        return;
                    }

                    state.borrow_mut().updating = false;
                    flush_outputs(&state, &sinks.on_output);
                }
            };

            let destroy = move || {
                destroyed.set(true);
                let drained: Vec<RunningWisp<Q>> = {
                    let mut s = state.borrow_mut();
                    std::mem::take(&mut s.instances)
                        .into_entries()
                        .map(|(_, v)| v)
                        .collect()
                };
                for instance in drained {
                    instance.destroy();
                }
            };

            RunningWisp::new(update, destroy)
        },
        None,
    )
}

fn slot_shallow_eq<Q: ShallowEq>(a: &Option<Q>, b: &Option<Q>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.shallow_eq(b),
        _ => false,
    }
}

/// Attribute a child's output to its id and coalesce the aggregate
/// emission until the collection is between passes.
fn child_output_sink<Q: Clone + 'static>(
    id: String,
    state: &Rc<RefCell<MapState<Q>>>,
    on_output: &OutputSink,
) -> OutputSink {
    let state = Rc::clone(state);
    let on_output = Rc::clone(on_output);
    Rc::new(move |data: Output| {
        {
            let mut s = state.borrow_mut();
            let same = s
                .outputs
                .get(&id)
                .is_some_and(|prev| Output::same(prev, &data));
            if same {
                return;
            }
            s.outputs.insert(id.clone(), data);
            s.outputs_dirty = true;
        }
        flush_outputs(&state, &on_output);
    })
}

/// Emit one aggregate snapshot covering the live ids, unless a pass is in
/// progress (the pass flushes on completion).
fn flush_outputs<Q: Clone + 'static>(state: &Rc<RefCell<MapState<Q>>>, on_output: &OutputSink) {
    let snapshot = {
        let mut s = state.borrow_mut();
        if !s.outputs_dirty || s.updating {
            return;
        }
        s.outputs_dirty = false;
        let mut snapshot = OutputMap::new();
        for id in s.instances.keys() {
            snapshot.insert(id.clone(), s.outputs.get(id).cloned());
        }
        snapshot
    };
    on_output(Output::new(snapshot));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
