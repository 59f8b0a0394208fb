#![forbid(unsafe_code)]

//! Ordered-children reconciliation: the tree-diffing composition strategy.
//!
//! Where [`map_keyed`](crate::map::map_keyed) derives its child set from
//! props, a [`Reconciler`] is handed the child list directly: an ordered
//! sequence of (identity key, definition, props) triples, diffed against
//! the previous sequence on every pass. Explicitly keyed children match by
//! key; keyless children fall back to matching by definition identity, in
//! order. Matched children are updated only when their props changed
//! shallowly; unmatched old children are destroyed; the rest are
//! constructed and given their first props. The same
//! create/update/destroy discipline as the keyed collection, generalized
//! to heterogeneous definitions in one list.

use ahash::AHashMap;
use tracing::trace;

use wisp_core::ordered_map::OrderedMap;
use wisp_core::shallow::ShallowEq;

use crate::wisp::{RunningWisp, Sinks, TameWisp};

/// One child in a reconciliation pass.
pub struct ChildSpec<P> {
    key: Option<String>,
    def: TameWisp<P>,
    props: P,
}

impl<P> ChildSpec<P> {
    /// A keyless child, matched across passes by definition identity.
    pub fn new(def: impl Into<TameWisp<P>>, props: P) -> Self {
        Self {
            key: None,
            def: def.into(),
            props,
        }
    }

    /// An explicitly keyed child; the key is its identity across passes.
    pub fn keyed(key: impl Into<String>, def: impl Into<TameWisp<P>>, props: P) -> Self {
        Self {
            key: Some(key.into()),
            def: def.into(),
            props,
        }
    }
}

struct Slot<P> {
    key: Option<String>,
    def: TameWisp<P>,
    props: P,
    instance: RunningWisp<P>,
}

/// Reconciles an ordered child list against the previous one.
pub struct Reconciler<P> {
    sinks: Sinks,
    slots: Vec<Slot<P>>,
}

impl<P: Clone + ShallowEq + 'static> Reconciler<P> {
    /// A reconciler whose children report through `sinks`.
    #[must_use]
    pub fn new(sinks: Sinks) -> Self {
        Self {
            sinks,
            slots: Vec::new(),
        }
    }

    /// Number of live children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no children are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Diff `children` against the previous pass: match, update, create,
    /// and destroy as needed.
    pub fn reconcile(&mut self, children: Vec<ChildSpec<P>>) {
        let mut old: Vec<Option<Slot<P>>> = std::mem::take(&mut self.slots)
            .into_iter()
            .map(Some)
            .collect();

        // Index the previous pass: explicit keys, then definition
        // identities for the keyless, each holding slot indices in order.
        let mut by_key: AHashMap<String, usize> = AHashMap::new();
        let mut by_def: OrderedMap<usize, Vec<usize>> = OrderedMap::new();
        for (index, slot) in old.iter().enumerate() {
            let slot = slot.as_ref().expect("slots start occupied");
            match &slot.key {
                Some(key) => {
                    by_key.insert(key.clone(), index);
                }
                None => match by_def.get_mut(&slot.def.identity()) {
                    Some(indices) => indices.push(index),
                    None => {
                        by_def.insert(slot.def.identity(), vec![index]);
                    }
                },
            }
        }

        let mut next: Vec<Slot<P>> = Vec::with_capacity(children.len());
        for spec in children {
            let matched = match &spec.key {
                Some(key) => by_key.remove(key),
                None => by_def
                    .get_mut(&spec.def.identity())
                    .and_then(|indices| (!indices.is_empty()).then(|| indices.remove(0))),
            };

            // A keyed match only survives if the definition is unchanged;
            // a new definition under an old key replaces the child.
            let reusable = matched
                .and_then(|index| {
                    (old[index].as_ref())
                        .expect("matched slots are unclaimed")
                        .def
                        .identity()
                        .eq(&spec.def.identity())
                        .then_some(index)
                })
                .and_then(|index| old[index].take());

            match reusable {
                Some(mut slot) => {
                    if !slot.props.shallow_eq(&spec.props) {
                        slot.instance.update(spec.props.clone());
                        slot.props = spec.props;
                    }
                    next.push(slot);
                }
                None => {
                    trace!(target: "wisp::reconcile", key = ?spec.key, "creating child");
                    let instance = spec.def.start(self.sinks.clone());
                    instance.update(spec.props.clone());
                    next.push(Slot {
                        key: spec.key,
                        def: spec.def,
                        props: spec.props,
                        instance,
                    });
                }
            }
        }

        // Destroy everything the new list did not claim.
        for slot in old.into_iter().flatten() {
            trace!(target: "wisp::reconcile", key = ?slot.key, "destroying child");
            slot.instance.destroy();
        }

        self.slots = next;
    }

    /// Destroy every live child.
    pub fn clear(&mut self) {
        for slot in std::mem::take(&mut self.slots) {
            slot.instance.destroy();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
