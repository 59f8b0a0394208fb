#![forbid(unsafe_code)]

//! Lifecycle scheduling core for the wisp runtime.
//!
//! A *wisp* is a small supervised worker: constructed once, fed immutable
//! props snapshots through `update`, torn down with `destroy`. This crate
//! is the machinery that makes trees of them safe to run:
//!
//! - [`tame()`]: the runtime guard — error routing, update serialization
//!   with collapsing, teardown safety, shutdown rejection of waiters.
//! - [`combine()`]: fixed fan-out with an aggregated output map.
//! - [`map_keyed`]: keyed dynamic collections (one child per derived id).
//! - [`filter_props`]: prop-mapping with absent-marker lifecycle.
//! - [`catch_errors`] / [`catch_errors_with`]: error containment.
//! - [`reflect_output`]: self-referential output feedback.
//! - [`start()`] / [`attach`]: the root driver, pumping snapshots from an
//!   external [`Store`].
//! - [`Worker`] / [`worker_wisp`]: class-style authoring on the same
//!   contract.
//! - [`Reconciler`]: ordered-children diffing for heterogeneous lists.
//!
//! # Concurrency model
//!
//! One logical thread; no locks. A unit's `update` may hand back a
//! [`UpdateFlow::Pending`] promise, and everything the runtime guarantees
//! about overlap is about *re-entrancy and ordering*, enforced with
//! busy/dirty flags: an instance never runs two updates at once, never
//! observes stale props once newer ones arrived, and always runs once more
//! after the latest arrival.
//!
//! # Errors
//!
//! Errors never cross a hardened boundary as panics or `Err` returns; they
//! become `on_error` invocations, contained by [`catch_errors`] or flowing
//! to the root sink (a no-op unless the application wires one).

pub mod catch;
pub mod combine;
pub mod filter;
pub mod map;
pub mod reconcile;
pub mod reflect;
pub mod start;
pub mod tame;
pub mod wisp;
pub mod worker;

pub use catch::{ErrorHandler, catch_errors, catch_errors_with};
pub use combine::combine;
pub use filter::filter_props;
pub use map::map_keyed;
pub use reconcile::{ChildSpec, Reconciler};
pub use reflect::{Reflective, reflect_output};
pub use start::{DispatchFn, Store, StoreProps, attach, start};
pub use tame::tame;
pub use wisp::{
    ErrorSink, OutputSink, RunningWisp, Sinks, Startup, TameWisp, UpdateFlow, Wisp, WispInput,
    WispInstance,
};
pub use worker::{Worker, worker_wisp};
