#![forbid(unsafe_code)]

//! Supporting primitives for the wisp worker-lifecycle runtime.
//!
//! This crate holds the small, dependency-light pieces the runtime is built
//! from:
//!
//! - [`promise`]: single-threaded one-shot promises — the cooperative
//!   "awaitable" units may return from `update` and receive from
//!   `next_props`/`wait_for`.
//! - [`output`]: opaque, identity-compared output values and aggregate
//!   snapshots.
//! - [`ordered_map`]: a minimal insertion-ordered map for definition-order
//!   iteration.
//! - [`shallow`]: non-recursive change detection for props snapshots.
//! - [`error`]: dynamic error handles and the distinguished shutdown kind.
//!
//! Everything here is single-threaded by design; shared state is
//! `Rc`/`RefCell`, and no borrow is held across a user callback.

pub mod error;
pub mod ordered_map;
pub mod output;
pub mod promise;
pub mod shallow;

#[cfg(feature = "test-helpers")]
pub mod testing;

pub use error::{MessageError, ShutdownError, WispError, is_shutdown, shutdown_error, wrap_err};
pub use ordered_map::OrderedMap;
pub use output::{Output, OutputMap};
pub use promise::{Promise, Settle};
pub use shallow::ShallowEq;
