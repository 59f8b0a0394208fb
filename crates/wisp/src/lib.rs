#![forbid(unsafe_code)]

//! wisp public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users: the
//! common contract and operator types at the root, and the member crates
//! under [`prelude`].

pub use wisp_core::{
    MessageError, OrderedMap, Output, OutputMap, Promise, Settle, ShallowEq, ShutdownError,
    WispError, is_shutdown, shutdown_error, wrap_err,
};
pub use wisp_runtime::{
    ChildSpec, DispatchFn, ErrorHandler, ErrorSink, OutputSink, Reconciler, Reflective,
    RunningWisp, Sinks, Startup, Store, StoreProps, TameWisp, UpdateFlow, Wisp, WispInput,
    WispInstance, Worker, attach, catch_errors, catch_errors_with, combine, filter_props,
    map_keyed, reflect_output, start, tame, worker_wisp,
};

pub mod prelude {
    pub use wisp_core as core;
    pub use wisp_runtime as runtime;
}
