#![forbid(unsafe_code)]

//! The unit contract.
//!
//! A *wisp* is a stateful worker with a three-operation lifecycle:
//! construction, `update(props)`, `destroy()`. This module defines the
//! vocabulary the whole runtime speaks:
//!
//! - [`Wisp<P>`]: a raw definition — a starter function producing an
//!   instance (or a bare update closure) from a [`WispInput`].
//! - [`TameWisp<P>`]: a hardened definition, produced by
//!   [`Wisp::tame`]. Hardening is idempotent by construction: it is a
//!   distinct type, so it cannot nest.
//! - [`RunningWisp<P>`]: the live handle a hardened definition starts
//!   into. `update` never fails outward and `destroy` is idempotent.
//! - [`WispInput<P>`]: the construction context — the unit's only channel
//!   for reporting errors/outputs and for awaiting future props.
//!
//! Definitions are cheap `Rc` handles: clone them, compose them, start
//! them any number of times. All state lives in the started instance.

use std::cell::RefCell;
use std::rc::Rc;

use wisp_core::error::{WispError, shutdown_error};
use wisp_core::output::Output;
use wisp_core::promise::Promise;

// ─── Sinks ───────────────────────────────────────────────────────────────────

/// Callback receiving errors routed out of a unit.
pub type ErrorSink = Rc<dyn Fn(WispError)>;

/// Callback receiving output values reported by a unit.
pub type OutputSink = Rc<dyn Fn(Output)>;

/// The error/output callback pair threaded through every composition
/// layer. Cloning shares the underlying callbacks.
#[derive(Clone)]
pub struct Sinks {
    /// Receives routed errors.
    pub on_error: ErrorSink,
    /// Receives reported outputs.
    pub on_output: OutputSink,
}

impl Sinks {
    /// Build a sink pair from two closures.
    pub fn new(
        on_error: impl Fn(WispError) + 'static,
        on_output: impl Fn(Output) + 'static,
    ) -> Self {
        Self {
            on_error: Rc::new(on_error),
            on_output: Rc::new(on_output),
        }
    }

    /// Sinks that drop everything. The root driver's default: uncaught
    /// errors are silent unless the application wires a reporter.
    #[must_use]
    pub fn silent() -> Self {
        Self::new(|_| {}, |_| {})
    }

    /// Report an error.
    pub fn emit_error(&self, error: WispError) {
        (self.on_error)(error);
    }

    /// Report an output value.
    pub fn emit_output(&self, data: Output) {
        (self.on_output)(data);
    }
}

// ─── Instance contract ───────────────────────────────────────────────────────

/// What a unit's `update` produced: immediate completion, or a deferred
/// completion the guard must serialize on.
pub enum UpdateFlow {
    /// The update finished synchronously.
    Done,
    /// The update continues; the promise settles when it finishes.
    /// Rejection counts as an update error.
    Pending(Promise<()>),
}

/// A live unit instance. Owned exclusively by the guard or operator that
/// created it; never shared.
pub trait WispInstance<P> {
    /// Deliver a new props snapshot.
    fn update(&mut self, props: P) -> Result<UpdateFlow, WispError>;

    /// Tear the instance down. Called at most once by the owner.
    fn destroy(&mut self) -> Result<(), WispError>;
}

/// What a starter function may return: a full instance, or a bare update
/// closure (normalized into an instance with a no-op destroy).
pub enum Startup<P> {
    /// A full instance object.
    Instance(Box<dyn WispInstance<P>>),
    /// A bare update function.
    UpdateFn(Box<dyn FnMut(P) -> Result<UpdateFlow, WispError>>),
}

impl<P> Startup<P> {
    /// Wrap an update closure.
    pub fn from_fn(update: impl FnMut(P) -> Result<UpdateFlow, WispError> + 'static) -> Self {
        Self::UpdateFn(Box::new(update))
    }

    /// Wrap an instance object.
    pub fn instance(instance: impl WispInstance<P> + 'static) -> Self {
        Self::Instance(Box::new(instance))
    }

    pub(crate) fn into_instance(self) -> Box<dyn WispInstance<P>>
    where
        P: 'static,
    {
        match self {
            Self::Instance(instance) => instance,
            Self::UpdateFn(update) => Box::new(FnInstance { update }),
        }
    }
}

struct FnInstance<P> {
    update: Box<dyn FnMut(P) -> Result<UpdateFlow, WispError>>,
}

impl<P> WispInstance<P> for FnInstance<P> {
    fn update(&mut self, props: P) -> Result<UpdateFlow, WispError> {
        (self.update)(props)
    }

    fn destroy(&mut self) -> Result<(), WispError> {
        Ok(())
    }
}

// ─── Waiters ─────────────────────────────────────────────────────────────────

/// One pending `next_props`/`wait_for` registration.
///
/// `probe` runs against each delivered snapshot and returns true once the
/// waiter has settled its promise; `cancel` rejects it on shutdown. The two
/// closures share the `Settle` through an interior slot, so whichever fires
/// first takes it.
struct Waiter<P> {
    probe: Box<dyn FnMut(&P) -> bool>,
    cancel: Box<dyn FnOnce(WispError)>,
}

/// The per-instance waiter registry. Explicitly one promise per call;
/// nothing is cached or shared between callers.
pub(crate) struct WaiterSet<P> {
    entries: Vec<Waiter<P>>,
    closed: bool,
}

impl<P: Clone + 'static> WaiterSet<P> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            closed: false,
        }
    }

    /// Run every waiter against a fresh snapshot, dropping the satisfied
    /// ones. Waiter callbacks may register new waiters re-entrantly; those
    /// are kept for the *next* snapshot, never probed with this one.
    pub(crate) fn deliver(set: &Rc<RefCell<Self>>, props: &P) {
        let current = std::mem::take(&mut set.borrow_mut().entries);
        let mut kept = Vec::new();
        for mut waiter in current {
            if !(waiter.probe)(props) {
                kept.push(waiter);
            }
        }
        let mut registry = set.borrow_mut();
        let registered_meanwhile = std::mem::take(&mut registry.entries);
        registry.entries = kept;
        registry.entries.extend(registered_meanwhile);
    }

    /// Reject every pending waiter with the shutdown error and refuse
    /// future registrations.
    pub(crate) fn close(set: &Rc<RefCell<Self>>) {
        let drained = {
            let mut registry = set.borrow_mut();
            registry.closed = true;
            std::mem::take(&mut registry.entries)
        };
        for waiter in drained {
            (waiter.cancel)(shutdown_error());
        }
    }
}

// ─── Construction context ────────────────────────────────────────────────────

/// The context handed to a starter function: the unit's sinks, plus
/// self-referential access to its own props stream.
pub struct WispInput<P> {
    sinks: Sinks,
    props: Rc<RefCell<Option<P>>>,
    waiters: Rc<RefCell<WaiterSet<P>>>,
}

impl<P> Clone for WispInput<P> {
    fn clone(&self) -> Self {
        Self {
            sinks: self.sinks.clone(),
            props: Rc::clone(&self.props),
            waiters: Rc::clone(&self.waiters),
        }
    }
}

impl<P: Clone + 'static> WispInput<P> {
    pub(crate) fn new(
        sinks: Sinks,
        props: Rc<RefCell<Option<P>>>,
        waiters: Rc<RefCell<WaiterSet<P>>>,
    ) -> Self {
        Self {
            sinks,
            props,
            waiters,
        }
    }

    /// Report an error to the owner. Routed, never thrown.
    pub fn on_error(&self, error: WispError) {
        self.sinks.emit_error(error);
    }

    /// Report an output value to the owner.
    pub fn on_output(&self, data: Output) {
        self.sinks.emit_output(data);
    }

    /// The unit's sinks, for handing to helpers.
    #[must_use]
    pub fn sinks(&self) -> &Sinks {
        &self.sinks
    }

    /// A shareable handle to the error sink.
    #[must_use]
    pub fn error_sink(&self) -> ErrorSink {
        Rc::clone(&self.sinks.on_error)
    }

    /// A shareable handle to the output sink.
    #[must_use]
    pub fn output_sink(&self) -> OutputSink {
        Rc::clone(&self.sinks.on_output)
    }

    /// The most recently delivered props snapshot, if any. Stays current
    /// however late it is read.
    #[must_use]
    pub fn props(&self) -> Option<P> {
        self.props.borrow().clone()
    }

    /// A one-shot promise for the *next* delivered snapshot. Every call
    /// registers an independent promise. Rejects with the shutdown error if
    /// the unit is destroyed first.
    #[must_use]
    pub fn next_props(&self) -> Promise<P> {
        if self.waiters.borrow().closed {
            return Promise::rejected(shutdown_error());
        }
        let (promise, settle) = Promise::pending();
        let slot = Rc::new(RefCell::new(Some(settle)));
        let cancel_slot = Rc::clone(&slot);
        self.waiters.borrow_mut().entries.push(Waiter {
            probe: Box::new(move |props: &P| {
                if let Some(settle) = slot.borrow_mut().take() {
                    settle.resolve(props.clone());
                }
                true
            }),
            cancel: Box::new(move |error| {
                if let Some(settle) = cancel_slot.borrow_mut().take() {
                    settle.reject(error);
                }
            }),
        });
        promise
    }

    /// Resolve once `predicate` returns a value, checking the current
    /// snapshot synchronously before subscribing to future ones. Rejects
    /// with the shutdown error if the unit is destroyed first.
    #[must_use]
    pub fn wait_for<R: Clone + 'static>(
        &self,
        predicate: impl Fn(&P) -> Option<R> + 'static,
    ) -> Promise<R> {
        let current = self.props.borrow().clone();
        if let Some(props) = current
            && let Some(found) = predicate(&props)
        {
            return Promise::resolved(found);
        }
        if self.waiters.borrow().closed {
            return Promise::rejected(shutdown_error());
        }
        let (promise, settle) = Promise::pending();
        let slot = Rc::new(RefCell::new(Some(settle)));
        let cancel_slot = Rc::clone(&slot);
        self.waiters.borrow_mut().entries.push(Waiter {
            probe: Box::new(move |props: &P| match predicate(props) {
                Some(found) => {
                    if let Some(settle) = slot.borrow_mut().take() {
                        settle.resolve(found);
                    }
                    true
                }
                None => false,
            }),
            cancel: Box::new(move |error| {
                if let Some(settle) = cancel_slot.borrow_mut().take() {
                    settle.reject(error);
                }
            }),
        });
        promise
    }
}

// ─── Definitions ─────────────────────────────────────────────────────────────

/// A raw unit definition: a starter function plus an optional default
/// output. Stateless; all state lives in started instances.
pub struct Wisp<P> {
    pub(crate) starter: Rc<dyn Fn(WispInput<P>) -> Result<Startup<P>, WispError>>,
    pub(crate) default_output: Option<Output>,
}

impl<P> Clone for Wisp<P> {
    fn clone(&self) -> Self {
        Self {
            starter: Rc::clone(&self.starter),
            default_output: self.default_output.clone(),
        }
    }
}

impl<P: Clone + 'static> Wisp<P> {
    /// Define a unit from its starter function.
    pub fn new(starter: impl Fn(WispInput<P>) -> Result<Startup<P>, WispError> + 'static) -> Self {
        Self {
            starter: Rc::new(starter),
            default_output: None,
        }
    }

    /// Set the output value assumed for this unit before its first report.
    #[must_use]
    pub fn with_default_output(mut self, output: Output) -> Self {
        self.default_output = Some(output);
        self
    }

    /// Harden this definition (see [`crate::tame`]).
    #[must_use]
    pub fn tame(self) -> TameWisp<P> {
        crate::tame::tame(self)
    }
}

/// A hardened unit definition: an instance factory with the guard's safety
/// guarantees baked in. Composition operators produce and consume these.
pub struct TameWisp<P> {
    start: Rc<dyn Fn(Sinks) -> RunningWisp<P>>,
    default_output: Option<Output>,
}

impl<P> Clone for TameWisp<P> {
    fn clone(&self) -> Self {
        Self {
            start: Rc::clone(&self.start),
            default_output: self.default_output.clone(),
        }
    }
}

impl<P> TameWisp<P> {
    pub(crate) fn from_parts(
        start: impl Fn(Sinks) -> RunningWisp<P> + 'static,
        default_output: Option<Output>,
    ) -> Self {
        Self {
            start: Rc::new(start),
            default_output,
        }
    }

    /// Start a live instance wired to `sinks`.
    #[must_use]
    pub fn start(&self, sinks: Sinks) -> RunningWisp<P> {
        (self.start)(sinks)
    }

    /// The output value assumed for this unit before its first report.
    #[must_use]
    pub fn default_output(&self) -> Option<&Output> {
        self.default_output.as_ref()
    }

    /// Definition identity, used by the reconciler to match keyless
    /// children of the same definition across passes.
    pub(crate) fn identity(&self) -> usize {
        Rc::as_ptr(&self.start) as *const () as usize
    }
}

impl<P: Clone + 'static> From<Wisp<P>> for TameWisp<P> {
    fn from(wisp: Wisp<P>) -> Self {
        wisp.tame()
    }
}

// ─── Running handle ──────────────────────────────────────────────────────────

struct RunningInner<P> {
    update: Box<dyn Fn(P)>,
    destroy: Box<dyn Fn()>,
}

/// A live, hardened unit. `update` routes failures to the wired error
/// sink; `destroy` is idempotent and safe at any time, including from
/// inside callbacks triggered by an in-flight update.
pub struct RunningWisp<P> {
    inner: Rc<RunningInner<P>>,
}

impl<P> Clone for RunningWisp<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<P> RunningWisp<P> {
    pub(crate) fn new(update: impl Fn(P) + 'static, destroy: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(RunningInner {
                update: Box::new(update),
                destroy: Box::new(destroy),
            }),
        }
    }

    /// Deliver a new props snapshot.
    pub fn update(&self, props: P) {
        (self.inner.update)(props);
    }

    /// Tear the unit down.
    pub fn destroy(&self) {
        (self.inner.destroy)();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
