#![forbid(unsafe_code)]

//! Error types carried through wisp error sinks.
//!
//! Errors never cross a hardened unit boundary as `Err` returns or panics;
//! they are converted into `on_error` sink invocations and travel upward as
//! cheap reference-counted handles. User code reports whatever error type it
//! likes; the runtime only needs to recognize one distinguished kind, the
//! [`ShutdownError`] delivered to pending waiters when their unit is torn
//! down.

use std::error::Error;
use std::rc::Rc;

use thiserror::Error;

/// A dynamically-typed, reference-counted error handle.
///
/// `Rc` keeps routing cheap: the same error may pass through several sinks
/// on its way to the root driver.
pub type WispError = Rc<dyn Error + 'static>;

/// Wrap a concrete error into a [`WispError`] handle.
pub fn wrap_err<E: Error + 'static>(error: E) -> WispError {
    Rc::new(error)
}

/// The distinguished error delivered to pending `next_props`/`wait_for`
/// promises when their owning unit is destroyed before they settle.
///
/// Callers special-case this kind via [`is_shutdown`] to tell expected
/// cancellation apart from user errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("wisp has been destroyed")]
pub struct ShutdownError;

/// A fresh shutdown error handle.
#[must_use]
pub fn shutdown_error() -> WispError {
    Rc::new(ShutdownError)
}

/// Whether `error` is the distinguished shutdown kind.
#[must_use]
pub fn is_shutdown(error: &WispError) -> bool {
    error.downcast_ref::<ShutdownError>().is_some()
}

/// A plain text error, for callers that have nothing more structured to say.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MessageError(pub String);

impl MessageError {
    /// Wrap a message into a [`WispError`] handle.
    pub fn err(message: impl Into<String>) -> WispError {
        Rc::new(Self(message.into()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
