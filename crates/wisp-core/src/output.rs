#![forbid(unsafe_code)]

//! Opaque output values.
//!
//! A unit reports values upward through its `on_output` sink as [`Output`]
//! handles: reference-counted, dynamically typed, and compared by
//! *identity*, never by content. Re-reporting the same handle is a no-op
//! everywhere in the runtime; reporting a freshly allocated handle is a new
//! output even if it holds an equal value. This is what makes
//! change-detection on outputs cheap and loop-free.
//!
//! Aggregating operators emit an [`OutputMap`] snapshot wrapped in a fresh
//! `Output`. Snapshots are copy-on-write: once emitted, a map is never
//! mutated again, so consumers may retain it.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::ordered_map::OrderedMap;

/// An id-keyed aggregate of child outputs, in definition order.
///
/// `None` means the child has not reported yet and carries no default.
pub type OutputMap = OrderedMap<String, Option<Output>>;

/// A dynamically-typed output value, compared by identity.
#[derive(Clone)]
pub struct Output(Rc<dyn Any>);

impl Output {
    /// Wrap a value into an output handle.
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// Identity comparison: two handles are the same output only if they
    /// share the same allocation.
    #[must_use]
    pub fn same(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Identity comparison over optional slots; two empty slots match.
    #[must_use]
    pub fn same_slot(a: &Option<Self>, b: &Option<Self>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => Self::same(a, b),
            _ => false,
        }
    }

    /// Borrow the payload as `T`, when it is one.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Whether the payload is a `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Output({:p})", Rc::as_ptr(&self.0))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
