#![forbid(unsafe_code)]

//! Class-style authoring: a trait-based alternative to starter closures.
//!
//! Some units read better as a named type with methods than as nested
//! closures. [`Worker`] is that authoring style; [`worker_wisp`] adapts it
//! onto the same hardened contract everything else speaks — a
//! capability-checked adapter, not inheritance. The worker value is
//! constructed lazily on the first update (receiving the first props) and
//! its `destroy` receives the last delivered props.

use wisp_core::error::WispError;

use crate::wisp::{Sinks, Startup, TameWisp, UpdateFlow, Wisp, WispInput, WispInstance};

/// A class-style unit: constructed from the first props, updated on each
/// snapshot, torn down with the last one.
pub trait Worker<P>: Sized + 'static {
    /// Build the worker from the first delivered props.
    fn create(props: &P, cx: &Sinks) -> Result<Self, WispError>;

    /// React to a props snapshot.
    fn update(&mut self, props: &P, cx: &Sinks) -> Result<UpdateFlow, WispError>;

    /// Clean up resources. `props` is the last delivered snapshot; `None`
    /// when the worker was never updated.
    fn destroy(&mut self, props: Option<&P>, cx: &Sinks) -> Result<(), WispError> {
        let _ = (props, cx);
        Ok(())
    }
}

/// Adapt a [`Worker`] type into a hardened definition.
pub fn worker_wisp<P, W>() -> TameWisp<P>
where
    P: Clone + 'static,
    W: Worker<P>,
{
    Wisp::new(|input: WispInput<P>| {
        let cx = Sinks {
            on_error: input.error_sink(),
            on_output: input.output_sink(),
        };
        Ok(Startup::instance(Adapter::<P, W> {
            worker: None,
            props_cache: None,
            cx,
        }))
    })
    .tame()
}

struct Adapter<P, W> {
    worker: Option<W>,
    props_cache: Option<P>,
    cx: Sinks,
}

impl<P: Clone + 'static, W: Worker<P>> WispInstance<P> for Adapter<P, W> {
    fn update(&mut self, props: P) -> Result<UpdateFlow, WispError> {
        self.props_cache = Some(props.clone());
        if self.worker.is_none() {
            self.worker = Some(W::create(&props, &self.cx)?);
        }
        self.worker
            .as_mut()
            .expect("worker constructed above")
            .update(&props, &self.cx)
    }

    fn destroy(&mut self) -> Result<(), WispError> {
        match self.worker.take() {
            Some(mut worker) => worker.destroy(self.props_cache.as_ref(), &self.cx),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use wisp_core::error::MessageError;
    use wisp_core::output::Output;
    use wisp_core::testing::EventLog;

    struct Doubler;

    impl Worker<u32> for Doubler {
        fn create(_props: &u32, _cx: &Sinks) -> Result<Self, WispError> {
            Ok(Self)
        }

        fn update(&mut self, props: &u32, cx: &Sinks) -> Result<UpdateFlow, WispError> {
            cx.emit_output(Output::new(props * 2));
            Ok(UpdateFlow::Done)
        }
    }

    #[test]
    fn worker_lifecycle_reports_outputs() {
        let log = EventLog::new();
        let instance = worker_wisp::<u32, Doubler>().start(Sinks::new(
            |_| {},
            {
                let log = log.clone();
                move |out| log.record(format!("output {}", out.downcast_ref::<u32>().unwrap()))
            },
        ));

        instance.update(2);
        instance.update(5);
        instance.destroy();
        log.assert(&["output 4", "output 10"]);
    }

    struct Tracked;

    impl Worker<u32> for Tracked {
        fn create(props: &u32, _cx: &Sinks) -> Result<Self, WispError> {
            if *props == 0 {
                Err(MessageError::err("zero start"))
            } else {
                Ok(Self)
            }
        }

        fn update(&mut self, _props: &u32, _cx: &Sinks) -> Result<UpdateFlow, WispError> {
            Ok(UpdateFlow::Done)
        }

        fn destroy(&mut self, props: Option<&u32>, _cx: &Sinks) -> Result<(), WispError> {
            assert_eq!(props, Some(&7));
            Ok(())
        }
    }

    #[test]
    fn construction_is_lazy_and_guarded() {
        let errors = EventLog::new();
        let instance = worker_wisp::<u32, Tracked>().start(Sinks::new(
            {
                let errors = errors.clone();
                move |e| errors.record(format!("error {e}"))
            },
            |_| {},
        ));

        // No props yet: nothing constructed, nothing failed.
        errors.assert(&[]);

        // Construction failure routes like any update error.
        instance.update(0);
        errors.assert(&["error zero start"]);
    }

    #[test]
    fn destroy_receives_last_props() {
        let instance = worker_wisp::<u32, Tracked>().start(Sinks::silent());
        instance.update(7);
        // Tracked::destroy asserts it sees 7.
        instance.destroy();
    }

    #[test]
    fn destroy_without_updates_is_safe() {
        let instance = worker_wisp::<u32, Tracked>().start(Sinks::silent());
        instance.destroy();
    }
}
