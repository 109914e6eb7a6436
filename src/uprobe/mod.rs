//! Probe chain (L4): ordered event catchers attached to a pipe at
//! construction.
//!
//! The source's `throw(chain, pipe, event, varargs)` becomes a tagged
//! [`Event`] enum plus a vector of `dyn Uprobe`s walked in order — the
//! "variadic events via throw" design note. Each catcher returns an
//! [`Outcome`]; [`Chain::throw`] stops at the first [`Outcome::Handled`]
//! or [`Outcome::Error`] and otherwise falls through to the terminator,
//! which logs anything nobody claimed.

pub mod dejitter;
pub mod prefix;
pub mod pthread_upump_mgr;
pub mod resource_mgrs;
pub mod selflow;
pub mod stdio;
pub mod xfer_probe;

use crate::error::UpipeError;
use crate::urequest::Urequest;
use std::sync::Arc;

/// Log severity carried by [`Event::Log`], ordered least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Verbose,
    Debug,
    Notice,
    Warn,
    Error,
}

/// A tagged event a pipe throws up its probe chain.
///
/// Mirrors the standard event list in spec §4.4/§6: lifecycle
/// (`Ready`/`Dead`), resource negotiation (`ProvideRequest`/`NeedOutput`),
/// flow renegotiation (`NewFlowDef`), source/sink signaling
/// (`SourceEnd`), pump-freeze bracketing, fatal/error reporting, and
/// logging. Signature-qualified local events are represented by
/// `Local(String, ...)` so probes that don't recognize a signature can
/// ignore it without a type-level explosion of event variants.
#[derive(Clone)]
pub enum Event {
    Ready,
    Dead,
    /// A resource request thrown for the chain to fulfil.
    ProvideRequest(Arc<Urequest>),
    NeedOutput,
    NeedUrefMgr,
    NeedUbufMgr(String),
    NeedUpumpMgr,
    NeedUclock,
    NewFlowDef(String),
    SourceEnd,
    FreezeUpumpMgr,
    ThawUpumpMgr,
    Fatal(UpipeError),
    Error(UpipeError),
    Log {
        level: LogLevel,
        message: String,
    },
    /// A `NEW_FLOW` split event carrying `(flow_id, flow_def)`, consumed by
    /// `selflow` (spec §4.3, scenario 5).
    NewFlow {
        flow_id: u64,
        flow_def: String,
    },
    /// `CLOCK_REF(cr_prog, cr_sys)`, consumed by `dejitter` (spec §4.3).
    ClockRef {
        cr_prog: u64,
        cr_sys: u64,
    },
    /// Signature-qualified local event: an escape hatch for pipe families
    /// that need their own events without widening this enum.
    Local {
        signature: &'static str,
        code: u32,
    },
}

/// What a catcher did with an [`Event`].
#[derive(Debug)]
pub enum Outcome {
    /// Fully handled; the chain stops here.
    Handled,
    /// Not recognized; try the next catcher.
    Unhandled,
    /// A genuine failure occurred while handling; the chain also stops.
    Error(UpipeError),
}

/// An opaque pipe identifier threaded through events for logging and
/// `xfer` bridging. Pipes hand their manager's signature plus an
/// instance tag; probes never need the concrete pipe type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipeId {
    pub signature: &'static str,
    pub instance: u64,
}

/// A single link in the probe chain.
pub trait Uprobe: Send + Sync {
    fn catch(&self, pipe: PipeId, event: &Event) -> Outcome;

    /// Short label used by [`crate::utils::diagnostics::dump_probe_chain`].
    /// Probes with nothing more specific to say keep the default.
    fn name(&self) -> &'static str {
        "uprobe"
    }
}

/// An ordered, diamond-free sequence of [`Uprobe`]s terminated by a
/// catcher that logs anything nobody claimed (spec §4.3: "the chain is a
/// diamond-free DAG rooted at the outermost probe").
#[derive(Clone, Default)]
pub struct Chain {
    probes: Vec<Arc<dyn Uprobe>>,
}

impl Chain {
    pub fn new() -> Self {
        Chain { probes: Vec::new() }
    }

    /// Prepend `probe` so it catches before everything already in the
    /// chain (the most common construction: build from the inside out).
    pub fn with(mut self, probe: Arc<dyn Uprobe>) -> Self {
        self.probes.insert(0, probe);
        self
    }

    /// Append `probe` so it catches after everything already in the
    /// chain but still before the terminator.
    pub fn append(mut self, probe: Arc<dyn Uprobe>) -> Self {
        self.probes.push(probe);
        self
    }

    /// The probes in catch order, for introspection (diagnostics dumps).
    pub fn probes(&self) -> &[Arc<dyn Uprobe>] {
        &self.probes
    }

    /// Walk the chain in order; stop at the first `Handled`/`Error`.
    /// Falls through to the terminator (a `tracing` log of the
    /// unhandled event) if every probe returns `Unhandled`.
    pub fn throw(&self, pipe: PipeId, event: Event) -> Outcome {
        for probe in &self.probes {
            match probe.catch(pipe, &event) {
                Outcome::Unhandled => continue,
                other => return other,
            }
        }
        terminate(pipe, &event);
        Outcome::Unhandled
    }
}

fn terminate(pipe: PipeId, event: &Event) {
    match event {
        Event::Log { level, message } => {
            // An event that reached the terminator as a Log means no stdio
            // probe was installed; still surface it rather than drop it.
            let lvl = match level {
                LogLevel::Verbose => tracing::Level::TRACE,
                LogLevel::Debug => tracing::Level::DEBUG,
                LogLevel::Notice => tracing::Level::INFO,
                LogLevel::Warn => tracing::Level::WARN,
                LogLevel::Error => tracing::Level::ERROR,
            };
            tracing::event!(tracing::Level::DEBUG, pipe = pipe.signature, level = ?lvl, message, "unhandled log event");
        }
        Event::Fatal(err) => {
            tracing::error!(pipe = pipe.signature, error = %err, "unhandled fatal event");
        }
        Event::Error(err) => {
            tracing::warn!(pipe = pipe.signature, error = %err, "unhandled error event");
        }
        _ => {
            tracing::debug!(pipe = pipe.signature, "unhandled probe event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProbe {
        hits: Arc<AtomicUsize>,
        handles: bool,
    }

    impl Uprobe for CountingProbe {
        fn catch(&self, _pipe: PipeId, _event: &Event) -> Outcome {
            self.hits.fetch_add(1, Ordering::SeqCst);
            if self.handles {
                Outcome::Handled
            } else {
                Outcome::Unhandled
            }
        }
    }

    #[test]
    fn chain_stops_at_first_handler() {
        let first_hits = Arc::new(AtomicUsize::new(0));
        let second_hits = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new()
            .append(Arc::new(CountingProbe {
                hits: Arc::clone(&first_hits),
                handles: false,
            }))
            .append(Arc::new(CountingProbe {
                hits: Arc::clone(&second_hits),
                handles: true,
            }))
            .append(Arc::new(CountingProbe {
                hits: Arc::clone(&first_hits),
                handles: false,
            }));

        let pipe = PipeId { signature: "test", instance: 0 };
        let outcome = chain.throw(pipe, Event::Ready);
        assert!(matches!(outcome, Outcome::Handled));
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unhandled_event_reaches_terminator_exactly_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let chain = Chain::new().append(Arc::new(CountingProbe {
            hits: Arc::clone(&hits),
            handles: false,
        }));
        let pipe = PipeId { signature: "test", instance: 0 };
        let outcome = chain.throw(pipe, Event::SourceEnd);
        assert!(matches!(outcome, Outcome::Unhandled));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
