//! Monotonic wall-clock source.
//!
//! Split out from [`crate::upump`] because dejitter, RTP jitter-buffer, and
//! latency probes all need a time source independent of any particular
//! pump implementation — and a test harness needs to substitute a fake one.

use std::sync::Arc;
use std::time::Instant;

/// A source of monotonic nanosecond timestamps.
///
/// Implementations must be monotonic (never go backward) but need not
/// agree with wall-clock time — `k.*.sys` timestamps (§4.2) are only ever
/// compared against other timestamps from the same `Uclock`.
pub trait Uclock: Send + Sync {
    /// Current time in nanoseconds, relative to this clock's own epoch.
    fn now(&self) -> u64;
}

/// Wraps [`std::time::Instant`]; the default clock for real pipelines.
pub struct SystemUclock {
    origin: Instant,
}

impl SystemUclock {
    pub fn new() -> Arc<dyn Uclock> {
        Arc::new(SystemUclock { origin: Instant::now() })
    }
}

impl Default for SystemUclock {
    fn default() -> Self {
        SystemUclock { origin: Instant::now() }
    }
}

impl Uclock for SystemUclock {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// A clock whose value is set manually; for dejitter/latency tests that
/// need deterministic timestamps without sleeping.
pub struct ManualUclock {
    nanos: std::sync::atomic::AtomicU64,
}

impl ManualUclock {
    pub fn new(start: u64) -> Self {
        ManualUclock {
            nanos: std::sync::atomic::AtomicU64::new(start),
        }
    }

    pub fn advance(&self, delta: u64) {
        self.nanos.fetch_add(delta, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn set(&self, value: u64) {
        self.nanos.store(value, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Uclock for ManualUclock {
    fn now(&self) -> u64 {
        self.nanos.load(std::sync::atomic::Ordering::SeqCst)
    }
}
