//! Event pump (L3): a platform-neutral event-loop binding.
//!
//! Per the design notes, `libev`-style custom loop bindings are modeled as
//! a `Pump` trait rather than wrapping a specific event-loop library.
//! [`mgr::PollPump`] is the one concrete implementation, built on
//! `poll(2)` plus `timerfd`/`signalfd` so timers and signals multiplex
//! through the same readiness set as file descriptors — no separate
//! timer-wheel or signal-handling path to keep in sync.

pub mod mgr;

use crate::error::Result;
use std::os::fd::RawFd;
use std::time::Duration;

/// Opaque handle returned by every `add_*` method; pass it to
/// [`Pump::remove`] to cancel a watch before it fires.
pub type WatchId = u64;

/// A callback invoked when a watched event fires. Boxed and `Send` because
/// pumps themselves are confined to one thread but the closures that
/// populate them are often built on another (e.g. during pipe
/// construction before the pipe has been handed to its worker thread).
pub type Callback = Box<dyn FnMut() + Send>;

/// An event-loop binding: timers, fd readiness, signals, and idle work,
/// all driven by [`Pump::run_until_empty`].
///
/// Exactly one `Pump` belongs to each worker thread (§5): pipes never
/// touch another thread's pump directly, only through `xfer` proxies.
pub trait Pump {
    /// Fire `callback` once after `delay`, then every `repeat` interval if
    /// given, until removed.
    fn add_timer(&mut self, delay: Duration, repeat: Option<Duration>, callback: Callback) -> Result<WatchId>;

    /// Fire `callback` whenever `fd` is readable.
    fn add_fd_read(&mut self, fd: RawFd, callback: Callback) -> Result<WatchId>;

    /// Fire `callback` whenever `fd` is writable.
    fn add_fd_write(&mut self, fd: RawFd, callback: Callback) -> Result<WatchId>;

    /// Fire `callback` whenever `signal` is delivered to this thread.
    /// Implementations are expected to block the signal from its default
    /// disposition and deliver it only through the pump (the `signalfd`
    /// idiom).
    fn add_signal(&mut self, signal: nix::sys::signal::Signal, callback: Callback) -> Result<WatchId>;

    /// Fire `callback` once per loop iteration, unconditionally. Used for
    /// draining internal queues that don't have their own fd/timer.
    fn add_idler(&mut self, callback: Callback) -> WatchId;

    /// Cancel a previously added watch. Returns `false` if `id` was
    /// unknown (already fired and non-repeating, or already removed).
    fn remove(&mut self, id: WatchId) -> bool;

    /// Run the loop until no watches remain (all timers one-shot and
    /// fired, all idlers and fd/signal watches removed).
    fn run_until_empty(&mut self) -> Result<()>;
}

/// Allocates [`Pump`]s bound to one event-loop implementation. A worker
/// thread calls `alloc` once at startup (see the `pthread_upump_mgr`
/// probe, which caches the result per thread).
pub trait PumpMgr: Send + Sync {
    fn alloc(&self) -> Box<dyn Pump>;
}
