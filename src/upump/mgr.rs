//! `poll(2)`-based [`Pump`] implementation.
//!
//! Timers ride `timerfd`, signals ride `signalfd`; both end up as regular
//! readable file descriptors, so the whole loop boils down to one
//! `poll()` call per iteration plus a dispatch pass. This mirrors the
//! "everything is a readable fd" discipline a sleep-based thread loop
//! only approximates with a fixed polling interval, but without that
//! fixed interval — readiness is exact and blocking.

use super::{Callback, Pump, PumpMgr, WatchId};
use crate::error::{Result, UpipeError};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::sys::signal::{SigSet, Signal};
use nix::sys::signalfd::SignalFd;
use nix::sys::timerfd::{ClockId, Expiration, TimerFd, TimerFlags, TimerSetTimeFlags};
use std::collections::HashMap;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

enum Source {
    Timer {
        timerfd: TimerFd,
        repeat: bool,
        callback: Callback,
    },
    FdRead {
        fd: RawFd,
        callback: Callback,
    },
    FdWrite {
        fd: RawFd,
        callback: Callback,
    },
    Signal {
        signalfd: SignalFd,
        callback: Callback,
    },
}

impl Source {
    fn raw_fd(&self) -> RawFd {
        match self {
            Source::Timer { timerfd, .. } => timerfd.as_fd().as_raw_fd(),
            Source::FdRead { fd, .. } => *fd,
            Source::FdWrite { fd, .. } => *fd,
            Source::Signal { signalfd, .. } => signalfd.as_fd().as_raw_fd(),
        }
    }

    fn poll_flags(&self) -> PollFlags {
        match self {
            Source::FdWrite { .. } => PollFlags::POLLOUT,
            _ => PollFlags::POLLIN,
        }
    }
}

/// A single-threaded, `poll`-based event loop.
pub struct PollPump {
    sources: HashMap<WatchId, Source>,
    idlers: HashMap<WatchId, Callback>,
    next_id: u64,
}

impl PollPump {
    pub fn new() -> Self {
        PollPump {
            sources: HashMap::new(),
            idlers: HashMap::new(),
            next_id: 1,
        }
    }

    fn alloc_id(&mut self) -> WatchId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl Default for PollPump {
    fn default() -> Self {
        Self::new()
    }
}

impl Pump for PollPump {
    fn add_timer(&mut self, delay: Duration, repeat: Option<Duration>, callback: Callback) -> Result<WatchId> {
        let timerfd = TimerFd::new(ClockId::CLOCK_MONOTONIC, TimerFlags::TFD_NONBLOCK)
            .map_err(|e| UpipeError::Upump(format!("timerfd create failed: {e}")))?;
        let expiration = match repeat {
            Some(interval) => Expiration::IntervalDelayed(delay, interval),
            None => Expiration::OneShot(delay),
        };
        timerfd
            .set(expiration, TimerSetTimeFlags::empty())
            .map_err(|e| UpipeError::Upump(format!("timerfd arm failed: {e}")))?;
        let id = self.alloc_id();
        self.sources.insert(
            id,
            Source::Timer {
                timerfd,
                repeat: repeat.is_some(),
                callback,
            },
        );
        Ok(id)
    }

    fn add_fd_read(&mut self, fd: RawFd, callback: Callback) -> Result<WatchId> {
        let id = self.alloc_id();
        self.sources.insert(id, Source::FdRead { fd, callback });
        Ok(id)
    }

    fn add_fd_write(&mut self, fd: RawFd, callback: Callback) -> Result<WatchId> {
        let id = self.alloc_id();
        self.sources.insert(id, Source::FdWrite { fd, callback });
        Ok(id)
    }

    fn add_signal(&mut self, signal: Signal, callback: Callback) -> Result<WatchId> {
        let mut mask = SigSet::empty();
        mask.add(signal);
        mask.thread_block()
            .map_err(|e| UpipeError::Upump(format!("sigprocmask failed: {e}")))?;
        let signalfd = SignalFd::new(&mask).map_err(|e| UpipeError::Upump(format!("signalfd create failed: {e}")))?;
        let id = self.alloc_id();
        self.sources.insert(id, Source::Signal { signalfd, callback });
        Ok(id)
    }

    fn add_idler(&mut self, callback: Callback) -> WatchId {
        let id = self.alloc_id();
        self.idlers.insert(id, callback);
        id
    }

    fn remove(&mut self, id: WatchId) -> bool {
        self.sources.remove(&id).is_some() || self.idlers.remove(&id).is_some()
    }

    fn run_until_empty(&mut self) -> Result<()> {
        loop {
            for callback in self.idlers.values_mut() {
                callback();
            }
            if self.sources.is_empty() && self.idlers.is_empty() {
                return Ok(());
            }
            if self.sources.is_empty() {
                // Only idlers remain; keep spinning them without blocking.
                continue;
            }

            let ids: Vec<WatchId> = self.sources.keys().copied().collect();
            let mut pollfds = Vec::with_capacity(ids.len());
            for id in &ids {
                let src = &self.sources[id];
                // SAFETY: the fd stays valid for the duration of this
                // `poll` call; sources aren't mutated until dispatch below.
                let borrowed = unsafe { BorrowedFd::borrow_raw(src.raw_fd()) };
                pollfds.push(PollFd::new(borrowed, src.poll_flags()));
            }

            let timeout = if self.idlers.is_empty() {
                PollTimeout::NONE
            } else {
                PollTimeout::ZERO
            };
            let ready = poll(&mut pollfds, timeout).map_err(|e| UpipeError::Upump(format!("poll failed: {e}")))?;
            if ready <= 0 {
                continue;
            }

            let mut fired = Vec::new();
            for (pollfd, id) in pollfds.iter().zip(ids.iter()) {
                if let Some(revents) = pollfd.revents() {
                    if !revents.is_empty() {
                        fired.push(*id);
                    }
                }
            }

            for id in fired {
                let remove_after = match self.sources.get_mut(&id) {
                    Some(Source::Timer { timerfd, repeat, callback }) => {
                        let _ = timerfd.wait();
                        callback();
                        !*repeat
                    }
                    Some(Source::FdRead { callback, .. }) | Some(Source::FdWrite { callback, .. }) => {
                        callback();
                        false
                    }
                    Some(Source::Signal { signalfd, callback }) => {
                        let _ = signalfd.read_signal();
                        callback();
                        false
                    }
                    None => false,
                };
                if remove_after {
                    self.sources.remove(&id);
                }
            }
        }
    }
}

/// Allocates [`PollPump`]s.
#[derive(Debug, Default)]
pub struct PollPumpMgr;

impl PumpMgr for PollPumpMgr {
    fn alloc(&self) -> Box<dyn Pump> {
        Box::new(PollPump::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn one_shot_timer_fires_once() {
        let mut pump = PollPump::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        pump.add_timer(
            Duration::from_millis(1),
            None,
            Box::new(move || {
                count2.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        pump.run_until_empty().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn idler_runs_and_can_self_remove() {
        let mut pump = PollPump::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let id = pump.add_idler(Box::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        }));
        // Run a few iterations manually by giving it a one-shot timer to
        // bound the loop, then removing the idler before the timer fires.
        let mut iterations = 0;
        pump.add_timer(
            Duration::from_millis(5),
            None,
            Box::new(move || {
                iterations += 1;
            }),
        )
        .unwrap();
        // Remove the idler immediately: run_until_empty should still
        // terminate once the timer fires, since the idler is gone.
        pump.remove(id);
        pump.run_until_empty().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
