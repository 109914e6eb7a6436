//! Cross-cutting idioms reused by every concrete pipe implementation
//! (spec §4.4, misc row of §2's layer table): input-hold/blocker,
//! subpipe super/sub back-pointers, and output-request proxying.
//!
//! These were macro-generated helpers in the source; the design notes
//! call for generic traits/structs parameterized by the state fields
//! they touch instead of token-pasted per-pipe macros, which is what
//! each of these is.

use super::PipeHandle;
use crate::uref::Uref;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};

/// Released when the obstruction a pipe held input for has cleared.
/// Concrete pumps hand out an implementation that un-suspends whichever
/// fd/timer watch was feeding the blocked pipe; tests can use a no-op.
pub trait PumpBlocker: Send {
    fn release(&mut self);
}

/// A blocker that does nothing; used where a pipe holds input without a
/// real pump in the loop (unit tests, or a pipe fed synchronously).
pub struct NullBlocker;
impl PumpBlocker for NullBlocker {
    fn release(&mut self) {}
}

/// The input-hold idiom (spec §4.4): a pipe that cannot process an
/// incoming `uref` right now appends it here and installs a blocker on
/// the producer's pump; when the obstruction clears, [`drain`] replays
/// the held urefs in FIFO order and releases the blocker.
///
/// [`drain`]: InputHold::drain
#[derive(Default)]
pub struct InputHold {
    held: VecDeque<Uref>,
    blocker: Option<Box<dyn PumpBlocker>>,
}

impl InputHold {
    pub fn new() -> Self {
        InputHold { held: VecDeque::new(), blocker: None }
    }

    /// `true` while there are held urefs (equivalently: while the
    /// producer should be considered blocked).
    pub fn is_holding(&self) -> bool {
        !self.held.is_empty()
    }

    /// Append `uref` to the held list. `blocker`, if given, replaces any
    /// previously installed blocker (the first hold in a batch is
    /// normally the one that installs it).
    pub fn hold(&mut self, uref: Uref, blocker: Option<Box<dyn PumpBlocker>>) {
        if blocker.is_some() {
            self.blocker = blocker;
        }
        self.held.push_back(uref);
    }

    /// Replay held urefs in FIFO order via `feed`, then release the
    /// blocker. If `feed` needs to re-hold (the obstruction hasn't fully
    /// cleared), it can call [`hold`](Self::hold) again from within the
    /// loop — already-drained entries won't reappear.
    pub fn drain(&mut self, mut feed: impl FnMut(Uref)) {
        while let Some(uref) = self.held.pop_front() {
            feed(uref);
        }
        if let Some(mut blocker) = self.blocker.take() {
            blocker.release();
        }
    }

    /// Drop all held urefs without feeding them (the `FLUSH` command,
    /// spec §9 open question (a): "drop held, do not propagate").
    pub fn flush(&mut self) {
        self.held.clear();
        if let Some(mut blocker) = self.blocker.take() {
            blocker.release();
        }
    }
}

/// Weak back-pointer from a subpipe to its superpipe (spec P3: subpipes
/// share the superpipe's lifetime; the superpipe holds strong references
/// to its subs, subs hold weak references back, so the pair can't form a
/// reference cycle).
#[derive(Clone)]
pub struct SuperRef(Weak<Mutex<dyn super::Upipe>>);

impl SuperRef {
    pub fn new(super_pipe: &PipeHandle) -> Self {
        SuperRef(Arc::downgrade(super_pipe))
    }

    /// Upgrade to a strong handle, if the superpipe is still alive.
    pub fn upgrade(&self) -> Option<PipeHandle> {
        self.0.upgrade()
    }
}

/// An ordered list of subpipes sharing their superpipe's lifetime,
/// supporting deterministic `ITERATE_SUB` (spec §4.4).
#[derive(Default)]
pub struct SubList {
    subs: Vec<PipeHandle>,
}

impl SubList {
    pub fn new() -> Self {
        SubList { subs: Vec::new() }
    }

    pub fn push(&mut self, sub: PipeHandle) {
        self.subs.push(sub);
    }

    pub fn remove(&mut self, target: &PipeHandle) {
        self.subs.retain(|sub| !Arc::ptr_eq(sub, target));
    }

    pub fn iter(&self) -> impl Iterator<Item = &PipeHandle> {
        self.subs.iter()
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udict::UdictRef;

    #[test]
    fn hold_then_drain_replays_in_fifo_order() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting(Arc<AtomicUsize>);
        impl PumpBlocker for Counting {
            fn release(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut hold = InputHold::new();
        let released = Arc::new(AtomicUsize::new(0));
        hold.hold(Uref::new_control(UdictRef::new()), Some(Box::new(Counting(Arc::clone(&released)))));
        hold.hold(Uref::new_control(UdictRef::new()), None);
        assert!(hold.is_holding());

        let mut order = Vec::new();
        hold.drain(|_uref| order.push(()));
        assert_eq!(order.len(), 2);
        assert!(!hold.is_holding());
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn flush_drops_held_without_feeding() {
        let mut hold = InputHold::new();
        hold.hold(Uref::new_control(UdictRef::new()), None);
        hold.flush();
        let mut fed = false;
        hold.drain(|_| fed = true);
        assert!(!fed);
    }

    #[test]
    fn super_ref_upgrades_while_alive_and_fails_after_drop() {
        use super::super::{Command, CommandReply, Upipe};
        use crate::error::{Result, UpipeError};

        struct Dummy;
        impl Upipe for Dummy {
            fn signature(&self) -> &'static str {
                "dumy"
            }
            fn input(&mut self, _uref: Uref) {}
            fn control(&mut self, _command: Command) -> Result<CommandReply> {
                Err(UpipeError::Unhandled)
            }
        }

        let strong: PipeHandle = Arc::new(Mutex::new(Dummy));
        let weak = SuperRef::new(&strong);
        assert!(weak.upgrade().is_some());
        drop(strong);
        assert!(weak.upgrade().is_none());
    }
}
