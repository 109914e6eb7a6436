//! `xfer` probe (spec §4.3/§4.6): bridges events thrown by an inner pipe
//! living on a worker thread back to the owner thread's probe chain.
//!
//! Only pre-registered event codes are bridgeable — `SourceEnd`,
//! `ClockRef`, `NewFlowDef`, and fatal/error reports — matching the
//! source's note that `xfer` "marshals the event... only pre-registered
//! event codes are bridgeable." Anything else is left for the worker
//! thread's own chain to deal with locally.

use super::{Event, Outcome, PipeId, Uprobe};
use crossbeam_channel::Sender;

fn is_bridgeable(event: &Event) -> bool {
    matches!(
        event,
        Event::SourceEnd | Event::ClockRef { .. } | Event::NewFlowDef(_) | Event::Fatal(_) | Event::Error(_)
    )
}

/// Installed on the inner pipe's (worker-thread) probe chain. Forwards
/// bridgeable events across `sender` to the owner thread; everything
/// else is left `Unhandled` for the worker-local chain to continue
/// handling.
pub struct XferProbe {
    sender: Sender<(PipeId, Event)>,
}

impl XferProbe {
    pub fn new(sender: Sender<(PipeId, Event)>) -> Self {
        XferProbe { sender }
    }
}

impl Uprobe for XferProbe {
    fn name(&self) -> &'static str {
        "xfer"
    }

    fn catch(&self, pipe: PipeId, event: &Event) -> Outcome {
        if is_bridgeable(event) {
            // A full channel or disconnected receiver means the owner
            // side is gone; there's nothing useful to do but let the
            // worker-local chain continue handling the event itself.
            let _ = self.sender.send((pipe, event.clone()));
        }
        Outcome::Unhandled
    }
}

/// Installed on the owner thread, paired with a receiver draining the
/// channel [`XferProbe`] feeds; re-throws bridged events onto the
/// proxy's own chain. Typically driven by an idler on the owner's pump
/// (see `crate::xfer`).
pub fn drain_bridged(receiver: &crossbeam_channel::Receiver<(PipeId, Event)>, mut rethrow: impl FnMut(PipeId, Event)) {
    while let Ok((pipe, event)) = receiver.try_recv() {
        rethrow(pipe, event);
    }
}
