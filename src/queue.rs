//! Queue pipes (L7): the only primitive that legally carries a `uref`
//! across threads (spec §4.5/§5).
//!
//! A queue is a bounded SPSC FIFO split into a producer [`QSink`] and
//! consumer [`QSrc`]. `crossbeam-channel`'s bounded channel already gives
//! the atomic-counter-pair SPSC behavior the source hand-rolls; back-
//! pressure is layered on top via the input-hold idiom (spec scenario 3):
//! a full queue holds the producer's `uref` and expects the owning pipe
//! to retry once the consumer has drained at least one slot.

use crate::error::Result;
use crate::upipe::helpers::InputHold;
use crate::upipe::{Command, CommandReply, PipeHandle, Upipe};
use crate::uref::Uref;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// Construct a queue of `capacity` urefs, returning its sink and source
/// halves.
pub fn new_queue(capacity: usize) -> (QSink, QSrc) {
    let (tx, rx) = bounded(capacity);
    (QSink { sender: tx, hold: InputHold::new() }, QSrc { receiver: rx, output: None })
}

/// Producer side. `input` enqueues; on a full queue it holds the uref
/// (spec scenario 3: "fifth push triggers input-hold... running the
/// consumer drains all in order").
pub struct QSink {
    sender: Sender<Uref>,
    hold: InputHold,
}

impl QSink {
    /// `true` while a push is being held for lack of queue space.
    pub fn is_holding(&self) -> bool {
        self.hold.is_holding()
    }

    /// Attempt to push every held uref into the queue, stopping at the
    /// first one that still doesn't fit (preserving order). Call this
    /// after the consumer is known to have freed at least one slot.
    pub fn retry(&mut self) {
        let sender = &self.sender;
        let mut remaining = Vec::new();
        self.hold.drain(|uref| {
            if !remaining.is_empty() {
                remaining.push(uref);
                return;
            }
            if let Err(TrySendError::Full(uref)) = sender.try_send(uref) {
                remaining.push(uref);
            }
        });
        for uref in remaining {
            self.hold.hold(uref, None);
        }
    }
}

impl Upipe for QSink {
    fn signature(&self) -> &'static str {
        "qsnk"
    }

    fn input(&mut self, uref: Uref) {
        if self.hold.is_holding() {
            // Preserve FIFO: don't let a fresh push jump ahead of
            // already-held urefs.
            self.hold.hold(uref, None);
            return;
        }
        match self.sender.try_send(uref) {
            Ok(()) => {}
            Err(TrySendError::Full(uref)) => self.hold.hold(uref, None),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    fn control(&mut self, command: Command) -> Result<CommandReply> {
        match command {
            Command::Flush => {
                self.hold.flush();
                Ok(CommandReply::None)
            }
            _ => Err(crate::error::UpipeError::Unhandled),
        }
    }
}

/// Consumer side. Not fed via [`Upipe::input`] directly — a pump
/// watching the receiver's readiness (or an idler, for implementations
/// without a channel fd) calls [`QSrc::dispatch`] to pull one uref and
/// hand it to `output`.
pub struct QSrc {
    receiver: Receiver<Uref>,
    output: Option<PipeHandle>,
}

impl QSrc {
    /// Dequeue and feed one uref to `output`, if any is waiting. Returns
    /// `true` if a uref was dispatched.
    pub fn dispatch(&mut self) -> bool {
        match self.receiver.try_recv() {
            Ok(uref) => {
                if let Some(output) = &self.output {
                    output.lock().input(uref);
                }
                true
            }
            Err(_) => false,
        }
    }

    /// Drain everything currently queued, in order.
    pub fn drain_all(&mut self) -> usize {
        let mut count = 0;
        while self.dispatch() {
            count += 1;
        }
        count
    }
}

impl Upipe for QSrc {
    fn signature(&self) -> &'static str {
        "qsrc"
    }

    fn input(&mut self, _uref: Uref) {
        // QSrc has no upstream of its own; it's driven by `dispatch`.
    }

    fn control(&mut self, command: Command) -> Result<CommandReply> {
        match command {
            Command::SetOutput(output) => {
                self.output = Some(output);
                Ok(CommandReply::None)
            }
            Command::GetOutput => Ok(CommandReply::Output(self.output.clone())),
            _ => Err(crate::error::UpipeError::Unhandled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udict::{UdictRef, Value};
    use crate::uref::Uref;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct RecordingSink(Vec<u64>);
    impl Upipe for RecordingSink {
        fn signature(&self) -> &'static str {
            "rec_"
        }
        fn input(&mut self, uref: Uref) {
            self.0.push(uref.dict().get_u64("seq").unwrap());
        }
        fn control(&mut self, _command: Command) -> Result<CommandReply> {
            Err(crate::error::UpipeError::Unhandled)
        }
    }

    fn tagged(seq: u64) -> Uref {
        let mut dict = UdictRef::new();
        dict.make_mut().set("seq", Value::U64(seq));
        Uref::new_control(dict)
    }

    #[test]
    fn fifo_order_is_preserved_under_back_pressure() {
        let (mut sink, mut src) = new_queue(4);
        let recording: Arc<Mutex<RecordingSink>> = Arc::new(Mutex::new(RecordingSink(Vec::new())));
        let recording_handle: PipeHandle = recording.clone();
        src.control(Command::SetOutput(recording_handle)).unwrap();

        for seq in 0..10u64 {
            sink.input(tagged(seq));
        }
        // Queue capacity 4: the 5th push (seq=4) onward must be held.
        assert!(sink.is_holding());

        for _ in 0..10 {
            src.drain_all();
            sink.retry();
        }
        assert!(!sink.is_holding());

        let order = recording.lock().0.clone();
        assert_eq!(order, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn flush_drops_held_urefs() {
        let (mut sink, _src) = new_queue(1);
        sink.input(tagged(0));
        sink.input(tagged(1));
        assert!(sink.is_holding());
        sink.control(Command::Flush).unwrap();
        assert!(!sink.is_holding());
    }
}
