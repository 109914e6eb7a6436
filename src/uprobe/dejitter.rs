//! `dejitter` probe (spec §4.3): on `CLOCK_REF(cr_prog, cr_sys)` events,
//! maintains an exponential moving average of the `prog → sys` clock
//! mapping with a configurable divider, then adjusts subsequent
//! timestamps accordingly.
//!
//! Open question (b) from spec §9: whether `cr_sys` originates from the
//! worker thread that produced the source's data or the owner thread
//! that eventually sees the bridged event. This probe assumes the value
//! it's handed is already in the domain the caller wants compared
//! against — the dejitter math here only ever compares `cr_sys` values
//! that arrive through the *same* probe instance, so consistently using
//! whichever thread throws `CLOCK_REF` (documented as the worker thread,
//! matching the source's own sampling point) keeps the average
//! internally consistent regardless of which domain a caller picks. See
//! `DESIGN.md` for the recorded decision.

use super::{Event, Outcome, PipeId, Uprobe};
use parking_lot::Mutex;

struct State {
    /// Current `prog → sys` offset estimate (`sys - prog`), in the same
    /// units as the input timestamps (nanoseconds here).
    offset: i64,
    initialized: bool,
}

/// `divider` controls the averaging window: the new sample contributes
/// `1/divider` of the update, mirroring the source's configurable
/// exponential-average divider.
pub struct DejitterProbe {
    divider: u32,
    state: Mutex<State>,
}

impl DejitterProbe {
    pub fn new(divider: u32) -> Self {
        assert!(divider > 0, "dejitter divider must be nonzero");
        DejitterProbe {
            divider,
            state: Mutex::new(State {
                offset: 0,
                initialized: false,
            }),
        }
    }

    /// Current `sys = prog + offset` estimate.
    pub fn offset(&self) -> i64 {
        self.state.lock().offset
    }

    /// Map a `prog`-domain timestamp into `sys` domain using the current
    /// estimate.
    pub fn adjust(&self, prog: u64) -> u64 {
        (prog as i64 + self.offset()) as u64
    }

    fn observe(&self, cr_prog: u64, cr_sys: u64) {
        let sample = cr_sys as i64 - cr_prog as i64;
        let mut state = self.state.lock();
        if !state.initialized {
            state.offset = sample;
            state.initialized = true;
        } else {
            // Exponential moving average: offset += (sample - offset) / divider.
            state.offset += (sample - state.offset) / self.divider as i64;
        }
    }
}

impl Uprobe for DejitterProbe {
    fn name(&self) -> &'static str {
        "dejitter"
    }

    fn catch(&self, _pipe: PipeId, event: &Event) -> Outcome {
        match event {
            Event::ClockRef { cr_prog, cr_sys } => {
                self.observe(*cr_prog, *cr_sys);
                Outcome::Unhandled
            }
            _ => Outcome::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipe() -> PipeId {
        PipeId { signature: "test", instance: 0 }
    }

    #[test]
    fn first_sample_sets_offset_exactly() {
        let probe = DejitterProbe::new(8);
        probe.catch(pipe(), &Event::ClockRef { cr_prog: 1000, cr_sys: 1500 });
        assert_eq!(probe.offset(), 500);
        assert_eq!(probe.adjust(2000), 2500);
    }

    #[test]
    fn subsequent_samples_average_toward_new_value() {
        let probe = DejitterProbe::new(4);
        probe.catch(pipe(), &Event::ClockRef { cr_prog: 0, cr_sys: 0 });
        assert_eq!(probe.offset(), 0);
        // sample offset is 100; moves 1/4 of the way from 0.
        probe.catch(pipe(), &Event::ClockRef { cr_prog: 1000, cr_sys: 1100 });
        assert_eq!(probe.offset(), 25);
    }
}
