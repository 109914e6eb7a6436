//! Scenario 5 (spec §8), end to end: a demux-like pipe throws `NewFlow`
//! for each flow it finds, a `selflow` probe configured for the sound
//! family decides which ones to accept, and an `UpipeMgr` allocates
//! exactly one subpipe for the one it picks.
//!
//! The probe only ever sees flows the demux itself has already filtered
//! to the family it cares about — matching the "flow definition as a
//! dot-separated string, use `starts_with`" design note rather than
//! teaching `selflow` about family tags.

use parking_lot::Mutex;
use std::sync::Arc;
use upipe_rt::error::{Result, UpipeError};
use upipe_rt::upipe::{Command, CommandReply, PipeHandle, Upipe, UpipeMgr};
use upipe_rt::uprobe::selflow::SelflowProbe;
use upipe_rt::uprobe::{Chain, Event, PipeId};
use upipe_rt::uref::Uref;

struct AudioSub;

impl Upipe for AudioSub {
    fn signature(&self) -> &'static str {
        "asub"
    }
    fn input(&mut self, _uref: Uref) {}
    fn control(&mut self, _command: Command) -> Result<CommandReply> {
        Err(UpipeError::Unhandled)
    }
}

struct AudioSubMgr;

impl UpipeMgr for AudioSubMgr {
    fn signature(&self) -> &'static str {
        "asub"
    }
    fn alloc(&self, _probe: Chain) -> Result<PipeHandle> {
        Ok(Arc::new(Mutex::new(AudioSub)))
    }
}

fn is_sound_flow(flow_def: &str) -> bool {
    flow_def.starts_with("sound.")
}

#[test]
fn auto_selflow_produces_exactly_one_subpipe_for_the_sound_family() {
    let mgr = AudioSubMgr;
    let subs: Arc<Mutex<Vec<PipeHandle>>> = Arc::new(Mutex::new(Vec::new()));
    let accepted_ids: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

    let subs_for_cb = Arc::clone(&subs);
    let ids_for_cb = Arc::clone(&accepted_ids);
    let probe = Arc::new(SelflowProbe::new("auto", move |flow_id, _flow_def| {
        ids_for_cb.lock().push(flow_id);
        let sub = mgr.alloc(Chain::new()).expect("subpipe alloc never fails in this manager");
        subs_for_cb.lock().push(sub);
    }));

    let chain = Chain::new().append(probe);
    let pipe_id = PipeId { signature: "demux", instance: 1 };

    // Demux emits ids {1=video, 2=audio, 3=audio}; only audio-family
    // flows ever reach the probe.
    let flows = [(1u64, "pic.sub.yuv420p."), (2, "sound.s16le."), (3, "sound.s16le.")];
    for (flow_id, flow_def) in flows {
        if is_sound_flow(flow_def) {
            chain.throw(pipe_id, Event::NewFlow { flow_id, flow_def: flow_def.to_string() });
        }
    }

    assert_eq!(*accepted_ids.lock(), vec![2]);
    assert_eq!(subs.lock().len(), 1);
}
