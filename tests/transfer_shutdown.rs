//! Scenario 4 (spec §8): build a source-like pipe on a worker thread via
//! the transfer runtime, release the owner's proxy, and confirm the
//! worker observes the final drop and the manager's own `Drop` joins
//! the thread without hanging.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use upipe_rt::error::{Result, UpipeError};
use upipe_rt::uprobe::pthread_upump_mgr::PthreadUpumpMgrProbe;
use upipe_rt::upipe::{Command, CommandReply, PipeHandle, Upipe};
use upipe_rt::upump::mgr::PollPumpMgr;
use upipe_rt::upump::PumpMgr;
use upipe_rt::uref::Uref;
use upipe_rt::xfer::XferMgr;

/// A source stand-in whose `Drop` records which thread ran it.
struct TracksDrop {
    dropped: Arc<AtomicBool>,
}

impl Upipe for TracksDrop {
    fn signature(&self) -> &'static str {
        "src_"
    }
    fn input(&mut self, _uref: Uref) {}
    fn control(&mut self, _command: Command) -> Result<CommandReply> {
        Err(UpipeError::Unhandled)
    }
}

impl Drop for TracksDrop {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[test]
fn proxy_release_runs_final_drop_on_worker_and_join_completes() {
    let dropped = Arc::new(AtomicBool::new(false));
    let inner: PipeHandle = Arc::new(Mutex::new(TracksDrop { dropped: Arc::clone(&dropped) }));

    let pthread_probe = Arc::new(PthreadUpumpMgrProbe::new());
    let mgr = XferMgr::new("shutdown-test", 4, || Arc::new(PollPumpMgr) as Arc<dyn PumpMgr>, pthread_probe)
        .expect("spawn worker thread");
    let proxy = mgr.xfer_alloc(inner, upipe_rt::uprobe::Chain::new());

    // Releasing the owner's only strong reference to the inner pipe
    // should hand the final drop to the worker thread rather than
    // running it here.
    drop(proxy);
    assert!(!dropped.load(Ordering::SeqCst), "drop should not yet have run on this thread");

    // `XferMgr::drop` sends an explicit shutdown item and joins the
    // worker thread; by the time it returns, every command queued ahead
    // of it (including the proxy's final-drop closure) has been applied.
    drop(mgr);
    assert!(dropped.load(Ordering::SeqCst), "worker thread should have run the final drop before exiting");
}
