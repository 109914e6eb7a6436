//! `pthread_upump_mgr` probe (spec §4.3/§4.6): a thread-local pump
//! manager cache. Each worker thread started by a transfer manager calls
//! [`PthreadUpumpMgrProbe::set`] once at startup (mirroring the real
//! pump's `alloc` call on the worker) so the generic `NEED_UPUMP_MGR`
//! resolution works the same whether a pipe lives on the owner thread or
//! a worker thread.

use super::{Event, Outcome, PipeId, Uprobe};
use crate::upump::PumpMgr;
use crate::urequest::{Answer, RequestKind};
use std::cell::RefCell;
use std::sync::Arc;

thread_local! {
    static LOCAL_MGR: RefCell<Option<Arc<dyn PumpMgr>>> = const { RefCell::new(None) };
}

/// Answers `UPUMP_MGR` requests from whichever manager was `set` on the
/// calling thread. Unlike [`super::resource_mgrs::UpumpMgrProbe`], which
/// holds one fixed manager, this probe holds none itself — it reads
/// thread-local state, so the same probe instance (shared across the
/// probe chain regardless of which thread's pipe throws the event)
/// answers differently per thread.
#[derive(Default)]
pub struct PthreadUpumpMgrProbe;

impl PthreadUpumpMgrProbe {
    pub fn new() -> Self {
        PthreadUpumpMgrProbe
    }

    /// Install `mgr` as this thread's pump manager. Called once per
    /// worker thread at startup.
    pub fn set(&self, mgr: Arc<dyn PumpMgr>) {
        LOCAL_MGR.with(|cell| *cell.borrow_mut() = Some(mgr));
    }

    pub fn clear(&self) {
        LOCAL_MGR.with(|cell| *cell.borrow_mut() = None);
    }
}

impl Uprobe for PthreadUpumpMgrProbe {
    fn name(&self) -> &'static str {
        "pthread_upump_mgr"
    }

    fn catch(&self, _pipe: PipeId, event: &Event) -> Outcome {
        match event {
            Event::ProvideRequest(req) if *req.kind() == RequestKind::UpumpMgr => {
                let mgr = LOCAL_MGR.with(|cell| cell.borrow().clone());
                match mgr {
                    Some(mgr) => match req.provide(Answer::UpumpMgr(mgr)) {
                        Ok(()) => Outcome::Handled,
                        Err(e) => Outcome::Error(e),
                    },
                    None => Outcome::Unhandled,
                }
            }
            _ => Outcome::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upump::mgr::PollPumpMgr;
    use crate::urequest::Urequest;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn unset_thread_leaves_request_unhandled() {
        let probe = PthreadUpumpMgrProbe::new();
        let req = Arc::new(Urequest::new(RequestKind::UpumpMgr, |_| Ok(())));
        let pipe = PipeId { signature: "test", instance: 0 };
        let outcome = probe.catch(pipe, &Event::ProvideRequest(req));
        assert!(matches!(outcome, Outcome::Unhandled));
    }

    #[test]
    fn set_thread_answers_request() {
        let probe = PthreadUpumpMgrProbe::new();
        probe.set(Arc::new(PollPumpMgr));
        let provided = Arc::new(AtomicBool::new(false));
        let provided2 = Arc::clone(&provided);
        let req = Arc::new(Urequest::new(RequestKind::UpumpMgr, move |_| {
            provided2.store(true, Ordering::SeqCst);
            Ok(())
        }));
        let pipe = PipeId { signature: "test", instance: 0 };
        let outcome = probe.catch(pipe, &Event::ProvideRequest(req));
        assert!(matches!(outcome, Outcome::Handled));
        assert!(provided.load(Ordering::SeqCst));
        probe.clear();
    }
}
