//! Resource-answering probes (spec §4.3): `upump_mgr`, `uref_mgr`,
//! `ubuf_mem_pool`, `uclock`. Each fulfills the matching `NEED_*` /
//! `ProvideRequest` event from a manager it was handed at construction.

use super::{Event, Outcome, PipeId, Uprobe};
use crate::udict::UdictMgr;
use crate::uclock::Uclock;
use crate::umem::Umem;
use crate::upump::PumpMgr;
use crate::urequest::{Answer, RequestKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Answers `UPUMP_MGR` requests from a cached manager. If `frozen`,
/// returns `Unhandled` so pipe construction can defer pump allocation
/// until `THAW_UPUMP_MGR` (spec §5 suspension points).
pub struct UpumpMgrProbe {
    mgr: Arc<dyn PumpMgr>,
    frozen: std::sync::atomic::AtomicBool,
}

impl UpumpMgrProbe {
    pub fn new(mgr: Arc<dyn PumpMgr>) -> Self {
        UpumpMgrProbe {
            mgr,
            frozen: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn freeze(&self) {
        self.frozen.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn thaw(&self) {
        self.frozen.store(false, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Uprobe for UpumpMgrProbe {
    fn name(&self) -> &'static str {
        "upump_mgr"
    }

    fn catch(&self, _pipe: PipeId, event: &Event) -> Outcome {
        match event {
            Event::FreezeUpumpMgr => {
                self.freeze();
                Outcome::Handled
            }
            Event::ThawUpumpMgr => {
                self.thaw();
                Outcome::Handled
            }
            Event::ProvideRequest(req) if *req.kind() == RequestKind::UpumpMgr => {
                if self.frozen.load(std::sync::atomic::Ordering::SeqCst) {
                    return Outcome::Unhandled;
                }
                match req.provide(Answer::UpumpMgr(Arc::clone(&self.mgr))) {
                    Ok(()) => Outcome::Handled,
                    Err(e) => Outcome::Error(e),
                }
            }
            _ => Outcome::Unhandled,
        }
    }
}

/// Answers `UREF_MGR` requests from a cached [`UdictMgr`] (the `uref`
/// layer has no manager of its own distinct from the dict pool).
pub struct UrefMgrProbe {
    mgr: Arc<UdictMgr>,
}

impl UrefMgrProbe {
    pub fn new(mgr: Arc<UdictMgr>) -> Self {
        UrefMgrProbe { mgr }
    }
}

impl Uprobe for UrefMgrProbe {
    fn name(&self) -> &'static str {
        "uref_mgr"
    }

    fn catch(&self, _pipe: PipeId, event: &Event) -> Outcome {
        match event {
            Event::ProvideRequest(req) if *req.kind() == RequestKind::UrefMgr => {
                match req.provide(Answer::UrefMgr(Arc::clone(&self.mgr))) {
                    Ok(()) => Outcome::Handled,
                    Err(e) => Outcome::Error(e),
                }
            }
            _ => Outcome::Unhandled,
        }
    }
}

/// Answers `UBUF_MGR(flow_format)` requests, caching one `UbufMgr` per
/// flow-format signature so repeated requests for the same format share
/// a manager (spec §10.5, grounded on `uprobe_ubuf_mem_pool.h`).
pub struct UbufMemPoolProbe {
    umem: Arc<dyn Umem>,
    pool_capacity: usize,
    cache: Mutex<HashMap<String, Arc<crate::ubuf::UbufMgr>>>,
}

impl UbufMemPoolProbe {
    pub fn new(umem: Arc<dyn Umem>, pool_capacity: usize) -> Self {
        UbufMemPoolProbe {
            umem,
            pool_capacity,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

impl Uprobe for UbufMemPoolProbe {
    fn name(&self) -> &'static str {
        "ubuf_mem_pool"
    }

    fn catch(&self, _pipe: PipeId, event: &Event) -> Outcome {
        match event {
            Event::ProvideRequest(req) => {
                if let RequestKind::UbufMgr(flow_format) = req.kind() {
                    let mut cache = self.cache.lock();
                    let mgr = cache
                        .entry(flow_format.clone())
                        .or_insert_with(|| Arc::new(crate::ubuf::UbufMgr::new(Arc::clone(&self.umem), self.pool_capacity)));
                    let mgr = Arc::clone(mgr);
                    drop(cache);
                    match req.provide(Answer::UbufMgr(mgr)) {
                        Ok(()) => Outcome::Handled,
                        Err(e) => Outcome::Error(e),
                    }
                } else {
                    Outcome::Unhandled
                }
            }
            _ => Outcome::Unhandled,
        }
    }
}

/// Answers `UCLOCK` requests from a cached clock source.
pub struct UclockProbe {
    clock: Arc<dyn Uclock>,
}

impl UclockProbe {
    pub fn new(clock: Arc<dyn Uclock>) -> Self {
        UclockProbe { clock }
    }
}

impl Uprobe for UclockProbe {
    fn name(&self) -> &'static str {
        "uclock"
    }

    fn catch(&self, _pipe: PipeId, event: &Event) -> Outcome {
        match event {
            Event::ProvideRequest(req) if *req.kind() == RequestKind::Uclock => {
                match req.provide(Answer::Uclock(Arc::clone(&self.clock))) {
                    Ok(()) => Outcome::Handled,
                    Err(e) => Outcome::Error(e),
                }
            }
            _ => Outcome::Unhandled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uclock::SystemUclock;
    use crate::umem::HeapUmem;
    use crate::upump::mgr::PollPumpMgr;
    use crate::urequest::Urequest;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn pipe() -> PipeId {
        PipeId { signature: "test", instance: 0 }
    }

    #[test]
    fn ubuf_mem_pool_caches_by_flow_format() {
        let probe = UbufMemPoolProbe::new(Arc::new(HeapUmem), 4);
        let got_a = Arc::new(Mutex::new(None));
        let got_a2 = Arc::clone(&got_a);
        let req_a = Arc::new(Urequest::new(RequestKind::UbufMgr("pic.".into()), move |answer| {
            if let Answer::UbufMgr(mgr) = answer {
                *got_a2.lock() = Some(mgr);
            }
            Ok(())
        }));
        probe.catch(pipe(), &Event::ProvideRequest(Arc::clone(&req_a)));

        let got_b = Arc::new(Mutex::new(None));
        let got_b2 = Arc::clone(&got_b);
        let req_b = Arc::new(Urequest::new(RequestKind::UbufMgr("pic.".into()), move |answer| {
            if let Answer::UbufMgr(mgr) = answer {
                *got_b2.lock() = Some(mgr);
            }
            Ok(())
        }));
        probe.catch(pipe(), &Event::ProvideRequest(Arc::clone(&req_b)));

        let a = got_a.lock().clone().unwrap();
        let b = got_b.lock().clone().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn upump_mgr_probe_frozen_returns_unhandled() {
        let probe = UpumpMgrProbe::new(Arc::new(PollPumpMgr));
        probe.freeze();
        let provided = Arc::new(AtomicBool::new(false));
        let provided2 = Arc::clone(&provided);
        let req = Arc::new(Urequest::new(RequestKind::UpumpMgr, move |_| {
            provided2.store(true, Ordering::SeqCst);
            Ok(())
        }));
        let outcome = probe.catch(pipe(), &Event::ProvideRequest(req));
        assert!(matches!(outcome, Outcome::Unhandled));
        assert!(!provided.load(Ordering::SeqCst));
    }

    #[test]
    fn uclock_probe_provides_clock() {
        let probe = UclockProbe::new(SystemUclock::new());
        let provided = Arc::new(AtomicBool::new(false));
        let provided2 = Arc::clone(&provided);
        let req = Arc::new(Urequest::new(RequestKind::Uclock, move |_| {
            provided2.store(true, Ordering::SeqCst);
            Ok(())
        }));
        let outcome = probe.catch(pipe(), &Event::ProvideRequest(req));
        assert!(matches!(outcome, Outcome::Handled));
        assert!(provided.load(Ordering::SeqCst));
    }
}
