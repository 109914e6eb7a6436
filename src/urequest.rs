//! Resource request (L5): a typed, asynchronous ask that travels the
//! probe chain until some probe can answer it.
//!
//! A pipe builds a [`Urequest`], wraps it in [`Event::ProvideRequest`]
//! and throws it. Whichever probe can answer calls [`Urequest::provide`]
//! with the matching [`Answer`] variant; if the answer can change later
//! (sink latency, in particular) the same request is provided again.

use crate::error::{Result, UpipeError};
use parking_lot::Mutex;

/// What's being asked for. `UbufMgr` carries the flow format string the
/// requester needs a manager for, so probes that cache one manager per
/// format (the `ubuf_mem_pool` probe) can key on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    UrefMgr,
    UbufMgr(String),
    UpumpMgr,
    Uclock,
    FlowFormat,
    SinkLatency,
}

/// The value delivered to a request's callback. Kept deliberately thin —
/// this crate doesn't know about concrete `UbufMgr`/`Uclock` types at the
/// `urequest` layer, so managers are handed back as type-erased `Arc`s
/// the requester downcasts, except for the plain-data answers
/// (flow format, latency) which carry their value directly.
pub enum Answer {
    UrefMgr(std::sync::Arc<crate::udict::UdictMgr>),
    UbufMgr(std::sync::Arc<crate::ubuf::UbufMgr>),
    UpumpMgr(std::sync::Arc<dyn crate::upump::PumpMgr>),
    Uclock(std::sync::Arc<dyn crate::uclock::Uclock>),
    FlowFormat(String),
    SinkLatency(u64),
}

type ProvideFn = dyn FnMut(Answer) -> Result<()> + Send;

/// An in-flight resource request. `provide` may run more than once (e.g.
/// `SinkLatency` changing), each time invoking the requester's callback.
pub struct Urequest {
    kind: RequestKind,
    callback: Mutex<Box<ProvideFn>>,
    provided: std::sync::atomic::AtomicBool,
}

impl Urequest {
    pub fn new(kind: RequestKind, callback: impl FnMut(Answer) -> Result<()> + Send + 'static) -> Self {
        Urequest {
            kind,
            callback: Mutex::new(Box::new(callback)),
            provided: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn kind(&self) -> &RequestKind {
        &self.kind
    }

    pub fn is_provided(&self) -> bool {
        self.provided.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Deliver `answer` to the requester. Returns `Invalid` if `answer`'s
    /// variant doesn't match this request's `kind`.
    pub fn provide(&self, answer: Answer) -> Result<()> {
        if !kind_matches(&self.kind, &answer) {
            return Err(UpipeError::Invalid("answer kind does not match request kind".into()));
        }
        let mut callback = self.callback.lock();
        callback(answer)?;
        self.provided.store(true, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

fn kind_matches(kind: &RequestKind, answer: &Answer) -> bool {
    matches!(
        (kind, answer),
        (RequestKind::UrefMgr, Answer::UrefMgr(_))
            | (RequestKind::UbufMgr(_), Answer::UbufMgr(_))
            | (RequestKind::UpumpMgr, Answer::UpumpMgr(_))
            | (RequestKind::Uclock, Answer::Uclock(_))
            | (RequestKind::FlowFormat, Answer::FlowFormat(_))
            | (RequestKind::SinkLatency, Answer::SinkLatency(_))
    )
}

/// An output-request proxy (spec §4.4 "output-request proxying"): a pipe
/// that can't answer a request itself but can ask its output to, wraps
/// the original request in one of these. The proxy's `provide` simply
/// re-provides onto the original request; dropping it is what
/// `UNREGISTER_REQUEST` does to tear the forwarding down.
pub struct ProxyRequest {
    inner: std::sync::Arc<Urequest>,
}

impl ProxyRequest {
    pub fn new(original_kind: RequestKind, original: std::sync::Arc<Urequest>) -> (Self, std::sync::Arc<Urequest>) {
        let original_for_cb = std::sync::Arc::clone(&original);
        let proxy = std::sync::Arc::new(Urequest::new(original_kind, move |answer| original_for_cb.provide(answer)));
        (ProxyRequest { inner: std::sync::Arc::clone(&proxy) }, proxy)
    }

    pub fn request(&self) -> &std::sync::Arc<Urequest> {
        &self.inner
    }
}
