//! Worker-wrapper composites (L8, spec §4.7): the three standard shapes
//! built out of [`crate::xfer`] plus [`crate::queue`] so a caller never
//! has to hand-wire a transfer manager and a pair of queues themselves.
//!
//! - [`wsrc`]: input-side transfer proxy (for control only — a source
//!   has no input) plus an output-side `qsrc`, so a source pipe runs on
//!   its own thread and its output is consumed on the owner thread.
//! - [`wlin`]: `qsink` in, inner pipe on the worker thread, `qsrc` out.
//! - [`wsink`]: `qsink` in, sink on the worker thread, no output.
//!
//! All three share one construction trick: the inner pipe is built on
//! the calling thread (it's just a `PipeHandle`, already `Send`+`Sync`
//! by construction — see `upipe::PipeHandle`), then handed to the
//! worker via [`XferMgr::xfer_alloc_with_bridge`]. Every `input`/
//! `control` call on it afterward runs on the worker thread, either
//! through the transfer proxy's command queue or through a `tick`
//! closure draining the input queue's `qsrc` — construction site and
//! the thread a pipe actually *runs* on are deliberately decoupled.

use crate::error::{Result, UpipeError};
use crate::queue::{new_queue, QSink, QSrc};
use crate::upipe::{Command, CommandReply, PipeHandle, Upipe};
use crate::upump::PumpMgr;
use crate::uprobe::pthread_upump_mgr::PthreadUpumpMgrProbe;
use crate::uprobe::xfer_probe::XferProbe;
use crate::uprobe::Chain;
use crate::uref::Uref;
use crate::xfer::{XferMgr, XferProxy};
use parking_lot::Mutex;
use std::sync::Arc;

fn spawn_xfer(
    name: impl Into<String>,
    command_queue_len: usize,
    make_pump_mgr: impl FnOnce() -> Arc<dyn PumpMgr> + Send + 'static,
    tick: Option<Box<dyn FnMut() + Send>>,
) -> Result<XferMgr> {
    let pthread_probe = Arc::new(PthreadUpumpMgrProbe::new());
    XferMgr::new_with_tick(name, command_queue_len, make_pump_mgr, pthread_probe, tick)
        .map_err(|e| UpipeError::External(format!("spawn worker thread: {e}")))
}

/// A source pipe wrapped onto its own thread, output drained on the
/// owner thread.
///
/// `input` is a no-op — sources never receive one — but the type still
/// implements [`Upipe`] so it composes like any other pipe handle;
/// `Command::SetOutput`/`GetOutput` are answered by the owner-side
/// `qsrc`, everything else marshals to the inner pipe via the transfer
/// proxy.
pub struct Wsrc {
    proxy: XferProxy,
    qsrc: QSrc,
    _mgr: XferMgr,
}

/// Build a [`Wsrc`]. `build_inner` constructs the wrapped source pipe,
/// given the worker-thread probe chain (already carrying the `xfer`
/// bridge probe) it should be allocated with.
pub fn wsrc(
    name: impl Into<String>,
    command_queue_len: usize,
    out_queue_len: usize,
    owner_probe: Chain,
    worker_probe: Chain,
    make_pump_mgr: impl FnOnce() -> Arc<dyn PumpMgr> + Send + 'static,
    build_inner: impl FnOnce(Chain) -> Result<PipeHandle>,
) -> Result<Wsrc> {
    let (event_tx, event_rx) = XferMgr::new_bridge();
    let worker_chain = worker_probe.append(Arc::new(XferProbe::new(event_tx.clone())));
    let inner = build_inner(worker_chain)?;

    let (out_qsink, out_qsrc) = new_queue(out_queue_len);
    let out_qsink_handle: PipeHandle = Arc::new(Mutex::new(out_qsink));
    inner.lock().control(Command::SetOutput(out_qsink_handle))?;

    let mgr = spawn_xfer(name, command_queue_len, make_pump_mgr, None)?;
    let proxy = mgr.xfer_alloc_with_bridge(inner, owner_probe, event_tx, event_rx);

    Ok(Wsrc { proxy, qsrc: out_qsrc, _mgr: mgr })
}

impl Wsrc {
    /// Dequeue and forward one uref to whatever downstream pipe is set
    /// as this composite's output. Call from the owner's pump (e.g. an
    /// idler watching the queue's receiver).
    pub fn dispatch(&mut self) -> bool {
        self.qsrc.dispatch()
    }

    /// Drain everything currently queued, in order.
    pub fn drain_all(&mut self) -> usize {
        self.qsrc.drain_all()
    }

    /// Re-throw events bridged from the worker thread onto the owner
    /// probe chain (`SOURCE_END` among them).
    pub fn pump_events(&mut self) {
        self.proxy.pump_events();
    }
}

impl Upipe for Wsrc {
    fn signature(&self) -> &'static str {
        self.proxy.signature()
    }

    fn input(&mut self, _uref: Uref) {
        // A source has no upstream; nothing to do with an input uref.
    }

    fn control(&mut self, command: Command) -> Result<CommandReply> {
        match command {
            Command::SetOutput(_) | Command::GetOutput => self.qsrc.control(command),
            _ => self.proxy.control(command),
        }
    }
}

/// An inner linear pipe wrapped onto its own thread: `qsink` in on the
/// owner thread, `qsrc` out on the owner thread, the inner pipe itself
/// ticked on the worker thread.
pub struct Wlin {
    in_qsink: QSink,
    proxy: XferProxy,
    out_qsrc: QSrc,
    _mgr: XferMgr,
}

/// Build a [`Wlin`]. `build_inner` is handed the worker-thread probe
/// chain (already carrying the `xfer` bridge probe); its returned pipe
/// is wired as `in_qsrc → inner → out_qsink` on the worker thread, with
/// `in_qsrc` drained once per worker-loop tick (spec §4.7 step 2).
pub fn wlin(
    name: impl Into<String>,
    command_queue_len: usize,
    in_queue_len: usize,
    out_queue_len: usize,
    owner_probe: Chain,
    worker_probe: Chain,
    make_pump_mgr: impl FnOnce() -> Arc<dyn PumpMgr> + Send + 'static,
    build_inner: impl FnOnce(Chain) -> Result<PipeHandle>,
) -> Result<Wlin> {
    let (event_tx, event_rx) = XferMgr::new_bridge();
    let worker_chain = worker_probe.append(Arc::new(XferProbe::new(event_tx.clone())));
    let inner = build_inner(worker_chain)?;

    let (out_qsink, out_qsrc) = new_queue(out_queue_len);
    let out_qsink_handle: PipeHandle = Arc::new(Mutex::new(out_qsink));
    inner.lock().control(Command::SetOutput(out_qsink_handle))?;

    let (in_qsink, mut in_qsrc) = new_queue(in_queue_len);
    in_qsrc.control(Command::SetOutput(Arc::clone(&inner)))?;
    let tick: Box<dyn FnMut() + Send> = Box::new(move || {
        in_qsrc.drain_all();
    });

    let mgr = spawn_xfer(name, command_queue_len, make_pump_mgr, Some(tick))?;
    let proxy = mgr.xfer_alloc_with_bridge(inner, owner_probe, event_tx, event_rx);

    Ok(Wlin { in_qsink, proxy, out_qsrc, _mgr: mgr })
}

impl Wlin {
    pub fn dispatch(&mut self) -> bool {
        self.out_qsrc.dispatch()
    }

    pub fn drain_all(&mut self) -> usize {
        self.out_qsrc.drain_all()
    }

    pub fn pump_events(&mut self) {
        self.proxy.pump_events();
    }

    /// `true` while a push into the input queue is being held for lack
    /// of queue space.
    pub fn is_holding(&self) -> bool {
        self.in_qsink.is_holding()
    }

    /// Retry pushing held input urefs; call once the worker thread is
    /// known to have drained at least one slot.
    pub fn retry(&mut self) {
        self.in_qsink.retry();
    }
}

impl Upipe for Wlin {
    fn signature(&self) -> &'static str {
        self.proxy.signature()
    }

    fn input(&mut self, uref: Uref) {
        self.in_qsink.input(uref);
    }

    fn control(&mut self, command: Command) -> Result<CommandReply> {
        match command {
            Command::SetOutput(_) | Command::GetOutput => self.out_qsrc.control(command),
            Command::Flush => {
                self.in_qsink.control(Command::Flush)?;
                self.proxy.control(Command::Flush)
            }
            _ => self.proxy.control(command),
        }
    }
}

/// An inner sink pipe wrapped onto its own thread: `qsink` in on the
/// owner thread, sink ticked on the worker thread, no output.
pub struct Wsink {
    in_qsink: QSink,
    proxy: XferProxy,
    _mgr: XferMgr,
}

/// Build a [`Wsink`]. `build_inner` is handed the worker-thread probe
/// chain (already carrying the `xfer` bridge probe); its returned pipe
/// is fed from `in_qsrc`, drained once per worker-loop tick.
pub fn wsink(
    name: impl Into<String>,
    command_queue_len: usize,
    in_queue_len: usize,
    owner_probe: Chain,
    worker_probe: Chain,
    make_pump_mgr: impl FnOnce() -> Arc<dyn PumpMgr> + Send + 'static,
    build_inner: impl FnOnce(Chain) -> Result<PipeHandle>,
) -> Result<Wsink> {
    let (event_tx, event_rx) = XferMgr::new_bridge();
    let worker_chain = worker_probe.append(Arc::new(XferProbe::new(event_tx.clone())));
    let inner = build_inner(worker_chain)?;

    let (in_qsink, mut in_qsrc) = new_queue(in_queue_len);
    in_qsrc.control(Command::SetOutput(Arc::clone(&inner)))?;
    let tick: Box<dyn FnMut() + Send> = Box::new(move || {
        in_qsrc.drain_all();
    });

    let mgr = spawn_xfer(name, command_queue_len, make_pump_mgr, Some(tick))?;
    let proxy = mgr.xfer_alloc_with_bridge(inner, owner_probe, event_tx, event_rx);

    Ok(Wsink { in_qsink, proxy, _mgr: mgr })
}

impl Wsink {
    pub fn pump_events(&mut self) {
        self.proxy.pump_events();
    }

    pub fn is_holding(&self) -> bool {
        self.in_qsink.is_holding()
    }

    pub fn retry(&mut self) {
        self.in_qsink.retry();
    }
}

impl Upipe for Wsink {
    fn signature(&self) -> &'static str {
        self.proxy.signature()
    }

    fn input(&mut self, uref: Uref) {
        self.in_qsink.input(uref);
    }

    fn control(&mut self, command: Command) -> Result<CommandReply> {
        match command {
            Command::Flush => {
                self.in_qsink.control(Command::Flush)?;
                self.proxy.control(Command::Flush)
            }
            _ => self.proxy.control(command),
        }
    }
}
