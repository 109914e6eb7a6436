//! A full `wsrc -> wlin -> wsink` chain, each stage on its own worker
//! thread, wired together exactly the way an embedding host would:
//! `Command::SetOutput` linking one composite's queue to the next
//! composite's `Upipe::input`. Exercises cross-thread dataflow spanning
//! all three composites at once, which no single-composite unit test
//! does.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use upipe_rt::error::{Result, UpipeError};
use upipe_rt::udict::{UdictRef, Value};
use upipe_rt::upipe::{Command, CommandReply, PipeHandle, Upipe};
use upipe_rt::upump::mgr::PollPumpMgr;
use upipe_rt::upump::PumpMgr;
use upipe_rt::uprobe::Chain;
use upipe_rt::uref::Uref;
use upipe_rt::worker::{wlin, wsink, wsrc, Wlin};

struct PassThrough {
    output: Option<PipeHandle>,
}
impl Upipe for PassThrough {
    fn signature(&self) -> &'static str {
        "pass"
    }
    fn input(&mut self, uref: Uref) {
        if let Some(output) = &self.output {
            output.lock().input(uref);
        }
    }
    fn control(&mut self, command: Command) -> Result<CommandReply> {
        match command {
            Command::SetOutput(output) => {
                self.output = Some(output);
                Ok(CommandReply::None)
            }
            Command::GetOutput => Ok(CommandReply::Output(self.output.clone())),
            _ => Err(UpipeError::Unhandled),
        }
    }
}

struct CountingPipe(Arc<AtomicUsize>);
impl Upipe for CountingPipe {
    fn signature(&self) -> &'static str {
        "cnt_"
    }
    fn input(&mut self, uref: Uref) {
        let _ = uref.dict().get_u64("seq");
        self.0.fetch_add(1, Ordering::SeqCst);
    }
    fn control(&mut self, _command: Command) -> Result<CommandReply> {
        Err(UpipeError::Unhandled)
    }
}

fn tagged(seq: u64) -> Uref {
    let mut dict = UdictRef::new();
    dict.make_mut().set("seq", Value::U64(seq));
    Uref::new_control(dict)
}

fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..400 {
        if predicate() {
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(predicate(), "condition never became true");
}

#[test]
fn three_stage_worker_pipeline_delivers_every_uref_in_order() {
    let source_inner: PipeHandle = Arc::new(Mutex::new(PassThrough { output: None }));
    let source_inner_for_emit = Arc::clone(&source_inner);

    let mut source = wsrc(
        "pipeline-wsrc",
        4,
        8,
        Chain::new(),
        Chain::new(),
        || Arc::new(PollPumpMgr) as Arc<dyn PumpMgr>,
        move |_chain| Ok(source_inner),
    )
    .unwrap();

    let linear: Wlin = wlin(
        "pipeline-wlin",
        4,
        8,
        8,
        Chain::new(),
        Chain::new(),
        || Arc::new(PollPumpMgr) as Arc<dyn PumpMgr>,
        |_chain| Ok(Arc::new(Mutex::new(PassThrough { output: None })) as PipeHandle),
    )
    .unwrap();
    // Kept as a concrete `Arc<Mutex<Wlin>>` so the test can still reach
    // `drain_all`/`retry` (inherent, not part of `Upipe`) after handing
    // a type-erased clone to the source as its output.
    let linear = Arc::new(Mutex::new(linear));
    let linear_as_pipe: PipeHandle = linear.clone();

    let received = Arc::new(AtomicUsize::new(0));
    let received_for_inner = Arc::clone(&received);
    let sink = wsink(
        "pipeline-wsink",
        4,
        8,
        Chain::new(),
        Chain::new(),
        || Arc::new(PollPumpMgr) as Arc<dyn PumpMgr>,
        move |_chain| Ok(Arc::new(Mutex::new(CountingPipe(received_for_inner))) as PipeHandle),
    )
    .unwrap();
    let sink_handle: PipeHandle = Arc::new(Mutex::new(sink));

    source.control(Command::SetOutput(linear_as_pipe)).unwrap();
    linear.lock().control(Command::SetOutput(Arc::clone(&sink_handle))).unwrap();

    const N: u64 = 20;
    for seq in 0..N {
        source_inner_for_emit.lock().input(tagged(seq));
    }

    wait_until(|| {
        // Drive both owner-side queues: the source's output queue feeds
        // `linear`'s input queue, and `linear`'s output queue feeds the
        // sink. Neither drains itself without an idler pushing on it.
        source.dispatch();
        linear.lock().drain_all();
        received.load(Ordering::SeqCst) == N as usize
    });

    assert_eq!(received.load(Ordering::SeqCst), N as usize);
}
