//! Pipe (L6) and manager: the polymorphic processing node every concrete
//! media module plugs into.
//!
//! Variadic `control(upipe, command, ...)` calls and signature-tagged
//! manager families become a tagged [`Command`] enum plus a `signature`
//! string used for downcasting — the "variadic control commands" design
//! note. A pipe is shared via [`PipeHandle`] (`Arc<parking_lot::Mutex<dyn Upipe>>`):
//! genuinely atomic because, per spec §5, a pipe manager's refcount is
//! one of the objects that must cross threads by value even though the
//! pipe itself only ever runs `input`/`control` from its own thread.

pub mod helpers;

use crate::error::Result;
use crate::uclock::Uclock;
use crate::upump::PumpMgr;
use crate::uprobe::Chain;
use crate::uref::Uref;
use crate::urequest::{RequestKind, Urequest};
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to a pipe. Single-threaded cooperative scheduling (spec
/// §5) means the `Mutex` is almost never contended — it exists so a
/// pipe can be legally held (and its refcount bumped) by more than one
/// owner (its manager, its upstream's `SET_OUTPUT`, a subpipe list)
/// without `unsafe`.
pub type PipeHandle = Arc<Mutex<dyn Upipe>>;

/// Standard control commands every pipe must understand or explicitly
/// reject (spec §4.4/§3). Manager-family-specific commands are left to
/// each concrete pipe's own enum, composed alongside this one rather
/// than widening it — see `Command::Private` for the escape hatch.
pub enum Command {
    AttachUpumpMgr(Arc<dyn PumpMgr>),
    AttachUclock(Arc<dyn Uclock>),
    SetFlowDef(Uref),
    GetFlowDef,
    GetOutput,
    SetOutput(PipeHandle),
    GetOutputSize,
    SetOutputSize(u32, u32),
    GetUri,
    SetUri(String),
    SetOption(String, String),
    Flush,
    RegisterRequest(Arc<Urequest>),
    UnregisterRequest(RequestKind),
    IterateSub,
    SubGetSuper,
    /// A signature-tagged command private to one manager family. The
    /// `&'static str` is the owning signature; pipes that don't
    /// recognize it return `Err(UpipeError::Unhandled)`.
    Private(&'static str, Box<dyn std::any::Any + Send>),
}

/// Synchronous reply to a [`Command`]. Most commands reply with `None`;
/// `Get*` commands carry their answer.
pub enum CommandReply {
    None,
    FlowDef(Uref),
    Output(Option<PipeHandle>),
    OutputSize(u32, u32),
    Uri(Option<String>),
    SubList(Vec<PipeHandle>),
    Super(Option<PipeHandle>),
    Private(Box<dyn std::any::Any + Send>),
}

/// A polymorphic processing node (spec §4.4).
///
/// Lifecycle: a manager's `alloc` constructs state, attaches a probe
/// chain, and throws `Ready`. `input` feeds data/control urefs; `control`
/// dispatches synchronous commands. Dropping the last [`PipeHandle`] runs
/// `Drop`, which is expected to throw `Dead`, release subpipes/output,
/// and flush held urefs (P1).
pub trait Upipe: Send {
    /// The owning manager's signature, used by callers to downcast
    /// `Command::Private`/`CommandReply::Private` payloads safely.
    fn signature(&self) -> &'static str;

    /// Accept a data or control `uref` (spec step 4). Implementations
    /// that cannot process right now use the input-hold idiom
    /// ([`helpers::InputHold`]) rather than blocking this call.
    fn input(&mut self, uref: Uref);

    /// Synchronous command dispatch (spec step 2-3, 5-6).
    fn control(&mut self, command: Command) -> Result<CommandReply>;
}

/// A pipe manager: a factory plus shared state for one family of pipes
/// (spec §4.4). Managers are themselves refcounted (`Arc` suffices) and
/// may expose pool introspection/vacuum via `mgr_control`.
pub trait UpipeMgr: Send + Sync {
    /// The 4-character-tag analogue identifying this manager family.
    fn signature(&self) -> &'static str;

    /// Construct a new pipe attached to `probe`.
    fn alloc(&self, probe: Chain) -> Result<PipeHandle>;

    /// Manager-level control: pool vacuum, introspection. Default no-op
    /// for managers with nothing to vacuum.
    fn mgr_control(&self, _command: Command) -> Result<CommandReply> {
        Ok(CommandReply::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uprobe::PipeId;
    use crate::error::UpipeError;

    struct EchoPipe {
        flow_def: Option<Uref>,
        output: Option<PipeHandle>,
    }

    impl Upipe for EchoPipe {
        fn signature(&self) -> &'static str {
            "echo"
        }

        fn input(&mut self, uref: Uref) {
            if let Some(output) = &self.output {
                output.lock().input(uref);
            }
        }

        fn control(&mut self, command: Command) -> Result<CommandReply> {
            match command {
                Command::SetFlowDef(uref) => {
                    self.flow_def = Some(uref);
                    Ok(CommandReply::None)
                }
                Command::GetFlowDef => self
                    .flow_def
                    .as_ref()
                    .map(|uref| CommandReply::FlowDef(uref.dup()))
                    .ok_or(UpipeError::Invalid("no flow def set".into())),
                Command::SetOutput(output) => {
                    self.output = Some(output);
                    Ok(CommandReply::None)
                }
                Command::GetOutput => Ok(CommandReply::Output(self.output.clone())),
                _ => Err(UpipeError::Unhandled),
            }
        }
    }

    #[test]
    fn set_and_get_flow_def_round_trips() {
        use crate::udict::{UdictRef, Value};

        let mut dict = UdictRef::new();
        dict.make_mut().set("f.def", Value::String("block.".into()));
        let uref = Uref::new_control(dict);

        let mut pipe = EchoPipe { flow_def: None, output: None };
        pipe.control(Command::SetFlowDef(uref)).unwrap();
        match pipe.control(Command::GetFlowDef).unwrap() {
            CommandReply::FlowDef(got) => assert_eq!(got.dict().get_string("f.def").unwrap(), "block."),
            _ => panic!("expected FlowDef reply"),
        }
    }

    #[test]
    fn unhandled_command_is_rejected() {
        let mut pipe = EchoPipe { flow_def: None, output: None };
        let err = pipe.control(Command::Flush).unwrap_err();
        assert!(err.is_unhandled());
    }

    #[test]
    fn input_forwards_to_output() {
        use crate::udict::UdictRef;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct CountingSink(Arc<AtomicUsize>);
        impl Upipe for CountingSink {
            fn signature(&self) -> &'static str {
                "sink"
            }
            fn input(&mut self, _uref: Uref) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn control(&mut self, _command: Command) -> Result<CommandReply> {
                Err(UpipeError::Unhandled)
            }
        }

        let hits = Arc::new(AtomicUsize::new(0));
        let sink: PipeHandle = Arc::new(Mutex::new(CountingSink(Arc::clone(&hits))));
        let mut source = EchoPipe { flow_def: None, output: Some(sink) };
        let _ = PipeId { signature: "echo", instance: 0 };
        source.input(Uref::new_control(UdictRef::new()));
        source.input(Uref::new_control(UdictRef::new()));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
