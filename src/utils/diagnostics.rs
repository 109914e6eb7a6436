//! One-shot textual snapshots of a live probe chain or pipe graph, for
//! tests and for hosts that want something to paste into a bug report.

use crate::upipe::{Command, CommandReply, PipeHandle};
use crate::uprobe::Chain;

/// List each probe in `chain`, in catch order, one per line.
pub fn dump_probe_chain(chain: &Chain) -> String {
    let mut out = String::new();
    for (i, probe) in chain.probes().iter().enumerate() {
        out.push_str(&format!("{i}: {}\n", probe.name()));
    }
    if chain.probes().is_empty() {
        out.push_str("(empty chain)\n");
    }
    out
}

/// Walk a pipe graph from `root` by repeatedly asking `GET_OUTPUT`,
/// printing each pipe's signature. Stops at the first pipe with no
/// output, or after `max_depth` hops (a cheap guard against a graph
/// that happens to loop back on itself).
pub fn dump_pipe_graph(root: &PipeHandle, max_depth: usize) -> String {
    let mut out = String::new();
    let mut current = root.clone();
    for depth in 0..max_depth {
        let signature = current.lock().signature();
        out.push_str(&format!("{depth}: {signature}\n"));

        let reply = current.lock().control(Command::GetOutput);
        match reply {
            Ok(CommandReply::Output(Some(next))) => current = next,
            _ => return out,
        }
    }
    out.push_str("(truncated: max depth reached)\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, UpipeError};
    use crate::upipe::Upipe;
    use crate::uprobe::stdio::StdioProbe;
    use crate::uprobe::LogLevel;
    use crate::uref::Uref;
    use parking_lot::Mutex;
    use std::sync::Arc;

    struct Passthrough {
        output: Option<PipeHandle>,
    }
    impl Upipe for Passthrough {
        fn signature(&self) -> &'static str {
            "pass"
        }
        fn input(&mut self, _uref: Uref) {}
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

    #[test]
    fn dump_probe_chain_lists_probe_names_in_order() {
        let chain = Chain::new().append(Arc::new(StdioProbe::new(LogLevel::Debug)));
        let dump = dump_probe_chain(&chain);
        assert!(dump.contains("0: stdio"));
    }

    #[test]
    fn dump_probe_chain_reports_empty() {
        let chain = Chain::new();
        assert_eq!(dump_probe_chain(&chain), "(empty chain)\n");
    }

    #[test]
    fn dump_pipe_graph_follows_output_links() {
        let tail: PipeHandle = Arc::new(Mutex::new(Passthrough { output: None }));
        let head: PipeHandle = Arc::new(Mutex::new(Passthrough { output: Some(Arc::clone(&tail)) }));
        let dump = dump_pipe_graph(&head, 8);
        assert_eq!(dump, "0: pass\n1: pass\n");
    }

    #[test]
    fn dump_pipe_graph_truncates_at_max_depth() {
        let a: PipeHandle = Arc::new(Mutex::new(Passthrough { output: None }));
        let b: PipeHandle = Arc::new(Mutex::new(Passthrough { output: Some(Arc::clone(&a)) }));
        a.lock().control(Command::SetOutput(Arc::clone(&b))).unwrap();
        let dump = dump_pipe_graph(&a, 3);
        assert!(dump.ends_with("(truncated: max depth reached)\n"));
    }
}
