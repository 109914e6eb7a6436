//! Diagnostics helpers that don't belong to any one runtime layer.

pub mod diagnostics;

pub use diagnostics::{dump_pipe_graph, dump_probe_chain};
