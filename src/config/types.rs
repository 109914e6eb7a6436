//! Knobs for the runtime's own ambient managers and probes (spec §10.3)
//! — queue depths, pool capacities, a probe's selector/divider. Never
//! codec or media-module parameters; those stay with whatever external
//! pipe owns them.

use serde::{Deserialize, Serialize};

/// Sizing for the queue pipes a `wsrc`/`wlin`/`wsink` composite builds
/// (spec §4.5/§4.7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Command-queue length for the transfer manager's worker thread.
    pub command_queue_len: usize,
    /// Input queue depth (`wlin`/`wsink`).
    pub in_queue_len: usize,
    /// Output queue depth (`wsrc`/`wlin`).
    pub out_queue_len: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        QueueConfig {
            command_queue_len: 16,
            in_queue_len: 32,
            out_queue_len: 32,
        }
    }
}

/// Free-handle pool capacity for a [`crate::ubuf::UbufMgr`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolConfig {
    pub capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig { capacity: 16 }
    }
}

/// [`crate::uprobe::dejitter::DejitterProbe`] construction parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DejitterConfig {
    /// Running-average divider: larger values smooth more slowly.
    pub divider: u32,
}

impl Default for DejitterConfig {
    fn default() -> Self {
        DejitterConfig { divider: 8 }
    }
}

/// [`crate::uprobe::selflow::SelflowProbe`] construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelflowConfig {
    /// `"auto"`, `"all"`, `"none"`, or a comma-separated id list, matching
    /// the selector string grammar in spec §4.3.
    pub selector: String,
}

impl Default for SelflowConfig {
    fn default() -> Self {
        SelflowConfig { selector: "auto".to_string() }
    }
}

/// Minimum severity the `stdio` probe bridges into `tracing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `"verbose"`, `"debug"`, `"notice"`, `"warn"`, or `"error"`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { level: "notice".to_string() }
    }
}
