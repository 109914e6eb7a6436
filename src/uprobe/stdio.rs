//! `stdio` probe (spec §4.3): thresholds on log level, prints, forwards.
//!
//! Rather than printing directly, logging is bridged into `tracing`
//! (§10.1 of the runtime spec) — the same subscriber that the rest of
//! the host process uses, so pipe-graph logs and application logs
//! interleave correctly.

use super::{Event, LogLevel, Outcome, PipeId, Uprobe};

/// Prints (via `tracing`) log events at or above `threshold`, then always
/// forwards — `stdio` never claims the event, it's an observer.
pub struct StdioProbe {
    threshold: LogLevel,
}

impl StdioProbe {
    pub fn new(threshold: LogLevel) -> Self {
        StdioProbe { threshold }
    }
}

impl Default for StdioProbe {
    fn default() -> Self {
        StdioProbe::new(LogLevel::Notice)
    }
}

impl Uprobe for StdioProbe {
    fn name(&self) -> &'static str {
        "stdio"
    }

    fn catch(&self, pipe: PipeId, event: &Event) -> Outcome {
        if let Event::Log { level, message } = event {
            if *level >= self.threshold {
                match level {
                    LogLevel::Verbose => tracing::trace!(pipe = pipe.signature, instance = pipe.instance, "{message}"),
                    LogLevel::Debug => tracing::debug!(pipe = pipe.signature, instance = pipe.instance, "{message}"),
                    LogLevel::Notice => tracing::info!(pipe = pipe.signature, instance = pipe.instance, "{message}"),
                    LogLevel::Warn => tracing::warn!(pipe = pipe.signature, instance = pipe.instance, "{message}"),
                    LogLevel::Error => tracing::error!(pipe = pipe.signature, instance = pipe.instance, "{message}"),
                }
            }
        }
        Outcome::Unhandled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_threshold_is_silent_but_still_unhandled() {
        let probe = StdioProbe::new(LogLevel::Warn);
        let pipe = PipeId { signature: "test", instance: 0 };
        let outcome = probe.catch(
            pipe,
            &Event::Log {
                level: LogLevel::Debug,
                message: "quiet".into(),
            },
        );
        assert!(matches!(outcome, Outcome::Unhandled));
    }
}
