//! `prefix` probe (spec §4.3): prepends a string to log messages then
//! forwards to a wrapped catcher.
//!
//! `Event` carries no interior mutability, so "forwarding a rewritten
//! event" can't mean mutating it in place mid-chain; instead `prefix`
//! wraps one inner [`Uprobe`] directly and reconstructs the `Log` event
//! before handing it down, the way SPEC_FULL.md §10.1 describes it:
//! "it doesn't reimplement formatting, it just threads a prefix string
//! through to the inner catcher."

use super::{Event, Outcome, PipeId, Uprobe};
use std::sync::Arc;

pub struct PrefixProbe {
    prefix: String,
    inner: Arc<dyn Uprobe>,
}

impl PrefixProbe {
    pub fn new(prefix: impl Into<String>, inner: Arc<dyn Uprobe>) -> Self {
        PrefixProbe {
            prefix: prefix.into(),
            inner,
        }
    }

    /// Apply the prefix to a message.
    pub fn format(&self, message: &str) -> String {
        format!("{}{}", self.prefix, message)
    }
}

impl Uprobe for PrefixProbe {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn catch(&self, pipe: PipeId, event: &Event) -> Outcome {
        match event {
            Event::Log { level, message } => {
                let prefixed = Event::Log {
                    level: *level,
                    message: self.format(message),
                };
                self.inner.catch(pipe, &prefixed)
            }
            other => self.inner.catch(pipe, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::LogLevel;
    use std::sync::Mutex;

    struct RecordingProbe {
        last: Mutex<Option<(LogLevel, String)>>,
    }

    impl Uprobe for RecordingProbe {
        fn catch(&self, _pipe: PipeId, event: &Event) -> Outcome {
            if let Event::Log { level, message } = event {
                *self.last.lock().unwrap() = Some((*level, message.clone()));
            }
            Outcome::Unhandled
        }
    }

    #[test]
    fn format_prepends_prefix() {
        let inner = Arc::new(RecordingProbe { last: Mutex::new(None) });
        let probe = PrefixProbe::new("[demux] ", inner);
        assert_eq!(probe.format("starting"), "[demux] starting");
    }

    #[test]
    fn catch_rewrites_log_message_before_forwarding() {
        let inner = Arc::new(RecordingProbe { last: Mutex::new(None) });
        let probe = PrefixProbe::new("[demux] ", Arc::clone(&inner) as Arc<dyn Uprobe>);
        let pipe = PipeId { signature: "test", instance: 0 };

        let outcome = probe.catch(
            pipe,
            &Event::Log {
                level: LogLevel::Notice,
                message: "starting".into(),
            },
        );
        assert!(matches!(outcome, Outcome::Unhandled));
        assert_eq!(
            inner.last.lock().unwrap().clone(),
            Some((LogLevel::Notice, "[demux] starting".to_string()))
        );
    }

    #[test]
    fn catch_forwards_non_log_events_unchanged() {
        let inner = Arc::new(RecordingProbe { last: Mutex::new(None) });
        let probe = PrefixProbe::new("[demux] ", Arc::clone(&inner) as Arc<dyn Uprobe>);
        let pipe = PipeId { signature: "test", instance: 0 };

        probe.catch(pipe, &Event::Ready);
        assert!(inner.last.lock().unwrap().is_none());
    }
}
