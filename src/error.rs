//! Runtime error taxonomy
//!
//! Every synchronous, fallible entry point in this crate (`control`, buffer
//! mapping, allocation) returns `Result<T, UpipeError>`. Data-plane failures
//! never propagate this way — they are thrown as `Event::Fatal`/`Event::Error`
//! through the probe chain (see [`crate::uprobe`]), matching the propagation
//! policy in the runtime's error handling design.

use thiserror::Error;

/// Result alias used throughout the runtime.
pub type Result<T> = std::result::Result<T, UpipeError>;

/// The error codes a pipe, manager, or buffer may report.
///
/// This is the flat taxonomy every caller inspects: `Busy` is not really an
/// error (it means "duplicate and retry"), `Unhandled` means "ask the next
/// probe", the rest are genuine failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpipeError {
    /// No error occurred; used where an `Option<UpipeError>` reads awkwardly.
    #[error("no error")]
    None,

    /// Allocation failed (pool exhausted, backing allocator out of memory).
    #[error("allocation failed: {0}")]
    Alloc(String),

    /// An event pump operation failed (registration, arm, or loop error).
    #[error("pump error: {0}")]
    Upump(String),

    /// An external resource (file, socket, FD) misbehaved.
    #[error("external error: {0}")]
    External(String),

    /// Caller violated a contract: bad range, wrong flow format, bad argument.
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// The operation cannot complete right now because the resource is
    /// shared (e.g. a write mapping requested on a ubuf whose backing has
    /// more than one reference). The caller is expected to duplicate-then-copy
    /// or retry once the contention clears.
    #[error("resource busy")]
    Busy,

    /// The control command or event is not implemented by this recipient;
    /// not a failure, it tells the chain to keep forwarding.
    #[error("unhandled")]
    Unhandled,

    /// Catch-all for conditions that don't fit the other variants.
    #[error("unknown error: {0}")]
    Unknown(String),

    /// `std::io::Error` crossing the boundary from `umem`'s mmap-backed
    /// allocator origin.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for UpipeError {
    fn from(e: std::io::Error) -> Self {
        UpipeError::Io(e.to_string())
    }
}

impl UpipeError {
    /// True for [`UpipeError::Busy`] — the one error that means "retry",
    /// not "fail".
    pub fn is_busy(&self) -> bool {
        matches!(self, UpipeError::Busy)
    }

    /// True for [`UpipeError::Unhandled`] — signals the probe chain to
    /// continue to the next catcher rather than treating this as failure.
    pub fn is_unhandled(&self) -> bool {
        matches!(self, UpipeError::Unhandled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_and_unhandled_are_distinguishable() {
        assert!(UpipeError::Busy.is_busy());
        assert!(!UpipeError::Busy.is_unhandled());
        assert!(UpipeError::Unhandled.is_unhandled());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: UpipeError = io_err.into();
        assert!(matches!(err, UpipeError::Io(_)));
    }
}
