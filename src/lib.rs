//! # upipe-rt
//!
//! A generic multimedia pipe runtime: typed, refcounted, copy-on-write
//! buffers; an ordered probe chain for event routing and resource
//! negotiation; a polymorphic pipe/manager contract; and cross-thread
//! transfer machinery built from bounded queues plus worker threads.
//!
//! Concrete media modules (demuxers, codecs, sinks) are external
//! collaborators that plug into the [`upipe`] contract — this crate
//! only provides the runtime they plug into.
//!
//! # Layers
//!
//! ```text
//! L0  umem                — pluggable byte allocator
//! L1  ubuf, udict         — refcounted, copy-on-write buffers, attribute dict
//! L2  uref                — data/control packet: a udict + optional ubuf
//! L3  upump, uclock       — event pump abstraction, monotonic clock
//! L4  uprobe              — ordered event-catcher chain
//! L5  urequest             — async resource negotiation riding the chain
//! L6  upipe                — the pipe/manager contract itself
//! L7  xfer, queue          — cross-thread transfer, bounded SPSC queues
//! L8  worker               — wsrc/wlin/wsink composites built from L7
//! ```
//!
//! # Example
//!
//! ```no_run
//! use upipe_rt::ubuf::{AllocDescriptor, UbufMgr};
//! use upipe_rt::umem::HeapUmem;
//! use std::sync::Arc;
//!
//! let mgr = UbufMgr::new(Arc::new(HeapUmem), 16);
//! let ubuf = mgr.alloc(AllocDescriptor::Block { size: 4096 }).unwrap();
//! let dup = mgr.dup(&ubuf); // O(1): shares the backing, copy-on-write
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Embedding-facing runtime configuration (spec §10.3).
pub mod config;

/// Crate-wide error taxonomy (spec §7/§10.2).
pub mod error;

/// Bounded SPSC queue pipes (L7).
pub mod queue;

/// Pluggable byte-buffer allocator (L0).
pub mod umem;

/// Copy-on-write content buffers: block, picture, sound (L1).
pub mod ubuf;

/// Insertion-ordered attribute dictionary (L1).
pub mod udict;

/// Reference packet: a `udict` plus an optional `ubuf` (L2).
pub mod uref;

/// Abstract event pump and pump manager (L3).
pub mod upump;

/// Monotonic clock source (L3).
pub mod uclock;

/// Ordered probe chain for event routing (L4).
pub mod uprobe;

/// Asynchronous resource request/answer (L5).
pub mod urequest;

/// The pipe and pipe-manager contract (L6).
pub mod upipe;

/// Cross-thread transfer runtime: worker thread plus proxy pipe (L7).
pub mod xfer;

/// Worker-wrapper composites built from `xfer` and `queue` (L8).
pub mod worker;

/// Diagnostics helpers (probe chain / pipe graph dumps).
pub mod utils;
