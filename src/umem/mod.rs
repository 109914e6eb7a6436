//! Pluggable byte-buffer allocator (L0).
//!
//! `umem` is the bottom of the buffer stack: it hands out raw memory
//! regions that [`crate::ubuf::shared`] wraps with a refcount and
//! [`crate::ubuf`] slices into typed views (block/picture/sound). Swapping
//! the allocator (heap vs. page-aligned mmap vs. a foreign FFI buffer) never
//! changes anything above this layer.
//!
//! The design note on "Unions of buffer backings (umem variants)" asks for
//! a sum type with a raw-pointer-plus-freer escape hatch for FFI memory
//! (e.g. a libav frame); [`MemRegion`] is exactly that: an owned pointer, a
//! size, and an origin tag that knows how to free itself.

use crate::error::{Result, UpipeError};
use std::fmt;
use std::ptr::NonNull;

/// Where a [`MemRegion`]'s bytes came from, and therefore how to free them.
pub enum MemOrigin {
    /// A `Vec<u8>`-backed heap allocation.
    Heap,
    /// An anonymous, page-aligned `mmap` region (see [`MmapUmem`]).
    Mmap,
    /// Memory owned by a foreign allocator (e.g. an FFI frame buffer); the
    /// boxed closure is called exactly once, when the region is dropped.
    Foreign(Box<dyn FnOnce(*mut u8, usize) + Send>),
}

impl fmt::Debug for MemOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemOrigin::Heap => write!(f, "Heap"),
            MemOrigin::Mmap => write!(f, "Mmap"),
            MemOrigin::Foreign(_) => write!(f, "Foreign(..)"),
        }
    }
}

/// A raw memory region owned by exactly one [`MemRegion`] value at a time.
///
/// This is the `{ptr,size,origin}` handle a pluggable allocator hands back.
/// It is `Send` (but intentionally not `Sync` — concurrent unsynchronized
/// access to the raw bytes is the caller's problem) so that a `ubuf`'s
/// shared backing, which owns one of these, can itself cross threads by
/// value.
pub struct MemRegion {
    ptr: NonNull<u8>,
    size: usize,
    origin: MemOrigin,
}

// SAFETY: ownership of the pointed-to bytes is unique per `MemRegion`; the
// pointer is never read concurrently from two threads without the owning
// `ubuf_mem_shared`'s refcount/COW discipline serializing access.
unsafe impl Send for MemRegion {}

impl MemRegion {
    /// Wrap a raw allocation. `ptr` must be valid for `size` bytes and
    /// `origin` must be able to free exactly that region.
    ///
    /// # Safety
    /// `ptr` must point to an allocation of at least `size` bytes that is
    /// not aliased elsewhere, and must remain valid until this `MemRegion`
    /// is dropped.
    pub unsafe fn from_raw(ptr: NonNull<u8>, size: usize, origin: MemOrigin) -> Self {
        MemRegion { ptr, size, origin }
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Read-only view of the whole region.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `size` bytes for the lifetime of `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// Mutable view of the whole region. Callers above this layer
    /// (`ubuf::shared`) are responsible for only calling this when they
    /// hold the sole reference (copy-on-write discipline, invariant B2).
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: same as `as_slice`, with exclusive access guaranteed by
        // `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }
}

impl fmt::Debug for MemRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemRegion")
            .field("size", &self.size)
            .field("origin", &self.origin)
            .finish()
    }
}

impl Drop for MemRegion {
    fn drop(&mut self) {
        match &mut self.origin {
            MemOrigin::Heap => {
                // SAFETY: allocated by `HeapUmem::alloc` with the same
                // layout it reconstructs here.
                unsafe {
                    let layout = std::alloc::Layout::from_size_align(self.size, 1).unwrap();
                    std::alloc::dealloc(self.ptr.as_ptr(), layout);
                }
            }
            MemOrigin::Mmap => {
                // SAFETY: allocated by `MmapUmem::alloc` with the same size.
                unsafe {
                    let _ = nix::sys::mman::munmap(
                        self.ptr.as_ptr().cast(),
                        self.size,
                    );
                }
            }
            MemOrigin::Foreign(_) => {
                if let MemOrigin::Foreign(freer) =
                    std::mem::replace(&mut self.origin, MemOrigin::Heap)
                {
                    // Foreign regions didn't come from our own allocator;
                    // skip the (wrong) Heap dealloc by swapping it out first.
                    freer(self.ptr.as_ptr(), self.size);
                    return;
                }
            }
        }
    }
}

/// A pluggable allocator: `alloc(size) -> MemRegion`.
///
/// Implementations fail with [`UpipeError::Alloc`] when memory is
/// exhausted and [`UpipeError::Invalid`] when `size` itself is
/// unrepresentable (zero, or overflowing `isize`).
pub trait Umem: Send + Sync {
    /// Allocate a fresh, zero-filled region of exactly `size` bytes.
    fn alloc(&self, size: usize) -> Result<MemRegion>;
}

/// Heap-backed allocator: every region is a boxed, zeroed byte slice.
#[derive(Debug, Default)]
pub struct HeapUmem;

impl Umem for HeapUmem {
    fn alloc(&self, size: usize) -> Result<MemRegion> {
        if size == 0 {
            return Err(UpipeError::Invalid("umem alloc size must be > 0".into()));
        }
        let layout = std::alloc::Layout::from_size_align(size, 1)
            .map_err(|e| UpipeError::Invalid(e.to_string()))?;
        // SAFETY: layout is non-zero-sized and alignment 1 is always valid.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or_else(|| UpipeError::Alloc(format!(
            "heap allocation of {size} bytes failed"
        )))?;
        // SAFETY: just allocated exactly `size` bytes above.
        Ok(unsafe { MemRegion::from_raw(ptr, size, MemOrigin::Heap) })
    }
}

/// Page-aligned, anonymous-`mmap`-backed allocator.
///
/// Grounded on the teacher's `pipewire::pw_thread::mmap_fd_buffer`, which
/// uses `nix::sys::mman::{mmap, munmap}` directly rather than going through
/// a higher-level mmap crate; here the mapping is anonymous (no FD) since
/// `umem` allocates fresh memory rather than importing a frame.
#[derive(Debug, Default)]
pub struct MmapUmem;

impl Umem for MmapUmem {
    fn alloc(&self, size: usize) -> Result<MemRegion> {
        use nix::sys::mman::{mmap_anonymous, MapFlags, ProtFlags};
        if size == 0 {
            return Err(UpipeError::Invalid("umem alloc size must be > 0".into()));
        }
        let len = std::num::NonZeroUsize::new(size)
            .ok_or_else(|| UpipeError::Invalid("umem alloc size must be > 0".into()))?;
        // SAFETY: anonymous mapping, no file-backed aliasing concerns.
        let ptr = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )
            .map_err(|e| UpipeError::Alloc(format!("mmap failed: {e}")))?
        };
        let ptr = NonNull::new(ptr.as_ptr().cast::<u8>()).ok_or_else(|| {
            UpipeError::Alloc("mmap returned null".to_string())
        })?;
        // SAFETY: just mapped exactly `size` bytes above.
        Ok(unsafe { MemRegion::from_raw(ptr, size, MemOrigin::Mmap) })
    }
}
