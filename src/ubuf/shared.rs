//! `ubuf_mem_shared`: the refcounted memory backing underneath every `ubuf`.
//!
//! A [`Shared`] owns one [`MemRegion`]. `Shared::dup` clones the `Arc`,
//! which is what makes two `ubuf` handles "share the same backing" (copy on
//! write): `Arc::strong_count` *is* the shared refcount, so `is_unique`
//! reduces to a single atomic load instead of a hand-rolled counter plus
//! callback, matching the design note "use an internal `Arc`-like with a
//! method that returns exclusive mutable access iff the refcount is 1".

use crate::error::{Result, UpipeError};
use crate::umem::{MemRegion, Umem};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Refcounted handle to a single memory region.
#[derive(Clone)]
pub struct Shared {
    backing: Arc<RwLock<MemRegion>>,
}

impl Shared {
    /// Wrap a freshly allocated region as a new, uniquely-owned backing.
    pub fn new(region: MemRegion) -> Self {
        Shared {
            backing: Arc::new(RwLock::new(region)),
        }
    }

    /// Allocate a new backing of `size` bytes via `umem`.
    pub fn alloc(umem: &dyn Umem, size: usize) -> Result<Self> {
        Ok(Self::new(umem.alloc(size)?))
    }

    /// Share this backing: increments the `Arc` strong count. O(1), no
    /// memory copy — the defining property of copy-on-write duplication.
    pub fn dup(&self) -> Self {
        Shared {
            backing: Arc::clone(&self.backing),
        }
    }

    /// `true` iff `a` and `b` point at the same backing. Used by `Block`'s
    /// O(1) append to detect when two segments are already contiguous
    /// slices of one shared region.
    pub fn ptr_eq(a: &Shared, b: &Shared) -> bool {
        Arc::ptr_eq(&a.backing, &b.backing)
    }

    /// `true` iff this is the only handle pointing at the backing (invariant
    /// B2: a write mapping is only granted when this holds).
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.backing) == 1
    }

    /// Size of the backing region in bytes.
    pub fn size(&self) -> usize {
        self.backing.read().size()
    }

    /// Acquire a read mapping. Always succeeds — shared reads never
    /// conflict with copy-on-write.
    pub fn read(&self) -> RwLockReadGuard<'_, MemRegion> {
        self.backing.read()
    }

    /// Acquire a write mapping. Fails with [`UpipeError::Busy`] unless this
    /// handle is the sole owner of the backing; the caller is expected to
    /// `dup` a fresh copy and retry (or wait for siblings to drop).
    pub fn try_write(&self) -> Result<RwLockWriteGuard<'_, MemRegion>> {
        if !self.is_unique() {
            return Err(UpipeError::Busy);
        }
        Ok(self.backing.write())
    }

    /// Deep-copy this backing's bytes into a fresh, uniquely-owned backing
    /// allocated via `umem`. Used when a caller needs to write but the
    /// backing is shared (`dup`-then-copy discipline).
    pub fn deep_copy(&self, umem: &dyn Umem) -> Result<Self> {
        let src = self.read();
        let mut region = umem.alloc(src.size())?;
        region.as_mut_slice().copy_from_slice(src.as_slice());
        drop(src);
        Ok(Self::new(region))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::umem::HeapUmem;

    #[test]
    fn dup_shares_and_blocks_write() {
        let umem = HeapUmem;
        let a = Shared::alloc(&umem, 16).unwrap();
        assert!(a.is_unique());
        assert!(a.try_write().is_ok());

        let b = a.dup();
        assert!(!a.is_unique());
        assert!(matches!(a.try_write(), Err(UpipeError::Busy)));
        assert!(matches!(b.try_write(), Err(UpipeError::Busy)));

        drop(b);
        assert!(a.is_unique());
        assert!(a.try_write().is_ok());
    }

    #[test]
    fn deep_copy_is_independent() {
        let umem = HeapUmem;
        let a = Shared::alloc(&umem, 4).unwrap();
        a.try_write().unwrap().as_mut_slice().copy_from_slice(&[1, 2, 3, 4]);
        let b = a.deep_copy(&umem).unwrap();
        assert_eq!(b.read().as_slice(), &[1, 2, 3, 4]);
        b.try_write().unwrap().as_mut_slice()[0] = 0xff;
        assert_eq!(a.read().as_slice()[0], 1);
        assert_eq!(b.read().as_slice()[0], 0xff);
    }
}
