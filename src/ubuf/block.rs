//! Block `ubuf`: a chain of byte segments that reads as one contiguous run.
//!
//! Each [`Segment`] is a `(shared backing, offset, len)` triple; [`Block`]
//! is a deque of segments so that `append` of two blocks whose trailing and
//! leading segments share a backing and are byte-contiguous collapses into
//! a single segment in O(1), per spec. Segments never move once pushed —
//! `resize` only ever trims existing segments (cheap bookkeeping) or pushes
//! freshly allocated ones, so already-mapped ranges are never relocated
//! (invariant B3). Because `read`/`write` borrow `&self`/`&mut self` for
//! the lifetime of the returned mapping, the borrow checker enforces
//! invariant B1 (mapping must be unmapped before further structural
//! mutation) for free — no runtime bookkeeping needed.

use crate::error::{Result, UpipeError};
use crate::umem::Umem;
use crate::ubuf::shared::Shared;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

struct Segment {
    shared: Shared,
    offset: usize,
    len: usize,
}

impl Segment {
    fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// A logically-contiguous byte buffer made of one or more backing segments.
pub struct Block {
    segments: VecDeque<Segment>,
    umem: Arc<dyn Umem>,
}

/// Borrowed read access to a sub-range, valid only while it is alive.
pub struct BlockReadGuard<'a> {
    guard: parking_lot::RwLockReadGuard<'a, crate::umem::MemRegion>,
    offset: usize,
    len: usize,
}

impl Deref for BlockReadGuard<'_> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.guard.as_slice()[self.offset..self.offset + self.len]
    }
}

/// Borrowed write access to a sub-range, valid only while it is alive.
pub struct BlockWriteGuard<'a> {
    guard: parking_lot::RwLockWriteGuard<'a, crate::umem::MemRegion>,
    offset: usize,
    len: usize,
}

impl Deref for BlockWriteGuard<'_> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.guard.as_slice()[self.offset..self.offset + self.len]
    }
}

impl DerefMut for BlockWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        let offset = self.offset;
        let len = self.len;
        &mut self.guard.as_mut_slice()[offset..offset + len]
    }
}

/// Result of [`Block::peek`]: either a zero-copy borrow of a single
/// segment, or a borrow of the caller-supplied fallback buffer when the
/// range spanned more than one segment.
pub enum Peeked<'a> {
    Zero(BlockReadGuard<'a>),
    Copied(&'a [u8]),
}

impl Deref for Peeked<'_> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        match self {
            Peeked::Zero(guard) => guard,
            Peeked::Copied(slice) => slice,
        }
    }
}

impl Block {
    /// Allocate a fresh, single-segment block of `size` bytes.
    pub fn alloc(umem: Arc<dyn Umem>, size: usize) -> Result<Self> {
        let shared = Shared::alloc(umem.as_ref(), size)?;
        let mut segments = VecDeque::with_capacity(1);
        segments.push_back(Segment {
            shared,
            offset: 0,
            len: size,
        });
        Ok(Block { segments, umem })
    }

    /// Total logical size across all segments.
    pub fn size(&self) -> usize {
        self.segments.iter().map(|s| s.len).sum()
    }

    /// Share every segment's backing with a new `Block` handle (copy on
    /// write: no memory is copied here).
    pub fn dup(&self) -> Self {
        Block {
            segments: self
                .segments
                .iter()
                .map(|s| Segment {
                    shared: s.shared.dup(),
                    offset: s.offset,
                    len: s.len,
                })
                .collect(),
            umem: Arc::clone(&self.umem),
        }
    }

    fn locate(&self, offset: usize, len: usize) -> Result<(usize, usize)> {
        if len == 0 {
            return Err(UpipeError::Invalid("zero-length range".into()));
        }
        let mut base = 0usize;
        for (idx, seg) in self.segments.iter().enumerate() {
            if offset >= base && offset + len <= base + seg.len {
                return Ok((idx, offset - base));
            }
            base += seg.len;
        }
        Err(UpipeError::Invalid(format!(
            "range [{offset}..{}) does not fall within a single segment; use peek/extract",
            offset + len
        )))
    }

    /// Map `[offset, offset+len)` for reading. Fails with [`UpipeError::Invalid`]
    /// if the range crosses a segment boundary (use [`Block::peek`] or
    /// [`Block::extract`] for that).
    pub fn read(&self, offset: usize, len: usize) -> Result<BlockReadGuard<'_>> {
        let (idx, local) = self.locate(offset, len)?;
        let seg = &self.segments[idx];
        let guard = seg.shared.read();
        Ok(BlockReadGuard {
            guard,
            offset: seg.offset + local,
            len,
        })
    }

    /// Map `[offset, offset+len)` for writing. Fails with
    /// [`UpipeError::Busy`] if the covering segment's backing is shared
    /// (invariant B2); the caller should `dup`-then-copy.
    pub fn write(&mut self, offset: usize, len: usize) -> Result<BlockWriteGuard<'_>> {
        let (idx, local) = self.locate(offset, len)?;
        let seg = &self.segments[idx];
        let guard = seg.shared.try_write()?;
        Ok(BlockWriteGuard {
            guard,
            offset: seg.offset + local,
            len,
        })
    }

    /// Bounded read that never fails on a segment-crossing range: copies
    /// into `fallback` only if the range spans more than one segment,
    /// otherwise returns a zero-copy borrow. The returned [`Peeked`] holds
    /// the segment's read lock for as long as the zero-copy case is alive.
    pub fn peek<'a>(&'a self, offset: usize, len: usize, fallback: &'a mut [u8]) -> Result<Peeked<'a>> {
        if let Ok(guard) = self.read(offset, len) {
            return Ok(Peeked::Zero(guard));
        }
        if fallback.len() < len {
            return Err(UpipeError::Invalid("fallback buffer too small".into()));
        }
        self.extract_into(offset, len, &mut fallback[..len])?;
        Ok(Peeked::Copied(&fallback[..len]))
    }

    fn extract_into(&self, offset: usize, len: usize, out: &mut [u8]) -> Result<()> {
        let mut base = 0usize;
        let mut remaining = len;
        let mut written = 0usize;
        let mut cursor = offset;
        for seg in &self.segments {
            let seg_start = base;
            let seg_end = base + seg.len;
            base = seg_end;
            if cursor >= seg_end || remaining == 0 {
                continue;
            }
            if cursor < seg_start {
                return Err(UpipeError::Invalid("range starts before buffer".into()));
            }
            let local = cursor - seg_start;
            let avail = seg.len - local;
            let take = avail.min(remaining);
            let guard = seg.shared.read();
            out[written..written + take]
                .copy_from_slice(&guard.as_slice()[seg.offset + local..seg.offset + local + take]);
            written += take;
            remaining -= take;
            cursor += take;
        }
        if remaining != 0 {
            return Err(UpipeError::Invalid("range exceeds buffer size".into()));
        }
        Ok(())
    }

    /// Deep-copy `[offset, offset+len)` out of the block, regardless of how
    /// many segments it spans.
    pub fn extract(&self, offset: usize, len: usize) -> Result<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.extract_into(offset, len, &mut out)?;
        Ok(out)
    }

    /// Search for the first occurrence of `needle` starting at `from`.
    pub fn scan(&self, needle: u8, from: usize) -> Option<usize> {
        let total = self.size();
        let mut base = 0usize;
        for seg in &self.segments {
            let seg_start = base;
            base += seg.len;
            if base <= from {
                continue;
            }
            let guard = seg.shared.read();
            let start_local = from.saturating_sub(seg_start);
            let slice = &guard.as_slice()[seg.offset + start_local..seg.offset + seg.len];
            if let Some(pos) = slice.iter().position(|&b| b == needle) {
                return Some(seg_start + start_local + pos);
            }
        }
        let _ = total;
        None
    }

    /// Join `other` onto the end of `self`. O(1) if `other`'s first segment
    /// shares a backing with `self`'s last segment and is byte-contiguous
    /// with it; otherwise the segments are appended (O(k) in the number of
    /// `other`'s segments, still no memory copy).
    pub fn append(&mut self, mut other: Block) {
        if let (Some(tail), Some(head)) = (self.segments.back(), other.segments.front()) {
            if Shared::ptr_eq(&tail.shared, &head.shared) && tail.end() == head.offset {
                let extra = head.len;
                other.segments.pop_front();
                if let Some(tail_mut) = self.segments.back_mut() {
                    tail_mut.len += extra;
                }
            }
        }
        self.segments.extend(other.segments.into_iter());
    }

    /// Change the logical extent: `shift < 0` prepends `-shift` freshly
    /// allocated bytes, `shift > 0` trims that many bytes off the front;
    /// afterwards the block is grown (new trailing segment) or shrunk
    /// (trailing segments trimmed/dropped) to reach exactly `new_size`.
    ///
    /// Never returns [`UpipeError::Busy`]: growth always allocates a new
    /// segment and shrink/trim only adjusts segment bookkeeping, neither of
    /// which touches shared memory in place.
    pub fn resize(&mut self, shift: isize, new_size: usize) -> Result<()> {
        if shift < 0 {
            let extra = (-shift) as usize;
            let shared = Shared::alloc(self.umem.as_ref(), extra)?;
            self.segments.push_front(Segment {
                shared,
                offset: 0,
                len: extra,
            });
        } else if shift > 0 {
            let mut to_trim = shift as usize;
            while to_trim > 0 {
                let seg = self
                    .segments
                    .front_mut()
                    .ok_or_else(|| UpipeError::Invalid("resize shift exceeds block size".into()))?;
                if seg.len > to_trim {
                    seg.offset += to_trim;
                    seg.len -= to_trim;
                    to_trim = 0;
                } else {
                    to_trim -= seg.len;
                    self.segments.pop_front();
                }
            }
        }

        let current = self.size();
        if new_size > current {
            let extra = new_size - current;
            let shared = Shared::alloc(self.umem.as_ref(), extra)?;
            self.segments.push_back(Segment {
                shared,
                offset: 0,
                len: extra,
            });
        } else if new_size < current {
            let mut to_trim = current - new_size;
            while to_trim > 0 {
                let seg = self
                    .segments
                    .back_mut()
                    .ok_or_else(|| UpipeError::Invalid("resize new_size exceeds block size".into()))?;
                if seg.len > to_trim {
                    seg.len -= to_trim;
                    to_trim = 0;
                } else {
                    to_trim -= seg.len;
                    self.segments.pop_back();
                }
            }
        }
        Ok(())
    }

    /// Split into `(self[0..at), self[at..))`, returning the suffix as a
    /// new `Block` and retaining the prefix in `self`.
    pub fn split(&mut self, at: usize) -> Result<Block> {
        let total = self.size();
        if at > total {
            return Err(UpipeError::Invalid("split point past end of block".into()));
        }
        let mut suffix = VecDeque::new();
        let mut base = 0usize;
        let mut prefix = VecDeque::new();
        for seg in self.segments.drain(..) {
            let seg_start = base;
            let seg_end = base + seg.len;
            base = seg_end;
            if seg_end <= at {
                prefix.push_back(seg);
            } else if seg_start >= at {
                suffix.push_back(seg);
            } else {
                let local = at - seg_start;
                prefix.push_back(Segment {
                    shared: seg.shared.dup(),
                    offset: seg.offset,
                    len: local,
                });
                suffix.push_back(Segment {
                    shared: seg.shared,
                    offset: seg.offset + local,
                    len: seg.len - local,
                });
            }
        }
        self.segments = prefix;
        Ok(Block {
            segments: suffix,
            umem: Arc::clone(&self.umem),
        })
    }

    /// Insert `other`'s segments at logical position `at`.
    pub fn insert(&mut self, at: usize, other: Block) -> Result<()> {
        let suffix = self.split(at)?;
        self.append(other);
        self.append(suffix);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::umem::HeapUmem;

    fn umem() -> Arc<dyn Umem> {
        Arc::new(HeapUmem)
    }

    #[test]
    fn append_and_resize_scenario() {
        // alloc 1000 bytes, fill with i & 0xff, resize(shift=-100,
        // new_size=1200), verify the shifted and extended contents.
        let mut block = Block::alloc(umem(), 1000).unwrap();
        {
            let mut w = block.write(0, 1000).unwrap();
            for (i, b) in w.iter_mut().enumerate() {
                *b = (i & 0xff) as u8;
            }
        }
        block.resize(-100, 1200).unwrap();
        assert_eq!(block.size(), 1200);
        let data = block.extract(100, 1000).unwrap();
        for (i, b) in data.iter().enumerate() {
            assert_eq!(*b, (i & 0xff) as u8);
        }
    }

    #[test]
    fn write_fails_busy_when_shared() {
        let mut block = Block::alloc(umem(), 16).unwrap();
        let dup = block.dup();
        assert!(matches!(block.write(0, 16), Err(UpipeError::Busy)));
        drop(dup);
        assert!(block.write(0, 16).is_ok());
    }

    #[test]
    fn read_across_segments_needs_peek_or_extract() {
        let mut a = Block::alloc(umem(), 4).unwrap();
        a.write(0, 4).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        let mut b = Block::alloc(umem(), 4).unwrap();
        b.write(0, 4).unwrap().copy_from_slice(&[5, 6, 7, 8]);
        a.append(b);
        assert_eq!(a.size(), 8);
        assert!(a.read(2, 4).is_err());
        let extracted = a.extract(2, 4).unwrap();
        assert_eq!(extracted, vec![3, 4, 5, 6]);
        let mut fallback = [0u8; 4];
        let peeked = a.peek(2, 4, &mut fallback).unwrap();
        assert_eq!(&*peeked, &[3u8, 4, 5, 6][..]);
    }

    #[test]
    fn scan_finds_byte() {
        let mut block = Block::alloc(umem(), 8).unwrap();
        block.write(0, 8).unwrap().copy_from_slice(&[0, 0, 0, 9, 0, 0, 0, 0]);
        assert_eq!(block.scan(9, 0), Some(3));
        assert_eq!(block.scan(9, 4), None);
    }

    #[test]
    fn split_and_insert() {
        let mut block = Block::alloc(umem(), 8).unwrap();
        block.write(0, 8).unwrap().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let suffix = block.split(4).unwrap();
        assert_eq!(block.size(), 4);
        assert_eq!(suffix.size(), 4);
        assert_eq!(block.extract(0, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(suffix.extract(0, 4).unwrap(), vec![5, 6, 7, 8]);

        let mut insert_block = Block::alloc(umem(), 2).unwrap();
        insert_block.write(0, 2).unwrap().copy_from_slice(&[0xaa, 0xbb]);
        block.insert(2, insert_block).unwrap();
        assert_eq!(block.size(), 6);
        assert_eq!(block.extract(0, 6).unwrap(), vec![1, 2, 0xaa, 0xbb, 3, 4]);
    }
}
