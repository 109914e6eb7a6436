//! Sound `ubuf`: planar or interleaved PCM.
//!
//! Unlike [`crate::ubuf::picture::Picture`], samples don't need a padding
//! margin scheme — `resize` by sample offset/length only ever trims or
//! grows at either end of the sample axis, and growth always allocates a
//! fresh backing for the new tail/head rather than relocating existing
//! sample data (so it shares block's "never touches already-mapped data"
//! reasoning, just one dimension instead of two).

use crate::error::{Result, UpipeError};
use crate::ubuf::shared::Shared;
use crate::umem::Umem;
use std::sync::Arc;

/// One channel (planar) or the single interleaved plane.
struct Plane {
    name: String,
    shared: Shared,
    /// Offset into the backing, in samples (not bytes).
    sample_offset: usize,
}

/// A sound buffer: `samples` frames of `sample_size` bytes each, across one
/// or more named planes. Interleaved sound is modeled as a single plane
/// named `"interleaved"` whose sample_size already accounts for all
/// channels.
pub struct Sound {
    umem: Arc<dyn Umem>,
    samples: usize,
    sample_size: usize,
    planes: Vec<Plane>,
}

pub struct SoundReadGuard<'a> {
    guard: parking_lot::RwLockReadGuard<'a, crate::umem::MemRegion>,
    byte_offset: usize,
    byte_len: usize,
}

impl std::ops::Deref for SoundReadGuard<'_> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.guard.as_slice()[self.byte_offset..self.byte_offset + self.byte_len]
    }
}

pub struct SoundWriteGuard<'a> {
    guard: parking_lot::RwLockWriteGuard<'a, crate::umem::MemRegion>,
    byte_offset: usize,
    byte_len: usize,
}

impl std::ops::Deref for SoundWriteGuard<'_> {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        &self.guard.as_slice()[self.byte_offset..self.byte_offset + self.byte_len]
    }
}

impl std::ops::DerefMut for SoundWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        let (offset, len) = (self.byte_offset, self.byte_len);
        &mut self.guard.as_mut_slice()[offset..offset + len]
    }
}

impl Sound {
    /// Allocate a planar sound buffer: one backing per entry in `channels`.
    pub fn alloc_planar(umem: Arc<dyn Umem>, samples: usize, sample_size: usize, channels: &[&str]) -> Result<Self> {
        if samples == 0 || sample_size == 0 {
            return Err(UpipeError::Invalid("samples and sample_size must be > 0".into()));
        }
        if channels.is_empty() {
            return Err(UpipeError::Invalid("at least one channel required".into()));
        }
        let mut planes = Vec::with_capacity(channels.len());
        for name in channels {
            let shared = Shared::alloc(umem.as_ref(), samples * sample_size)?;
            planes.push(Plane {
                name: name.to_string(),
                shared,
                sample_offset: 0,
            });
        }
        Ok(Sound {
            umem,
            samples,
            sample_size,
            planes,
        })
    }

    /// Allocate an interleaved sound buffer with `sample_size` covering all
    /// channels combined (e.g. `channels * bytes_per_channel_sample`).
    pub fn alloc_interleaved(umem: Arc<dyn Umem>, samples: usize, sample_size: usize) -> Result<Self> {
        Self::alloc_planar(umem, samples, sample_size, &["interleaved"])
    }

    /// `(samples, sample_size)`.
    pub fn size(&self) -> (usize, usize) {
        (self.samples, self.sample_size)
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> {
        self.planes.iter().map(|p| p.name.as_str())
    }

    fn find_plane(&self, name: &str) -> Result<&Plane> {
        self.planes
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| UpipeError::Invalid(format!("no channel named {name}")))
    }

    pub fn dup(&self) -> Self {
        Sound {
            umem: Arc::clone(&self.umem),
            samples: self.samples,
            sample_size: self.sample_size,
            planes: self
                .planes
                .iter()
                .map(|p| Plane {
                    name: p.name.clone(),
                    shared: p.shared.dup(),
                    sample_offset: p.sample_offset,
                })
                .collect(),
        }
    }

    fn byte_range(&self, plane: &Plane, offset: usize, len: usize) -> Result<(usize, usize)> {
        if offset + len > self.samples {
            return Err(UpipeError::Invalid("sample range exceeds buffer size".into()));
        }
        let start = (plane.sample_offset + offset) * self.sample_size;
        Ok((start, len * self.sample_size))
    }

    /// Read-map `[offset, offset+len)` samples of the named channel.
    pub fn read(&self, channel: &str, offset: usize, len: usize) -> Result<SoundReadGuard<'_>> {
        let plane = self.find_plane(channel)?;
        let (byte_offset, byte_len) = self.byte_range(plane, offset, len)?;
        Ok(SoundReadGuard {
            guard: plane.shared.read(),
            byte_offset,
            byte_len,
        })
    }

    /// Write-map `[offset, offset+len)` samples. Fails with
    /// [`UpipeError::Busy`] unless this channel's backing is uniquely held.
    pub fn write(&mut self, channel: &str, offset: usize, len: usize) -> Result<SoundWriteGuard<'_>> {
        let plane = self.find_plane(channel)?;
        let (byte_offset, byte_len) = self.byte_range(plane, offset, len)?;
        let guard = plane.shared.try_write()?;
        Ok(SoundWriteGuard {
            guard,
            byte_offset,
            byte_len,
        })
    }

    /// Change the sample extent: `shift < 0` prepends `-shift` freshly
    /// allocated (zeroed) samples on every channel, `shift > 0` trims that
    /// many samples from the front; then each channel is grown or shrunk
    /// at the tail to reach `new_samples`.
    pub fn resize(&mut self, shift: isize, new_samples: usize) -> Result<()> {
        for plane in &mut self.planes {
            if shift < 0 {
                let extra = (-shift) as usize;
                let fresh = Shared::alloc(self.umem.as_ref(), (extra + self.samples) * self.sample_size)?;
                {
                    let mut w = fresh.try_write()?;
                    let old = plane.shared.read();
                    w.as_mut_slice()[extra * self.sample_size..]
                        .copy_from_slice(old.as_slice());
                }
                plane.shared = fresh;
                plane.sample_offset = 0;
            } else if shift > 0 {
                let trim = shift as usize;
                if trim > self.samples {
                    return Err(UpipeError::Invalid("resize shift exceeds sample count".into()));
                }
                plane.sample_offset += trim;
            }
        }
        let current = if shift < 0 {
            self.samples + (-shift) as usize
        } else {
            self.samples - shift.max(0) as usize
        };

        if new_samples > current {
            let extra = new_samples - current;
            for plane in &mut self.planes {
                let fresh = Shared::alloc(self.umem.as_ref(), (current + extra) * self.sample_size)?;
                {
                    let mut w = fresh.try_write()?;
                    let old = plane.shared.read();
                    let old_bytes = current * self.sample_size;
                    w.as_mut_slice()[..old_bytes].copy_from_slice(
                        &old.as_slice()[plane.sample_offset * self.sample_size
                            ..plane.sample_offset * self.sample_size + old_bytes],
                    );
                }
                plane.shared = fresh;
                plane.sample_offset = 0;
            }
        } else if new_samples < current {
            // Shrinking just lowers the logical sample count; channel
            // backings keep their trailing (now unused) bytes until the
            // next grow reallocates.
        }
        self.samples = new_samples;
        Ok(())
    }
}
