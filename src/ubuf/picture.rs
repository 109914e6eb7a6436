//! Picture `ubuf`: a multi-plane 2-D buffer (YUV, RGB, or any planar format
//! describable by per-plane subsampling and macropixel size).
//!
//! All planes live in one [`Shared`] backing, concatenated with a margin of
//! padding pixels reserved on every side so that `resize` (crop/pad) never
//! needs to reallocate or copy as long as the requested extent stays within
//! the margin — the picture-buffer analogue of block's "never relocates
//! already-mapped data" invariant (B3).

use crate::error::{Result, UpipeError};
use crate::ubuf::shared::Shared;
use crate::umem::Umem;
use std::sync::Arc;

/// Static description of one plane: chroma name plus subsampling and
/// macropixel geometry. `hsub`/`vsub` are the usual 1/2/4 chroma
/// subsampling divisors; `mpixel_size` is bytes per macropixel (e.g. 1 for
/// 8-bit luma/chroma, 4 for packed RGBA).
#[derive(Debug, Clone)]
pub struct PlaneFormat {
    pub chroma: String,
    pub hsub: u32,
    pub vsub: u32,
    pub mpixel_size: u32,
}

impl PlaneFormat {
    pub fn new(chroma: &str, hsub: u32, vsub: u32, mpixel_size: u32) -> Self {
        PlaneFormat {
            chroma: chroma.to_string(),
            hsub,
            vsub,
            mpixel_size,
        }
    }
}

fn div_round_up(a: u32, b: u32) -> u32 {
    (a + b - 1) / b
}

struct Plane {
    format: PlaneFormat,
    stride: usize,
    alloc_rows: usize,
    /// Byte offset of the allocated rectangle's row 0 within the backing.
    base_offset: usize,
    /// Macropixel column where the visible area currently starts.
    origin_col: u32,
    /// Row where the visible area currently starts.
    origin_row: u32,
}

/// A multi-plane picture buffer.
pub struct Picture {
    shared: Shared,
    umem: Arc<dyn Umem>,
    hsize: u32,
    vsize: u32,
    margin: u32,
    planes: Vec<Plane>,
}

/// Zero-copy read access to a plane rectangle, one row at a time (rows are
/// not contiguous across the rectangle in general, since a plane's stride
/// usually exceeds the visible width).
pub struct PlaneReadGuard<'a> {
    guard: parking_lot::RwLockReadGuard<'a, crate::umem::MemRegion>,
    row_offset: usize,
    stride: usize,
    row_bytes: usize,
    rows: u32,
}

impl PlaneReadGuard<'_> {
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn row(&self, i: u32) -> &[u8] {
        let start = self.row_offset + self.stride * i as usize;
        &self.guard.as_slice()[start..start + self.row_bytes]
    }
}

/// Mutable access to a plane rectangle, row by row.
pub struct PlaneWriteGuard<'a> {
    guard: parking_lot::RwLockWriteGuard<'a, crate::umem::MemRegion>,
    row_offset: usize,
    stride: usize,
    row_bytes: usize,
    rows: u32,
}

impl PlaneWriteGuard<'_> {
    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn row(&self, i: u32) -> &[u8] {
        let start = self.row_offset + self.stride * i as usize;
        &self.guard.as_slice()[start..start + self.row_bytes]
    }

    pub fn row_mut(&mut self, i: u32) -> &mut [u8] {
        let start = self.row_offset + self.stride * i as usize;
        &mut self.guard.as_mut_slice()[start..start + self.row_bytes]
    }
}

impl Picture {
    /// Allocate a picture of visible size `hsize x vsize` with the given
    /// planes, reserving `margin` pixels of padding on every side (at full
    /// resolution; each plane's own margin is `margin` divided by its
    /// subsampling, rounded up).
    pub fn alloc(
        umem: Arc<dyn Umem>,
        hsize: u32,
        vsize: u32,
        formats: &[PlaneFormat],
        margin: u32,
    ) -> Result<Self> {
        if hsize == 0 || vsize == 0 {
            return Err(UpipeError::Invalid("picture dimensions must be > 0".into()));
        }
        let mut planes = Vec::with_capacity(formats.len());
        let mut total = 0usize;
        for fmt in formats {
            if fmt.hsub == 0 || fmt.vsub == 0 || fmt.mpixel_size == 0 {
                return Err(UpipeError::Invalid(format!(
                    "plane {} has a zero subsampling or macropixel size",
                    fmt.chroma
                )));
            }
            let h_margin = div_round_up(margin, fmt.hsub);
            let v_margin = div_round_up(margin, fmt.vsub);
            let alloc_cols = div_round_up(hsize, fmt.hsub) + 2 * h_margin;
            let alloc_rows = div_round_up(vsize, fmt.vsub) + 2 * v_margin;
            let stride = alloc_cols as usize * fmt.mpixel_size as usize;
            let base_offset = total;
            total += stride * alloc_rows as usize;
            planes.push(Plane {
                format: fmt.clone(),
                stride,
                alloc_rows: alloc_rows as usize,
                base_offset,
                origin_col: h_margin,
                origin_row: v_margin,
            });
        }
        if total == 0 {
            return Err(UpipeError::Invalid("picture has no planes".into()));
        }
        let shared = Shared::alloc(umem.as_ref(), total)?;
        Ok(Picture {
            shared,
            umem,
            hsize,
            vsize,
            margin,
            planes,
        })
    }

    /// Visible `(hsize, vsize)`.
    pub fn size(&self) -> (u32, u32) {
        (self.hsize, self.vsize)
    }

    pub fn plane_formats(&self) -> impl Iterator<Item = &PlaneFormat> {
        self.planes.iter().map(|p| &p.format)
    }

    /// `(stride, hsub, vsub, mpixel_size)` for the named plane.
    pub fn plane_size(&self, chroma: &str) -> Result<(usize, u32, u32, u32)> {
        let plane = self.find_plane(chroma)?;
        Ok((
            plane.stride,
            plane.format.hsub,
            plane.format.vsub,
            plane.format.mpixel_size,
        ))
    }

    fn find_plane(&self, chroma: &str) -> Result<&Plane> {
        self.planes
            .iter()
            .find(|p| p.format.chroma == chroma)
            .ok_or_else(|| UpipeError::Invalid(format!("no plane named {chroma}")))
    }

    /// Share this backing with a new `Picture` handle (copy on write).
    pub fn dup(&self) -> Self {
        Picture {
            shared: self.shared.dup(),
            umem: Arc::clone(&self.umem),
            hsize: self.hsize,
            vsize: self.vsize,
            margin: self.margin,
            planes: self
                .planes
                .iter()
                .map(|p| Plane {
                    format: p.format.clone(),
                    stride: p.stride,
                    alloc_rows: p.alloc_rows,
                    base_offset: p.base_offset,
                    origin_col: p.origin_col,
                    origin_row: p.origin_row,
                })
                .collect(),
        }
    }

    fn rect_geometry(&self, plane: &Plane, h: u32, v: u32, width: u32, height: u32) -> Result<(usize, usize, u32)> {
        let cols = div_round_up(width, plane.format.hsub);
        let rows = div_round_up(height, plane.format.vsub);
        let col0 = plane.origin_col + h / plane.format.hsub;
        let row0 = plane.origin_row + v / plane.format.vsub;
        if row0 as usize + rows as usize > plane.alloc_rows {
            return Err(UpipeError::Invalid(format!(
                "rectangle exceeds allocated rows for plane {}",
                plane.format.chroma
            )));
        }
        let row_bytes = cols as usize * plane.format.mpixel_size as usize;
        let row_offset = plane.base_offset + row0 as usize * plane.stride + col0 as usize * plane.format.mpixel_size as usize;
        if row_offset + row_bytes > plane.base_offset + plane.stride * plane.alloc_rows {
            return Err(UpipeError::Invalid(format!(
                "rectangle exceeds plane {} bounds",
                plane.format.chroma
            )));
        }
        Ok((row_offset, row_bytes, rows))
    }

    /// Read-map a rectangle `[h, h+width) x [v, v+height)` of the named
    /// plane, in plane-local (possibly subsampled) pixel coordinates.
    pub fn read(&self, chroma: &str, h: u32, v: u32, width: u32, height: u32) -> Result<PlaneReadGuard<'_>> {
        let plane = self.find_plane(chroma)?;
        let (row_offset, row_bytes, rows) = self.rect_geometry(plane, h, v, width, height)?;
        Ok(PlaneReadGuard {
            guard: self.shared.read(),
            row_offset,
            stride: plane.stride,
            row_bytes,
            rows,
        })
    }

    /// Write-map a rectangle of the named plane. Fails with
    /// [`UpipeError::Busy`] unless this is the sole handle on the backing.
    pub fn write(&mut self, chroma: &str, h: u32, v: u32, width: u32, height: u32) -> Result<PlaneWriteGuard<'_>> {
        let plane = self.find_plane(chroma)?;
        let (row_offset, row_bytes, rows) = self.rect_geometry(plane, h, v, width, height)?;
        let guard = self.shared.try_write()?;
        Ok(PlaneWriteGuard {
            guard,
            row_offset,
            stride: plane.stride,
            row_bytes,
            rows,
        })
    }

    /// Crop or pad the visible extent by shifting the origin by
    /// `(dh, dv)` (negative grows toward lower coordinates, consuming
    /// margin) and setting the new visible size. Fails with
    /// [`UpipeError::Invalid`] if the result would step outside the
    /// reserved margin.
    pub fn resize(&mut self, dh: i32, dv: i32, new_hsize: u32, new_vsize: u32) -> Result<()> {
        for plane in &mut self.planes {
            let dh_sub = dh / plane.format.hsub as i32;
            let dv_sub = dv / plane.format.vsub as i32;
            let new_origin_col = plane.origin_col as i32 - dh_sub;
            let new_origin_row = plane.origin_row as i32 - dv_sub;
            if new_origin_col < 0 || new_origin_row < 0 {
                return Err(UpipeError::Invalid("resize exceeds reserved margin".into()));
            }
            let new_cols = div_round_up(new_hsize, plane.format.hsub);
            let new_rows = div_round_up(new_vsize, plane.format.vsub);
            let alloc_cols = (plane.stride / plane.format.mpixel_size as usize) as u32;
            if new_origin_col as u32 + new_cols > alloc_cols {
                return Err(UpipeError::Invalid("resize exceeds allocated width".into()));
            }
            if new_origin_row as u32 + new_rows > plane.alloc_rows as u32 {
                return Err(UpipeError::Invalid("resize exceeds allocated height".into()));
            }
            plane.origin_col = new_origin_col as u32;
            plane.origin_row = new_origin_row as u32;
        }
        self.hsize = new_hsize;
        self.vsize = new_vsize;
        Ok(())
    }

    /// Compose `src` into `self` at top-left `(h, v)`, for every plane
    /// present in both pictures. `alpha` is a global multiplier (0..=255);
    /// if `src` additionally has an `"a"` (alpha) plane, its per-pixel value
    /// is multiplied in too and any resulting alpha below `threshold` is
    /// treated as fully transparent (source pixel skipped).
    pub fn blit(&mut self, src: &Picture, h: u32, v: u32, alpha: u8, threshold: u8) -> Result<()> {
        let (src_w, src_h) = src.size();
        let src_alpha_plane = src.planes.iter().find(|p| p.format.chroma == "a");

        let chromas: Vec<String> = self
            .planes
            .iter()
            .filter(|p| p.format.chroma != "a" && src.planes.iter().any(|sp| sp.format.chroma == p.format.chroma))
            .map(|p| p.format.chroma.clone())
            .collect();

        for chroma in chromas {
            let mpixel_size;
            {
                let dst_plane = self.find_plane(&chroma)?;
                mpixel_size = dst_plane.format.mpixel_size;
            }
            let src_guard = src.read(&chroma, 0, 0, src_w, src_h)?;
            let alpha_guard = match src_alpha_plane {
                Some(_) => Some(src.read("a", 0, 0, src_w, src_h)?),
                None => None,
            };
            let mut dst_guard = self.write(&chroma, h, v, src_w, src_h)?;
            let rows = dst_guard.rows().min(src_guard.rows());
            for row in 0..rows {
                let src_row = src_guard.row(row).to_vec();
                let alpha_row = alpha_guard.as_ref().map(|g| g.row(row).to_vec());
                let dst_row = dst_guard.row_mut(row);
                let cols = (dst_row.len() / mpixel_size as usize).min(src_row.len() / mpixel_size as usize);
                for col in 0..cols {
                    let px_alpha = match &alpha_row {
                        Some(a) => ((a[col] as u32 * alpha as u32) / 255) as u8,
                        None => alpha,
                    };
                    if px_alpha < threshold {
                        continue;
                    }
                    let s = col * mpixel_size as usize;
                    let d = col * mpixel_size as usize;
                    if px_alpha == 0xff {
                        dst_row[d..d + mpixel_size as usize]
                            .copy_from_slice(&src_row[s..s + mpixel_size as usize]);
                    } else {
                        for byte in 0..mpixel_size as usize {
                            let sv = src_row[s + byte] as u32;
                            let dv = dst_row[d + byte] as u32;
                            let blended = (sv * px_alpha as u32 + dv * (255 - px_alpha as u32)) / 255;
                            dst_row[d + byte] = blended as u8;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Convert one RGBA pixel to Y/U/V/A using BT.601 coefficients.
///
/// `fullrange` selects 0-255 luma/chroma excursion; otherwise the standard
/// studio-range offsets (16-235 luma, 16-240 chroma) are used.
pub fn rgba_to_yuva_pixel(r: u8, g: u8, b: u8, a: u8, fullrange: bool) -> (u8, u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 0.299 * r + 0.587 * g + 0.114 * b;
    let u = -0.168_736 * r - 0.331_264 * g + 0.5 * b + 128.0;
    let v = 0.5 * r - 0.418_688 * g - 0.081_312 * b + 128.0;
    if fullrange {
        (y.round() as u8, u.round() as u8, v.round() as u8, a)
    } else {
        let y = 16.0 + y * (219.0 / 255.0);
        let u = 16.0 + (u - 128.0) * (224.0 / 255.0) + 112.0;
        let v = 16.0 + (v - 128.0) * (224.0 / 255.0) + 112.0;
        (
            y.round().clamp(16.0, 235.0) as u8,
            u.round().clamp(16.0, 240.0) as u8,
            v.round().clamp(16.0, 240.0) as u8,
            a,
        )
    }
}

/// Convert one Y/U/V/A pixel to RGBA using BT.601 coefficients (the inverse
/// of [`rgba_to_yuva_pixel`]).
pub fn yuva_to_rgba_pixel(y: u8, u: u8, v: u8, a: u8, fullrange: bool) -> (u8, u8, u8, u8) {
    let (y, u, v) = if fullrange {
        (y as f32, u as f32 - 128.0, v as f32 - 128.0)
    } else {
        (
            (y as f32 - 16.0) * (255.0 / 219.0),
            (u as f32 - 128.0) * (255.0 / 224.0),
            (v as f32 - 128.0) * (255.0 / 224.0),
        )
    };
    let r = y + 1.402 * v;
    let g = y - 0.344_136 * u - 0.714_136 * v;
    let b = y + 1.772 * u;
    (
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
        a,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::umem::HeapUmem;

    fn yuv420p_formats() -> Vec<PlaneFormat> {
        vec![
            PlaneFormat::new("y", 1, 1, 1),
            PlaneFormat::new("u", 2, 2, 1),
            PlaneFormat::new("v", 2, 2, 1),
        ]
    }

    fn umem() -> Arc<dyn Umem> {
        Arc::new(HeapUmem)
    }

    fn fill_plane(pic: &mut Picture, chroma: &str, value: u8) {
        let (w, h) = pic.size();
        let (_, hsub, vsub, _) = pic.plane_size(chroma).unwrap();
        let mut guard = pic.write(chroma, 0, 0, w, h).unwrap();
        for row in 0..guard.rows() {
            guard.row_mut(row).iter_mut().for_each(|b| *b = value);
        }
        let _ = (hsub, vsub);
    }

    #[test]
    fn blit_identity_scenario() {
        // Scenario 2: 1280x720 YUV420P dest filled Y=16, 320x180 Y=235
        // source, blit at (64,32) alpha=0xff; rect reads 235, rest 16.
        let formats = yuv420p_formats();
        let mut dst = Picture::alloc(umem(), 1280, 720, &formats, 0).unwrap();
        fill_plane(&mut dst, "y", 16);
        fill_plane(&mut dst, "u", 128);
        fill_plane(&mut dst, "v", 128);

        let mut src = Picture::alloc(umem(), 320, 180, &[PlaneFormat::new("y", 1, 1, 1)], 0).unwrap();
        fill_plane(&mut src, "y", 235);

        dst.blit(&src, 64, 32, 0xff, 0).unwrap();

        let inside = dst.read("y", 64, 32, 320, 180).unwrap();
        for row in 0..inside.rows() {
            assert!(inside.row(row).iter().all(|&b| b == 235));
        }
        let outside = dst.read("y", 0, 0, 64, 720).unwrap();
        assert!(outside.row(0).iter().all(|&b| b == 16));
        let u_plane = dst.read("u", 0, 0, 640, 360).unwrap();
        assert!(u_plane.row(0).iter().all(|&b| b == 128));
    }

    #[test]
    fn write_fails_busy_when_shared() {
        let formats = yuv420p_formats();
        let mut pic = Picture::alloc(umem(), 16, 16, &formats, 0).unwrap();
        let dup = pic.dup();
        assert!(matches!(pic.write("y", 0, 0, 16, 16), Err(UpipeError::Busy)));
        drop(dup);
        assert!(pic.write("y", 0, 0, 16, 16).is_ok());
    }

    #[test]
    fn resize_crop_within_margin() {
        let formats = vec![PlaneFormat::new("y", 1, 1, 1)];
        let mut pic = Picture::alloc(umem(), 100, 100, &formats, 8).unwrap();
        pic.write("y", 0, 0, 100, 100)
            .unwrap()
            .row_mut(0)
            .iter_mut()
            .for_each(|b| *b = 7);
        pic.resize(4, 4, 92, 92).unwrap();
        assert_eq!(pic.size(), (92, 92));
        assert!(pic.resize(-100, 0, 192, 92).is_err());
    }

    #[test]
    fn rgba_yuva_round_trip_is_close() {
        let (y, u, v, a) = rgba_to_yuva_pixel(235, 235, 235, 255, true);
        let (r, g, b, a2) = yuva_to_rgba_pixel(y, u, v, a, true);
        assert!((r as i16 - 235).abs() <= 2);
        assert!((g as i16 - 235).abs() <= 2);
        assert!((b as i16 - 235).abs() <= 2);
        assert_eq!(a2, 255);
    }
}
