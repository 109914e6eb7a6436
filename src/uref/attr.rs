//! Typed attribute accessors for [`super::Uref`], grouped by the families
//! listed in the data model: flow, clock, picture-flow, sound-flow,
//! block-flow, RTP, and HLS/M3U.
//!
//! Every accessor family follows the same contract: `get_*` returns
//! [`UpipeError::Invalid`] if the attribute is absent or of the wrong
//! type; `set_*` stores it (triggering the dict's copy-on-write clone if
//! shared); `delete_*` removes it and reports whether it was present.

use super::Uref;
use crate::error::Result;
use crate::udict::Value;

macro_rules! attr_u32 {
    ($get:ident, $set:ident, $del:ident, $name:expr) => {
        pub fn $get(&self) -> Result<u32> {
            self.dict().get_u32($name)
        }
        pub fn $set(&mut self, v: u32) {
            self.dict_mut().make_mut().set($name, Value::U32(v));
        }
        pub fn $del(&mut self) -> bool {
            self.dict_mut().make_mut().delete($name)
        }
    };
}

macro_rules! attr_u64 {
    ($get:ident, $set:ident, $del:ident, $name:expr) => {
        pub fn $get(&self) -> Result<u64> {
            self.dict().get_u64($name)
        }
        pub fn $set(&mut self, v: u64) {
            self.dict_mut().make_mut().set($name, Value::U64(v));
        }
        pub fn $del(&mut self) -> bool {
            self.dict_mut().make_mut().delete($name)
        }
    };
}

macro_rules! attr_small {
    ($get:ident, $set:ident, $del:ident, $name:expr) => {
        pub fn $get(&self) -> Result<u8> {
            self.dict().get_small($name)
        }
        pub fn $set(&mut self, v: u8) {
            self.dict_mut().make_mut().set($name, Value::Small(v));
        }
        pub fn $del(&mut self) -> bool {
            self.dict_mut().make_mut().delete($name)
        }
    };
}

macro_rules! attr_bool {
    ($get:ident, $set:ident, $del:ident, $name:expr) => {
        pub fn $get(&self) -> Result<bool> {
            self.dict().get_bool($name)
        }
        pub fn $set(&mut self, v: bool) {
            self.dict_mut().make_mut().set($name, Value::Bool(v));
        }
        pub fn $del(&mut self) -> bool {
            self.dict_mut().make_mut().delete($name)
        }
    };
}

macro_rules! attr_string {
    ($get:ident, $set:ident, $del:ident, $name:expr) => {
        pub fn $get(&self) -> Result<String> {
            self.dict().get_string($name)
        }
        pub fn $set(&mut self, v: impl Into<String>) {
            self.dict_mut().make_mut().set($name, Value::String(v.into()));
        }
        pub fn $del(&mut self) -> bool {
            self.dict_mut().make_mut().delete($name)
        }
    };
}

macro_rules! attr_float {
    ($get:ident, $set:ident, $del:ident, $name:expr) => {
        pub fn $get(&self) -> Result<f64> {
            self.dict().get_float($name)
        }
        pub fn $set(&mut self, v: f64) {
            self.dict_mut().make_mut().set($name, Value::Float(v));
        }
        pub fn $del(&mut self) -> bool {
            self.dict_mut().make_mut().delete($name)
        }
    };
}

macro_rules! attr_rational {
    ($get:ident, $set:ident, $del:ident, $name:expr) => {
        pub fn $get(&self) -> Result<(i64, i64)> {
            self.dict().get_rational($name)
        }
        pub fn $set(&mut self, num: i64, den: i64) {
            self.dict_mut().make_mut().set($name, Value::Rational { num, den });
        }
        pub fn $del(&mut self) -> bool {
            self.dict_mut().make_mut().delete($name)
        }
    };
}

macro_rules! attr_opaque {
    ($get:ident, $set:ident, $del:ident, $name:expr) => {
        pub fn $get(&self) -> Result<Vec<u8>> {
            self.dict().get_opaque($name)
        }
        pub fn $set(&mut self, v: impl Into<Vec<u8>>) {
            self.dict_mut().make_mut().set($name, Value::Opaque(v.into()));
        }
        pub fn $del(&mut self) -> bool {
            self.dict_mut().make_mut().delete($name)
        }
    };
}

impl Uref {
    // --- Flow ---
    attr_string!(flow_def, set_flow_def, delete_flow_def, "f.def");
    attr_u64!(flow_id, set_flow_id, delete_flow_id, "f.id");
    attr_string!(flow_name, set_flow_name, delete_flow_name, "f.name");
    attr_u64!(flow_latency, set_flow_latency, delete_flow_latency, "f.latency");
    attr_bool!(flow_random, set_flow_random, delete_flow_random, "f.random");
    attr_opaque!(flow_headers, set_flow_headers, delete_flow_headers, "f.headers");
    attr_string!(flow_language, set_flow_language, delete_flow_language, "f.language");
    attr_bool!(flow_end, set_flow_end, delete_flow_end, "f.end");

    /// `true` iff this is a control/flow-definition packet (no `ubuf`).
    pub fn is_flow_def(&self) -> bool {
        !self.has_ubuf() && self.flow_def().is_ok()
    }

    // --- Clock ---
    attr_u64!(pts_sys, set_pts_sys, delete_pts_sys, "k.pts.sys");
    attr_u64!(pts_prog, set_pts_prog, delete_pts_prog, "k.pts.prog");
    attr_u64!(pts_orig, set_pts_orig, delete_pts_orig, "k.pts.orig");
    attr_u64!(dts_sys, set_dts_sys, delete_dts_sys, "k.dts.sys");
    attr_u64!(dts_prog, set_dts_prog, delete_dts_prog, "k.dts.prog");
    attr_u64!(dts_orig, set_dts_orig, delete_dts_orig, "k.dts.orig");
    attr_u64!(cr_sys, set_cr_sys, delete_cr_sys, "k.cr.sys");
    attr_u64!(cr_prog, set_cr_prog, delete_cr_prog, "k.cr.prog");
    attr_u64!(cr_orig, set_cr_orig, delete_cr_orig, "k.cr.orig");
    attr_rational!(clock_rate, set_clock_rate, delete_clock_rate, "k.rate");
    attr_u64!(ts_offset, set_ts_offset, delete_ts_offset, "k.ts_offset");
    attr_u64!(duration, set_duration, delete_duration, "k.duration");
    attr_bool!(rap, set_rap, delete_rap, "k.rap");

    // --- Picture flow ---
    attr_u32!(hsize, set_hsize, delete_hsize, "pic.hsize");
    attr_u32!(vsize, set_vsize, delete_vsize, "pic.vsize");
    attr_u32!(hsub, set_hsub, delete_hsub, "pic.hsub");
    attr_u32!(vsub, set_vsub, delete_vsub, "pic.vsub");
    attr_u32!(macropixel, set_macropixel, delete_macropixel, "pic.macropixel");
    attr_u32!(planes, set_planes, delete_planes, "pic.planes");
    attr_rational!(sar, set_sar, delete_sar, "pic.sar");
    attr_rational!(dar, set_dar, delete_dar, "pic.dar");
    attr_rational!(fps, set_fps, delete_fps, "pic.fps");
    attr_bool!(overscan, set_overscan, delete_overscan, "pic.overscan");
    attr_bool!(fullrange, set_fullrange, delete_fullrange, "pic.fullrange");
    attr_string!(colorimetry, set_colorimetry, delete_colorimetry, "pic.colorimetry");

    /// Record plane `idx`'s chroma name/subsampling/macropixel size.
    pub fn add_plane(&mut self, idx: u32, chroma: &str, hsub: u32, vsub: u32, mpixel_size: u32) {
        let dict = self.dict_mut().make_mut();
        dict.set(&format!("pic.plane.{idx}.chroma"), Value::String(chroma.to_string()));
        dict.set(&format!("pic.plane.{idx}.hsub"), Value::U32(hsub));
        dict.set(&format!("pic.plane.{idx}.vsub"), Value::U32(vsub));
        dict.set(&format!("pic.plane.{idx}.mpixel_size"), Value::U32(mpixel_size));
    }

    /// Retrieve plane `idx`'s `(chroma, hsub, vsub, mpixel_size)`.
    pub fn get_plane(&self, idx: u32) -> Result<(String, u32, u32, u32)> {
        let dict = self.dict();
        Ok((
            dict.get_string(&format!("pic.plane.{idx}.chroma"))?,
            dict.get_u32(&format!("pic.plane.{idx}.hsub"))?,
            dict.get_u32(&format!("pic.plane.{idx}.vsub"))?,
            dict.get_u32(&format!("pic.plane.{idx}.mpixel_size"))?,
        ))
    }

    // --- Sound flow ---
    attr_small!(channels, set_channels, delete_channels, "sound.channels");
    attr_u64!(sound_rate, set_sound_rate, delete_sound_rate, "sound.rate");
    attr_u64!(samples, set_samples, delete_samples, "sound.samples");
    attr_small!(sample_size, set_sample_size, delete_sample_size, "sound.sample_size");
    attr_small!(sound_planes, set_sound_planes, delete_sound_planes, "sound.planes");
    attr_small!(sound_align, set_sound_align, delete_sound_align, "sound.align");

    // --- Block flow ---
    attr_u64!(block_size, set_block_size, delete_block_size, "block.size");
    attr_u64!(octetrate, set_octetrate, delete_octetrate, "block.octetrate");
    attr_u64!(max_octetrate, set_max_octetrate, delete_max_octetrate, "block.max_octetrate");
    attr_small!(block_align, set_block_align, delete_block_align, "block.align");

    // --- RTP ---
    attr_u32!(rtp_seqnum, set_rtp_seqnum, delete_rtp_seqnum, "rtp.seqnum");
    attr_u32!(rtp_timestamp, set_rtp_timestamp, delete_rtp_timestamp, "rtp.timestamp");
    attr_small!(rtp_type, set_rtp_type, delete_rtp_type, "rtp.type");

    // --- HLS / M3U ---
    attr_string!(uri, set_uri, delete_uri, "m3u.uri");
    attr_u64!(byte_range_off, set_byte_range_off, delete_byte_range_off, "m3u.byte_range_off");
    attr_u64!(byte_range_len, set_byte_range_len, delete_byte_range_len, "m3u.byte_range_len");
    attr_float!(seq_duration, set_seq_duration, delete_seq_duration, "m3u.seq_duration");
    attr_u64!(media_sequence, set_media_sequence, delete_media_sequence, "m3u.media_sequence");
    attr_string!(key_method, set_key_method, delete_key_method, "m3u.key.method");
    attr_string!(key_uri, set_key_uri, delete_key_uri, "m3u.key.uri");
    attr_opaque!(key_iv, set_key_iv, delete_key_iv, "m3u.key.iv");
    attr_u64!(bandwidth, set_bandwidth, delete_bandwidth, "m3u.bandwidth");
    attr_string!(codecs, set_codecs, delete_codecs, "m3u.codecs");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udict::UdictRef;

    #[test]
    fn flow_def_prefix_matching() {
        let mut uref = Uref::new_control(UdictRef::new());
        uref.set_flow_def("block.mpegts.");
        assert!(uref.flow_def().unwrap().starts_with("block."));
    }

    #[test]
    fn clock_and_picture_round_trip() {
        let mut uref = Uref::new_control(UdictRef::new());
        uref.set_pts_sys(90000);
        uref.set_hsize(1920);
        uref.set_vsize(1080);
        uref.set_sar(1, 1);
        uref.add_plane(0, "y", 1, 1, 1);
        uref.add_plane(1, "u", 2, 2, 1);

        assert_eq!(uref.pts_sys().unwrap(), 90000);
        assert_eq!(uref.hsize().unwrap(), 1920);
        assert_eq!(uref.sar().unwrap(), (1, 1));
        assert_eq!(uref.get_plane(1).unwrap(), ("u".to_string(), 2, 2, 1));
    }

    #[test]
    fn missing_attribute_is_invalid() {
        let uref = Uref::new_control(UdictRef::new());
        assert!(uref.pts_sys().is_err());
    }
}
