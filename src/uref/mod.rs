//! Reference packet (L2): the unit of data or control flowing between
//! pipes.
//!
//! A [`Uref`] owns exactly one [`UdictRef`] and at most one [`Ubuf`]. It
//! carries no other state — everything else (flow definition, timestamps,
//! picture/sound geometry, protocol fields) lives in the dict under
//! well-known attribute names, exposed through the typed accessors in
//! [`attr`].

pub mod attr;

use crate::ubuf::Ubuf;
use crate::udict::UdictRef;

/// A reference packet: a dict of attributes plus an optional content
/// buffer.
pub struct Uref {
    dict: UdictRef,
    ubuf: Option<Ubuf>,
}

impl Uref {
    /// A control/flow-definition packet: no buffer.
    pub fn new_control(dict: UdictRef) -> Self {
        Uref { dict, ubuf: None }
    }

    /// A data packet carrying `ubuf`.
    pub fn new_data(dict: UdictRef, ubuf: Ubuf) -> Self {
        Uref {
            dict,
            ubuf: Some(ubuf),
        }
    }

    pub fn dict(&self) -> &UdictRef {
        &self.dict
    }

    pub fn dict_mut(&mut self) -> &mut UdictRef {
        &mut self.dict
    }

    pub fn ubuf(&self) -> Option<&Ubuf> {
        self.ubuf.as_ref()
    }

    pub fn ubuf_mut(&mut self) -> Option<&mut Ubuf> {
        self.ubuf.as_mut()
    }

    pub fn has_ubuf(&self) -> bool {
        self.ubuf.is_some()
    }

    pub fn take_ubuf(&mut self) -> Option<Ubuf> {
        self.ubuf.take()
    }

    /// Share the `ubuf` (if any) and share the dict's COW backing —
    /// cheap, and a subsequent write to either sibling's dict triggers the
    /// dict's own `make_mut` deep clone rather than affecting this one.
    pub fn dup(&self) -> Self {
        Uref {
            dict: self.dict.dup(),
            ubuf: self.ubuf.as_ref().map(|u| u.dup()),
        }
    }

    /// Share the dict, replacing the buffer with `ubuf`.
    pub fn fork(&self, ubuf: Option<Ubuf>) -> Self {
        Uref {
            dict: self.dict.dup(),
            ubuf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udict::Value;

    #[test]
    fn control_packet_has_no_ubuf() {
        let mut dict = UdictRef::new();
        dict.make_mut().set("f.def", Value::String("block.mpegts.".into()));
        let uref = Uref::new_control(dict);
        assert!(!uref.has_ubuf());
        assert_eq!(uref.dict().get_string("f.def").unwrap(), "block.mpegts.");
    }

    #[test]
    fn dup_shares_ubuf_and_independently_mutates_dict() {
        use crate::ubuf::{AllocDescriptor, UbufMgr};
        use crate::umem::HeapUmem;
        use std::sync::Arc;

        let mgr = UbufMgr::new(Arc::new(HeapUmem), 0);
        let ubuf = mgr.alloc(AllocDescriptor::Block { size: 16 }).unwrap();
        let mut dict = UdictRef::new();
        dict.make_mut().set("f.def", Value::String("block.".into()));
        let mut a = Uref::new_data(dict, ubuf);

        let mut b = a.dup();
        b.dict_mut().make_mut().set("f.def", Value::String("block.mpegts.".into()));
        assert_eq!(a.dict().get_string("f.def").unwrap(), "block.");
        assert_eq!(b.dict().get_string("f.def").unwrap(), "block.mpegts.");
        assert!(a.has_ubuf() && b.has_ubuf());
    }
}
