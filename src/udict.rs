//! Ordered typed attribute dictionary (L1).
//!
//! `udict` is copy-on-write: [`UdictRef::dup`] just clones the `Arc`, and
//! [`UdictRef::make_mut`] is the textbook `Arc::make_mut` idiom called out
//! in the design notes — it deep-clones only when the refcount is above 1,
//! otherwise mutates in place. No bespoke refcount or `make_mut` method was
//! needed; `std::sync::Arc` already provides exactly this.

use crate::error::{Result, UpipeError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Opaque(Vec<u8>),
    String(String),
    Bool(bool),
    Small(u8),
    U32(u32),
    U64(u64),
    Float(f64),
    Rational { num: i64, den: i64 },
    /// A nested namespace marker with no payload of its own.
    Void,
}

macro_rules! typed_accessor {
    ($get:ident, $variant:ident, $t:ty) => {
        pub fn $get(&self, name: &str) -> Result<$t> {
            match self.get(name) {
                Some(Value::$variant(v)) => Ok(v.clone()),
                Some(_) => Err(UpipeError::Invalid(format!("{name} has the wrong type"))),
                None => Err(UpipeError::Invalid(format!("{name} is not set"))),
            }
        }
    };
}

/// Insertion-ordered name → value mapping.
#[derive(Debug, Clone, Default)]
pub struct Udict {
    entries: Vec<(String, Value)>,
}

impl Udict {
    pub fn new() -> Self {
        Udict { entries: Vec::new() }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Set `name` to `value`, overwriting in place if already present
    /// (preserving its original position), otherwise appending.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name.to_string(), value));
        }
    }

    /// Remove `name`. Returns `true` if it was present.
    pub fn delete(&mut self, name: &str) -> bool {
        if let Some(idx) = self.entries.iter().position(|(n, _)| n == name) {
            self.entries.remove(idx);
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    typed_accessor!(get_string, String, String);
    typed_accessor!(get_bool, Bool, bool);
    typed_accessor!(get_small, Small, u8);
    typed_accessor!(get_u32, U32, u32);
    typed_accessor!(get_u64, U64, u64);
    typed_accessor!(get_float, Float, f64);
    typed_accessor!(get_opaque, Opaque, Vec<u8>);

    pub fn get_rational(&self, name: &str) -> Result<(i64, i64)> {
        match self.get(name) {
            Some(Value::Rational { num, den }) => Ok((*num, *den)),
            Some(_) => Err(UpipeError::Invalid(format!("{name} has the wrong type"))),
            None => Err(UpipeError::Invalid(format!("{name} is not set"))),
        }
    }
}

/// Refcounted, copy-on-write handle to a [`Udict`].
#[derive(Clone)]
pub struct UdictRef(Arc<Udict>);

impl UdictRef {
    pub fn new() -> Self {
        UdictRef(Arc::new(Udict::new()))
    }

    /// Share the backing dict (increments the `Arc` strong count).
    pub fn dup(&self) -> Self {
        UdictRef(Arc::clone(&self.0))
    }

    /// Exclusive access, deep-cloning first if shared.
    pub fn make_mut(&mut self) -> &mut Udict {
        Arc::make_mut(&mut self.0)
    }

    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.0) == 1
    }
}

impl Default for UdictRef {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for UdictRef {
    type Target = Udict;
    fn deref(&self) -> &Udict {
        &self.0
    }
}

/// Pool of free [`UdictRef`] handles (B4-style vacuum, mirroring `ubuf`'s
/// pool policy).
pub struct UdictMgr {
    pool: Mutex<VecDeque<UdictRef>>,
    capacity: usize,
}

impl UdictMgr {
    pub fn new(capacity: usize) -> Self {
        UdictMgr {
            pool: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    /// Pop a recycled, empty dict, or allocate a fresh one.
    pub fn alloc(&self) -> UdictRef {
        let mut pool = self.pool.lock();
        pool.pop_front().unwrap_or_default()
    }

    /// Return `dict` to the pool if it is uniquely held (otherwise dropping
    /// it just releases this reference).
    pub fn recycle(&self, mut dict: UdictRef) {
        if dict.is_unique() {
            dict.make_mut().entries.clear();
            let mut pool = self.pool.lock();
            if pool.len() < self.capacity {
                pool.push_back(dict);
            }
        }
    }

    pub fn vacuum(&self) {
        self.pool.lock().clear();
    }
}
