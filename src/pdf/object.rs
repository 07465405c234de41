//! Indirect object references

use std::fmt;

/// Identifies the indirect object a string or stream belongs to.
///
/// Only the low three bytes of the object number and the low two bytes of
/// the generation take part in key diversification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    /// Object number
    pub number: u32,
    /// Generation number
    pub generation: u16,
}

impl ObjectRef {
    /// Create new object reference
    pub fn new(number: u32, generation: u16) -> Self {
        Self { number, generation }
    }

    /// Low-order 3 bytes of the object number, little-endian
    pub(crate) fn number_bytes(&self) -> [u8; 3] {
        let bytes = self.number.to_le_bytes();
        [bytes[0], bytes[1], bytes[2]]
    }

    /// Generation number, little-endian
    pub(crate) fn generation_bytes(&self) -> [u8; 2] {
        self.generation.to_le_bytes()
    }
}

impl From<(u32, u16)> for ObjectRef {
    fn from((number, generation): (u32, u16)) -> Self {
        Self::new(number, generation)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} R", self.number, self.generation)
    }
}
