//! File input/output collaborators.

pub mod image;
pub mod utils;

#[cfg(feature = "serialization")]
use serde::Serialize;

/// Little- or big-endian byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub enum Endianness {
    Little,
    Big,
}
