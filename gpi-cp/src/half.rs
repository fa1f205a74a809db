//! The two halves of a double-buffered staging segment.

use crate::substrate::{Offset, Size};

/// Which half of the local staging segment is meant.
///
/// The wire-level API (and the substrate itself) only understands byte
/// offsets, so `Half` converts to/from `{0, size}` at that boundary; internal
/// logic works with the enum so "the other half" can never silently become
/// an invalid offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Half {
    A,
    B,
}

impl Half {
    pub fn other(self) -> Half {
        match self {
            Half::A => Half::B,
            Half::B => Half::A,
        }
    }

    pub fn offset(self, size: Size) -> Offset {
        match self {
            Half::A => 0,
            Half::B => size,
        }
    }
}
