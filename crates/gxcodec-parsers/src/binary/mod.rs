//! Endian-aware binary cursor
//!
//! [`Reader`] walks an immutable byte buffer with bounds-checked typed reads
//! and scoped jumps. [`Writer`] appends to a growing buffer, brackets sections
//! whose size is backfilled on close, and defers relative offsets until every
//! target is known.

pub mod reader;
pub mod writer;

pub use reader::{JumpGuard, Reader, Whence};
pub use writer::{Anchor, LinkWidth, SectionGuard, Writer};

use serde::{Deserialize, Serialize};

/// Byte order of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Endian {
    /// GameCube and Wii native order
    #[default]
    Big,
    Little,
}

/// Round `value` up to the next multiple of `alignment`
pub fn align_up(value: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 32), 0);
        assert_eq!(align_up(1, 32), 32);
        assert_eq!(align_up(32, 32), 32);
        assert_eq!(align_up(33, 4), 36);
        assert_eq!(align_up(7, 1), 7);
    }
}
