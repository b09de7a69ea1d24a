//! Bounds-checked reader over an in-memory buffer

use std::ops::{Deref, DerefMut};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::Endian;
use crate::traits::{ParseError, ParseResult};

/// Origin for [`Reader::jump`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Typed reader over a byte slice
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
    high_water: usize,
}

macro_rules! typed_read {
    ($name:ident, $ty:ty, $size:expr, $fn:ident) => {
        pub fn $name(&mut self) -> ParseResult<$ty> {
            let bytes = self.take($size)?;
            Ok(match self.endian {
                Endian::Big => BigEndian::$fn(bytes),
                Endian::Little => LittleEndian::$fn(bytes),
            })
        }
    };
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
            high_water: 0,
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Furthest byte offset consumed by any read so far
    pub fn high_water(&self) -> usize {
        self.high_water
    }

    /// Restart high-water tracking at `pos`
    pub fn reset_high_water(&mut self, pos: usize) {
        self.high_water = pos;
    }

    fn touch(&mut self, end: usize) {
        if end > self.high_water {
            self.high_water = end;
        }
    }

    fn out_of_bounds(&self, offset: usize, requested: usize) -> ParseError {
        ParseError::OutOfBounds {
            offset,
            requested,
            available: self.data.len().saturating_sub(offset),
        }
    }

    fn take(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| self.out_of_bounds(self.pos, n))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        self.touch(end);
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> ParseResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> ParseResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    typed_read!(read_u16, u16, 2, read_u16);
    typed_read!(read_i16, i16, 2, read_i16);
    typed_read!(read_u32, u32, 4, read_u32);
    typed_read!(read_i32, i32, 4, read_i32);
    typed_read!(read_f32, f32, 4, read_f32);

    /// Three consecutive floats
    pub fn read_vec3(&mut self) -> ParseResult<[f32; 3]> {
        Ok([self.read_f32()?, self.read_f32()?, self.read_f32()?])
    }

    pub fn read_bytes(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        self.take(n)
    }

    pub fn read_array<const N: usize>(&mut self) -> ParseResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Four-byte tag, always in file order regardless of endianness
    pub fn read_magic(&mut self) -> ParseResult<[u8; 4]> {
        self.read_array::<4>()
    }

    /// Four-byte tag stored as a `u32` in the active byte order. Little
    /// endian containers store their tags reversed.
    pub fn read_tag(&mut self) -> ParseResult<[u8; 4]> {
        Ok(self.read_u32()?.to_be_bytes())
    }

    /// Read a tag and fail with `InvalidMagic` when it differs
    pub fn expect_magic(&mut self, expected: &[u8; 4]) -> ParseResult<()> {
        let found = self.read_magic()?;
        if &found != expected {
            return Err(ParseError::InvalidMagic {
                expected: expected.to_vec(),
                found: found.to_vec(),
            });
        }
        Ok(())
    }

    /// Reposition the cursor. Landing exactly on the end is allowed.
    pub fn jump(&mut self, offset: i64, whence: Whence) -> ParseResult<()> {
        let base = match whence {
            Whence::Start => 0,
            Whence::Current => self.pos,
            Whence::End => self.data.len(),
        };
        self.pos = self.relative(base, offset)?;
        Ok(())
    }

    /// Absolute position of `offset` bytes from `base`, checked against the buffer
    pub fn relative(&self, base: usize, offset: i64) -> ParseResult<usize> {
        i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .and_then(|target| usize::try_from(target).ok())
            .filter(|&target| target <= self.data.len())
            .ok_or(ParseError::OutOfBounds {
                offset: base,
                requested: 0,
                available: self.data.len().saturating_sub(base),
            })
    }

    /// Absolute seek
    pub fn seek(&mut self, pos: usize) -> ParseResult<()> {
        self.jump(i64::try_from(pos).unwrap_or(i64::MAX), Whence::Start)
    }

    pub fn skip(&mut self, n: usize) -> ParseResult<()> {
        self.jump(i64::try_from(n).unwrap_or(i64::MAX), Whence::Current)
    }

    /// Jump and restore the current position when the guard drops
    pub fn scoped_jump(&mut self, offset: i64, whence: Whence) -> ParseResult<JumpGuard<'_, 'a>> {
        let saved = self.pos;
        self.jump(offset, whence)?;
        Ok(JumpGuard { reader: self, saved })
    }

    /// Absolute variant of [`Reader::scoped_jump`]
    pub fn scoped_seek(&mut self, pos: usize) -> ParseResult<JumpGuard<'_, 'a>> {
        self.scoped_jump(i64::try_from(pos).unwrap_or(i64::MAX), Whence::Start)
    }

    /// NUL-terminated string at `offset`; the cursor does not move
    pub fn read_cstr_at(&mut self, offset: usize) -> ParseResult<String> {
        let tail = self
            .data
            .get(offset..)
            .ok_or_else(|| self.out_of_bounds(offset, 1))?;
        let len = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.out_of_bounds(offset, tail.len() + 1))?;
        self.touch(offset + len + 1);
        Ok(String::from_utf8_lossy(&tail[..len]).into_owned())
    }
}

/// Restores the reader position on drop
pub struct JumpGuard<'r, 'a> {
    reader: &'r mut Reader<'a>,
    saved: usize,
}

impl<'r, 'a> Deref for JumpGuard<'r, 'a> {
    type Target = Reader<'a>;

    fn deref(&self) -> &Self::Target {
        self.reader
    }
}

impl<'r, 'a> DerefMut for JumpGuard<'r, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.reader
    }
}

impl Drop for JumpGuard<'_, '_> {
    fn drop(&mut self) {
        self.reader.pos = self.saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_big_and_little_endian() {
        let data = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(Reader::new(&data, Endian::Big).read_u32().unwrap(), 0x1234_5678);
        assert_eq!(Reader::new(&data, Endian::Little).read_u32().unwrap(), 0x7856_3412);
    }

    #[test]
    fn test_read_past_end_is_out_of_bounds() {
        let data = [0u8; 3];
        let mut reader = Reader::new(&data, Endian::Big);
        reader.read_u16().unwrap();

        match reader.read_u16() {
            Err(ParseError::OutOfBounds { offset, requested, available }) => {
                assert_eq!((offset, requested, available), (2, 2, 1));
            }
            other => panic!("expected OutOfBounds, got {other:?}"),
        }
        assert_eq!(reader.position(), 2);
    }

    #[test]
    fn test_scoped_jump_restores_on_early_return() {
        fn peek_far(reader: &mut Reader<'_>) -> ParseResult<u32> {
            let mut guard = reader.scoped_jump(6, Whence::Start)?;
            guard.read_u32()
        }

        let data = [0u8; 8];
        let mut reader = Reader::new(&data, Endian::Big);
        reader.skip(1).unwrap();
        assert!(peek_far(&mut reader).is_err());
        assert_eq!(reader.position(), 1);
    }

    #[test]
    fn test_jump_beyond_end_fails() {
        let data = [0u8; 4];
        let mut reader = Reader::new(&data, Endian::Big);
        assert!(reader.jump(4, Whence::Start).is_ok());
        assert!(reader.jump(1, Whence::Current).is_err());
        assert!(reader.jump(-5, Whence::End).is_err());
    }

    #[test]
    fn test_relative_offsets_stay_in_bounds() {
        let data = [0u8; 16];
        let reader = Reader::new(&data, Endian::Big);
        assert_eq!(reader.relative(8, -8).unwrap(), 0);
        assert_eq!(reader.relative(8, 8).unwrap(), 16);
        assert!(matches!(reader.relative(8, -9), Err(ParseError::OutOfBounds { offset: 8, .. })));
        assert!(reader.relative(8, 9).is_err());
        assert!(reader.relative(8, i64::from(i32::MIN)).is_err());
        assert!(reader.relative(usize::MAX, 1).is_err());
    }

    #[test]
    fn test_read_cstr_at_and_high_water() {
        let data = b"\0\0abc\0zz";
        let mut reader = Reader::new(data, Endian::Big);
        assert_eq!(reader.read_cstr_at(2).unwrap(), "abc");
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.high_water(), 6);
        assert!(reader.read_cstr_at(6).is_err());
    }
}
