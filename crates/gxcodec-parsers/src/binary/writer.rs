//! Append-only writer with section backfill and deferred links

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use super::Endian;
use crate::traits::{ParseError, ParseResult};

/// One end of a deferred link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Absolute position already known
    At(usize),
    /// Position of a label that may be defined later
    Label(String),
}

impl Anchor {
    pub fn label(name: impl Into<String>) -> Self {
        Anchor::Label(name.into())
    }
}

/// Storage width of a deferred link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkWidth {
    I16,
    U16,
    I32,
    U32,
}

impl LinkWidth {
    fn size(self) -> usize {
        match self {
            LinkWidth::I16 | LinkWidth::U16 => 2,
            LinkWidth::I32 | LinkWidth::U32 => 4,
        }
    }

    fn fits(self, value: i64) -> bool {
        match self {
            LinkWidth::I16 => i16::try_from(value).is_ok(),
            LinkWidth::U16 => u16::try_from(value).is_ok(),
            LinkWidth::I32 => i32::try_from(value).is_ok(),
            LinkWidth::U32 => u32::try_from(value).is_ok(),
        }
    }
}

#[derive(Debug, Clone)]
struct PendingLink {
    at: usize,
    width: LinkWidth,
    from: Anchor,
    to: Anchor,
}

/// Growing output buffer
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
    endian: Endian,
    labels: HashMap<String, usize>,
    links: Vec<PendingLink>,
}

macro_rules! typed_write {
    ($name:ident, $ty:ty, $size:expr, $fn:ident) => {
        pub fn $name(&mut self, value: $ty) {
            let mut bytes = [0u8; $size];
            match self.endian {
                Endian::Big => BigEndian::$fn(&mut bytes, value),
                Endian::Little => LittleEndian::$fn(&mut bytes, value),
            }
            self.buf.extend_from_slice(&bytes);
        }
    };
}

impl Writer {
    pub fn new(endian: Endian) -> Self {
        Self {
            endian,
            ..Self::default()
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Bytes emitted so far, links still unpatched
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.push(value as u8);
    }

    typed_write!(write_u16, u16, 2, write_u16);
    typed_write!(write_i16, i16, 2, write_i16);
    typed_write!(write_u32, u32, 4, write_u32);
    typed_write!(write_i32, i32, 4, write_i32);
    typed_write!(write_f32, f32, 4, write_f32);

    pub fn write_vec3(&mut self, v: [f32; 3]) {
        for c in v {
            self.write_f32(c);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_zeros(&mut self, n: usize) {
        self.buf.resize(self.buf.len() + n, 0);
    }

    /// Zero-pad to a multiple of `alignment`
    pub fn align(&mut self, alignment: usize) {
        let target = super::align_up(self.buf.len(), alignment);
        self.buf.resize(target, 0);
    }

    /// Pad to a multiple of `alignment` by cycling `pattern`
    pub fn align_with(&mut self, alignment: usize, pattern: &[u8]) {
        let target = super::align_up(self.buf.len(), alignment);
        if pattern.is_empty() {
            self.buf.resize(target, 0);
            return;
        }
        let mut i = 0;
        while self.buf.len() < target {
            self.buf.push(pattern[i % pattern.len()]);
            i += 1;
        }
    }

    fn patch(&mut self, at: usize, bytes: &[u8]) -> ParseResult<()> {
        let available = self.buf.len().saturating_sub(at);
        let slot = self
            .buf
            .get_mut(at..at + bytes.len())
            .ok_or(ParseError::OutOfBounds {
                offset: at,
                requested: bytes.len(),
                available,
            })?;
        slot.copy_from_slice(bytes);
        Ok(())
    }

    pub fn patch_u16_at(&mut self, at: usize, value: u16) -> ParseResult<()> {
        let mut bytes = [0u8; 2];
        match self.endian {
            Endian::Big => BigEndian::write_u16(&mut bytes, value),
            Endian::Little => LittleEndian::write_u16(&mut bytes, value),
        }
        self.patch(at, &bytes)
    }

    pub fn patch_u32_at(&mut self, at: usize, value: u32) -> ParseResult<()> {
        let mut bytes = [0u8; 4];
        match self.endian {
            Endian::Big => BigEndian::write_u32(&mut bytes, value),
            Endian::Little => LittleEndian::write_u32(&mut bytes, value),
        }
        self.patch(at, &bytes)
    }

    /// Name the current position
    pub fn label(&mut self, name: impl Into<String>) {
        let pos = self.buf.len();
        self.labels.insert(name.into(), pos);
    }

    pub fn label_position(&self, name: &str) -> Option<usize> {
        self.labels.get(name).copied()
    }

    /// Reserve a slot holding `to - from`, patched in [`Writer::finish`]
    pub fn write_link(&mut self, from: Anchor, to: Anchor, width: LinkWidth) {
        let at = self.buf.len();
        self.write_zeros(width.size());
        self.links.push(PendingLink { at, width, from, to });
    }

    /// Link from an absolute base to a label, the most common shape
    pub fn write_offset(&mut self, base: usize, target: impl Into<String>, width: LinkWidth) {
        self.write_link(Anchor::At(base), Anchor::Label(target.into()), width);
    }

    fn resolve(&self, anchor: &Anchor) -> ParseResult<usize> {
        match anchor {
            Anchor::At(pos) => Ok(*pos),
            Anchor::Label(name) => self
                .labels
                .get(name)
                .copied()
                .ok_or_else(|| ParseError::UnresolvedLink { label: name.clone() }),
        }
    }

    /// Tag as a `u32` in the active byte order
    pub fn write_tag(&mut self, tag: &[u8; 4]) {
        self.write_u32(u32::from_be_bytes(*tag));
    }

    /// Open a `tag`/`size` section; the size covers the tag itself
    pub fn open_section(&mut self, tag: &[u8; 4]) -> SectionGuard<'_> {
        let start = self.buf.len();
        self.write_tag(tag);
        let size_at = self.buf.len();
        self.write_u32(0);
        SectionGuard {
            writer: self,
            start,
            size_at,
        }
    }

    /// Bracket a region starting here whose size field sits `size_offset`
    /// bytes in. The caller writes the placeholder.
    pub fn open_region(&mut self, size_offset: usize) -> SectionGuard<'_> {
        let start = self.buf.len();
        SectionGuard {
            writer: self,
            start,
            size_at: start + size_offset,
        }
    }

    /// Patch every deferred link and hand back the finished buffer
    pub fn finish(mut self) -> ParseResult<Vec<u8>> {
        let links = std::mem::take(&mut self.links);
        for link in &links {
            let from = self.resolve(&link.from)?;
            let to = self.resolve(&link.to)?;
            let value = to as i64 - from as i64;
            if !link.width.fits(value) {
                return Err(ParseError::LinkOverflow { at: link.at, value });
            }
            match link.width {
                LinkWidth::I16 | LinkWidth::U16 => self.patch_u16_at(link.at, value as u16)?,
                LinkWidth::I32 | LinkWidth::U32 => self.patch_u32_at(link.at, value as u32)?,
            }
        }
        Ok(self.buf)
    }
}

/// Open section; the size field is backfilled on drop
pub struct SectionGuard<'w> {
    writer: &'w mut Writer,
    start: usize,
    size_at: usize,
}

impl SectionGuard<'_> {
    pub fn start(&self) -> usize {
        self.start
    }

    /// Close explicitly, returning the emitted size
    pub fn close(self) -> usize {
        self.writer.position() - self.start
    }
}

impl Deref for SectionGuard<'_> {
    type Target = Writer;

    fn deref(&self) -> &Self::Target {
        self.writer
    }
}

impl DerefMut for SectionGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.writer
    }
}

impl Drop for SectionGuard<'_> {
    fn drop(&mut self) {
        let size = (self.writer.position() - self.start) as u32;
        // A region whose size slot was never written has nothing to patch.
        let _ = self.writer.patch_u32_at(self.size_at, size);
    }
}
