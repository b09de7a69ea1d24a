//! String pools
//!
//! Two schemes live here:
//!
//! * [`NameTable`] is the archive-wide pool used by G3D. Every distinct
//!   string is emitted once, after all sub-files, and each reference site
//!   holds a signed offset from its base to the string characters.
//! * The hashed table embedded in J3D sections (`u16` count, hash/offset
//!   pairs, then NUL-terminated strings).

use lasso::{Key, Rodeo, Spur};

use crate::binary::{Anchor, LinkWidth, Reader, Writer};
use crate::diagnostics::Transaction;
use crate::traits::ParseResult;

/// Handle to an interned name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NameHandle(Spur);

/// Deduplicating string pool with deferred offset patching
#[derive(Debug, Default)]
pub struct NameTable {
    rodeo: Rodeo,
    sites: usize,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing handle for `name`, or a new one
    pub fn intern(&mut self, name: &str) -> NameHandle {
        NameHandle(self.rodeo.get_or_intern(name))
    }

    pub fn resolve(&self, handle: NameHandle) -> &str {
        self.rodeo.resolve(&handle.0)
    }

    /// Number of distinct strings
    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }

    /// Number of reference sites recorded so far
    pub fn site_count(&self) -> usize {
        self.sites
    }

    fn label(handle: NameHandle) -> String {
        format!("$name.{}", handle.0.into_usize())
    }

    /// Write an `i32` slot at the cursor that will hold `string - base`.
    /// Empty names are stored as 0 and never pooled.
    pub fn reference(&mut self, writer: &mut Writer, name: &str, base: usize) {
        if name.is_empty() {
            writer.write_i32(0);
            return;
        }
        let handle = self.intern(name);
        self.sites += 1;
        writer.write_link(Anchor::At(base), Anchor::Label(Self::label(handle)), LinkWidth::I32);
    }

    /// [`NameTable::reference`] relative to the slot itself
    pub fn reference_here(&mut self, writer: &mut Writer, name: &str) {
        let base = writer.position();
        self.reference(writer, name, base);
    }

    /// Emit every string in insertion order. Consumes the table, so a
    /// second commit cannot happen.
    pub fn commit(self, writer: &mut Writer) {
        for (key, name) in self.rodeo.iter() {
            writer.write_u32(name.len() as u32);
            writer.label(Self::label(NameHandle(key)));
            writer.write_bytes(name.as_bytes());
            writer.write_u8(0);
            writer.align(4);
        }
    }
}

/// Read an `i32` name offset at the cursor and dereference it against `base`
pub fn read_name(reader: &mut Reader<'_>, base: usize) -> ParseResult<String> {
    let offset = reader.read_i32()?;
    if offset == 0 {
        return Ok(String::new());
    }
    let target = reader.relative(base, offset.into())?;
    reader.read_cstr_at(target)
}

/// Hash stored alongside every J3D name
pub fn j3d_hash(name: &str) -> u16 {
    name.bytes()
        .fold(0u16, |hash, c| hash.wrapping_mul(3).wrapping_add(c as u16))
}

/// Emit a J3D name table at the cursor
pub fn write_j3d_names<S: AsRef<str>>(writer: &mut Writer, names: &[S]) {
    let start = writer.position();
    writer.write_u16(names.len() as u16);
    writer.write_u16(0xFFFF);

    let mut offset = 4 + names.len() * 4;
    for name in names {
        let name = name.as_ref();
        writer.write_u16(j3d_hash(name));
        writer.write_u16(offset as u16);
        offset += name.len() + 1;
    }
    for name in names {
        writer.write_bytes(name.as_ref().as_bytes());
        writer.write_u8(0);
    }
    debug_assert_eq!(writer.position() - start, offset);
}

/// Read a J3D name table at the cursor. Hash mismatches are reported but
/// tolerated.
pub fn read_j3d_names(reader: &mut Reader<'_>, tx: &mut Transaction) -> ParseResult<Vec<String>> {
    let start = reader.position();
    let count = reader.read_u16()?;
    let _pad = reader.read_u16()?;

    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let hash = reader.read_u16()?;
        let offset = reader.read_u16()?;
        let name = reader.read_cstr_at(start + offset as usize)?;
        if j3d_hash(&name) != hash {
            tx.warn(
                "NameTable",
                format!("name `{name}` stored with hash 0x{hash:04X}, expected 0x{:04X}", j3d_hash(&name)),
            );
        }
        names.push(name);
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;

    fn count_occurrences(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn test_shared_name_is_committed_once() {
        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        names.reference_here(&mut writer, "Bone01");
        names.reference_here(&mut writer, "Bone01");
        names.commit(&mut writer);
        let bytes = writer.finish().unwrap();

        assert_eq!(count_occurrences(&bytes, b"Bone01"), 1);

        let mut reader = Reader::new(&bytes, Endian::Big);
        assert_eq!(read_name(&mut reader, 0).unwrap(), "Bone01");
        assert_eq!(read_name(&mut reader, 4).unwrap(), "Bone01");
    }

    #[test]
    fn test_pool_layout_is_length_prefixed() {
        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        names.reference(&mut writer, "mat", 0);
        names.commit(&mut writer);
        let bytes = writer.finish().unwrap();

        // slot, then u32 length, chars, NUL, padding to 4
        assert_eq!(&bytes[4..8], &[0, 0, 0, 3]);
        assert_eq!(&bytes[8..12], b"mat\0");
        assert_eq!(&bytes[0..4], &[0, 0, 0, 8]);
    }

    #[test]
    fn test_insertion_order() {
        let mut table = NameTable::new();
        let z = table.intern("zeta");
        let a = table.intern("alpha");
        assert_eq!(table.intern("zeta"), z);
        assert_eq!(table.len(), 2);

        let mut writer = Writer::new(Endian::Big);
        table.reference_here(&mut writer, "alpha");
        table.commit(&mut writer);
        let bytes = writer.finish().unwrap();
        let zeta = bytes.windows(4).position(|w| w == b"zeta").unwrap();
        let alpha = bytes.windows(5).position(|w| w == b"alpha").unwrap();
        assert!(zeta < alpha);
        let _ = a;
    }

    #[test]
    fn test_empty_name_is_zero() {
        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        names.reference_here(&mut writer, "");
        assert!(names.is_empty());
        names.commit(&mut writer);
        let bytes = writer.finish().unwrap();

        let mut reader = Reader::new(&bytes, Endian::Big);
        assert_eq!(read_name(&mut reader, 0).unwrap(), "");
    }

    #[test]
    fn test_uncommitted_table_leaves_unresolved_link() {
        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        names.reference_here(&mut writer, "lost");
        assert!(matches!(
            writer.finish(),
            Err(crate::traits::ParseError::UnresolvedLink { .. })
        ));
    }

    #[test]
    fn test_j3d_names() {
        assert_eq!(j3d_hash(""), 0);
        assert_eq!(j3d_hash("a"), 0x61);
        assert_eq!(j3d_hash("ab"), 0x61 * 3 + 0x62);

        let mut writer = Writer::new(Endian::Big);
        write_j3d_names(&mut writer, &["joint0", "body"]);
        let bytes = writer.finish().unwrap();

        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut tx = Transaction::new("names");
        let names = read_j3d_names(&mut reader, &mut tx).unwrap();
        assert_eq!(names, vec!["joint0".to_string(), "body".to_string()]);
        assert!(tx.diagnostics().is_empty());
    }
}
