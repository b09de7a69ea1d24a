//! G3D resource dictionaries
//!
//! A dictionary is a binary patricia tree over the entry names. Node 0 is
//! a sentinel whose left link is the root; every other node tests bit `id`
//! of the looked-up name, where `id = byte << 3 | bit` and higher ids sit
//! closer to the root. A link to a node with an id not below the current
//! one is a back edge ending the walk.
//!
//! ```text
//! u32 size  u32 count
//! count + 1 nodes of 16 bytes:
//!   u16 id  u16 flag  u16 left  u16 right  s32 name  s32 data
//! ```
//!
//! Name and data offsets are relative to the dictionary start.

use crate::binary::{LinkWidth, Reader, Writer};
use crate::names::{read_name, NameTable};
use crate::traits::{ParseError, ParseResult};

const SENTINEL_ID: u16 = 0xFFFF;
const NODE_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictNode {
    pub id: u16,
    pub left: u16,
    pub right: u16,
    pub name: String,
    /// Absolute position after reading, entry order when building
    pub data: usize,
}

/// Bit `id` of `name`, missing bytes reading as zero
fn bit(name: &[u8], id: u16) -> bool {
    name.get(usize::from(id >> 3))
        .is_some_and(|b| (b >> (id & 7)) & 1 == 1)
}

/// Highest bit at which two names differ
fn differing_bit(a: &[u8], b: &[u8]) -> Option<u16> {
    (0..a.len().max(b.len())).rev().find_map(|i| {
        let x = a.get(i).copied().unwrap_or(0) ^ b.get(i).copied().unwrap_or(0);
        (x != 0).then(|| ((i as u16) << 3) | (7 - x.leading_zeros() as u16))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    nodes: Vec<DictNode>,
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            nodes: vec![DictNode {
                id: SENTINEL_ID,
                left: 0,
                right: 0,
                name: String::new(),
                data: 0,
            }],
        }
    }

    /// Build a dictionary whose entries carry their position in `names`
    pub fn build<I, S>(names: I) -> ParseResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dict = Self::new();
        for (i, name) in names.into_iter().enumerate() {
            dict.insert(name.as_ref(), i)?;
        }
        Ok(dict)
    }

    pub fn len(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded size for `count` entries
    pub fn byte_size(count: usize) -> usize {
        8 + NODE_SIZE * (count + 1)
    }

    /// Entries in insertion order
    pub fn entries(&self) -> impl Iterator<Item = &DictNode> {
        self.nodes.iter().skip(1)
    }

    fn child(&self, node: usize, key: &[u8]) -> usize {
        let n = &self.nodes[node];
        usize::from(if bit(key, n.id) { n.right } else { n.left })
    }

    /// Node reached by following `key` until a back edge
    fn search(&self, key: &[u8]) -> usize {
        let mut prev = 0;
        let mut x = usize::from(self.nodes[0].left);
        while self.nodes[x].id < self.nodes[prev].id {
            prev = x;
            x = self.child(x, key);
        }
        x
    }

    pub fn find(&self, name: &str) -> Option<&DictNode> {
        let x = self.search(name.as_bytes());
        (x != 0 && self.nodes[x].name == name).then(|| &self.nodes[x])
    }

    pub fn insert(&mut self, name: &str, data: usize) -> ParseResult<()> {
        let key = name.as_bytes();
        if key.is_empty() {
            return Err(ParseError::invalid("dictionary entries need a name"));
        }
        let found = self.search(key);
        let id = differing_bit(key, self.nodes[found].name.as_bytes())
            .ok_or_else(|| ParseError::invalid(format!("duplicate dictionary entry `{name}`")))?;

        let new = u16::try_from(self.nodes.len()).map_err(|_| ParseError::invalid("dictionary is full"))?;
        let mut prev = 0;
        let mut x = usize::from(self.nodes[0].left);
        while self.nodes[x].id > id && self.nodes[x].id < self.nodes[prev].id {
            prev = x;
            x = self.child(x, key);
        }

        let (left, right) = if bit(key, id) { (x as u16, new) } else { (new, x as u16) };
        self.nodes.push(DictNode {
            id,
            left,
            right,
            name: name.to_string(),
            data,
        });
        if prev != 0 && bit(key, self.nodes[prev].id) {
            self.nodes[prev].right = new;
        } else {
            self.nodes[prev].left = new;
        }
        Ok(())
    }

    /// Read a dictionary at the cursor
    pub fn read(reader: &mut Reader<'_>) -> ParseResult<Self> {
        let start = reader.position();
        let _size = reader.read_u32()?;
        let count = reader.read_u32()? as usize;
        if Self::byte_size(count) > reader.len().saturating_sub(start) {
            return Err(ParseError::invalid(format!("dictionary at 0x{start:X} claims {count} entries")));
        }

        let mut nodes = Vec::with_capacity(count + 1);
        for i in 0..=count {
            let id = reader.read_u16()?;
            let _flag = reader.read_u16()?;
            let left = reader.read_u16()?;
            let right = reader.read_u16()?;
            if usize::from(left) > count || usize::from(right) > count {
                return Err(ParseError::invalid(format!("dictionary node {i} links outside the tree")));
            }
            let name = read_name(reader, start)?;
            let data = reader.read_i32()?;
            let data = if i == 0 {
                0
            } else {
                usize::try_from(start as i64 + i64::from(data))
                    .map_err(|_| ParseError::invalid(format!("entry `{name}` points before the file")))?
            };
            nodes.push(DictNode { id, left, right, name, data });
        }
        Ok(Self { nodes })
    }

    /// Write at the cursor. Names go through `names`; the data slot of
    /// entry `i` links to the label `data_label(i)`.
    pub fn write(&self, writer: &mut Writer, names: &mut NameTable, data_label: impl Fn(usize) -> String) {
        let start = writer.position();
        writer.write_u32(Self::byte_size(self.len()) as u32);
        writer.write_u32(self.len() as u32);
        for (i, node) in self.nodes.iter().enumerate() {
            writer.write_u16(node.id);
            writer.write_u16(0);
            writer.write_u16(node.left);
            writer.write_u16(node.right);
            if i == 0 {
                writer.write_i32(0);
                writer.write_i32(0);
            } else {
                names.reference(writer, &node.name, start);
                writer.write_offset(start, data_label(node.data), LinkWidth::I32);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;

    #[test]
    fn test_differing_bit() {
        assert_eq!(differing_bit(b"a", b""), Some(6));
        assert_eq!(differing_bit(b"ab", b"a"), Some((1 << 3) | 6));
        assert_eq!(differing_bit(b"same", b"same"), None);
    }

    #[test]
    fn test_find_every_entry() {
        let names = ["root", "spine", "head", "arm_l", "arm_r", "leg_l", "leg_r", "a", "ab", "abc"];
        let dict = Dictionary::build(names).unwrap();
        assert_eq!(dict.len(), names.len());
        for (i, name) in names.iter().enumerate() {
            let node = dict.find(name).unwrap_or_else(|| panic!("{name} not found"));
            assert_eq!(node.data, i);
        }
        assert!(dict.find("missing").is_none());
        assert!(dict.find("").is_none());
    }

    #[test]
    fn test_duplicate_is_rejected() {
        assert!(Dictionary::build(["x", "y", "x"]).is_err());
    }

    #[test]
    fn test_write_then_read_preserves_tree() {
        let dict = Dictionary::build(["3DModels(NW4R)", "Textures(NW4R)"]).unwrap();
        let mut writer = Writer::new(Endian::Big);
        let mut names = NameTable::new();
        dict.write(&mut writer, &mut names, |i| format!("data{i}"));
        writer.label("data0");
        writer.write_u32(0);
        writer.label("data1");
        names.commit(&mut writer);
        let bytes = writer.finish().unwrap();

        let mut reader = Reader::new(&bytes, Endian::Big);
        let read = Dictionary::read(&mut reader).unwrap();
        let size = Dictionary::byte_size(2);
        assert_eq!(read.find("3DModels(NW4R)").map(|n| n.data), Some(size));
        assert_eq!(read.find("Textures(NW4R)").map(|n| n.data), Some(size + 4));
    }
}
