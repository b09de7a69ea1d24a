//! Display list decoding and encoding

use serde::{Deserialize, Serialize};

use super::{IndexedPrimitive, IndexedVertex, MatrixPrimitive, PrimitiveType, VertexAttribute, VertexAttributeType, VertexDescriptor};
use crate::binary::{Reader, Writer};
use crate::traits::{ParseError, ParseResult};

/// Receives primitives as a display list is decoded
pub trait MeshDlDelegate {
    /// Start a new primitive and hand back a slot for its vertices
    fn add_indexed_primitive(&mut self, kind: PrimitiveType, vertex_count: usize) -> &mut IndexedPrimitive;
}

impl MeshDlDelegate for Vec<IndexedPrimitive> {
    fn add_indexed_primitive(&mut self, kind: PrimitiveType, vertex_count: usize) -> &mut IndexedPrimitive {
        let mut prim = IndexedPrimitive::new(kind);
        prim.vertices.reserve(vertex_count);
        self.push(prim);
        let last = self.len() - 1;
        &mut self[last]
    }
}

impl MeshDlDelegate for MatrixPrimitive {
    fn add_indexed_primitive(&mut self, kind: PrimitiveType, vertex_count: usize) -> &mut IndexedPrimitive {
        self.primitives.add_indexed_primitive(kind, vertex_count)
    }
}

/// Highest index seen per attribute across one or more display lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexUsage {
    max: [Option<u16>; VertexAttribute::COUNT],
}

impl VertexUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, attribute: VertexAttribute, index: u16) {
        let slot = &mut self.max[attribute.index()];
        match *slot {
            Some(current) if current <= index => *slot = Some(index),
            None => *slot = Some(index),
            Some(_) => {}
        }
    }

    pub fn max_index(&self, attribute: VertexAttribute) -> Option<u16> {
        self.max[attribute.index()]
    }
}

/// Decode the display list in `[position, position + size)`
///
/// A zero tag ends the list. Decoded primitives are handed to `delegate`
/// and, when `usage` is given, every index read is recorded in it.
pub fn decode_display_list(
    reader: &mut Reader<'_>,
    size: usize,
    descriptor: &VertexDescriptor,
    delegate: &mut dyn MeshDlDelegate,
    mut usage: Option<&mut VertexUsage>,
) -> ParseResult<()> {
    let end = reader.position() + size;

    while reader.position() < end {
        let offset = reader.position();
        let tag = reader.read_u8()?;
        if tag == 0 {
            break;
        }
        let kind = match PrimitiveType::from_tag(tag) {
            Some(kind) if tag & 0x80 != 0 => kind,
            _ => return Err(ParseError::MalformedDisplayList { offset, command: tag }),
        };
        let count = reader.read_u16()? as usize;
        let prim = delegate.add_indexed_primitive(kind, count);

        for _ in 0..count {
            let mut vertex = IndexedVertex::new();
            for (attribute, ty) in descriptor.present() {
                let index = match ty {
                    VertexAttributeType::None => continue,
                    VertexAttributeType::Direct => {
                        if attribute != VertexAttribute::PositionNormalMatrixIndex {
                            return Err(ParseError::UnsupportedDirectAttribute { attribute });
                        }
                        reader.read_u8()? as u16
                    }
                    VertexAttributeType::Byte => reader.read_u8()? as u16,
                    VertexAttributeType::Short => reader.read_u16()?,
                };
                vertex.set(attribute, index);
                if let Some(usage) = usage.as_deref_mut() {
                    usage.record(attribute, index);
                }
            }
            prim.vertices.push(vertex);
        }
    }

    Ok(())
}

fn byte_index(attribute: VertexAttribute, index: u16) -> ParseResult<u8> {
    u8::try_from(index).map_err(|_| {
        ParseError::invalid(format!("index {index} does not fit the 8-bit {attribute} format"))
    })
}

/// Encode `primitives` at the cursor and pad with zeros to 32 bytes.
/// Returns the number of bytes written, padding included.
pub fn encode_display_list(
    writer: &mut Writer,
    descriptor: &VertexDescriptor,
    primitives: &[IndexedPrimitive],
) -> ParseResult<usize> {
    let start = writer.position();

    for prim in primitives {
        let count = u16::try_from(prim.vertices.len()).map_err(|_| {
            ParseError::invalid(format!("primitive with {} vertices", prim.vertices.len()))
        })?;
        writer.write_u8(prim.kind.tag());
        writer.write_u16(count);

        for vertex in &prim.vertices {
            for (attribute, ty) in descriptor.present() {
                let index = vertex.get(attribute);
                match ty {
                    VertexAttributeType::None => {}
                    VertexAttributeType::Direct => {
                        if attribute != VertexAttribute::PositionNormalMatrixIndex {
                            return Err(ParseError::UnsupportedDirectAttribute { attribute });
                        }
                        writer.write_u8(byte_index(attribute, index)?);
                    }
                    VertexAttributeType::Byte => writer.write_u8(byte_index(attribute, index)?),
                    VertexAttributeType::Short => writer.write_u16(index),
                }
            }
        }
    }

    writer.align(32);
    Ok(writer.position() - start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::Endian;

    fn position_short() -> VertexDescriptor {
        VertexDescriptor::new().with(VertexAttribute::Position, VertexAttributeType::Short)
    }

    #[test]
    fn test_single_triangle() {
        let data = [0x90, 0x00, 0x03, 0x00, 0x05, 0x00, 0x07, 0x01, 0x00, 0x00];
        let mut reader = Reader::new(&data, Endian::Big);
        let mut prims = Vec::new();

        decode_display_list(&mut reader, data.len(), &position_short(), &mut prims, None).unwrap();

        assert_eq!(prims.len(), 1);
        assert_eq!(prims[0].kind, PrimitiveType::Triangles);
        let positions: Vec<u16> = prims[0].vertices.iter().map(|v| v.get(VertexAttribute::Position)).collect();
        assert_eq!(positions, vec![5, 7, 256]);
    }

    #[test]
    fn test_zero_tag_terminates() {
        let data = [0x98, 0x00, 0x01, 0x00, 0x02, 0x00, 0x12, 0x34];
        let mut reader = Reader::new(&data, Endian::Big);
        let mut prims = Vec::new();

        decode_display_list(&mut reader, data.len(), &position_short(), &mut prims, None).unwrap();

        assert_eq!(prims.len(), 1);
        assert_eq!(reader.position(), 6);
    }

    #[test]
    fn test_high_bit_clear_is_malformed() {
        let data = [0x90, 0x00, 0x00, 0x61, 0x00];
        let mut reader = Reader::new(&data, Endian::Big);
        let mut prims = Vec::new();

        let err = decode_display_list(&mut reader, data.len(), &position_short(), &mut prims, None).unwrap_err();
        assert!(matches!(err, ParseError::MalformedDisplayList { offset: 3, command: 0x61 }));
    }

    #[test]
    fn test_tag_past_topology_table_is_malformed() {
        for tag in [0xC0u8, 0xE8, 0xFF] {
            let data = [tag, 0x00, 0x01, 0x00, 0x00];
            let mut reader = Reader::new(&data, Endian::Big);
            let mut prims = Vec::new();

            let err = decode_display_list(&mut reader, data.len(), &position_short(), &mut prims, None).unwrap_err();
            assert!(matches!(err, ParseError::MalformedDisplayList { offset: 0, command } if command == tag));
            assert!(err.is_fatal_for_mesh());
            assert!(prims.is_empty());
        }
    }

    #[test]
    fn test_byte_index_overflow_is_rejected() {
        let desc = VertexDescriptor::new().with(VertexAttribute::Position, VertexAttributeType::Byte);
        let mut prim = IndexedPrimitive::new(PrimitiveType::Points);
        prim.vertices.push(IndexedVertex::new().with(VertexAttribute::Position, 300));

        let mut writer = Writer::new(Endian::Big);
        let err = encode_display_list(&mut writer, &desc, std::slice::from_ref(&prim)).unwrap_err();
        assert!(matches!(err, ParseError::InvalidStructure(_)));

        let desc = VertexDescriptor::new()
            .with(VertexAttribute::PositionNormalMatrixIndex, VertexAttributeType::Direct);
        let mut prim = IndexedPrimitive::new(PrimitiveType::Points);
        prim.vertices.push(IndexedVertex::new().with(VertexAttribute::PositionNormalMatrixIndex, 256));
        let mut writer = Writer::new(Endian::Big);
        assert!(encode_display_list(&mut writer, &desc, std::slice::from_ref(&prim)).is_err());
    }

    #[test]
    fn test_direct_only_for_matrix_index() {
        let data = [0x90, 0x00, 0x01, 0x03, 0x00, 0x09];
        let desc = position_short().with(VertexAttribute::PositionNormalMatrixIndex, VertexAttributeType::Direct);
        let mut reader = Reader::new(&data, Endian::Big);
        let mut prims = Vec::new();
        decode_display_list(&mut reader, data.len(), &desc, &mut prims, None).unwrap();
        assert_eq!(prims[0].vertices[0].get(VertexAttribute::PositionNormalMatrixIndex), 3);

        let desc = position_short().with(VertexAttribute::Normal, VertexAttributeType::Direct);
        let mut reader = Reader::new(&data, Endian::Big);
        let mut prims = Vec::new();
        let err = decode_display_list(&mut reader, data.len(), &desc, &mut prims, None).unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnsupportedDirectAttribute { attribute: VertexAttribute::Normal }
        ));
    }

    #[test]
    fn test_usage_tracks_maximum() {
        let data = [0x90, 0x00, 0x03, 0x00, 0x04, 0x00, 0x09, 0x00, 0x02];
        let mut reader = Reader::new(&data, Endian::Big);
        let mut prims = Vec::new();
        let mut usage = VertexUsage::new();

        decode_display_list(&mut reader, data.len(), &position_short(), &mut prims, Some(&mut usage)).unwrap();

        assert_eq!(usage.max_index(VertexAttribute::Position), Some(9));
        assert_eq!(usage.max_index(VertexAttribute::Normal), None);
    }

    #[test]
    fn test_usage_zero_index_counts() {
        let mut usage = VertexUsage::new();
        usage.record(VertexAttribute::Position, 0);
        usage.record(VertexAttribute::Position, 0);
        assert_eq!(usage.max_index(VertexAttribute::Position), Some(0));
    }

    #[test]
    fn test_encode_pads_and_decodes_back() {
        let desc = position_short().with(VertexAttribute::TexCoord0, VertexAttributeType::Byte);
        let mut prim = IndexedPrimitive::new(PrimitiveType::TriangleFan);
        for i in 0..4u16 {
            prim.vertices.push(
                IndexedVertex::new()
                    .with(VertexAttribute::Position, i * 300)
                    .with(VertexAttribute::TexCoord0, i),
            );
        }

        let mut writer = Writer::new(Endian::Big);
        let size = encode_display_list(&mut writer, &desc, std::slice::from_ref(&prim)).unwrap();
        assert_eq!(size, 32);
        let bytes = writer.finish().unwrap();

        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut prims = Vec::new();
        decode_display_list(&mut reader, size, &desc, &mut prims, None).unwrap();
        assert_eq!(prims, vec![prim]);
    }
}
