//! Property tests for display lists, name pools and resource dictionaries

use gxcodec_parsers::binary::{Endian, Reader, Writer};
use gxcodec_parsers::g3d::Dictionary;
use gxcodec_parsers::gx::{
    decode_display_list, encode_display_list, IndexedPrimitive, IndexedVertex, PrimitiveType, VertexAttribute,
    VertexAttributeType, VertexDescriptor, VertexUsage,
};
use gxcodec_parsers::names::{read_name, NameTable};
use gxcodec_parsers::ParseError;

fn descriptor() -> VertexDescriptor {
    VertexDescriptor::new()
        .with(VertexAttribute::PositionNormalMatrixIndex, VertexAttributeType::Direct)
        .with(VertexAttribute::Position, VertexAttributeType::Short)
        .with(VertexAttribute::TexCoord0, VertexAttributeType::Byte)
}

fn primitive(kind: PrimitiveType, vertices: &[(u8, u16, u8)]) -> IndexedPrimitive {
    let mut prim = IndexedPrimitive::new(kind);
    for &(matrix, position, uv) in vertices {
        prim.vertices.push(
            IndexedVertex::new()
                .with(VertexAttribute::PositionNormalMatrixIndex, u16::from(matrix))
                .with(VertexAttribute::Position, position)
                .with(VertexAttribute::TexCoord0, u16::from(uv)),
        );
    }
    prim
}

mod display_list_tests {
    use super::*;

    #[test]
    fn test_zero_tag_ends_list() {
        let bytes = [0x90, 0x00, 0x01, 0x00, 0x00, 0x05, 0x01, 0x00, 0x90, 0x00, 0x01];
        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut prims: Vec<IndexedPrimitive> = Vec::new();
        decode_display_list(&mut reader, bytes.len(), &descriptor(), &mut prims, None).unwrap();
        assert_eq!(prims.len(), 1);
        assert_eq!(prims[0].vertices[0].get(VertexAttribute::Position), 5);
    }

    #[test]
    fn test_direct_only_for_matrix_index() {
        let desc = VertexDescriptor::new().with(VertexAttribute::Position, VertexAttributeType::Direct);
        let mut writer = Writer::new(Endian::Big);
        let err = encode_display_list(&mut writer, &desc, &[primitive(PrimitiveType::Points, &[(0, 0, 0)])])
            .unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedDirectAttribute { attribute: VertexAttribute::Position }));
    }

    #[test]
    fn test_command_without_high_bit_is_malformed() {
        let bytes = [0x10, 0x00, 0x00];
        let mut reader = Reader::new(&bytes, Endian::Big);
        let mut prims: Vec<IndexedPrimitive> = Vec::new();
        let err = decode_display_list(&mut reader, bytes.len(), &descriptor(), &mut prims, None).unwrap_err();
        assert!(matches!(err, ParseError::MalformedDisplayList { offset: 0, command: 0x10 }));
    }

    #[test]
    fn test_every_opcode_past_points_is_malformed() {
        for tag in 0xC0..=0xFFu8 {
            let bytes = [0x90, 0x00, 0x01, 0x00, 0x00, 0x05, 0x01, tag, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00];
            let mut reader = Reader::new(&bytes, Endian::Big);
            let mut prims: Vec<IndexedPrimitive> = Vec::new();
            let err = decode_display_list(&mut reader, bytes.len(), &descriptor(), &mut prims, None).unwrap_err();
            assert!(
                matches!(err, ParseError::MalformedDisplayList { offset: 7, command } if command == tag),
                "{tag:#04X}: {err}"
            );
        }
    }

    #[test]
    fn test_index_wider_than_byte_is_not_truncated() {
        let mut prim = primitive(PrimitiveType::Points, &[(0, 0, 0)]);
        prim.vertices[0].set(VertexAttribute::TexCoord0, 0x100);
        let mut writer = Writer::new(Endian::Big);
        assert!(encode_display_list(&mut writer, &descriptor(), &[prim]).is_err());

        let mut prim = primitive(PrimitiveType::Points, &[(0, 0, 0)]);
        prim.vertices[0].set(VertexAttribute::PositionNormalMatrixIndex, 0x1FF);
        let mut writer = Writer::new(Endian::Big);
        assert!(encode_display_list(&mut writer, &descriptor(), &[prim]).is_err());
    }
}

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn kind() -> impl Strategy<Value = PrimitiveType> {
        prop_oneof![
            Just(PrimitiveType::Triangles),
            Just(PrimitiveType::TriangleStrip),
            Just(PrimitiveType::TriangleFan),
            Just(PrimitiveType::Quads),
            Just(PrimitiveType::Lines),
            Just(PrimitiveType::Points),
        ]
    }

    fn primitives() -> impl Strategy<Value = Vec<IndexedPrimitive>> {
        prop::collection::vec(
            (kind(), prop::collection::vec((any::<u8>(), any::<u16>(), any::<u8>()), 1..40))
                .prop_map(|(kind, vertices)| primitive(kind, &vertices)),
            1..8,
        )
    }

    proptest! {
        #[test]
        fn test_display_list_decodes_what_was_encoded(prims in primitives()) {
            let desc = descriptor();
            let mut writer = Writer::new(Endian::Big);
            let size = encode_display_list(&mut writer, &desc, &prims).unwrap();
            let bytes = writer.finish().unwrap();
            prop_assert_eq!(size, bytes.len());
            prop_assert_eq!(size % 32, 0);

            let mut reader = Reader::new(&bytes, Endian::Big);
            let mut decoded: Vec<IndexedPrimitive> = Vec::new();
            let mut usage = VertexUsage::new();
            decode_display_list(&mut reader, size, &desc, &mut decoded, Some(&mut usage)).unwrap();
            prop_assert_eq!(&decoded, &prims);

            let max = prims
                .iter()
                .flat_map(|p| &p.vertices)
                .map(|v| v.get(VertexAttribute::Position))
                .max();
            prop_assert_eq!(usage.max_index(VertexAttribute::Position), max);
            prop_assert_eq!(usage.max_index(VertexAttribute::Normal), None);
        }

        #[test]
        fn test_name_pool_resolves_every_site(names in prop::collection::vec("[a-z_]{0,12}", 1..30)) {
            let mut writer = Writer::new(Endian::Big);
            let mut table = NameTable::new();
            let mut sites = Vec::new();
            for name in &names {
                sites.push(writer.position());
                table.reference(&mut writer, name, 0);
            }
            let distinct: std::collections::HashSet<&String> = names.iter().filter(|n| !n.is_empty()).collect();
            prop_assert_eq!(table.len(), distinct.len());
            table.commit(&mut writer);
            let bytes = writer.finish().unwrap();

            let mut reader = Reader::new(&bytes, Endian::Big);
            for (site, name) in sites.iter().zip(&names) {
                reader.seek(*site).unwrap();
                prop_assert_eq!(&read_name(&mut reader, 0).unwrap(), name);
            }
        }

        #[test]
        fn test_dictionary_finds_every_entry(names in prop::collection::hash_set("[A-Za-z0-9_]{1,16}", 1..40)) {
            let names: Vec<String> = names.into_iter().collect();
            let dict = Dictionary::build(&names).unwrap();
            prop_assert_eq!(dict.len(), names.len());
            for (i, name) in names.iter().enumerate() {
                let node = dict.find(name);
                prop_assert!(node.is_some(), "{} missing", name);
                prop_assert_eq!(node.map(|n| n.data), Some(i));
            }
            prop_assert!(dict.find("not-an-entry!").is_none());
        }
    }
}
