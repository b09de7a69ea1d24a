//! GX vertex formats, primitives and fixed-function state
//!
//! ```text
//! Display list command
//! ┌────────┬──────────────┬──────────────────────────────────────┐
//! │ u8 tag │ u16 vertices │ per vertex: one index per attribute  │
//! │ 1ttt0xx│              │ present in the descriptor, in enum   │
//! └────────┴──────────────┴──────────────────────────────────────┘
//! ```

pub mod display_list;
pub mod state;

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

pub use display_list::{decode_display_list, encode_display_list, MeshDlDelegate, VertexUsage};
pub use state::{GpuState, GPU_STATE_SIZE};

/// Vertex attributes in hardware order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum VertexAttribute {
    PositionNormalMatrixIndex = 0,
    Texture0MatrixIndex,
    Texture1MatrixIndex,
    Texture2MatrixIndex,
    Texture3MatrixIndex,
    Texture4MatrixIndex,
    Texture5MatrixIndex,
    Texture6MatrixIndex,
    Texture7MatrixIndex,
    Position,
    Normal,
    Color0,
    Color1,
    TexCoord0,
    TexCoord1,
    TexCoord2,
    TexCoord3,
    TexCoord4,
    TexCoord5,
    TexCoord6,
    TexCoord7,
    PositionMatrixArray,
    NormalMatrixArray,
    TextureMatrixArray,
    LightArray,
    NormalBinormalTangent,
}

impl VertexAttribute {
    pub const COUNT: usize = 26;

    /// Every attribute, in the order display lists store them
    pub const ALL: [VertexAttribute; Self::COUNT] = [
        Self::PositionNormalMatrixIndex,
        Self::Texture0MatrixIndex,
        Self::Texture1MatrixIndex,
        Self::Texture2MatrixIndex,
        Self::Texture3MatrixIndex,
        Self::Texture4MatrixIndex,
        Self::Texture5MatrixIndex,
        Self::Texture6MatrixIndex,
        Self::Texture7MatrixIndex,
        Self::Position,
        Self::Normal,
        Self::Color0,
        Self::Color1,
        Self::TexCoord0,
        Self::TexCoord1,
        Self::TexCoord2,
        Self::TexCoord3,
        Self::TexCoord4,
        Self::TexCoord5,
        Self::TexCoord6,
        Self::TexCoord7,
        Self::PositionMatrixArray,
        Self::NormalMatrixArray,
        Self::TextureMatrixArray,
        Self::LightArray,
        Self::NormalBinormalTangent,
    ];

    pub fn from_u32(value: u32) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Attribute backed by a vertex buffer slot
    pub fn buffer_slot(self) -> Option<BufferSlot> {
        let i = self as usize;
        match self {
            Self::Position => Some(BufferSlot::Position),
            Self::Normal => Some(BufferSlot::Normal),
            Self::Color0 | Self::Color1 => Some(BufferSlot::Color((i - 11) as u8)),
            Self::TexCoord0
            | Self::TexCoord1
            | Self::TexCoord2
            | Self::TexCoord3
            | Self::TexCoord4
            | Self::TexCoord5
            | Self::TexCoord6
            | Self::TexCoord7 => Some(BufferSlot::TexCoord((i - 13) as u8)),
            _ => None,
        }
    }
}

impl fmt::Display for VertexAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Buffer slots a mesh can bind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BufferSlot {
    Position,
    Normal,
    Color(u8),
    TexCoord(u8),
}

impl BufferSlot {
    pub const COUNT: usize = 12;

    /// Dense index: position, normal, two colors, eight texcoords
    pub fn index(self) -> usize {
        match self {
            BufferSlot::Position => 0,
            BufferSlot::Normal => 1,
            BufferSlot::Color(i) => 2 + i as usize,
            BufferSlot::TexCoord(i) => 4 + i as usize,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(BufferSlot::Position),
            1 => Some(BufferSlot::Normal),
            2..=3 => Some(BufferSlot::Color((index - 2) as u8)),
            4..=11 => Some(BufferSlot::TexCoord((index - 4) as u8)),
            _ => None,
        }
    }

    pub fn attribute(self) -> VertexAttribute {
        VertexAttribute::ALL[match self {
            BufferSlot::Position => 9,
            BufferSlot::Normal => 10,
            BufferSlot::Color(i) => 11 + i as usize,
            BufferSlot::TexCoord(i) => 13 + i as usize,
        }]
    }
}

/// How an attribute is stored per vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum VertexAttributeType {
    #[default]
    None = 0,
    Direct = 1,
    Byte = 2,
    Short = 3,
}

impl VertexAttributeType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Direct),
            2 => Some(Self::Byte),
            3 => Some(Self::Short),
            _ => None,
        }
    }
}

/// Primitive topology encoded in bits 3..6 of a draw command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PrimitiveType {
    Quads = 0,
    Quads2,
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    LineStrip,
    Points,
}

impl PrimitiveType {
    const TABLE: [PrimitiveType; 8] = [
        Self::Quads,
        Self::Quads2,
        Self::Triangles,
        Self::TriangleStrip,
        Self::TriangleFan,
        Self::Lines,
        Self::LineStrip,
        Self::Points,
    ];

    /// Decode the topology of a draw command tag, `None` for tags past `0xBF`
    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::TABLE.get(((tag & 0x78) >> 3) as usize).copied()
    }

    /// Draw command tag for this topology
    pub fn tag(self) -> u8 {
        0x80 | ((self as u8) << 3)
    }

    /// Triangles rasterized for `vertices` vertices
    pub fn triangle_count(self, vertices: usize) -> usize {
        match self {
            Self::Triangles => vertices / 3,
            Self::TriangleStrip | Self::TriangleFan => vertices.saturating_sub(2),
            Self::Quads | Self::Quads2 => vertices / 4 * 2,
            Self::Lines | Self::LineStrip | Self::Points => 0,
        }
    }
}

/// Per-mesh attribute storage formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct VertexDescriptor {
    types: [VertexAttributeType; VertexAttribute::COUNT],
}

impl VertexDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, attribute: VertexAttribute, ty: VertexAttributeType) -> Self {
        self.set(attribute, ty);
        self
    }

    pub fn set(&mut self, attribute: VertexAttribute, ty: VertexAttributeType) {
        self.types[attribute.index()] = ty;
    }

    pub fn get(&self, attribute: VertexAttribute) -> VertexAttributeType {
        self.types[attribute.index()]
    }

    pub fn has(&self, attribute: VertexAttribute) -> bool {
        self.get(attribute) != VertexAttributeType::None
    }

    /// Present attributes in hardware order
    pub fn present(&self) -> impl Iterator<Item = (VertexAttribute, VertexAttributeType)> + '_ {
        VertexAttribute::ALL
            .iter()
            .map(|&a| (a, self.get(a)))
            .filter(|(_, ty)| *ty != VertexAttributeType::None)
    }

    /// One bit per present attribute
    pub fn bitfield(&self) -> u32 {
        self.present().fold(0, |acc, (a, _)| acc | (1 << a.index()))
    }

    pub fn is_empty(&self) -> bool {
        self.bitfield() == 0
    }

    /// Bytes one vertex occupies in a display list
    pub fn vertex_stride(&self) -> usize {
        self.present()
            .map(|(_, ty)| match ty {
                VertexAttributeType::Short => 2,
                _ => 1,
            })
            .sum()
    }
}

/// Resolved buffer indices of one vertex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IndexedVertex {
    indices: [u16; VertexAttribute::COUNT],
}

impl IndexedVertex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attribute: VertexAttribute) -> u16 {
        self.indices[attribute.index()]
    }

    pub fn set(&mut self, attribute: VertexAttribute, index: u16) {
        self.indices[attribute.index()] = index;
    }

    pub fn with(mut self, attribute: VertexAttribute, index: u16) -> Self {
        self.set(attribute, index);
        self
    }
}

/// One draw command after decoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedPrimitive {
    pub kind: PrimitiveType,
    pub vertices: Vec<IndexedVertex>,
}

impl IndexedPrimitive {
    pub fn new(kind: PrimitiveType) -> Self {
        Self {
            kind,
            vertices: Vec::new(),
        }
    }
}

/// Primitives drawn under one matrix palette
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatrixPrimitive {
    /// Matrix used when the descriptor carries no matrix index, or -1
    pub current_matrix: i16,
    /// Draw-matrix indices loaded into the palette
    pub draw_matrices: SmallVec<[u16; 10]>,
    pub primitives: Vec<IndexedPrimitive>,
}

impl MatrixPrimitive {
    pub fn new(current_matrix: i16) -> Self {
        Self {
            current_matrix,
            ..Self::default()
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.primitives.iter().map(|p| p.vertices.len()).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.primitives
            .iter()
            .map(|p| p.kind.triangle_count(p.vertices.len()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_tags() {
        assert_eq!(PrimitiveType::from_tag(0x90), Some(PrimitiveType::Triangles));
        assert_eq!(PrimitiveType::from_tag(0x98), Some(PrimitiveType::TriangleStrip));
        assert_eq!(PrimitiveType::from_tag(0xB8), Some(PrimitiveType::Points));
        assert_eq!(PrimitiveType::from_tag(0xC0), None);
        assert_eq!(PrimitiveType::from_tag(0xF8), None);
        // low vertex-format bits are ignored
        assert_eq!(PrimitiveType::from_tag(0x93), Some(PrimitiveType::Triangles));
        for kind in PrimitiveType::TABLE {
            assert_eq!(PrimitiveType::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn test_descriptor_bitfield_and_stride() {
        let desc = VertexDescriptor::new()
            .with(VertexAttribute::PositionNormalMatrixIndex, VertexAttributeType::Direct)
            .with(VertexAttribute::Position, VertexAttributeType::Short)
            .with(VertexAttribute::TexCoord0, VertexAttributeType::Byte);

        assert_eq!(desc.bitfield(), 1 | (1 << 9) | (1 << 13));
        assert_eq!(desc.vertex_stride(), 4);
        let order: Vec<_> = desc.present().map(|(a, _)| a).collect();
        assert_eq!(
            order,
            vec![
                VertexAttribute::PositionNormalMatrixIndex,
                VertexAttribute::Position,
                VertexAttribute::TexCoord0
            ]
        );
    }

    #[test]
    fn test_buffer_slots() {
        for i in 0..BufferSlot::COUNT {
            let slot = BufferSlot::from_index(i).unwrap();
            assert_eq!(slot.index(), i);
            assert_eq!(slot.attribute().buffer_slot(), Some(slot));
        }
        assert_eq!(VertexAttribute::LightArray.buffer_slot(), None);
    }

    #[test]
    fn test_triangle_counts() {
        assert_eq!(PrimitiveType::Triangles.triangle_count(6), 2);
        assert_eq!(PrimitiveType::TriangleStrip.triangle_count(5), 3);
        assert_eq!(PrimitiveType::Quads.triangle_count(8), 4);
        assert_eq!(PrimitiveType::TriangleFan.triangle_count(1), 0);
    }
}
