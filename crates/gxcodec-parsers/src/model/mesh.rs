//! Polygons

use gxcodec_core::BoundingBox;
use serde::{Deserialize, Serialize};

use crate::gx::{BufferSlot, MatrixPrimitive, VertexAttribute, VertexDescriptor};

/// How a shape's vertices are transformed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ShapeMode {
    #[default]
    Normal = 0,
    Billboard = 1,
    BillboardY = 2,
    Skinned = 3,
}

impl ShapeMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Billboard,
            2 => Self::BillboardY,
            3 => Self::Skinned,
            _ => Self::Normal,
        }
    }
}

/// Indexed geometry with its vertex format and buffer bindings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub visible: bool,
    pub mode: ShapeMode,
    pub descriptor: VertexDescriptor,
    /// Buffer name bound to each slot, see [`BufferSlot::index`]
    pub buffers: [Option<String>; BufferSlot::COUNT],
    pub matrix_primitives: Vec<MatrixPrimitive>,
    pub bounds: BoundingBox,
    pub bounding_radius: f32,
}

impl Mesh {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            mode: ShapeMode::Normal,
            descriptor: VertexDescriptor::default(),
            buffers: Default::default(),
            matrix_primitives: Vec::new(),
            bounds: BoundingBox::default(),
            bounding_radius: 0.0,
        }
    }

    pub fn buffer(&self, slot: BufferSlot) -> Option<&str> {
        self.buffers[slot.index()].as_deref()
    }

    pub fn bind_buffer(&mut self, slot: BufferSlot, name: impl Into<String>) {
        self.buffers[slot.index()] = Some(name.into());
    }

    /// Slots whose attribute appears in the descriptor
    pub fn used_slots(&self) -> impl Iterator<Item = BufferSlot> + '_ {
        (0..BufferSlot::COUNT)
            .filter_map(BufferSlot::from_index)
            .filter(|slot| self.descriptor.has(slot.attribute()))
    }

    pub fn vertex_count(&self) -> usize {
        self.matrix_primitives.iter().map(MatrixPrimitive::vertex_count).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.matrix_primitives.iter().map(MatrixPrimitive::triangle_count).sum()
    }

    /// Highest index any primitive uses for `attribute`
    pub fn max_index(&self, attribute: VertexAttribute) -> Option<u16> {
        self.matrix_primitives
            .iter()
            .flat_map(|mp| mp.primitives.iter())
            .flat_map(|p| p.vertices.iter())
            .map(|v| v.get(attribute))
            .max()
    }
}
