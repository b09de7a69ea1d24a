//! Format-agnostic scene graph
//!
//! ```text
//! Model
//! ├── bones            tree via parent index, displays -> (material, mesh)
//! ├── materials        opaque GPU state + samplers naming textures
//! ├── meshes           descriptor + matrix primitives + buffer names
//! ├── vertex_buffers   named, quantized arrays
//! ├── textures         encoded images
//! └── draw_matrices    rigid bones or weighted envelopes
//! ```
//!
//! The model owns every entity. Cross references are indices or names and
//! are resolved on demand, so the graph cannot form ownership cycles.

pub mod bone;
pub mod material;
pub mod mesh;
pub mod vertex;

use gxcodec_core::BoundingBox;
use serde::{Deserialize, Serialize};

pub use bone::{Billboard, Bone, Display};
pub use material::{Material, Sampler, WrapMode};
pub use mesh::{Mesh, ShapeMode};
pub use vertex::{
    read_vertex_array, write_vertex_array, BufferKind, ColorFormat, ComponentType, VertexArray, VertexBuffer,
    VertexFormat,
};

use crate::binary::Endian;
use crate::diagnostics::{Diagnostic, Severity};
use crate::texture::Texture;
use crate::traits::ParseResult;

/// Numeric encoding family of vertex data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NumericFamily {
    #[default]
    Float,
    Fixed,
}

/// Endianness plus numeric encoding of a target platform variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QuantizationProfile {
    pub endian: Endian,
    pub family: NumericFamily,
}

/// How child bones inherit parent scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ScalingRule {
    #[default]
    Basic = 0,
    Xsi = 1,
    Maya = 2,
}

impl ScalingRule {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Basic),
            1 => Some(Self::Xsi),
            2 => Some(Self::Maya),
            _ => None,
        }
    }
}

/// Container-level metadata
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub scaling_rule: ScalingRule,
    pub texture_matrix_mode: u32,
    pub profile: QuantizationProfile,
    /// Format-specific blocks carried through unchanged (e.g. `MDL3`)
    #[serde(skip)]
    pub opaque_sections: Vec<([u8; 4], Vec<u8>)>,
}

/// One bone contributing to a draw matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Influence {
    pub bone: u16,
    pub weight: f32,
}

/// Matrix slot referenced by display lists
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawMatrix {
    pub influences: Vec<Influence>,
}

impl DrawMatrix {
    pub fn rigid(bone: u16) -> Self {
        Self {
            influences: vec![Influence { bone, weight: 1.0 }],
        }
    }

    /// Single bone at full weight
    pub fn rigid_bone(&self) -> Option<u16> {
        match self.influences.as_slice() {
            [only] if only.weight == 1.0 => Some(only.bone),
            _ => None,
        }
    }

    pub fn is_envelope(&self) -> bool {
        self.rigid_bone().is_none()
    }
}

/// Entities that carry a name
pub trait Named {
    fn name(&self) -> &str;
}

/// Entities that carry a bounding volume
pub trait Bounded {
    fn bounds(&self) -> BoundingBox;
}

macro_rules! impl_named {
    ($($ty:ty),*) => {
        $(impl Named for $ty {
            fn name(&self) -> &str {
                &self.name
            }
        })*
    };
}

impl_named!(Bone, Material, Mesh, Texture, VertexBuffer);

impl Bounded for Bone {
    fn bounds(&self) -> BoundingBox {
        self.bounds
    }
}

impl Bounded for Mesh {
    fn bounds(&self) -> BoundingBox {
        self.bounds
    }
}

/// Container root
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Model {
    pub info: ModelInfo,
    pub bones: Vec<Bone>,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
    pub textures: Vec<Texture>,
    pub vertex_buffers: Vec<VertexBuffer>,
    pub draw_matrices: Vec<DrawMatrix>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    pub fn textures(&self) -> &[Texture] {
        &self.textures
    }

    pub fn vertex_buffers(&self) -> &[VertexBuffer] {
        &self.vertex_buffers
    }

    /// Append a bone and register it with its parent
    pub fn add_bone(&mut self, bone: Bone) -> usize {
        let idx = self.bones.len();
        if let Some(parent) = bone.parent.and_then(|p| self.bones.get_mut(p)) {
            parent.children.push(idx);
        }
        self.bones.push(bone);
        idx
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn find_texture(&self, name: &str) -> Option<usize> {
        self.textures.iter().position(|t| t.name == name)
    }

    pub fn find_buffer(&self, name: &str) -> Option<&VertexBuffer> {
        self.vertex_buffers.iter().find(|b| b.name == name)
    }

    pub fn root_bones(&self) -> Vec<usize> {
        (0..self.bones.len()).filter(|&i| self.bones[i].is_root()).collect()
    }

    pub fn children_of(&self, bone: usize) -> &[usize] {
        self.bones.get(bone).map(|b| b.children.as_slice()).unwrap_or(&[])
    }

    /// Bone followed by its ancestors. Stops after `bones.len()` steps so a
    /// corrupt graph cannot loop forever.
    pub fn bone_chain_to_root(&self, bone: usize) -> Vec<usize> {
        let mut chain = Vec::new();
        let mut current = Some(bone);
        while let Some(idx) = current {
            if idx >= self.bones.len() || chain.len() > self.bones.len() {
                break;
            }
            chain.push(idx);
            current = self.bones[idx].parent;
        }
        chain
    }

    /// Rebuild every `children` list from the parent indices, in bone order
    pub fn rebuild_children(&mut self) {
        for bone in &mut self.bones {
            bone.children.clear();
        }
        for idx in 0..self.bones.len() {
            if let Some(parent) = self.bones[idx].parent {
                if let Some(p) = self.bones.get_mut(parent) {
                    p.children.push(idx);
                }
            }
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(Mesh::vertex_count).sum()
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(Mesh::triangle_count).sum()
    }

    /// Union of all bone bounds
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(
            self.bones
                .iter()
                .flat_map(|b| [b.bounds.min, b.bounds.max]),
        )
    }

    /// Derive the profile that matches the stored vertex data
    pub fn detect_family(&self) -> NumericFamily {
        let positions = self
            .vertex_buffers
            .iter()
            .find(|b| b.kind() == BufferKind::Position);
        match positions {
            Some(b) if !b.is_float() => NumericFamily::Fixed,
            _ => NumericFamily::Float,
        }
    }

    /// Convert every generic vertex buffer to `profile`
    pub fn requantize(&mut self, profile: QuantizationProfile) -> ParseResult<()> {
        for buffer in &mut self.vertex_buffers {
            buffer.requantize(profile.family)?;
        }
        self.info.profile = profile;
        Ok(())
    }

    /// Structural checks; returned findings use the `Model` domain
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        let mut push = |severity, message: String| {
            out.push(Diagnostic {
                severity,
                domain: "Model".to_string(),
                message,
            })
        };
        let n = self.bones.len();

        for (idx, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= n {
                    push(Severity::Error, format!("bone `{}` has parent {parent} out of range", bone.name));
                    continue;
                }
                if parent >= idx {
                    push(
                        Severity::Error,
                        format!("bone `{}` (#{idx}) is defined before its parent #{parent}", bone.name),
                    );
                }
                if !self.bones[parent].children.contains(&idx) {
                    push(
                        Severity::Warning,
                        format!("bone `{}` is missing from the children of `{}`", bone.name, self.bones[parent].name),
                    );
                }
            }
            for &child in &bone.children {
                if self.bones.get(child).and_then(|c| c.parent) != Some(idx) {
                    push(
                        Severity::Warning,
                        format!("bone `{}` lists #{child} as a child but is not its parent", bone.name),
                    );
                }
            }

            // Walk at most n steps; a longer walk means a cycle.
            let mut steps = 0;
            let mut current = bone.parent;
            while let Some(p) = current.filter(|&p| p < n) {
                steps += 1;
                if steps > n {
                    push(Severity::Error, format!("bone `{}` is part of a parent cycle", bone.name));
                    break;
                }
                current = self.bones[p].parent;
            }

            for display in &bone.displays {
                if display.material >= self.materials.len() || display.mesh >= self.meshes.len() {
                    push(
                        Severity::Error,
                        format!(
                            "bone `{}` draws mesh {} with material {} which do not exist",
                            bone.name, display.mesh, display.material
                        ),
                    );
                }
            }
        }

        for mesh in &self.meshes {
            for slot in mesh.used_slots() {
                match mesh.buffer(slot).map(|name| (name, self.find_buffer(name))) {
                    None => push(Severity::Error, format!("mesh `{}` has no buffer bound for {slot:?}", mesh.name)),
                    Some((name, None)) => {
                        push(Severity::Error, format!("mesh `{}` references missing buffer `{name}`", mesh.name))
                    }
                    Some((name, Some(buffer))) if BufferKind::for_slot(slot) != buffer.kind() => push(
                        Severity::Error,
                        format!("mesh `{}` binds {:?} buffer `{name}` to {slot:?}", mesh.name, buffer.kind()),
                    ),
                    Some(_) => {}
                }
            }
        }

        for (idx, matrix) in self.draw_matrices.iter().enumerate() {
            if matrix.influences.iter().any(|i| i.bone as usize >= n) {
                push(Severity::Error, format!("draw matrix {idx} references a missing bone"));
            }
        }

        for material in &self.materials {
            for sampler in &material.samplers {
                if self.find_texture(&sampler.texture).is_none() {
                    push(
                        Severity::Warning,
                        format!("material `{}` samples missing texture `{}`", material.name, sampler.texture),
                    );
                }
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gx::{BufferSlot, VertexAttribute, VertexAttributeType};

    fn chain(len: usize) -> Model {
        let mut model = Model::new();
        for i in 0..len {
            let mut bone = Bone::new(format!("bone{i}"));
            bone.parent = i.checked_sub(1);
            model.add_bone(bone);
        }
        model
    }

    #[test]
    fn test_add_bone_links_children() {
        let model = chain(3);
        assert_eq!(model.children_of(0), &[1]);
        assert_eq!(model.children_of(1), &[2]);
        assert_eq!(model.root_bones(), vec![0]);
        assert_eq!(model.bone_chain_to_root(2), vec![2, 1, 0]);
        assert_eq!(model.find_bone("bone1"), Some(1));
        assert_eq!(model.find_bone("bone9"), None);
        assert!(model.validate().is_empty());
    }

    #[test]
    fn test_cycle_is_detected_and_chain_terminates() {
        let mut model = chain(3);
        model.bones[0].parent = Some(2);
        model.bones[2].children.push(0);

        assert!(model.bone_chain_to_root(1).len() <= model.bones.len() + 1);
        let diags = model.validate();
        assert!(diags.iter().any(|d| d.message.contains("cycle")));
        assert!(diags.iter().any(|d| d.message.contains("defined before its parent")));
    }

    #[test]
    fn test_missing_buffer_reported() {
        let mut model = Model::new();
        let mut mesh = Mesh::new("m");
        mesh.descriptor.set(VertexAttribute::Position, VertexAttributeType::Short);
        mesh.bind_buffer(BufferSlot::Position, "nowhere");
        model.meshes.push(mesh);

        let diags = model.validate();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn test_rebuild_children() {
        let mut model = chain(3);
        model.bones[2].parent = Some(0);
        model.rebuild_children();
        assert_eq!(model.children_of(0), &[1, 2]);
        assert!(model.children_of(1).is_empty());
    }

    #[test]
    fn test_draw_matrix_kinds() {
        assert_eq!(DrawMatrix::rigid(4).rigid_bone(), Some(4));
        let env = DrawMatrix {
            influences: vec![Influence { bone: 0, weight: 0.5 }, Influence { bone: 1, weight: 0.5 }],
        };
        assert!(env.is_envelope());
    }
}
