//! Skeleton nodes

use gxcodec_core::{BoundingBox, Mat34, Vec3};
use serde::{Deserialize, Serialize};

/// Billboard behaviour of a bone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Billboard {
    #[default]
    None = 0,
    Standard = 1,
    StandardPerspective = 2,
    Rotation = 3,
    RotationPerspective = 4,
    Y = 5,
    YPerspective = 6,
}

impl Billboard {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Standard),
            2 => Some(Self::StandardPerspective),
            3 => Some(Self::Rotation),
            4 => Some(Self::RotationPerspective),
            5 => Some(Self::Y),
            6 => Some(Self::YPerspective),
            _ => None,
        }
    }
}

/// Draw command attached to a bone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Display {
    pub material: usize,
    pub mesh: usize,
    pub priority: u8,
}

/// Single bone of the skeleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    /// Index of the draw matrix that carries this bone's transform
    pub matrix_id: u32,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub scale: Vec3,
    /// Euler angles in degrees
    pub rotation: Vec3,
    pub translation: Vec3,
    pub bounds: BoundingBox,
    pub bounding_radius: f32,
    pub billboard: Billboard,
    pub segment_scale_compensate: bool,
    pub visible: bool,
    pub model_matrix: Mat34,
    pub inverse_model_matrix: Mat34,
    pub displays: Vec<Display>,
}

impl Bone {
    /// Create a new bone with identity transform
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            matrix_id: 0,
            parent: None,
            children: Vec::new(),
            scale: Vec3::ONE,
            rotation: Vec3::ZERO,
            translation: Vec3::ZERO,
            bounds: BoundingBox::default(),
            bounding_radius: 0.0,
            billboard: Billboard::None,
            segment_scale_compensate: false,
            visible: true,
            model_matrix: Mat34::IDENTITY,
            inverse_model_matrix: Mat34::IDENTITY,
            displays: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Scale, rotation and translation are all neutral
    pub fn has_identity_transform(&self) -> bool {
        self.scale.is_uniform(1.0) && self.rotation.is_uniform(0.0) && self.translation.is_uniform(0.0)
    }
}
