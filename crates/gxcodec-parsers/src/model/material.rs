//! Materials

use serde::{Deserialize, Serialize};

use crate::gx::GpuState;

/// Texture coordinate wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum WrapMode {
    Clamp = 0,
    #[default]
    Repeat = 1,
    Mirror = 2,
}

impl WrapMode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Clamp,
            2 => Self::Mirror,
            _ => Self::Repeat,
        }
    }
}

/// Texture binding of one material stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sampler {
    /// Name of the texture in the model
    pub texture: String,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub min_filter: u8,
    pub mag_filter: u8,
    pub lod_bias: f32,
}

impl Sampler {
    pub fn new(texture: impl Into<String>) -> Self {
        Self {
            texture: texture.into(),
            wrap_u: WrapMode::Repeat,
            wrap_v: WrapMode::Repeat,
            min_filter: 1,
            mag_filter: 1,
            lod_bias: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// Drawn in the translucent pass
    pub translucent: bool,
    pub samplers: Vec<Sampler>,
    pub state: GpuState,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}
