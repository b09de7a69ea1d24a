//! Common value types used across gxcodec
//!
//! Plain data carriers. The codecs only store and compare them.

use serde::{Deserialize, Serialize};

/// 3D vector (position, scale, Euler rotation in degrees, ...)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };
    pub const ONE: Self = Self { x: 1.0, y: 1.0, z: 1.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Component-wise minimum
    pub fn min(&self, other: &Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum
    pub fn max(&self, other: &Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// True when every component equals `v`
    pub fn is_uniform(&self, v: f32) -> bool {
        self.x == v && self.y == v && self.z == v
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box containing every point, or the empty box at the origin
    pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Self {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        iter.fold(Self::new(first, first), |acc, p| {
            Self::new(acc.min.min(&p), acc.max.max(&p))
        })
    }

    /// Radius of the sphere around the box center that encloses the box
    pub fn radius(&self) -> f32 {
        let half = Vec3::new(
            (self.max.x - self.min.x) * 0.5,
            (self.max.y - self.min.y) * 0.5,
            (self.max.z - self.min.z) * 0.5,
        );
        half.length()
    }
}

/// Row-major 3x4 affine matrix, the layout GX hardware consumes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mat34 {
    pub m: [f32; 12],
}

impl Mat34 {
    pub const IDENTITY: Self = Self {
        m: [
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0, //
            0.0, 0.0, 1.0, 0.0,
        ],
    };

    pub fn from_flat(m: [f32; 12]) -> Self {
        Self { m }
    }
}

impl Default for Mat34 {
    fn default() -> Self {
        Self::IDENTITY
    }
}
