//! 3D Vector
//!
//! Pose component shared by positions and rotations. Values come straight
//! from clients, so the type is a plain float triple with no physics attached.

use std::fmt;
use serde::{Serialize, Deserialize};

/// 3D vector with `f32` components.
///
/// Deserialization also accepts the underscore-prefixed field names that
/// three.js `Euler` objects produce when serialized (`_x`, `_y`, `_z`).
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    #[serde(alias = "_x")]
    pub x: f32,
    /// Y component
    #[serde(alias = "_y")]
    pub y: f32,
    /// Z component
    #[serde(alias = "_z")]
    pub z: f32,
}

impl Vec3 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// True when every component is finite.
    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Debug for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec3({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}
