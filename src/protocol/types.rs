//! Geometric value types carried in message fields

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Double precision vector, used for global coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vector3d {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3d {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Vector4 {
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

/// Rotation quaternion.
///
/// Only `x`, `y` and `z` travel on the wire; `w` is rebuilt from the unit
/// length constraint, so a quaternion is normalized with `w >= 0` before it
/// is written.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion::new(0.0, 0.0, 0.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Unit length with a non-negative `w`. A zero quaternion becomes identity.
    pub fn normalized(&self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let sign = if self.w < 0.0 { -1.0 } else { 1.0 };
        let scale = sign / len;
        Self::new(self.x * scale, self.y * scale, self.z * scale, self.w * scale)
    }

    /// Rebuild a unit quaternion from its vector part.
    pub fn from_xyz(x: f32, y: f32, z: f32) -> Self {
        let t = 1.0 - (x * x + y * y + z * z);
        let w = if t > 0.0 { t.sqrt() } else { 0.0 };
        Self::new(x, y, z, w)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}
