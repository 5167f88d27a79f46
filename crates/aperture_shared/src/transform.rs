use std::f32::consts::PI;

use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Rotation then translation, unit scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Pose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn from_yaw(position: Vec3, yaw: f32) -> Self {
        Self::new(position, Quat::from_rotation_y(yaw))
    }

    /// Decomposes a rigid matrix. Any scale in `matrix` is discarded.
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (_scale, orientation, position) = matrix.to_scale_rotation_translation();
        Self::new(position, orientation.normalize())
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    pub fn inverse(&self) -> Self {
        let inverse_orientation = self.orientation.inverse();
        Self::new(-(inverse_orientation * self.position), inverse_orientation)
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.orientation * point + self.position
    }

    pub fn inverse_transform_point(&self, point: Vec3) -> Vec3 {
        self.orientation.inverse() * (point - self.position)
    }

    pub fn transform_vector(&self, vector: Vec3) -> Vec3 {
        self.orientation * vector
    }

    pub fn inverse_transform_vector(&self, vector: Vec3) -> Vec3 {
        self.orientation.inverse() * vector
    }

    /// Local +Z, the outward side of a portal.
    pub fn normal(&self) -> Vec3 {
        self.orientation * Vec3::Z
    }

    pub fn up(&self) -> Vec3 {
        self.orientation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.orientation * Vec3::X
    }

    /// Same origin, turned half a revolution about local up.
    pub fn mirrored(&self) -> Self {
        Self::new(
            self.position,
            (self.orientation * mirror_rotation()).normalize(),
        )
    }
}

pub fn mirror_rotation() -> Quat {
    Quat::from_axis_angle(Vec3::Y, PI)
}

/// Orientation whose local +Z points along `direction`, keeping +Y up where possible.
///
/// Floors and ceilings have no usable world-up, so +Z stands in.
pub fn look_along(direction: Vec3) -> Quat {
    let forward = direction.normalize_or_zero();
    if forward == Vec3::ZERO {
        return Quat::IDENTITY;
    }

    let up = if forward.y.abs() > 0.999 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let right = up.cross(forward).normalize();
    let up = forward.cross(right);
    Quat::from_mat3(&Mat3::from_cols(right, up, forward)).normalize()
}

#[cfg(test)]
pub(crate) fn assert_mat4_near(actual: Mat4, expected: Mat4, tolerance: f32) {
    let a = actual.to_cols_array();
    let e = expected.to_cols_array();
    for (index, (x, y)) in a.iter().zip(e.iter()).enumerate() {
        assert!(
            (x - y).abs() <= tolerance,
            "element {index} differs: {x} vs {y}\nactual: {actual:?}\nexpected: {expected:?}"
        );
    }
}

#[cfg(test)]
pub(crate) fn assert_vec3_near(actual: Vec3, expected: Vec3, tolerance: f32) {
    assert!(
        actual.abs_diff_eq(expected, tolerance),
        "{actual:?} is not within {tolerance} of {expected:?}"
    );
}
