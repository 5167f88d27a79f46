use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::transform::Pose;

#[derive(Debug, Copy, Clone)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, distance: f32) -> Vec3 {
        self.origin + self.direction * distance
    }
}

/// Which faces of a surface a ray can hit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Front,
    Back,
    Double,
}

impl Side {
    fn accepts(self, front_face: bool) -> bool {
        match self {
            Self::Front => front_face,
            Self::Back => !front_face,
            Self::Double => true,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum SurfaceShape {
    /// Box centred on the pose origin.
    Box { half_extents: Vec3 },
    /// Rectangle in the local XY plane, front face towards +Z.
    Quad { half_extents: Vec2 },
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub pose: Pose,
    pub shape: SurfaceShape,
    pub side: Side,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SurfaceHit {
    pub distance: f32,
    pub point: Vec3,
    /// Geometric outward normal, in world space. Not flipped for back faces.
    pub normal: Vec3,
    pub front_face: bool,
}

impl Surface {
    /// A box resting on `base_center`.
    pub fn block(base_center: Vec3, size: Vec3, side: Side) -> Self {
        Self {
            pose: Pose::new(base_center + Vec3::Y * (size.y * 0.5), glam::Quat::IDENTITY),
            shape: SurfaceShape::Box {
                half_extents: size * 0.5,
            },
            side,
        }
    }

    pub fn quad(pose: Pose, size: Vec2, side: Side) -> Self {
        Self {
            pose,
            shape: SurfaceShape::Quad {
                half_extents: size * 0.5,
            },
            side,
        }
    }

    pub fn raycast(&self, ray: &Ray, max_distance: f32) -> Option<SurfaceHit> {
        let local_origin = self.pose.inverse_transform_point(ray.origin);
        let local_direction = self.pose.inverse_transform_vector(ray.direction);

        let (distance, local_normal, front_face) = match self.shape {
            SurfaceShape::Quad { half_extents } => {
                raycast_quad(local_origin, local_direction, half_extents, self.side)?
            }
            SurfaceShape::Box { half_extents } => {
                raycast_box(local_origin, local_direction, half_extents, self.side)?
            }
        };

        if distance > max_distance {
            return None;
        }

        Some(SurfaceHit {
            distance,
            point: ray.at(distance),
            normal: self.pose.transform_vector(local_normal),
            front_face,
        })
    }
}

fn raycast_quad(
    origin: Vec3,
    direction: Vec3,
    half_extents: Vec2,
    side: Side,
) -> Option<(f32, Vec3, bool)> {
    if direction.z.abs() <= f32::EPSILON {
        return None;
    }

    let front_face = direction.z < 0.0;
    if !side.accepts(front_face) {
        return None;
    }

    let t = -origin.z / direction.z;
    if t < 0.0 {
        return None;
    }

    let hit = origin + direction * t;
    if hit.x.abs() > half_extents.x || hit.y.abs() > half_extents.y {
        return None;
    }

    Some((t, Vec3::Z, front_face))
}

fn raycast_box(
    origin: Vec3,
    direction: Vec3,
    half_extents: Vec3,
    side: Side,
) -> Option<(f32, Vec3, bool)> {
    let mut t_enter = f32::NEG_INFINITY;
    let mut t_exit = f32::INFINITY;
    let mut enter_normal = Vec3::ZERO;
    let mut exit_normal = Vec3::ZERO;

    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        let h = half_extents[axis];

        if d.abs() <= f32::EPSILON {
            if o < -h || o > h {
                return None;
            }
            continue;
        }

        let mut near = (-h - o) / d;
        let mut far = (h - o) / d;
        let mut axis_normal = Vec3::ZERO;
        axis_normal[axis] = 1.0;
        let mut near_normal = -axis_normal;
        let mut far_normal = axis_normal;
        if near > far {
            std::mem::swap(&mut near, &mut far);
            std::mem::swap(&mut near_normal, &mut far_normal);
        }

        if near > t_enter {
            t_enter = near;
            enter_normal = near_normal;
        }
        if far < t_exit {
            t_exit = far;
            exit_normal = far_normal;
        }
        if t_enter > t_exit {
            return None;
        }
    }

    if t_exit < 0.0 {
        return None;
    }

    if t_enter >= 0.0 && side.accepts(true) {
        return Some((t_enter, enter_normal, true));
    }
    if side.accepts(false) {
        return Some((t_exit, exit_normal, false));
    }
    None
}

/// Nearest hit across `surfaces`, with the index of the surface hit.
pub fn raycast_surfaces(
    surfaces: &[Surface],
    ray: &Ray,
    max_distance: f32,
) -> Option<(usize, SurfaceHit)> {
    surfaces
        .iter()
        .enumerate()
        .filter_map(|(index, surface)| surface.raycast(ray, max_distance).map(|hit| (index, hit)))
        .min_by(|a, b| a.1.distance.total_cmp(&b.1.distance))
}
