use glam::{Mat4, Quat, Vec3};

use crate::portal::Portal;
use crate::transform::Pose;

/// The far plane sits this far behind the near plane.
pub const DEFAULT_FAR_PADDING: f32 = 100.0;
/// Lower bound for the near plane when the eye touches the portal plane.
pub const MIN_NEAR: f32 = 1.0e-3;

/// Near-plane rectangle of a perspective frustum, in view space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub left: f32,
    pub right: f32,
    pub bottom: f32,
    pub top: f32,
    pub near: f32,
    pub far: f32,
}

impl Frustum {
    pub fn is_symmetric(&self, tolerance: f32) -> bool {
        (self.left + self.right).abs() <= tolerance && (self.top + self.bottom).abs() <= tolerance
    }

    /// Right-handed, clip depth in `[0, 1]`.
    pub fn projection_matrix(&self) -> Mat4 {
        off_axis_perspective_rh(
            self.left,
            self.right,
            self.bottom,
            self.top,
            self.near,
            self.far,
        )
    }
}

pub fn off_axis_perspective_rh(
    left: f32,
    right: f32,
    bottom: f32,
    top: f32,
    near: f32,
    far: f32,
) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = near - far;
    Mat4::from_cols_array(&[
        2.0 * near / width,
        0.0,
        0.0,
        0.0,
        0.0,
        2.0 * near / height,
        0.0,
        0.0,
        (right + left) / width,
        (top + bottom) / height,
        far / depth,
        -1.0,
        0.0,
        0.0,
        near * far / depth,
        0.0,
    ])
}

/// What a render pass needs to know about the eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewProjection {
    pub view: Mat4,
    pub projection: Mat4,
    pub position: Vec3,
}

impl ViewProjection {
    pub fn matrix(&self) -> Mat4 {
        self.projection * self.view
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VirtualCamera {
    pub position: Vec3,
    pub orientation: Quat,
    pub view: Mat4,
    pub projection: Mat4,
    pub projection_inverse: Mat4,
    pub frustum: Frustum,
}

impl VirtualCamera {
    pub fn near(&self) -> f32 {
        self.frustum.near
    }

    pub fn far(&self) -> f32 {
        self.frustum.far
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation)
    }

    pub fn view_projection(&self) -> ViewProjection {
        ViewProjection {
            view: self.view,
            projection: self.projection,
            position: self.position,
        }
    }
}

/// Builds the camera that looks out of a portal's destination so that its image,
/// pasted onto the entry portal, lines up with the real viewer's eye.
#[derive(Debug, Clone, Copy)]
pub struct ProjectionSolver {
    far_padding: f32,
    min_near: f32,
}

impl Default for ProjectionSolver {
    fn default() -> Self {
        Self::new(DEFAULT_FAR_PADDING)
    }
}

impl ProjectionSolver {
    pub fn new(far_padding: f32) -> Self {
        Self {
            far_padding: far_padding.max(MIN_NEAR),
            min_near: MIN_NEAR,
        }
    }

    pub fn solve(&self, portal: &Portal, destination: &Portal, viewer_position: Vec3) -> VirtualCamera {
        // How far through the window the eye sits, in the entry portal's frame.
        let local_eye = portal.pose.inverse_transform_point(viewer_position);

        let exit_frame = destination.pose.mirrored();
        let camera_pose = Pose::new(exit_frame.transform_point(local_eye), exit_frame.orientation);

        let window_center = camera_pose.inverse_transform_point(exit_frame.position);
        let half = portal.half_extents();

        let near = window_center.z.abs();
        let near = if near.is_finite() {
            near.max(self.min_near)
        } else {
            self.min_near
        };

        let frustum = Frustum {
            left: window_center.x - half.x,
            right: window_center.x + half.x,
            bottom: window_center.y - half.y,
            top: window_center.y + half.y,
            near,
            far: near + self.far_padding,
        };
        let projection = frustum.projection_matrix();

        VirtualCamera {
            position: camera_pose.position,
            orientation: camera_pose.orientation,
            view: camera_pose.inverse().matrix(),
            projection,
            projection_inverse: projection.inverse(),
            frustum,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::PI;

    use glam::{Mat4, Vec3, Vec4};

    use super::{off_axis_perspective_rh, ProjectionSolver, MIN_NEAR};
    use crate::portal::{Portal, PORTAL_BLUE, PORTAL_ORANGE};
    use crate::transform::{assert_mat4_near, assert_vec3_near, Pose};

    fn facing_pair() -> (Portal, Portal) {
        let a = Portal::new(Pose::IDENTITY, PORTAL_BLUE);
        let b = Portal::new(Pose::from_yaw(Vec3::new(0.0, 0.0, 10.0), PI), PORTAL_ORANGE);
        (a, b)
    }

    #[test]
    fn centred_viewer_gets_symmetric_frustum() {
        let (a, b) = facing_pair();
        let camera = ProjectionSolver::default().solve(&a, &b, Vec3::new(0.0, 0.0, 0.5));

        assert!((camera.near() - 0.5).abs() < 1.0e-5);
        assert!((camera.far() - 100.5).abs() < 1.0e-4);
        assert!(camera.frustum.is_symmetric(1.0e-5));
        assert!((camera.frustum.right - 1.0).abs() < 1.0e-5);
        assert!((camera.frustum.top - 1.5).abs() < 1.0e-5);
        // B yawed by pi and mirrored again faces the same way as A.
        assert_vec3_near(camera.position, Vec3::new(0.0, 0.0, 10.5), 1.0e-5);
        assert_vec3_near(camera.orientation * Vec3::NEG_Z, Vec3::NEG_Z, 1.0e-5);
    }

    #[test]
    fn near_is_positive_and_finite_in_front_of_portal() {
        let (a, b) = facing_pair();
        let solver = ProjectionSolver::default();
        for x in [-3.0, -0.99, 0.0, 0.5, 4.0] {
            for y in [-2.0, 0.0, 1.4] {
                for z in [0.001, 0.2, 1.0, 7.5, 40.0] {
                    let camera = solver.solve(&a, &b, Vec3::new(x, y, z));
                    assert!(camera.near() > 0.0 && camera.near().is_finite());
                    assert!(camera.far() > camera.near());
                    assert!(camera.projection.is_finite());
                }
            }
        }
    }

    #[test]
    fn eye_on_portal_plane_clamps_near() {
        let (a, b) = facing_pair();
        let camera = ProjectionSolver::default().solve(&a, &b, Vec3::new(0.3, 0.2, 0.0));
        assert_eq!(camera.near(), MIN_NEAR);
        assert!(camera.projection.is_finite());
        assert!(camera.projection_inverse.is_finite());
    }

    #[test]
    fn off_centre_viewer_shifts_frustum() {
        let (a, b) = facing_pair();
        let camera = ProjectionSolver::default().solve(&a, &b, Vec3::new(0.75, -0.5, 2.0));
        // The window appears displaced opposite to the eye.
        assert!((camera.frustum.left - (-0.75 - 1.0)).abs() < 1.0e-5);
        assert!((camera.frustum.right - (-0.75 + 1.0)).abs() < 1.0e-5);
        assert!((camera.frustum.bottom - (0.5 - 1.5)).abs() < 1.0e-5);
        assert!((camera.frustum.top - (0.5 + 1.5)).abs() < 1.0e-5);
        assert!(!camera.frustum.is_symmetric(1.0e-3));
    }

    #[test]
    fn projection_times_inverse_is_identity() {
        let (a, b) = facing_pair();
        let solver = ProjectionSolver::default();
        for eye in [Vec3::new(0.0, 0.0, 0.5), Vec3::new(1.2, -0.7, 3.0), Vec3::new(-4.0, 2.0, 25.0)] {
            let camera = solver.solve(&a, &b, eye);
            assert_mat4_near(camera.projection * camera.projection_inverse, Mat4::IDENTITY, 1.0e-4);
        }
    }

    #[test]
    fn portal_corners_map_to_clip_corners() {
        let (a, b) = facing_pair();
        let camera = ProjectionSolver::default().solve(&a, &b, Vec3::new(0.4, 0.3, 1.5));
        let clip_from_world = camera.projection * camera.view;
        let exit_frame = b.pose.mirrored();

        for (corner, expected) in [
            (Vec3::new(-1.0, -1.5, 0.0), (-1.0, -1.0)),
            (Vec3::new(1.0, -1.5, 0.0), (1.0, -1.0)),
            (Vec3::new(1.0, 1.5, 0.0), (1.0, 1.0)),
            (Vec3::new(-1.0, 1.5, 0.0), (-1.0, 1.0)),
        ] {
            let world = exit_frame.transform_point(corner);
            let clip = clip_from_world * Vec4::new(world.x, world.y, world.z, 1.0);
            let ndc = clip / clip.w;
            assert!((ndc.x - expected.0).abs() < 1.0e-4, "{corner:?} -> {ndc:?}");
            assert!((ndc.y - expected.1).abs() < 1.0e-4, "{corner:?} -> {ndc:?}");
            assert!(ndc.z.abs() < 1.0e-4, "corner should sit on the near plane: {ndc:?}");
        }
    }

    #[test]
    fn off_axis_matrix_maps_depth_range_to_unit_interval() {
        let projection = off_axis_perspective_rh(-1.0, 2.0, -0.5, 1.5, 0.5, 50.0);
        let near = projection * Vec4::new(0.0, 0.0, -0.5, 1.0);
        let far = projection * Vec4::new(0.0, 0.0, -50.0, 1.0);
        assert!((near.z / near.w).abs() < 1.0e-6);
        assert!((far.z / far.w - 1.0).abs() < 1.0e-5);
    }
}
