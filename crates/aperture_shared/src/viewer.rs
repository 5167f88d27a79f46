use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::transform::Pose;

pub const MAX_PITCH: f32 = 89.0_f32.to_radians();

/// The camera rig. Orientation is yaw then pitch (YXZ order) and never carries roll.
#[derive(Debug, Clone)]
pub struct Viewer {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    /// Position at the end of the previous frame, used for crossing tests.
    pub previous_position: Vec3,
}

impl Default for Viewer {
    fn default() -> Self {
        Self::new(Vec3::ZERO)
    }
}

impl Viewer {
    pub fn new(position: Vec3) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            previous_position: position,
        }
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.orientation())
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.pose().matrix()
    }

    pub fn view_matrix(&self) -> Mat4 {
        self.pose().inverse().matrix()
    }

    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    /// Forward flattened onto the ground plane.
    pub fn heading(&self) -> Vec3 {
        Vec3::new(-self.yaw.sin(), 0.0, -self.yaw.cos())
    }

    pub fn look(&mut self, yaw_delta: f32, pitch_delta: f32) {
        self.yaw += yaw_delta;
        self.pitch = (self.pitch + pitch_delta).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Adopts `pose`, dropping whatever roll it carries. Pitch keeps the look limit.
    pub fn set_pose(&mut self, pose: Pose) {
        let (yaw, pitch, _roll) = pose.orientation.to_euler(EulerRot::YXZ);
        self.position = pose.position;
        self.yaw = yaw;
        self.pitch = pitch.clamp(-MAX_PITCH, MAX_PITCH);
    }

    pub fn snapshot_previous(&mut self) {
        self.previous_position = self.position;
    }
}

/// The viewer's body. Only drawn inside portal passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Avatar {
    pub position: Vec3,
    pub yaw: f32,
}

impl Avatar {
    /// Copies the viewer's position and heading; pitch and roll stay level.
    pub fn follow(&mut self, viewer: &Viewer) {
        self.position = viewer.position;
        self.yaw = viewer.yaw;
    }

    pub fn model_matrix(&self) -> Mat4 {
        Pose::from_yaw(self.position, self.yaw).matrix()
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::{FRAC_PI_2, PI};

    use glam::{EulerRot, Quat, Vec3};

    use super::{Avatar, Viewer, MAX_PITCH};
    use crate::transform::{assert_vec3_near, Pose};

    #[test]
    fn default_viewer_looks_down_negative_z() {
        let viewer = Viewer::new(Vec3::new(0.0, 1.6, 10.0));
        assert_vec3_near(viewer.forward(), Vec3::NEG_Z, 1.0e-6);
        assert_vec3_near(viewer.heading(), Vec3::NEG_Z, 1.0e-6);
        assert_eq!(viewer.previous_position, viewer.position);
    }

    #[test]
    fn heading_matches_forward_when_level() {
        let mut viewer = Viewer::default();
        viewer.look(0.8, 0.0);
        assert_vec3_near(viewer.heading(), viewer.forward(), 1.0e-5);
    }

    #[test]
    fn pitch_is_clamped() {
        let mut viewer = Viewer::default();
        viewer.look(0.0, PI);
        assert_eq!(viewer.pitch, MAX_PITCH);
        viewer.look(0.0, -2.0 * PI);
        assert_eq!(viewer.pitch, -MAX_PITCH);
    }

    #[test]
    fn set_pose_discards_roll() {
        let mut viewer = Viewer::default();
        let orientation = Quat::from_euler(EulerRot::YXZ, 0.5, 0.2, FRAC_PI_2 * 0.5);
        viewer.set_pose(Pose::new(Vec3::ONE, orientation));

        assert!((viewer.yaw - 0.5).abs() < 1.0e-5);
        assert!((viewer.pitch - 0.2).abs() < 1.0e-5);
        let (_, _, roll) = viewer.orientation().to_euler(EulerRot::YXZ);
        assert!(roll.abs() < 1.0e-6);
    }

    #[test]
    fn set_pose_respects_pitch_limit() {
        let mut viewer = Viewer::default();
        viewer.set_pose(Pose::new(Vec3::ZERO, Quat::from_rotation_x(FRAC_PI_2)));
        assert!((viewer.pitch - MAX_PITCH).abs() < 1.0e-6);

        // A look that changes nothing must not jump afterwards.
        let settled = viewer.pitch;
        viewer.look(0.0, 0.0);
        assert_eq!(viewer.pitch, settled);

        viewer.set_pose(Pose::new(Vec3::ZERO, Quat::from_rotation_x(-FRAC_PI_2)));
        assert!((viewer.pitch + MAX_PITCH).abs() < 1.0e-6);
    }

    #[test]
    fn view_matrix_is_inverse_of_world_matrix() {
        let mut viewer = Viewer::new(Vec3::new(1.0, 2.0, 3.0));
        viewer.look(1.1, -0.4);
        let product = viewer.view_matrix() * viewer.world_matrix();
        assert!(product.abs_diff_eq(glam::Mat4::IDENTITY, 1.0e-5));
    }

    #[test]
    fn avatar_follows_heading_only() {
        let mut viewer = Viewer::new(Vec3::new(4.0, 1.6, -2.0));
        viewer.look(0.3, 0.6);
        let mut avatar = Avatar::default();
        avatar.follow(&viewer);

        assert_eq!(avatar.position, viewer.position);
        assert_eq!(avatar.yaw, viewer.yaw);
        let up = avatar.model_matrix().transform_vector3(Vec3::Y);
        assert_vec3_near(up, Vec3::Y, 1.0e-6);
    }
}
