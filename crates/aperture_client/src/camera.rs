use aperture_shared::projection::ViewProjection;
use aperture_shared::viewer::Viewer;
use glam::{Mat4, Vec3};
use winit::keyboard::KeyCode;

use crate::input::InputState;

pub const NEAR_PLANE: f32 = 0.01;
pub const FAR_PLANE: f32 = 100.0;
/// Settings store sensitivity in friendlier units than radians per pixel.
const SENSITIVITY_SCALE: f32 = 0.001;

/// Perspective of the main window camera.
#[derive(Debug, Clone)]
pub struct Lens {
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Lens {
    fn default() -> Self {
        Self {
            fov: 70.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: NEAR_PLANE,
            far: FAR_PLANE,
        }
    }
}

impl Lens {
    pub fn with_fov_degrees(fov: f32) -> Self {
        Self {
            fov: fov.to_radians(),
            ..Self::default()
        }
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov,
            self.aspect.max(0.0001),
            self.near.max(0.0001),
            self.far.max(self.near + 0.0001),
        )
    }

    pub fn view_projection(&self, viewer: &Viewer) -> ViewProjection {
        ViewProjection {
            view: viewer.view_matrix(),
            projection: self.projection_matrix(),
            position: viewer.position,
        }
    }
}

/// Mouse right turns right, mouse down looks down.
pub fn update_look(viewer: &mut Viewer, input: &InputState, mouse_sensitivity: f32) {
    let scale = mouse_sensitivity * SENSITIVITY_SCALE;
    viewer.look(-input.look_delta.x * scale, -input.look_delta.y * scale);
}

/// Unit direction from WASD plus Space/Shift for flying, or zero.
pub fn movement_direction(viewer: &Viewer, input: &InputState) -> Vec3 {
    let forward = viewer.heading();
    let right = forward.cross(Vec3::Y);

    let mut dir = Vec3::ZERO;
    if input.is_held(KeyCode::KeyW) {
        dir += forward;
    }
    if input.is_held(KeyCode::KeyS) {
        dir -= forward;
    }
    if input.is_held(KeyCode::KeyD) {
        dir += right;
    }
    if input.is_held(KeyCode::KeyA) {
        dir -= right;
    }
    if input.is_held(KeyCode::Space) {
        dir += Vec3::Y;
    }
    if input.is_held(KeyCode::ShiftLeft) {
        dir -= Vec3::Y;
    }

    dir.normalize_or_zero()
}

#[cfg(test)]
mod tests {
    use aperture_shared::viewer::Viewer;
    use glam::{Vec2, Vec3, Vec4};
    use winit::keyboard::KeyCode;

    use super::{movement_direction, update_look, Lens};
    use crate::input::InputState;

    fn assert_near(actual: Vec3, expected: Vec3) {
        assert!(
            (actual - expected).length() < 1.0e-5,
            "expected {expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn forward_and_strafe_follow_heading() {
        let viewer = Viewer::default();
        let mut input = InputState::default();

        input.press_key(KeyCode::KeyW);
        assert_near(movement_direction(&viewer, &input), Vec3::NEG_Z);

        input.release_key(KeyCode::KeyW);
        input.press_key(KeyCode::KeyD);
        assert_near(movement_direction(&viewer, &input), Vec3::X);

        input.press_key(KeyCode::KeyA);
        assert_eq!(movement_direction(&viewer, &input), Vec3::ZERO);
    }

    #[test]
    fn diagonal_movement_is_normalized() {
        let viewer = Viewer::default();
        let mut input = InputState::default();
        input.press_key(KeyCode::KeyW);
        input.press_key(KeyCode::Space);

        let dir = movement_direction(&viewer, &input);
        assert!((dir.length() - 1.0).abs() < 1.0e-5);
        assert!(dir.y > 0.0 && dir.z < 0.0);
    }

    #[test]
    fn mouse_right_turns_right() {
        let mut viewer = Viewer::default();
        let input = InputState {
            look_delta: Vec2::new(100.0, 0.0),
            ..Default::default()
        };
        update_look(&mut viewer, &input, 2.5);

        assert!(viewer.yaw < 0.0);
        assert!(viewer.forward().x > 0.0);
    }

    #[test]
    fn lens_sees_points_in_front_of_the_viewer() {
        let mut lens = Lens::with_fov_degrees(70.0);
        lens.set_viewport(1600, 900);
        assert!((lens.aspect - 16.0 / 9.0).abs() < 1.0e-5);

        let viewer = Viewer::new(Vec3::new(0.0, 1.6, 10.0));
        let clip = lens.view_projection(&viewer).matrix() * Vec4::new(0.0, 1.6, 5.0, 1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(clip.w > 0.0);
        assert!(ndc.x.abs() < 1.0e-5 && ndc.y.abs() < 1.0e-5);
        assert!(ndc.z > 0.0 && ndc.z < 1.0);
    }
}
