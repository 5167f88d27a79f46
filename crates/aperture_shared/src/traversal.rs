use glam::{Mat4, Vec3};
use tracing::debug;

use crate::portal::{Portal, PortalId, PortalRegistry};
use crate::surface::Ray;
use crate::transform::Pose;
use crate::viewer::Viewer;

/// Extra length on both ends of the motion segment.
pub const CROSSING_PADDING: f32 = 0.25;
const MIN_SEGMENT_LENGTH: f32 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub entry: PortalId,
    pub exit: PortalId,
    /// Distance along the padded segment at which the entry plane was hit.
    pub distance: f32,
}

/// World transform taking anything in front of `entry` to the matching place
/// behind `exit`'s mirrored frame.
pub fn portal_transfer(entry: &Portal, exit: &Portal) -> Mat4 {
    exit.pose.mirrored().matrix() * entry.world_matrix().inverse()
}

#[derive(Debug, Clone, Copy)]
pub struct TraversalDetector {
    padding: f32,
}

impl Default for TraversalDetector {
    fn default() -> Self {
        Self::new(CROSSING_PADDING)
    }
}

impl TraversalDetector {
    pub fn new(padding: f32) -> Self {
        Self {
            padding: padding.max(0.0),
        }
    }

    /// Nearest linked portal whose front face the padded segment passes through.
    /// Portals are visited in id order and only a strictly closer hit replaces
    /// the best one, so ties go to the lower id.
    pub fn find_crossing(
        &self,
        from: Vec3,
        to: Vec3,
        registry: &PortalRegistry,
    ) -> Option<(PortalId, f32)> {
        let motion = to - from;
        let length = motion.length();
        if length <= MIN_SEGMENT_LENGTH {
            return None;
        }

        let direction = motion / length;
        let ray = Ray::new(from - direction * self.padding, direction);
        let max_distance = length + self.padding * 2.0;

        let mut nearest: Option<(PortalId, f32)> = None;
        for (id, portal) in registry.iter() {
            if portal.linked_to.is_none() {
                continue;
            }
            let Some(hit) = portal.surface().raycast(&ray, max_distance) else {
                continue;
            };
            let closer = match nearest {
                Some((_, best_distance)) => hit.distance < best_distance,
                None => true,
            };
            if closer {
                nearest = Some((id, hit.distance));
            }
        }
        nearest
    }

    /// Teleports `viewer` when its last step went through a portal.
    pub fn detect_and_apply(
        &self,
        viewer: &mut Viewer,
        registry: &PortalRegistry,
    ) -> Option<Crossing> {
        let (entry_id, distance) =
            self.find_crossing(viewer.previous_position, viewer.position, registry)?;
        let Some((entry, exit)) = registry.linked_pair(entry_id) else {
            debug!("{entry_id} was crossed but has no destination");
            return None;
        };
        let exit_id = entry.linked_to?;

        let relative = entry.world_matrix().inverse() * viewer.world_matrix();
        let destination = exit.pose.mirrored().matrix();
        viewer.set_pose(Pose::from_matrix(destination * relative));
        viewer.previous_position = viewer.position;

        Some(Crossing {
            entry: entry_id,
            exit: exit_id,
            distance,
        })
    }
}
