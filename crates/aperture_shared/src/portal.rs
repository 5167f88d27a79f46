use std::fmt;

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::projection::VirtualCamera;
use crate::surface::{Side, Surface};
use crate::transform::Pose;

pub const PORTAL_WIDTH: f32 = 2.0;
pub const PORTAL_HEIGHT: f32 = 3.0;

pub const PORTAL_BLUE: [f32; 3] = [0.0, 0x65 as f32 / 255.0, 1.0];
pub const PORTAL_ORANGE: [f32; 3] = [1.0, 0x5d as f32 / 255.0, 0.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortalId(pub usize);

impl PortalId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PortalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "portal #{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct Portal {
    pub pose: Pose,
    pub size: Vec2,
    pub halo: [f32; 3],
    pub linked_to: Option<PortalId>,
    /// Camera from the most recent render pass through this portal.
    pub camera: Option<VirtualCamera>,
}

impl Portal {
    pub fn new(pose: Pose, halo: [f32; 3]) -> Self {
        Self {
            pose,
            size: Vec2::new(PORTAL_WIDTH, PORTAL_HEIGHT),
            halo,
            linked_to: None,
            camera: None,
        }
    }

    pub fn world_matrix(&self) -> Mat4 {
        self.pose.matrix()
    }

    pub fn half_extents(&self) -> Vec2 {
        self.size * 0.5
    }

    pub fn normal(&self) -> Vec3 {
        self.pose.normal()
    }

    /// Crossing geometry: only the front face counts, so exiting back through
    /// the destination never re-triggers.
    pub fn surface(&self) -> Surface {
        Surface::quad(self.pose, self.size, Side::Front)
    }

    /// Signed distance of `point` in front of the portal plane.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.pose.position).dot(self.normal())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    Unlinked(PortalId),
    SelfLinked(PortalId),
    Dangling { portal: PortalId, linked: PortalId },
    Asymmetric { portal: PortalId, linked: PortalId },
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unlinked(portal) => write!(f, "{portal} has no destination"),
            Self::SelfLinked(portal) => write!(f, "{portal} is linked to itself"),
            Self::Dangling { portal, linked } => {
                write!(f, "{portal} is linked to missing {linked}")
            }
            Self::Asymmetric { portal, linked } => {
                write!(f, "{portal} is linked to {linked}, which does not link back")
            }
        }
    }
}

impl std::error::Error for LinkError {}

/// Owns every portal; links are ids into this registry.
#[derive(Debug, Clone, Default)]
pub struct PortalRegistry {
    portals: Vec<Portal>,
}

impl PortalRegistry {
    pub fn insert(&mut self, portal: Portal) -> PortalId {
        self.portals.push(portal);
        PortalId(self.portals.len() - 1)
    }

    /// Links `a` and `b` to each other, unlinking any previous partners.
    pub fn link(&mut self, a: PortalId, b: PortalId) {
        for id in [a, b] {
            if let Some(previous) = self.destination(id) {
                if let Some(partner) = self.get_mut(previous) {
                    partner.linked_to = None;
                }
            }
        }
        if let Some(portal) = self.get_mut(a) {
            portal.linked_to = Some(b);
        }
        if let Some(portal) = self.get_mut(b) {
            portal.linked_to = Some(a);
        }
    }

    pub fn get(&self, id: PortalId) -> Option<&Portal> {
        self.portals.get(id.index())
    }

    pub fn get_mut(&mut self, id: PortalId) -> Option<&mut Portal> {
        self.portals.get_mut(id.index())
    }

    pub fn destination(&self, id: PortalId) -> Option<PortalId> {
        self.get(id).and_then(|portal| portal.linked_to)
    }

    /// The portal and its destination, when both exist.
    pub fn linked_pair(&self, id: PortalId) -> Option<(&Portal, &Portal)> {
        let portal = self.get(id)?;
        let destination = self.get(portal.linked_to?)?;
        Some((portal, destination))
    }

    pub fn iter(&self) -> impl Iterator<Item = (PortalId, &Portal)> {
        self.portals
            .iter()
            .enumerate()
            .map(|(index, portal)| (PortalId(index), portal))
    }

    pub fn len(&self) -> usize {
        self.portals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portals.is_empty()
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        for (id, portal) in self.iter() {
            let linked = portal.linked_to.ok_or(LinkError::Unlinked(id))?;
            if linked == id {
                return Err(LinkError::SelfLinked(id));
            }
            let partner = self
                .get(linked)
                .ok_or(LinkError::Dangling { portal: id, linked })?;
            if partner.linked_to != Some(id) {
                return Err(LinkError::Asymmetric { portal: id, linked });
            }
        }
        Ok(())
    }
}
