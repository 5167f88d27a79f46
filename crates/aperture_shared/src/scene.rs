use std::f32::consts::PI;
use std::fmt;

use glam::Vec3;
use tracing::info;

use crate::frame::FrameTick;
use crate::pipeline;
use crate::portal::{LinkError, Portal, PortalId, PortalRegistry, PORTAL_BLUE, PORTAL_ORANGE};
use crate::projection::ProjectionSolver;
use crate::render_target::RenderBackend;
use crate::surface::{raycast_surfaces, Ray, Side, Surface, SurfaceHit};
use crate::transform::{look_along, Pose};
use crate::traversal::{Crossing, TraversalDetector};
use crate::viewer::{Avatar, Viewer};
use crate::visibility::VisibilityFlags;

pub const VIEWER_START: Vec3 = Vec3::new(0.0, 1.6, 10.0);
/// Gap kept between a placed portal and the surface it sits on.
pub const PORTAL_SURFACE_OFFSET: f32 = 0.01;
pub const PORTAL_COUNT: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    PortalCount { expected: usize, found: usize },
    Link(LinkError),
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PortalCount { expected, found } => {
                write!(f, "scene needs {expected} portals, found {found}")
            }
            Self::Link(err) => write!(f, "invalid portal link: {err}"),
        }
    }
}

impl std::error::Error for SceneError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Link(err) => Some(err),
            Self::PortalCount { .. } => None,
        }
    }
}

impl From<LinkError> for SceneError {
    fn from(err: LinkError) -> Self {
        Self::Link(err)
    }
}

pub struct Scene {
    pub viewer: Viewer,
    pub avatar: Avatar,
    pub portals: PortalRegistry,
    pub surfaces: Vec<Surface>,
    pub visibility: VisibilityFlags,
    pub solver: ProjectionSolver,
    pub detector: TraversalDetector,
    pub blue: PortalId,
    pub orange: PortalId,
}

impl Scene {
    /// Takes ownership of a linked pair of portals. Ids 0 and 1 become blue and orange.
    pub fn new(
        viewer: Viewer,
        portals: PortalRegistry,
        surfaces: Vec<Surface>,
    ) -> Result<Self, SceneError> {
        if portals.len() != PORTAL_COUNT {
            return Err(SceneError::PortalCount {
                expected: PORTAL_COUNT,
                found: portals.len(),
            });
        }
        portals.validate()?;

        let mut avatar = Avatar::default();
        avatar.follow(&viewer);
        let visibility = VisibilityFlags::new(portals.len());

        Ok(Self {
            viewer,
            avatar,
            portals,
            surfaces,
            visibility,
            solver: ProjectionSolver::default(),
            detector: TraversalDetector::default(),
            blue: PortalId(0),
            orange: PortalId(1),
        })
    }

    /// The room with two ledges, a few blocks and a portal at either end.
    pub fn showcase() -> Result<Self, SceneError> {
        let mut portals = PortalRegistry::default();
        let blue = portals.insert(Portal::new(
            Pose::from_yaw(Vec3::new(0.0, 2.0, -15.99), 0.0),
            PORTAL_BLUE,
        ));
        let orange = portals.insert(Portal::new(
            Pose::from_yaw(Vec3::new(0.0, 2.0, 17.99), PI),
            PORTAL_ORANGE,
        ));
        portals.link(blue, orange);

        Self::new(Viewer::new(VIEWER_START), portals, showcase_surfaces())
    }

    pub fn validate(&self) -> Result<(), SceneError> {
        if self.portals.len() != PORTAL_COUNT {
            return Err(SceneError::PortalCount {
                expected: PORTAL_COUNT,
                found: self.portals.len(),
            });
        }
        self.portals.validate()?;
        Ok(())
    }

    /// Moves the viewer by `velocity` for one frame, then teleports it if that
    /// step went through a portal.
    pub fn tick(&mut self, frame: FrameTick, velocity: Vec3) -> Option<Crossing> {
        self.viewer.position += velocity * frame.delta;

        let crossing = self
            .detector
            .detect_and_apply(&mut self.viewer, &self.portals);
        if let Some(crossing) = crossing {
            info!(
                "teleported through {} to {} at ({:.2}, {:.2}, {:.2})",
                crossing.entry,
                crossing.exit,
                self.viewer.position.x,
                self.viewer.position.y,
                self.viewer.position.z
            );
        }

        self.avatar.follow(&self.viewer);
        self.viewer.snapshot_previous();
        crossing
    }

    pub fn render_portals<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        frame: FrameTick,
    ) -> u32 {
        pipeline::render_portals(
            backend,
            &self.solver,
            &mut self.portals,
            &mut self.visibility,
            &self.viewer,
            frame,
        )
    }

    /// Moves portal `id` onto the first surface `ray` hits, facing away from it.
    pub fn place_portal(&mut self, id: PortalId, ray: &Ray) -> Option<SurfaceHit> {
        let (index, hit) = raycast_surfaces(&self.surfaces, ray, f32::INFINITY)?;
        let normal = if self.surfaces[index].side == Side::Back {
            -hit.normal
        } else {
            hit.normal
        };

        let portal = self.portals.get_mut(id)?;
        portal.pose = Pose::new(hit.point + normal * PORTAL_SURFACE_OFFSET, look_along(normal));
        Some(hit)
    }
}

fn showcase_surfaces() -> Vec<Surface> {
    let block = |x: f32, y: f32, z: f32, w: f32, h: f32, d: f32| {
        Surface::block(Vec3::new(x, y, z), Vec3::new(w, h, d), Side::Front)
    };

    vec![
        Surface::block(Vec3::new(0.0, -4.0, 0.0), Vec3::new(15.0, 12.0, 36.0), Side::Back),
        block(0.0, -4.0, -15.0, 15.0, 4.0, 6.0),
        block(0.0, -4.0, 15.0, 15.0, 4.0, 6.0),
        block(-4.5, -4.0, 0.0, 6.0, 12.0, 6.0),
        block(6.0, -0.5, 0.0, 3.0, 5.0, 1.0),
        block(0.0, 0.0, -17.0, 5.0, 5.0, 2.0),
        block(-6.0, 0.0, 17.0, 3.0, 8.0, 2.0),
        block(6.0, 0.0, 17.0, 3.0, 8.0, 2.0),
    ]
}
