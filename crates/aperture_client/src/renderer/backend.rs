use aperture_shared::portal::PortalId;
use aperture_shared::projection::ViewProjection;
use aperture_shared::render_target::{RenderBackend, RenderFlags, RenderState, RenderTarget};
use aperture_shared::visibility::VisibilityFlags;
use tracing::warn;

use crate::renderer::pipeline::{GpuMesh, ScenePipeline};
use crate::renderer::portal_renderer::PortalRenderer;
use crate::renderer::{CameraUniform, RenderFrameStats};

pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.02,
    g: 0.02,
    b: 0.03,
    a: 1.0,
};

#[derive(Debug)]
pub struct CameraSlot {
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

/// GPU state shared by every pass of a frame.
#[derive(Debug)]
pub struct SceneResources {
    pub pipeline: ScenePipeline,
    /// Slot 0 is the screen, slot `1 + i` the target of portal `i`.
    pub camera_slots: Vec<CameraSlot>,
    pub scene_mesh: GpuMesh,
    pub avatar_mesh: GpuMesh,
}

pub fn camera_slot(target: RenderTarget) -> usize {
    match target {
        RenderTarget::Screen => 0,
        RenderTarget::Portal(id) => 1 + id.index(),
    }
}

/// Writes into the per-portal slot; ids without a slot are ignored.
pub fn store_noise_rotation(rotations: &mut [f32], portal: PortalId, radians: f32) {
    if let Some(slot) = rotations.get_mut(portal.index()) {
        *slot = radians;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassOps {
    pub color: wgpu::Operations<wgpu::Color>,
    pub depth: wgpu::Operations<f32>,
}

pub fn pass_ops(flags: RenderFlags) -> PassOps {
    let clear = flags.contains(RenderFlags::AUTO_CLEAR);
    PassOps {
        color: wgpu::Operations {
            load: if clear {
                wgpu::LoadOp::Clear(CLEAR_COLOR)
            } else {
                wgpu::LoadOp::Load
            },
            store: wgpu::StoreOp::Store,
        },
        depth: wgpu::Operations {
            load: if clear {
                wgpu::LoadOp::Clear(1.0)
            } else {
                wgpu::LoadOp::Load
            },
            store: if flags.contains(RenderFlags::DEPTH_WRITE) {
                wgpu::StoreOp::Store
            } else {
                wgpu::StoreOp::Discard
            },
        },
    }
}

/// Records one frame's passes into a command encoder.
pub struct FrameBackend<'a> {
    queue: &'a wgpu::Queue,
    encoder: &'a mut wgpu::CommandEncoder,
    screen_color: &'a wgpu::TextureView,
    screen_depth: &'a wgpu::TextureView,
    resources: &'a SceneResources,
    portal_renderer: &'a PortalRenderer,
    state: RenderState,
    noise_rotations: &'a mut [f32],
    stats: RenderFrameStats,
}

impl<'a> FrameBackend<'a> {
    pub fn new(
        queue: &'a wgpu::Queue,
        encoder: &'a mut wgpu::CommandEncoder,
        screen_color: &'a wgpu::TextureView,
        screen_depth: &'a wgpu::TextureView,
        resources: &'a SceneResources,
        portal_renderer: &'a PortalRenderer,
        noise_rotations: &'a mut [f32],
    ) -> Self {
        Self {
            queue,
            encoder,
            screen_color,
            screen_depth,
            resources,
            portal_renderer,
            state: RenderState::default(),
            noise_rotations,
            stats: RenderFrameStats::default(),
        }
    }

    pub fn finish(self) -> RenderFrameStats {
        self.stats
    }

    fn attachments(&self) -> Option<(&'a wgpu::TextureView, &'a wgpu::TextureView)> {
        match self.state.target {
            RenderTarget::Screen => Some((self.screen_color, self.screen_depth)),
            RenderTarget::Portal(id) => {
                let portal_renderer: &'a PortalRenderer = self.portal_renderer;
                portal_renderer
                    .target(id.index())
                    .map(|target| (&target.color_view, &target.depth_view))
            }
        }
    }
}

impl RenderBackend for FrameBackend<'_> {
    fn render_state(&self) -> RenderState {
        self.state
    }

    fn set_render_state(&mut self, state: RenderState) {
        self.state = state;
    }

    fn clear(&mut self) {
        let Some((color_view, depth_view)) = self.attachments() else {
            warn!("no render target for {:?}", self.state.target);
            return;
        };
        let ops = pass_ops(self.state.flags | RenderFlags::AUTO_CLEAR);
        let _ = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: ops.color,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(ops.depth),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn render_scene(&mut self, camera: &ViewProjection, visibility: &VisibilityFlags) {
        let resources = self.resources;
        let portal_renderer = self.portal_renderer;
        let target = self.state.target;

        let Some(slot) = resources.camera_slots.get(camera_slot(target)) else {
            warn!("no camera slot for {target:?}");
            return;
        };
        let Some((color_view, depth_view)) = self.attachments() else {
            warn!("no render target for {target:?}");
            return;
        };
        self.queue.write_buffer(
            &slot.buffer,
            0,
            bytemuck::bytes_of(&CameraUniform::from_view_projection(camera)),
        );

        let ops = pass_ops(self.state.flags);
        let mut render_pass = self.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(match target {
                RenderTarget::Screen => "Main Scene Pass",
                RenderTarget::Portal(_) => "Portal RTT Scene Pass",
            }),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: ops.color,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(ops.depth),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        if let Some(viewport) = self.state.viewport {
            render_pass.set_viewport(
                viewport.x as f32,
                viewport.y as f32,
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                1.0,
            );
        }

        render_pass.set_pipeline(resources.pipeline.pipeline());
        render_pass.set_bind_group(0, &slot.bind_group, &[]);
        self.stats.scene_draw_calls += resources.scene_mesh.draw(&mut render_pass);
        if visibility.avatar {
            self.stats.scene_draw_calls += resources.avatar_mesh.draw(&mut render_pass);
        }

        let visible = visibility
            .visible_portals()
            .filter(|id| RenderTarget::Portal(*id) != target)
            .map(PortalId::index);
        self.stats.portal_draw_calls +=
            portal_renderer.render_portal_surfaces(&mut render_pass, &slot.bind_group, visible);

        if target != RenderTarget::Screen {
            self.stats.portal_view_passes += 1;
        }
    }

    fn set_portal_noise_rotation(&mut self, portal: PortalId, radians: f32) {
        store_noise_rotation(self.noise_rotations, portal, radians);
    }
}

#[cfg(test)]
mod tests {
    use aperture_shared::portal::PortalId;
    use aperture_shared::render_target::{RenderFlags, RenderTarget};

    use super::{camera_slot, pass_ops, store_noise_rotation, CLEAR_COLOR};

    #[test]
    fn every_target_has_its_own_camera_slot() {
        assert_eq!(camera_slot(RenderTarget::Screen), 0);
        assert_eq!(camera_slot(RenderTarget::Portal(PortalId(0))), 1);
        assert_eq!(camera_slot(RenderTarget::Portal(PortalId(1))), 2);
    }

    #[test]
    fn auto_clear_picks_load_ops() {
        let cleared = pass_ops(RenderFlags::default());
        assert_eq!(cleared.color.load, wgpu::LoadOp::Clear(CLEAR_COLOR));
        assert_eq!(cleared.depth.load, wgpu::LoadOp::Clear(1.0));
        assert_eq!(cleared.depth.store, wgpu::StoreOp::Store);

        let kept = pass_ops(RenderFlags::empty());
        assert_eq!(kept.color.load, wgpu::LoadOp::Load);
        assert_eq!(kept.depth.load, wgpu::LoadOp::Load);
        assert_eq!(kept.depth.store, wgpu::StoreOp::Discard);
        assert_eq!(kept.color.store, wgpu::StoreOp::Store);
    }

    #[test]
    fn noise_rotations_land_in_place() {
        let mut rotations = [0.0; 2];
        store_noise_rotation(&mut rotations, PortalId(1), 1.5);
        store_noise_rotation(&mut rotations, PortalId(0), 0.5);
        store_noise_rotation(&mut rotations, PortalId(7), 9.0);
        assert_eq!(rotations, [0.5, 1.5]);
    }
}
