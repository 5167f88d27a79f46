pub mod backend;
pub mod mesh;
pub mod pipeline;
pub mod portal_renderer;

use std::fmt;
use std::sync::Arc;

use aperture_shared::frame::FrameTick;
use aperture_shared::projection::ViewProjection;
use aperture_shared::render_target::RenderBackend;
use aperture_shared::scene::Scene;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use tracing::info;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::renderer::backend::{CameraSlot, FrameBackend, SceneResources};
use crate::renderer::mesh::{build_avatar_mesh, build_scene_mesh};
use crate::renderer::pipeline::{GpuMesh, MeshParamsUniform, ScenePipeline};
use crate::renderer::portal_renderer::{PortalDraw, PortalRenderer};
use crate::settings::ClientSettings;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const SCENE_SEED: u32 = 0x0A9E_27;
const AVATAR_TINT: [f32; 3] = [1.0, 1.0, 1.0];

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub(crate) struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
}

impl CameraUniform {
    pub(crate) fn from_view_projection(camera: &ViewProjection) -> Self {
        Self {
            view_proj: camera.matrix().to_cols_array_2d(),
            camera_pos: camera.position.extend(1.0).to_array(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderFrameStats {
    pub scene_draw_calls: u32,
    pub portal_draw_calls: u32,
    pub portal_view_passes: u32,
}

#[derive(Debug)]
struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthTexture {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Aperture Depth Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_texture: DepthTexture,
    resources: SceneResources,
    portal_renderer: PortalRenderer,
    /// Per-portal noise angle, refilled by the portal passes every frame.
    noise_rotations: Vec<f32>,
    last_frame_stats: RenderFrameStats,
}

#[derive(Debug)]
pub enum RendererInitError {
    CreateSurface(wgpu::CreateSurfaceError),
    RequestAdapter(wgpu::RequestAdapterError),
    RequestDevice(wgpu::RequestDeviceError),
    UnsupportedSurface,
}

impl fmt::Display for RendererInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSurface(err) => write!(f, "failed to create surface: {err}"),
            Self::RequestAdapter(err) => write!(f, "failed to request adapter: {err}"),
            Self::RequestDevice(err) => write!(f, "failed to request device: {err}"),
            Self::UnsupportedSurface => write!(f, "adapter does not support this surface"),
        }
    }
}

impl std::error::Error for RendererInitError {}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        scene: &Scene,
        settings: &ClientSettings,
    ) -> Result<Self, RendererInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(RendererInitError::CreateSurface)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(RendererInitError::RequestAdapter)?;
        info!("using adapter {}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Aperture Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(RendererInitError::RequestDevice)?;

        let initial_size = window.inner_size();
        let mut surface_config = surface
            .get_default_config(&adapter, initial_size.width.max(1), initial_size.height.max(1))
            .ok_or(RendererInitError::UnsupportedSurface)?;
        surface_config.present_mode = if settings.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };

        surface.configure(&device, &surface_config);

        let pipeline = ScenePipeline::new(&device, surface_config.format, DEPTH_FORMAT);

        let initial_camera_uniform = CameraUniform {
            view_proj: Mat4::IDENTITY.to_cols_array_2d(),
            camera_pos: [0.0; 4],
        };
        let camera_slots = (0..=scene.portals.len())
            .map(|slot| {
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Camera Uniform Buffer {slot}")),
                    contents: bytemuck::bytes_of(&initial_camera_uniform),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Camera Bind Group {slot}")),
                    layout: &pipeline.camera_bind_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                });
                CameraSlot { buffer, bind_group }
            })
            .collect();

        let scene_mesh = build_scene_mesh(&scene.surfaces, SCENE_SEED);
        info!(
            "scene mesh: {} vertices, {} triangles",
            scene_mesh.vertices.len(),
            scene_mesh.indices.len() / 3
        );
        let scene_mesh = GpuMesh::upload(
            &device,
            &pipeline.mesh_params_bind_group_layout,
            &scene_mesh,
            MeshParamsUniform::new(Mat4::IDENTITY, [1.0; 3], 1.0),
            "Scene",
        );
        let avatar_mesh = GpuMesh::upload(
            &device,
            &pipeline.mesh_params_bind_group_layout,
            &build_avatar_mesh(),
            MeshParamsUniform::new(scene.avatar.model_matrix(), AVATAR_TINT, 0.0),
            "Avatar",
        );

        let mut portal_renderer = PortalRenderer::new(
            &device,
            &queue,
            surface_config.format,
            DEPTH_FORMAT,
            &pipeline.camera_bind_group_layout,
            scene.portals.len(),
            settings.portal_texture_scale,
        );
        portal_renderer.resize(&device, surface_config.height);
        let depth_texture = DepthTexture::new(&device, surface_config.width, surface_config.height);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            depth_texture,
            resources: SceneResources {
                pipeline,
                camera_slots,
                scene_mesh,
                avatar_mesh,
            },
            portal_renderer,
            noise_rotations: vec![0.0; scene.portals.len()],
            last_frame_stats: RenderFrameStats::default(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_texture = DepthTexture::new(&self.device, width, height);
        self.portal_renderer.resize(&self.device, height);
    }

    pub fn last_frame_stats(&self) -> RenderFrameStats {
        self.last_frame_stats
    }

    /// Renders every portal view offscreen, then the scene to the window.
    pub fn render_frame(
        &mut self,
        scene: &mut Scene,
        screen_camera: &ViewProjection,
        frame: FrameTick,
    ) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Aperture Command Encoder"),
            });

        self.resources.avatar_mesh.write_params(
            &self.queue,
            MeshParamsUniform::new(scene.avatar.model_matrix(), AVATAR_TINT, 0.0),
        );

        let stats = {
            let mut backend = FrameBackend::new(
                &self.queue,
                &mut encoder,
                &view,
                &self.depth_texture.view,
                &self.resources,
                &self.portal_renderer,
                &mut self.noise_rotations,
            );
            scene.render_portals(&mut backend, frame);
            backend.render_scene(screen_camera, &scene.visibility);
            backend.finish()
        };

        self.portal_renderer.write_params(
            &self.queue,
            scene
                .portals
                .iter()
                .map(|(_, portal)| PortalDraw::from_portal(portal)),
            &self.noise_rotations,
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        self.last_frame_stats = stats;
        Ok(())
    }
}
