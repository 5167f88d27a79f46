use std::mem;

use aperture_shared::portal::Portal;
use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Vec2, Vec3};
use wgpu::util::DeviceExt;

use crate::renderer::mesh::simple_rng_next;

const NOISE_TEXTURE_SIZE: u32 = 32;
const NOISE_SEED: u64 = 0x5EED_0FA9_E27D;
const NOISE_SEED_STRIDE: u64 = 0x9E37_79B9_7F4A_7C15;
/// How often the noise tiles across a portal, horizontally and vertically.
pub const NOISE_REPEAT: Vec2 = Vec2::new(2.0, 3.0);
/// Width over height of every portal render target.
const TARGET_ASPECT: f32 = 2.0 / 3.0;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct PortalVertex {
    position: [f32; 3],
    uv: [f32; 2],
}

impl PortalVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<PortalVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct PortalParamsUniform {
    model: [[f32; 4]; 4],
    halo: [f32; 4],
    noise_transform: [[f32; 4]; 3],
}

impl PortalParamsUniform {
    fn new(draw: &PortalDraw, noise_rotation: f32) -> Self {
        let noise = noise_uv_transform(NOISE_REPEAT, noise_rotation);
        Self {
            model: draw.model.to_cols_array_2d(),
            halo: [draw.halo[0], draw.halo[1], draw.halo[2], 1.0],
            noise_transform: [
                noise.x_axis.extend(0.0).to_array(),
                noise.y_axis.extend(0.0).to_array(),
                noise.z_axis.extend(0.0).to_array(),
            ],
        }
    }
}

impl Default for PortalParamsUniform {
    fn default() -> Self {
        Self::new(
            &PortalDraw {
                model: Mat4::IDENTITY,
                halo: [1.0; 3],
            },
            0.0,
        )
    }
}

/// What the surface pass needs from a portal, copied out of the scene each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalDraw {
    /// Maps the unit quad `[-1, 1]^2` onto the portal rectangle.
    pub model: Mat4,
    pub halo: [f32; 3],
}

impl PortalDraw {
    pub fn from_portal(portal: &Portal) -> Self {
        let half = portal.half_extents();
        Self {
            model: portal.world_matrix() * Mat4::from_scale(Vec3::new(half.x, half.y, 1.0)),
            halo: portal.halo,
        }
    }
}

/// Texture-space transform for the scrolling noise: tile by `repeat`, then spin.
pub fn noise_uv_transform(repeat: Vec2, rotation: f32) -> Mat3 {
    let (s, c) = rotation.sin_cos();
    Mat3::from_cols(
        Vec3::new(repeat.x * c, -repeat.y * s, 0.0),
        Vec3::new(repeat.x * s, repeat.y * c, 0.0),
        Vec3::Z,
    )
}

/// Size of a portal render target for a window `window_height` pixels tall.
pub fn target_extent(window_height: u32, scale: f32) -> (u32, u32) {
    let height = ((window_height.max(1) as f32) * scale).round().max(1.0);
    let width = (height * TARGET_ASPECT).round().max(1.0);
    (width as u32, height as u32)
}

pub struct PortalRenderTarget {
    _color_texture: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    _depth_texture: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    sample_bind_group: wgpu::BindGroup,
}

struct PortalParams {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct NoiseTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

pub struct PortalRenderer {
    surface_pipeline: wgpu::RenderPipeline,
    portal_texture_bind_group_layout: wgpu::BindGroupLayout,
    params: Vec<PortalParams>,
    surface_vertex_buffer: wgpu::Buffer,
    surface_index_buffer: wgpu::Buffer,
    surface_index_count: u32,
    sampler: wgpu::Sampler,
    noise_textures: Vec<NoiseTexture>,
    noise_sampler: wgpu::Sampler,
    targets: Vec<PortalRenderTarget>,
    target_width: u32,
    target_height: u32,
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
    texture_scale: f32,
}

impl PortalRenderer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
        portal_count: usize,
        texture_scale: f32,
    ) -> Self {
        let surface_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Portal Surface Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/portal_surface.wgsl"
                ))
                .into(),
            ),
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        };
        let sampler_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
        let portal_texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Portal Texture Bind Group Layout"),
                entries: &[
                    texture_entry(0),
                    sampler_entry(1),
                    texture_entry(2),
                    sampler_entry(3),
                ],
            });

        let portal_params_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Portal Params Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Portal RTT Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });
        let noise_textures = (0..portal_count)
            .map(|index| create_noise_texture(device, queue, index))
            .collect();
        let noise_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Portal Noise Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let params = (0..portal_count)
            .map(|index| {
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Portal Params Buffer {index}")),
                    contents: bytemuck::bytes_of(&PortalParamsUniform::default()),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Portal Params Bind Group {index}")),
                    layout: &portal_params_bind_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                });
                PortalParams { buffer, bind_group }
            })
            .collect();

        let surface_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Portal Surface Pipeline Layout"),
                bind_group_layouts: &[
                    camera_bind_group_layout,
                    &portal_texture_bind_group_layout,
                    &portal_params_bind_group_layout,
                ],
                push_constant_ranges: &[],
            });

        let surface_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Portal Surface Pipeline"),
            layout: Some(&surface_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &surface_shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[PortalVertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &surface_shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Texture rows run top-down, so v is flipped against the quad's y.
        let surface_vertices = [
            PortalVertex {
                position: [-1.0, -1.0, 0.0],
                uv: [0.0, 1.0],
            },
            PortalVertex {
                position: [1.0, -1.0, 0.0],
                uv: [1.0, 1.0],
            },
            PortalVertex {
                position: [1.0, 1.0, 0.0],
                uv: [1.0, 0.0],
            },
            PortalVertex {
                position: [-1.0, 1.0, 0.0],
                uv: [0.0, 0.0],
            },
        ];
        let surface_indices: [u16; 6] = [0, 1, 2, 0, 2, 3];
        let surface_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Portal Surface Vertex Buffer"),
            contents: bytemuck::cast_slice(&surface_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let surface_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Portal Surface Index Buffer"),
            contents: bytemuck::cast_slice(&surface_indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let mut renderer = Self {
            surface_pipeline,
            portal_texture_bind_group_layout,
            params,
            surface_vertex_buffer,
            surface_index_buffer,
            surface_index_count: surface_indices.len() as u32,
            sampler,
            noise_textures,
            noise_sampler,
            targets: Vec::new(),
            target_width: 0,
            target_height: 0,
            color_format,
            depth_format,
            texture_scale,
        };
        renderer.targets = renderer.create_targets(device, 1, 1);
        renderer.target_width = 1;
        renderer.target_height = 1;
        renderer
    }

    /// Rebuilds the offscreen targets when the window height changes their size.
    pub fn resize(&mut self, device: &wgpu::Device, window_height: u32) {
        let (width, height) = target_extent(window_height, self.texture_scale);
        if width == self.target_width && height == self.target_height {
            return;
        }

        self.targets = self.create_targets(device, width, height);
        self.target_width = width;
        self.target_height = height;
    }

    pub fn target(&self, index: usize) -> Option<&PortalRenderTarget> {
        self.targets.get(index)
    }

    /// `noise_rotations` is indexed like the portals.
    pub fn write_params(
        &self,
        queue: &wgpu::Queue,
        portals: impl IntoIterator<Item = PortalDraw>,
        noise_rotations: &[f32],
    ) {
        for ((draw, params), rotation) in portals
            .into_iter()
            .zip(&self.params)
            .zip(noise_rotations)
        {
            let uniform = PortalParamsUniform::new(&draw, *rotation);
            queue.write_buffer(&params.buffer, 0, bytemuck::bytes_of(&uniform));
        }
    }

    /// Draws the surfaces of the portals in `visible`, sampling their own targets.
    pub fn render_portal_surfaces<'a>(
        &'a self,
        render_pass: &mut wgpu::RenderPass<'a>,
        camera_bind_group: &'a wgpu::BindGroup,
        visible: impl Iterator<Item = usize>,
    ) -> u32 {
        render_pass.set_pipeline(&self.surface_pipeline);
        render_pass.set_bind_group(0, camera_bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.surface_vertex_buffer.slice(..));
        render_pass.set_index_buffer(
            self.surface_index_buffer.slice(..),
            wgpu::IndexFormat::Uint16,
        );

        let mut draw_calls = 0;
        for index in visible {
            let (Some(target), Some(params)) = (self.targets.get(index), self.params.get(index))
            else {
                continue;
            };
            render_pass.set_bind_group(1, &target.sample_bind_group, &[]);
            render_pass.set_bind_group(2, &params.bind_group, &[]);
            render_pass.draw_indexed(0..self.surface_index_count, 0, 0..1);
            draw_calls += 1;
        }
        draw_calls
    }

    fn create_targets(
        &self,
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> Vec<PortalRenderTarget> {
        self.noise_textures
            .iter()
            .enumerate()
            .map(|(index, noise)| {
                let size = wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                };
                let color_texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("Portal RTT Color Texture {index}")),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: self.color_format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                });
                let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

                let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("Portal RTT Depth Texture {index}")),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: self.depth_format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                });
                let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

                let sample_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Portal RTT Sample Bind Group {index}")),
                    layout: &self.portal_texture_bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&color_view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(&noise.view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::Sampler(&self.noise_sampler),
                        },
                    ],
                });

                PortalRenderTarget {
                    _color_texture: color_texture,
                    color_view,
                    _depth_texture: depth_texture,
                    depth_view,
                    sample_bind_group,
                }
            })
            .collect()
    }
}

/// Every portal gets its own noise pattern.
fn noise_seed(index: usize) -> u64 {
    NOISE_SEED ^ (index as u64).wrapping_mul(NOISE_SEED_STRIDE)
}

fn noise_bytes(seed: u64) -> Vec<u8> {
    let mut state = seed;
    (0..NOISE_TEXTURE_SIZE * NOISE_TEXTURE_SIZE)
        .map(|_| (simple_rng_next(&mut state) >> 56) as u8)
        .collect()
}

fn create_noise_texture(device: &wgpu::Device, queue: &wgpu::Queue, index: usize) -> NoiseTexture {
    let size = wgpu::Extent3d {
        width: NOISE_TEXTURE_SIZE,
        height: NOISE_TEXTURE_SIZE,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&format!("Portal Noise Texture {index}")),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &noise_bytes(noise_seed(index)),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(NOISE_TEXTURE_SIZE),
            rows_per_image: Some(NOISE_TEXTURE_SIZE),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    NoiseTexture {
        _texture: texture,
        view,
    }
}
