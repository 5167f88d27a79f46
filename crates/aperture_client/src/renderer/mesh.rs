use std::f32::consts::{PI, TAU};

use aperture_shared::surface::{Side, Surface, SurfaceShape};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use noise::{NoiseFn, Perlin};

const CELLS_PER_UNIT: f32 = 2.0;
const HUE_FREQUENCY: f64 = 0.008;

const AVATAR_HEAD_RADIUS: f32 = 0.3;
const AVATAR_BODY_TOP_RADIUS: f32 = 0.2;
const AVATAR_BODY_BOTTOM_RADIUS: f32 = 0.1;
const AVATAR_BODY_HEIGHT: f32 = 1.3;
/// Feet sit this far below the eye.
const AVATAR_EYE_HEIGHT: f32 = 1.6;
const AVATAR_SEGMENTS: u32 = 12;
const AVATAR_RINGS: u32 = 8;
const AVATAR_COLOR: [f32; 3] = [0.85, 0.85, 0.85];

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SceneVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 3],
    pub cell_uv: [f32; 2],
}
const _: [(); 44] = [(); std::mem::size_of::<SceneVertex>()];

impl SceneVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x3,
        3 => Float32x2
    ];

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SceneVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SceneMesh {
    pub vertices: Vec<SceneVertex>,
    pub indices: Vec<u32>,
}

impl SceneMesh {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    fn push_vertex(&mut self, position: Vec3, normal: Vec3, color: [f32; 3], cell_uv: [f32; 2]) -> u32 {
        self.vertices.push(SceneVertex {
            position: position.to_array(),
            normal: normal.to_array(),
            color,
            cell_uv,
        });
        (self.vertices.len() - 1) as u32
    }

    /// Corners run counter-clockwise seen from `normal` unless `flip` is set.
    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3, color: [f32; 3], flip: bool) {
        const CELL_UVS: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let base = self.vertices.len() as u32;
        for (corner, uv) in corners.into_iter().zip(CELL_UVS) {
            self.push_vertex(corner, normal, color, uv);
        }
        let order: [u32; 6] = if flip {
            [0, 2, 1, 0, 3, 2]
        } else {
            [0, 1, 2, 0, 2, 3]
        };
        self.indices.extend(order.iter().map(|offset| base + offset));
    }
}

struct FaceLayout {
    normal: Vec3,
    u: Vec3,
    v: Vec3,
}

// u x v == normal, so (0,0) (1,0) (1,1) (0,1) winds counter-clockwise from outside.
const FACE_LAYOUTS: [FaceLayout; 6] = [
    FaceLayout {
        normal: Vec3::X,
        u: Vec3::NEG_Z,
        v: Vec3::Y,
    },
    FaceLayout {
        normal: Vec3::NEG_X,
        u: Vec3::Z,
        v: Vec3::Y,
    },
    FaceLayout {
        normal: Vec3::Y,
        u: Vec3::X,
        v: Vec3::NEG_Z,
    },
    FaceLayout {
        normal: Vec3::NEG_Y,
        u: Vec3::X,
        v: Vec3::Z,
    },
    FaceLayout {
        normal: Vec3::Z,
        u: Vec3::X,
        v: Vec3::Y,
    },
    FaceLayout {
        normal: Vec3::NEG_Z,
        u: Vec3::NEG_X,
        v: Vec3::Y,
    },
];

/// Every box surface as one mesh, tiled into half-unit cells with a noisy hue per cell.
pub fn build_scene_mesh(surfaces: &[Surface], seed: u32) -> SceneMesh {
    let perlin = Perlin::new(seed);
    let mut rng = u64::from(seed) | 1;
    let mut mesh = SceneMesh::default();
    for surface in surfaces {
        append_surface(&mut mesh, surface, &perlin, &mut rng);
    }
    mesh
}

fn append_surface(mesh: &mut SceneMesh, surface: &Surface, perlin: &Perlin, rng: &mut u64) {
    let SurfaceShape::Box { half_extents } = surface.shape else {
        return;
    };
    // Back-sided boxes are rooms: seen from inside, so faces point inwards.
    let inward = surface.side == Side::Back;
    let model = surface.pose.matrix();

    for face in &FACE_LAYOUTS {
        let u_extent = half_extents.dot(face.u.abs());
        let v_extent = half_extents.dot(face.v.abs());
        let depth = half_extents.dot(face.normal.abs());
        let u_cells = cell_count(u_extent * 2.0);
        let v_cells = cell_count(v_extent * 2.0);
        let u_step = u_extent * 2.0 / u_cells as f32;
        let v_step = v_extent * 2.0 / v_cells as f32;
        let center = face.normal * depth;

        let normal = model.transform_vector3(face.normal).normalize_or_zero();
        let normal = if inward { -normal } else { normal };

        for j in 0..v_cells {
            for i in 0..u_cells {
                let u0 = -u_extent + i as f32 * u_step;
                let v0 = -v_extent + j as f32 * v_step;
                let local = |u: f32, v: f32| center + face.u * u + face.v * v;
                let corners = [
                    local(u0, v0),
                    local(u0 + u_step, v0),
                    local(u0 + u_step, v0 + v_step),
                    local(u0, v0 + v_step),
                ]
                .map(|corner| model.transform_point3(corner));

                let color = cell_color(perlin, rng, corners[0]);
                mesh.push_quad(corners, normal, color, inward);
            }
        }
    }
}

fn cell_count(length: f32) -> u32 {
    (length * CELLS_PER_UNIT).ceil().max(1.0) as u32
}

fn cell_color(perlin: &Perlin, rng: &mut u64, position: Vec3) -> [f32; 3] {
    let sample = perlin.get([
        position.x as f64 * HUE_FREQUENCY,
        position.y as f64 * HUE_FREQUENCY,
        position.z as f64 * HUE_FREQUENCY,
    ]) as f32;
    let saturation = 0.4 - unit_random(rng) * 0.1;
    let lightness = 0.4 - unit_random(rng) * 0.1;
    hsl_to_rgb((sample + 0.5).rem_euclid(1.0), saturation, lightness)
}

/// Head and tapered body, eye at the origin, facing -Z.
pub fn build_avatar_mesh() -> SceneMesh {
    let mut mesh = SceneMesh::default();
    append_sphere(&mut mesh, Vec3::ZERO, AVATAR_HEAD_RADIUS);

    let bottom = -AVATAR_EYE_HEIGHT;
    let top = bottom + AVATAR_BODY_HEIGHT;
    append_tapered_cylinder(
        &mut mesh,
        top,
        AVATAR_BODY_TOP_RADIUS,
        bottom,
        AVATAR_BODY_BOTTOM_RADIUS,
    );
    mesh
}

fn append_sphere(mesh: &mut SceneMesh, center: Vec3, radius: f32) {
    let base = mesh.vertices.len() as u32;
    for ring in 0..=AVATAR_RINGS {
        let theta = PI * ring as f32 / AVATAR_RINGS as f32;
        for segment in 0..=AVATAR_SEGMENTS {
            let phi = TAU * segment as f32 / AVATAR_SEGMENTS as f32;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            mesh.push_vertex(center + normal * radius, normal, AVATAR_COLOR, [0.5, 0.5]);
        }
    }

    let stride = AVATAR_SEGMENTS + 1;
    for ring in 0..AVATAR_RINGS {
        for segment in 0..AVATAR_SEGMENTS {
            let a = base + ring * stride + segment;
            let b = a + 1;
            let c = b + stride;
            let d = a + stride;
            mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }
}

fn append_tapered_cylinder(
    mesh: &mut SceneMesh,
    top: f32,
    top_radius: f32,
    bottom: f32,
    bottom_radius: f32,
) {
    let height = top - bottom;
    let ring = |y: f32, radius: f32, phi: f32| Vec3::new(radius * phi.cos(), y, radius * phi.sin());

    let base = mesh.vertices.len() as u32;
    for segment in 0..=AVATAR_SEGMENTS {
        let phi = TAU * segment as f32 / AVATAR_SEGMENTS as f32;
        let normal = Vec3::new(
            height * phi.cos(),
            bottom_radius - top_radius,
            height * phi.sin(),
        )
        .normalize_or_zero();
        mesh.push_vertex(ring(top, top_radius, phi), normal, AVATAR_COLOR, [0.5, 0.5]);
        mesh.push_vertex(ring(bottom, bottom_radius, phi), normal, AVATAR_COLOR, [0.5, 0.5]);
    }
    for segment in 0..AVATAR_SEGMENTS {
        let a = base + segment * 2;
        let d = a + 1;
        let b = a + 2;
        let c = a + 3;
        mesh.indices.extend_from_slice(&[a, b, c, a, c, d]);
    }

    for (y, radius, normal) in [(bottom, bottom_radius, Vec3::NEG_Y), (top, top_radius, Vec3::Y)] {
        let center = mesh.push_vertex(Vec3::new(0.0, y, 0.0), normal, AVATAR_COLOR, [0.5, 0.5]);
        let first = mesh.vertices.len() as u32;
        for segment in 0..=AVATAR_SEGMENTS {
            let phi = TAU * segment as f32 / AVATAR_SEGMENTS as f32;
            mesh.push_vertex(ring(y, radius, phi), normal, AVATAR_COLOR, [0.5, 0.5]);
        }
        for segment in 0..AVATAR_SEGMENTS {
            let current = first + segment;
            let next = current + 1;
            if normal.y < 0.0 {
                mesh.indices.extend_from_slice(&[center, current, next]);
            } else {
                mesh.indices.extend_from_slice(&[center, next, current]);
            }
        }
    }
}

pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [f32; 3] {
    if saturation <= 0.0 {
        return [lightness; 3];
    }

    let q = if lightness < 0.5 {
        lightness * (1.0 + saturation)
    } else {
        lightness + saturation - lightness * saturation
    };
    let p = 2.0 * lightness - q;
    [
        hue_to_channel(p, q, hue + 1.0 / 3.0),
        hue_to_channel(p, q, hue),
        hue_to_channel(p, q, hue - 1.0 / 3.0),
    ]
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

pub(crate) fn simple_rng_next(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

fn unit_random(state: &mut u64) -> f32 {
    (simple_rng_next(state) >> 40) as f32 / (1u64 << 24) as f32
}
