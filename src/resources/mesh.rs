//! CPU-side geometry

use crate::backend::types::Vertex;
use crate::scene::{intersect_triangle, Aabb, Ray};
use glam::{Vec2, Vec3, Vec4};

/// Indexed triangle list (or line list, see [`Mesh::box_lines`]) with
/// its local bounding box.
///
/// `bounds` is computed by the constructors; after editing `vertices`
/// directly call [`Mesh::recompute_bounds`].
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub bounds: Aabb,
}

impl Mesh {
    pub fn from_geometry(name: &str, vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        let mut mesh = Self {
            name: name.to_string(),
            vertices,
            indices,
            bounds: Aabb::new(Vec3::ZERO, Vec3::ZERO),
        };
        mesh.recompute_bounds();
        mesh
    }

    pub fn recompute_bounds(&mut self) {
        self.bounds = Aabb::from_points(self.vertices.iter().map(|v| v.position))
            .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Closest triangle hit closer than `max_distance`, as `(t, face normal)`
    /// in the ray's space.
    pub fn intersect_ray(&self, ray: &Ray, max_distance: f32) -> Option<(f32, Vec3)> {
        self.bounds.intersect_ray(ray, max_distance)?;
        let mut closest: Option<(f32, Vec3)> = None;
        for triangle in self.indices.chunks_exact(3) {
            let corner = |i: u32| self.vertices.get(i as usize).map(|v| v.position);
            let (Some(a), Some(b), Some(c)) = (corner(triangle[0]), corner(triangle[1]), corner(triangle[2])) else {
                continue;
            };
            let Some(t) = intersect_triangle(ray, a, b, c) else {
                continue;
            };
            let limit = closest.map_or(max_distance, |(best, _)| best);
            if t < limit {
                closest = Some((t, (b - a).cross(c - a).normalize_or_zero()));
            }
        }
        closest
    }

    /// Axis-aligned box centered at the origin
    pub fn box_mesh(name: &str, half_extents: Vec3) -> Self {
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        // Each face: outward normal plus the two in-plane axes (u, v) with u x v = normal
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];

        for (normal, u, v) in faces {
            let base = vertices.len() as u32;
            for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = (normal + u * su + v * sv) * half_extents;
                let uv = Vec2::new((su + 1.0) * 0.5, (1.0 - sv) * 0.5);
                vertices.push(Vertex { position, normal, uv, tangent: u.extend(1.0) });
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::from_geometry(name, vertices, indices)
    }

    /// Unit cube spanning `[-0.5, 0.5]`
    pub fn cube() -> Self {
        Self::box_mesh("cube", Vec3::splat(0.5))
    }

    /// The twelve edges of the `[-1, 1]` cube as a line list
    pub fn box_lines() -> Self {
        let corners = Aabb::new(Vec3::NEG_ONE, Vec3::ONE).corners();
        let vertices = corners
            .iter()
            .map(|&position| Vertex {
                position,
                normal: Vec3::Y,
                uv: Vec2::ZERO,
                tangent: Vec4::new(1.0, 0.0, 0.0, 1.0),
            })
            .collect();
        // Corner index bit 0 = x, bit 1 = y, bit 2 = z
        let indices = vec![
            0, 1, 2, 3, 4, 5, 6, 7, // along x
            0, 2, 1, 3, 4, 6, 5, 7, // along y
            0, 4, 1, 5, 2, 6, 3, 7, // along z
        ];
        Self::from_geometry("box_lines", vertices, indices)
    }

    /// UV sphere of the given radius
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);

        for ring in 0..=rings {
            let phi = ring as f32 / rings as f32 * std::f32::consts::PI;
            for segment in 0..=segments {
                let theta = segment as f32 / segments as f32 * std::f32::consts::TAU;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                vertices.push(Vertex {
                    position: normal * radius,
                    normal,
                    uv: Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32),
                    tangent: Vec4::new(-theta.sin(), 0.0, theta.cos(), 1.0),
                });
            }
        }

        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
        for ring in 0..rings {
            for segment in 0..segments {
                let current = ring * (segments + 1) + segment;
                let next = current + segments + 1;
                indices.extend_from_slice(&[current, current + 1, next, current + 1, next + 1, next]);
            }
        }

        Self::from_geometry("sphere", vertices, indices)
    }

    /// Flat grid in the XZ plane facing +Y
    pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Self {
        let subdivisions = subdivisions.max(1);
        let steps = subdivisions as f32;
        let mut vertices = Vec::new();
        for z in 0..=subdivisions {
            for x in 0..=subdivisions {
                let uv = Vec2::new(x as f32 / steps, z as f32 / steps);
                let position = Vec3::new((uv.x - 0.5) * width, 0.0, (uv.y - 0.5) * depth);
                vertices.push(Vertex::new(position, Vec3::Y, uv));
            }
        }

        let mut indices = Vec::new();
        for z in 0..subdivisions {
            for x in 0..subdivisions {
                let current = z * (subdivisions + 1) + x;
                let next = current + subdivisions + 1;
                indices.extend_from_slice(&[current, next, current + 1, current + 1, next, next + 1]);
            }
        }

        Self::from_geometry("plane", vertices, indices)
    }
}
