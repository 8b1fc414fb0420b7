//! Camera: view/projection state, frustum tests and screen mapping

use super::bounds::Ray;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Matrices whose determinant is below this are treated as singular
const SINGULAR_DETERMINANT: f32 = 1e-11;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Vertical field of view in degrees
    Perspective { fov: f32, aspect: f32 },
    Orthographic { left: f32, right: f32, bottom: f32, top: f32 },
}

/// Classification of a volume against the view frustum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrustumTest {
    Outside,
    Overlap,
    Inside,
}

/// Invert `m`, or return identity when it is (numerically) singular
pub fn inverse_or_identity(m: &Mat4) -> Mat4 {
    if m.determinant().abs() < SINGULAR_DETERMINANT {
        Mat4::IDENTITY
    } else {
        m.inverse()
    }
}

/// Frustum planes `(n, w)` with unit `n` and `n . p + w >= 0` inside, in the
/// order left, right, bottom, top, near, far. Assumes a `[0, 1]` depth range.
pub fn frustum_planes(view_projection: &Mat4) -> [Vec4; 6] {
    let r0 = view_projection.row(0);
    let r1 = view_projection.row(1);
    let r2 = view_projection.row(2);
    let r3 = view_projection.row(3);
    [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|plane| {
        let length = plane.truncate().length();
        if length > 0.0 {
            plane / length
        } else {
            plane
        }
    })
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub eye: Vec3,
    pub center: Vec3,
    pub up: Vec3,
    pub projection: Projection,
    pub near: f32,
    pub far: f32,

    view: Mat4,
    projection_matrix: Mat4,
    view_projection: Mat4,
    inverse_view_projection: Mat4,
    frustum: [Vec4; 6],
}

impl Default for Camera {
    fn default() -> Self {
        let mut camera = Self {
            eye: Vec3::new(0.0, 2.0, 5.0),
            center: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::Perspective { fov: 45.0, aspect: 1.0 },
            near: 0.1,
            far: 10000.0,
            view: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            inverse_view_projection: Mat4::IDENTITY,
            frustum: [Vec4::ZERO; 6],
        };
        camera.update_view_matrix();
        camera.update_projection_matrix();
        camera
    }
}

impl Camera {
    pub fn perspective(fov: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self::default();
        camera.set_perspective(fov, aspect, near, far);
        camera
    }

    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        let mut camera = Self::default();
        camera.set_orthographic(left, right, bottom, top, near, far);
        camera
    }

    pub fn set_perspective(&mut self, fov: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Projection::Perspective { fov, aspect };
        self.near = near;
        self.far = far;
        self.update_projection_matrix();
    }

    pub fn set_orthographic(&mut self, left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) {
        self.projection = Projection::Orthographic { left, right, bottom, top };
        self.near = near;
        self.far = far;
        self.update_projection_matrix();
    }

    /// Set the view basis and recompute view-dependent state
    pub fn look_at(&mut self, eye: Vec3, center: Vec3, up: Vec3) {
        self.eye = eye;
        self.center = center;
        self.up = up;
        self.update_view_matrix();
    }

    /// Only affects perspective cameras
    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: current, .. } = &mut self.projection {
            if *current != aspect {
                *current = aspect;
                self.update_projection_matrix();
            }
        }
    }

    /// Recompute the view matrix from `eye`, `center` and `up`
    pub fn update_view_matrix(&mut self) {
        debug_assert!(
            (self.center - self.eye).length_squared() > 0.0,
            "camera eye and center coincide"
        );
        self.view = Mat4::look_at_rh(self.eye, self.center, self.up);
        self.update_view_projection();
    }

    /// Recompute the projection matrix from `projection`, `near` and `far`
    pub fn update_projection_matrix(&mut self) {
        debug_assert!((self.far - self.near).abs() > f32::EPSILON, "camera near equals far");
        self.projection_matrix = match self.projection {
            Projection::Perspective { fov, aspect } => {
                debug_assert!(fov > 0.0 && aspect > 0.0, "degenerate perspective {fov} / {aspect}");
                Mat4::perspective_rh(fov.to_radians(), aspect, self.near, self.far)
            }
            Projection::Orthographic { left, right, bottom, top } => {
                Mat4::orthographic_rh(left, right, bottom, top, self.near, self.far)
            }
        };
        self.update_view_projection();
    }

    fn update_view_projection(&mut self) {
        self.view_projection = self.projection_matrix * self.view;
        self.inverse_view_projection = inverse_or_identity(&self.view_projection);
        self.frustum = frustum_planes(&self.view_projection);
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    pub fn view_projection(&self) -> Mat4 {
        self.view_projection
    }

    pub fn inverse_view_projection(&self) -> Mat4 {
        self.inverse_view_projection
    }

    pub fn frustum(&self) -> &[Vec4; 6] {
        &self.frustum
    }

    pub fn forward(&self) -> Vec3 {
        (self.center - self.eye).normalize_or_zero()
    }

    /// World point to `(x, y, depth)` in pixels. With `flip_y` the origin
    /// is the top-left corner.
    pub fn project(&self, point: Vec3, width: f32, height: f32, flip_y: bool) -> Vec3 {
        let clip = self.view_projection * point.extend(1.0);
        let ndc = clip.truncate() / clip.w;
        let x = (ndc.x * 0.5 + 0.5) * width;
        let y = (ndc.y * 0.5 + 0.5) * height;
        Vec3::new(x, if flip_y { height - y } else { y }, ndc.z)
    }

    /// Inverse of [`Camera::project`]. The homogeneous divide is not
    /// guarded: a point mapping to `w == 0` yields non-finite values.
    pub fn unproject(&self, screen: Vec3, width: f32, height: f32, flip_y: bool) -> Vec3 {
        let y = if flip_y { height - screen.y } else { screen.y };
        let ndc = Vec4::new(screen.x / width * 2.0 - 1.0, y / height * 2.0 - 1.0, screen.z, 1.0);
        let world = self.inverse_view_projection * ndc;
        world.truncate() / world.w
    }

    /// World direction through pixel `(x, y)`, origin top-left
    pub fn get_ray_direction(&self, x: f32, y: f32, width: f32, height: f32) -> Vec3 {
        self.screen_ray(Vec2::new(x, y), width, height).direction
    }

    /// Picking ray from the near plane through pixel `pixel`, origin top-left
    pub fn screen_ray(&self, pixel: Vec2, width: f32, height: f32) -> Ray {
        let near = self.unproject(pixel.extend(0.0), width, height, true);
        let far = self.unproject(pixel.extend(1.0), width, height, true);
        Ray::new(near, far - near)
    }

    pub fn test_point_in_frustum(&self, point: Vec3) -> FrustumTest {
        if self.frustum.iter().any(|p| p.truncate().dot(point) + p.w < 0.0) {
            FrustumTest::Outside
        } else {
            FrustumTest::Inside
        }
    }

    /// Two-state: a sphere crossing a plane still counts as inside
    pub fn test_sphere_in_frustum(&self, center: Vec3, radius: f32) -> FrustumTest {
        if self.frustum.iter().any(|p| p.truncate().dot(center) + p.w <= -radius) {
            FrustumTest::Outside
        } else {
            FrustumTest::Inside
        }
    }

    /// Box given by center and half-size. Touching a plane is never Outside.
    pub fn test_box_in_frustum(&self, center: Vec3, half_size: Vec3) -> FrustumTest {
        let mut overlap = false;
        for plane in &self.frustum {
            let normal = plane.truncate();
            let distance = normal.dot(center) + plane.w;
            let extent = (half_size * normal).abs();
            let radius = extent.x + extent.y + extent.z;
            if distance < -radius {
                return FrustumTest::Outside;
            }
            if distance <= radius {
                overlap = true;
            }
        }
        if overlap {
            FrustumTest::Overlap
        } else {
            FrustumTest::Inside
        }
    }

    pub fn uniform_data(&self, width: u32, height: u32) -> CameraUniformData {
        CameraUniformData {
            view: self.view,
            proj: self.projection_matrix,
            view_proj: self.view_projection,
            inv_view_proj: self.inverse_view_projection,
            position: self.eye.extend(1.0),
            viewport: Vec4::new(width as f32, height as f32, self.near, self.far),
        }
    }
}

/// Camera data as laid out in the shaders' `CameraUniforms`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CameraUniformData {
    pub view: Mat4,
    pub proj: Mat4,
    pub view_proj: Mat4,
    pub inv_view_proj: Mat4,
    pub position: Vec4,
    /// x = width, y = height, z = near, w = far
    pub viewport: Vec4,
}
