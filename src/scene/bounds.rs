//! Axis-aligned boxes and rays

use glam::{Mat4, Vec3};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_half_extents(center: Vec3, half_extents: Vec3) -> Self {
        Self {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest box containing every point; `None` for an empty iterator
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self::new(first, first), |b, p| Self::new(b.min.min(p), b.max.max(p))))
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn merge(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn contains_point(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// The eight corners, min first
    pub fn corners(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }

    /// Box enclosing this one after an affine transform.
    ///
    /// Uses the absolute-matrix form so the result is exact for the
    /// transformed corners.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let center = matrix.transform_point3(self.center());
        let half = self.half_extents();
        let extent = Vec3::new(
            matrix.x_axis.x.abs() * half.x + matrix.y_axis.x.abs() * half.y + matrix.z_axis.x.abs() * half.z,
            matrix.x_axis.y.abs() * half.x + matrix.y_axis.y.abs() * half.y + matrix.z_axis.y.abs() * half.z,
            matrix.x_axis.z.abs() * half.x + matrix.y_axis.z.abs() * half.y + matrix.z_axis.z.abs() * half.z,
        );
        Aabb::from_center_half_extents(center, extent)
    }

    /// Distance from `point` to the box surface; zero inside
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        (point.clamp(self.min, self.max) - point).length()
    }

    /// Slab test. Returns the entry distance along the ray (zero when the
    /// origin is inside), or `None` when the box is missed or farther
    /// than `max_distance`.
    pub fn intersect_ray(&self, ray: &Ray, max_distance: f32) -> Option<f32> {
        let mut t_min = 0.0_f32;
        let mut t_max = max_distance;
        for axis in 0..3 {
            let origin = ray.origin[axis];
            let direction = ray.direction[axis];
            if direction.abs() < f32::EPSILON {
                if origin < self.min[axis] || origin > self.max[axis] {
                    return None;
                }
                continue;
            }
            let inv = 1.0 / direction;
            let mut t0 = (self.min[axis] - origin) * inv;
            let mut t1 = (self.max[axis] - origin) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }
        Some(t_min)
    }
}

/// Half-line `origin + t * direction`, `t >= 0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Ray with a normalized direction
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Same ray expressed in another space. The direction is left
    /// unnormalized so `t` keeps meaning distance in the source space.
    pub fn transformed(&self, matrix: &Mat4) -> Ray {
        Ray {
            origin: matrix.transform_point3(self.origin),
            direction: matrix.transform_vector3(self.direction),
        }
    }
}

/// Möller–Trumbore; returns `t` for hits in front of the origin
pub fn intersect_triangle(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPSILON: f32 = 1e-7;
    let edge1 = b - a;
    let edge2 = c - a;
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    (t > EPSILON).then_some(t)
}

/// World-space ray intersection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub position: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn transformed_box_covers_rotated_corners() {
        let unit = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE);
        let rotated = unit.transformed(&Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4));
        let expected = 2.0_f32.sqrt();
        assert!((rotated.max.x - expected).abs() < 1e-5);
        assert!((rotated.max.y - 1.0).abs() < 1e-5);
        for corner in unit.corners() {
            let p = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4).transform_point3(corner);
            assert!(p.cmpge(rotated.min - 1e-5).all() && p.cmple(rotated.max + 1e-5).all());
        }
    }

    #[rstest]
    #[case::hit(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z, Some(9.0))]
    #[case::miss(Vec3::new(5.0, 0.0, 10.0), Vec3::NEG_Z, None)]
    #[case::behind(Vec3::new(0.0, 0.0, 10.0), Vec3::Z, None)]
    #[case::inside(Vec3::ZERO, Vec3::X, Some(0.0))]
    fn slab_test(#[case] origin: Vec3, #[case] direction: Vec3, #[case] expected: Option<f32>) {
        let unit = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE);
        let hit = unit.intersect_ray(&Ray::new(origin, direction), 100.0);
        match (hit, expected) {
            (Some(t), Some(e)) => assert!((t - e).abs() < 1e-5),
            (None, None) => {}
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn slab_test_respects_max_distance() {
        let unit = Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE);
        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::NEG_Z);
        assert!(unit.intersect_ray(&ray, 5.0).is_none());
    }

    #[test]
    fn triangle_hit_distance() {
        let ray = Ray::new(Vec3::new(0.25, 0.25, 5.0), Vec3::NEG_Z);
        let t = intersect_triangle(&ray, Vec3::ZERO, Vec3::X, Vec3::Y).unwrap();
        assert!((t - 5.0).abs() < 1e-5);
        let miss = Ray::new(Vec3::new(2.0, 2.0, 5.0), Vec3::NEG_Z);
        assert!(intersect_triangle(&miss, Vec3::ZERO, Vec3::X, Vec3::Y).is_none());
    }

    #[test]
    fn from_points_handles_empty_input() {
        assert!(Aabb::from_points(std::iter::empty()).is_none());
        let b = Aabb::from_points([Vec3::new(1.0, -2.0, 0.0), Vec3::new(-1.0, 3.0, 2.0)]).unwrap();
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 3.0, 2.0));
    }
}
