//! Light entities and their GPU layout

use super::bounds::Aabb;
use super::camera::Camera;
use crate::pipeline::DepthTarget;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LightType {
    Point,
    Spot,
    Directional,
}

/// Widest spot shadow frustum in degrees; a cone of 90 degrees or more
/// cannot be captured by one perspective map
pub const MAX_SHADOW_FOV: f32 = 170.0;

/// Depth target rendered from the light, plus the matrix it was rendered with.
/// The target belongs to the renderer that drew it and is released by that
/// renderer once no light refers to it any more.
#[derive(Debug, Clone, Copy)]
pub struct ShadowMap {
    pub target: DepthTarget,
    pub view_projection: Mat4,
}

/// Light carried by a scene entity. Position and direction come from the
/// entity's root node: it sits at the node origin and shines along local -Z.
#[derive(Debug)]
pub struct LightEntity {
    pub light_type: LightType,
    pub color: Vec3,
    pub intensity: f32,
    pub max_distance: f32,
    pub near_distance: f32,
    /// Full-intensity half angle in degrees
    pub cone_inner: f32,
    /// Cut-off half angle in degrees
    pub cone_outer: f32,
    /// Side of the square covered by a directional shadow
    pub area: f32,
    pub cast_shadows: bool,
    pub shadow_bias: f32,
    pub shadow: Option<ShadowMap>,
}

impl Default for LightEntity {
    fn default() -> Self {
        Self {
            light_type: LightType::Point,
            color: Vec3::ONE,
            intensity: 1.0,
            max_distance: 100.0,
            near_distance: 0.1,
            cone_inner: 30.0,
            cone_outer: 40.0,
            area: 1000.0,
            cast_shadows: false,
            shadow_bias: 0.001,
            shadow: None,
        }
    }
}

/// Shadow targets are GPU resources; a cloned light gets its own lazily.
impl Clone for LightEntity {
    fn clone(&self) -> Self {
        Self {
            light_type: self.light_type,
            color: self.color,
            intensity: self.intensity,
            max_distance: self.max_distance,
            near_distance: self.near_distance,
            cone_inner: self.cone_inner,
            cone_outer: self.cone_outer,
            area: self.area,
            cast_shadows: self.cast_shadows,
            shadow_bias: self.shadow_bias,
            shadow: None,
        }
    }
}

impl LightEntity {
    pub fn point(color: Vec3, intensity: f32, max_distance: f32) -> Self {
        Self {
            color,
            intensity,
            max_distance,
            ..Default::default()
        }
    }

    pub fn spot(color: Vec3, intensity: f32, max_distance: f32, cone_inner: f32, cone_outer: f32) -> Self {
        Self {
            light_type: LightType::Spot,
            color,
            intensity,
            max_distance,
            cone_inner,
            cone_outer,
            ..Default::default()
        }
    }

    pub fn directional(color: Vec3, intensity: f32, area: f32) -> Self {
        Self {
            light_type: LightType::Directional,
            color,
            intensity,
            area,
            ..Default::default()
        }
    }

    pub fn with_shadows(mut self, bias: f32) -> Self {
        self.cast_shadows = true;
        self.shadow_bias = bias;
        self
    }

    /// Point lights never get a shadow map
    pub fn wants_shadow_map(&self) -> bool {
        self.cast_shadows && self.light_type != LightType::Point
    }

    /// Whether geometry inside `bounds` can receive light
    pub fn affects(&self, global: &Mat4, bounds: &Aabb) -> bool {
        match self.light_type {
            LightType::Directional => true,
            _ => bounds.distance_to_point(global.w_axis.truncate()) <= self.max_distance,
        }
    }

    /// Camera the shadow map is rendered with
    pub fn shadow_camera(&self, global: &Mat4) -> Camera {
        let position = global.w_axis.truncate();
        let forward = light_forward(global);
        let up = if forward.cross(Vec3::Y).length_squared() < 1e-6 { Vec3::Z } else { Vec3::Y };

        let mut camera = match self.light_type {
            LightType::Directional => {
                let half = self.area * 0.5;
                Camera::orthographic(-half, half, -half, half, self.near_distance, self.max_distance)
            }
            _ => {
                let fov = (2.0 * self.cone_outer).clamp(1.0, MAX_SHADOW_FOV);
                Camera::perspective(fov, 1.0, self.near_distance, self.max_distance)
            }
        };
        camera.look_at(position, position + forward, up);
        camera
    }

    /// Pack for the shaders. `ambient` and `emissive_factor` are only
    /// non-zero on the first lighting pass.
    pub fn gpu_data(&self, global: &Mat4, ambient: Vec3, emissive_factor: f32) -> GpuLightData {
        let direction = light_forward(global);
        let type_code = match self.light_type {
            LightType::Point => 1.0,
            LightType::Spot => 2.0,
            LightType::Directional => 3.0,
        };
        let (has_shadow, shadow_view_proj) = match &self.shadow {
            Some(map) if self.wants_shadow_map() => (1.0, map.view_projection),
            _ => (0.0, Mat4::IDENTITY),
        };
        GpuLightData {
            position_type: global.w_axis.truncate().extend(type_code),
            color_intensity: self.color.extend(self.intensity),
            direction_range: direction.extend(self.max_distance),
            cone_shadow: Vec4::new(
                self.cone_inner.to_radians().cos(),
                self.cone_outer.to_radians().cos(),
                self.shadow_bias,
                has_shadow,
            ),
            ambient: ambient.extend(emissive_factor),
            shadow_view_proj,
        }
    }
}

fn light_forward(global: &Mat4) -> Vec3 {
    let forward = global.transform_vector3(Vec3::NEG_Z).normalize_or_zero();
    if forward == Vec3::ZERO {
        Vec3::NEG_Z
    } else {
        forward
    }
}

/// Light data as laid out in the shaders' `LightUniforms`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuLightData {
    /// xyz = position, w = type (0 none, 1 point, 2 spot, 3 directional)
    pub position_type: Vec4,
    /// xyz = color, w = intensity
    pub color_intensity: Vec4,
    /// xyz = direction, w = max distance
    pub direction_range: Vec4,
    /// x = cos inner, y = cos outer, z = shadow bias, w = has shadow map
    pub cone_shadow: Vec4,
    /// xyz = ambient light, w = emissive factor
    pub ambient: Vec4,
    pub shadow_view_proj: Mat4,
}

impl GpuLightData {
    /// Ambient-only pass with no light contribution
    pub fn ambient_only(ambient: Vec3) -> Self {
        Self {
            position_type: Vec4::ZERO,
            color_intensity: Vec4::ZERO,
            direction_range: Vec4::ZERO,
            cone_shadow: Vec4::ZERO,
            ambient: ambient.extend(1.0),
            shadow_view_proj: Mat4::IDENTITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::FrustumTest;

    #[test]
    fn spot_shadow_camera_follows_node_forward() {
        let light = LightEntity::spot(Vec3::ONE, 1.0, 50.0, 20.0, 30.0);
        let global = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0))
            * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let camera = light.shadow_camera(&global);
        assert!(camera.forward().abs_diff_eq(Vec3::NEG_Y, 1e-5));
        assert_eq!(camera.test_point_in_frustum(Vec3::ZERO), FrustumTest::Inside);
        assert_eq!(camera.test_point_in_frustum(Vec3::new(0.0, 20.0, 0.0)), FrustumTest::Outside);
    }

    #[test]
    fn directional_shadow_covers_area() {
        let light = LightEntity::directional(Vec3::ONE, 1.0, 20.0);
        let camera = light.shadow_camera(&Mat4::IDENTITY);
        assert_eq!(camera.test_point_in_frustum(Vec3::new(9.0, 0.0, -5.0)), FrustumTest::Inside);
        assert_eq!(camera.test_point_in_frustum(Vec3::new(11.0, 0.0, -5.0)), FrustumTest::Outside);
    }

    #[test]
    fn point_light_range_limits_influence() {
        let light = LightEntity::point(Vec3::ONE, 1.0, 5.0);
        let near = Aabb::new(Vec3::new(3.0, -1.0, -1.0), Vec3::new(4.0, 1.0, 1.0));
        let far = Aabb::new(Vec3::new(30.0, -1.0, -1.0), Vec3::new(31.0, 1.0, 1.0));
        assert!(light.affects(&Mat4::IDENTITY, &near));
        assert!(!light.affects(&Mat4::IDENTITY, &far));
        assert!(LightEntity::directional(Vec3::ONE, 1.0, 1.0).affects(&Mat4::IDENTITY, &far));
    }

    #[test]
    fn wide_spot_cone_keeps_a_valid_shadow_projection() {
        let light = LightEntity::spot(Vec3::ONE, 1.0, 50.0, 80.0, 100.0).with_shadows(0.001);
        let camera = light.shadow_camera(&Mat4::IDENTITY);
        let projection = camera.projection_matrix();
        assert!(projection.is_finite());
        assert!(projection.y_axis.y > 0.0);
        assert_eq!(camera.test_point_in_frustum(Vec3::new(0.0, 0.0, -10.0)), FrustumTest::Inside);
    }

    #[test]
    fn point_lights_never_want_shadows() {
        assert!(!LightEntity::point(Vec3::ONE, 1.0, 1.0).with_shadows(0.01).wants_shadow_map());
        assert!(LightEntity::spot(Vec3::ONE, 1.0, 1.0, 10.0, 20.0).with_shadows(0.01).wants_shadow_map());
    }
}
