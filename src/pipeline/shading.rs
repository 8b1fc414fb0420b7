//! CPU evaluation of the lighting model in `shaders/lighting.wgsl`.
//!
//! Mirrors the shader term by term so a frame's expected colour at a
//! surface point can be computed without reading back GPU memory. Shadow
//! lookups are not evaluated; every point counts as lit.

use crate::scene::GpuLightData;
use glam::Vec3;

/// Surface attributes at one shaded point
#[derive(Debug, Clone, Copy)]
pub struct SurfacePoint {
    pub position: Vec3,
    pub normal: Vec3,
    pub albedo: Vec3,
    pub emissive: Vec3,
    pub occlusion: f32,
}

impl SurfacePoint {
    pub fn new(position: Vec3, normal: Vec3, albedo: Vec3) -> Self {
        Self {
            position,
            normal: normal.normalize_or_zero(),
            albedo,
            emissive: Vec3::ZERO,
            occlusion: 1.0,
        }
    }
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Diffuse contribution of one light, without ambient or emissive terms
pub fn light_contribution(light: &GpuLightData, point: &SurfacePoint) -> Vec3 {
    let light_type = light.position_type.w;
    if light_type < 0.5 {
        return Vec3::ZERO;
    }

    let direction = light.direction_range.truncate().normalize_or_zero();
    let mut to_light = -direction;
    let mut attenuation = 1.0;
    if light_type < 2.5 {
        let offset = light.position_type.truncate() - point.position;
        let dist = offset.length();
        to_light = offset / dist.max(1e-6);
        let falloff = (1.0 - dist / light.direction_range.w.max(1e-6)).clamp(0.0, 1.0);
        attenuation = falloff * falloff;
        if light_type > 1.5 {
            let cos_angle = (-to_light).dot(direction);
            attenuation *= smoothstep(light.cone_shadow.y, light.cone_shadow.x, cos_angle);
        }
    }

    let n_dot_l = point.normal.dot(to_light).max(0.0);
    point.albedo * light.color_intensity.truncate() * light.color_intensity.w * n_dot_l * attenuation
}

/// Colour one forward lighting pass writes (before blending)
pub fn pass_color(light: &GpuLightData, point: &SurfacePoint) -> Vec3 {
    light.ambient.truncate() * point.albedo * point.occlusion
        + point.emissive * light.ambient.w
        + light_contribution(light, point)
}

/// Sum of every pass, as accumulated by additive blending of opaque surfaces
pub fn accumulate(passes: &[GpuLightData], point: &SurfacePoint) -> Vec3 {
    passes.iter().map(|light| pass_color(light, point)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::LightEntity;
    use glam::Mat4;

    fn gray_floor() -> SurfacePoint {
        SurfacePoint::new(Vec3::ZERO, Vec3::Y, Vec3::splat(0.5))
    }

    #[test]
    fn test_directional_light_is_bounded_by_ambient_plus_diffuse() {
        let ambient = Vec3::splat(0.1);
        let light = LightEntity::directional(Vec3::ONE, 1.0, 100.0);
        // Shine straight down
        let global = Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let data = light.gpu_data(&global, ambient, 1.0);

        let point = gray_floor();
        let color = pass_color(&data, &point);
        let lower = ambient * point.albedo;
        let upper = ambient + Vec3::ONE;
        assert!(color.cmpge(lower).all());
        assert!(color.cmple(upper).all());
        assert!((color - Vec3::splat(0.55)).length() < 1e-5);
    }

    #[test]
    fn test_additive_passes_do_not_repeat_ambient() {
        let ambient = Vec3::splat(0.2);
        let global = Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let light = LightEntity::directional(Vec3::ONE, 0.5, 100.0);
        let base = light.gpu_data(&global, ambient, 1.0);
        let additive = light.gpu_data(&global, Vec3::ZERO, 0.0);

        let point = gray_floor();
        let two = accumulate(&[base, additive], &point);
        let one = accumulate(&[base], &point);
        assert!((two - one - light_contribution(&additive, &point)).length() < 1e-6);
    }

    #[test]
    fn test_point_light_fades_to_zero_at_range() {
        let light = LightEntity::point(Vec3::ONE, 1.0, 4.0);
        let global = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
        let data = light.gpu_data(&global, Vec3::ZERO, 0.0);

        let lit = light_contribution(&data, &gray_floor());
        let far = SurfacePoint::new(Vec3::new(0.0, -3.0, 0.0), Vec3::Y, Vec3::ONE);
        assert!(lit.x > 0.0);
        assert_eq!(light_contribution(&data, &far), Vec3::ZERO);
    }

    #[test]
    fn test_spot_cone_cuts_off_outside_angle() {
        let light = LightEntity::spot(Vec3::ONE, 1.0, 50.0, 10.0, 20.0);
        let global = Mat4::from_translation(Vec3::new(0.0, 10.0, 0.0)) * Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let data = light.gpu_data(&global, Vec3::ZERO, 0.0);

        let below = gray_floor();
        let aside = SurfacePoint::new(Vec3::new(10.0, 0.0, 0.0), Vec3::Y, Vec3::splat(0.5));
        assert!(light_contribution(&data, &below).x > 0.0);
        assert_eq!(light_contribution(&data, &aside), Vec3::ZERO);
    }
}
