//! Shadow map generation
//!
//! Each shadow-casting spot or directional light renders the scene's depth
//! from its own camera into a square depth target owned by the light.

use super::forward_pass::draw_call;
use super::targets::DepthTarget;
use super::visibility::{walk_scene, ActiveLight};
use crate::backend::{DepthStencilAttachment, RenderPassDescriptor};
use crate::config::RenderMode;
use crate::renderer::RenderContext;
use crate::scene::{LightEntity, LightType, Scene};
use crate::shader::TargetLayout;
use glam::Mat4;

/// Edge length of the shadow map for `light`, at most `max_dimension`
pub fn shadow_map_size(light: &LightEntity, spot_size: u32, directional_size: u32, max_dimension: u32) -> u32 {
    let wanted = match light.light_type {
        LightType::Directional => directional_size,
        _ => spot_size,
    };
    if wanted > max_dimension {
        log::warn!("Shadow map size {wanted} exceeds the device limit, clamping to {max_dimension}");
        max_dimension
    } else {
        wanted.max(1)
    }
}

pub fn shadow_pass_label(light_name: &str) -> String {
    format!("shadow:{light_name}")
}

pub struct ShadowPass<'a> {
    pub scene: &'a Scene,
    /// Mode the casters are drawn in; the renderer forces FLAT
    pub mode: RenderMode,
}

impl ShadowPass<'_> {
    /// Render depth as seen from `light` into `target` and return the
    /// view-projection it was rendered with
    pub fn execute(&self, ctx: &mut RenderContext, light: &ActiveLight, name: &str, target: &DepthTarget) -> Mat4 {
        let camera = light.light.shadow_camera(&light.global);
        let view_projection = camera.view_projection();

        let (width, height) = (ctx.width, ctx.height);
        ctx.set_target_size(target.width, target.height);
        if ctx.enable_camera(&camera) {
            ctx.begin_pass(&RenderPassDescriptor {
                label: Some(shadow_pass_label(name)),
                color_attachments: Vec::new(),
                depth_stencil_attachment: Some(DepthStencilAttachment::cleared(target.view)),
            });

            let registry = ctx.registry;
            let ambient = self.scene.ambient_light;
            let stats = walk_scene(self.scene, registry, &camera, &[], &mut |call| {
                draw_call(ctx, self.mode, TargetLayout::DepthOnly, ambient, &[], &call);
            });
            log::debug!("Shadow map {name}: {} casters, {} culled", stats.visited - stats.culled, stats.culled);

            ctx.end_pass();
            ctx.stats.shadow_maps_rendered += 1;
        }
        ctx.set_target_size(width, height);
        view_projection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_shadow_size_is_clamped_to_device_limit() {
        let sun = LightEntity::directional(Vec3::ONE, 1.0, 100.0);
        let spot = LightEntity::spot(Vec3::ONE, 1.0, 10.0, 20.0, 30.0);
        assert_eq!(shadow_map_size(&sun, 1024, 15000, 8192), 8192);
        assert_eq!(shadow_map_size(&spot, 1024, 15000, 8192), 1024);
    }
}
