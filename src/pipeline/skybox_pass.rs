//! Equirectangular sky drawn behind the scene

use crate::renderer::RenderContext;
use crate::resources::TextureId;
use crate::shader::{PipelineKey, ShaderKind, TargetLayout};

/// Draws into the pass already open on the context, before any geometry.
/// Depth is neither tested nor written.
pub struct SkyboxPass {
    pub texture: TextureId,
}

impl SkyboxPass {
    pub fn execute(&self, ctx: &mut RenderContext) -> bool {
        let Some(camera) = ctx.camera_bind_group() else {
            return false;
        };
        let Some(sky) = ctx.gpu.sky_bind_group(ctx.backend, ctx.registry, self.texture) else {
            ctx.skip_draw("skybox texture not available");
            return false;
        };
        if !ctx.use_pipeline(PipelineKey::new(ShaderKind::Skybox, TargetLayout::Swapchain)) {
            ctx.skip_draw("skybox pipeline unavailable");
            return false;
        }
        ctx.draw_fullscreen(&[camera, sky]);
        true
    }
}
