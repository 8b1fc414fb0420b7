//! Deferred lighting pass
//!
//! Composites the G-buffer into the frame with full-screen triangles: one
//! ambient + emissive draw, then one additive draw per light. Pixels no
//! geometry covered keep the background colour.

use super::visibility::ActiveLight;
use crate::backend::{BindGroupHandle, ColorAttachment, LoadOp, RenderPassDescriptor, StoreOp, TextureViewHandle};
use crate::renderer::gpu::GBufferViews;
use crate::renderer::RenderContext;
use crate::scene::GpuLightData;
use crate::shader::{BlendMode, PipelineKey, ShaderKind, TargetLayout};
use glam::Vec3;

pub const COMPOSITE_PASS: &str = "composite";

pub struct LightingPass<'a> {
    pub lights: &'a [ActiveLight],
    pub ambient: Vec3,
    pub background: Vec3,
    pub clear_background: bool,
}

impl LightingPass<'_> {
    pub fn execute(&self, ctx: &mut RenderContext, target: TextureViewHandle, gbuffer: &GBufferViews) {
        let Some(camera) = ctx.camera_bind_group() else {
            log::warn!("Deferred composite without a camera");
            return;
        };
        let load_op = if self.clear_background {
            LoadOp::Clear(self.background.extend(1.0).to_array())
        } else {
            LoadOp::Load
        };
        ctx.begin_pass(&RenderPassDescriptor {
            label: Some(COMPOSITE_PASS.to_string()),
            color_attachments: vec![ColorAttachment {
                view: target,
                load_op,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });

        let ambient = PipelineKey::new(ShaderKind::DeferredAmbient, TargetLayout::SwapchainNoDepth);
        if ctx.use_pipeline(ambient) {
            self.draw_light(ctx, camera, gbuffer, &GpuLightData::ambient_only(self.ambient), None);
        } else {
            ctx.skip_draw("deferred ambient unavailable");
        }

        let additive =
            PipelineKey::new(ShaderKind::DeferredLight, TargetLayout::SwapchainNoDepth).with_blend(BlendMode::Additive);
        for light in self.lights {
            if !ctx.use_pipeline(additive) {
                ctx.skip_draw("deferred light unavailable");
                continue;
            }
            let data = light.gpu_data(Vec3::ZERO, 0.0);
            if self.draw_light(ctx, camera, gbuffer, &data, light.shadow_view()) {
                ctx.stats.light_passes += 1;
            }
        }

        ctx.end_pass();
    }

    fn draw_light(
        &self,
        ctx: &mut RenderContext,
        camera: BindGroupHandle,
        gbuffer: &GBufferViews,
        light: &GpuLightData,
        shadow: Option<TextureViewHandle>,
    ) -> bool {
        match ctx.gpu.light_bind_group(ctx.backend, light, shadow) {
            Ok(group) => {
                ctx.draw_fullscreen(&[camera, gbuffer.bind_group, group]);
                true
            }
            Err(e) => {
                log::warn!("Failed to upload light: {e}");
                ctx.skip_draw("light not bound");
                false
            }
        }
    }
}
