//! G-buffer generation pass for deferred rendering
//!
//! Renders geometry to three colour targets plus depth:
//! - Albedo with occlusion in alpha
//! - World-space normals (encoded)
//! - Emissive colour
//!
//! Alpha-blended materials have no place in the G-buffer and are skipped.

use super::forward_pass::draw_call;
use super::visibility::{walk_scene, ActiveLight};
use crate::backend::{ColorAttachment, DepthStencilAttachment, LoadOp, RenderPassDescriptor, StoreOp};
use crate::config::RenderMode;
use crate::renderer::gpu::GBufferViews;
use crate::renderer::RenderContext;
use crate::scene::{Aabb, Scene};
use crate::shader::{PipelineKey, ShaderKind, TargetLayout};

pub const GBUFFER_PASS: &str = "gbuffer";

pub struct GBufferPass<'a> {
    pub scene: &'a Scene,
    pub lights: &'a [ActiveLight],
}

impl GBufferPass<'_> {
    /// Fill the G-buffer for the context's target size. Returns its views
    /// and the world boxes of the drawn nodes; `None` when the G-buffer
    /// could not be created or the variant is unavailable.
    pub fn execute(&self, ctx: &mut RenderContext) -> Option<(GBufferViews, Vec<Aabb>)> {
        let gbuffer = match ctx.gpu.gbuffer(ctx.backend, ctx.width, ctx.height) {
            Ok(gbuffer) => gbuffer,
            Err(e) => {
                log::error!("Failed to create G-buffer: {e}");
                return None;
            }
        };
        let camera = ctx.camera().cloned()?;

        ctx.begin_pass(&RenderPassDescriptor {
            label: Some(GBUFFER_PASS.to_string()),
            color_attachments: gbuffer
                .color
                .iter()
                .map(|&view| ColorAttachment {
                    view,
                    load_op: LoadOp::Clear([0.0; 4]),
                    store_op: StoreOp::Store,
                })
                .collect(),
            depth_stencil_attachment: Some(DepthStencilAttachment::cleared(gbuffer.depth)),
        });

        let key = PipelineKey::new(ShaderKind::GBuffer, TargetLayout::GBuffer).with_wireframe(ctx.wireframe);
        if !ctx.use_pipeline(key) {
            log::warn!("Deferred rendering is unavailable this frame");
            ctx.end_pass();
            return None;
        }

        let mut drawn = Vec::new();
        let registry = ctx.registry;
        let ambient = self.scene.ambient_light;
        let stats = walk_scene(self.scene, registry, &camera, self.lights, &mut |call| {
            if draw_call(ctx, RenderMode::Deferred, TargetLayout::GBuffer, ambient, self.lights, &call) {
                drawn.push(call.bounds);
            }
        });
        ctx.stats.culled_nodes += stats.culled;
        ctx.end_pass();

        Some((gbuffer, drawn))
    }
}
