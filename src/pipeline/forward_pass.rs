//! Forward main pass and the per-node shading shared with the shadow and
//! G-buffer passes

use super::skybox_pass::SkyboxPass;
use super::visibility::{walk_scene, ActiveLight, RenderCall};
use crate::backend::{BindGroupHandle, ColorAttachment, DepthStencilAttachment, LoadOp, RenderPassDescriptor, StoreOp, TextureViewHandle};
use crate::config::RenderMode;
use crate::renderer::gpu::GpuMesh;
use crate::renderer::RenderContext;
use crate::resources::TextureId;
use crate::scene::{Aabb, GpuLightData, Scene};
use crate::shader::{BlendMode, DepthMode, PipelineKey, ShaderKind, TargetLayout};
use glam::Vec3;

pub const MAIN_PASS: &str = "main";

/// Mesh shader used for `mode`
pub fn mesh_shader(mode: RenderMode) -> ShaderKind {
    match mode {
        RenderMode::Flat => ShaderKind::Flat,
        RenderMode::Textured => ShaderKind::Textured,
        RenderMode::Lights => ShaderKind::Lights,
        RenderMode::Deferred => ShaderKind::GBuffer,
    }
}

/// Issue the draws for one node in `mode`.
///
/// In LIGHTS mode the first affecting light is drawn together with the
/// ambient and emissive terms; every further light adds an additive pass
/// with those terms zeroed. A node no light reaches gets a single ambient
/// pass. Returns whether anything was drawn.
pub fn draw_call(
    ctx: &mut RenderContext,
    mode: RenderMode,
    targets: TargetLayout,
    ambient: Vec3,
    lights: &[ActiveLight],
    call: &RenderCall,
) -> bool {
    let registry = ctx.registry;
    let Some(mesh) = ctx.gpu.mesh(ctx.backend, registry, call.mesh) else {
        ctx.skip_draw("mesh not available");
        return false;
    };
    let material = call.material.and_then(|id| registry.material(id));
    let blended = material.is_some_and(|m| m.is_blended());
    if blended && targets == TargetLayout::GBuffer {
        return false;
    }

    let material_group = ctx.gpu.material_bind_group(ctx.backend, registry, call.material);
    let shadow_pass = targets == TargetLayout::DepthOnly;
    let key = PipelineKey::new(mesh_shader(mode), targets)
        .with_blend(if blended && !shadow_pass { BlendMode::Alpha } else { BlendMode::Opaque })
        .with_two_sided(material.is_some_and(|m| m.two_sided))
        .with_wireframe(ctx.wireframe && !shadow_pass);

    if mode != RenderMode::Lights || shadow_pass {
        if !ctx.use_pipeline(key) {
            ctx.skip_draw("pipeline unavailable");
            return false;
        }
        return ctx.draw_mesh(&call.model, mesh, material_group, None);
    }

    let affecting: Vec<&ActiveLight> = call.lights.iter().filter_map(|&i| lights.get(i)).collect();
    if affecting.is_empty() {
        let data = GpuLightData::ambient_only(ambient);
        return lit_draw(ctx, key, call, mesh, material_group, &data, None);
    }

    let mut drawn = false;
    for (i, light) in affecting.iter().enumerate() {
        let (key, data) = if i == 0 {
            (key, light.gpu_data(ambient, 1.0))
        } else {
            (
                key.with_blend(BlendMode::Additive).with_depth(DepthMode::TestOnly),
                light.gpu_data(Vec3::ZERO, 0.0),
            )
        };
        drawn |= lit_draw(ctx, key, call, mesh, material_group, &data, light.shadow_view());
    }
    drawn
}

fn lit_draw(
    ctx: &mut RenderContext,
    key: PipelineKey,
    call: &RenderCall,
    mesh: GpuMesh,
    material: BindGroupHandle,
    light: &GpuLightData,
    shadow: Option<TextureViewHandle>,
) -> bool {
    if !ctx.use_pipeline(key) {
        ctx.skip_draw("pipeline unavailable");
        return false;
    }
    let light_group = match ctx.gpu.light_bind_group(ctx.backend, light, shadow) {
        Ok(group) => group,
        Err(e) => {
            log::warn!("Failed to upload light: {e}");
            ctx.skip_draw("light not bound");
            return false;
        }
    };
    let drawn = ctx.draw_mesh(&call.model, mesh, material, Some(light_group));
    if drawn {
        ctx.stats.light_passes += 1;
    }
    drawn
}

/// Main pass of the FLAT, TEXTURED and LIGHTS modes: clear, skybox, then
/// every node that survives culling
pub struct ForwardPass<'a> {
    pub scene: &'a Scene,
    pub lights: &'a [ActiveLight],
    pub mode: RenderMode,
    pub skybox: Option<TextureId>,
    pub clear_background: bool,
}

impl ForwardPass<'_> {
    /// Render into `target`. Returns the world boxes of the drawn nodes.
    pub fn execute(&self, ctx: &mut RenderContext, target: TextureViewHandle) -> Vec<Aabb> {
        let depth = match ctx.gpu.depth_target(ctx.backend, ctx.width, ctx.height) {
            Ok(depth) => depth,
            Err(e) => {
                log::error!("Failed to create depth buffer: {e}");
                return Vec::new();
            }
        };
        let load_op = if self.clear_background {
            LoadOp::Clear(self.scene.background_color.extend(1.0).to_array())
        } else {
            LoadOp::Load
        };

        ctx.begin_pass(&RenderPassDescriptor {
            label: Some(MAIN_PASS.to_string()),
            color_attachments: vec![ColorAttachment {
                view: target,
                load_op,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: Some(DepthStencilAttachment::cleared(depth)),
        });

        if let Some(sky) = self.skybox.filter(|_| self.mode != RenderMode::Flat) {
            SkyboxPass { texture: sky }.execute(ctx);
        }

        let mut drawn = Vec::new();
        let primary = PipelineKey::new(mesh_shader(self.mode), TargetLayout::Swapchain).with_wireframe(ctx.wireframe);
        let camera = ctx.camera().cloned();
        if let Some(camera) = camera {
            if ctx.use_pipeline(primary) {
                let registry = ctx.registry;
                let ambient = self.scene.ambient_light;
                let stats = walk_scene(self.scene, registry, &camera, self.lights, &mut |call| {
                    if draw_call(ctx, self.mode, TargetLayout::Swapchain, ambient, self.lights, &call) {
                        drawn.push(call.bounds);
                    }
                });
                ctx.stats.culled_nodes += stats.culled;
            } else {
                log::warn!("Render mode {:?} is unavailable this frame", self.mode);
            }
        } else {
            log::warn!("Main pass without a camera");
        }

        ctx.end_pass();
        drawn
    }
}
