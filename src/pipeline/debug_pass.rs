//! Debug overlays drawn over the finished frame: node bounding boxes and
//! tiles showing shadow maps and G-buffer attachments.

use crate::backend::{ColorAttachment, LoadOp, RenderPassDescriptor, StoreOp, TextureViewHandle};
use crate::renderer::gpu::GBufferViews;
use crate::renderer::RenderContext;
use crate::scene::Aabb;
use crate::shader::{PipelineKey, ShaderKind, TargetLayout};
use glam::Mat4;

pub const OVERLAY_PASS: &str = "overlay";

/// Tiles per row along the bottom edge
const TILES_PER_ROW: u32 = 4;

/// Texture shown in a debug tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugTile {
    pub view: TextureViewHandle,
    pub depth: bool,
}

/// Viewport `(x, y, size)` of tile `index` for a `width` x `height` frame.
/// Rows fill from the bottom-left corner upwards.
pub fn tile_viewport(index: usize, width: u32, height: u32) -> (f32, f32, f32) {
    let size = (width / TILES_PER_ROW).min(height / TILES_PER_ROW).max(1) as f32;
    let column = (index as u32 % TILES_PER_ROW) as f32;
    let row = (index as u32 / TILES_PER_ROW) as f32;
    (column * size, height as f32 - (row + 1.0) * size, size)
}

pub struct DebugOverlay {
    pub show_boundaries: bool,
    pub show_shadowmaps: bool,
    pub show_gbuffers: bool,
}

impl DebugOverlay {
    pub fn is_empty(&self) -> bool {
        !(self.show_boundaries || self.show_shadowmaps || self.show_gbuffers)
    }

    /// Tiles to show this frame, shadow maps first
    pub fn tiles(&self, shadow_maps: &[TextureViewHandle], gbuffer: Option<&GBufferViews>) -> Vec<DebugTile> {
        let mut tiles = Vec::new();
        if self.show_shadowmaps {
            tiles.extend(shadow_maps.iter().map(|&view| DebugTile { view, depth: true }));
        }
        if let Some(gbuffer) = gbuffer.filter(|_| self.show_gbuffers) {
            tiles.extend(gbuffer.color.iter().map(|&view| DebugTile { view, depth: false }));
            tiles.push(DebugTile {
                view: gbuffer.depth,
                depth: true,
            });
        }
        tiles
    }

    pub fn execute(
        &self,
        ctx: &mut RenderContext,
        target: TextureViewHandle,
        bounds: &[Aabb],
        shadow_maps: &[TextureViewHandle],
        gbuffer: Option<&GBufferViews>,
    ) {
        if self.is_empty() {
            return;
        }
        ctx.begin_pass(&RenderPassDescriptor {
            label: Some(OVERLAY_PASS.to_string()),
            color_attachments: vec![ColorAttachment {
                view: target,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
            }],
            depth_stencil_attachment: None,
        });

        if self.show_boundaries {
            self.draw_boundaries(ctx, bounds);
        }
        for (index, tile) in self.tiles(shadow_maps, gbuffer).into_iter().enumerate() {
            draw_tile(ctx, index, tile);
        }

        ctx.end_pass();
    }

    fn draw_boundaries(&self, ctx: &mut RenderContext, bounds: &[Aabb]) {
        if bounds.is_empty() {
            return;
        }
        if !ctx.use_pipeline(PipelineKey::new(ShaderKind::Lines, TargetLayout::SwapchainNoDepth)) {
            ctx.skip_draw("bounds pipeline unavailable");
            return;
        }
        let lines = ctx.gpu.box_lines();
        let material = ctx.gpu.bounds_material();
        for aabb in bounds {
            let model = Mat4::from_translation(aabb.center()) * Mat4::from_scale(aabb.half_extents());
            ctx.draw_mesh(&model, lines, material, None);
        }
    }
}

fn draw_tile(ctx: &mut RenderContext, index: usize, tile: DebugTile) {
    let shader = if tile.depth { ShaderKind::DepthView } else { ShaderKind::TextureView };
    let Some(group) = ctx.gpu.view_bind_group(ctx.backend, tile.view, tile.depth) else {
        return;
    };
    if !ctx.use_pipeline(PipelineKey::new(shader, TargetLayout::SwapchainNoDepth)) {
        ctx.skip_draw("debug view pipeline unavailable");
        return;
    }
    let (x, y, size) = tile_viewport(index, ctx.width, ctx.height);
    ctx.backend.set_viewport(x, y, size, size, 0.0, 1.0);
    ctx.draw_fullscreen(&[group]);
}
