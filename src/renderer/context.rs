//! Per-frame state shared by the render passes

use super::gpu::{GpuMesh, GpuState};
use super::FrameStats;
use crate::backend::{BindGroupHandle, GraphicsBackend, IndexFormat, RenderPassDescriptor, RenderPipelineHandle};
use crate::pipeline::ObjectUniformData;
use crate::resources::ResourceRegistry;
use crate::scene::Camera;
use crate::shader::{PipelineKey, ShaderLibrary};
use glam::Mat4;

/// Everything a pass needs to record draws: the backend, resource tables,
/// the enabled camera and the size of the target being rendered.
pub struct RenderContext<'a> {
    pub backend: &'a mut dyn GraphicsBackend,
    pub registry: &'a ResourceRegistry,
    pub gpu: &'a mut GpuState,
    pub shaders: &'a mut ShaderLibrary,
    pub stats: &'a mut FrameStats,
    pub width: u32,
    pub height: u32,
    pub wireframe: bool,
    camera: Option<Camera>,
    camera_bind_group: Option<BindGroupHandle>,
    active_pipeline: Option<RenderPipelineHandle>,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        backend: &'a mut dyn GraphicsBackend,
        registry: &'a ResourceRegistry,
        gpu: &'a mut GpuState,
        shaders: &'a mut ShaderLibrary,
        stats: &'a mut FrameStats,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            backend,
            registry,
            gpu,
            shaders,
            stats,
            width,
            height,
            wireframe: false,
            camera: None,
            camera_bind_group: None,
            active_pipeline: None,
        }
    }

    /// Make `camera` the one later draws are seen through. Its uniform is
    /// built for the current target size.
    pub fn enable_camera(&mut self, camera: &Camera) -> bool {
        let data = camera.uniform_data(self.width, self.height);
        match self.gpu.camera_bind_group(self.backend, &data) {
            Ok(bind_group) => {
                self.camera = Some(camera.clone());
                self.camera_bind_group = Some(bind_group);
                true
            }
            Err(e) => {
                log::warn!("Failed to upload camera: {e}");
                self.camera = None;
                self.camera_bind_group = None;
                false
            }
        }
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    pub fn camera_bind_group(&self) -> Option<BindGroupHandle> {
        self.camera_bind_group
    }

    /// Render into a target of another size until restored
    pub fn set_target_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    pub fn begin_pass(&mut self, desc: &RenderPassDescriptor) {
        log::debug!("Begin pass {}", desc.label.as_deref().unwrap_or("unnamed"));
        self.backend.begin_render_pass(desc);
        self.backend
            .set_viewport(0.0, 0.0, self.width as f32, self.height as f32, 0.0, 1.0);
        self.active_pipeline = None;
    }

    pub fn end_pass(&mut self) {
        self.backend.end_render_pass();
        self.active_pipeline = None;
    }

    /// Bind the pipeline for `key`. False when the variant is unavailable.
    pub fn use_pipeline(&mut self, key: PipelineKey) -> bool {
        let Some(pipeline) = self.shaders.pipeline(self.backend, &self.gpu.layouts, key) else {
            return false;
        };
        if self.active_pipeline != Some(pipeline) {
            self.backend.set_render_pipeline(pipeline);
            self.active_pipeline = Some(pipeline);
        }
        true
    }

    /// Count a draw that could not be issued
    pub fn skip_draw(&mut self, reason: &str) {
        self.stats.skipped_draws += 1;
        log::trace!("Skipped draw: {reason}");
    }

    /// Indexed draw of `mesh` with the enabled camera at group 0, the
    /// object transform at group 1 and the material at group 2. `light`
    /// goes to group 3 for lit variants.
    pub fn draw_mesh(&mut self, model: &Mat4, mesh: GpuMesh, material: BindGroupHandle, light: Option<BindGroupHandle>) -> bool {
        let Some(camera) = self.camera_bind_group else {
            self.skip_draw("no camera enabled");
            return false;
        };
        let object = match self.gpu.object_bind_group(self.backend, &ObjectUniformData::new(*model)) {
            Ok(object) => object,
            Err(e) => {
                log::warn!("Failed to upload object transform: {e}");
                self.stats.skipped_draws += 1;
                return false;
            }
        };

        self.backend.set_bind_group(0, camera);
        self.backend.set_bind_group(1, object);
        self.backend.set_bind_group(2, material);
        if let Some(light) = light {
            self.backend.set_bind_group(3, light);
        }
        self.backend.set_vertex_buffer(0, mesh.vertex_buffer, 0);
        self.backend.set_index_buffer(mesh.index_buffer, 0, IndexFormat::Uint32);
        self.backend.draw_indexed(0..mesh.index_count, 0, 0..1);
        self.stats.draw_calls += 1;
        true
    }

    /// Full-screen triangle with `groups` bound in order from group 0
    pub fn draw_fullscreen(&mut self, groups: &[BindGroupHandle]) {
        for (index, group) in groups.iter().enumerate() {
            self.backend.set_bind_group(index as u32, *group);
        }
        self.backend.draw(0..3, 0..1);
        self.stats.draw_calls += 1;
    }
}
