//! Headless backend that records every call instead of touching a GPU.
//!
//! Used by tests, benchmarks and the headless demo: handles are real,
//! buffer writes are retained, and each render pass becomes a
//! [`RecordedPass`] that can be inspected after the frame.

use crate::backend::traits::*;
use crate::backend::types::*;
use std::collections::HashMap;
use std::ops::Range;

/// One command recorded inside a render pass
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    SetPipeline(RenderPipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle },
    SetIndexBuffer { buffer: BufferHandle, format: IndexFormat },
    SetViewport { x: f32, y: f32, width: f32, height: f32 },
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, base_vertex: i32, instances: Range<u32> },
}

#[derive(Debug, Clone)]
pub struct RecordedPass {
    pub label: Option<String>,
    pub color_targets: Vec<TextureViewHandle>,
    pub clear_color: Option<[f32; 4]>,
    pub depth_target: Option<TextureViewHandle>,
    pub commands: Vec<RecordedCommand>,
}

impl RecordedPass {
    /// Number of draw and indexed draw calls
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. }))
            .count()
    }

    /// Pipelines bound in this pass, in order
    pub fn pipelines(&self) -> impl Iterator<Item = RenderPipelineHandle> + '_ {
        self.commands.iter().filter_map(|c| match c {
            RecordedCommand::SetPipeline(p) => Some(*p),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RecordedTexture {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

#[derive(Debug)]
pub struct RecordingBackend {
    width: u32,
    height: u32,
    max_texture_dimension: u32,
    next_id: u64,
    in_frame: bool,
    swapchain_view: TextureViewHandle,
    frames_presented: u64,

    buffers: HashMap<u64, Vec<u8>>,
    textures: HashMap<u64, RecordedTexture>,
    views: HashMap<u64, TextureHandle>,
    pipelines: HashMap<u64, RenderPipelineDescriptor>,

    open_pass: Option<RecordedPass>,
    passes: Vec<RecordedPass>,
}

impl RecordingBackend {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            max_texture_dimension: 8192,
            next_id: 1,
            in_frame: false,
            swapchain_view: TextureViewHandle(0),
            frames_presented: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            views: HashMap::new(),
            pipelines: HashMap::new(),
            open_pass: None,
            passes: Vec::new(),
        }
    }

    /// Pretend the device has a different texture size limit
    pub fn with_max_texture_dimension(mut self, max: u32) -> Self {
        self.max_texture_dimension = max;
        self
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn record(&mut self, command: RecordedCommand) {
        match self.open_pass.as_mut() {
            Some(pass) => pass.commands.push(command),
            None => log::warn!("RecordingBackend: {command:?} outside of a render pass"),
        }
    }

    /// Passes recorded since the last `begin_frame`
    pub fn passes(&self) -> &[RecordedPass] {
        &self.passes
    }

    pub fn pass(&self, label: &str) -> Option<&RecordedPass> {
        self.passes.iter().find(|p| p.label.as_deref() == Some(label))
    }

    pub fn passes_labelled<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a RecordedPass> + 'a {
        self.passes.iter().filter(move |p| p.label.as_deref() == Some(label))
    }

    pub fn total_draws(&self) -> usize {
        self.passes.iter().map(RecordedPass::draw_count).sum()
    }

    pub fn pipeline_label(&self, pipeline: RenderPipelineHandle) -> Option<&str> {
        self.pipelines.get(&pipeline.0).and_then(|d| d.label.as_deref())
    }

    pub fn pipeline_descriptor(&self, pipeline: RenderPipelineHandle) -> Option<&RenderPipelineDescriptor> {
        self.pipelines.get(&pipeline.0)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Latest contents written to `buffer`
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    pub fn texture(&self, texture: TextureHandle) -> Option<&RecordedTexture> {
        self.textures.get(&texture.0)
    }

    pub fn texture_of_view(&self, view: TextureViewHandle) -> Option<&RecordedTexture> {
        self.views.get(&view.0).and_then(|t| self.textures.get(&t.0))
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    pub fn swapchain_view(&self) -> TextureViewHandle {
        self.swapchain_view
    }
}

impl GraphicsBackend for RecordingBackend {
    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.width = width.min(self.max_texture_dimension);
            self.height = height.min(self.max_texture_dimension);
        }
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    fn begin_frame(&mut self) -> BackendResult<FrameContext> {
        if self.in_frame {
            return Err(BackendError::AcquireImageFailed("previous frame was not ended".into()));
        }
        self.in_frame = true;
        self.passes.clear();
        self.swapchain_view = TextureViewHandle(self.allocate_id());
        log::trace!("RecordingBackend: begin frame {}x{}", self.width, self.height);
        Ok(FrameContext {
            swapchain_view: self.swapchain_view,
            width: self.width,
            height: self.height,
        })
    }

    fn end_frame(&mut self) -> BackendResult<()> {
        if let Some(pass) = self.open_pass.take() {
            log::warn!("RecordingBackend: frame ended with pass {:?} still open", pass.label);
            self.passes.push(pass);
        }
        self.in_frame = false;
        self.frames_presented += 1;
        log::trace!("RecordingBackend: presented {} passes", self.passes.len());
        Ok(())
    }

    fn swapchain_format(&self) -> TextureFormat {
        TextureFormat::Bgra8UnormSrgb
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!("RecordingBackend: creating buffer {:?} (size: {})", desc.label, desc.size);
        let id = self.allocate_id();
        self.buffers.insert(id, vec![0; desc.size as usize]);
        Ok(BufferHandle(id))
    }

    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8]) -> BackendResult<BufferHandle> {
        log::trace!("RecordingBackend: creating buffer {:?} with {} bytes", desc.label, data.len());
        let id = self.allocate_id();
        self.buffers.insert(id, data.to_vec());
        Ok(BufferHandle(id))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(contents) = self.buffers.get_mut(&buffer.0) else {
            log::warn!("RecordingBackend: write to unknown buffer {buffer:?}");
            return;
        };
        let start = offset as usize;
        let end = start + data.len();
        if contents.len() < end {
            contents.resize(end, 0);
        }
        contents[start..end].copy_from_slice(data);
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.width == 0
            || desc.height == 0
            || desc.width > self.max_texture_dimension
            || desc.height > self.max_texture_dimension
        {
            return Err(BackendError::TextureCreationFailed(format!(
                "{}x{} outside device limit {}",
                desc.width, desc.height, self.max_texture_dimension
            )));
        }
        log::trace!(
            "RecordingBackend: creating texture {:?} ({}x{} {:?})",
            desc.label,
            desc.width,
            desc.height,
            desc.format
        );
        let id = self.allocate_id();
        self.textures.insert(
            id,
            RecordedTexture {
                label: desc.label.clone(),
                width: desc.width,
                height: desc.height,
                format: desc.format,
            },
        );
        Ok(TextureHandle(id))
    }

    fn create_texture_view(&mut self, texture: TextureHandle) -> BackendResult<TextureViewHandle> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::TextureCreationFailed("texture not found".into()));
        }
        let id = self.allocate_id();
        self.views.insert(id, texture);
        Ok(TextureViewHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8], width: u32, height: u32) {
        log::trace!("RecordingBackend: upload {} bytes ({width}x{height}) to {texture:?}", data.len());
    }

    fn create_sampler(&mut self, desc: &SamplerDescriptor) -> BackendResult<SamplerHandle> {
        log::trace!("RecordingBackend: creating sampler {:?}", desc.label);
        Ok(SamplerHandle(self.allocate_id()))
    }

    fn create_bind_group_layout(
        &mut self,
        label: &str,
        entries: &[BindGroupLayoutEntry],
    ) -> BackendResult<BindGroupLayoutHandle> {
        log::trace!("RecordingBackend: creating layout {label} ({} entries)", entries.len());
        Ok(BindGroupLayoutHandle(self.allocate_id()))
    }

    fn create_bind_group(
        &mut self,
        _layout: BindGroupLayoutHandle,
        entries: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        for (binding, entry) in entries {
            let known = match entry {
                BindGroupEntry::Buffer { buffer, .. } => self.buffers.contains_key(&buffer.0),
                BindGroupEntry::Texture(view) => self.views.contains_key(&view.0),
                BindGroupEntry::Sampler(_) => true,
            };
            if !known {
                return Err(BackendError::BindGroupCreationFailed(format!(
                    "resource for binding {binding} not found"
                )));
            }
        }
        Ok(BindGroupHandle(self.allocate_id()))
    }

    fn create_render_pipeline(&mut self, desc: &RenderPipelineDescriptor) -> BackendResult<RenderPipelineHandle> {
        log::trace!("RecordingBackend: creating pipeline {:?}", desc.label);
        let id = self.allocate_id();
        self.pipelines.insert(id, desc.clone());
        Ok(RenderPipelineHandle(id))
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDescriptor) {
        if let Some(pass) = self.open_pass.take() {
            log::warn!("RecordingBackend: pass {:?} was never ended", pass.label);
            self.passes.push(pass);
        }
        let clear_color = desc.color_attachments.first().and_then(|a| match a.load_op {
            LoadOp::Clear(color) => Some(color),
            LoadOp::Load => None,
        });
        self.open_pass = Some(RecordedPass {
            label: desc.label.clone(),
            color_targets: desc.color_attachments.iter().map(|a| a.view).collect(),
            clear_color,
            depth_target: desc.depth_stencil_attachment.as_ref().map(|d| d.view),
            commands: Vec::new(),
        });
    }

    fn end_render_pass(&mut self) {
        if let Some(pass) = self.open_pass.take() {
            log::trace!("RecordingBackend: pass {:?} with {} draws", pass.label, pass.draw_count());
            self.passes.push(pass);
        }
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.record(RecordedCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.record(RecordedCommand::SetBindGroup { index, bind_group });
    }

    fn set_vertex_buffer(&mut self, slot: u32, buffer: BufferHandle, _offset: u64) {
        self.record(RecordedCommand::SetVertexBuffer { slot, buffer });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, _offset: u64, format: IndexFormat) {
        self.record(RecordedCommand::SetIndexBuffer { buffer, format });
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32, _min_depth: f32, _max_depth: f32) {
        self.record(RecordedCommand::SetViewport { x, y, width, height });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.record(RecordedCommand::Draw { vertices, instances });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.record(RecordedCommand::DrawIndexed { indices, base_vertex, instances });
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        self.views.retain(|_, t| *t != texture);
    }
}
