//! Offscreen render targets: depth buffers, shadow maps and the G-buffer

use crate::backend::{BackendResult, GraphicsBackend, TextureDescriptor, TextureFormat, TextureHandle, TextureViewHandle};
use crate::shader::{DEPTH_FORMAT, GBUFFER_FORMATS};

/// Depth-only attachment that later passes can sample. The handles are
/// copied freely; whoever created the target releases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthTarget {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

impl DepthTarget {
    pub fn new(backend: &mut dyn GraphicsBackend, label: &str, width: u32, height: u32) -> BackendResult<Self> {
        let texture = backend.create_texture(&TextureDescriptor::render_target(label, width, height, DEPTH_FORMAT))?;
        let view = backend.create_texture_view(texture)?;
        log::debug!("Created depth target {label} ({width}x{height})");
        Ok(Self {
            texture,
            view,
            width,
            height,
        })
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    pub fn release(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_texture(self.texture);
    }
}

/// Colour attachment that later passes can sample
#[derive(Debug, Clone, Copy)]
pub struct ColorTarget {
    pub texture: TextureHandle,
    pub view: TextureViewHandle,
    pub format: TextureFormat,
}

impl ColorTarget {
    pub fn new(
        backend: &mut dyn GraphicsBackend,
        label: &str,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> BackendResult<Self> {
        let texture = backend.create_texture(&TextureDescriptor::render_target(label, width, height, format))?;
        let view = backend.create_texture_view(texture)?;
        Ok(Self { texture, view, format })
    }
}

/// Deferred shading inputs.
///
/// - `albedo`: base colour, occlusion in alpha
/// - `normal`: world normal encoded as `n * 0.5 + 0.5`
/// - `emissive`: emitted colour
/// - `depth`: hardware depth
#[derive(Debug)]
pub struct GBuffer {
    pub albedo: ColorTarget,
    pub normal: ColorTarget,
    pub emissive: ColorTarget,
    pub depth: DepthTarget,
}

impl GBuffer {
    pub fn new(backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> BackendResult<Self> {
        let [albedo, normal, emissive] = GBUFFER_FORMATS;
        Ok(Self {
            albedo: ColorTarget::new(backend, "gbuffer_albedo", width, height, albedo)?,
            normal: ColorTarget::new(backend, "gbuffer_normal", width, height, normal)?,
            emissive: ColorTarget::new(backend, "gbuffer_emissive", width, height, emissive)?,
            depth: DepthTarget::new(backend, "gbuffer_depth", width, height)?,
        })
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.depth.matches(width, height)
    }

    pub fn color_views(&self) -> [TextureViewHandle; 3] {
        [self.albedo.view, self.normal.view, self.emissive.view]
    }

    pub fn release(self, backend: &mut dyn GraphicsBackend) {
        for target in [self.albedo, self.normal, self.emissive] {
            backend.destroy_texture(target.texture);
        }
        self.depth.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_gbuffer_allocates_and_releases_four_targets() {
        let mut backend = RecordingBackend::new(32, 32);
        let gbuffer = GBuffer::new(&mut backend, 32, 16).unwrap();
        assert_eq!(backend.live_texture_count(), 4);
        assert!(gbuffer.matches(32, 16));
        assert!(!gbuffer.matches(32, 32));
        assert_eq!(
            backend.texture_of_view(gbuffer.normal.view).map(|t| t.format),
            Some(TextureFormat::Rgba16Float)
        );
        gbuffer.release(&mut backend);
        assert_eq!(backend.live_texture_count(), 0);
    }
}
