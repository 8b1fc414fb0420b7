//! Decoded images and their GPU counterparts

use crate::backend::traits::*;
use crate::backend::types::*;
use image::{DynamicImage, GenericImageView};
use std::path::Path;

/// RGBA8 pixels ready for upload
#[derive(Debug, Clone)]
pub struct TextureData {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
}

impl TextureData {
    /// Decode an image file; the registry name is the file name
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, image::ImageError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
            .to_string();
        Ok(Self::from_image(image::open(path)?, &name))
    }

    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, image::ImageError> {
        Ok(Self::from_image(image::load_from_memory(bytes)?, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            name: name.to_string(),
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data: img.to_rgba8().into_raw(),
        }
    }

    /// 1x1 texture in linear space
    pub fn solid_color(name: &str, color: [u8; 4]) -> Self {
        Self {
            name: name.to_string(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: color.to_vec(),
        }
    }

    pub fn white() -> Self {
        Self::solid_color("white", [255; 4])
    }

    /// Tangent-space +Z
    pub fn flat_normal() -> Self {
        Self::solid_color("flat_normal", [128, 128, 255, 255])
    }

    pub fn checkerboard(name: &str, size: u32, cell: u32, a: [u8; 4], b: [u8; 4]) -> Self {
        let cell = cell.max(1);
        let data = (0..size * size)
            .flat_map(|i| {
                let (x, y) = (i % size, i / size);
                if ((x / cell) + (y / cell)) % 2 == 0 { a } else { b }
            })
            .collect();
        Self {
            name: name.to_string(),
            width: size,
            height: size,
            format: TextureFormat::Rgba8UnormSrgb,
            data,
        }
    }
}

/// Uploaded texture with its default view
#[derive(Debug, Clone, Copy)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub view: TextureViewHandle,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    pub fn upload(backend: &mut dyn GraphicsBackend, data: &TextureData) -> BackendResult<Self> {
        let handle = backend.create_texture(&TextureDescriptor::sampled(&data.name, data.width, data.height, data.format))?;
        let view = backend.create_texture_view(handle)?;
        backend.write_texture(handle, &data.data, data.width, data.height);
        log::debug!("Uploaded texture {} ({}x{})", data.name, data.width, data.height);
        Ok(Self {
            handle,
            view,
            width: data.width,
            height: data.height,
        })
    }
}
