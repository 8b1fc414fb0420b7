//! Surface description shared by every node that references it

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlphaMode {
    #[default]
    Opaque,
    /// Fragments below `alpha_cutoff` are discarded
    Mask,
    /// Alpha blended; never written to the G-buffer
    Blend,
}

impl AlphaMode {
    fn shader_code(self) -> f32 {
        match self {
            AlphaMode::Opaque => 0.0,
            AlphaMode::Mask => 1.0,
            AlphaMode::Blend => 2.0,
        }
    }
}

/// Texture channels a material can sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Albedo,
    Emissive,
    Opacity,
    MetallicRoughness,
    Occlusion,
    Normal,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 6] = [
        TextureSlot::Albedo,
        TextureSlot::Emissive,
        TextureSlot::Opacity,
        TextureSlot::MetallicRoughness,
        TextureSlot::Occlusion,
        TextureSlot::Normal,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Texture referenced by registry name plus the UV set it is sampled with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureChannel {
    pub texture: String,
    pub uv_set: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub alpha_mode: AlphaMode,
    pub alpha_cutoff: f32,
    pub two_sided: bool,
    pub base_color: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: Vec3,
    textures: [Option<TextureChannel>; 6],
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            alpha_mode: AlphaMode::Opaque,
            alpha_cutoff: 0.5,
            two_sided: false,
            base_color: Vec4::ONE,
            metallic: 0.0,
            roughness: 0.5,
            emissive: Vec3::ZERO,
            textures: Default::default(),
        }
    }
}

impl Material {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_alpha_mode(mut self, mode: AlphaMode) -> Self {
        self.alpha_mode = mode;
        self
    }

    pub fn with_emissive(mut self, emissive: Vec3) -> Self {
        self.emissive = emissive;
        self
    }

    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }

    pub fn with_texture(mut self, slot: TextureSlot, texture: &str) -> Self {
        self.set_texture(slot, texture, 0);
        self
    }

    pub fn set_texture(&mut self, slot: TextureSlot, texture: &str, uv_set: u32) {
        self.textures[slot.index()] = Some(TextureChannel {
            texture: texture.to_string(),
            uv_set,
        });
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<&TextureChannel> {
        self.textures[slot.index()].as_ref()
    }

    pub fn is_blended(&self) -> bool {
        self.alpha_mode == AlphaMode::Blend
    }

    pub fn uniform_data(&self) -> MaterialUniformData {
        MaterialUniformData {
            base_color: self.base_color,
            emissive: self.emissive.extend(0.0),
            params: Vec4::new(self.alpha_cutoff, self.alpha_mode.shader_code(), self.metallic, self.roughness),
            flags: Vec4::new(
                if self.texture(TextureSlot::Normal).is_some() { 1.0 } else { 0.0 },
                if self.two_sided { 1.0 } else { 0.0 },
                0.0,
                0.0,
            ),
        }
    }

    /// Opaque, untextured surface
    pub fn flat(name: &str, color: Vec3) -> Self {
        Self::new(name).with_base_color(color.extend(1.0))
    }

    /// Alpha-blended surface
    pub fn glass(name: &str, color: Vec4) -> Self {
        Self::new(name).with_base_color(color).with_alpha_mode(AlphaMode::Blend)
    }
}

/// Material data as laid out in the shaders' `MaterialUniforms`
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniformData {
    pub base_color: Vec4,
    pub emissive: Vec4,
    /// x = alpha cutoff, y = alpha mode, z = metallic, w = roughness
    pub params: Vec4,
    /// x = has normal map, y = two sided
    pub flags: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_encodes_alpha_mode_and_normal_map() {
        let material = Material::glass("window", Vec4::new(1.0, 1.0, 1.0, 0.3))
            .with_texture(TextureSlot::Normal, "window_n.png");
        let data = material.uniform_data();
        assert_eq!(data.params.y, 2.0);
        assert_eq!(data.flags.x, 1.0);
        assert!(material.is_blended());
    }

    #[test]
    fn texture_slots_are_independent() {
        let material = Material::new("m").with_texture(TextureSlot::Albedo, "a.png");
        assert_eq!(material.texture(TextureSlot::Albedo).map(|c| c.texture.as_str()), Some("a.png"));
        assert!(material.texture(TextureSlot::Emissive).is_none());
    }
}
