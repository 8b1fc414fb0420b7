//! Renderer configuration, loadable from TOML
//!
//! ```toml
//! render_mode = "lights"
//! vsync = true
//! spot_shadow_size = 1024
//!
//! [loader]
//! workers = 4
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Shading path used by the main pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// Unlit base colour
    Flat,
    /// Albedo texture, no lighting
    Textured,
    /// Forward lighting, one additive pass per extra light
    #[default]
    Lights,
    /// G-buffer plus full-screen lighting passes
    Deferred,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub workers: usize,
    /// Decoded assets waiting for the GPU thread before workers block
    pub queue_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    pub render_mode: RenderMode,
    /// Read when the surface is created, see `WgpuBackend::from_config`
    pub vsync: bool,
    /// Clear the main target to the scene background colour
    pub clear_background: bool,
    pub spot_shadow_size: u32,
    pub directional_shadow_size: u32,
    pub loader: LoaderConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::default(),
            vsync: true,
            clear_background: true,
            spot_shadow_size: 1024,
            directional_shadow_size: 15000,
            loader: LoaderConfig::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl RendererConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            render_mode = "deferred"

            [loader]
            workers = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.render_mode, RenderMode::Deferred);
        assert_eq!(config.loader.workers, 8);
        assert_eq!(config.loader.queue_capacity, 16);
        assert_eq!(config.directional_shadow_size, 15000);
    }

    #[test]
    fn unknown_render_mode_is_an_error() {
        assert!(matches!(
            RendererConfig::from_toml_str(r#"render_mode = "raytraced""#),
            Err(ConfigError::Parse(_))
        ));
    }
}
