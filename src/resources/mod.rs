//! Resource management
//!
//! CPU-side meshes, materials and textures, the registry that names
//! them, the binary mesh cache and the background loader.

pub mod loader;
mod material;
mod mesh;
pub mod mesh_cache;
mod registry;
mod texture;

pub use loader::{AssetLoader, LoadError, LoadRequest, LoadedAsset};
pub use material::*;
pub use mesh::*;
pub use registry::*;
pub use texture::*;
