//! Scene Renderer - a scene-graph renderer with forward and deferred shading
//!
//! The renderer draws through a [`backend::GraphicsBackend`]:
//! - **wgpu**: window surface backed GPU rendering
//! - **recording**: headless backend that captures every command
//!
//! # Features
//! - Hierarchical transform nodes with per-node frustum culling
//! - FLAT, TEXTURED, LIGHTS (one additive pass per light) and DEFERRED modes
//! - Shadow maps for spot and directional lights
//! - UberShader templates specialised by preprocessor macros and validated
//!   with naga
//! - JSON scene descriptions, a binary mesh cache and a background asset
//!   loader
//!
//! # Example
//!
//! ```no_run
//! use scene_renderer::backend::RecordingBackend;
//! use scene_renderer::resources::{Mesh, ResourceRegistry};
//! use scene_renderer::scene::{Entity, Node, Scene};
//! use scene_renderer::{Renderer, RendererConfig};
//!
//! let mut backend = RecordingBackend::new(640, 480);
//! let mut registry = ResourceRegistry::new();
//! let cube = registry.add_mesh(Mesh::cube());
//!
//! let mut scene = Scene::new();
//! scene.add_entity(Entity::prefab("cube", "cube.mesh", Node::new("cube").with_mesh(cube, None)));
//!
//! let mut renderer = Renderer::new(RendererConfig::default());
//! let stats = renderer.render_scene(&mut backend, &mut scene, &registry).unwrap();
//! println!("{} draw calls", stats.draw_calls);
//! ```

pub mod backend;
pub mod config;
pub mod pipeline;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod shader;

pub use backend::{GraphicsBackend, RecordingBackend, WgpuBackend};
pub use config::{RenderMode, RendererConfig};
pub use renderer::{FrameStats, RenderContext, RenderError, Renderer};
