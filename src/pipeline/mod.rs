//! Render passes and the state they share
//!
//! One frame runs these passes in order:
//! 1. Shadow pass - depth from every shadow-casting light
//! 2. Forward pass (skybox + lit geometry), or the G-buffer pass followed by
//!    the deferred lighting pass
//! 3. Debug overlay - bounding boxes and texture tiles

pub mod debug_pass;
pub mod forward_pass;
pub mod gbuffer_pass;
pub mod lighting_pass;
pub mod shading;
pub mod shadow_pass;
pub mod skybox_pass;
mod targets;
mod uniforms;
pub mod visibility;

pub use debug_pass::DebugOverlay;
pub use forward_pass::ForwardPass;
pub use gbuffer_pass::GBufferPass;
pub use lighting_pass::LightingPass;
pub use shadow_pass::ShadowPass;
pub use skybox_pass::SkyboxPass;
pub use targets::{ColorTarget, DepthTarget, GBuffer};
pub use uniforms::{ObjectUniformData, UniformArena};
pub use visibility::{collect_lights, walk_scene, ActiveLight, RenderCall, ShadowView, WalkStats};
