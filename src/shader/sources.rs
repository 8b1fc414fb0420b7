//! Built-in WGSL sources.
//!
//! Stored as `.wgsl` files under `shaders/` and embedded at compile time:
//!
//! | File | Role |
//! |------|------|
//! | `common.wgsl` | Camera and light uniform blocks |
//! | `lighting.wgsl` | Shadow lookup and per-light shading |
//! | `mesh.wgsl` | Template for everything drawn from vertex buffers |
//! | `fullscreen.wgsl` | Template for full-screen triangle passes |

pub const COMMON_SOURCE: &str = include_str!("../../shaders/common.wgsl");
pub const LIGHTING_SOURCE: &str = include_str!("../../shaders/lighting.wgsl");
pub const MESH_TEMPLATE: &str = include_str!("../../shaders/mesh.wgsl");
pub const FULLSCREEN_TEMPLATE: &str = include_str!("../../shaders/fullscreen.wgsl");

/// Modules reachable through `#include`
pub fn include_modules() -> [(&'static str, &'static str); 2] {
    [("common.wgsl", COMMON_SOURCE), ("lighting.wgsl", LIGHTING_SOURCE)]
}
