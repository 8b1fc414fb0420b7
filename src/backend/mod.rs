//! Backend abstraction layer
//!
//! The renderer only talks to [`GraphicsBackend`]; [`wgpu_backend`] drives a
//! real device and [`recording`] captures calls for headless use.

pub mod recording;
pub mod traits;
pub mod types;
pub mod wgpu_backend;

pub use recording::RecordingBackend;
pub use traits::*;
pub use types::*;
pub use wgpu_backend::WgpuBackend;
