//! Frame orchestration.
//!
//! A frame runs [`Renderer::setup_scene`], then
//! [`Renderer::generate_shadow_maps`], then [`Renderer::render_frame`];
//! [`Renderer::render_scene`] does all three between the backend's
//! `begin_frame` and `end_frame`.
//!
//! GPU copies of registry resources are created lazily on the thread that
//! renders, the first time they are drawn.

mod context;
pub mod gpu;

pub use context::RenderContext;

use crate::backend::{BackendError, FrameContext, GraphicsBackend};
use crate::config::{RenderMode, RendererConfig};
use crate::pipeline::shadow_pass::{shadow_map_size, shadow_pass_label};
use crate::pipeline::{
    collect_lights, ActiveLight, DebugOverlay, ForwardPass, GBufferPass, LightingPass, ShadowPass,
    ShadowView,
};
use crate::resources::{ResourceRegistry, TextureId};
use crate::scene::{Entity, Scene, ShadowMap};
use crate::shader::ShaderLibrary;
use gpu::GpuState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Counters for the last frame
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: usize,
    pub culled_nodes: usize,
    /// Lit draws: forward light passes and deferred light composites
    pub light_passes: usize,
    pub shadow_maps_rendered: usize,
    pub skipped_draws: usize,
}

pub struct Renderer {
    pub render_mode: RenderMode,
    /// Line polygon mode for scene geometry
    pub wireframe: bool,
    pub show_boundaries: bool,
    pub show_shadowmaps: bool,
    pub show_gbuffers: bool,

    config: RendererConfig,
    gpu: Option<GpuState>,
    shaders: ShaderLibrary,
    lights: Vec<ActiveLight>,
    skybox: Option<TextureId>,
    stats: FrameStats,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self {
            render_mode: config.render_mode,
            wireframe: false,
            show_boundaries: false,
            show_shadowmaps: false,
            show_gbuffers: false,
            config,
            gpu: None,
            shaders: ShaderLibrary::new(),
            lights: Vec::new(),
            skybox: None,
            stats: FrameStats::default(),
        }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Lights collected by the last `setup_scene`
    pub fn lights(&self) -> &[ActiveLight] {
        &self.lights
    }

    pub fn skybox(&self) -> Option<TextureId> {
        self.skybox
    }

    pub fn shaders_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.shaders
    }

    /// Start a frame: refresh world matrices, rebuild the light list from
    /// scratch and resolve the skybox texture
    pub fn setup_scene(&mut self, scene: &mut Scene, registry: &ResourceRegistry) {
        self.stats = FrameStats::default();
        self.shaders.begin_frame();
        if let Some(gpu) = &mut self.gpu {
            gpu.begin_frame();
        }

        scene.update_global_matrices();
        self.lights = collect_lights(scene);
        self.skybox = scene.skybox.as_deref().and_then(|name| {
            let texture = registry.texture_id(name);
            if texture.is_none() {
                log::warn!("Skybox texture {name} is not loaded");
            }
            texture
        });
        log::trace!("Scene setup: {} lights", self.lights.len());
    }

    /// Render a depth map for every shadow-casting spot and directional
    /// light. Casters are drawn in FLAT mode; the current render mode is
    /// restored afterwards.
    pub fn generate_shadow_maps(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene: &mut Scene,
        registry: &ResourceRegistry,
    ) -> Result<(), RenderError> {
        let saved = self.render_mode;
        self.render_mode = RenderMode::Flat;
        let result = self.render_shadow_maps(backend, scene, registry);
        self.render_mode = saved;
        result
    }

    fn render_shadow_maps(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene: &mut Scene,
        registry: &ResourceRegistry,
    ) -> Result<(), RenderError> {
        let gpu = Self::gpu_state(&mut self.gpu, backend)?;
        let max_dimension = backend.max_texture_dimension();
        let (width, height) = backend.surface_size();
        let mut ctx = RenderContext::new(backend, registry, gpu, &mut self.shaders, &mut self.stats, width, height);

        // Hidden lights are not collected; their maps go in the sweep below
        for light in scene.entities.iter_mut().filter(|e| !e.visible).filter_map(Entity::as_light_mut) {
            light.shadow = None;
        }

        for active in &mut self.lights {
            active.shadow = None;
            let Some(light) = scene.entities.get_mut(active.entity).and_then(Entity::as_light_mut) else {
                continue;
            };
            let previous = light.shadow.take().map(|map| map.target);
            if !light.wants_shadow_map() {
                continue;
            }

            let size = shadow_map_size(
                light,
                self.config.spot_shadow_size,
                self.config.directional_shadow_size,
                max_dimension,
            );
            let name = scene.entities[active.entity].name.clone();
            let target = match ctx.gpu.shadow_map(ctx.backend, previous, &shadow_pass_label(&name), size) {
                Ok(target) => target,
                Err(e) => {
                    log::warn!("Failed to create shadow map: {e}");
                    continue;
                }
            };

            let pass = ShadowPass {
                scene: &*scene,
                mode: self.render_mode,
            };
            let view_projection = pass.execute(&mut ctx, active, &name, &target);
            active.shadow = Some(ShadowView {
                view: target.view,
                view_projection,
            });
            if let Some(light) = scene.entities.get_mut(active.entity).and_then(Entity::as_light_mut) {
                light.shadow = Some(ShadowMap {
                    target,
                    view_projection,
                });
            }
        }

        // Maps of lights that were skipped above, removed from the scene or
        // dropped with it
        ctx.gpu.release_unused_shadow_maps(ctx.backend);
        Ok(())
    }

    /// Draw the scene into `frame` in the current render mode, followed by
    /// the enabled debug overlays
    pub fn render_frame(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        frame: &FrameContext,
        scene: &Scene,
        registry: &ResourceRegistry,
    ) -> Result<(), RenderError> {
        let gpu = Self::gpu_state(&mut self.gpu, backend)?;
        let mut camera = scene.main_camera.clone();
        if frame.height > 0 {
            camera.set_aspect(frame.width as f32 / frame.height as f32);
        }

        let mut ctx = RenderContext::new(backend, registry, gpu, &mut self.shaders, &mut self.stats, frame.width, frame.height);
        ctx.wireframe = self.wireframe;
        if !ctx.enable_camera(&camera) {
            return Ok(());
        }

        let (bounds, gbuffer) = match self.render_mode {
            RenderMode::Deferred => {
                let geometry = GBufferPass {
                    scene,
                    lights: &self.lights,
                }
                .execute(&mut ctx);
                match geometry {
                    Some((gbuffer, bounds)) => {
                        LightingPass {
                            lights: &self.lights,
                            ambient: scene.ambient_light,
                            background: scene.background_color,
                            clear_background: self.config.clear_background,
                        }
                        .execute(&mut ctx, frame.swapchain_view, &gbuffer);
                        (bounds, Some(gbuffer))
                    }
                    None => (Vec::new(), None),
                }
            }
            mode => {
                let bounds = ForwardPass {
                    scene,
                    lights: &self.lights,
                    mode,
                    skybox: self.skybox,
                    clear_background: self.config.clear_background,
                }
                .execute(&mut ctx, frame.swapchain_view);
                (bounds, None)
            }
        };

        let shadow_maps: Vec<_> = self.lights.iter().filter_map(ActiveLight::shadow_view).collect();
        DebugOverlay {
            show_boundaries: self.show_boundaries,
            show_shadowmaps: self.show_shadowmaps,
            show_gbuffers: self.show_gbuffers,
        }
        .execute(&mut ctx, frame.swapchain_view, &bounds, &shadow_maps, gbuffer.as_ref());

        log::trace!(
            "Frame: {} draws, {} culled, {} light passes",
            self.stats.draw_calls,
            self.stats.culled_nodes,
            self.stats.light_passes
        );
        Ok(())
    }

    /// Render and present one frame of `scene`
    pub fn render_scene(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        scene: &mut Scene,
        registry: &ResourceRegistry,
    ) -> Result<FrameStats, RenderError> {
        let frame = backend.begin_frame()?;
        self.setup_scene(scene, registry);
        let rendered = self
            .generate_shadow_maps(backend, scene, registry)
            .and_then(|()| self.render_frame(backend, &frame, scene, registry));
        // The frame is closed even when recording failed
        backend.end_frame()?;
        rendered?;
        Ok(self.stats)
    }

    fn gpu_state<'g>(gpu: &'g mut Option<GpuState>, backend: &mut dyn GraphicsBackend) -> Result<&'g mut GpuState, RenderError> {
        let state = match gpu.take() {
            Some(state) => state,
            None => {
                log::info!("Creating renderer GPU state");
                GpuState::new(backend)?
            }
        };
        Ok(gpu.insert(state))
    }
}
