//! UberShader library.
//!
//! Two WGSL templates ([`sources::MESH_TEMPLATE`] and
//! [`sources::FULLSCREEN_TEMPLATE`]) are specialised with `#ifdef` macros.
//! A [`PipelineKey`] names the shader variant together with the fixed
//! function state around it; [`ShaderLibrary::pipeline`] turns a key into a
//! backend pipeline, validating the generated WGSL with naga first.
//!
//! A successfully built pipeline is cached for the library's lifetime. A
//! failed one is remembered until the next [`ShaderLibrary::begin_frame`],
//! so a broken variant costs one attempt per frame and every draw that
//! needs it is skipped.

mod preprocess;
pub mod sources;

pub use preprocess::{apply_conditionals, ShaderComposer};

use crate::backend::{
    BackendResult, BindGroupLayoutEntry, BindGroupLayoutHandle, BlendState, ColorTargetState,
    CompareFunction, CullMode, DepthStencilState, FrontFace, GraphicsBackend, PolygonMode,
    PrimitiveTopology, RenderPipelineDescriptor, RenderPipelineHandle, ShaderStageFlags,
    TextureFormat, TextureSampleType, Vertex,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;

pub const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;

/// Albedo + occlusion, encoded normal, emissive
pub const GBUFFER_FORMATS: [TextureFormat; 3] = [
    TextureFormat::Rgba8Unorm,
    TextureFormat::Rgba16Float,
    TextureFormat::Rgba16Float,
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderError {
    #[error("shader preprocessing failed: {0}")]
    Preprocess(String),
    #[error("shader variant {variant} failed to compile: {message}")]
    Compile { variant: String, message: String },
    #[error("failed to create pipeline {label}: {message}")]
    Pipeline { label: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    Mesh,
    Fullscreen,
}

impl Template {
    fn builtin_source(self) -> &'static str {
        match self {
            Template::Mesh => sources::MESH_TEMPLATE,
            Template::Fullscreen => sources::FULLSCREEN_TEMPLATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    Flat,
    Textured,
    Lights,
    GBuffer,
    /// Unlit line lists (bounding box overlay)
    Lines,
    DeferredAmbient,
    DeferredLight,
    Skybox,
    TextureView,
    DepthView,
}

impl ShaderKind {
    pub const ALL: [ShaderKind; 10] = [
        ShaderKind::Flat,
        ShaderKind::Textured,
        ShaderKind::Lights,
        ShaderKind::GBuffer,
        ShaderKind::Lines,
        ShaderKind::DeferredAmbient,
        ShaderKind::DeferredLight,
        ShaderKind::Skybox,
        ShaderKind::TextureView,
        ShaderKind::DepthView,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShaderKind::Flat => "flat",
            ShaderKind::Textured => "textured",
            ShaderKind::Lights => "lights",
            ShaderKind::GBuffer => "gbuffer",
            ShaderKind::Lines => "lines",
            ShaderKind::DeferredAmbient => "deferred_ambient",
            ShaderKind::DeferredLight => "deferred_light",
            ShaderKind::Skybox => "skybox",
            ShaderKind::TextureView => "texture_view",
            ShaderKind::DepthView => "depth_view",
        }
    }

    pub fn template(self) -> Template {
        if self.is_fullscreen() {
            Template::Fullscreen
        } else {
            Template::Mesh
        }
    }

    /// Drawn as a single full-screen triangle without vertex buffers
    pub fn is_fullscreen(self) -> bool {
        matches!(
            self,
            ShaderKind::DeferredAmbient
                | ShaderKind::DeferredLight
                | ShaderKind::Skybox
                | ShaderKind::TextureView
                | ShaderKind::DepthView
        )
    }

    fn macros(self) -> &'static [&'static str] {
        match self {
            ShaderKind::Flat | ShaderKind::Lines => &["FLAT"],
            ShaderKind::Textured => &["TEXTURED"],
            ShaderKind::Lights => &["LIGHTS", "LIGHTING"],
            ShaderKind::GBuffer => &["GBUFFER"],
            ShaderKind::DeferredAmbient => &["DEFERRED", "DEFERRED_AMBIENT"],
            ShaderKind::DeferredLight => &["DEFERRED", "DEFERRED_LIGHT"],
            ShaderKind::Skybox => &["SKYBOX"],
            ShaderKind::TextureView => &["TEXTURE_VIEW"],
            ShaderKind::DepthView => &["DEPTH_VIEW"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Opaque,
    Alpha,
    /// `SRC_ALPHA, ONE` accumulation for light passes
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthMode {
    /// Less, writes depth
    Write,
    /// LessEqual against existing depth, no writes
    TestOnly,
    Disabled,
}

/// Attachments a pipeline renders into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetLayout {
    Swapchain,
    SwapchainNoDepth,
    GBuffer,
    /// Shadow maps; no fragment stage
    DepthOnly,
}

impl TargetLayout {
    pub fn has_depth(self) -> bool {
        !matches!(self, TargetLayout::SwapchainNoDepth)
    }

    fn color_formats(self, swapchain: TextureFormat) -> Vec<TextureFormat> {
        match self {
            TargetLayout::Swapchain | TargetLayout::SwapchainNoDepth => vec![swapchain],
            TargetLayout::GBuffer => GBUFFER_FORMATS.to_vec(),
            TargetLayout::DepthOnly => Vec::new(),
        }
    }
}

/// Shader variant plus the pipeline state around it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: ShaderKind,
    pub blend: BlendMode,
    pub depth: DepthMode,
    pub targets: TargetLayout,
    pub two_sided: bool,
    pub wireframe: bool,
}

impl PipelineKey {
    pub fn new(shader: ShaderKind, targets: TargetLayout) -> Self {
        Self {
            shader,
            blend: BlendMode::Opaque,
            depth: if shader.is_fullscreen() { DepthMode::Disabled } else { DepthMode::Write },
            targets,
            two_sided: false,
            wireframe: false,
        }
    }

    pub fn with_blend(mut self, blend: BlendMode) -> Self {
        self.blend = blend;
        self
    }

    pub fn with_depth(mut self, depth: DepthMode) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }

    pub fn with_wireframe(mut self, wireframe: bool) -> Self {
        self.wireframe = wireframe;
        self
    }

    /// Macro set handed to the preprocessor
    pub fn defines(&self) -> BTreeSet<&'static str> {
        let mut defines: BTreeSet<&'static str> = self.shader.macros().iter().copied().collect();
        if self.targets == TargetLayout::DepthOnly {
            defines.insert("DEPTH");
        }
        defines
    }

    /// Stable, human readable pipeline name starting with the shader name
    pub fn label(&self) -> String {
        let mut label = self.shader.name().to_string();
        if self.targets == TargetLayout::DepthOnly {
            label.push_str("_depth");
        }
        match self.blend {
            BlendMode::Opaque => {}
            BlendMode::Alpha => label.push_str("_blend"),
            BlendMode::Additive => label.push_str("_additive"),
        }
        if self.two_sided {
            label.push_str("_two_sided");
        }
        if self.wireframe {
            label.push_str("_wireframe");
        }
        label
    }

    pub fn bind_group_layouts(&self, layouts: &BindGroupLayouts) -> Vec<BindGroupLayoutHandle> {
        match self.shader {
            ShaderKind::Flat | ShaderKind::Textured | ShaderKind::GBuffer | ShaderKind::Lines => {
                vec![layouts.camera, layouts.object, layouts.material]
            }
            ShaderKind::Lights => vec![layouts.camera, layouts.object, layouts.material, layouts.light],
            ShaderKind::DeferredAmbient | ShaderKind::DeferredLight => {
                vec![layouts.camera, layouts.gbuffer, layouts.light]
            }
            ShaderKind::Skybox => vec![layouts.camera, layouts.sky],
            ShaderKind::TextureView => vec![layouts.view_texture],
            ShaderKind::DepthView => vec![layouts.view_depth],
        }
    }

    fn descriptor(&self, source: String, layouts: &BindGroupLayouts, swapchain: TextureFormat) -> RenderPipelineDescriptor {
        let blend = match self.blend {
            BlendMode::Opaque => None,
            BlendMode::Alpha => Some(BlendState::alpha_blending()),
            BlendMode::Additive => Some(BlendState::additive()),
        };
        let depth_stencil = self.targets.has_depth().then(|| {
            let (depth_write_enabled, depth_compare) = match self.depth {
                DepthMode::Write => (true, CompareFunction::Less),
                DepthMode::TestOnly => (false, CompareFunction::LessEqual),
                DepthMode::Disabled => (false, CompareFunction::Always),
            };
            DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled,
                depth_compare,
            }
        });
        let cull_mode = if self.two_sided || self.shader.is_fullscreen() || self.shader == ShaderKind::Lines {
            CullMode::None
        } else {
            CullMode::Back
        };

        RenderPipelineDescriptor {
            label: Some(self.label()),
            shader: source,
            has_fragment: self.targets != TargetLayout::DepthOnly,
            vertex_layouts: if self.shader.is_fullscreen() { Vec::new() } else { vec![Vertex::layout()] },
            bind_group_layouts: self.bind_group_layouts(layouts),
            primitive_topology: if self.shader == ShaderKind::Lines {
                PrimitiveTopology::LineList
            } else {
                PrimitiveTopology::TriangleList
            },
            front_face: FrontFace::Ccw,
            cull_mode,
            polygon_mode: if self.wireframe { PolygonMode::Line } else { PolygonMode::Fill },
            depth_stencil,
            color_targets: self
                .targets
                .color_formats(swapchain)
                .into_iter()
                .map(|format| ColorTargetState { format, blend })
                .collect(),
        }
    }
}

/// Bind group layouts shared by every pipeline. Group indices per shader
/// are listed in [`PipelineKey::bind_group_layouts`].
#[derive(Debug, Clone, Copy)]
pub struct BindGroupLayouts {
    pub camera: BindGroupLayoutHandle,
    pub object: BindGroupLayoutHandle,
    pub material: BindGroupLayoutHandle,
    pub light: BindGroupLayoutHandle,
    pub gbuffer: BindGroupLayoutHandle,
    pub sky: BindGroupLayoutHandle,
    pub view_texture: BindGroupLayoutHandle,
    pub view_depth: BindGroupLayoutHandle,
}

impl BindGroupLayouts {
    pub fn create(backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        let color = TextureSampleType::Float { filterable: true };

        let mut material = vec![
            BindGroupLayoutEntry::uniform(0, ShaderStageFlags::FRAGMENT),
            BindGroupLayoutEntry::sampler(1, false),
        ];
        material.extend((2..8).map(|binding| BindGroupLayoutEntry::texture(binding, color)));

        Ok(Self {
            camera: backend.create_bind_group_layout(
                "camera",
                &[BindGroupLayoutEntry::uniform(0, ShaderStageFlags::VERTEX_FRAGMENT)],
            )?,
            object: backend.create_bind_group_layout("object", &[BindGroupLayoutEntry::uniform(0, ShaderStageFlags::VERTEX)])?,
            material: backend.create_bind_group_layout("material", &material)?,
            light: backend.create_bind_group_layout(
                "light",
                &[
                    BindGroupLayoutEntry::uniform(0, ShaderStageFlags::FRAGMENT),
                    BindGroupLayoutEntry::texture(1, TextureSampleType::Depth),
                    BindGroupLayoutEntry::sampler(2, true),
                ],
            )?,
            gbuffer: backend.create_bind_group_layout(
                "gbuffer",
                &[
                    BindGroupLayoutEntry::texture(0, color),
                    BindGroupLayoutEntry::texture(1, color),
                    BindGroupLayoutEntry::texture(2, color),
                    BindGroupLayoutEntry::texture(3, TextureSampleType::Depth),
                ],
            )?,
            sky: backend.create_bind_group_layout(
                "sky",
                &[BindGroupLayoutEntry::texture(0, color), BindGroupLayoutEntry::sampler(1, false)],
            )?,
            view_texture: backend.create_bind_group_layout("view texture", &[BindGroupLayoutEntry::texture(0, color)])?,
            view_depth: backend
                .create_bind_group_layout("view depth", &[BindGroupLayoutEntry::texture(0, TextureSampleType::Depth)])?,
        })
    }
}

/// Parse and validate a WGSL module
pub fn validate_wgsl(variant: &str, source: &str) -> Result<naga::Module, ShaderError> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| ShaderError::Compile {
        variant: variant.to_string(),
        message: e.emit_to_string(source),
    })?;
    let mut validator = naga::valid::Validator::new(naga::valid::ValidationFlags::all(), naga::valid::Capabilities::all());
    validator.validate(&module).map_err(|e| ShaderError::Compile {
        variant: variant.to_string(),
        message: format!("Validation error: {e}"),
    })?;
    Ok(module)
}

pub struct ShaderLibrary {
    composer: ShaderComposer,
    overrides: HashMap<Template, String>,
    /// Validated WGSL per template and macro set
    sources: HashMap<(Template, BTreeSet<&'static str>), String>,
    pipelines: HashMap<PipelineKey, RenderPipelineHandle>,
    /// Keys that failed this frame
    failed: HashSet<PipelineKey>,
    /// Keys whose failure was already reported at error level
    reported: HashSet<PipelineKey>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderLibrary {
    pub fn new() -> Self {
        let mut composer = ShaderComposer::new();
        for (path, source) in sources::include_modules() {
            composer.register_include(path, source);
        }
        Self {
            composer,
            overrides: HashMap::new(),
            sources: HashMap::new(),
            pipelines: HashMap::new(),
            failed: HashSet::new(),
            reported: HashSet::new(),
        }
    }

    /// Forget this frame's failures so they are retried
    pub fn begin_frame(&mut self) {
        self.failed.clear();
    }

    /// Replace a template (hot reload). `None` restores the built-in source.
    /// Every cached variant and pipeline is dropped.
    pub fn set_template_override(&mut self, template: Template, source: Option<String>) {
        match source {
            Some(source) => {
                self.overrides.insert(template, source);
            }
            None => {
                self.overrides.remove(&template);
            }
        }
        self.sources.clear();
        self.pipelines.clear();
        self.failed.clear();
        self.reported.clear();
    }

    /// False when `key` already failed this frame
    pub fn is_available(&self, key: &PipelineKey) -> bool {
        !self.failed.contains(key)
    }

    pub fn cached_pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Preprocessed and validated WGSL for `key`
    pub fn variant_source(&mut self, key: &PipelineKey) -> Result<String, ShaderError> {
        let template = key.shader.template();
        let defines = key.defines();
        if let Some(source) = self.sources.get(&(template, defines.clone())) {
            return Ok(source.clone());
        }

        let template_source = self
            .overrides
            .get(&template)
            .map(String::as_str)
            .unwrap_or_else(|| template.builtin_source());
        let source = self.composer.compose(template_source, &defines)?;
        validate_wgsl(&key.label(), &source)?;
        log::debug!("Compiled shader variant {} {:?}", key.shader.name(), defines);

        self.sources.insert((template, defines), source.clone());
        Ok(source)
    }

    /// Pipeline for `key`, building it on first use. `None` when the
    /// variant does not compile or the backend rejects it.
    pub fn pipeline(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        layouts: &BindGroupLayouts,
        key: PipelineKey,
    ) -> Option<RenderPipelineHandle> {
        if let Some(&pipeline) = self.pipelines.get(&key) {
            return Some(pipeline);
        }
        if self.failed.contains(&key) {
            return None;
        }

        match self.build(backend, layouts, &key) {
            Ok(pipeline) => {
                log::debug!("Created pipeline {}", key.label());
                self.pipelines.insert(key, pipeline);
                self.reported.remove(&key);
                Some(pipeline)
            }
            Err(e) => {
                if self.reported.insert(key) {
                    log::error!("{e}");
                } else {
                    log::debug!("{e}");
                }
                self.failed.insert(key);
                None
            }
        }
    }

    fn build(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        layouts: &BindGroupLayouts,
        key: &PipelineKey,
    ) -> Result<RenderPipelineHandle, ShaderError> {
        let source = self.variant_source(key)?;
        let descriptor = key.descriptor(source, layouts, backend.swapchain_format());
        backend
            .create_render_pipeline(&descriptor)
            .map_err(|e| ShaderError::Pipeline {
                label: key.label(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use rstest::rstest;

    fn mesh_key(shader: ShaderKind) -> PipelineKey {
        PipelineKey::new(shader, TargetLayout::Swapchain)
    }

    #[rstest]
    #[case(mesh_key(ShaderKind::Flat))]
    #[case(mesh_key(ShaderKind::Textured))]
    #[case(mesh_key(ShaderKind::Lights))]
    #[case(PipelineKey::new(ShaderKind::GBuffer, TargetLayout::GBuffer))]
    #[case(mesh_key(ShaderKind::Lines))]
    #[case(PipelineKey::new(ShaderKind::Flat, TargetLayout::DepthOnly))]
    #[case(PipelineKey::new(ShaderKind::DeferredAmbient, TargetLayout::SwapchainNoDepth))]
    #[case(PipelineKey::new(ShaderKind::DeferredLight, TargetLayout::SwapchainNoDepth))]
    #[case(mesh_key(ShaderKind::Skybox))]
    #[case(PipelineKey::new(ShaderKind::TextureView, TargetLayout::SwapchainNoDepth))]
    #[case(PipelineKey::new(ShaderKind::DepthView, TargetLayout::SwapchainNoDepth))]
    fn every_variant_validates(#[case] key: PipelineKey) {
        let mut library = ShaderLibrary::new();
        let source = library.variant_source(&key).unwrap();
        assert!(source.contains("fn vs_main"));
        assert_eq!(source.contains("fn fs_main"), key.targets != TargetLayout::DepthOnly);
    }

    #[test]
    fn test_depth_variant_has_no_fragment_stage() {
        let key = PipelineKey::new(ShaderKind::Flat, TargetLayout::DepthOnly);
        assert!(key.defines().contains("DEPTH"));
        assert_eq!(key.label(), "flat_depth");
    }

    #[test]
    fn test_pipeline_state_follows_key() {
        let mut backend = RecordingBackend::new(64, 64);
        let layouts = BindGroupLayouts::create(&mut backend).unwrap();
        let mut library = ShaderLibrary::new();

        let additive = mesh_key(ShaderKind::Lights)
            .with_blend(BlendMode::Additive)
            .with_depth(DepthMode::TestOnly);
        let handle = library.pipeline(&mut backend, &layouts, additive).unwrap();
        let desc = backend.pipeline_descriptor(handle).unwrap();
        assert_eq!(desc.label.as_deref(), Some("lights_additive"));
        assert_eq!(desc.bind_group_layouts.len(), 4);
        assert!(desc.color_targets[0].blend.is_some());
        let depth = desc.depth_stencil.as_ref().unwrap();
        assert!(!depth.depth_write_enabled);
        assert_eq!(depth.depth_compare, CompareFunction::LessEqual);

        // Cached on second request
        assert_eq!(library.pipeline(&mut backend, &layouts, additive), Some(handle));
        assert_eq!(backend.pipeline_count(), 1);

        let lines = library.pipeline(&mut backend, &layouts, mesh_key(ShaderKind::Lines)).unwrap();
        assert_eq!(
            backend.pipeline_descriptor(lines).unwrap().primitive_topology,
            PrimitiveTopology::LineList
        );
    }

    #[test]
    fn test_failures_are_cached_for_one_frame() {
        let mut backend = RecordingBackend::new(64, 64);
        let layouts = BindGroupLayouts::create(&mut backend).unwrap();
        let mut library = ShaderLibrary::new();
        library.set_template_override(Template::Mesh, Some("@vertex fn vs_main( {".to_string()));

        let key = mesh_key(ShaderKind::Flat);
        assert!(library.pipeline(&mut backend, &layouts, key).is_none());
        assert!(!library.is_available(&key));
        assert_eq!(backend.pipeline_count(), 0);

        // Fullscreen variants use the other template
        assert!(library.pipeline(&mut backend, &layouts, mesh_key(ShaderKind::Skybox)).is_some());

        library.begin_frame();
        assert!(library.is_available(&key));
        library.set_template_override(Template::Mesh, None);
        assert!(library.pipeline(&mut backend, &layouts, key).is_some());
    }

    #[test]
    fn test_unbalanced_template_reports_preprocess_error() {
        let mut library = ShaderLibrary::new();
        library.set_template_override(Template::Fullscreen, Some("#ifdef SKYBOX\n".to_string()));
        let result = library.variant_source(&mesh_key(ShaderKind::Skybox));
        assert!(matches!(result, Err(ShaderError::Preprocess(_))));
    }
}
