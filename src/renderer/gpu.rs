//! GPU-side copies of registry resources and the renderer's own targets.
//!
//! Registry entries are uploaded lazily on first use and re-uploaded when
//! their generation changes. Missing textures fall back to 1x1 defaults.

use crate::backend::{
    BackendResult, BindGroupEntry, BindGroupHandle, BindGroupLayoutHandle, BufferDescriptor, BufferHandle, BufferUsage, GraphicsBackend,
    SamplerDescriptor, SamplerHandle, TextureHandle, TextureViewHandle,
};
use crate::pipeline::{DepthTarget, GBuffer, ObjectUniformData, UniformArena};
use crate::resources::{
    GpuTexture, Material, MaterialId, MaterialUniformData, Mesh, MeshId, ResourceRegistry, TextureData, TextureId,
    TextureSlot,
};
use crate::scene::{CameraUniformData, GpuLightData};
use crate::shader::BindGroupLayouts;
use glam::Vec3;
use std::collections::{HashMap, HashSet};

/// Uploaded mesh buffers
#[derive(Debug, Clone, Copy)]
pub struct GpuMesh {
    pub vertex_buffer: BufferHandle,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
    generation: u32,
}

impl GpuMesh {
    fn upload(backend: &mut dyn GraphicsBackend, mesh: &Mesh, generation: u32) -> BackendResult<Self> {
        let vertex_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} vertices", mesh.name)),
                size: mesh.vertex_bytes().len() as u64,
                usage: BufferUsage::VERTEX | BufferUsage::COPY_DST,
            },
            mesh.vertex_bytes(),
        )?;
        let index_buffer = backend.create_buffer_init(
            &BufferDescriptor {
                label: Some(format!("{} indices", mesh.name)),
                size: mesh.index_bytes().len() as u64,
                usage: BufferUsage::INDEX | BufferUsage::COPY_DST,
            },
            mesh.index_bytes(),
        )?;
        log::debug!("Uploaded mesh {} ({} indices)", mesh.name, mesh.index_count());
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count() as u32,
            generation,
        })
    }

    fn release(self, backend: &mut dyn GraphicsBackend) {
        backend.destroy_buffer(self.vertex_buffer);
        backend.destroy_buffer(self.index_buffer);
    }
}

/// What a material bind group was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MaterialKey {
    generation: u32,
    textures: [Option<(TextureId, u32)>; 6],
}

struct MaterialBinding {
    key: MaterialKey,
    uniform: BufferHandle,
    bind_group: BindGroupHandle,
}

pub struct GpuState {
    pub layouts: BindGroupLayouts,
    material_defaults: MaterialDefaults,
    shadow_sampler: SamplerHandle,
    /// Bound where a light has no shadow map; never rendered to
    dummy_shadow: DepthTarget,

    cameras: UniformArena,
    objects: UniformArena,
    lights: UniformArena,

    meshes: HashMap<MeshId, GpuMesh>,
    textures: HashMap<TextureId, (u32, GpuTexture)>,
    materials: HashMap<MaterialId, MaterialBinding>,
    default_material: BindGroupHandle,
    bounds_material: BindGroupHandle,
    box_lines: GpuMesh,
    sky: Option<(TextureId, u32, BindGroupHandle)>,
    views: HashMap<TextureViewHandle, BindGroupHandle>,

    depth: Option<DepthTarget>,
    gbuffer: Option<(GBuffer, BindGroupHandle)>,
    shadow_maps: HashMap<TextureHandle, DepthTarget>,
    /// Shadow maps handed out since the last sweep
    shadow_maps_used: HashSet<TextureHandle>,
}

impl GpuState {
    pub fn new(backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        let layouts = BindGroupLayouts::create(backend)?;
        let material_sampler = backend.create_sampler(&SamplerDescriptor::material())?;
        let shadow_sampler = backend.create_sampler(&SamplerDescriptor::shadow())?;
        let white = GpuTexture::upload(backend, &TextureData::white())?;
        let flat_normal = GpuTexture::upload(backend, &TextureData::flat_normal())?;
        let dummy_shadow = DepthTarget::new(backend, "dummy_shadow", 1, 1)?;
        let box_lines = GpuMesh::upload(backend, &Mesh::box_lines(), 0)?;

        let defaults = MaterialDefaults {
            layout: layouts.material,
            sampler: material_sampler,
            white,
            flat_normal,
        };
        let (_, default_material) = defaults.bind(backend, &Material::default(), &[None; 6])?;
        let bounds = Material::flat("bounds", Vec3::new(1.0, 0.85, 0.1));
        let (_, bounds_material) = defaults.bind(backend, &bounds, &[None; 6])?;

        Ok(Self {
            layouts,
            material_defaults: defaults,
            shadow_sampler,
            dummy_shadow,
            cameras: UniformArena::new("camera", layouts.camera, std::mem::size_of::<CameraUniformData>() as u64),
            objects: UniformArena::new("object", layouts.object, std::mem::size_of::<ObjectUniformData>() as u64),
            lights: UniformArena::new("light", layouts.light, std::mem::size_of::<GpuLightData>() as u64),
            meshes: HashMap::new(),
            textures: HashMap::new(),
            materials: HashMap::new(),
            default_material,
            bounds_material,
            box_lines,
            sky: None,
            views: HashMap::new(),
            depth: None,
            gbuffer: None,
            shadow_maps: HashMap::new(),
            shadow_maps_used: HashSet::new(),
        })
    }

    /// Recycle per-draw uniform slots
    pub fn begin_frame(&mut self) {
        self.cameras.reset();
        self.objects.reset();
        self.lights.reset();
    }

    pub fn camera_bind_group(&mut self, backend: &mut dyn GraphicsBackend, data: &CameraUniformData) -> BackendResult<BindGroupHandle> {
        self.cameras.push(backend, data)
    }

    pub fn object_bind_group(&mut self, backend: &mut dyn GraphicsBackend, data: &ObjectUniformData) -> BackendResult<BindGroupHandle> {
        self.objects.push(backend, data)
    }

    /// Light uniform plus its shadow map, or the dummy map when it has none
    pub fn light_bind_group(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        data: &GpuLightData,
        shadow: Option<TextureViewHandle>,
    ) -> BackendResult<BindGroupHandle> {
        let shadow = shadow.unwrap_or(self.dummy_shadow.view);
        self.lights.push_with(
            backend,
            data,
            &[
                (1, BindGroupEntry::Texture(shadow)),
                (2, BindGroupEntry::Sampler(self.shadow_sampler)),
            ],
        )
    }

    pub fn box_lines(&self) -> GpuMesh {
        self.box_lines
    }

    pub fn bounds_material(&self) -> BindGroupHandle {
        self.bounds_material
    }

    /// Buffers for `id`, uploading on first use or after the mesh changed.
    /// `None` for unknown or empty meshes.
    pub fn mesh(&mut self, backend: &mut dyn GraphicsBackend, registry: &ResourceRegistry, id: MeshId) -> Option<GpuMesh> {
        let mesh = registry.mesh(id)?;
        let generation = registry.mesh_generation(id)?;
        if mesh.index_count() == 0 {
            return None;
        }
        if let Some(gpu) = self.meshes.get(&id) {
            if gpu.generation == generation {
                return Some(*gpu);
            }
        }
        if let Some(stale) = self.meshes.remove(&id) {
            stale.release(backend);
        }
        match GpuMesh::upload(backend, mesh, generation) {
            Ok(gpu) => {
                self.meshes.insert(id, gpu);
                Some(gpu)
            }
            Err(e) => {
                log::warn!("Failed to upload mesh {}: {e}", mesh.name);
                None
            }
        }
    }

    fn texture(&mut self, backend: &mut dyn GraphicsBackend, registry: &ResourceRegistry, id: TextureId) -> Option<GpuTexture> {
        let data = registry.texture(id)?;
        let generation = registry.texture_generation(id)?;
        if let Some((uploaded, texture)) = self.textures.get(&id) {
            if *uploaded == generation {
                return Some(*texture);
            }
        }
        if let Some((_, stale)) = self.textures.remove(&id) {
            backend.destroy_texture(stale.handle);
        }
        match GpuTexture::upload(backend, data) {
            Ok(texture) => {
                self.textures.insert(id, (generation, texture));
                Some(texture)
            }
            Err(e) => {
                log::warn!("Failed to upload texture {}: {e}", data.name);
                None
            }
        }
    }

    /// Bind group for `material`, or the default material when it is
    /// `None` or unknown
    pub fn material_bind_group(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        registry: &ResourceRegistry,
        material: Option<MaterialId>,
    ) -> BindGroupHandle {
        let Some((id, data)) = material.and_then(|id| registry.material(id).map(|m| (id, m))) else {
            return self.default_material;
        };
        let generation = registry.material_generation(id).unwrap_or_default();
        let textures = TextureSlot::ALL.map(|slot| {
            let channel = data.texture(slot)?;
            let texture = registry.texture_id(&channel.texture)?;
            Some((texture, registry.texture_generation(texture)?))
        });
        let key = MaterialKey { generation, textures };

        if let Some(binding) = self.materials.get(&id) {
            if binding.key == key {
                return binding.bind_group;
            }
        }

        let mut uploaded = [None; 6];
        for (slot, texture) in uploaded.iter_mut().zip(textures) {
            *slot = texture.and_then(|(texture, _)| self.texture(backend, registry, texture));
        }
        match self.material_defaults.bind(backend, data, &uploaded) {
            Ok((uniform, bind_group)) => {
                if let Some(stale) = self.materials.insert(id, MaterialBinding { key, uniform, bind_group }) {
                    backend.destroy_buffer(stale.uniform);
                }
                bind_group
            }
            Err(e) => {
                log::warn!("Failed to bind material {}: {e}", data.name);
                self.default_material
            }
        }
    }

    /// Skybox bind group for `texture`
    pub fn sky_bind_group(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        registry: &ResourceRegistry,
        texture: TextureId,
    ) -> Option<BindGroupHandle> {
        let generation = registry.texture_generation(texture)?;
        if let Some((id, uploaded, bind_group)) = self.sky {
            if id == texture && uploaded == generation {
                return Some(bind_group);
            }
        }
        let gpu = self.texture(backend, registry, texture)?;
        let bind_group = backend
            .create_bind_group(
                self.layouts.sky,
                &[
                    (0, BindGroupEntry::Texture(gpu.view)),
                    (1, BindGroupEntry::Sampler(self.material_defaults.sampler)),
                ],
            )
            .map_err(|e| log::warn!("Failed to bind skybox: {e}"))
            .ok()?;
        self.sky = Some((texture, generation, bind_group));
        Some(bind_group)
    }

    /// Bind group showing `view` in a debug tile
    pub fn view_bind_group(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        view: TextureViewHandle,
        depth: bool,
    ) -> Option<BindGroupHandle> {
        if let Some(bind_group) = self.views.get(&view) {
            return Some(*bind_group);
        }
        let layout = if depth { self.layouts.view_depth } else { self.layouts.view_texture };
        let bind_group = backend
            .create_bind_group(layout, &[(0, BindGroupEntry::Texture(view))])
            .map_err(|e| log::warn!("Failed to bind debug view: {e}"))
            .ok()?;
        self.views.insert(view, bind_group);
        Some(bind_group)
    }

    /// Main depth buffer, recreated when the frame size changes
    pub fn depth_target(&mut self, backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> BackendResult<TextureViewHandle> {
        if let Some(depth) = &self.depth {
            if depth.matches(width, height) {
                return Ok(depth.view);
            }
        }
        if let Some(stale) = self.depth.take() {
            stale.release(backend);
        }
        let depth = DepthTarget::new(backend, "main_depth", width, height)?;
        let view = depth.view;
        self.depth = Some(depth);
        Ok(view)
    }

    /// G-buffer for the frame size and the bind group reading it
    pub fn gbuffer(&mut self, backend: &mut dyn GraphicsBackend, width: u32, height: u32) -> BackendResult<GBufferViews> {
        if let Some((gbuffer, bind_group)) = &self.gbuffer {
            if gbuffer.matches(width, height) {
                return Ok(GBufferViews::new(gbuffer, *bind_group));
            }
        }
        if let Some((stale, _)) = self.gbuffer.take() {
            for view in stale.color_views().into_iter().chain([stale.depth.view]) {
                self.views.remove(&view);
            }
            stale.release(backend);
        }

        let gbuffer = GBuffer::new(backend, width, height)?;
        let bind_group = backend.create_bind_group(
            self.layouts.gbuffer,
            &[
                (0, BindGroupEntry::Texture(gbuffer.albedo.view)),
                (1, BindGroupEntry::Texture(gbuffer.normal.view)),
                (2, BindGroupEntry::Texture(gbuffer.emissive.view)),
                (3, BindGroupEntry::Texture(gbuffer.depth.view)),
            ],
        )?;
        log::debug!("Created G-buffer {width}x{height}");
        let views = GBufferViews::new(&gbuffer, bind_group);
        self.gbuffer = Some((gbuffer, bind_group));
        Ok(views)
    }

    /// Shadow map of `size`² for a light that last used `previous`.
    ///
    /// `previous` is reused when this state created it and the size still
    /// matches; otherwise a new target is created and a stale `previous`
    /// is released. Either way the result counts as used until the next
    /// [`GpuState::release_unused_shadow_maps`].
    pub fn shadow_map(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        previous: Option<DepthTarget>,
        label: &str,
        size: u32,
    ) -> BackendResult<DepthTarget> {
        if let Some(previous) = previous.filter(|p| self.shadow_maps.contains_key(&p.texture)) {
            if previous.matches(size, size) {
                self.shadow_maps_used.insert(previous.texture);
                return Ok(previous);
            }
            self.release_shadow_map(backend, previous.texture);
        }
        let target = DepthTarget::new(backend, label, size, size)?;
        self.shadow_maps.insert(target.texture, target);
        self.shadow_maps_used.insert(target.texture);
        Ok(target)
    }

    /// Release every shadow map not handed out since the last call, so maps
    /// whose light is gone or no longer casts shadows do not outlive it.
    pub fn release_unused_shadow_maps(&mut self, backend: &mut dyn GraphicsBackend) -> usize {
        let unused: Vec<_> = self
            .shadow_maps
            .keys()
            .filter(|texture| !self.shadow_maps_used.contains(texture))
            .copied()
            .collect();
        for &texture in &unused {
            self.release_shadow_map(backend, texture);
        }
        self.shadow_maps_used.clear();
        if !unused.is_empty() {
            log::debug!("Released {} unused shadow maps", unused.len());
        }
        unused.len()
    }

    pub fn shadow_map_count(&self) -> usize {
        self.shadow_maps.len()
    }

    fn release_shadow_map(&mut self, backend: &mut dyn GraphicsBackend, texture: TextureHandle) {
        if let Some(target) = self.shadow_maps.remove(&texture) {
            self.views.remove(&target.view);
            target.release(backend);
        }
    }

    /// G-buffer from the last deferred frame, if any
    pub fn current_gbuffer(&self) -> Option<GBufferViews> {
        self.gbuffer.as_ref().map(|(gbuffer, bind_group)| GBufferViews::new(gbuffer, *bind_group))
    }
}

/// Views of the G-buffer attachments
#[derive(Debug, Clone, Copy)]
pub struct GBufferViews {
    /// Albedo, normal, emissive
    pub color: [TextureViewHandle; 3],
    pub depth: TextureViewHandle,
    /// Deferred lighting input group
    pub bind_group: BindGroupHandle,
}

impl GBufferViews {
    fn new(gbuffer: &GBuffer, bind_group: BindGroupHandle) -> Self {
        Self {
            color: gbuffer.color_views(),
            depth: gbuffer.depth.view,
            bind_group,
        }
    }
}

/// Shared pieces of every material bind group
#[derive(Debug, Clone, Copy)]
struct MaterialDefaults {
    layout: BindGroupLayoutHandle,
    sampler: SamplerHandle,
    white: GpuTexture,
    flat_normal: GpuTexture,
}

impl MaterialDefaults {
    /// Upload the material uniform and bind it with `textures`, one per
    /// [`TextureSlot`]; empty slots get a neutral texture
    fn bind(
        &self,
        backend: &mut dyn GraphicsBackend,
        material: &Material,
        textures: &[Option<GpuTexture>; 6],
    ) -> BackendResult<(BufferHandle, BindGroupHandle)> {
        let uniform = backend.create_buffer_init(
            &BufferDescriptor::uniform(&material.name, std::mem::size_of::<MaterialUniformData>() as u64),
            bytemuck::bytes_of(&material.uniform_data()),
        )?;

        let mut entries = vec![
            (
                0,
                BindGroupEntry::Buffer {
                    buffer: uniform,
                    offset: 0,
                    size: None,
                },
            ),
            (1, BindGroupEntry::Sampler(self.sampler)),
        ];
        for slot in TextureSlot::ALL {
            let channel = material.texture(slot);
            if let Some(channel) = channel.filter(|c| c.uv_set != 0) {
                log::debug!("Material {}: uv set {} is not supported, using 0", material.name, channel.uv_set);
            }
            let texture = match (textures[slot.index()], channel) {
                (Some(texture), _) => texture,
                (None, channel) => {
                    if let Some(channel) = channel {
                        log::warn!("Material {}: texture {} is not loaded", material.name, channel.texture);
                    }
                    if slot == TextureSlot::Normal {
                        self.flat_normal
                    } else {
                        self.white
                    }
                }
            };
            entries.push((2 + slot.index() as u32, BindGroupEntry::Texture(texture.view)));
        }

        let bind_group = backend.create_bind_group(self.layout, &entries)?;
        Ok((uniform, bind_group))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;
    use crate::resources::AlphaMode;
    use glam::Vec4;

    #[test]
    fn test_meshes_upload_once_per_generation() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut gpu = GpuState::new(&mut backend).unwrap();
        let mut registry = ResourceRegistry::new();
        let id = registry.add_mesh(Mesh::cube());

        let first = gpu.mesh(&mut backend, &registry, id).unwrap();
        assert_eq!(gpu.mesh(&mut backend, &registry, id).unwrap().vertex_buffer, first.vertex_buffer);

        registry.add_mesh(Mesh::box_mesh("cube", Vec3::ONE));
        let second = gpu.mesh(&mut backend, &registry, id).unwrap();
        assert_ne!(second.vertex_buffer, first.vertex_buffer);
        assert!(backend.buffer_data(first.vertex_buffer).is_none());
    }

    #[test]
    fn test_material_rebinds_when_texture_arrives() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut gpu = GpuState::new(&mut backend).unwrap();
        let mut registry = ResourceRegistry::new();
        let material = registry.add_material(
            Material::new("brick")
                .with_alpha_mode(AlphaMode::Mask)
                .with_base_color(Vec4::ONE)
                .with_texture(TextureSlot::Albedo, "brick.png"),
        );

        let before = gpu.material_bind_group(&mut backend, &registry, Some(material));
        assert_eq!(gpu.material_bind_group(&mut backend, &registry, Some(material)), before);

        registry.add_texture(TextureData::solid_color("brick.png", [200, 80, 60, 255]));
        let after = gpu.material_bind_group(&mut backend, &registry, Some(material));
        assert_ne!(after, before);
        assert_eq!(gpu.material_bind_group(&mut backend, &registry, None), gpu.default_material);
    }

    #[test]
    fn test_unused_shadow_maps_are_swept_with_their_views() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut gpu = GpuState::new(&mut backend).unwrap();
        let textures = backend.live_texture_count();

        let map = gpu.shadow_map(&mut backend, None, "shadow:a", 64).unwrap();
        gpu.view_bind_group(&mut backend, map.view, true).unwrap();
        assert_eq!(gpu.release_unused_shadow_maps(&mut backend), 0);

        // Same size: the previous target comes back
        assert_eq!(gpu.shadow_map(&mut backend, Some(map), "shadow:a", 64).unwrap(), map);
        assert_eq!(gpu.release_unused_shadow_maps(&mut backend), 0);

        // Not requested since the last sweep
        assert_eq!(gpu.release_unused_shadow_maps(&mut backend), 1);
        assert_eq!(gpu.shadow_map_count(), 0);
        assert!(!gpu.views.contains_key(&map.view));
        assert_eq!(backend.live_texture_count(), textures);
    }

    #[test]
    fn test_resized_shadow_map_replaces_the_old_one() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut gpu = GpuState::new(&mut backend).unwrap();
        let small = gpu.shadow_map(&mut backend, None, "shadow:a", 64).unwrap();
        gpu.view_bind_group(&mut backend, small.view, true).unwrap();
        let large = gpu.shadow_map(&mut backend, Some(small), "shadow:a", 128).unwrap();

        assert_ne!(large.texture, small.texture);
        assert_eq!(gpu.shadow_map_count(), 1);
        assert!(backend.texture_of_view(small.view).is_none());
        assert!(!gpu.views.contains_key(&small.view));
    }

    #[test]
    fn test_depth_target_follows_frame_size() {
        let mut backend = RecordingBackend::new(16, 16);
        let mut gpu = GpuState::new(&mut backend).unwrap();
        let textures = backend.live_texture_count();
        let first = gpu.depth_target(&mut backend, 16, 16).unwrap();
        assert_eq!(gpu.depth_target(&mut backend, 16, 16).unwrap(), first);
        gpu.depth_target(&mut backend, 32, 16).unwrap();
        assert_eq!(backend.live_texture_count(), textures + 1);
    }
}
