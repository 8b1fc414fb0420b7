//! Per-draw uniform blocks.
//!
//! Buffer writes are applied when the frame is submitted, so a buffer
//! rewritten between two draws would show both draws the last value. Each
//! draw therefore takes its own slot from a [`UniformArena`]; slots are
//! reused from the next frame on.

use crate::backend::{
    BackendResult, BindGroupEntry, BindGroupHandle, BindGroupLayoutHandle, BufferDescriptor, BufferHandle,
    GraphicsBackend,
};
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Matches `ObjectUniforms` in the mesh template
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ObjectUniformData {
    pub model: Mat4,
    pub normal_matrix: Mat4,
}

impl ObjectUniformData {
    pub fn new(model: Mat4) -> Self {
        let normal_matrix = if model.determinant().abs() > f32::EPSILON {
            model.inverse().transpose()
        } else {
            Mat4::IDENTITY
        };
        Self { model, normal_matrix }
    }
}

type ExtraEntries = Vec<(u32, BindGroupEntry)>;

struct Slot {
    buffer: BufferHandle,
    /// Bind groups for this buffer, keyed by the other entries they hold
    bind_groups: Vec<(ExtraEntries, BindGroupHandle)>,
}

/// Growable pool of uniform buffers for one bind group layout. The uniform
/// lives at binding 0; callers may add further entries (textures,
/// samplers) which become part of the cached bind group's identity.
pub struct UniformArena {
    label: &'static str,
    layout: BindGroupLayoutHandle,
    size: u64,
    slots: Vec<Slot>,
    cursor: usize,
}

impl UniformArena {
    pub fn new(label: &'static str, layout: BindGroupLayoutHandle, size: u64) -> Self {
        Self {
            label,
            layout,
            size,
            slots: Vec::new(),
            cursor: 0,
        }
    }

    /// Make every slot available again
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Slots handed out since the last reset
    pub fn used(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn push<T: Pod>(&mut self, backend: &mut dyn GraphicsBackend, data: &T) -> BackendResult<BindGroupHandle> {
        self.push_with(backend, data, &[])
    }

    pub fn push_with<T: Pod>(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        data: &T,
        extra: &[(u32, BindGroupEntry)],
    ) -> BackendResult<BindGroupHandle> {
        debug_assert_eq!(std::mem::size_of::<T>() as u64, self.size);
        if self.cursor == self.slots.len() {
            let buffer = backend.create_buffer(&BufferDescriptor::uniform(self.label, self.size))?;
            log::trace!("Uniform arena {} grew to {} slots", self.label, self.slots.len() + 1);
            self.slots.push(Slot {
                buffer,
                bind_groups: Vec::new(),
            });
        }
        let slot = &mut self.slots[self.cursor];
        backend.write_buffer(slot.buffer, 0, bytemuck::bytes_of(data));

        let bind_group = match slot.bind_groups.iter().find(|(entries, _)| entries.as_slice() == extra) {
            Some((_, bind_group)) => *bind_group,
            None => {
                let mut entries = vec![(
                    0,
                    BindGroupEntry::Buffer {
                        buffer: slot.buffer,
                        offset: 0,
                        size: None,
                    },
                )];
                entries.extend_from_slice(extra);
                let bind_group = backend.create_bind_group(self.layout, &entries)?;
                slot.bind_groups.push((extra.to_vec(), bind_group));
                bind_group
            }
        };
        self.cursor += 1;
        Ok(bind_group)
    }
}
