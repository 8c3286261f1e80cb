// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The last value bound to each slot during a recording.

use crate::renderer::api::*;

/// Tracks current bindings so identical re-binds can be skipped.
#[derive(Debug, Default)]
pub(crate) struct BindingTable {
    pub(crate) viewport: Option<Viewport>,
    pub(crate) scissor: Option<ScissorRect>,
    pub(crate) vertex_buffer: Option<VertexBufferHandle>,
    pub(crate) index_buffer: Option<IndexBufferHandle>,
    constant_buffers: [Option<(BufferScope, ConstantBufferHandle)>; MAX_CONSTANT_BUFFER_SLOTS as usize],
    samplers: [Option<SamplerHandle>; MAX_SAMPLER_SLOTS as usize],
    textures: [Option<TextureHandle>; MAX_TEXTURE_SLOTS as usize],
    render_targets: Option<(Vec<RenderTargetHandle>, Option<RenderTargetHandle>)>,
}

/// Stores `value` in `slot`. Returns `true` if the slot changed.
fn replace<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

impl BindingTable {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn bind_viewport(&mut self, viewport: Viewport) -> bool {
        replace(&mut self.viewport, viewport)
    }

    pub(crate) fn bind_scissor(&mut self, scissor: ScissorRect) -> bool {
        replace(&mut self.scissor, scissor)
    }

    pub(crate) fn bind_vertex_buffer(&mut self, buffer: VertexBufferHandle) -> bool {
        replace(&mut self.vertex_buffer, buffer)
    }

    pub(crate) fn bind_index_buffer(&mut self, buffer: IndexBufferHandle) -> bool {
        replace(&mut self.index_buffer, buffer)
    }

    /// `slot` must already be range-checked.
    pub(crate) fn bind_constant_buffer(
        &mut self,
        slot: u32,
        scope: BufferScope,
        buffer: ConstantBufferHandle,
    ) -> bool {
        replace(&mut self.constant_buffers[slot as usize], (scope, buffer))
    }

    /// `slot` must already be range-checked.
    pub(crate) fn bind_sampler(&mut self, slot: u32, sampler: SamplerHandle) -> bool {
        replace(&mut self.samplers[slot as usize], sampler)
    }

    /// `slot` must already be range-checked. `None` unbinds.
    pub(crate) fn bind_texture(&mut self, slot: u32, texture: Option<TextureHandle>) -> bool {
        let current = &mut self.textures[slot as usize];
        if *current == texture {
            return false;
        }
        *current = texture;
        true
    }

    pub(crate) fn bind_render_targets(
        &mut self,
        color: &[RenderTargetHandle],
        depth: Option<RenderTargetHandle>,
    ) -> bool {
        replace(&mut self.render_targets, (color.to_vec(), depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_rebind_is_reported_unchanged() {
        let mut table = BindingTable::default();
        let sampler = SamplerHandle {
            sampler: SamplerId(3),
        };
        assert!(table.bind_sampler(0, sampler));
        assert!(!table.bind_sampler(0, sampler));
        assert!(table.bind_sampler(1, sampler));
    }

    #[test]
    fn constant_buffer_scope_is_part_of_the_binding() {
        let mut table = BindingTable::default();
        let buffer = ConstantBufferHandle {
            buffer: BufferId(1),
            offset: 0,
            size: 256,
        };
        assert!(table.bind_constant_buffer(2, BufferScope::VERTEX, buffer));
        assert!(table.bind_constant_buffer(2, BufferScope::GRAPHICS, buffer));
        assert!(!table.bind_constant_buffer(2, BufferScope::GRAPHICS, buffer));
    }

    #[test]
    fn texture_unbind_then_rebind() {
        let mut table = BindingTable::default();
        let texture = TextureHandle {
            view: TextureViewId(8),
        };
        assert!(!table.bind_texture(4, None));
        assert!(table.bind_texture(4, Some(texture)));
        assert!(table.bind_texture(4, None));
    }

    #[test]
    fn reset_forgets_everything() {
        let mut table = BindingTable::default();
        table.bind_viewport(Viewport::from_size(64, 64));
        table.reset();
        assert!(table.viewport.is_none());
        assert!(table.bind_viewport(Viewport::from_size(64, 64)));
    }
}
