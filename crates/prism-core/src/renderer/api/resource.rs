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

//! Non-owning handles supplied by the resource layer.
//!
//! A command list only records these values. Keeping the underlying buffers
//! and textures alive until the GPU has finished with them is the resource
//! layer's job.

use crate::renderer::api::core::{BufferId, SamplerId, TextureViewId};
use crate::renderer::api::util::{IndexFormat, TextureFormat};

/// A vertex buffer range with its element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferHandle {
    /// The GPU buffer.
    pub buffer: BufferId,
    /// The byte offset of the first vertex.
    pub offset: u64,
    /// The byte size of one vertex.
    pub stride: u32,
    /// The number of vertices in the range.
    pub vertex_count: u32,
}

/// An index buffer range with its element count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexBufferHandle {
    /// The GPU buffer.
    pub buffer: BufferId,
    /// The byte offset of the first index.
    pub offset: u64,
    /// The index type.
    pub format: IndexFormat,
    /// The number of indices in the range.
    pub index_count: u32,
}

/// A constant (uniform) buffer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConstantBufferHandle {
    /// The GPU buffer.
    pub buffer: BufferId,
    /// The byte offset of the range.
    pub offset: u64,
    /// The byte size of the range.
    pub size: u64,
}

/// A shader-readable texture view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    /// The texture view.
    pub view: TextureViewId,
}

/// A sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle {
    /// The sampler.
    pub sampler: SamplerId,
}

/// A texture view that can be rendered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle {
    /// The texture view.
    pub view: TextureViewId,
    /// The view's format.
    pub format: TextureFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}
