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

//! The backend-agnostic command stream encoded into a native command buffer.

use super::types::{BufferScope, ClearColor, DepthStencilClear, ScissorRect, Viewport};
use crate::renderer::api::core::RenderPipelineId;
use crate::renderer::api::resource::{
    ConstantBufferHandle, IndexBufferHandle, RenderTargetHandle, SamplerHandle, TextureHandle,
    VertexBufferHandle,
};

/// A single validated command, in the order it was recorded.
///
/// By the time a command reaches a [`NativeCommandBuffer`](crate::renderer::NativeCommandBuffer)
/// the command list has already checked the state machine, the slot ranges
/// and the draw ranges, so backends can translate it without re-validating.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    /// Opens a named debug group.
    PushDebugGroup(String),
    /// Closes the innermost debug group.
    PopDebugGroup,
    /// Binds a resolved pipeline.
    SetPipeline(RenderPipelineId),
    /// Sets the viewport.
    SetViewport(Viewport),
    /// Sets the scissor rectangle.
    SetScissor(ScissorRect),
    /// Binds the vertex buffer.
    SetVertexBuffer(VertexBufferHandle),
    /// Binds the index buffer.
    SetIndexBuffer(IndexBufferHandle),
    /// Binds a constant buffer at a slot for the given stages.
    SetConstantBuffer {
        /// The slot.
        slot: u32,
        /// The stages that see the binding.
        scope: BufferScope,
        /// The buffer range.
        buffer: ConstantBufferHandle,
    },
    /// Binds a sampler at a slot.
    SetSampler {
        /// The slot.
        slot: u32,
        /// The sampler.
        sampler: SamplerHandle,
    },
    /// Binds a texture at a slot, or unbinds the slot with `None`.
    SetTexture {
        /// The slot.
        slot: u32,
        /// The texture.
        texture: Option<TextureHandle>,
    },
    /// Binds the color and depth targets. Starts a new render pass on backends that have them.
    SetRenderTargets {
        /// Color targets in slot order.
        color: Vec<RenderTargetHandle>,
        /// The depth/stencil target.
        depth: Option<RenderTargetHandle>,
    },
    /// Clears a color target.
    ClearRenderTarget {
        /// The target.
        target: RenderTargetHandle,
        /// The clear color.
        color: ClearColor,
    },
    /// Clears aspects of a depth/stencil target.
    ClearDepthStencil {
        /// The target.
        target: RenderTargetHandle,
        /// The aspects and values.
        clear: DepthStencilClear,
    },
    /// A non-indexed draw.
    Draw {
        /// Number of vertices.
        vertex_count: u32,
        /// First vertex.
        first_vertex: u32,
    },
    /// An indexed draw.
    DrawIndexed {
        /// Number of indices.
        index_count: u32,
        /// First index in the bound index range.
        first_index: u32,
        /// Value added to each index before fetching the vertex.
        base_vertex: i32,
    },
    /// A compute dispatch.
    Dispatch {
        /// Workgroups along X.
        x: u32,
        /// Workgroups along Y.
        y: u32,
        /// Workgroups along Z.
        z: u32,
    },
}

impl RenderCommand {
    /// Returns `true` for draws and dispatches.
    pub fn is_work(&self) -> bool {
        matches!(
            self,
            RenderCommand::Draw { .. }
                | RenderCommand::DrawIndexed { .. }
                | RenderCommand::Dispatch { .. }
        )
    }
}
